//! 公开预约处理器

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use validator::Validate;

use super::model::{
    AvailabilityQuery, AvailabilityResponse, BookingCreatedResponse, BusinessResponse,
    MultiDayQuery, MultiDayResponse, ProfessionalsQuery, PublicAppointmentResponse,
    PublicBookingRequest, PublicBusiness, PublicCancelRequest, PublicProfessionalsResponse,
    PublicServicesResponse, ServicesQuery,
};
use crate::app::scheduling::parse_date;
use crate::app::AppState;
use crate::core::error::CoreError;
use crate::core::validation::blank_to_none;

pub async fn get_business(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<BusinessResponse>, CoreError> {
    let company = state.booking.resolve_company(&slug).await?;
    Ok(Json(BusinessResponse {
        business: PublicBusiness::from(&company),
    }))
}

pub async fn list_services(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<ServicesQuery>,
) -> Result<Json<PublicServicesResponse>, CoreError> {
    let company = state.booking.resolve_company(&slug).await?;
    let services = state
        .booking
        .services(company.id, query.professional_id)
        .await?;
    Ok(Json(PublicServicesResponse { services }))
}

pub async fn list_professionals(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<ProfessionalsQuery>,
) -> Result<Json<PublicProfessionalsResponse>, CoreError> {
    let company = state.booking.resolve_company(&slug).await?;
    let professionals = state
        .booking
        .professionals(company.id, query.service_id)
        .await?;
    Ok(Json(PublicProfessionalsResponse { professionals }))
}

pub async fn availability(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, CoreError> {
    let company = state.booking.resolve_company(&slug).await?;
    let date = parse_date(&query.date)?;
    let (service, professional, slots) = state
        .booking
        .availability(company.id, query.service_id, query.professional_id, date)
        .await?;

    Ok(Json(AvailabilityResponse {
        date,
        professional_id: professional.id,
        professional_name: professional.name,
        service_id: service.id,
        duration: service.duration,
        slots,
    }))
}

pub async fn availability_multi_day(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<MultiDayQuery>,
) -> Result<Json<MultiDayResponse>, CoreError> {
    let company = state.booking.resolve_company(&slug).await?;
    let availability = state
        .booking
        .multi_day(company.id, query.service_id, query.professional_id, query.days)
        .await?;

    Ok(Json(MultiDayResponse {
        professional_id: query.professional_id,
        service_id: query.service_id,
        availability,
    }))
}

pub async fn create_booking(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<PublicBookingRequest>,
) -> Result<(StatusCode, Json<BookingCreatedResponse>), CoreError> {
    let payload = PublicBookingRequest {
        client_email: blank_to_none(payload.client_email),
        notes: blank_to_none(payload.notes),
        ..payload
    };
    payload.validate()?;

    let company = state.booking.resolve_company(&slug).await?;
    let created = state.booking.book(&company, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PublicAppointmentResponse>, CoreError> {
    let (_, appointment) = state.booking.lookup(&code).await?;
    Ok(Json(PublicAppointmentResponse { appointment }))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(payload): Json<PublicCancelRequest>,
) -> Result<Json<PublicAppointmentResponse>, CoreError> {
    let appointment = state
        .booking
        .cancel(&code, &payload.phone, blank_to_none(payload.reason))
        .await?;
    Ok(Json(PublicAppointmentResponse { appointment }))
}

pub async fn confirm_booking(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<PublicAppointmentResponse>, CoreError> {
    let appointment = state.booking.confirm(&token).await?;
    Ok(Json(PublicAppointmentResponse { appointment }))
}
