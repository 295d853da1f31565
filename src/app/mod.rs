//! 业务模块与路由装配

pub mod accounts;
pub mod appointments;
pub mod availability;
pub mod booking;
pub mod catalog;
pub mod clients;
pub mod dashboard;
pub mod platform;
pub mod portal;
pub mod professionals;
pub mod scheduling;
pub mod subscriptions;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::Config;
use crate::core::auth::TokenService;
use crate::core::middleware::{
    request_logging_middleware, require_professional, require_superadmin, require_user,
};
use accounts::AccountService;
use appointments::AppointmentService;
use availability::AvailabilityService;
use booking::BookingService;
use catalog::CatalogService;
use clients::ClientService;
use dashboard::DashboardService;
use platform::PlatformService;
use portal::handler::portal_guard;
use portal::PortalService;
use professionals::ProfessionalService;
use subscriptions::handler::subscription_guard;
use subscriptions::SubscriptionService;

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenService,
    pub accounts: AccountService,
    pub subscriptions: SubscriptionService,
    pub clients: ClientService,
    pub professionals: ProfessionalService,
    pub catalog: CatalogService,
    pub availability: AvailabilityService,
    pub appointments: AppointmentService,
    pub booking: BookingService,
    pub portal: PortalService,
    pub platform: PlatformService,
    pub dashboard: DashboardService,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.token_ttl_hours);
        let accounts = AccountService::new(pool.clone(), tokens.clone());
        let subscriptions = SubscriptionService::new(pool.clone(), config.billing.clone());
        let clients = ClientService::new(pool.clone());
        let professionals = ProfessionalService::new(
            pool.clone(),
            subscriptions.clone(),
            config.auth.activation_ttl_hours,
        );
        let catalog = CatalogService::new(pool.clone());
        let availability = AvailabilityService::new(
            pool.clone(),
            professionals.clone(),
            config.booking.slot_step_minutes,
        );
        let appointments = AppointmentService::new(
            pool.clone(),
            clients.clone(),
            professionals.clone(),
            catalog.clone(),
            availability.clone(),
        );
        let booking = BookingService::new(
            pool.clone(),
            config.booking.clone(),
            accounts.clone(),
            subscriptions.clone(),
            professionals.clone(),
            catalog.clone(),
            availability.clone(),
            appointments.clone(),
        );
        let portal = PortalService::new(
            pool.clone(),
            tokens.clone(),
            accounts.clone(),
            professionals.clone(),
            appointments.clone(),
        );
        let platform = PlatformService::new(pool.clone(), accounts.clone(), subscriptions.clone());
        let dashboard = DashboardService::new(pool);

        Self {
            config: Arc::new(config),
            tokens,
            accounts,
            subscriptions,
            clients,
            professionals,
            catalog,
            availability,
            appointments,
            booking,
            portal,
            platform,
            dashboard,
        }
    }
}

/// 健康检查
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "agenda",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// 无需登录的接口
fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(accounts::handler::register))
        .route("/auth/login", post(accounts::handler::login))
        .route("/subscriptions/plans", get(subscriptions::handler::list_plans))
        .route("/subscriptions/webhook", post(subscriptions::handler::webhook))
        .route("/professional-auth/activate", post(portal::handler::activate))
        .route("/professional-auth/login", post(portal::handler::login))
        .route("/public/business/:slug", get(booking::handler::get_business))
        .route(
            "/public/business/:slug/services",
            get(booking::handler::list_services),
        )
        .route(
            "/public/business/:slug/professionals",
            get(booking::handler::list_professionals),
        )
        .route(
            "/public/business/:slug/availability",
            get(booking::handler::availability),
        )
        .route(
            "/public/business/:slug/availability/multi-day",
            get(booking::handler::availability_multi_day),
        )
        .route(
            "/public/business/:slug/appointments",
            post(booking::handler::create_booking),
        )
        .route("/public/appointments/:code", get(booking::handler::get_booking))
        .route(
            "/public/appointments/:code/cancel",
            put(booking::handler::cancel_booking),
        )
        .route(
            "/public/appointments/confirm/:token",
            post(booking::handler::confirm_booking),
        )
}

/// 账号与订阅管理：登录即可，不要求有效订阅
fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(accounts::handler::me))
        .route("/auth/change-password", post(accounts::handler::change_password))
        .route(
            "/auth/business",
            get(accounts::handler::get_business).put(accounts::handler::update_business),
        )
        .route("/subscriptions/status", get(subscriptions::handler::status))
        .route("/subscriptions/subscribe", post(subscriptions::handler::subscribe))
        .route("/subscriptions/cancel", post(subscriptions::handler::cancel))
        .route("/subscriptions/reactivate", post(subscriptions::handler::reactivate))
        .route("/subscriptions/change-plan", post(subscriptions::handler::change_plan))
        .route("/subscriptions/portal", get(subscriptions::handler::portal))
}

/// 租户业务数据：需要有效订阅
fn tenant_routes() -> Router<AppState> {
    use appointments::handler as appt;
    use catalog::handler as svc;
    use clients::handler as cli;
    use professionals::handler as pro;

    Router::new()
        .route("/clients", get(cli::list_clients).post(cli::create_client))
        .route("/clients/search", get(cli::search_clients))
        .route(
            "/clients/:id",
            get(cli::get_client)
                .put(cli::update_client)
                .delete(cli::delete_client),
        )
        .route(
            "/professionals",
            get(pro::list_professionals).post(pro::create_professional),
        )
        .route(
            "/professionals/:id",
            get(pro::get_professional)
                .put(pro::update_professional)
                .delete(pro::delete_professional),
        )
        .route(
            "/professionals/:id/toggle-status",
            post(pro::toggle_professional_status),
        )
        .route(
            "/professionals/:id/services",
            get(pro::get_professional_services).post(pro::set_professional_services),
        )
        .route(
            "/professionals/:id/working-hours",
            get(pro::get_working_hours).put(pro::update_working_hours),
        )
        .route("/professionals/:id/invite", post(pro::invite_professional))
        .route("/services", get(svc::list_services).post(svc::create_service))
        .route(
            "/services/:id",
            get(svc::get_service)
                .put(svc::update_service)
                .delete(svc::delete_service),
        )
        .route("/services/:id/toggle-status", post(svc::toggle_service_status))
        .route(
            "/services/:id/professionals",
            get(svc::get_service_professionals).post(svc::set_service_professionals),
        )
        .route(
            "/appointments",
            get(appt::list_appointments).post(appt::create_appointment),
        )
        .route("/appointments/calendar", get(appt::calendar))
        .route("/appointments/check-availability", post(appt::check_availability))
        .route("/appointments/financial-report", get(appt::financial_report))
        .route(
            "/appointments/:id",
            get(appt::get_appointment)
                .put(appt::update_appointment)
                .delete(appt::delete_appointment),
        )
        .route("/appointments/:id/status", put(appt::update_status))
        .route("/appointments/:id/complete", put(appt::complete_appointment))
        .route("/dashboard/stats", get(dashboard::dashboard_stats))
}

/// 专业人员门户
fn portal_routes() -> Router<AppState> {
    use portal::handler as p;

    Router::new()
        .route("/professional-auth/me", get(p::me))
        .route("/professional-auth/change-password", post(p::change_password))
        .route("/professional/dashboard", get(p::dashboard))
        .route("/professional/schedule", get(p::schedule))
        .route("/professional/stats", get(p::stats))
        .route("/professional/appointments", get(p::list_appointments))
        .route("/professional/appointments/:id", get(p::get_appointment))
        .route(
            "/professional/appointments/:id/complete",
            put(p::complete_appointment),
        )
        .route(
            "/professional/appointments/:id/cancel",
            put(p::cancel_appointment),
        )
        .route(
            "/professional/working-hours",
            get(p::get_working_hours).put(p::update_working_hours),
        )
        .route(
            "/professional/blocked-dates",
            get(p::list_blocked_dates).post(p::add_blocked_date),
        )
        .route("/professional/blocked-dates/:id", delete(p::remove_blocked_date))
        .route("/professional/clients", get(p::list_clients))
        .route("/professional/clients/:id", get(p::get_client))
}

/// 平台超级管理员
fn superadmin_routes() -> Router<AppState> {
    use platform::handler as admin;

    Router::new()
        .route("/superadmin/companies", get(admin::list_companies))
        .route(
            "/superadmin/companies/:id",
            get(admin::get_company).put(admin::update_company),
        )
        .route("/superadmin/companies/:id/suspend", post(admin::suspend_company))
        .route("/superadmin/companies/:id/activate", post(admin::activate_company))
        .route("/superadmin/subscriptions", get(admin::list_subscriptions))
        .route(
            "/superadmin/subscriptions/expiring",
            get(admin::expiring_subscriptions),
        )
        .route(
            "/superadmin/subscriptions/:company_id/plan",
            put(admin::change_plan),
        )
        .route(
            "/superadmin/subscriptions/:company_id/extend",
            post(admin::extend_subscription),
        )
        .route(
            "/superadmin/subscriptions/:company_id/cancel",
            post(admin::cancel_subscription),
        )
        .route(
            "/superadmin/subscriptions/:company_id",
            get(admin::get_subscription),
        )
        .route("/superadmin/payments", get(admin::list_payments))
        .route("/superadmin/payments/stats", get(admin::payment_stats))
        .route("/superadmin/analytics/overview", get(admin::analytics_overview))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("忽略无效的跨域来源: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// 构建完整路由
pub fn build_router(state: AppState) -> Router {
    let tokens = state.tokens.clone();

    let tenant = tenant_routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), subscription_guard))
        .route_layer(middleware::from_fn_with_state(tokens.clone(), require_user));
    let account = account_routes()
        .route_layer(middleware::from_fn_with_state(tokens.clone(), require_user));
    let portal = portal_routes()
        .route_layer(middleware::from_fn_with_state(state.clone(), portal_guard))
        .route_layer(middleware::from_fn_with_state(tokens.clone(), require_professional));
    let superadmin = superadmin_routes()
        .route_layer(middleware::from_fn_with_state(tokens, require_superadmin));

    let api = Router::new()
        .merge(public_routes())
        .merge(account)
        .merge(tenant)
        .merge(portal)
        .merge(superadmin);

    let timeout = Duration::from_secs(state.config.server.timeout_seconds.max(1));
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
