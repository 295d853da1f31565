use agenda::infrastructure::DatabaseManager;
use agenda::{build_router, AppState, Config};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Local};
use serde_json::{json, Value};
use tower::ServiceExt;

const SUPERADMIN_EMAIL: &str = "root@agenda.test";
const SUPERADMIN_PASSWORD: &str = "root-password";
const WEBHOOK_SECRET: &str = "dev-webhook-secret";

async fn setup() -> Router {
    let config = Config::for_tests();
    let db = DatabaseManager::new(&config.database).await.unwrap();
    db.migrate().await.unwrap();

    let state = AppState::new(db.into_pool(), config);
    state
        .accounts
        .ensure_superadmin(SUPERADMIN_EMAIL, SUPERADMIN_PASSWORD)
        .await
        .unwrap();
    build_router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn webhook(app: &Router, secret: &str, event: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/subscriptions/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-webhook-secret", secret)
        .body(Body::from(event.to_string()))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

struct Tenant {
    token: String,
    company_id: i64,
    slug: String,
}

async fn register(app: &Router, business: &str, email: &str) -> Tenant {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "business_name": business,
            "name": "Owner",
            "email": email,
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    Tenant {
        token: body["access_token"].as_str().unwrap().to_string(),
        company_id: body["company"]["id"].as_i64().unwrap(),
        slug: body["company"]["slug"].as_str().unwrap().to_string(),
    }
}

/// 注册并通过支付回调开通试用
async fn subscribed_tenant(app: &Router, business: &str, email: &str) -> Tenant {
    let tenant = register(app, business, email).await;
    let (status, _) = webhook(
        app,
        WEBHOOK_SECRET,
        json!({
            "id": format!("evt_{}", tenant.company_id),
            "type": "checkout.completed",
            "company_id": tenant.company_id,
            "plan": "pro"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    tenant
}

/// 基础套餐没有试用，结账回调后直接生效
async fn basic_tenant(app: &Router, business: &str, email: &str) -> Tenant {
    let tenant = register(app, business, email).await;
    let (status, body) = webhook(
        app,
        WEBHOOK_SECRET,
        json!({
            "id": format!("evt_basic_{}", tenant.company_id),
            "type": "checkout.completed",
            "company_id": tenant.company_id,
            "plan": "basic"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    tenant
}

async fn superadmin_token(app: &Router) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": SUPERADMIN_EMAIL, "password": SUPERADMIN_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

async fn create_client(app: &Router, token: &str, name: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/clients",
        Some(token),
        Some(json!({ "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["client"]["id"].as_i64().unwrap()
}

/// 后台为明天建一个预约，返回预约 id
async fn book_tomorrow(app: &Router, token: &str, ids: &Setup, client_id: i64, start: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/appointments",
        Some(token),
        Some(json!({
            "client_id": client_id,
            "professional_id": ids.professional_id,
            "service_id": ids.service_id,
            "appointment_date": tomorrow(),
            "start_time": start
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["appointment"]["id"].as_i64().unwrap()
}

/// 邀请并开通门户，返回门户令牌
async fn portal_login(app: &Router, token: &str, professional_id: i64, email: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/api/professionals/{}/invite", professional_id),
        Some(token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let activation = body["activation_token"].as_str().unwrap().to_string();

    let (status, body) = send(
        app,
        Method::POST,
        "/api/professional-auth/activate",
        None,
        Some(json!({"token": activation, "password": "portal-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["professional"]["email"], email);
    body["access_token"].as_str().unwrap().to_string()
}

struct Setup {
    service_id: i64,
    professional_id: i64,
}

/// 建一个 30 分钟的服务和每天 08:00-18:00 上班的专业人员
async fn seed_schedule(app: &Router, token: &str) -> Setup {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/services",
        Some(token),
        Some(json!({"name": "Corte", "price": 50.0, "duration": 30})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let service_id = body["service"]["id"].as_i64().unwrap();

    let (status, body) = send(
        app,
        Method::POST,
        "/api/professionals",
        Some(token),
        Some(json!({
            "name": "Bia",
            "role": "Cabeleireira",
            "email": "bia@salon.test",
            "service_ids": [service_id]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let professional_id = body["professional"]["id"].as_i64().unwrap();

    let hours: Vec<Value> = (0..7)
        .map(|day| json!({"day_of_week": day, "start_time": "08:00", "end_time": "18:00"}))
        .collect();
    let (status, body) = send(
        app,
        Method::PUT,
        &format!("/api/professionals/{}/working-hours", professional_id),
        Some(token),
        Some(json!({ "working_hours": hours })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    Setup {
        service_id,
        professional_id,
    }
}

fn tomorrow() -> String {
    (Local::now().date_naive() + Duration::days(1))
        .format("%Y-%m-%d")
        .to_string()
}

#[tokio::test]
async fn test_health() {
    let app = setup().await;
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_register_login_and_me() {
    let app = setup().await;
    let tenant = register(&app, "Salão da Ana", "ana@salon.test").await;
    assert_eq!(tenant.slug, "salao-da-ana");

    let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ana@salon.test");
    assert_eq!(body["company"]["slug"], "salao-da-ana");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "ANA@salon.test", "password": "secret123"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "ana@salon.test", "password": "wrong"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());

    // 同名商户得到带后缀的 slug，重复邮箱冲突
    let other = register(&app, "Salão da Ana", "ana2@salon.test").await;
    assert_eq!(other.slug, "salao-da-ana-2");
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "business_name": "Outro",
            "name": "Ana",
            "email": "ana@salon.test",
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_missing_or_invalid_token() {
    let app = setup().await;
    let (status, _) = send(&app, Method::GET, "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/api/clients", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_subscription_gate_and_webhook() {
    let app = setup().await;
    let tenant = register(&app, "Studio", "owner@studio.test").await;

    let (status, body) = send(&app, Method::GET, "/api/clients", Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "PAYMENT_REQUIRED");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/subscriptions/status",
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["status"], "none");
    assert_eq!(body["subscription"]["has_active_subscription"], false);

    let event = json!({
        "id": "evt_checkout",
        "type": "checkout.completed",
        "company_id": tenant.company_id,
        "plan": "pro"
    });
    let (status, _) = webhook(&app, "wrong-secret", event.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, ack) = webhook(&app, WEBHOOK_SECRET, event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["duplicate"], false);

    let (_, ack) = webhook(&app, WEBHOOK_SECRET, event).await;
    assert_eq!(ack["duplicate"], true);

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/subscriptions/status",
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(body["subscription"]["status"], "trialing");
    assert_eq!(body["subscription"]["is_in_trial"], true);
    assert_eq!(body["subscription"]["trial_days_remaining"], 3);

    let (status, body) = send(&app, Method::GET, "/api/clients", Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clients"], json!([]));
    assert_eq!(body["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_client_crud() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Clinic", "owner@clinic.test").await;
    let token = Some(tenant.token.as_str());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/clients",
        token,
        Some(json!({"name": "   ", "email": "bad"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/clients",
        token,
        Some(json!({"name": "Maria Souza", "phone": "(11) 98888-7777", "email": "Maria@mail.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let client_id = body["client"]["id"].as_i64().unwrap();
    assert_eq!(body["client"]["email"], "maria@mail.test");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/clients",
        token,
        Some(json!({"name": "Outra", "email": "maria@mail.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, Method::GET, "/api/clients?search=souza", token, None).await;
    assert_eq!(body["pagination"]["total"], 1);

    let (_, body) = send(&app, Method::GET, "/api/clients/search?q=", token, None).await;
    assert_eq!(body, json!([]));

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/clients/{}", client_id),
        token,
        Some(json!({"name": "Maria S.", "phone": "(11) 98888-7777"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client"]["name"], "Maria S.");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/clients/{}", client_id), token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &format!("/api/clients/{}", client_id), token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_tenants_are_isolated() {
    let app = setup().await;
    let first = subscribed_tenant(&app, "First", "first@test.test").await;
    let second = subscribed_tenant(&app, "Second", "second@test.test").await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/clients",
        Some(&first.token),
        Some(json!({"name": "Only Mine"})),
    )
    .await;
    let client_id = body["client"]["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/clients/{}", client_id),
        Some(&second.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_appointment_conflicts() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Barber", "owner@barber.test").await;
    let token = Some(tenant.token.as_str());
    let ids = seed_schedule(&app, &tenant.token).await;

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/clients",
        token,
        Some(json!({"name": "João"})),
    )
    .await;
    let client_id = body["client"]["id"].as_i64().unwrap();
    let date = tomorrow();

    let booking = |start: &str| {
        json!({
            "client_id": client_id,
            "professional_id": ids.professional_id,
            "service_id": ids.service_id,
            "appointment_date": date,
            "start_time": start
        })
    };

    let (status, body) = send(&app, Method::POST, "/api/appointments", token, Some(booking("10:00"))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let appointment_id = body["appointment"]["id"].as_i64().unwrap();
    assert_eq!(body["appointment"]["end_time"], "10:30");
    assert_eq!(body["appointment"]["price"], 50.0);
    assert_eq!(body["appointment"]["booking_code"].as_str().unwrap().len(), 8);

    let (status, _) = send(&app, Method::POST, "/api/appointments", token, Some(booking("10:15"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 相邻时段不冲突
    let (status, _) = send(&app, Method::POST, "/api/appointments", token, Some(booking("10:30"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/appointments/check-availability",
        token,
        Some(json!({
            "professional_id": ids.professional_id,
            "service_id": ids.service_id,
            "appointment_date": date,
            "start_time": "10:00",
            "exclude_appointment_id": appointment_id
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["available"], true);

    // 取消后时段释放
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/appointments/{}/status", appointment_id),
        token,
        Some(json!({"status": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "cancelled");

    let (status, _) = send(&app, Method::POST, "/api/appointments", token, Some(booking("10:00"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/appointments?start_date=not-a-date",
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/dashboard/stats", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_appointments"], 3);
    assert_eq!(body["appointments_by_status"]["scheduled"], 2);
}

#[tokio::test]
async fn test_public_booking_flow() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Beauty Place", "owner@beauty.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;
    let base = format!("/api/public/business/{}", tenant.slug);
    let date = tomorrow();

    let (status, body) = send(&app, Method::GET, &base, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["business"]["business_name"], "Beauty Place");

    let (status, _) = send(&app, Method::GET, "/api/public/business/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(
        &app,
        Method::GET,
        &format!("{}/professionals?service_id={}", base, ids.service_id),
        None,
        None,
    )
    .await;
    assert_eq!(body["professionals"].as_array().unwrap().len(), 1);

    let availability = format!(
        "{}/availability?service_id={}&professional_id={}&date={}",
        base, ids.service_id, ids.professional_id, date
    );
    let (status, body) = send(&app, Method::GET, &availability, None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots.len(), 20);
    assert_eq!(slots[0]["start_time"], "08:00");

    let request = json!({
        "service_id": ids.service_id,
        "professional_id": ids.professional_id,
        "date": date,
        "start_time": "09:00",
        "client_name": "Carla",
        "client_phone": "+55 11 97777-6666"
    });
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("{}/appointments", base),
        None,
        Some(request.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let code = body["booking_code"].as_str().unwrap().to_string();
    assert_eq!(body["appointment"]["can_cancel"], true);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("{}/appointments", base),
        None,
        Some(request),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, Method::GET, &availability, None, None).await;
    assert_eq!(body["slots"].as_array().unwrap().len(), 19);

    // 客户按电话自动建档
    let (_, body) = send(
        &app,
        Method::GET,
        "/api/clients?search=carla",
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(body["pagination"]["total"], 1);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/public/appointments/{}", code),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["service"]["name"], "Corte");

    let cancel_uri = format!("/api/public/appointments/{}/cancel", code);
    let (status, _) = send(
        &app,
        Method::PUT,
        &cancel_uri,
        None,
        Some(json!({"phone": "11 0000-0000"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::PUT,
        &cancel_uri,
        None,
        Some(json!({"phone": "5511977776666", "reason": "Imprevisto"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["appointment"]["status"], "cancelled");
    assert_eq!(body["appointment"]["can_cancel"], false);
}

#[tokio::test]
async fn test_public_booking_rejects_out_of_window_dates() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Window", "owner@window.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;
    let today = Local::now().date_naive();

    for date in [today - Duration::days(1), today + Duration::days(61)] {
        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/public/business/{}/appointments", tenant.slug),
            None,
            Some(json!({
                "service_id": ids.service_id,
                "professional_id": ids.professional_id,
                "date": date.format("%Y-%m-%d").to_string(),
                "start_time": "09:00",
                "client_name": "Carla",
                "client_phone": "+55 11 97777-6666"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_unsubscribed_business_is_hidden() {
    let app = setup().await;
    let tenant = register(&app, "Hidden", "owner@hidden.test").await;
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/public/business/{}", tenant.slug),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_professional_portal() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Portal", "owner@portal.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/professionals/{}/invite", ids.professional_id),
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let activation = body["activation_token"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/professional-auth/activate",
        None,
        Some(json!({"token": "bogus", "password": "bia-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/professional-auth/activate",
        None,
        Some(json!({"token": activation, "password": "bia-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["professional"]["email"], "bia@salon.test");
    assert!(body["professional"].get("password_hash").is_none());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/professional-auth/login",
        None,
        Some(json!({"email": "bia@salon.test", "password": "bia-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["business_name"], "Portal");
    let pro_token = body["access_token"].as_str().unwrap().to_string();
    let pro = Some(pro_token.as_str());

    let (status, body) = send(&app, Method::GET, "/api/professional/dashboard", pro, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["today_appointments"], 0);

    let (status, body) = send(&app, Method::GET, "/api/professional/working-hours", pro, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["working_hours"].as_array().unwrap().len(), 7);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/professional/blocked-dates",
        pro,
        Some(json!({"date": tomorrow(), "reason": "Folga"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/professional/blocked-dates",
        pro,
        Some(json!({"date": tomorrow()})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 停诊日没有可预约时段
    let (_, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/public/business/{}/availability?service_id={}&professional_id={}&date={}",
            tenant.slug,
            ids.service_id,
            ids.professional_id,
            tomorrow()
        ),
        None,
        None,
    )
    .await;
    assert_eq!(body["slots"], json!([]));

    // 门户令牌不能访问租户后台，反之亦然
    let (status, _) = send(&app, Method::GET, "/api/clients", pro, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(
        &app,
        Method::GET,
        "/api/professional/dashboard",
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_superadmin_oversight() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Managed", "owner@managed.test").await;
    register(&app, "Pending Co", "owner@pending.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": SUPERADMIN_EMAIL, "password": SUPERADMIN_PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let admin_token = body["access_token"].as_str().unwrap().to_string();
    let admin = Some(admin_token.as_str());

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/superadmin/companies",
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, "/api/superadmin/companies", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 2);

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/superadmin/companies?status=trialing",
        admin,
        None,
    )
    .await;
    assert_eq!(body["companies"].as_array().unwrap().len(), 1);
    assert_eq!(body["companies"][0]["owner_email"], "owner@managed.test");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/superadmin/companies/{}", tenant.company_id),
        admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["counts"]["professionals"], 0);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/superadmin/companies/{}/suspend", tenant.company_id),
        admin,
        Some(json!({"reason": "Chargeback"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/api/clients", Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/superadmin/companies/{}/activate", tenant.company_id),
        admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/clients", Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/superadmin/subscriptions/{}/extend", tenant.company_id),
        admin,
        Some(json!({"days": 10})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["status"], "trialing");

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/superadmin/subscriptions/expiring?days=30",
        admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriptions"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::GET, "/api/superadmin/analytics/overview", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_companies"], 2);
    assert_eq!(body["trial_companies"], 1);

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/superadmin/subscriptions/{}/cancel", tenant.company_id),
        admin,
        Some(json!({"reason": "Requested"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["status"], "canceled");

    let (status, _) = send(&app, Method::GET, "/api/clients", Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_plan_limit_applies_to_every_activation() {
    let app = setup().await;
    let tenant = basic_tenant(&app, "Solo", "owner@solo.test").await;
    let token = Some(tenant.token.as_str());
    let professional = |name: &str, active: bool| {
        json!({"name": name, "role": "Barbeiro", "active": active})
    };

    let (status, body) = send(&app, Method::POST, "/api/professionals", token, Some(professional("Ana", true))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let first_id = body["professional"]["id"].as_i64().unwrap();

    let (status, body) = send(&app, Method::POST, "/api/professionals", token, Some(professional("Bruno", true))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    // 停用状态的专业人员不占名额
    let (status, body) = send(&app, Method::POST, "/api/professionals", token, Some(professional("Caio", false))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let inactive_id = body["professional"]["id"].as_i64().unwrap();

    let toggle = format!("/api/professionals/{}/toggle-status", inactive_id);
    let (status, _) = send(&app, Method::POST, &toggle, token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/professionals/{}", inactive_id),
        token,
        Some(professional("Caio", true)),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, body) = send(&app, Method::GET, "/api/professionals", token, None).await;
    let active: Vec<&Value> = body["professionals"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|p| p["active"] == true)
        .collect();
    assert_eq!(active.len(), 1);

    // 腾出名额后可以启用
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/professionals/{}/toggle-status", first_id),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::POST, &toggle, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["professional"]["active"], true);
}

#[tokio::test]
async fn test_delete_refused_when_appointments_exist() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "History", "owner@history.test").await;
    let token = Some(tenant.token.as_str());
    let ids = seed_schedule(&app, &tenant.token).await;
    let client_id = create_client(&app, &tenant.token, "Rita").await;
    let appointment_id = book_tomorrow(&app, &tenant.token, &ids, client_id, "11:00").await;

    let professional_uri = format!("/api/professionals/{}", ids.professional_id);
    let service_uri = format!("/api/services/{}", ids.service_id);

    let (status, _) = send(&app, Method::DELETE, &professional_uri, token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::DELETE, &service_uri, token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 取消后仍有历史记录
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/appointments/{}/status", appointment_id),
        token,
        Some(json!({"status": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::DELETE, &professional_uri, token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("history"));
    let (status, _) = send(&app, Method::DELETE, &service_uri, token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, &professional_uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_service_crud_and_validation() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Catalog", "owner@catalog.test").await;
    let token = Some(tenant.token.as_str());

    for invalid in [
        json!({"name": "Corte", "price": -1.0, "duration": 30}),
        json!({"name": "Corte", "price": 10.0, "duration": 0}),
        json!({"name": "  ", "price": 10.0, "duration": 30}),
    ] {
        let (status, _) = send(&app, Method::POST, "/api/services", token, Some(invalid)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/services",
        token,
        Some(json!({"name": "Escova", "price": 40.0, "duration": 45})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let uri = format!("/api/services/{}", body["service"]["id"].as_i64().unwrap());

    let (status, body) = send(&app, Method::GET, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"]["name"], "Escova");
    assert_eq!(body["service"]["duration"], 45);

    let (status, _) = send(
        &app,
        Method::PUT,
        &uri,
        token,
        Some(json!({"name": "Escova", "price": -5.0, "duration": 45})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::PUT,
        &uri,
        token,
        Some(json!({"name": "Escova longa", "price": 60.0, "duration": 60})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["service"]["price"], 60.0);
    assert_eq!(body["service"]["name"], "Escova longa");

    let (status, body) = send(&app, Method::POST, &format!("{}/toggle-status", uri), token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"]["active"], false);

    let (status, _) = send(&app, Method::DELETE, &uri, token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, &uri, token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_subscription_cancel_reactivate_and_change_plan() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Plans", "owner@plans.test").await;
    let token = Some(tenant.token.as_str());

    let (status, body) = send(&app, Method::POST, "/api/subscriptions/cancel", token, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["subscription"]["cancel_at_period_end"], true);
    assert_eq!(body["subscription"]["is_canceled_but_active"], true);

    let (status, _) = send(&app, Method::POST, "/api/subscriptions/cancel", token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 周期末之前仍可使用
    let (status, _) = send(&app, Method::GET, "/api/clients", token, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, "/api/subscriptions/reactivate", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscription"]["cancel_at_period_end"], false);
    let (status, _) = send(&app, Method::POST, "/api/subscriptions/reactivate", token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let change = |plan: &str| Some(json!({ "plan": plan }));
    let (status, body) = send(&app, Method::POST, "/api/subscriptions/change-plan", token, change("enterprise")).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["subscription"]["plan"], "enterprise");
    assert_eq!(body["subscription"]["status"], "trialing");

    let (status, _) = send(&app, Method::POST, "/api/subscriptions/change-plan", token, change("enterprise")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&app, Method::POST, "/api/subscriptions/change-plan", token, change("gold")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 没有有效订阅的商户不能改套餐
    let other = register(&app, "No Plan", "owner@noplan.test").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/subscriptions/change-plan",
        Some(&other.token),
        change("pro"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_calendar_and_financial_report() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Reports", "owner@reports.test").await;
    let token = Some(tenant.token.as_str());
    let ids = seed_schedule(&app, &tenant.token).await;
    let client_id = create_client(&app, &tenant.token, "Lia").await;
    let done = book_tomorrow(&app, &tenant.token, &ids, client_id, "09:00").await;
    let dropped = book_tomorrow(&app, &tenant.token, &ids, client_id, "10:00").await;
    let date = tomorrow();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/appointments/{}/complete", done),
        token,
        Some(json!({"custom_price": 70.0, "payment_method": "pix"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["appointment"]["status"], "completed");
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/appointments/{}/status", dropped),
        token,
        Some(json!({"status": "cancelled"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/api/appointments/calendar", token, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/appointments/calendar?start_date={0}&end_date={0}", date),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["start"], format!("{}T09:00:00", date));
    assert_eq!(events[0]["title"], "Corte - Lia");
    assert_eq!(events[1]["backgroundColor"], "#9CA3AF");

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/appointments/financial-report?start_date={0}&end_date={0}", date),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total_appointments"], 1);
    assert_eq!(body["total_revenue"], 70.0);
    assert_eq!(body["by_payment_method"][0]["name"], "pix");
    assert_eq!(body["by_professional"][0]["name"], "Bia");

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/appointments/financial-report?start_date=2026-02-10&end_date=2026-02-01",
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_webhook_can_be_retried() {
    let app = setup().await;
    let tenant = register(&app, "Retry", "owner@retry.test").await;
    let mut event = json!({
        "id": "evt_retry",
        "type": "checkout.completed",
        "company_id": tenant.company_id
    });

    let (status, body) = webhook(&app, WEBHOOK_SECRET, event.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    event["plan"] = json!("pro");
    let (status, ack) = webhook(&app, WEBHOOK_SECRET, event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["duplicate"], false);

    let (_, body) = send(
        &app,
        Method::GET,
        "/api/subscriptions/status",
        Some(&tenant.token),
        None,
    )
    .await;
    assert_eq!(body["subscription"]["status"], "trialing");

    let (_, ack) = webhook(&app, WEBHOOK_SECRET, event).await;
    assert_eq!(ack["duplicate"], true);

    let (status, _) = webhook(
        &app,
        WEBHOOK_SECRET,
        json!({"id": "evt_unknown", "type": "customer.updated", "company_id": tenant.company_id}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rejected_public_booking_leaves_no_client() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Busy", "owner@busy.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;
    let uri = format!("/api/public/business/{}/appointments", tenant.slug);
    let request = |name: &str, phone: &str| {
        json!({
            "service_id": ids.service_id,
            "professional_id": ids.professional_id,
            "date": tomorrow(),
            "start_time": "14:00",
            "client_name": name,
            "client_phone": phone
        })
    };

    let (status, _) = send(&app, Method::POST, &uri, None, Some(request("Carla", "11 97777-6666"))).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, Method::POST, &uri, None, Some(request("Davi", "11 95555-4444"))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = send(&app, Method::GET, "/api/clients", Some(&tenant.token), None).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["clients"][0]["name"], "Carla");
}

#[tokio::test]
async fn test_booking_awaits_client_confirmation() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Confirm Place", "owner@confirm.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/auth/business",
        Some(&tenant.token),
        Some(json!({"business_name": "Confirm Place", "require_confirmation": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let base = format!("/api/public/business/{}", tenant.slug);
    let request = json!({
        "service_id": ids.service_id,
        "professional_id": ids.professional_id,
        "date": tomorrow(),
        "start_time": "15:00",
        "client_name": "Elisa",
        "client_phone": "11 93333-2222"
    });
    let (status, body) = send(&app, Method::POST, &format!("{}/appointments", base), None, Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["appointment"]["status"], "pending");
    assert_eq!(body["appointment"]["can_cancel"], true);
    assert_eq!(body["message"], "Booking received, awaiting confirmation");
    let code = body["booking_code"].as_str().unwrap().to_string();
    let confirmation = body["confirmation_token"].as_str().unwrap().to_string();

    // 待确认的预约已占用时段
    let (status, _) = send(&app, Method::POST, &format!("{}/appointments", base), None, Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, Method::POST, "/api/public/appointments/confirm/not-a-token", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let confirm_uri = format!("/api/public/appointments/confirm/{}", confirmation);
    let (status, body) = send(&app, Method::POST, &confirm_uri, None, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["appointment"]["status"], "scheduled");
    assert_eq!(body["appointment"]["booking_code"], code.as_str());

    // 令牌只能使用一次
    let (status, _) = send(&app, Method::POST, &confirm_uri, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, Method::GET, &format!("/api/public/appointments/{}", code), None, None).await;
    assert_eq!(body["appointment"]["status"], "scheduled");
}

#[tokio::test]
async fn test_pending_booking_can_be_cancelled_by_client() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Pending Place", "owner@pendingplace.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;
    send(
        &app,
        Method::PUT,
        "/api/auth/business",
        Some(&tenant.token),
        Some(json!({"business_name": "Pending Place", "require_confirmation": true})),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/public/business/{}/appointments", tenant.slug),
        None,
        Some(json!({
            "service_id": ids.service_id,
            "professional_id": ids.professional_id,
            "date": tomorrow(),
            "start_time": "16:00",
            "client_name": "Fabi",
            "client_phone": "11 92222-1111"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let code = body["booking_code"].as_str().unwrap().to_string();
    let confirmation = body["confirmation_token"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/public/appointments/{}/cancel", code),
        None,
        Some(json!({"phone": "11922221111"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["appointment"]["status"], "cancelled");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/public/appointments/confirm/{}", confirmation),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_portal_lists_own_appointments_clients_and_stats() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Portal Data", "owner@portaldata.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;
    let pro_token = portal_login(&app, &tenant.token, ids.professional_id, "bia@salon.test").await;
    let pro = Some(pro_token.as_str());

    let regular = create_client(&app, &tenant.token, "Gabi").await;
    let stranger = create_client(&app, &tenant.token, "Hugo").await;
    book_tomorrow(&app, &tenant.token, &ids, regular, "09:00").await;
    book_tomorrow(&app, &tenant.token, &ids, regular, "13:00").await;

    let (status, body) = send(&app, Method::GET, "/api/professional/appointments?per_page=1", pro, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["appointments"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::GET, "/api/professional/appointments?status=bogus", pro, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/professional/clients", pro, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["clients"][0]["name"], "Gabi");
    assert_eq!(body["clients"][0]["appointment_count"], 2);
    assert_eq!(body["clients"][0]["last_appointment"], tomorrow());

    let (status, body) = send(&app, Method::GET, &format!("/api/professional/clients/{}", regular), pro, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointments"].as_array().unwrap().len(), 2);
    assert_eq!(body["appointments"][0]["start_time"], "13:00");

    let (status, _) = send(&app, Method::GET, &format!("/api/professional/clients/{}", stranger), pro, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/professional/stats?start_date={0}&end_date={0}", tomorrow()),
        pro,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total_appointments"], 2);
    assert_eq!(body["completed"], 0);
    assert_eq!(body["revenue"], 0.0);
}

#[tokio::test]
async fn test_portal_token_revoked_by_deactivation_or_suspension() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Revoke", "owner@revoke.test").await;
    let ids = seed_schedule(&app, &tenant.token).await;
    let pro_token = portal_login(&app, &tenant.token, ids.professional_id, "bia@salon.test").await;
    let pro = Some(pro_token.as_str());
    let toggle = format!("/api/professionals/{}/toggle-status", ids.professional_id);

    let (status, _) = send(&app, Method::GET, "/api/professional/dashboard", pro, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::POST, &toggle, Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, Method::GET, "/api/professional/dashboard", pro, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let (status, _) = send(&app, Method::POST, &toggle, Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/professional/working-hours", pro, None).await;
    assert_eq!(status, StatusCode::OK);

    let admin_token = superadmin_token(&app).await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/superadmin/companies/{}/suspend", tenant.company_id),
        Some(&admin_token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/professional/schedule", pro, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_portal_email_stays_unique_after_activation() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Emails", "owner@emails.test").await;
    let token = Some(tenant.token.as_str());
    let ids = seed_schedule(&app, &tenant.token).await;
    portal_login(&app, &tenant.token, ids.professional_id, "bia@salon.test").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/professionals",
        token,
        Some(json!({"name": "Caio", "role": "Barbeiro", "email": "caio@salon.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let caio = body["professional"]["id"].as_i64().unwrap();
    portal_login(&app, &tenant.token, caio, "caio@salon.test").await;

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/professionals/{}", caio),
        token,
        Some(json!({"name": "Caio", "role": "Barbeiro", "email": "BIA@salon.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 保留自己的邮箱不算冲突
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/professionals/{}", caio),
        token,
        Some(json!({"name": "Caio Lima", "role": "Barbeiro", "email": "caio@salon.test"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/professional-auth/login",
        None,
        Some(json!({"email": "bia@salon.test", "password": "portal-pass"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["professional"]["name"], "Bia");
}

#[tokio::test]
async fn test_notes_edit_survives_deactivated_professional() {
    let app = setup().await;
    let tenant = subscribed_tenant(&app, "Notes", "owner@notes.test").await;
    let token = Some(tenant.token.as_str());
    let ids = seed_schedule(&app, &tenant.token).await;
    let client_id = create_client(&app, &tenant.token, "Iris").await;
    let appointment_id = book_tomorrow(&app, &tenant.token, &ids, client_id, "09:00").await;
    let uri = format!("/api/appointments/{}", appointment_id);

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/professionals/{}/toggle-status", ids.professional_id),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::PUT, &uri, token, Some(json!({"notes": "Trazer referência"}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["appointment"]["notes"], "Trazer referência");
    assert_eq!(body["appointment"]["start_time"], "09:00");

    // 改期仍要求专业人员在岗
    let (status, _) = send(&app, Method::PUT, &uri, token, Some(json!({"start_time": "10:00"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_past_due_tenant_keeps_access_during_grace_period() {
    let app = setup().await;
    let tenant = basic_tenant(&app, "Late Payer", "owner@late.test").await;
    let token = Some(tenant.token.as_str());

    let (status, _) = webhook(
        &app,
        WEBHOOK_SECRET,
        json!({"id": "evt_failed", "type": "invoice.payment_failed", "company_id": tenant.company_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, "/api/subscriptions/status", token, None).await;
    assert_eq!(body["subscription"]["status"], "past_due");
    assert_eq!(body["subscription"]["is_past_due"], true);
    assert_eq!(body["subscription"]["has_active_subscription"], false);

    // 计费周期加宽限期内后台与公开页仍可用
    let (status, _) = send(&app, Method::GET, "/api/clients", token, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/public/business/{}", tenant.slug),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = webhook(
        &app,
        WEBHOOK_SECRET,
        json!({"id": "evt_deleted", "type": "subscription.deleted", "company_id": tenant.company_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/api/clients", token, None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
}

#[tokio::test]
async fn test_superadmin_payments_and_company_management() {
    let app = setup().await;
    let tenant = basic_tenant(&app, "Billing Co", "owner@billing.test").await;
    for (id, kind, amount) in [
        ("evt_paid", "invoice.paid", Some(35.5)),
        ("evt_fail", "invoice.payment_failed", None),
    ] {
        let (status, body) = webhook(
            &app,
            WEBHOOK_SECRET,
            json!({"id": id, "type": kind, "company_id": tenant.company_id, "amount": amount}),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
    }
    let admin_token = superadmin_token(&app).await;
    let admin = Some(admin_token.as_str());

    let (status, body) = send(&app, Method::GET, "/api/superadmin/payments", admin, None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["payments"][0]["business_name"], "Billing Co");

    let (_, body) = send(&app, Method::GET, "/api/superadmin/payments?status=failed", admin, None).await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["payments"][0]["amount"], 29.0);
    let (status, _) = send(&app, Method::GET, "/api/superadmin/payments?status=refunded", admin, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/api/superadmin/payments/stats", admin, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_payments"], 2);
    assert_eq!(body["failed_payments"], 1);
    assert_eq!(body["total_revenue"], 64.5);
    assert_eq!(body["last_30_days"]["count"], 2);

    let (status, _) = send(&app, Method::GET, "/api/superadmin/payments", Some(&tenant.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/api/superadmin/subscriptions/{}", tenant.company_id),
        admin,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["subscription"]["business_name"], "Billing Co");
    assert_eq!(body["subscription"]["subscription"]["status"], "past_due");
    assert_eq!(body["payments"].as_array().unwrap().len(), 3);
    let (status, _) = send(&app, Method::GET, "/api/superadmin/subscriptions/9999", admin, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let company_uri = format!("/api/superadmin/companies/{}", tenant.company_id);
    let (status, _) = send(&app, Method::PUT, &company_uri, admin, Some(json!({"business_name": "x"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::PUT,
        &company_uri,
        admin,
        Some(json!({"business_name": "Billing Company", "booking_enabled": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["company"]["business_name"], "Billing Company");
    assert_eq!(body["company"]["slug"], tenant.slug.as_str());

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/public/business/{}", tenant.slug),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
