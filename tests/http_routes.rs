mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{date, Harness};
use flat_lease_billing::billing::routes::ROLE_HEADER;
use flat_lease_billing::config::{AppConfig, EnergyBillingMode};
use flat_lease_billing::{app, AppState};

fn test_config() -> AppConfig {
    AppConfig {
        app_name: "Flat Lease Billing".to_string(),
        environment: "test".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: None,
        db_pool_max_connections: 1,
        energy_billing_mode: EnergyBillingMode::Metered,
        pix_key: "flat@example.com".to_string(),
        pix_merchant_name: "Flat Fersa".to_string(),
        pix_merchant_city: "Sao Paulo".to_string(),
        admin_email: Some(common::ADMIN_EMAIL.to_string()),
        scheduler_enabled: false,
        daily_jobs_hour_utc: 3,
        pix_cache_ttl_seconds: 60,
        pix_cache_max_entries: 10,
    }
}

fn test_app(h: &Harness) -> Router {
    app(AppState::new(test_config(), h.ctx.clone()))
}

fn request(method: &str, uri: &str, role: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(role) = role {
        builder = builder.header(ROLE_HEADER, role);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let h = Harness::on(date(2024, 1, 2));
    let app = test_app(&h);

    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["energy_billing"], "metered");
}

#[tokio::test]
async fn test_role_header_required() {
    let h = Harness::on(date(2024, 1, 2));
    let app = test_app(&h);
    let uri = format!("/contracts/{}", Uuid::new_v4());

    let (status, body) = send(&app, request("GET", &uri, None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_type"], "forbidden");

    let (status, _) = send(&app, request("GET", &uri, Some("landlord"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_tenant_cannot_use_admin_routes() {
    let h = Harness::on(date(2024, 1, 2));
    let detail = h.active_contract(date(2024, 1, 10), 6, 10).await;
    let app = test_app(&h);

    let uri = format!("/installments/{}/force-paid", detail.installments[1].id);
    let (status, _) = send(&app, request("POST", &uri, Some("tenant"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, request("POST", "/jobs/daily", Some("tenant"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let after = h.installment(detail.installments[1].id).await;
    assert_eq!(after.paid_at, None);
}

#[tokio::test]
async fn test_solicit_then_approve() {
    let h = Harness::on(date(2024, 1, 2));
    let apartment = h.apartment("101").await;
    let client = h.client("Ana").await;
    let app = test_app(&h);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/contracts/solicit",
            Some("tenant"),
            Some(json!({
                "client_id": client.id,
                "apartment_id": apartment.id,
                "term_months": 6,
                "due_day": 10,
                "start_date": "2024-01-10",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "AWAITING_APPROVAL");
    let contract_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/contracts/{}/approve", contract_id),
            Some("admin"),
            Some(json!({
                "rent_amount": "1000.00",
                "adjustment_period_months": 12,
                "initial_meter_reading": "120",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contract"]["status"], "ACTIVE");
    assert_eq!(body["contract"]["rent_amount"], "1000.00");
    let installments = body["installments"].as_array().unwrap();
    assert_eq!(installments.len(), 7);
    assert_eq!(installments[0]["kind"], "DEPOSIT");
    assert_eq!(installments[0]["due_date"], "2024-01-13");

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/contracts/{}/approve", contract_id),
            Some("admin"),
            Some(json!({ "rent_amount": "1000.00" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_type"], "conflict");
}

#[tokio::test]
async fn test_admin_create_and_payment_flow() {
    let h = Harness::on(date(2024, 1, 2));
    let apartment = h.apartment("202").await;
    let client = h.client("Bia").await;
    let app = test_app(&h);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/contracts",
            Some("admin"),
            Some(json!({
                "client_id": client.id,
                "apartment_id": apartment.id,
                "term_months": 6,
                "due_day": 10,
                "start_date": "2024-01-10",
                "rent_amount": "1000.00",
                "initial_meter_reading": "120",
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let february = body["installments"][1]["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/installments/{}/meter-reading", february),
            Some("admin"),
            Some(json!({ "reading": "150" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["energy_surcharge"], "22.50");
    assert_eq!(body["total"], "1022.50");

    let (status, body) = send(
        &app,
        request("GET", &format!("/installments/{}/pix", february), Some("tenant"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["payload"].as_str().unwrap().contains("54071022.50"));

    let (status, body) = send(
        &app,
        request(
            "POST",
            &format!("/installments/{}/payment", february),
            Some("tenant"),
            Some(json!({ "evidence_ref": "docs/feb.pdf" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "AWAITING_CONFIRMATION");

    let (status, body) = send(
        &app,
        request("POST", &format!("/installments/{}/confirm", february), Some("admin"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PAID");
}

#[tokio::test]
async fn test_error_bodies() {
    let h = Harness::on(date(2024, 1, 2));
    let app = test_app(&h);

    let (status, body) = send(
        &app,
        request("GET", &format!("/contracts/{}", Uuid::new_v4()), Some("admin"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_type"], "not_found");

    let (status, body) = send(
        &app,
        request("GET", "/reports/reference-month/13", Some("admin"), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "invalid_argument");
}

#[tokio::test]
async fn test_daily_jobs_endpoint() {
    let h = Harness::on(date(2024, 1, 2));
    h.active_contract(date(2024, 1, 10), 6, 10).await;
    h.at(date(2024, 1, 20));
    let app = test_app(&h);

    let (status, body) = send(&app, request("POST", "/jobs/daily", Some("admin"), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overdue"]["updated"], 1);
    assert_eq!(body["penalties"]["updated"], 0);
}
