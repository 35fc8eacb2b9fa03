//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::config::Config;
use api::{AppState, DemoServices};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{OrderId, UserId, VariantId};
use domain::OrderStatus;
use metrics_exporter_prometheus::PrometheusHandle;
use order_saga::HmacPaymentGateway;
use order_store::OrderStore;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> (axum::Router, Arc<AppState>, DemoServices) {
    let config = Config::default();
    let (state, demo) = api::create_default_state(&config).unwrap();
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state, demo)
}

fn gateway() -> HmacPaymentGateway {
    HmacPaymentGateway::new(Config::default().payment_gateway_config().unwrap())
}

fn place_request(user: &str, items: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(
            serde_json::to_string(&json!({
                "items": items,
                "shipping_address": {
                    "receiver_name": "Li Lei",
                    "phone": "13800000000",
                    "province": "Zhejiang",
                    "city": "Hangzhou",
                    "district": "Xihu",
                    "detail": "1 Wensan Road"
                }
            }))
            .unwrap(),
        ))
        .unwrap()
}

fn get_request(uri: &str, user: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-user-id", user)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn place_two_phones(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(place_request(
            "42",
            json!([{ "variant_id": 1001, "quantity": 2 }]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["order_id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "order-service");
}

#[tokio::test]
async fn test_place_and_get_order() {
    let (app, _, demo) = setup();
    demo.cart
        .add_to_cart(UserId::new(42), &[VariantId::new(1001), VariantId::new(2001)]);

    let response = app
        .clone()
        .oneshot(place_request(
            "42",
            json!([{ "variant_id": 1001, "quantity": 2 }]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    assert_eq!(json["total_amount"], 1_799_800);
    assert_eq!(json["payment_amount"], 1_799_800);
    assert_eq!(json["status"], "AwaitingPayment");
    assert_eq!(json["cart_cleared"], true);
    let order_id = json["order_id"].as_str().unwrap().to_string();

    assert_eq!(demo.cart.cart_items(UserId::new(42)), vec![VariantId::new(2001)]);

    let response = app
        .oneshot(get_request(&format!("/orders/{order_id}"), "42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["order_id"], order_id);
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["items"][0]["unit_price"], 899_900);
    assert_eq!(json["items"][0]["subtotal"], 1_799_800);
    assert_eq!(json["items"][0]["title"], "Phone 256GB Black");
    assert_eq!(json["shipping_address"]["city"], "Hangzhou");
}

#[tokio::test]
async fn test_place_order_requires_user_header() {
    let (app, _, _) = setup();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({
                        "items": [{ "variant_id": 1001, "quantity": 1 }],
                        "shipping_address": {
                            "receiver_name": "Li Lei", "phone": "1", "province": "p",
                            "city": "c", "district": "d", "detail": "x"
                        }
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_validation_and_availability_errors() {
    let (app, _, demo) = setup();

    let response = app
        .clone()
        .oneshot(place_request("42", json!([])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(place_request(
            "42",
            json!([{ "variant_id": 1001, "quantity": 200 }]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("1001"));

    let response = app
        .oneshot(place_request(
            "42",
            json!([{ "variant_id": 9999, "quantity": 1 }]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    assert_eq!(demo.store.order_count().await, 0);
    assert_eq!(demo.inventory.reserve_calls(), 0);
}

#[tokio::test]
async fn test_reservation_failure_is_503_with_reference() {
    let (app, _, demo) = setup();
    demo.inventory.set_fail_on_reserve(true);

    let response = app
        .oneshot(place_request(
            "42",
            json!([{ "variant_id": 1001, "quantity": 1 }]),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    let message = json["error"].as_str().unwrap();
    assert!(message.contains("ref"));
    assert!(!message.contains("Inventory locked"));
    assert_eq!(demo.store.order_count().await, 0);
}

#[tokio::test]
async fn test_get_order_of_other_user_is_not_found() {
    let (app, _, _) = setup();
    let order_id = place_two_phones(&app).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}"), "7"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(get_request("/orders/not-a-number", "42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payment_url_and_notification_flow() {
    let (app, state, _) = setup();
    let order_id = place_two_phones(&app).await;

    let response = app
        .clone()
        .oneshot(get_request(&format!("/orders/{order_id}/payment-url"), "42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let url = json["payment_url"].as_str().unwrap();
    assert!(url.starts_with("https://pay.example.com/gateway?"));
    assert!(url.contains(&format!("out_trade_no={order_id}")));
    assert!(url.contains("total_amount=17998.00"));

    let payload = gateway()
        .sign_payload(&[
            ("app_id", "dev-app"),
            ("out_trade_no", order_id.as_str()),
            ("trade_status", "TRADE_SUCCESS"),
            ("total_amount", "17998.00"),
        ])
        .unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/payments/notify")
                    .header("content-type", "application/x-www-form-urlencoded")
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"success");
    }

    let detail = state
        .orchestrator
        .get_order(UserId::new(42), order_id.parse::<OrderId>().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::AwaitingShipment);

    let response = app
        .oneshot(get_request(&format!("/orders/{order_id}/payment-url"), "42"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_tampered_notification_is_rejected() {
    let (app, _, demo) = setup();
    let order_id = place_two_phones(&app).await;

    let payload = gateway()
        .sign_payload(&[
            ("out_trade_no", order_id.as_str()),
            ("trade_status", "WAIT_BUYER_PAY"),
        ])
        .unwrap()
        .replace("WAIT_BUYER_PAY", "TRADE_SUCCESS");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/payments/notify")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let order = demo
        .store
        .get_order(order_id.parse::<OrderId>().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingPayment);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _, _) = setup();
    place_two_phones(&app).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("orders_placed_total"));
}
