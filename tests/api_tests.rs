// HTTP API tests driven through the router with tower's oneshot

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use hookrelay::api::{router, AppState};
use hookrelay::config::RateLimitConfig;
use hookrelay::rate_limit::RegistrationLimiter;
use hookrelay::webhooks::{
    DeliveryFailure, DeliveryTransport, OutboundRequest, RetryConfig, WebhookService,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<OutboundRequest>>,
}

#[async_trait]
impl DeliveryTransport for RecordingTransport {
    async fn send(&self, request: &OutboundRequest) -> Result<u16, DeliveryFailure> {
        self.sent.lock().unwrap().push(request.clone());
        Ok(200)
    }
}

fn app_with_limiter(limiter: RegistrationLimiter) -> (Router, WebhookService, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let service = WebhookService::new(
        transport.clone(),
        RetryConfig::new(3, Duration::from_millis(10)),
    );
    let app = router(AppState::new(service.clone(), limiter));
    (app, service, transport)
}

fn app() -> (Router, WebhookService, Arc<RecordingTransport>) {
    app_with_limiter(RegistrationLimiter::disabled())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, value)
}

async fn register(app: &Router, url: &str, events: &[&str]) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/webhooks",
        Some(json!({"url": url, "eventTypes": events, "secret": "s3cr3t"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_register_returns_summary_without_secret() {
    let (app, _, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/webhooks",
        Some(json!({"url": "https://ex.com/hook", "eventTypes": ["order.created"], "secret": "s"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(body["id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(body["url"], "https://ex.com/hook");
    assert_eq!(body["eventTypes"], json!(["order.created"]));
    assert!(body.get("secret").is_none());
}

#[tokio::test]
async fn test_register_accepts_events_alias() {
    let (app, _, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/webhooks",
        Some(json!({"url": "https://ex.com/hook", "events": ["a", "b"], "secret": "s"})),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["eventTypes"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_register_invalid_inputs() {
    let (app, _, _) = app();
    let cases = [
        json!({"eventTypes": ["a"], "secret": "s"}),
        json!({"url": "https://ex.com", "eventTypes": [], "secret": "s"}),
        json!({"url": "https://ex.com", "eventTypes": "a", "secret": "s"}),
        json!({"url": "https://ex.com", "eventTypes": ["a"]}),
        json!({"url": "ftp://ex.com", "eventTypes": ["a"], "secret": "s"}),
    ];

    for case in cases {
        let (status, body) = send(&app, Method::POST, "/api/webhooks", Some(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "case {}", case);
        assert_eq!(body, json!({"error": "Invalid Inputs"}));
    }

    let (_, list) = send(&app, Method::GET, "/api/webhooks", None).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let (app, _, _) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_update_delete_flow() {
    let (app, _, _) = app();
    let first = register(&app, "https://a.example/h", &["order.created"]).await;
    let second = register(&app, "https://b.example/h", &["user.signup"]).await;
    assert_ne!(first, second);

    let (status, list) = send(&app, Method::GET, "/api/webhooks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 2);
    assert!(list.as_array().unwrap().iter().all(|s| s.get("secret").is_none()));

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/api/webhooks/{}", first),
        Some(json!({"url": "https://c.example/h", "eventTypes": ["order.paid"], "secret": "new"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        json!({"id": first, "url": "https://c.example/h", "secret": "new"})
    );

    let (status, _) = send(&app, Method::DELETE, &format!("/api/webhooks/{}", second), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, list) = send(&app, Method::GET, "/api/webhooks", None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["eventTypes"], json!(["order.paid"]));
}

#[tokio::test]
async fn test_unknown_id_is_not_found() {
    let (app, _, _) = app();

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/webhooks/missing",
        Some(json!({"url": "https://ex.com", "eventTypes": ["a"], "secret": "s"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"error": "Webhook not found"}));

    let (status, _) = send(&app, Method::DELETE, "/api/webhooks/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_checks_existence_before_validation() {
    let (app, _, _) = app();
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/webhooks/missing",
        Some(json!({"url": "", "eventTypes": []})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_ingest_and_delivery_log() {
    let (app, service, transport) = app();
    let id = register(&app, "https://ex.com/hook", &["order.created"]).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"eventType": "order.created", "payload": {"id": 1}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"message": "Event processing started"}));

    service.wait_idle().await;
    assert_eq!(transport.sent.lock().unwrap().len(), 1);

    let (status, log) = send(
        &app,
        Method::GET,
        &format!("/api/webhooks/{}/deliveries", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let entries = log.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["status"], "success");
    assert_eq!(entries[0]["statusCode"], 200);
    assert_eq!(entries[0]["eventType"], "order.created");
    assert!(entries[0]["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn test_event_ingest_invalid_inputs() {
    let (app, _, _) = app();
    for body in [
        json!({"payload": {"id": 1}}),
        json!({"eventType": "order.created"}),
        json!({"eventType": "", "payload": {}}),
    ] {
        let (status, response) = send(&app, Method::POST, "/api/events", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response, json!({"error": "Invalid Inputs"}));
    }
}

#[tokio::test]
async fn test_event_without_subscribers_is_accepted() {
    let (app, _, transport) = app();
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"eventType": "nobody.cares", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(transport.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_delivery_log_for_unknown_id_is_empty() {
    let (app, _, _) = app();
    let (status, body) = send(&app, Method::GET, "/api/webhooks/nope/deliveries", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_registration_rate_limit() {
    let limiter = RegistrationLimiter::new(&RateLimitConfig {
        enabled: true,
        registrations_per_window: 5,
        window_secs: 60,
    });
    let (app, _, _) = app_with_limiter(limiter);

    for i in 0..5 {
        register(&app, &format!("https://ex.com/{}", i), &["a"]).await;
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/webhooks",
        Some(json!({"url": "https://ex.com/6", "eventTypes": ["a"], "secret": "s"})),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body, json!({"error": "Too many requests"}));

    // Listing is not limited
    let (status, list) = send(&app, Method::GET, "/api/webhooks", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_registration_reports_remaining_quota() {
    let limiter = RegistrationLimiter::new(&RateLimitConfig {
        enabled: true,
        registrations_per_window: 3,
        window_secs: 60,
    });
    let (limited, _, _) = app_with_limiter(limiter);

    let request = || {
        Request::builder()
            .method(Method::POST)
            .uri("/api/webhooks")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"url": "https://ex.com/h", "eventTypes": ["a"], "secret": "s"}).to_string(),
            ))
            .unwrap()
    };

    let response = limited.clone().oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-ratelimit-limit"], "3");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "2");

    let response = limited.oneshot(request()).await.unwrap();
    assert_eq!(response.headers()["x-ratelimit-remaining"], "1");

    let (unlimited, _, _) = app();
    let response = unlimited.oneshot(request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().get("x-ratelimit-remaining").is_none());
}

#[tokio::test]
async fn test_health_and_metrics() {
    let (app, _, _) = app();
    hookrelay::metrics::init().unwrap();
    register(&app, "https://ex.com/hook", &["a"]).await;

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["subscriptions"], 1);
    assert_eq!(body["activeChains"], 0);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&text).contains("webhook_registered_subscriptions"));
}
