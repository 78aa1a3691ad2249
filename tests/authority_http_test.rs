/*!
 * Integration tests for the HTTP decision authority client
 *
 * A local axum server stands in for the authority so the full request and
 * response contract is exercised over a real socket.
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use cdr_worker::authority::{
    AuthorityError, DecisionAuthority, HttpDecisionAuthority, DECISION_HEADER,
};
use cdr_worker::core::{EscalationVerdict, FileCategory};
use serde_json::{json, Value};

#[derive(Clone)]
struct Scripted {
    status: StatusCode,
    decision: Option<&'static str>,
    body: Value,
    seen: Arc<Mutex<Vec<Value>>>,
}

async fn decide(State(script): State<Scripted>, Json(request): Json<Value>) -> Response {
    script.seen.lock().unwrap().push(request);
    let mut response = (script.status, Json(script.body.clone())).into_response();
    if let Some(decision) = script.decision {
        response
            .headers_mut()
            .insert(DECISION_HEADER, decision.parse().unwrap());
    }
    response
}

/// Serve one scripted answer; returns the base URL and the captured requests
async fn serve(
    status: StatusCode,
    decision: Option<&'static str>,
    body: Value,
) -> (String, Arc<Mutex<Vec<Value>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/api/Decide", post(decide))
        .with_state(Scripted {
            status,
            decision,
            body,
            seen: seen.clone(),
        });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), seen)
}

fn client(base_url: &str) -> HttpDecisionAuthority {
    HttpDecisionAuthority::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_replace_verdict_round_trip() {
    let (url, seen) = serve(
        StatusCode::OK,
        Some("replace"),
        json!({"base64Replacement": "c3Vic3RpdHV0ZQ==", "replacementMimeType": "text/plain"}),
    )
    .await;

    let verdict = client(&url)
        .decide("b3JpZ2luYWw=", &FileCategory::Unknown)
        .await
        .unwrap();

    assert_eq!(
        verdict,
        EscalationVerdict::Replace {
            payload: b"substitute".to_vec(),
            mime_type: Some("text/plain".to_string()),
        }
    );

    let requests = seen.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["Base64Body"], "b3JpZ2luYWw=");
    assert_eq!(requests[0]["DetectedFiletype"], "Unknown");
}

#[tokio::test]
async fn test_relay_verdict_carries_detected_type() {
    let (url, seen) = serve(StatusCode::OK, Some("relay"), json!({})).await;

    let verdict = client(&url)
        .decide("AAEC", &FileCategory::Manageable("Docx".to_string()))
        .await
        .unwrap();

    assert_eq!(verdict, EscalationVerdict::Relay);
    assert_eq!(seen.lock().unwrap()[0]["DetectedFiletype"], "Docx");
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let (url, _) = serve(StatusCode::INTERNAL_SERVER_ERROR, Some("relay"), json!({})).await;

    let result = client(&url).decide("AAEC", &FileCategory::Unknown).await;

    assert!(matches!(result, Err(AuthorityError::Status(500))));
}

#[tokio::test]
async fn test_missing_decision_header_is_rejected() {
    let (url, _) = serve(StatusCode::OK, None, json!({})).await;

    let result = client(&url).decide("AAEC", &FileCategory::Unknown).await;

    assert!(matches!(result, Err(AuthorityError::MissingDecision)));
}

#[tokio::test]
async fn test_unreachable_authority_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let result = client(&format!("http://{}", addr))
        .decide("AAEC", &FileCategory::Unknown)
        .await;

    assert!(matches!(result, Err(AuthorityError::Transport(_))));
}
