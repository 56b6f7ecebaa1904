use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use proxy_accounts::{Account, AccountPool, Credentials, ProjectCache, ThinkingSignatureCache, TokenCache};
use proxy_dispatch::DispatchContext;
use proxy_server::{AppState, ProxyConfig};
use tower::ServiceExt;

fn config(auth_token: Option<&str>) -> ProxyConfig {
    ProxyConfig {
        port: 0,
        accounts_path: "unused.json".into(),
        fallback_enabled: true,
        default_cooldown_ms: 10_000,
        max_accounts: 10,
        max_wait_before_error_ms: 120_000,
        max_retries: 5,
        max_empty_response_retries: 2,
        gemini_max_output_tokens: 16_384,
        thinking_signature_ttl: std::time::Duration::from_secs(7_200),
        auth_token: auth_token.map(str::to_string),
    }
}

fn state(auth_token: Option<&str>) -> AppState {
    let http = reqwest::Client::new();
    let account = Account::new(
        "a@example.com",
        Credentials { refresh_token: "rt".into(), client_id: "id".into(), client_secret: "secret".into() },
    );
    let signatures = ThinkingSignatureCache::new(std::time::Duration::from_secs(7_200));
    let dispatch = DispatchContext {
        pool: AccountPool::from_accounts(vec![account], 10),
        tokens: TokenCache::new(http.clone(), "https://oauth2.googleapis.com/token"),
        projects: ProjectCache::new(http.clone(), "https://cloudcode-pa.googleapis.com/v1internal:loadCodeAssist"),
        http,
        signatures: signatures.clone(),
        ..DispatchContext::default()
    };
    AppState { dispatch, signatures, config: Arc::new(config(auth_token)) }
}

#[tokio::test]
async fn health_is_reachable_without_authentication() {
    let app = proxy_server::rest::router(state(Some("secret-token")));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["pool_size"], 1);
}

#[tokio::test]
async fn messages_without_bearer_token_is_rejected() {
    let app = proxy_server::rest::router(state(Some("secret-token")));

    let request = Request::builder()
        .method("POST")
        .uri("/v1/messages")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn models_with_correct_bearer_token_is_allowed_through_auth() {
    let app = proxy_server::rest::router(state(Some("secret-token")));

    let request = Request::builder()
        .uri("/v1/models")
        .header(header::AUTHORIZATION, "Bearer secret-token")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["data"].as_array().unwrap().iter().any(|m| m["id"] == "gemini-3-pro"));
}

#[tokio::test]
async fn auth_is_bypassed_entirely_when_no_token_is_configured() {
    let app = proxy_server::rest::router(state(None));

    let request = Request::builder().uri("/v1/models").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
