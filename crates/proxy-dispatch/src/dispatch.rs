use std::time::Duration;

use proxy_accounts::{AccountPool, ProjectCache, ThinkingSignatureCache, TokenCache};
use proxy_core::types::{CanonicalRequest, CanonicalResponse, ContentBlock, StopReason, Usage};
use proxy_core::{ProxyError, Result};
use proxy_gemini::models::GenerateContentResponse;
use proxy_gemini::{google_to_anthropic, SseAdapter};

use crate::builder::{build, record_signatures};
use crate::endpoints::{fallback_model, is_thinking_capable, ENDPOINTS};

fn default_endpoints() -> Vec<String> {
    ENDPOINTS.iter().map(|s| s.to_string()).collect()
}

const EMPTY_RESPONSE_RETRY_DELAYS_MS: [u64; 2] = [500, 1_000];
const EMPTY_RESPONSE_TEXT: &str = "[No response after retries - please try again]";

/// Shared handles the dispatch engine needs to carry out an attempt loop.
/// Cloned cheaply (every field is an `Arc`-backed handle internally).
#[derive(Clone)]
pub struct DispatchContext {
    pub pool: AccountPool,
    pub tokens: TokenCache,
    pub projects: ProjectCache,
    pub http: reqwest::Client,
    pub max_retries: usize,
    pub default_cooldown_ms: u64,
    pub max_wait_before_error_ms: u64,
    pub signatures: ThinkingSignatureCache,
    /// Upstream hosts tried in order for every attempt. Defaults to
    /// [`ENDPOINTS`]; overridable so tests can point at a local mock server.
    pub endpoints: Vec<String>,
    /// Whether a request may hop to [`fallback_model`] once its own model's
    /// pool is exhausted past `max_wait_before_error_ms`.
    pub fallback_enabled: bool,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            pool: AccountPool::from_accounts(Vec::new(), 10),
            tokens: TokenCache::new(reqwest::Client::new(), crate::endpoints::OAUTH_TOKEN_URL),
            projects: ProjectCache::new(reqwest::Client::new(), crate::endpoints::PROJECT_DISCOVERY_URL),
            http: reqwest::Client::new(),
            max_retries: 5,
            default_cooldown_ms: 10_000,
            max_wait_before_error_ms: 120_000,
            signatures: ThinkingSignatureCache::new(Duration::from_secs(7_200)),
            endpoints: default_endpoints(),
            fallback_enabled: true,
        }
    }
}

struct Attempt429 {
    reset_ms: u64,
}

impl DispatchContext {
    fn parse_retry_after(&self, response: &reqwest::Response) -> u64 {
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs * 1_000)
            .unwrap_or(self.default_cooldown_ms)
    }

    fn attempt_budget(&self) -> usize {
        self.max_retries.max(self.pool.total_count() + 1)
    }

    /// Non-streaming dispatch: returns a complete canonical response.
    pub async fn send(&self, req: CanonicalRequest) -> Result<CanonicalResponse> {
        self.run(req, self.fallback_enabled).await
    }

    /// Boxed because a fallback-model hop recurses into `run` once; a plain
    /// `async fn` cannot express a self-referential future size here.
    fn run(
        &self,
        mut req: CanonicalRequest,
        allow_fallback: bool,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<CanonicalResponse>> + Send + '_>> {
        Box::pin(async move {
        let model = req.model.clone();
        let attempts = self.attempt_budget();

        for attempt in 0..attempts {
            let span = tracing::info_span!("dispatch_attempt", model = %model, attempt);
            let _enter = span.enter();

            self.pool.clear_expired();

            if self.pool.available_for(&model).is_empty() {
                if self.pool.all_limited(&model) {
                    let wait_ms = self.pool.min_wait_ms(&model);
                    if wait_ms > self.max_wait_before_error_ms {
                        if allow_fallback {
                            if let Some(fallback) = fallback_model(&model) {
                                tracing::debug!(fallback, "all accounts exhausted, hopping to fallback model");
                                req.model = fallback.to_string();
                                return self.run(req, false).await;
                            }
                        }
                        return Err(ProxyError::QuotaExhausted { reset_ms: wait_ms });
                    }
                    tokio::time::sleep(Duration::from_millis(wait_ms + 500)).await;
                    continue;
                }
                return Err(ProxyError::NoAccountsAvailable { model: model.clone() });
            }

            let account = match self.pool.sticky(&model) {
                Some(account) => account,
                None => match self.pool.pick_next(&model) {
                    Some(account) => account,
                    None => continue,
                },
            };
            tracing::debug!(account = %account.email, "selected account");

            let token = match self.tokens.token_for(&account).await {
                Ok(token) => token,
                Err(ProxyError::AuthInvalid) => {
                    self.tokens.invalidate(&account.email);
                    self.projects.invalidate(&account.email);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let project = self.projects.project_for(&account, &token).await?;

            match self.run_endpoints(&req, &account.email, &project, &token).await {
                Ok(EndpointOutcome::Response(response)) => return Ok(response),
                Ok(EndpointOutcome::EmptyAfterRetries) => {
                    return Ok(CanonicalResponse {
                        content: vec![ContentBlock::text(EMPTY_RESPONSE_TEXT)],
                        stop_reason: StopReason::EndTurn,
                        usage: Usage::default(),
                    });
                }
                Ok(EndpointOutcome::RetryAttempt) => continue,
                Ok(EndpointOutcome::RateLimitedLong(Attempt429 { reset_ms })) => {
                    self.pool.mark_limited(&account.email, reset_ms, &model);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }

        Err(ProxyError::MaxRetriesExceeded)
        })
    }

    /// Streaming dispatch: yields canonical streaming events. Once the first
    /// event has been sent through `sink`, no further retry is attempted for
    /// this request — any subsequent failure becomes a terminal error event.
    ///
    /// `sink` is async so a bounded channel send can be used directly as
    /// backpressure: a slow consumer stalls the upstream read loop instead of
    /// buffering the whole response in memory.
    ///
    /// A terminal stream with no content blocks and no output tokens is
    /// retried against the same endpoint (same schedule as the non-streaming
    /// path) before anything reaches `sink`, trading the first batch's
    /// latency for the same empty-response guard the one-shot path has.
    pub async fn send_stream<F, Fut>(&self, req: CanonicalRequest, mut sink: F) -> Result<()>
    where
        F: FnMut(proxy_core::StreamEvent) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let model = req.model.clone();
        let attempts = self.attempt_budget();
        let mut emitted = false;

        'attempts: for _attempt in 0..attempts {
            self.pool.clear_expired();

            if self.pool.available_for(&model).is_empty() {
                if self.pool.all_limited(&model) {
                    let wait_ms = self.pool.min_wait_ms(&model);
                    if wait_ms > self.max_wait_before_error_ms {
                        return Err(ProxyError::QuotaExhausted { reset_ms: wait_ms });
                    }
                    tokio::time::sleep(Duration::from_millis(wait_ms + 500)).await;
                    continue;
                }
                return Err(ProxyError::NoAccountsAvailable { model: model.clone() });
            }

            let account = match self.pool.sticky(&model).or_else(|| self.pool.pick_next(&model)) {
                Some(account) => account,
                None => continue,
            };

            let token = match self.tokens.token_for(&account).await {
                Ok(token) => token,
                Err(ProxyError::AuthInvalid) => {
                    self.tokens.invalidate(&account.email);
                    self.projects.invalidate(&account.email);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let project = self.projects.project_for(&account, &token).await?;
            let built = build(&req, &project, &token, true, &self.signatures);

            for endpoint in &self.endpoints {
                let url = format!("{endpoint}/v1internal:streamGenerateContent?alt=sse");
                let mut request = self.http.post(&url).json(&built.body);
                for (key, value) in &built.headers {
                    request = request.header(key, value);
                }

                let response = match request.send().await {
                    Ok(response) => response,
                    Err(_) if !emitted => {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        self.pool.pick_next(&model);
                        continue 'attempts;
                    }
                    Err(_) => return Err(ProxyError::UpstreamDisconnect),
                };

                if response.status() == reqwest::StatusCode::UNAUTHORIZED {
                    if emitted {
                        return Err(ProxyError::UpstreamDisconnect);
                    }
                    self.tokens.invalidate(&account.email);
                    self.projects.invalidate(&account.email);
                    continue;
                }
                if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    if emitted {
                        return Err(ProxyError::UpstreamDisconnect);
                    }
                    let reset_ms = self.parse_retry_after(&response);
                    if reset_ms > 10_000 {
                        self.pool.mark_limited(&account.email, reset_ms, &model);
                        continue 'attempts;
                    }
                    tokio::time::sleep(Duration::from_millis(reset_ms)).await;
                    continue;
                }
                if response.status().is_server_error() {
                    if emitted {
                        return Err(ProxyError::UpstreamDisconnect);
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
                if !response.status().is_success() {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProxyError::BadRequest { status, body });
                }

                use eventsource_stream::Eventsource;

                let mut collected = drain_stream(proxy_gemini::drive(SseAdapter::new(), response.bytes_stream().eventsource())).await;

                if !emitted && stream_is_empty(&collected) {
                    for delay_ms in EMPTY_RESPONSE_RETRY_DELAYS_MS {
                        tracing::debug!(account = %account.email, delay_ms, endpoint, "empty stream, retrying");
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                        let mut retry = self.http.post(&url).json(&built.body);
                        for (key, value) in &built.headers {
                            retry = retry.header(key, value);
                        }
                        let retry_response = match retry.send().await {
                            Ok(response) if response.status().is_success() => response,
                            _ => continue,
                        };
                        collected =
                            drain_stream(proxy_gemini::drive(SseAdapter::new(), retry_response.bytes_stream().eventsource())).await;
                        if !stream_is_empty(&collected) {
                            break;
                        }
                    }
                }

                for event in collected {
                    sink(event.clone()).await;
                    emitted = true;
                    if event.is_terminal() {
                        return Ok(());
                    }
                }
                return Ok(());
            }
        }

        Err(ProxyError::MaxRetriesExceeded)
    }

    async fn run_endpoints(
        &self,
        req: &CanonicalRequest,
        account_email: &str,
        project: &str,
        token: &str,
    ) -> Result<EndpointOutcome> {
        let streaming = is_thinking_capable(&req.model);
        let built = build(req, project, token, streaming, &self.signatures);

        for endpoint in &self.endpoints {
            let url = format!("{endpoint}/v1internal:generateContent");
            let mut request = self.http.post(&url).json(&built.body);
            for (key, value) in &built.headers {
                request = request.header(key, value);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(_) => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    self.pool.pick_next(&req.model);
                    return Ok(EndpointOutcome::RetryAttempt);
                }
            };

            match response.status() {
                reqwest::StatusCode::UNAUTHORIZED => {
                    tracing::debug!(account = %account_email, endpoint, "401, invalidating cached credentials");
                    self.tokens.invalidate(account_email);
                    self.projects.invalidate(account_email);
                    continue;
                }
                reqwest::StatusCode::TOO_MANY_REQUESTS => {
                    let reset_ms = self.parse_retry_after(&response);
                    tracing::debug!(account = %account_email, reset_ms, endpoint, "429");
                    if reset_ms > 10_000 {
                        return Ok(EndpointOutcome::RateLimitedLong(Attempt429 { reset_ms }));
                    }
                    tokio::time::sleep(Duration::from_millis(reset_ms)).await;
                    let mut retry = self.http.post(&url).json(&built.body);
                    for (key, value) in &built.headers {
                        retry = retry.header(key, value);
                    }
                    let retry_response = retry.send().await?;
                    if retry_response.status().is_success() {
                        return self.parse_with_empty_retry(retry_response, req, account_email, project, token, endpoint).await;
                    }
                    let reset_ms = self.parse_retry_after(&retry_response);
                    return Ok(EndpointOutcome::RateLimitedLong(Attempt429 {
                        reset_ms: reset_ms.max(self.default_cooldown_ms),
                    }));
                }
                status if status.is_server_error() => {
                    tracing::debug!(account = %account_email, endpoint, status = status.as_u16(), "5xx");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
                status if status.is_success() => {
                    return self.parse_with_empty_retry(response, req, account_email, project, token, endpoint).await;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ProxyError::BadRequest { status: status.as_u16(), body });
                }
            }
        }

        Ok(EndpointOutcome::RetryAttempt)
    }

    async fn parse_with_empty_retry(
        &self,
        response: reqwest::Response,
        req: &CanonicalRequest,
        account_email: &str,
        project: &str,
        token: &str,
        endpoint: &str,
    ) -> Result<EndpointOutcome> {
        let mut parsed: GenerateContentResponse = response.json().await?;
        record_signatures(&parsed, &self.signatures);
        let mut canonical = google_to_anthropic(&parsed);

        for delay_ms in EMPTY_RESPONSE_RETRY_DELAYS_MS {
            if !is_empty(&canonical, &parsed) {
                return Ok(EndpointOutcome::Response(canonical));
            }
            tracing::debug!(account = %account_email, delay_ms, endpoint, "empty response, retrying");
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;

            let built = build(req, project, token, false, &self.signatures);
            let mut request = self.http.post(format!("{endpoint}/v1internal:generateContent")).json(&built.body);
            for (key, value) in &built.headers {
                request = request.header(key, value);
            }
            let retry_response = request.send().await?;
            if !retry_response.status().is_success() {
                continue;
            }
            parsed = retry_response.json().await?;
            record_signatures(&parsed, &self.signatures);
            canonical = google_to_anthropic(&parsed);
        }

        if is_empty(&canonical, &parsed) {
            Ok(EndpointOutcome::EmptyAfterRetries)
        } else {
            Ok(EndpointOutcome::Response(canonical))
        }
    }
}

fn is_empty(canonical: &CanonicalResponse, raw: &GenerateContentResponse) -> bool {
    canonical.content.is_empty() && raw.usage_metadata.candidates_token_count == 0
}

async fn drain_stream(stream: impl futures::Stream<Item = proxy_core::StreamEvent>) -> Vec<proxy_core::StreamEvent> {
    use futures::StreamExt;
    futures::pin_mut!(stream);
    let mut events = Vec::new();
    while let Some(event) = stream.next().await {
        events.push(event);
    }
    events
}

fn stream_is_empty(events: &[proxy_core::StreamEvent]) -> bool {
    use proxy_core::StreamEvent;
    let has_content = events.iter().any(|e| matches!(e, StreamEvent::ContentBlockStart { .. }));
    let output_tokens = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::MessageDelta { output_tokens, .. } => Some(*output_tokens),
            _ => None,
        })
        .unwrap_or(0);
    !has_content && output_tokens == 0
}

enum EndpointOutcome {
    Response(CanonicalResponse),
    EmptyAfterRetries,
    RetryAttempt,
    RateLimitedLong(Attempt429),
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;
    use proxy_accounts::{Account, Credentials};
    use proxy_core::types::{CanonicalMessage, ContentBlock, Role};

    fn account(email: &str) -> Account {
        Account::new(email, Credentials { refresh_token: "rt".into(), client_id: "id".into(), client_secret: "secret".into() })
    }

    fn request() -> CanonicalRequest {
        CanonicalRequest {
            model: "gemini-3-flash".to_string(),
            messages: vec![CanonicalMessage { role: Role::User, content: vec![ContentBlock::text("hi")] }],
            system: None,
            tools: Vec::new(),
            max_tokens: 256,
            stream: false,
            thinking: false,
        }
    }

    fn context_against(server: &MockServer, accounts: Vec<Account>) -> DispatchContext {
        let http = reqwest::Client::new();
        DispatchContext {
            pool: AccountPool::from_accounts(accounts, 10),
            tokens: TokenCache::new(http.clone(), server.url("/token")),
            projects: ProjectCache::new(http.clone(), server.url("/loadCodeAssist")),
            http,
            endpoints: vec![server.base_url()],
            ..DispatchContext::default()
        }
    }

    fn mock_oauth_and_discovery(server: &MockServer) {
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/token");
            then.status(200).json_body(serde_json::json!({ "access_token": "tok-1", "expires_in": 3600 }));
        });
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/loadCodeAssist");
            then.status(200).json_body(serde_json::json!({ "cloudaicompanionProject": "proj-1" }));
        });
    }

    #[tokio::test]
    async fn successful_dispatch_returns_canonical_text() {
        let server = MockServer::start();
        mock_oauth_and_discovery(&server);
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/v1internal:generateContent");
            then.status(200).json_body(serde_json::json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "hello there" }] },
                    "finishReason": "STOP",
                }],
                "usageMetadata": { "promptTokenCount": 5, "candidatesTokenCount": 3 },
            }));
        });

        let ctx = context_against(&server, vec![account("a@example.com")]);
        let response = ctx.send(request()).await.expect("dispatch should succeed");
        assert_eq!(response.content[0].as_text(), Some("hello there"));
        assert_eq!(response.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn no_accounts_available_short_circuits_without_network() {
        let server = MockServer::start();
        let ctx = context_against(&server, Vec::new());
        let err = ctx.send(request()).await.unwrap_err();
        assert!(matches!(err, ProxyError::NoAccountsAvailable { .. }));
    }

    #[tokio::test]
    async fn all_accounts_limited_past_max_wait_returns_quota_exhausted() {
        let server = MockServer::start();
        let mut limited = account("a@example.com");
        limited.mark_limited("gemini-3-flash", std::time::Instant::now() + Duration::from_secs(3600));

        let mut ctx = context_against(&server, vec![limited]);
        ctx.max_wait_before_error_ms = 1_000;

        let err = ctx.send(request()).await.unwrap_err();
        assert!(matches!(err, ProxyError::QuotaExhausted { .. }));
    }

    #[tokio::test]
    async fn a_401_invalidates_credentials_and_tries_the_next_account() {
        let server = MockServer::start();
        mock_oauth_and_discovery(&server);
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/v1internal:generateContent");
            then.status(401);
        });

        let ctx = context_against(&server, vec![account("a@example.com")]);
        let err = ctx.send(request()).await.unwrap_err();
        assert!(matches!(err, ProxyError::MaxRetriesExceeded));
    }

    #[tokio::test]
    async fn streaming_dispatch_forwards_events_to_the_sink() {
        let server = MockServer::start();
        mock_oauth_and_discovery(&server);
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"hi\"}]},\"finishReason\":\"STOP\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":1,\"candidatesTokenCount\":1}}\n\n",
        );
        server.mock(|when, then| {
            when.method(httpmock::Method::POST).path("/v1internal:streamGenerateContent");
            then.status(200).header("content-type", "text/event-stream").body(body);
        });

        let ctx = context_against(&server, vec![account("a@example.com")]);
        let mut req = request();
        req.stream = true;

        let events = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let collected = events.clone();
        ctx.send_stream(req, move |event| {
            let collected = collected.clone();
            async move { collected.lock().await.push(event); }
        })
        .await
        .expect("streaming dispatch should succeed");

        let events = events.lock().await;
        assert!(events.iter().any(|e| matches!(e, proxy_core::StreamEvent::MessageStart { .. })));
        assert!(matches!(events.last(), Some(proxy_core::StreamEvent::MessageStop)));
    }
}

