//! JSON HTTP client with retry logic.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::auth::{NoAuth, RequestAuth};
use super::retry::{Backoff, RetryConfig, StatusClass, classify, is_idempotent, retry_after};
use crate::error::{AdapterError, HttpError};
use crate::observability::record_http_retry;

/// Transport settings shared by every venue client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryConfig,
}

impl HttpClientConfig {
    /// Config with default timeout and retry policy.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Error body shapes venues commonly return.
#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for a venue REST API.
#[derive(Debug, Clone)]
pub struct JsonHttpClient {
    client: Client,
    base_url: String,
    host: String,
    retry: RetryConfig,
    auth: Arc<dyn RequestAuth>,
}

impl JsonHttpClient {
    /// Create a client that signs private requests with `auth`.
    pub fn new(config: &HttpClientConfig, auth: Arc<dyn RequestAuth>) -> Result<Self, AdapterError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| HttpError::Network(e.to_string()))?;

        let host = reqwest::Url::parse(&config.base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| config.base_url.clone());

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            host,
            retry: config.retry.clone(),
            auth,
        })
    }

    /// Create a client for public endpoints only.
    pub fn public(config: &HttpClientConfig) -> Result<Self, AdapterError> {
        Self::new(config, Arc::new(NoAuth))
    }

    /// Base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Unauthenticated GET.
    pub async fn get_public<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        self.request(Method::GET, path, None, false, false).await
    }

    /// Authenticated GET.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        self.request(Method::GET, path, None, true, false).await
    }

    /// Authenticated POST with a JSON body.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let body = serde_json::to_string(body).map_err(|e| HttpError::JsonParse(e.to_string()))?;
        self.request(Method::POST, path, Some(body), true, false).await
    }

    /// POST that only reads (JSON-RPC calls). Retried like a GET.
    pub async fn post_query<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let body = serde_json::to_string(body).map_err(|e| HttpError::JsonParse(e.to_string()))?;
        self.request(Method::POST, path, Some(body), true, true).await
    }

    /// Authenticated PUT with a JSON body.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let body = serde_json::to_string(body).map_err(|e| HttpError::JsonParse(e.to_string()))?;
        self.request(Method::PUT, path, Some(body), true, false).await
    }

    /// Authenticated DELETE.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        self.request(Method::DELETE, path, None, true, false).await
    }

    /// Internal request implementation with retry logic.
    ///
    /// Non-idempotent requests that are not `read_only` are only retried
    /// when the connection failed or the venue throttled them; the venue
    /// processed neither.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<String>,
        authenticated: bool,
        read_only: bool,
    ) -> Result<T, HttpError> {
        let url = format!("{}{path}", self.base_url);
        let replayable = read_only || is_idempotent(&method);
        let mut backoff = Backoff::new(&self.retry);

        loop {
            let mut request = self.client.request(method.clone(), &url);

            if authenticated {
                let headers = self
                    .auth
                    .headers(&method, path, body.as_deref().unwrap_or(""))
                    .map_err(|e| HttpError::Api {
                        status: 0,
                        code: "AUTH".to_string(),
                        message: e.to_string(),
                    })?;
                for (name, value) in headers {
                    request = request.header(name, value);
                }
            }

            if let Some(body) = &body {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if !replayable && !e.is_connect() {
                        return Err(HttpError::Network(e.to_string()));
                    }
                    if let Some(delay) = backoff.next_delay() {
                        tracing::warn!(
                            host = %self.host,
                            error = %e,
                            delay_ms = delay.as_millis(),
                            attempt = backoff.attempts(),
                            "Network error, retrying"
                        );
                        record_http_retry(&self.host, "network");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    if backoff.attempts() <= 1 {
                        return Err(HttpError::Network(e.to_string()));
                    }
                    return Err(HttpError::MaxRetriesExceeded {
                        attempts: backoff.attempts(),
                    });
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response
                    .text()
                    .await
                    .map_err(|e| HttpError::Network(e.to_string()))?;
                let text = if text.is_empty() { "null" } else { text.as_str() };
                return serde_json::from_str(text).map_err(|e| HttpError::JsonParse(e.to_string()));
            }

            let class = classify(status);
            let server_delay = retry_after(response.headers());
            let error_body = response.text().await.unwrap_or_default();
            let (error_code, error_message) = parse_error_body(status, &error_body);

            let delay = match class {
                StatusClass::Throttled => match server_delay {
                    Some(delay) if backoff.has_remaining() => {
                        backoff.consume();
                        Some(delay)
                    }
                    _ => backoff.next_delay(),
                },
                StatusClass::Transient if replayable => backoff.next_delay(),
                _ => None,
            };
            if let Some(delay) = delay {
                tracing::warn!(
                    host = %self.host,
                    status = status.as_u16(),
                    code = %error_code,
                    message = %error_message,
                    delay_ms = delay.as_millis(),
                    attempt = backoff.attempts(),
                    "Request failed, retrying"
                );
                record_http_retry(&self.host, status.as_str());
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(match class {
                StatusClass::Throttled => HttpError::RateLimited {
                    retry_after_secs: server_delay.map_or(60, |d| d.as_secs()),
                },
                StatusClass::Transient if replayable => HttpError::MaxRetriesExceeded {
                    attempts: backoff.attempts(),
                },
                StatusClass::Unauthorized => HttpError::AuthenticationFailed,
                StatusClass::Missing => HttpError::NotFound {
                    path: path.to_string(),
                },
                StatusClass::Transient | StatusClass::Rejected => HttpError::Api {
                    status: status.as_u16(),
                    code: error_code,
                    message: error_message,
                },
            });
        }
    }
}

fn parse_error_body(status: StatusCode, body: &str) -> (String, String) {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => {
            let code = match err.code {
                Some(serde_json::Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => status.as_u16().to_string(),
            };
            let message = err.message.or(err.error).unwrap_or_else(|| body.to_string());
            (code, message)
        }
        Err(_) => (status.as_u16().to_string(), body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numeric_error_codes() {
        let (code, message) = parse_error_body(
            StatusCode::BAD_REQUEST,
            r#"{"success":false,"code":-1102,"message":"order quantity too small"}"#,
        );
        assert_eq!(code, "-1102");
        assert_eq!(message, "order quantity too small");
    }

    #[test]
    fn parses_error_field() {
        let (code, message) =
            parse_error_body(StatusCode::BAD_REQUEST, r#"{"error":"INVALID_SIGNATURE"}"#);
        assert_eq!(code, "400");
        assert_eq!(message, "INVALID_SIGNATURE");
    }

    #[test]
    fn falls_back_to_raw_body() {
        let (code, message) = parse_error_body(StatusCode::BAD_GATEWAY, "upstream timeout");
        assert_eq!(code, "502");
        assert_eq!(message, "upstream timeout");
    }

    #[test]
    fn base_url_is_trimmed() {
        let config = HttpClientConfig::new("https://api.aevo.xyz/");
        assert_eq!(config.base_url, "https://api.aevo.xyz");
        let client = JsonHttpClient::public(&config).unwrap();
        assert_eq!(client.base_url(), "https://api.aevo.xyz");
    }

    fn fast_retry(server: &wiremock::MockServer, max_attempts: u32) -> JsonHttpClient {
        let config = HttpClientConfig::new(server.uri()).with_retry(RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            ..RetryConfig::default()
        });
        JsonHttpClient::public(&config).unwrap()
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .mount(&server)
            .await;

        let body: serde_json::Value = fast_retry(&server, 3).get_public("/ping").await.unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let result = fast_retry(&server, 2).get_public::<serde_json::Value>("/ping").await;
        assert!(matches!(result, Err(HttpError::MaxRetriesExceeded { attempts: 2 })), "{result:?}");
    }

    #[tokio::test]
    async fn order_posts_are_not_replayed_after_server_errors() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(504))
            .expect(1)
            .mount(&server)
            .await;

        let result = fast_retry(&server, 3)
            .post::<serde_json::Value, _>("/orders", &serde_json::json!({ "amount": "1" }))
            .await;
        assert!(matches!(result, Err(HttpError::Api { status: 504, .. })), "{result:?}");
    }

    #[tokio::test]
    async fn read_only_posts_are_retried() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "result": "0x1" })))
            .mount(&server)
            .await;

        let body: serde_json::Value = fast_retry(&server, 3)
            .post_query("", &serde_json::json!({ "method": "eth_chainId" }))
            .await
            .unwrap();
        assert_eq!(body["result"], "0x1");
    }

    #[tokio::test]
    async fn throttled_posts_are_retried() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "order_id": "1" })))
            .mount(&server)
            .await;

        let body: serde_json::Value = fast_retry(&server, 3)
            .post("/orders", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(body["order_id"], "1");
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({ "code": -1102, "message": "bad qty" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = fast_retry(&server, 3).get_public::<serde_json::Value>("/v1/order").await;
        let Err(HttpError::Api { status, code, message }) = result else {
            panic!("expected an API error, got {result:?}");
        };
        assert_eq!(status, 400);
        assert_eq!(code, "-1102");
        assert_eq!(message, "bad qty");
    }
}
