//! HTTP transport for the record APIs.

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use serde_json::Value;
use slquery_core::TransportError;

use crate::config::{ClientConfig, API_KEY_HEADER};

/// One remote JSON call. Implementations own timeouts and retries; callers
/// see a single structured [`TransportError`] per failed call.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// `GET path`, decoding the response body as JSON.
    async fn get_json(&self, path: &str) -> Result<Value, TransportError>;

    /// `POST path` with a JSON body, decoding the response body as JSON.
    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError>;
}

// ---------------------------------------------------------------------------
// ReqwestHttpClient
// ---------------------------------------------------------------------------

/// [`HttpClient`] over `reqwest`. Retries 429 responses with exponential
/// backoff up to [`ClientConfig::max_retries`] times.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ReqwestHttpClient {
    /// # Errors
    ///
    /// Returns [`TransportError::Network`] if the API key is not a valid
    /// header value or the TLS backend cannot be initialized.
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let mut value = HeaderValue::from_str(key)
                .map_err(|e| TransportError::Network(format!("invalid API key: {e}")))?;
            value.set_sensitive(true);
            headers.insert(API_KEY_HEADER, value);
        }
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client, config })
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let url = self.config.url(path);
        let mut attempt = 0;
        loop {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await.map_err(map_reqwest_error)?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.config.max_retries {
                let delay = self.config.retry_delay(attempt);
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(%url, attempt, delay_ms, "rate limited, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::debug!(%url, status = status.as_u16(), "request failed");
                return Err(TransportError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            return response.json::<Value>().await.map_err(map_reqwest_error);
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get_json(&self, path: &str) -> Result<Value, TransportError> {
        self.execute(Method::GET, path, None).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.execute(Method::POST, path, Some(body)).await
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}
