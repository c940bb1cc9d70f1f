use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use super::error::{ProviderError, ProviderResult};
use super::rate_limiter::{RateLimiter, DEFAULT_IDENTIFIER};

pub const USER_AGENT: &str = concat!("livescore-hub/", env!("CARGO_PKG_VERSION"));

/// Upstream error bodies are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Rate-limited, time-bounded JSON GETs for one provider.
///
/// Every adapter request goes through [`HttpFetcher::fetch_json`].
#[derive(Clone)]
pub struct HttpFetcher {
    http: Client,
    provider: String,
    limiter: Arc<RateLimiter>,
    timeout: Duration,
    /// Values masked wherever they appear as a path segment or query value
    /// in logged URLs
    secrets: Vec<String>,
}

impl HttpFetcher {
    pub fn new(provider: &str, limiter: Arc<RateLimiter>, timeout: Duration) -> ProviderResult<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|source| ProviderError::Network {
                provider: provider.to_string(),
                source,
            })?;
        Ok(HttpFetcher {
            http,
            provider: provider.to_string(),
            limiter,
            timeout,
            secrets: Vec::new(),
        })
    }

    /// Mask `secret` in logged URLs.
    pub fn with_secret(mut self, secret: &str) -> Self {
        if !secret.is_empty() {
            self.secrets.push(secret.to_string());
        }
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for a rate-limit slot, then GET `url` and decode the JSON body.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: Url,
        headers: &[(&str, &str)],
    ) -> ProviderResult<T> {
        self.limiter.wait_for_slot(DEFAULT_IDENTIFIER).await?;

        debug!("[{}] GET {}", self.provider, redact(&url, &self.secrets));

        let mut request = self.http.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let exchange = async {
            let resp = request.send().await.map_err(|source| self.network(source))?;
            let status = resp.status();
            let body = resp.text().await.map_err(|source| self.network(source))?;
            Ok::<_, ProviderError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: self.provider.clone(),
                after: self.timeout,
            })??;

        if !status.is_success() {
            return Err(ProviderError::Http {
                provider: self.provider.clone(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::Decode {
            provider: self.provider.clone(),
            message: e.to_string(),
        })
    }

    fn network(&self, source: reqwest::Error) -> ProviderError {
        ProviderError::Network {
            provider: self.provider.clone(),
            source,
        }
    }
}

/// Strip credentials from a URL before logging it.
fn redact(url: &Url, secrets: &[String]) -> String {
    let is_secret = |value: &str| secrets.iter().any(|s| s == value);
    let mut shown = url.clone();

    let path: Vec<&str> = url
        .path()
        .split('/')
        .map(|seg| if is_secret(seg) { "***" } else { seg })
        .collect();
    shown.set_path(&path.join("/"));

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_token" || is_secret(&v) {
                "***".into()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        shown.query_pairs_mut().clear().extend_pairs(pairs);
    }
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live_scores::test_support::spawn_stub;
    use axum::{http::StatusCode, routing::get, Json, Router};

    fn fetcher(timeout: Duration) -> HttpFetcher {
        let limiter = Arc::new(RateLimiter::new(
            "stub",
            10,
            Duration::from_secs(60),
            Duration::from_secs(1),
        ));
        HttpFetcher::new("stub", limiter, timeout).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_json_decodes_and_counts() {
        let base = spawn_stub(Router::new().route(
            "/ok",
            get(|| async { Json(serde_json::json!({"hello": "world"})) }),
        ))
        .await;
        let f = fetcher(Duration::from_secs(5));
        let v: serde_json::Value = f
            .fetch_json(Url::parse(&format!("{}/ok", base)).unwrap(), &[])
            .await
            .unwrap();
        assert_eq!(v["hello"], "world");
        assert_eq!(f.limiter().remaining_requests(DEFAULT_IDENTIFIER), 9);
    }

    #[tokio::test]
    async fn test_fetch_json_maps_http_status() {
        let long_body = "x".repeat(500);
        let base = spawn_stub(Router::new().route(
            "/boom",
            get(move || async move { (StatusCode::INTERNAL_SERVER_ERROR, long_body) }),
        ))
        .await;
        let err = fetcher(Duration::from_secs(5))
            .fetch_json::<serde_json::Value>(Url::parse(&format!("{}/boom", base)).unwrap(), &[])
            .await
            .unwrap_err();
        match err {
            ProviderError::Http { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_ERROR_BODY_CHARS);
            }
            other => panic!("expected Http error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_json_times_out() {
        let base = spawn_stub(Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "{}"
            }),
        ))
        .await;
        let err = fetcher(Duration::from_millis(100))
            .fetch_json::<serde_json::Value>(Url::parse(&format!("{}/slow", base)).unwrap(), &[])
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_fetch_json_reports_decode_errors() {
        let base = spawn_stub(Router::new().route("/bad", get(|| async { "not json" }))).await;
        let err = fetcher(Duration::from_secs(5))
            .fetch_json::<serde_json::Value>(Url::parse(&format!("{}/bad", base)).unwrap(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_fetch_json_sends_user_agent_and_headers() {
        let base = spawn_stub(Router::new().route(
            "/echo",
            get(|headers: axum::http::HeaderMap| async move {
                Json(serde_json::json!({
                    "ua": headers.get("user-agent").and_then(|v| v.to_str().ok()),
                    "key": headers.get("x-rapidapi-key").and_then(|v| v.to_str().ok()),
                }))
            }),
        ))
        .await;
        let v: serde_json::Value = fetcher(Duration::from_secs(5))
            .fetch_json(
                Url::parse(&format!("{}/echo", base)).unwrap(),
                &[("x-rapidapi-key", "secret")],
            )
            .await
            .unwrap();
        assert_eq!(v["ua"], USER_AGENT);
        assert_eq!(v["key"], "secret");
    }

    #[test]
    fn test_redact_hides_token() {
        let url = Url::parse("https://api.example.com/x?api_token=abc&include=state").unwrap();
        let shown = redact(&url, &[]);
        assert!(!shown.contains("abc"));
        assert!(shown.contains("include=state"));
    }

    #[test]
    fn test_redact_hides_key_path_segment() {
        let url = Url::parse("https://www.thesportsdb.com/api/v1/json/paidkey123/eventsday.php?d=2024-03-02")
            .unwrap();
        let shown = redact(&url, &["paidkey123".to_string()]);
        assert_eq!(
            shown,
            "https://www.thesportsdb.com/api/v1/json/***/eventsday.php?d=2024-03-02"
        );
        let untouched = Url::parse("https://api.example.com/v1/json/other/x").unwrap();
        assert_eq!(
            redact(&untouched, &["paidkey123".to_string()]),
            "https://api.example.com/v1/json/other/x"
        );
    }
}
