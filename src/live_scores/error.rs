use std::time::Duration;

use thiserror::Error;

/// Errors raised by score providers.
///
/// Adapters always return these; only [`ProviderManager`](super::ProviderManager)
/// decides to absorb them.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Upstream answered with a non-2xx status.
    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The request did not complete within the adapter's timeout.
    #[error("Request timeout: {provider} after {after:?}")]
    Timeout { provider: String, after: Duration },

    /// Transport-level failure (DNS, TLS, connection reset).
    #[error("Network error: {provider} - {source}")]
    Network {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    /// The payload did not match the provider's documented shape.
    #[error("Failed to decode {provider} response: {message}")]
    Decode { provider: String, message: String },

    /// The adapter was built with an unusable base URL or path.
    #[error("Invalid {provider} configuration: {message}")]
    Config { provider: String, message: String },

    /// The rate limiter gave up waiting for a free slot.
    #[error("Rate limited: {provider} (waited {waited:?})")]
    RateLimited { provider: String, waited: Duration },
}

impl ProviderError {
    pub fn provider(&self) -> &str {
        match self {
            Self::Http { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::Network { provider, .. }
            | Self::Decode { provider, .. }
            | Self::Config { provider, .. }
            | Self::RateLimited { provider, .. } => provider,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Join a base URL and a path, then attach query parameters.
pub(crate) fn build_url(
    provider: &str,
    base_url: &str,
    path: &str,
    params: &[(&str, String)],
) -> ProviderResult<url::Url> {
    let raw = format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let parsed = if params.is_empty() {
        url::Url::parse(&raw)
    } else {
        url::Url::parse_with_params(&raw, params)
    };
    parsed.map_err(|e| ProviderError::Config {
        provider: provider.to_string(),
        message: format!("{}: {}", raw, e),
    })
}

/// Append `segment` as a single percent-encoded path segment, so a `/`, `?`
/// or `#` inside it cannot reshape the request.
pub(crate) fn push_segment(
    provider: &str,
    mut url: url::Url,
    segment: &str,
) -> ProviderResult<url::Url> {
    url.path_segments_mut()
        .map_err(|_| ProviderError::Config {
            provider: provider.to_string(),
            message: "base URL cannot take path segments".to_string(),
        })?
        .push(segment);
    Ok(url)
}
