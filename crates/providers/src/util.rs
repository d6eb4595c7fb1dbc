//! Shared utility functions for provider adapters.

use cg_domain::config::AuthConfig;
use cg_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Resolve the API key from an [`AuthConfig`].
///
/// Precedence: plaintext `key` field (warns), then the environment
/// variable named by `env`.
pub(crate) fn resolve_api_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        tracing::warn!("API key loaded from plaintext config field 'key' — prefer 'env' instead");
        return Ok(key.clone());
    }
    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var).map_err(|_| {
            Error::Auth(format!("environment variable '{env_var}' not set or not valid UTF-8"))
        });
    }
    Err(Error::Auth("no API key configured: set 'key' or 'env' in the provider auth".into()))
}

/// Build the domain error for a non-success HTTP response. The status
/// code stays in the message so the transient classifier can see it.
pub(crate) fn http_status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> Error {
    let snippet: String = body.chars().take(300).collect();
    Error::Provider {
        provider: provider.to_string(),
        message: format!("HTTP {}: {}", status.as_u16(), snippet),
    }
}
