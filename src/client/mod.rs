//! HTTP client for the Sentry API.

mod decode;

pub use decode::*;

use std::time::Duration;

use reqwest::redirect::Policy;
use thiserror::Error;

use crate::config::HttpProbe;

/// API call error types.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response from Sentry API: {0}")]
    InvalidStatus(u16),
    #[error("malformed response body: {0}")]
    Decode(String),
}

/// GET client bound to one scrape's timeout.
///
/// Calls are never retried; a failed call is reported to the caller and
/// counted there.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
}

impl ApiClient {
    /// Build a client with an optional per-call timeout.
    ///
    /// Redirects are refused and surface as transport errors.
    pub fn new(timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::custom(|attempt| attempt.error("redirects are disabled")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { http })
    }

    /// Issue a GET against `domain + "/api/0/" + path`.
    ///
    /// When the config lists explicit status codes the response status must
    /// be one of them; otherwise any 2xx is accepted.
    pub async fn request(
        &self,
        path: &str,
        config: &HttpProbe,
    ) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/api/0/{}", config.domain, path);

        let mut request = self.http.get(&url);
        for (key, value) in &config.headers {
            // A "Host" entry selects the virtual host instead of a wire header.
            if key.eq_ignore_ascii_case("host") {
                request = request.header(reqwest::header::HOST, value.as_str());
            } else {
                request = request.header(key.as_str(), value.as_str());
            }
        }

        let response = request.send().await.map_err(|e| {
            tracing::warn!("Error for HTTP request to {}: {}", path, e);
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        let accepted = if config.valid_status_codes.is_empty() {
            status.is_success()
        } else {
            config.valid_status_codes.contains(&status.as_u16())
        };

        if accepted {
            tracing::debug!("received {} from {}", status.as_u16(), url);
            Ok(response)
        } else {
            Err(ApiError::InvalidStatus(status.as_u16()))
        }
    }

    /// Issue a GET and read the full response body.
    pub async fn request_body(
        &self,
        path: &str,
        config: &HttpProbe,
    ) -> Result<Vec<u8>, ApiError> {
        let response = self.request(path, config).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(body.to_vec())
    }
}
