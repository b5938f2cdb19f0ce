//! HTTP transport for Huawei Cloud REST API calls
//!
//! Sends requests and sorts failures into retryable and non-retryable
//! classes. Signing happens one layer up in the client.

use crate::error::ApiError;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Map a non-success status to an error class
pub fn classify_status(operation: &str, url: &Url, status: StatusCode) -> ApiError {
    if status == StatusCode::NOT_FOUND {
        return ApiError::NotFound {
            kind: "resource",
            id: url.path().to_string(),
        };
    }

    let reason = format!("API request failed: {}", status);
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ApiError::transient(operation, reason)
    } else {
        ApiError::fatal(operation, reason)
    }
}

/// Map a transport failure to an error class
fn classify_transport(operation: &str, error: &reqwest::Error) -> ApiError {
    if error.is_builder() || error.is_redirect() {
        ApiError::fatal(operation, error)
    } else {
        // timeouts, refused connections, resets
        ApiError::transient(operation, error)
    }
}

/// HTTP client wrapper for signed API calls
#[derive(Clone)]
pub struct CloudHttpClient {
    client: Client,
}

impl CloudHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .user_agent(concat!("ecs-inventory/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ApiError::fatal("create HTTP client", e))?;

        Ok(Self { client })
    }

    /// Make a GET request and parse the JSON response
    pub async fn get(
        &self,
        operation: &str,
        url: &Url,
        headers: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        tracing::debug!("GET {}", url);

        let mut request = self.client.get(url.clone());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_transport(operation, &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::transient(operation, format!("failed to read body: {}", e)))?;

        if !status.is_success() {
            // Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(classify_status(operation, url, status));
        }

        serde_json::from_str(&body)
            .map_err(|e| ApiError::fatal(operation, format!("malformed response JSON: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://ecs.cn-north-4.myhuaweicloud.com/v2.1/p/flavors/c6.large.2").unwrap()
    }

    #[test]
    fn throttling_and_server_errors_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            assert!(
                classify_status("op", &url(), status).is_retryable(),
                "{} should be retryable",
                status
            );
        }
    }

    #[test]
    fn auth_and_client_errors_are_fatal() {
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::BAD_REQUEST,
        ] {
            let err = classify_status("list_servers", &url(), status);
            assert!(matches!(err, ApiError::Fatal { .. }), "{}", status);
        }
    }

    #[test]
    fn not_found_carries_path() {
        let err = classify_status("get_flavor", &url(), StatusCode::NOT_FOUND);
        assert_eq!(
            err,
            ApiError::NotFound {
                kind: "resource",
                id: "/v2.1/p/flavors/c6.large.2".to_string()
            }
        );
    }

    #[test]
    fn sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(MAX_LOG_BODY_LENGTH)));
        assert!(out.contains("[truncated,500bytestotal]") || out.contains("500 bytes total"));
    }

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log("bad\r\nrequest\t!"), "badrequest!");
    }

    #[test]
    fn sanitize_respects_char_boundaries() {
        let body = "é".repeat(150);
        let out = sanitize_for_log(&body);
        assert!(out.contains("truncated"));
    }
}
