//! Classifying responses as failures.

use crate::error::Error;
use crate::response::RawResponse;
use async_trait::async_trait;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Structured error payload sent by services on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorMessage {
    pub code: i64,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub message: Option<String>,
    pub stack_trace: Option<String>,
    pub inner: Option<Box<ErrorMessage>>,
    pub metadata: HashMap<String, String>,
}

/// Inspects a response and decides whether it is a failure.
///
/// Returns `None` to accept the response. The factory may buffer the body to
/// inspect it; the buffered body stays available to result construction.
#[async_trait]
pub trait ExceptionFactory: Send + Sync + fmt::Debug {
    async fn create(&self, response: &mut RawResponse) -> Option<Error>;
}

/// Default factory.
///
/// Every non-success status is a failure. For the configured statuses (400
/// and 500 by default), a non-empty `application/json` body is parsed as an
/// [`ErrorMessage`] and attached to the error.
#[derive(Debug, Clone)]
pub struct RemoteServiceExceptionFactory {
    status_codes: Vec<StatusCode>,
}

impl Default for RemoteServiceExceptionFactory {
    fn default() -> Self {
        Self {
            status_codes: vec![StatusCode::INTERNAL_SERVER_ERROR, StatusCode::BAD_REQUEST],
        }
    }
}

impl RemoteServiceExceptionFactory {
    /// Parses payloads for the given statuses instead of 400 and 500.
    pub fn with_status_codes(status_codes: Vec<StatusCode>) -> Self {
        Self { status_codes }
    }
}

#[async_trait]
impl ExceptionFactory for RemoteServiceExceptionFactory {
    async fn create(&self, response: &mut RawResponse) -> Option<Error> {
        let status = response.status();
        if status.is_success() {
            return None;
        }

        let body = match response.buffer().await {
            Ok(body) => body,
            Err(e) => return Some(e),
        };
        let raw_response = String::from_utf8_lossy(&body).into_owned();

        let error_message = if self.status_codes.contains(&status)
            && !body.is_empty()
            && response.media_type().as_deref() == Some("application/json")
        {
            serde_json::from_slice::<ErrorMessage>(&body).ok()
        } else {
            None
        };

        if status.is_client_error() {
            tracing::error!(
                status = status.as_u16(),
                url = %response.url(),
                response = %raw_response,
                "Client error (4xx)"
            );
        } else {
            tracing::warn!(
                status = status.as_u16(),
                url = %response.url(),
                response = %raw_response,
                "Server error"
            );
        }

        Some(Error::RemoteService {
            status,
            url: response.url().clone(),
            headers: response.headers().clone(),
            raw_response,
            error_message,
        })
    }
}
