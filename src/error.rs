//! Error types for contract resolution, request building and dispatch.
//!
//! Every failure surfaced by the crate is an [`Error`]. Variants that come from
//! a received response keep the status, headers and raw body so callers can
//! debug what the remote service actually said.

use crate::exception::ErrorMessage;
use http::{HeaderMap, StatusCode};
use url::Url;

/// Boxed error used for causes coming from pluggable capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type.
///
/// # Examples
///
/// ```no_run
/// use restract::{Error, Json, Service};
///
/// # async fn example(service: Service) -> Result<(), Error> {
/// match service.call("get_user").arg(42).send::<Json<serde_json::Value>>().await {
///     Ok(user) => println!("user: {:?}", user.0),
///     Err(Error::RemoteService { status, error_message: Some(message), .. }) => {
///         eprintln!("server refused ({status}): {:?}", message.message);
///     }
///     Err(Error::Deserialization { raw_response, source, .. }) => {
///         eprintln!("bad payload {raw_response}: {source}");
///     }
///     Err(e) if e.is_cancelled() => eprintln!("cancelled"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A contract or one of its methods is malformed (missing HTTP metadata,
    /// more than one body, unmatched path placeholders, ...).
    ///
    /// Raised when the contract is registered, or when a call does not match
    /// any declared method.
    #[error("Invalid contract definition: {0}")]
    ContractDefinition(String),

    /// More than one overload matched the requested method name and signature.
    #[error("Ambiguous method `{method}`: {candidates} overloads match and none matches exactly")]
    AmbiguousMethod {
        /// The requested method name
        method: String,
        /// How many overloads remained after filtering
        candidates: usize,
    },

    /// A multipart request received an argument that cannot become a part.
    #[error("Unsupported multipart parameter `{parameter}` of type {type_name}")]
    UnsupportedMultipartParameter {
        /// The parameter name
        parameter: String,
        /// The argument kind that was rejected
        type_name: &'static str,
        /// Why the content serializer fallback failed
        #[source]
        source: Box<Error>,
    },

    /// The exception factory classified the response as a failure.
    #[error("Remote service error {status}: {}", remote_message(.error_message, .raw_response))]
    RemoteService {
        /// The HTTP status code
        status: StatusCode,
        /// The URL the request was sent to
        url: Url,
        /// The response headers
        headers: HeaderMap,
        /// The raw response body
        raw_response: String,
        /// Structured error payload sent by the server, when it sent one
        error_message: Option<ErrorMessage>,
    },

    /// The response body could not be turned into the declared return type.
    #[error("Failed to deserialize response (status {status}): {source}")]
    Deserialization {
        /// The HTTP status code
        status: StatusCode,
        /// The URL the request was sent to
        url: Url,
        /// The response headers
        headers: HeaderMap,
        /// The raw response body
        raw_response: String,
        /// The parser failure
        #[source]
        source: BoxError,
    },

    /// The call was cancelled through its cancellation token.
    #[error("Request was cancelled")]
    Cancelled,

    /// A network-level error reported by the transport.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to serialize a request body or part.
    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// Invalid client or call configuration (bad header, wrong argument count, ...).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An invalid URL was produced or provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Reading a file or stream argument failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn remote_message<'a>(error_message: &'a Option<ErrorMessage>, raw_response: &'a str) -> &'a str {
    error_message
        .as_ref()
        .and_then(|m| m.message.as_deref())
        .unwrap_or(raw_response)
}

impl Error {
    /// Returns `true` for cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Returns the HTTP status code if this error came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::RemoteService { status, .. } => Some(*status),
            Error::Deserialization { status, .. } => Some(*status),
            Error::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::RemoteService { raw_response, .. } => Some(raw_response),
            Error::Deserialization { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the structured server error payload, if any.
    pub fn error_message(&self) -> Option<&ErrorMessage> {
        match self {
            Error::RemoteService { error_message, .. } => error_message.as_ref(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
