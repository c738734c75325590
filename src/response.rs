//! Turning received responses into typed results.
//!
//! The dispatcher picks the construction path from the caller's requested
//! type through [`FromResponse`]. Each implementation declares the
//! [`ReturnShape`] it produces, so a call whose type does not match the
//! method's declared shape is rejected before anything is sent.

use crate::client::Client;
use crate::descriptor::ReturnShape;
use crate::error::{BoxError, Error, Result};
use crate::value::ByteStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, TryStreamExt};
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Status line and headers of a received response.
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    pub method: Method,
    /// The URL the request was sent to.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Time from sending until the headers arrived.
    pub latency: Duration,
}

enum Body {
    Pending(reqwest::Response),
    Buffered(Bytes),
}

/// A received response whose body has not necessarily been read.
///
/// This is also the return type for methods that want the response itself:
/// those skip failure classification entirely.
pub struct RawResponse {
    meta: ResponseMeta,
    body: Body,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawResponse")
            .field("meta", &self.meta)
            .field("buffered", &matches!(self.body, Body::Buffered(_)))
            .finish()
    }
}

impl RawResponse {
    pub(crate) fn new(meta: ResponseMeta, response: reqwest::Response, cancel: CancellationToken) -> Self {
        Self {
            meta,
            body: Body::Pending(response),
            cancel,
        }
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    pub fn status(&self) -> StatusCode {
        self.meta.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.meta.headers
    }

    pub fn url(&self) -> &Url {
        &self.meta.url
    }

    /// Content type without parameters, lower-cased.
    pub fn media_type(&self) -> Option<String> {
        self.meta
            .headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
    }

    /// Reads the body into memory, keeping it for later consumers.
    pub async fn buffer(&mut self) -> Result<Bytes> {
        if let Body::Buffered(bytes) = &self.body {
            return Ok(bytes.clone());
        }
        let pending = std::mem::replace(&mut self.body, Body::Buffered(Bytes::new()));
        if let Body::Pending(response) = pending {
            let bytes = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                bytes = response.bytes() => bytes?,
            };
            self.body = Body::Buffered(bytes.clone());
            return Ok(bytes);
        }
        Ok(Bytes::new())
    }

    pub async fn bytes(mut self) -> Result<Bytes> {
        self.buffer().await
    }

    /// The body as text; invalid UTF-8 is replaced.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Streams the body. Chunks are not subject to the call's cancellation.
    pub fn into_stream(self) -> ByteStream {
        match self.body {
            Body::Buffered(bytes) => Box::pin(stream::once(futures::future::ready(Ok(bytes)))),
            Body::Pending(response) => Box::pin(
                response
                    .bytes_stream()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
            ),
        }
    }
}

/// A value deserialized from the response body with the client's content
/// serializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A response envelope: status, headers and URL, plus either the content or
/// the error that prevented it.
///
/// Failures classified by the exception factory and deserialization failures
/// are carried inside the envelope instead of being returned as `Err`.
///
/// # Examples
///
/// ```no_run
/// use restract::{ApiResponse, Json, Service};
///
/// # async fn example(service: Service) -> Result<(), restract::Error> {
/// let response: ApiResponse<Json<Vec<String>>> = service.call("tags").send().await?;
/// if response.is_success() {
///     println!("{} tags", response.content().map(|t| t.len()).unwrap_or(0));
/// } else {
///     eprintln!("failed with {}", response.status());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ApiResponse<T> {
    content: Option<T>,
    error: Option<Error>,
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    latency: Duration,
}

impl<T> ApiResponse<T> {
    fn from_meta(meta: ResponseMeta, content: Option<T>, error: Option<Error>) -> Self {
        Self {
            content,
            error,
            status: meta.status,
            headers: meta.headers,
            url: meta.url,
            latency: meta.latency,
        }
    }

    pub fn content(&self) -> Option<&T> {
        self.content.as_ref()
    }

    pub fn into_content(self) -> Option<T> {
        self.content
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// `true` when the status is `2xx` and no error was recorded.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status.is_success()
    }

    /// Returns the envelope unchanged on success, its error otherwise.
    pub fn ensure_success(mut self) -> Result<Self> {
        if let Some(error) = self.error.take() {
            return Err(error);
        }
        if !self.status.is_success() {
            return Err(Error::RemoteService {
                status: self.status,
                url: self.url,
                headers: self.headers,
                raw_response: String::new(),
                error_message: None,
            });
        }
        Ok(self)
    }

    /// The content, or the recorded error.
    pub fn into_result(self) -> Result<T> {
        let envelope = self.ensure_success()?;
        envelope.content.ok_or_else(|| {
            Error::Configuration("successful response carried no content".to_string())
        })
    }

    /// Maps the content, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> ApiResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        ApiResponse {
            content: self.content.map(f),
            error: self.error,
            status: self.status,
            headers: self.headers,
            url: self.url,
            latency: self.latency,
        }
    }
}

/// Shared state handed to [`FromResponse`] implementations.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    client: Client,
    cancel: CancellationToken,
}

impl DispatchContext {
    pub(crate) fn new(client: Client, cancel: CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// The client that dispatched the call; navigable results keep it.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deserializes `body` with the client's content serializer.
    pub fn deserialize<T: DeserializeOwned>(&self, meta: &ResponseMeta, body: &[u8]) -> Result<T> {
        let wrap = |source: BoxError| {
            tracing::error!(
                error = %source,
                status = meta.status.as_u16(),
                url = %meta.url,
                "Failed to deserialize response"
            );
            Error::Deserialization {
                status: meta.status,
                url: meta.url.clone(),
                headers: meta.headers.clone(),
                raw_response: String::from_utf8_lossy(body).into_owned(),
                source,
            }
        };
        let value = self.client.serializer().from_content(body).map_err(wrap)?;
        serde_json::from_value(value).map_err(|e| wrap(e.into()))
    }
}

/// A type a response can be turned into.
#[async_trait]
pub trait FromResponse: Sized + Send + 'static {
    /// The declared return shape this type satisfies.
    fn shape() -> ReturnShape;

    /// Builds the value from a response the exception factory accepted.
    async fn from_response(response: RawResponse, context: &DispatchContext) -> Result<Self>;

    /// Called when the exception factory classified the response as a
    /// failure. Envelopes absorb the error; everything else returns it.
    fn from_failure(meta: ResponseMeta, error: Error) -> Result<Self> {
        let _ = meta;
        Err(error)
    }
}

#[async_trait]
impl FromResponse for () {
    fn shape() -> ReturnShape {
        ReturnShape::Unit
    }

    async fn from_response(_response: RawResponse, _context: &DispatchContext) -> Result<Self> {
        Ok(())
    }
}

#[async_trait]
impl FromResponse for RawResponse {
    fn shape() -> ReturnShape {
        ReturnShape::RawResponse
    }

    async fn from_response(response: RawResponse, _context: &DispatchContext) -> Result<Self> {
        Ok(response)
    }
}

#[async_trait]
impl FromResponse for Bytes {
    fn shape() -> ReturnShape {
        ReturnShape::Content
    }

    async fn from_response(response: RawResponse, _context: &DispatchContext) -> Result<Self> {
        response.bytes().await
    }
}

#[async_trait]
impl FromResponse for ByteStream {
    fn shape() -> ReturnShape {
        ReturnShape::Stream
    }

    async fn from_response(response: RawResponse, _context: &DispatchContext) -> Result<Self> {
        Ok(response.into_stream())
    }
}

#[async_trait]
impl FromResponse for String {
    fn shape() -> ReturnShape {
        ReturnShape::Text
    }

    async fn from_response(response: RawResponse, _context: &DispatchContext) -> Result<Self> {
        response.text().await
    }
}

#[async_trait]
impl<T> FromResponse for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn shape() -> ReturnShape {
        ReturnShape::Value
    }

    async fn from_response(response: RawResponse, context: &DispatchContext) -> Result<Self> {
        let meta = response.meta().clone();
        let body = response.bytes().await?;
        context.deserialize(&meta, &body).map(Json)
    }
}

#[async_trait]
impl<T> FromResponse for Vec<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn shape() -> ReturnShape {
        ReturnShape::Enumerable
    }

    async fn from_response(response: RawResponse, context: &DispatchContext) -> Result<Self> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        let meta = response.meta().clone();
        let body = response.bytes().await?;
        context.deserialize(&meta, &body)
    }
}

#[async_trait]
impl<T: FromResponse> FromResponse for ApiResponse<T> {
    fn shape() -> ReturnShape {
        ReturnShape::Envelope(Box::new(T::shape()))
    }

    async fn from_response(response: RawResponse, context: &DispatchContext) -> Result<Self> {
        let meta = response.meta().clone();
        match T::from_response(response, context).await {
            Ok(content) => Ok(ApiResponse::from_meta(meta, Some(content), None)),
            Err(error @ Error::Deserialization { .. }) => {
                Ok(ApiResponse::from_meta(meta, None, Some(error)))
            }
            Err(error) => Err(error),
        }
    }

    fn from_failure(meta: ResponseMeta, error: Error) -> Result<Self> {
        Ok(ApiResponse::from_meta(meta, None, Some(error)))
    }
}
