//! Sending built requests.
//!
//! The [`Transport`] trait is the seam between request building and the
//! network. [`ReqwestTransport`] is the default; tests substitute in-memory
//! implementations.

use crate::error::{Error, Result};
use crate::request::BuiltRequest;
use crate::retry::{AttemptOutcome, RetryOnTransient, RetryPredicate, RetryStrategy};
use async_trait::async_trait;
use http::header::CONTENT_TYPE;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// When [`Transport::send`] completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// As soon as the status line and headers have arrived.
    #[default]
    ResponseHeadersRead,
    /// Once the whole body has been read.
    ResponseContentRead,
}

/// Sends requests and hands back responses.
///
/// Implementations own the request once called and must honour `cancel`,
/// failing with [`Error::Cancelled`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: BuiltRequest,
        completion: CompletionPolicy,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response>;
}

/// `reqwest`-backed transport with optional retries.
///
/// # Examples
///
/// ```
/// use restract::transport::ReqwestTransport;
/// use restract::RetryStrategy;
/// use std::time::Duration;
///
/// let transport = ReqwestTransport::new(reqwest::Client::new())
///     .timeout(Duration::from_secs(10))
///     .retry_strategy(RetryStrategy::Linear {
///         delay: Duration::from_millis(250),
///         max_retries: 2,
///     });
/// ```
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout: Option<Duration>,
    retry_strategy: RetryStrategy,
    retry_predicate: Box<dyn RetryPredicate>,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.timeout)
            .field("retry_strategy", &self.retry_strategy)
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: None,
            retry_strategy: RetryStrategy::None,
            retry_predicate: Box::new(RetryOnTransient),
        }
    }

    /// Per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Defaults to [`RetryOnTransient`].
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = predicate;
        self
    }

    async fn execute(&self, request: BuiltRequest, attempt: usize) -> Result<reqwest::Response> {
        let BuiltRequest {
            method,
            url,
            headers,
            body,
            properties,
        } = request;

        tracing::debug!(
            method = %method,
            url = %url,
            contract = properties.contract().unwrap_or("-"),
            attempt = attempt,
            "Executing HTTP request"
        );

        let explicit_content_type = headers.contains_key(CONTENT_TYPE);
        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            let (wire, content_type) = body.into_wire()?;
            if let (Some(content_type), false) = (content_type, explicit_content_type) {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            builder = builder.body(wire);
        }

        Ok(builder.send().await?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: BuiltRequest,
        completion: CompletionPolicy,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let may_retry = self.retry_strategy.max_retries() != Some(0);
        let mut request = request;
        let mut attempt = 0;

        let response = loop {
            attempt += 1;
            let replay = if may_retry { request.try_clone() } else { None };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                outcome = self.execute(request, attempt) => outcome,
            };

            let retry = match (&outcome, &replay) {
                (Ok(response), Some(_)) => self
                    .retry_predicate
                    .should_retry(&AttemptOutcome::Status(response.status()), attempt),
                (Err(Error::Network(e)), Some(_)) => self
                    .retry_predicate
                    .should_retry(&AttemptOutcome::Failed(e), attempt),
                _ => false,
            };
            let delay = if retry {
                self.retry_strategy.delay_for_attempt(attempt)
            } else {
                None
            };

            match (delay, replay) {
                (Some(delay), Some(next)) => {
                    match &outcome {
                        Ok(response) => tracing::warn!(
                            status = response.status().as_u16(),
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying request after delay"
                        ),
                        Err(e) => tracing::warn!(
                            error = %e,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Retrying request after delay"
                        ),
                    }
                    drop(outcome);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(Error::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    request = next;
                }
                _ => break outcome?,
            }
        };

        match completion {
            CompletionPolicy::ResponseHeadersRead => Ok(response),
            CompletionPolicy::ResponseContentRead => buffer_response(response, cancel).await,
        }
    }
}

async fn buffer_response(
    response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<reqwest::Response> {
    let status = response.status();
    let version = response.version();
    let headers = response.headers().clone();
    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        body = response.bytes() => body?,
    };

    let mut buffered = http::Response::new(body);
    *buffered.status_mut() = status;
    *buffered.version_mut() = version;
    *buffered.headers_mut() = headers;
    Ok(reqwest::Response::from(buffered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestBody;
    use std::time::Instant;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn get(server: &MockServer, p: &str) -> BuiltRequest {
        BuiltRequest::get(Url::parse(&format!("{}{}", server.uri(), p)).unwrap())
    }

    #[tokio::test]
    async fn sends_body_with_its_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("content-type", "text/plain; charset=utf-8"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = get(&server, "/echo");
        request.method = http::Method::POST;
        request.body = Some(RequestBody::bytes("hi", Some("text/plain; charset=utf-8")));

        let response = ReqwestTransport::new(reqwest::Client::new())
            .send(request, CompletionPolicy::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
    }

    #[tokio::test]
    async fn retries_transient_statuses_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(reqwest::Client::new()).retry_strategy(
            RetryStrategy::Linear {
                delay: Duration::from_millis(5),
                max_retries: 3,
            },
        );
        let response = transport
            .send(
                get(&server, "/flaky"),
                CompletionPolicy::ResponseContentRead,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn without_strategy_the_first_response_is_final() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let response = ReqwestTransport::new(reqwest::Client::new())
            .send(get(&server, "/"), CompletionPolicy::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(reqwest::Client::new()).retry_strategy(
            RetryStrategy::Linear {
                delay: Duration::from_secs(30),
                max_retries: 5,
            },
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = transport
            .send(get(&server, "/"), CompletionPolicy::default(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn cancelled_attempts_are_never_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(reqwest::Client::new())
            .retry_strategy(RetryStrategy::Linear {
                delay: Duration::from_millis(1),
                max_retries: 5,
            })
            .retry_predicate(Box::new(crate::retry::OrPredicate::new(vec![
                Box::new(RetryOnTransient),
                Box::new(crate::retry::RetryOnConnectionError),
            ])));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = transport
            .send(get(&server, "/"), CompletionPolicy::default(), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
