//! The contract dispatcher.
//!
//! A [`Client`] owns everything needed to turn a contract call into a typed
//! result: the base URL, the request factory, the transport, the exception
//! factory and the paging configuration. Use [`ClientBuilder`] to configure
//! one, then [`Client::service`] to bind it to a contract.

use crate::config::PagingConfig;
use crate::descriptor::{CollectionFormat, ContractDescriptor, MethodDescriptor, ReturnShape};
use crate::error::{Error, Result};
use crate::exception::{ExceptionFactory, RemoteServiceExceptionFactory};
use crate::format::{DefaultUrlParameterFormatter, UrlParameterFormatter};
use crate::registry::Registry;
use crate::request::{BuiltRequest, RequestFactory};
use crate::response::{DispatchContext, FromResponse, RawResponse, ResponseMeta};
use crate::retry::{RetryPredicate, RetryStrategy};
use crate::serializer::{ContentSerializer, JsonContentSerializer};
use crate::service::Service;
use crate::transport::{CompletionPolicy, ReqwestTransport, Transport};
use crate::value::Arg;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Dispatches contract calls against one base URL.
///
/// Cloning is cheap; clones share configuration and the connection pool.
/// Navigable results keep a clone so they can fetch further pages.
///
/// # Examples
///
/// ```no_run
/// use restract::{Client, ContractDescriptor, Json, MethodDescriptor, Parameter, ReturnShape, TypeTag};
/// use http::Method;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), restract::Error> {
/// let contract = ContractDescriptor::builder("Users")
///     .method(
///         MethodDescriptor::builder("Users", "get_user")
///             .http(Method::GET, "/users/{id}")
///             .param(Parameter::path("id", TypeTag::of::<u64>()))
///             .returns(ReturnShape::Value, TypeTag::of::<User>())
///             .build()?,
///     )
///     .build()?;
///
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
/// let users = client.service(contract);
///
/// let user: Json<User> = users.call("get_user").arg(123u64).send().await?;
/// println!("{} is {}", user.id, user.name);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    base_url: Url,
    default_headers: HeaderMap,
    transport: Arc<dyn Transport>,
    factory: RequestFactory,
    exception_factory: Arc<dyn ExceptionFactory>,
    paging: PagingConfig,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_str())
            .field("exception_factory", &self.inner.exception_factory)
            .field("paging", &self.inner.paging)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn paging_config(&self) -> &PagingConfig {
        &self.inner.paging
    }

    pub fn request_factory(&self) -> &RequestFactory {
        &self.inner.factory
    }

    /// The content serializer used for bodies and responses.
    pub fn serializer(&self) -> &Arc<dyn ContentSerializer> {
        self.inner.factory.serializer()
    }

    /// Binds this client to `contract`.
    pub fn service(&self, contract: ContractDescriptor) -> Service {
        Service::new(self.clone(), Arc::new(Registry::new(contract)))
    }

    /// Builds the request for `method` against the client's base URL.
    ///
    /// The second element is the cancellation token carried by the
    /// arguments, if any.
    pub fn build_request(
        &self,
        method: &MethodDescriptor,
        args: Vec<Arg>,
    ) -> Result<(BuiltRequest, Option<CancellationToken>)> {
        self.inner.factory.build(method, &self.inner.base_url, args)
    }

    /// Sends a request built for `method` and constructs `R` from the
    /// response.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ContractDefinition`] before sending when `R` does
    /// not produce the method's declared return shape. Otherwise see
    /// [`Client::fetch`].
    pub async fn dispatch<R: FromResponse>(
        &self,
        method: &MethodDescriptor,
        request: BuiltRequest,
        cancel: &CancellationToken,
    ) -> Result<R> {
        let requested = R::shape();
        if requested != *method.return_shape() {
            return Err(Error::ContractDefinition(format!(
                "`{}::{}` returns {:?}, but {:?} was requested",
                method.contract(),
                method.name(),
                method.return_shape(),
                requested
            )));
        }
        self.fetch_request(request, cancel).await
    }

    /// Issues a GET for `url` and constructs `R` from the response.
    ///
    /// Navigable results use this to follow links.
    ///
    /// # Errors
    ///
    /// * [`Error::Cancelled`] when `cancel` fires before the result is built.
    /// * [`Error::Network`] when no response arrives.
    /// * Whatever the exception factory produces for a failed response,
    ///   unless `R` is an envelope.
    /// * [`Error::Deserialization`] when the body does not fit `R`.
    pub async fn fetch<R: FromResponse>(&self, url: Url, cancel: &CancellationToken) -> Result<R> {
        self.fetch_request(BuiltRequest::get(url), cancel).await
    }

    async fn fetch_request<R: FromResponse>(
        &self,
        mut request: BuiltRequest,
        cancel: &CancellationToken,
    ) -> Result<R> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        for (name, value) in &self.inner.default_headers {
            if !request.headers.contains_key(name) {
                request.headers.insert(name.clone(), value.clone());
            }
        }

        let method = request.method.clone();
        let url = request.url.clone();
        let start_time = Instant::now();
        let response = self
            .inner
            .transport
            .send(request, CompletionPolicy::ResponseHeadersRead, cancel)
            .await?;
        let latency = start_time.elapsed();

        tracing::info!(
            method = %method,
            url = %url,
            status = response.status().as_u16(),
            latency_ms = latency.as_millis() as u64,
            "Received HTTP response"
        );

        let meta = ResponseMeta {
            method,
            url,
            status: response.status(),
            headers: response.headers().clone(),
            latency,
        };
        let mut raw = RawResponse::new(meta, response, cancel.clone());
        let context = DispatchContext::new(self.clone(), cancel.clone());

        if R::shape() != ReturnShape::RawResponse {
            if let Some(error) = self.inner.exception_factory.create(&mut raw).await {
                // Envelopes absorb remote failures, never cancellation.
                if error.is_cancelled() {
                    return Err(error);
                }
                return R::from_failure(raw.meta().clone(), error);
            }
        }
        R::from_response(raw, &context).await
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// Timeout and retry settings configure the default `reqwest` transport and
/// are ignored when a custom [`Transport`] is supplied.
///
/// # Examples
///
/// ```no_run
/// use restract::{ClientBuilder, PagingConfig, RetryStrategy};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), restract::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retry_strategy(RetryStrategy::ExponentialBackoff {
///         initial_delay: Duration::from_millis(100),
///         max_delay: Duration::from_secs(10),
///         max_retries: 3,
///         jitter: true,
///     })
///     .default_header("User-Agent", "my-app/1.0")?
///     .paging(PagingConfig::default().with_page_size_key("per_page"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    timeout: Option<Duration>,
    retry_strategy: RetryStrategy,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
    transport: Option<Arc<dyn Transport>>,
    serializer: Arc<dyn ContentSerializer>,
    url_formatter: Arc<dyn UrlParameterFormatter>,
    form_formatter: Option<Arc<dyn UrlParameterFormatter>>,
    exception_factory: Arc<dyn ExceptionFactory>,
    collection_format: CollectionFormat,
    buffered_bodies: bool,
    paging: PagingConfig,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: None,
            retry_strategy: RetryStrategy::None,
            retry_predicate: None,
            transport: None,
            serializer: Arc::new(JsonContentSerializer::default()),
            url_formatter: Arc::new(DefaultUrlParameterFormatter),
            form_formatter: None,
            exception_factory: Arc::new(RemoteServiceExceptionFactory::default()),
            collection_format: CollectionFormat::default(),
            buffered_bodies: false,
            paging: PagingConfig::default(),
        }
    }

    /// Sets the base URL that relative paths are resolved against.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a header sent with every request that does not set it itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Per-attempt timeout for the default transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn ContentSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn url_formatter(mut self, formatter: Arc<dyn UrlParameterFormatter>) -> Self {
        self.url_formatter = formatter;
        self
    }

    /// Formatter for url-encoded body fields. Defaults to the URL formatter.
    pub fn form_formatter(mut self, formatter: Arc<dyn UrlParameterFormatter>) -> Self {
        self.form_formatter = Some(formatter);
        self
    }

    pub fn exception_factory(mut self, factory: Arc<dyn ExceptionFactory>) -> Self {
        self.exception_factory = factory;
        self
    }

    /// Collection format for query parameters that do not declare one.
    pub fn collection_format(mut self, format: CollectionFormat) -> Self {
        self.collection_format = format;
        self
    }

    /// Serialize bodies while building requests instead of while sending.
    pub fn buffered_bodies(mut self, buffered: bool) -> Self {
        self.buffered_bodies = buffered;
        self
    }

    pub fn paging(mut self, paging: PagingConfig) -> Self {
        self.paging = paging;
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL was provided or if the HTTP client
    /// cannot be created.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::Configuration("Base URL is required".to_string()))?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let http = reqwest::Client::builder().build().map_err(|e| {
                    Error::Configuration(format!("Failed to build HTTP client: {}", e))
                })?;
                let mut transport =
                    ReqwestTransport::new(http).retry_strategy(self.retry_strategy);
                if let Some(timeout) = self.timeout {
                    transport = transport.timeout(timeout);
                }
                if let Some(predicate) = self.retry_predicate {
                    transport = transport.retry_predicate(predicate);
                }
                Arc::new(transport)
            }
        };

        let mut factory = RequestFactory::new(self.serializer, self.url_formatter)
            .with_collection_format(self.collection_format)
            .with_buffered_bodies(self.buffered_bodies);
        if let Some(form_formatter) = self.form_formatter {
            factory = factory.with_form_formatter(form_formatter);
        }

        Ok(Client {
            inner: Arc::new(ClientInner {
                base_url,
                default_headers: self.default_headers,
                transport,
                factory,
                exception_factory: self.exception_factory,
                paging: self.paging,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{ApiResponse, Json};
    use http::Method;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn echo_method(shape: ReturnShape) -> MethodDescriptor {
        MethodDescriptor::builder("Echo", "echo")
            .http(Method::GET, "/echo")
            .returns_shape(shape)
            .build()
            .unwrap()
    }

    #[test]
    fn base_url_is_required() {
        assert!(matches!(
            ClientBuilder::new().build(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn invalid_default_header_is_rejected() {
        let result = ClientBuilder::new().default_header("bad header", "x");
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn mismatched_return_type_is_rejected_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = Client::builder().base_url(server.uri()).unwrap().build().unwrap();
        let descriptor = echo_method(ReturnShape::Text);
        let (request, _) = client.build_request(&descriptor, vec![]).unwrap();

        let err = client
            .dispatch::<Json<u32>>(&descriptor, request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContractDefinition(_)));
    }

    #[tokio::test]
    async fn default_headers_do_not_override_request_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/echo"))
            .and(header("x-tenant", "acme"))
            .and(header("x-trace", "from-call"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = Client::builder()
            .base_url(server.uri())
            .unwrap()
            .default_header("x-tenant", "acme")
            .unwrap()
            .default_header("x-trace", "default")
            .unwrap()
            .build()
            .unwrap();
        let descriptor = MethodDescriptor::builder("Echo", "echo")
            .http(Method::GET, "/echo")
            .header("X-Trace", Some("from-call"))
            .returns_shape(ReturnShape::Text)
            .build()
            .unwrap();
        let (request, _) = client.build_request(&descriptor, vec![]).unwrap();

        let body: String = client
            .dispatch(&descriptor, request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn raw_responses_skip_failure_classification() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("broken"))
            .mount(&server)
            .await;

        let client = Client::builder().base_url(server.uri()).unwrap().build().unwrap();
        let descriptor = echo_method(ReturnShape::RawResponse);
        let (request, _) = client.build_request(&descriptor, vec![]).unwrap();

        let raw: RawResponse = client
            .dispatch(&descriptor, request, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(raw.status(), 500);
        assert_eq!(raw.text().await.unwrap(), "broken");
    }

    #[tokio::test]
    async fn cancelled_token_fails_without_sending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = Client::builder().base_url(server.uri()).unwrap().build().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let url = Url::parse(&format!("{}/echo", server.uri())).unwrap();

        let err = client.fetch::<String>(url, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[derive(Debug)]
    struct CancelWhileReading(CancellationToken);

    #[async_trait::async_trait]
    impl ExceptionFactory for CancelWhileReading {
        async fn create(&self, response: &mut RawResponse) -> Option<Error> {
            self.0.cancel();
            response.buffer().await.err()
        }
    }

    #[tokio::test]
    async fn cancellation_while_classifying_is_not_wrapped_in_an_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("broken"))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let client = Client::builder()
            .base_url(server.uri())
            .unwrap()
            .exception_factory(Arc::new(CancelWhileReading(cancel.clone())))
            .build()
            .unwrap();
        let descriptor = echo_method(ReturnShape::Envelope(Box::new(ReturnShape::Text)));
        let (request, _) = client.build_request(&descriptor, vec![]).unwrap();

        let result = client
            .dispatch::<ApiResponse<String>>(&descriptor, request, &cancel)
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
