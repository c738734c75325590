//! Building transport requests from a method descriptor and its arguments.
//!
//! [`RequestFactory::build`] binds each argument to its parameter role:
//!
//! * path placeholders are substituted (escaped, case-insensitive match)
//! * headers are applied in declaration order, so the last write wins and a
//!   `None` value removes the header
//! * the body is encoded according to its serialization mode
//! * everything else lands in the query string after any query already
//!   present in the path template, or in the multipart body for multipart
//!   methods

use crate::descriptor::{
    BodySerialization, CollectionFormat, MethodDescriptor, ParameterRole, QuerySpec, PLACEHOLDER,
};
use crate::error::{Error, Result};
use crate::format::{
    encode_query, escape_data, escape_round_trip, FormatContext, PairTarget, PairWriter,
    UrlParameterFormatter,
};
use crate::multipart::{MultipartBody, MultipartItem};
use crate::serializer::ContentSerializer;
use crate::value::{Arg, ByteStream, Composite, Scalar};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use http::{HeaderMap, Method};
use regex::Captures;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Property key holding the name of the contract a request was built for.
pub const CONTRACT_PROPERTY: &str = "restract.contract";
/// Property key holding the name of the invoked method.
pub const METHOD_PROPERTY: &str = "restract.method";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Per-request key/value bag, visible to transports.
#[derive(Debug, Default)]
pub struct RequestProperties {
    values: HashMap<String, Arg>,
}

impl RequestProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Arg) {
        self.values.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Arg> {
        self.values.get(key)
    }

    pub fn try_clone(&self) -> Option<Self> {
        let values = self
            .values
            .iter()
            .map(|(k, v)| Some((k.clone(), v.try_clone()?)))
            .collect::<Option<_>>()?;
        Some(Self { values })
    }

    /// The contract this request was built for, if it came from a contract call.
    pub fn contract(&self) -> Option<&str> {
        match self.values.get(CONTRACT_PROPERTY) {
            Some(Arg::Scalar(Scalar::Str(name))) => Some(name),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arg)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A request body.
pub enum RequestBody {
    Bytes {
        data: Bytes,
        content_type: Option<String>,
    },
    Stream {
        stream: ByteStream,
        content_type: Option<String>,
    },
    /// Serialized when the request is sent.
    Deferred {
        value: Arg,
        serializer: Arc<dyn ContentSerializer>,
    },
    Multipart(MultipartBody),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Bytes { data, content_type } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("content_type", content_type)
                .finish(),
            RequestBody::Stream { content_type, .. } => f
                .debug_struct("Stream")
                .field("content_type", content_type)
                .finish_non_exhaustive(),
            RequestBody::Deferred { value, .. } => {
                f.debug_struct("Deferred").field("value", value).finish_non_exhaustive()
            }
            RequestBody::Multipart(body) => f.debug_tuple("Multipart").field(body).finish(),
        }
    }
}

impl RequestBody {
    pub fn bytes(data: impl Into<Bytes>, content_type: Option<&str>) -> Self {
        RequestBody::Bytes {
            data: data.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    /// Whether the body can be sent again, e.g. for a retry.
    pub fn is_replayable(&self) -> bool {
        match self {
            RequestBody::Stream { .. } => false,
            RequestBody::Multipart(body) => body.is_replayable(),
            RequestBody::Deferred { value, .. } => value.try_clone().is_some(),
            RequestBody::Bytes { .. } => true,
        }
    }

    pub fn try_clone(&self) -> Option<Self> {
        Some(match self {
            RequestBody::Bytes { data, content_type } => RequestBody::Bytes {
                data: data.clone(),
                content_type: content_type.clone(),
            },
            RequestBody::Deferred { value, serializer } => RequestBody::Deferred {
                value: value.try_clone()?,
                serializer: Arc::clone(serializer),
            },
            RequestBody::Multipart(body) => RequestBody::Multipart(body.try_clone()?),
            RequestBody::Stream { .. } => return None,
        })
    }

    /// Produces the wire body and its content type.
    pub fn into_wire(self) -> Result<(reqwest::Body, Option<String>)> {
        Ok(match self {
            RequestBody::Bytes { data, content_type } => (reqwest::Body::from(data), content_type),
            RequestBody::Stream {
                stream,
                content_type,
            } => (reqwest::Body::wrap_stream(stream), content_type),
            RequestBody::Deferred { value, serializer } => {
                let content = serializer.to_content(&value)?;
                (reqwest::Body::from(content.data), content.content_type)
            }
            RequestBody::Multipart(body) => {
                let (wire, content_type) = body.into_wire()?;
                (wire, Some(content_type))
            }
        })
    }
}

/// A fully built request, ready for a transport.
#[derive(Debug)]
pub struct BuiltRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<RequestBody>,
    pub properties: RequestProperties,
}

impl BuiltRequest {
    /// A bodiless `GET`, used to follow navigation links.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            properties: RequestProperties::new(),
        }
    }

    /// Clones the request unless its body is a one-shot stream.
    pub fn try_clone(&self) -> Option<Self> {
        let body = match &self.body {
            Some(body) => Some(body.try_clone()?),
            None => None,
        };
        Some(Self {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body,
            properties: self.properties.try_clone()?,
        })
    }
}

/// Builds requests for contract methods.
#[derive(Debug, Clone)]
pub struct RequestFactory {
    serializer: Arc<dyn ContentSerializer>,
    formatter: Arc<dyn UrlParameterFormatter>,
    form_formatter: Arc<dyn UrlParameterFormatter>,
    collection_format: CollectionFormat,
    buffered: bool,
}

impl RequestFactory {
    pub fn new(
        serializer: Arc<dyn ContentSerializer>,
        formatter: Arc<dyn UrlParameterFormatter>,
    ) -> Self {
        Self {
            serializer,
            form_formatter: Arc::clone(&formatter),
            formatter,
            collection_format: CollectionFormat::default(),
            buffered: false,
        }
    }

    /// Formatter for url-encoded body fields; defaults to the URL formatter.
    pub fn with_form_formatter(mut self, formatter: Arc<dyn UrlParameterFormatter>) -> Self {
        self.form_formatter = formatter;
        self
    }

    /// Collection format for parameters that do not declare one.
    pub fn with_collection_format(mut self, format: CollectionFormat) -> Self {
        self.collection_format = format;
        self
    }

    /// Serialize bodies while building instead of when sending.
    pub fn with_buffered_bodies(mut self, buffered: bool) -> Self {
        self.buffered = buffered;
        self
    }

    pub fn serializer(&self) -> &Arc<dyn ContentSerializer> {
        &self.serializer
    }

    /// Builds the request for `method` against `base_url`.
    ///
    /// Returns the request and the call's cancellation token, when one of the
    /// arguments carried it.
    pub fn build(
        &self,
        method: &MethodDescriptor,
        base_url: &Url,
        args: Vec<Arg>,
    ) -> Result<(BuiltRequest, Option<CancellationToken>)> {
        let parameters = method.parameters();
        if args.len() != parameters.len() {
            return Err(Error::Configuration(format!(
                "`{}` takes {} arguments, {} given",
                method.name(),
                parameters.len(),
                args.len()
            )));
        }

        let writer = PairWriter {
            formatter: self.formatter.as_ref(),
            serializer: self.serializer.as_ref(),
            collection_format: self.collection_format,
        };

        let (template_path, template_query) = match method.relative_path().split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (method.relative_path(), None),
        };

        let mut path_values: HashMap<String, String> = HashMap::new();
        let mut header_ops: Vec<(String, Option<String>)> = method.headers().to_vec();
        let mut query: Vec<(String, String)> = template_query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        let mut properties = RequestProperties::new();
        let mut body: Option<RequestBody> = None;
        let mut multipart = method.is_multipart().then(MultipartBody::new);
        let mut cancellation = None;

        for (parameter, arg) in parameters.iter().zip(args) {
            let context = FormatContext {
                name: &parameter.name,
                type_tag: Some(&parameter.type_tag),
                format: None,
            };
            match &parameter.role {
                ParameterRole::Path { name } => {
                    let value = self.path_value(&parameter.name, &arg, &context)?;
                    path_values.insert(name.to_ascii_lowercase(), escape_data(&value));
                }
                ParameterRole::RoundTripPath { name } => {
                    let value = self.path_value(&parameter.name, &arg, &context)?;
                    path_values.insert(name.to_ascii_lowercase(), escape_round_trip(&value));
                }
                ParameterRole::ObjectExpansion { path_properties } => {
                    let remaining = self.expand_object(
                        &parameter.name,
                        arg,
                        path_properties,
                        &mut path_values,
                    )?;
                    if let Some(rest) = remaining {
                        writer.write_parameter(
                            &parameter.name,
                            None,
                            &Arg::Object(rest),
                            &QuerySpec::default(),
                            PairTarget::Query,
                            &mut query,
                        )?;
                    }
                }
                ParameterRole::Query { name, spec } => {
                    writer.write_parameter(
                        name,
                        Some(&parameter.type_tag),
                        &arg,
                        spec,
                        PairTarget::Query,
                        &mut query,
                    )?;
                }
                ParameterRole::Field { name } => match multipart.as_mut() {
                    Some(parts) => {
                        for item in MultipartItem::from_arg(name, arg, self.serializer.as_ref())? {
                            parts.push(item);
                        }
                    }
                    None => writer.write_parameter(
                        name,
                        Some(&parameter.type_tag),
                        &arg,
                        &QuerySpec::default(),
                        PairTarget::Query,
                        &mut query,
                    )?,
                },
                ParameterRole::Header { name } => {
                    header_ops.push((name.clone(), self.header_value(&arg, &context)?));
                }
                ParameterRole::HeaderBag => match arg {
                    Arg::Null => {}
                    Arg::Headers(headers) => header_ops.extend(headers),
                    Arg::Map(entries) => {
                        for (key, value) in entries {
                            header_ops.push((key.to_string(), self.header_value(&value, &context)?));
                        }
                    }
                    other => {
                        return Err(Error::Configuration(format!(
                            "header collection `{}` cannot be a {} value",
                            parameter.name,
                            other.type_name()
                        )))
                    }
                },
                ParameterRole::Authorization { scheme } => {
                    if let Some(token) = self.header_value(&arg, &context)? {
                        header_ops.push((AUTHORIZATION.as_str().to_string(), Some(format!("{} {}", scheme, token))));
                    }
                }
                ParameterRole::Property { key } => properties.insert(key.clone(), arg),
                ParameterRole::Body { mode, buffered } => {
                    body = self.body(&parameter.name, *mode, buffered.unwrap_or(self.buffered), arg)?;
                }
                ParameterRole::Cancellation => match arg {
                    Arg::Null => {}
                    Arg::Cancel(token) => cancellation = Some(token),
                    other => {
                        return Err(Error::Configuration(format!(
                            "`{}` expects a cancellation token, got a {} value",
                            parameter.name,
                            other.type_name()
                        )))
                    }
                },
            }
        }

        properties.insert(CONTRACT_PROPERTY, Arg::from(method.contract()));
        properties.insert(METHOD_PROPERTY, Arg::from(method.name()));

        let path = PLACEHOLDER.replace_all(template_path, |caps: &Captures| {
            path_values
                .get(&caps[2].to_ascii_lowercase())
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });

        let base_path = base_url.path().trim_end_matches('/');
        let mut url = base_url.clone();
        url.set_path(&format!("{}{}", base_path, path));
        url.set_fragment(None);
        let encoded = encode_query(&query);
        url.set_query((!encoded.is_empty()).then_some(encoded.as_str()));

        let headers = apply_headers(header_ops)?;

        if let Some(parts) = multipart {
            body = Some(RequestBody::Multipart(parts));
        }
        if body.is_none()
            && !headers.is_empty()
            && method.http_method() != Method::GET
            && method.http_method() != Method::HEAD
        {
            body = Some(RequestBody::bytes(Bytes::new(), None));
        }

        tracing::trace!(
            contract = %method.contract(),
            method = %method.name(),
            url = %url,
            "Built request"
        );

        Ok((
            BuiltRequest {
                method: method.http_method().clone(),
                url,
                headers,
                body,
                properties,
            },
            cancellation,
        ))
    }

    fn path_value(&self, name: &str, arg: &Arg, context: &FormatContext<'_>) -> Result<String> {
        match arg {
            Arg::Null => Ok(String::new()),
            Arg::Scalar(scalar) => Ok(self.formatter.format(scalar, context).unwrap_or_default()),
            other => Err(Error::Configuration(format!(
                "path parameter `{}` cannot be a {} value",
                name,
                other.type_name()
            ))),
        }
    }

    fn header_value(&self, arg: &Arg, context: &FormatContext<'_>) -> Result<Option<String>> {
        match arg {
            Arg::Null => Ok(None),
            Arg::Scalar(scalar) => Ok(self.formatter.format(scalar, context)),
            other => Err(Error::Configuration(format!(
                "header `{}` cannot be a {} value",
                context.name,
                other.type_name()
            ))),
        }
    }

    /// Fills path placeholders from an object's properties and returns the
    /// properties left for the query string.
    fn expand_object(
        &self,
        name: &str,
        arg: Arg,
        path_properties: &[String],
        path_values: &mut HashMap<String, String>,
    ) -> Result<Option<Composite>> {
        let composite = match arg {
            Arg::Null => Composite::default(),
            Arg::Object(composite) => composite,
            other => {
                return Err(Error::Configuration(format!(
                    "`{}` must be an object to fill path placeholders, got a {} value",
                    name,
                    other.type_name()
                )))
            }
        };

        let (bound, rest): (Vec<_>, Vec<_>) = composite
            .properties
            .into_iter()
            .partition(|p| path_properties.iter().any(|n| n.eq_ignore_ascii_case(&p.name)));

        for placeholder in path_properties {
            let value = match bound.iter().find(|p| p.name.eq_ignore_ascii_case(placeholder)) {
                Some(property) => self.path_value(
                    &property.name,
                    &property.value,
                    &FormatContext::named(&property.name),
                )?,
                None => String::new(),
            };
            path_values.insert(placeholder.to_ascii_lowercase(), escape_data(&value));
        }

        Ok((!rest.is_empty()).then(|| Composite {
            type_name: composite.type_name,
            properties: rest,
        }))
    }

    fn body(
        &self,
        name: &str,
        mode: BodySerialization,
        buffered: bool,
        arg: Arg,
    ) -> Result<Option<RequestBody>> {
        let body = match (mode, arg) {
            (_, Arg::Null) => return Ok(None),
            (_, Arg::Content(content)) => RequestBody::Bytes {
                data: content.data,
                content_type: content.content_type,
            },
            (_, Arg::Stream(stream)) => RequestBody::Stream {
                stream,
                content_type: None,
            },
            (_, Arg::Bytes(data)) => RequestBody::bytes(data, Some(OCTET_STREAM)),
            (BodySerialization::Default, Arg::Scalar(Scalar::Str(text))) => {
                RequestBody::bytes(text, Some(TEXT_CONTENT_TYPE))
            }
            (BodySerialization::UrlEncoded, Arg::Scalar(scalar)) => {
                RequestBody::bytes(escape_data(&scalar.to_string()), Some(FORM_CONTENT_TYPE))
            }
            (BodySerialization::UrlEncoded, value) => {
                let writer = PairWriter {
                    formatter: self.form_formatter.as_ref(),
                    serializer: self.serializer.as_ref(),
                    collection_format: self.collection_format,
                };
                let mut pairs = Vec::new();
                writer.write_parameter(
                    name,
                    None,
                    &value,
                    &QuerySpec::default(),
                    PairTarget::Form,
                    &mut pairs,
                )?;
                let encoded = serde_urlencoded::to_string(&pairs)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                RequestBody::bytes(encoded, Some(FORM_CONTENT_TYPE))
            }
            (_, value) => {
                if buffered || value.to_json().is_none() {
                    let content = self.serializer.to_content(&value)?;
                    RequestBody::Bytes {
                        data: content.data,
                        content_type: content.content_type,
                    }
                } else {
                    RequestBody::Deferred {
                        value,
                        serializer: Arc::clone(&self.serializer),
                    }
                }
            }
        };
        Ok(Some(body))
    }
}

fn apply_headers(ops: Vec<(String, Option<String>)>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in ops {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::Configuration(format!("invalid header name `{}`: {}", name, e)))?;
        match value {
            Some(value) => {
                let value = HeaderValue::from_str(&value).map_err(|e| {
                    Error::Configuration(format!("invalid value for header `{}`: {}", name, e))
                })?;
                headers.insert(name, value);
            }
            None => {
                headers.remove(&name);
            }
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Parameter, TypeTag};
    use crate::format::DefaultUrlParameterFormatter;
    use crate::multipart::PartData;
    use crate::serializer::{FieldNaming, JsonContentSerializer};
    use crate::value::Property;

    fn factory() -> RequestFactory {
        RequestFactory::new(
            Arc::new(JsonContentSerializer::new(FieldNaming::CamelCase)),
            Arc::new(DefaultUrlParameterFormatter),
        )
    }

    fn base() -> Url {
        Url::parse("https://api.test/v1/").unwrap()
    }

    fn method(http: Method, path: &str, params: Vec<Parameter>) -> MethodDescriptor {
        let mut builder = MethodDescriptor::builder("Api", "call").http(http, path);
        for p in params {
            builder = builder.param(p);
        }
        builder.build().unwrap()
    }

    fn body_bytes(request: &BuiltRequest) -> (&[u8], Option<&str>) {
        match request.body.as_ref().unwrap() {
            RequestBody::Bytes { data, content_type } => (&data[..], content_type.as_deref()),
            other => panic!("expected bytes body, got {:?}", other),
        }
    }

    #[test]
    fn path_values_are_escaped_and_base_path_is_kept() {
        let m = method(
            Method::GET,
            "/users/{id}",
            vec![Parameter::path("id", TypeTag::of::<String>())],
        );
        let (request, _) = factory().build(&m, &base(), vec![Arg::from("a b/c")]).unwrap();
        assert_eq!(request.url.as_str(), "https://api.test/v1/users/a%20b%2Fc");
    }

    #[test]
    fn root_base_path_is_not_doubled() {
        let m = method(Method::GET, "/ping", vec![]);
        let base = Url::parse("https://api.test/").unwrap();
        let (request, _) = factory().build(&m, &base, vec![]).unwrap();
        assert_eq!(request.url.as_str(), "https://api.test/ping");
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let m = method(
            Method::GET,
            "/a/{x}/b/{y}",
            vec![
                Parameter::path("x", TypeTag::of::<String>()),
                Parameter::path("y", TypeTag::of::<String>()),
            ],
        );
        let (request, _) = factory()
            .build(&m, &base(), vec![Arg::from("{y}"), Arg::from("2")])
            .unwrap();
        assert_eq!(request.url.path(), "/v1/a/%7By%7D/b/2");
    }

    #[test]
    fn round_trip_paths_keep_separators() {
        let m = method(
            Method::GET,
            "/files/{**path}",
            vec![Parameter::round_trip_path("path", TypeTag::of::<String>())],
        );
        let (request, _) = factory()
            .build(&m, &base(), vec![Arg::from("docs/my file.txt")])
            .unwrap();
        assert_eq!(request.url.path(), "/v1/files/docs/my%20file.txt");
    }

    #[test]
    fn object_properties_fill_path_and_rest_goes_to_query() {
        let m = method(
            Method::GET,
            "/orgs/{org}/repos/{repo}",
            vec![Parameter::object("key", TypeTag::named("RepoKey"), &["org", "repo"])],
        );
        let key = Composite::new("RepoKey")
            .field("Org", "acme")
            .field("Repo", "tools")
            .field("verbose", true);
        let (request, _) = factory().build(&m, &base(), vec![Arg::Object(key)]).unwrap();
        assert_eq!(request.url.path(), "/v1/orgs/acme/repos/tools");
        assert_eq!(request.url.query(), Some("verbose=true"));
    }

    #[test]
    fn template_query_comes_first_and_nulls_are_dropped() {
        let m = method(
            Method::GET,
            "/search?fixed=1&x=a%20b",
            vec![
                Parameter::query("q", TypeTag::of::<String>()),
                Parameter::field("limit", TypeTag::of::<u32>()),
                Parameter::query("missing", TypeTag::of::<String>()),
            ],
        );
        let (request, _) = factory()
            .build(
                &m,
                &base(),
                vec![Arg::from("rust & go"), Arg::from(10u32), Arg::Null],
            )
            .unwrap();
        assert_eq!(
            request.url.query(),
            Some("fixed=1&x=a%20b&q=rust%20%26%20go&limit=10")
        );
    }

    #[test]
    fn query_prefix_applies_to_objects() {
        let m = method(
            Method::GET,
            "/items",
            vec![Parameter::query_with(
                "filter",
                TypeTag::named("Filter"),
                QuerySpec::default().prefix("f"),
            )],
        );
        let filter = Composite::new("Filter")
            .field("tags", vec!["a", "b"])
            .with(Property::new("min_price", 5).alias("min"));
        let (request, _) = factory().build(&m, &base(), vec![Arg::Object(filter)]).unwrap();
        assert_eq!(request.url.query(), Some("f.tags=a%2Cb&f.min=5"));
    }

    #[test]
    fn headers_last_write_wins_and_null_removes() {
        let m = MethodDescriptor::builder("Api", "call")
            .http(Method::GET, "/h")
            .header("X-Static", Some("static"))
            .header("X-Removed", Some("gone"))
            .param(Parameter::header("a", "X-Static", TypeTag::of::<String>()))
            .param(Parameter::header("b", "x-removed", TypeTag::of::<String>()))
            .param(Parameter::header_bag("extra"))
            .param(Parameter::authorization("token", "Bearer"))
            .build()
            .unwrap();
        let (request, _) = factory()
            .build(
                &m,
                &base(),
                vec![
                    Arg::from("dynamic"),
                    Arg::Null,
                    Arg::Headers(vec![("X-Bag".into(), Some("1".into()))]),
                    Arg::from("abc"),
                ],
            )
            .unwrap();
        assert_eq!(request.headers["x-static"], "dynamic");
        assert!(request.headers.get("x-removed").is_none());
        assert_eq!(request.headers["x-bag"], "1");
        assert_eq!(request.headers["authorization"], "Bearer abc");
        assert!(request.body.is_none());
    }

    #[test]
    fn headers_on_bodiless_post_add_empty_content() {
        let m = MethodDescriptor::builder("Api", "call")
            .http(Method::POST, "/p")
            .header("X-Trace", Some("1"))
            .build()
            .unwrap();
        let (request, _) = factory().build(&m, &base(), vec![]).unwrap();
        let (data, content_type) = body_bytes(&request);
        assert!(data.is_empty());
        assert!(content_type.is_none());
    }

    #[test]
    fn string_bodies_are_sent_as_text() {
        let m = method(
            Method::POST,
            "/notes",
            vec![Parameter::body("note", TypeTag::of::<String>(), BodySerialization::Default)],
        );
        let (request, _) = factory().build(&m, &base(), vec![Arg::from("hi")]).unwrap();
        assert_eq!(body_bytes(&request), (&b"hi"[..], Some(TEXT_CONTENT_TYPE)));
    }

    #[test]
    fn url_encoded_bodies_use_serializer_field_names() {
        let m = method(
            Method::POST,
            "/login",
            vec![Parameter::body("form", TypeTag::named("Login"), BodySerialization::UrlEncoded)],
        );
        let form = Composite::new("Login")
            .field("user_name", "ann lee")
            .with(Property::new("secret", "p&w").alias("pwd"));
        let (request, _) = factory().build(&m, &base(), vec![Arg::Object(form)]).unwrap();
        assert_eq!(
            body_bytes(&request),
            (&b"userName=ann+lee&pwd=p%26w"[..], Some(FORM_CONTENT_TYPE))
        );
    }

    #[test]
    fn json_bodies_are_deferred_unless_buffered() {
        let m = method(
            Method::POST,
            "/users",
            vec![Parameter::body("user", TypeTag::named("User"), BodySerialization::Json)],
        );
        let user = || Arg::Object(Composite::new("User").field("first_name", "Ann"));

        let (request, _) = factory().build(&m, &base(), vec![user()]).unwrap();
        assert!(matches!(request.body, Some(RequestBody::Deferred { .. })));

        let (request, _) = factory()
            .with_buffered_bodies(true)
            .build(&m, &base(), vec![user()])
            .unwrap();
        assert_eq!(body_bytes(&request).0, br#"{"firstName":"Ann"}"#);
    }

    #[test]
    fn multipart_captures_fields_but_not_explicit_queries() {
        let m = MethodDescriptor::builder("Api", "upload")
            .http(Method::POST, "/upload")
            .multipart()
            .param(Parameter::field("file", TypeTag::named("bytes")))
            .param(Parameter::field("comment", TypeTag::of::<String>()))
            .param(Parameter::query("overwrite", TypeTag::of::<bool>()))
            .build()
            .unwrap();
        let (request, _) = factory()
            .build(
                &m,
                &base(),
                vec![
                    Arg::Bytes(Bytes::from_static(b"data")),
                    Arg::from("first"),
                    Arg::from(true),
                ],
            )
            .unwrap();
        assert_eq!(request.url.query(), Some("overwrite=true"));
        let Some(RequestBody::Multipart(body)) = &request.body else {
            panic!("expected multipart body");
        };
        let names: Vec<_> = body.items().iter().map(|i| i.name.as_deref()).collect();
        assert_eq!(names, vec![Some("file"), Some("comment")]);
        assert!(matches!(body.items()[1].data, PartData::Text(ref t) if t == "first"));
    }

    #[test]
    fn properties_and_cancellation_never_reach_the_wire() {
        let m = method(
            Method::GET,
            "/items",
            vec![
                Parameter::property("tenant", "tenant", TypeTag::of::<String>()),
                Parameter::cancellation("cancel"),
            ],
        );
        let token = CancellationToken::new();
        let (request, cancel) = factory()
            .build(&m, &base(), vec![Arg::from("acme"), Arg::Cancel(token)])
            .unwrap();
        assert!(cancel.is_some());
        assert_eq!(request.url.query(), None);
        assert_eq!(request.properties.contract(), Some("Api"));
        assert!(matches!(
            request.properties.get("tenant"),
            Some(Arg::Scalar(Scalar::Str(s))) if s == "acme"
        ));
    }

    #[test]
    fn argument_count_must_match() {
        let m = method(Method::GET, "/items", vec![]);
        let err = factory().build(&m, &base(), vec![Arg::from(1)]).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn deferred_bodies_serialize_on_the_wire() {
        let body = RequestBody::Deferred {
            value: Arg::from(vec![1, 2]),
            serializer: Arc::new(JsonContentSerializer::default()),
        };
        let (wire, content_type) = body.into_wire().unwrap();
        assert_eq!(wire.as_bytes(), Some(&b"[1,2]"[..]));
        assert!(content_type.unwrap().starts_with("application/json"));
    }

    #[test]
    fn streamed_values_make_a_request_unreplayable() {
        let stream: ByteStream = Box::pin(futures::stream::empty());
        let mut request = BuiltRequest::get(base());
        request.method = Method::POST;
        request.body = Some(RequestBody::Deferred {
            value: Arg::List(vec![Arg::from(1), Arg::Stream(stream)]),
            serializer: Arc::new(JsonContentSerializer::default()),
        });
        assert!(!request.body.as_ref().unwrap().is_replayable());
        assert!(request.try_clone().is_none());

        request.body = Some(RequestBody::Deferred {
            value: Arg::from(vec![1, 2]),
            serializer: Arc::new(JsonContentSerializer::default()),
        });
        request.properties.insert("tenant", Arg::from("acme"));
        let copy = request.try_clone().unwrap();
        assert_eq!(copy.properties.get("tenant").and_then(Arg::as_scalar), Some(&Scalar::Str("acme".into())));
    }
}
