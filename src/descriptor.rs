//! Declarative description of service contracts.
//!
//! A [`ContractDescriptor`] lists the methods of a remote service. Each
//! [`MethodDescriptor`] carries the HTTP verb, the relative path template, the
//! role of every parameter and the declared return shape. Descriptors are
//! validated when they are built, so every malformed method is reported before
//! the first request is ever sent.
//!
//! # Examples
//!
//! ```
//! use restract::descriptor::{ContractDescriptor, MethodDescriptor, Parameter, ReturnShape, TypeTag};
//! use http::Method;
//!
//! let get_user = MethodDescriptor::builder("UserApi", "get_user")
//!     .http(Method::GET, "/users/{id}")
//!     .param(Parameter::path("id", TypeTag::of::<u64>()))
//!     .param(Parameter::query("verbose", TypeTag::of::<bool>()))
//!     .returns(ReturnShape::Value, TypeTag::named("User"))
//!     .build()
//!     .unwrap();
//!
//! let contract = ContractDescriptor::builder("UserApi").method(get_user).build().unwrap();
//! assert_eq!(contract.methods().len(), 1);
//! ```

use crate::error::{Error, Result};
use http::Method;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, LazyLock};

pub(crate) static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\*\*)?([^{}]+)\}").expect("placeholder pattern is valid"));

/// Identifies a parameter or generic argument type.
///
/// Tags only take part in overload resolution and generic closing; their
/// content is compared textually.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag(Cow<'static, str>);

impl TypeTag {
    /// Tag for a Rust type, using its type name.
    pub fn of<T: ?Sized>() -> Self {
        TypeTag(Cow::Borrowed(std::any::type_name::<T>()))
    }

    /// Tag with an explicit name.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        TypeTag(name.into())
    }

    /// Tag standing for the generic parameter `name` in an open method.
    pub fn generic(name: &str) -> Self {
        TypeTag(Cow::Owned(format!("<{}>", name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn generic_name(&self) -> Option<&str> {
        self.0.strip_prefix('<').and_then(|s| s.strip_suffix('>'))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a collection is rendered into a query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CollectionFormat {
    /// `a,b,c`
    #[default]
    Csv,
    /// `a b c`
    Ssv,
    /// `a\tb\tc`
    Tsv,
    /// `a|b|c`
    Pipes,
    /// One `key=value` pair per element.
    Multi,
}

impl CollectionFormat {
    /// Separator for joined formats; `None` for [`CollectionFormat::Multi`].
    pub fn separator(self) -> Option<&'static str> {
        match self {
            CollectionFormat::Csv => Some(","),
            CollectionFormat::Ssv => Some(" "),
            CollectionFormat::Tsv => Some("\t"),
            CollectionFormat::Pipes => Some("|"),
            CollectionFormat::Multi => None,
        }
    }
}

/// Body serialization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BodySerialization {
    /// Strings are sent as text; everything else goes through the serializer.
    #[default]
    Default,
    Json,
    UrlEncoded,
}

/// Query formatting options for a parameter or property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySpec {
    /// Prepended to flattened keys, joined with the delimiter.
    pub prefix: Option<String>,
    pub delimiter: String,
    /// Overrides the client-wide collection format.
    pub collection_format: Option<CollectionFormat>,
    /// Format hint handed to the URL parameter formatter.
    pub format: Option<String>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            prefix: None,
            delimiter: ".".to_string(),
            collection_format: None,
            format: None,
        }
    }
}

impl QuerySpec {
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn collection_format(mut self, format: CollectionFormat) -> Self {
        self.collection_format = Some(format);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// What a parameter contributes to the outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParameterRole {
    /// Substitutes `{name}` in the path, escaped as a single segment.
    Path { name: String },
    /// Substitutes `{**name}`; `/` separators are preserved.
    RoundTripPath { name: String },
    /// Explicit query parameter. Also opts out of multipart capture.
    Query { name: String, spec: QuerySpec },
    /// No explicit role: a query parameter, or a part in multipart methods.
    Field { name: String },
    /// Sets a single header. A null value removes it.
    Header { name: String },
    /// A collection of headers merged into the request.
    HeaderBag,
    Body {
        mode: BodySerialization,
        /// `None` defers to the client-wide buffering default.
        buffered: Option<bool>,
    },
    /// Attached to the request's property bag under `key`.
    Property { key: String },
    /// Sets `Authorization: {scheme} {value}`.
    Authorization { scheme: String },
    /// Cooperative cancellation; never reaches the wire.
    Cancellation,
    /// An object whose properties fill the listed path placeholders.
    ObjectExpansion { path_properties: Vec<String> },
}

impl ParameterRole {
    fn path_name(&self) -> Option<&str> {
        match self {
            ParameterRole::Path { name } | ParameterRole::RoundTripPath { name } => Some(name),
            _ => None,
        }
    }
}

/// A declared method parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Parameter {
    pub name: String,
    pub type_tag: TypeTag,
    pub role: ParameterRole,
}

impl Parameter {
    pub fn new(name: impl Into<String>, type_tag: TypeTag, role: ParameterRole) -> Self {
        Self {
            name: name.into(),
            type_tag,
            role,
        }
    }

    pub fn path(name: &str, type_tag: TypeTag) -> Self {
        Self::new(name, type_tag, ParameterRole::Path { name: name.to_string() })
    }

    pub fn round_trip_path(name: &str, type_tag: TypeTag) -> Self {
        Self::new(name, type_tag, ParameterRole::RoundTripPath { name: name.to_string() })
    }

    pub fn query(name: &str, type_tag: TypeTag) -> Self {
        Self::query_with(name, type_tag, QuerySpec::default())
    }

    pub fn query_with(name: &str, type_tag: TypeTag, spec: QuerySpec) -> Self {
        Self::new(
            name,
            type_tag,
            ParameterRole::Query {
                name: name.to_string(),
                spec,
            },
        )
    }

    pub fn field(name: &str, type_tag: TypeTag) -> Self {
        Self::new(name, type_tag, ParameterRole::Field { name: name.to_string() })
    }

    pub fn header(name: &str, header: &str, type_tag: TypeTag) -> Self {
        Self::new(name, type_tag, ParameterRole::Header { name: header.to_string() })
    }

    pub fn header_bag(name: &str) -> Self {
        Self::new(name, TypeTag::named("headers"), ParameterRole::HeaderBag)
    }

    pub fn body(name: &str, type_tag: TypeTag, mode: BodySerialization) -> Self {
        Self::new(name, type_tag, ParameterRole::Body { mode, buffered: None })
    }

    pub fn property(name: &str, key: &str, type_tag: TypeTag) -> Self {
        Self::new(name, type_tag, ParameterRole::Property { key: key.to_string() })
    }

    pub fn authorization(name: &str, scheme: &str) -> Self {
        Self::new(
            name,
            TypeTag::of::<String>(),
            ParameterRole::Authorization {
                scheme: scheme.to_string(),
            },
        )
    }

    pub fn cancellation(name: &str) -> Self {
        Self::new(name, TypeTag::named("cancellation"), ParameterRole::Cancellation)
    }

    pub fn object(name: &str, type_tag: TypeTag, path_properties: &[&str]) -> Self {
        Self::new(
            name,
            type_tag,
            ParameterRole::ObjectExpansion {
                path_properties: path_properties.iter().map(|s| s.to_string()).collect(),
            },
        )
    }
}

/// The declared return shape of a method. It selects how the response is
/// turned into a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// No value; only success is observed.
    Unit,
    /// The raw response, returned without failure classification.
    RawResponse,
    /// The body as bytes.
    Content,
    /// The body as a byte stream.
    Stream,
    Text,
    /// A deserialized value.
    Value,
    /// A deserialized sequence; `204 No Content` yields an empty one.
    Enumerable,
    /// A navigable paged result driven by `Link` headers.
    Paged,
    /// A sortable result.
    Sorted,
    /// An envelope carrying status, headers, content and error.
    Envelope(Box<ReturnShape>),
}

/// Full description of one contract method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    contract: Arc<str>,
    name: String,
    http_method: Method,
    relative_path: String,
    parameters: Vec<Parameter>,
    generic_parameters: Vec<String>,
    generic_arguments: Vec<TypeTag>,
    return_shape: ReturnShape,
    return_item: Option<TypeTag>,
    multipart: bool,
    headers: Vec<(String, Option<String>)>,
    dispose_response: bool,
}

impl MethodDescriptor {
    pub fn builder(contract: &str, name: &str) -> MethodDescriptorBuilder {
        MethodDescriptorBuilder::new(contract, name)
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn http_method(&self) -> &Method {
        &self.http_method
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn parameter_types(&self) -> Vec<TypeTag> {
        self.parameters.iter().map(|p| p.type_tag.clone()).collect()
    }

    pub fn generic_parameters(&self) -> &[String] {
        &self.generic_parameters
    }

    /// Generic arguments this method was closed over; empty for open or
    /// non-generic methods.
    pub fn generic_arguments(&self) -> &[TypeTag] {
        &self.generic_arguments
    }

    pub fn is_generic(&self) -> bool {
        !self.generic_parameters.is_empty()
    }

    pub fn is_open_generic(&self) -> bool {
        self.is_generic() && self.generic_arguments.is_empty()
    }

    pub fn return_shape(&self) -> &ReturnShape {
        &self.return_shape
    }

    pub fn return_item(&self) -> Option<&TypeTag> {
        self.return_item.as_ref()
    }

    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    /// Static headers declared on the contract or method.
    pub fn headers(&self) -> &[(String, Option<String>)] {
        &self.headers
    }

    /// Whether the response is released as soon as the result is produced.
    pub fn dispose_response(&self) -> bool {
        self.dispose_response
    }

    /// Closes a generic method over concrete type arguments.
    ///
    /// Every parameter or return tag naming a generic parameter is replaced by
    /// the matching argument.
    pub fn close(&self, generic_arguments: &[TypeTag]) -> Result<MethodDescriptor> {
        if !self.is_open_generic() {
            return Err(Error::ContractDefinition(format!(
                "method `{}` is not an open generic method",
                self.name
            )));
        }
        if generic_arguments.len() != self.generic_parameters.len() {
            return Err(Error::ContractDefinition(format!(
                "method `{}` expects {} generic arguments, got {}",
                self.name,
                self.generic_parameters.len(),
                generic_arguments.len()
            )));
        }

        let substitute = |tag: &TypeTag| -> TypeTag {
            tag.generic_name()
                .and_then(|name| self.generic_parameters.iter().position(|g| g == name))
                .map(|i| generic_arguments[i].clone())
                .unwrap_or_else(|| tag.clone())
        };

        let mut closed = self.clone();
        for parameter in &mut closed.parameters {
            parameter.type_tag = substitute(&parameter.type_tag);
        }
        closed.return_item = self.return_item.as_ref().map(substitute);
        closed.generic_arguments = generic_arguments.to_vec();
        Ok(closed)
    }

    fn validate(&self) -> Result<()> {
        let fail = |reason: String| {
            Err(Error::ContractDefinition(format!(
                "{}.{}: {}",
                self.contract, self.name, reason
            )))
        };

        if !self.relative_path.is_empty() && !self.relative_path.starts_with('/') {
            return fail(format!(
                "relative path `{}` must start with '/'",
                self.relative_path
            ));
        }

        let bodies = self
            .parameters
            .iter()
            .filter(|p| matches!(p.role, ParameterRole::Body { .. }))
            .count();
        if bodies > 1 {
            return fail(format!("{} body parameters declared, at most one allowed", bodies));
        }
        if bodies == 1 && self.multipart {
            return fail("multipart methods cannot declare a body parameter".to_string());
        }

        let mut names = HashSet::new();
        for parameter in &self.parameters {
            if !names.insert(parameter.name.to_ascii_lowercase()) {
                return fail(format!("duplicate parameter `{}`", parameter.name));
            }
        }

        let mut placeholders = Vec::new();
        for caps in PLACEHOLDER.captures_iter(&self.relative_path) {
            let round_trip = caps.get(1).is_some();
            placeholders.push((caps[2].to_ascii_lowercase(), round_trip));
        }

        let mut filled: HashSet<String> = HashSet::new();
        for parameter in &self.parameters {
            match &parameter.role {
                ParameterRole::ObjectExpansion { path_properties } => {
                    for property in path_properties {
                        let key = property.to_ascii_lowercase();
                        if !placeholders.iter().any(|(name, _)| *name == key) {
                            return fail(format!(
                                "property `{}` of `{}` has no matching path placeholder",
                                property, parameter.name
                            ));
                        }
                        filled.insert(key);
                    }
                }
                role => {
                    if let Some(name) = role.path_name() {
                        let key = name.to_ascii_lowercase();
                        let round_trip = matches!(role, ParameterRole::RoundTripPath { .. });
                        match placeholders.iter().find(|(n, _)| *n == key) {
                            None => {
                                return fail(format!(
                                    "parameter `{}` has no matching placeholder in `{}`",
                                    parameter.name, self.relative_path
                                ))
                            }
                            Some((_, declared)) if *declared != round_trip => {
                                return fail(format!(
                                    "placeholder `{}` and parameter `{}` disagree on round-tripping",
                                    name, parameter.name
                                ))
                            }
                            Some(_) => {}
                        }
                        if !filled.insert(key) {
                            return fail(format!("placeholder `{}` is bound twice", name));
                        }
                    }
                }
            }
        }

        if let Some((name, _)) = placeholders.iter().find(|(name, _)| !filled.contains(name)) {
            return fail(format!("path placeholder `{{{}}}` is not bound to any parameter", name));
        }

        Ok(())
    }
}

/// Builder for [`MethodDescriptor`].
#[derive(Debug)]
pub struct MethodDescriptorBuilder {
    contract: Arc<str>,
    name: String,
    http: Option<(Method, String)>,
    parameters: Vec<Parameter>,
    generic_parameters: Vec<String>,
    return_shape: ReturnShape,
    return_item: Option<TypeTag>,
    multipart: bool,
    headers: Vec<(String, Option<String>)>,
    dispose_response: bool,
}

impl MethodDescriptorBuilder {
    fn new(contract: &str, name: &str) -> Self {
        Self {
            contract: Arc::from(contract),
            name: name.to_string(),
            http: None,
            parameters: Vec::new(),
            generic_parameters: Vec::new(),
            return_shape: ReturnShape::Unit,
            return_item: None,
            multipart: false,
            headers: Vec::new(),
            dispose_response: true,
        }
    }

    /// Sets the HTTP verb and relative path template.
    pub fn http(mut self, method: Method, relative_path: &str) -> Self {
        self.http = Some((method, relative_path.to_string()));
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Declares a generic parameter. Reference it in tags with [`TypeTag::generic`].
    pub fn generic(mut self, name: &str) -> Self {
        self.generic_parameters.push(name.to_string());
        self
    }

    pub fn returns(mut self, shape: ReturnShape, item: TypeTag) -> Self {
        self.return_shape = shape;
        self.return_item = Some(item);
        self
    }

    pub fn returns_shape(mut self, shape: ReturnShape) -> Self {
        self.return_shape = shape;
        self.return_item = None;
        self
    }

    pub fn multipart(mut self) -> Self {
        self.multipart = true;
        self
    }

    /// Adds a static header; `None` removes a header set by an earlier layer.
    pub fn header(mut self, name: &str, value: Option<&str>) -> Self {
        self.headers
            .push((name.to_string(), value.map(str::to_string)));
        self
    }

    pub fn keep_response(mut self) -> Self {
        self.dispose_response = false;
        self
    }

    pub fn build(self) -> Result<MethodDescriptor> {
        let (http_method, relative_path) = self.http.ok_or_else(|| {
            Error::ContractDefinition(format!(
                "{}.{}: no HTTP method metadata",
                self.contract, self.name
            ))
        })?;

        let descriptor = MethodDescriptor {
            contract: self.contract,
            name: self.name,
            http_method,
            relative_path,
            parameters: self.parameters,
            generic_parameters: self.generic_parameters,
            generic_arguments: Vec::new(),
            dispose_response: self.dispose_response
                && !matches!(self.return_shape, ReturnShape::RawResponse | ReturnShape::Stream),
            return_shape: self.return_shape,
            return_item: self.return_item,
            multipart: self.multipart,
            headers: self.headers,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// A service contract: named methods grouped by name, in declaration order.
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    name: String,
    methods: Vec<Arc<MethodDescriptor>>,
}

impl ContractDescriptor {
    pub fn builder(name: &str) -> ContractDescriptorBuilder {
        ContractDescriptorBuilder {
            name: name.to_string(),
            headers: Vec::new(),
            methods: Vec::new(),
            extends: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Arc<MethodDescriptor>] {
        &self.methods
    }

    /// All overloads sharing `name`, in declaration order.
    pub fn overloads<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MethodDescriptor>> + 'a {
        self.methods.iter().filter(move |m| m.name() == name)
    }
}

/// Builder for [`ContractDescriptor`].
#[derive(Debug)]
pub struct ContractDescriptorBuilder {
    name: String,
    headers: Vec<(String, Option<String>)>,
    methods: Vec<MethodDescriptor>,
    extends: Vec<ContractDescriptor>,
}

impl ContractDescriptorBuilder {
    pub fn method(mut self, method: MethodDescriptor) -> Self {
        self.methods.push(method);
        self
    }

    /// Static header applied to every method, ahead of method-level headers.
    pub fn header(mut self, name: &str, value: Option<&str>) -> Self {
        self.headers
            .push((name.to_string(), value.map(str::to_string)));
        self
    }

    /// Inherits the methods of a parent contract.
    ///
    /// Inherited methods come after the contract's own. When a method with the
    /// same name and parameter types is declared in both, the first occurrence
    /// wins.
    pub fn extends(mut self, parent: ContractDescriptor) -> Self {
        self.extends.push(parent);
        self
    }

    pub fn build(self) -> Result<ContractDescriptor> {
        let mut seen = HashSet::new();
        let mut methods = Vec::new();

        for mut method in self.methods {
            if &*method.contract != self.name.as_str() {
                return Err(Error::ContractDefinition(format!(
                    "method `{}` belongs to `{}`, not `{}`",
                    method.name, method.contract, self.name
                )));
            }
            if !self.headers.is_empty() {
                let mut headers = self.headers.clone();
                headers.append(&mut method.headers);
                method.headers = headers;
            }
            if seen.insert((method.name.clone(), method.parameter_types())) {
                methods.push(Arc::new(method));
            }
        }

        for parent in self.extends {
            for method in parent.methods {
                if seen.insert((method.name.clone(), method.parameter_types())) {
                    methods.push(method);
                }
            }
        }

        if methods.is_empty() {
            return Err(Error::ContractDefinition(format!(
                "contract `{}` declares no methods",
                self.name
            )));
        }

        Ok(ContractDescriptor {
            name: self.name,
            methods,
        })
    }
}
