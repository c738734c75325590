//! Runtime argument values handed to a contract call.
//!
//! A call carries one [`Arg`] per declared parameter. Most callers never build
//! these by hand: every primitive, `Option`, `Vec`, [`Url`] and [`Bytes`]
//! converts with `Into`, and any `Serialize` type goes through
//! [`Arg::serialize`].

use crate::descriptor::QuerySpec;
use crate::error::{Error, Result};
use crate::multipart::MultipartItem;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use url::Url;

/// A streamed body: a sequence of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// A value that is never decomposed into properties when building query
/// strings or form bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Bool(bool),
    Char(char),
    Int(i64),
    UInt(u64),
    Float(f64),
    Uri(Url),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Str(s) => f.write_str(s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Char(c) => write!(f, "{}", c),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Uri(u) => f.write_str(u.as_str()),
        }
    }
}

/// Pre-built content used verbatim as a body or multipart part.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl Content {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            content_type: None,
            data: data.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One public property of a composite argument.
#[derive(Debug)]
pub struct Property {
    pub name: String,
    /// Alternate wire name, wins over the serializer's naming policy.
    pub alias: Option<String>,
    /// Per-property query formatting overrides.
    pub query: Option<QuerySpec>,
    pub value: Arg,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<Arg>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            query: None,
            value: value.into(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn query(mut self, spec: QuerySpec) -> Self {
        self.query = Some(spec);
        self
    }

    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            name: self.name.clone(),
            alias: self.alias.clone(),
            query: self.query.clone(),
            value: self.value.try_clone()?,
        })
    }
}

/// An object with named properties, in declaration order.
///
/// Composites are flattened into `key=value` pairs for query strings and
/// form bodies, and their properties can fill path placeholders.
#[derive(Debug, Default)]
pub struct Composite {
    pub type_name: String,
    pub properties: Vec<Property>,
}

impl Composite {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property and returns `self` for chaining.
    pub fn with(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Shorthand for `with(Property::new(name, value))`.
    pub fn field(self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.with(Property::new(name, value))
    }

    /// Clones the composite unless a property holds a one-shot stream.
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            type_name: self.type_name.clone(),
            properties: self
                .properties
                .iter()
                .map(Property::try_clone)
                .collect::<Option<_>>()?,
        })
    }

    /// Case-insensitive property lookup by declared name.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// An argument value bound to a method parameter.
pub enum Arg {
    Null,
    Scalar(Scalar),
    List(Vec<Arg>),
    /// A dictionary. Keys are formatted with the URL parameter formatter.
    Map(Vec<(Scalar, Arg)>),
    Object(Composite),
    Bytes(Bytes),
    Stream(ByteStream),
    Content(Content),
    File(PathBuf),
    Part(MultipartItem),
    /// A header collection; `None` values remove the header.
    Headers(Vec<(String, Option<String>)>),
    Cancel(CancellationToken),
}

impl Arg {
    /// Name of the argument kind, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Arg::Null => "null",
            Arg::Scalar(Scalar::Str(_)) => "string",
            Arg::Scalar(Scalar::Bool(_)) => "bool",
            Arg::Scalar(Scalar::Char(_)) => "char",
            Arg::Scalar(Scalar::Int(_)) => "int",
            Arg::Scalar(Scalar::UInt(_)) => "uint",
            Arg::Scalar(Scalar::Float(_)) => "float",
            Arg::Scalar(Scalar::Uri(_)) => "uri",
            Arg::List(_) => "list",
            Arg::Map(_) => "map",
            Arg::Object(_) => "object",
            Arg::Bytes(_) => "bytes",
            Arg::Stream(_) => "stream",
            Arg::Content(_) => "content",
            Arg::File(_) => "file",
            Arg::Part(_) => "multipart item",
            Arg::Headers(_) => "headers",
            Arg::Cancel(_) => "cancellation token",
        }
    }

    /// Clones the argument. Streams, and anything holding one, cannot be
    /// replayed and yield `None`.
    pub fn try_clone(&self) -> Option<Arg> {
        Some(match self {
            Arg::Null => Arg::Null,
            Arg::Scalar(s) => Arg::Scalar(s.clone()),
            Arg::List(items) => Arg::List(items.iter().map(Arg::try_clone).collect::<Option<_>>()?),
            Arg::Map(entries) => Arg::Map(
                entries
                    .iter()
                    .map(|(k, v)| Some((k.clone(), v.try_clone()?)))
                    .collect::<Option<_>>()?,
            ),
            Arg::Object(c) => Arg::Object(c.try_clone()?),
            Arg::Bytes(b) => Arg::Bytes(b.clone()),
            Arg::Stream(_) => return None,
            Arg::Content(c) => Arg::Content(c.clone()),
            Arg::File(p) => Arg::File(p.clone()),
            Arg::Part(p) => Arg::Part(p.try_clone()?),
            Arg::Headers(h) => Arg::Headers(h.clone()),
            Arg::Cancel(t) => Arg::Cancel(t.clone()),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Arg::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Serializes any `Serialize` value into its structural argument form.
    ///
    /// JSON objects become [`Composite`]s, arrays become lists and JSON
    /// `null` becomes [`Arg::Null`].
    pub fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Arg> {
        let json = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Arg::from_json(json))
    }

    /// Converts a JSON value into an argument.
    pub fn from_json(value: serde_json::Value) -> Arg {
        use serde_json::Value;
        match value {
            Value::Null => Arg::Null,
            Value::Bool(b) => Arg::Scalar(Scalar::Bool(b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Arg::Scalar(Scalar::Int(i))
                } else if let Some(u) = n.as_u64() {
                    Arg::Scalar(Scalar::UInt(u))
                } else {
                    Arg::Scalar(Scalar::Float(n.as_f64().unwrap_or_default()))
                }
            }
            Value::String(s) => Arg::Scalar(Scalar::Str(s)),
            Value::Array(items) => Arg::List(items.into_iter().map(Arg::from_json).collect()),
            Value::Object(map) => Arg::Object(Composite {
                type_name: "object".to_string(),
                properties: map
                    .into_iter()
                    .map(|(name, value)| Property::new(name, Arg::from_json(value)))
                    .collect(),
            }),
        }
    }

    /// Converts the structural part of this argument back into JSON, naming
    /// object keys by alias or declared name.
    ///
    /// Returns `None` for kinds with no JSON form (streams, files, tokens, ...).
    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.to_json_with(&|p: &Property| p.alias.clone().unwrap_or_else(|| p.name.clone()))
    }

    /// Like [`Arg::to_json`], with object keys chosen by `key_for`.
    pub fn to_json_with(&self, key_for: &dyn Fn(&Property) -> String) -> Option<serde_json::Value> {
        use serde_json::{Map, Number, Value};
        Some(match self {
            Arg::Null => Value::Null,
            Arg::Scalar(s) => match s {
                Scalar::Str(v) => Value::String(v.clone()),
                Scalar::Bool(v) => Value::Bool(*v),
                Scalar::Char(v) => Value::String(v.to_string()),
                Scalar::Int(v) => Value::Number((*v).into()),
                Scalar::UInt(v) => Value::Number((*v).into()),
                Scalar::Float(v) => Number::from_f64(*v).map(Value::Number)?,
                Scalar::Uri(v) => Value::String(v.to_string()),
            },
            Arg::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_json_with(key_for))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Arg::Map(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    map.insert(key.to_string(), value.to_json_with(key_for)?);
                }
                Value::Object(map)
            }
            Arg::Object(composite) => {
                let mut map = Map::new();
                for property in &composite.properties {
                    map.insert(key_for(property), property.value.to_json_with(key_for)?);
                }
                Value::Object(map)
            }
            _ => return None,
        })
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => f.write_str("Null"),
            Arg::Scalar(s) => f.debug_tuple("Scalar").field(s).finish(),
            Arg::List(items) => f.debug_tuple("List").field(items).finish(),
            Arg::Map(entries) => f.debug_tuple("Map").field(entries).finish(),
            Arg::Object(c) => f.debug_tuple("Object").field(c).finish(),
            Arg::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            Arg::Stream(_) => f.write_str("Stream(..)"),
            Arg::Content(c) => f.debug_tuple("Content").field(c).finish(),
            Arg::File(p) => f.debug_tuple("File").field(p).finish(),
            Arg::Part(p) => f.debug_tuple("Part").field(p).finish(),
            Arg::Headers(h) => f.debug_tuple("Headers").field(h).finish(),
            Arg::Cancel(_) => f.write_str("Cancel(..)"),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for Arg {
                fn from(value: $ty) -> Self {
                    Arg::Scalar(Scalar::$variant(value as $cast))
                }
            }
        )*
    };
}

scalar_from! {
    i8 => Int as i64,
    i16 => Int as i64,
    i32 => Int as i64,
    i64 => Int as i64,
    isize => Int as i64,
    u8 => UInt as u64,
    u16 => UInt as u64,
    u32 => UInt as u64,
    u64 => UInt as u64,
    usize => UInt as u64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Scalar(Scalar::Bool(value))
    }
}

impl From<char> for Arg {
    fn from(value: char) -> Self {
        Arg::Scalar(Scalar::Char(value))
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Scalar(Scalar::Str(value.to_string()))
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Scalar(Scalar::Str(value))
    }
}

impl From<Url> for Arg {
    fn from(value: Url) -> Self {
        Arg::Scalar(Scalar::Uri(value))
    }
}

impl From<Scalar> for Arg {
    fn from(value: Scalar) -> Self {
        Arg::Scalar(value)
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl From<Content> for Arg {
    fn from(value: Content) -> Self {
        Arg::Content(value)
    }
}

impl From<Composite> for Arg {
    fn from(value: Composite) -> Self {
        Arg::Object(value)
    }
}

impl From<MultipartItem> for Arg {
    fn from(value: MultipartItem) -> Self {
        Arg::Part(value)
    }
}

impl From<CancellationToken> for Arg {
    fn from(value: CancellationToken) -> Self {
        Arg::Cancel(value)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Arg::Null)
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(value: Vec<T>) -> Self {
        Arg::List(value.into_iter().map(Into::into).collect())
    }
}
