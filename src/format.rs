//! Formatting of argument values into path segments, query pairs and form
//! fields.

use crate::descriptor::{CollectionFormat, QuerySpec, TypeTag};
use crate::error::{Error, Result};
use crate::serializer::ContentSerializer;
use crate::value::{Arg, Composite, Property, Scalar};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::fmt;

/// Everything but RFC 3986 unreserved characters is escaped.
const DATA: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Escapes a value for use in a path segment or query component.
pub fn escape_data(value: &str) -> String {
    utf8_percent_encode(value, DATA).to_string()
}

/// Escapes a round-tripping path value segment by segment, keeping `/`.
pub fn escape_round_trip(value: &str) -> String {
    value
        .split('/')
        .map(escape_data)
        .collect::<Vec<_>>()
        .join("/")
}

/// Where a value is being formatted.
#[derive(Debug, Clone, Copy)]
pub struct FormatContext<'a> {
    /// Parameter or property name.
    pub name: &'a str,
    pub type_tag: Option<&'a TypeTag>,
    /// Format hint declared on the parameter.
    pub format: Option<&'a str>,
}

impl<'a> FormatContext<'a> {
    pub fn named(name: &'a str) -> Self {
        Self {
            name,
            type_tag: None,
            format: None,
        }
    }
}

/// Formats scalar values for URLs.
///
/// Returning `None` drops the value, which removes the query pair it belongs
/// to.
pub trait UrlParameterFormatter: Send + Sync + fmt::Debug {
    fn format(&self, value: &Scalar, context: &FormatContext<'_>) -> Option<String>;
}

/// Uses `Display`, honouring a `.N` precision hint for floats.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultUrlParameterFormatter;

impl UrlParameterFormatter for DefaultUrlParameterFormatter {
    fn format(&self, value: &Scalar, context: &FormatContext<'_>) -> Option<String> {
        let precision = context
            .format
            .and_then(|f| f.strip_prefix('.'))
            .and_then(|p| p.parse::<usize>().ok());
        Some(match (value, precision) {
            (Scalar::Float(v), Some(p)) => format!("{:.*}", p, v),
            _ => value.to_string(),
        })
    }
}

/// Flattens arguments into key/value pairs for query strings and forms.
pub(crate) struct PairWriter<'a> {
    pub formatter: &'a dyn UrlParameterFormatter,
    pub serializer: &'a dyn ContentSerializer,
    pub collection_format: CollectionFormat,
}

/// Which naming rules apply to object properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PairTarget {
    /// Alias, else declared name.
    Query,
    /// Alias, else the serializer's field name, else declared name.
    Form,
}

impl PairWriter<'_> {
    /// Writes the pairs for a top-level parameter value.
    ///
    /// Objects and maps contribute one pair per property, under the optional
    /// prefix; other values use `name`, prefixed when a prefix is set.
    pub fn write_parameter(
        &self,
        name: &str,
        type_tag: Option<&TypeTag>,
        value: &Arg,
        spec: &QuerySpec,
        target: PairTarget,
        out: &mut Vec<(String, String)>,
    ) -> Result<()> {
        match value {
            Arg::Object(composite) => {
                self.write_object(spec.prefix.as_deref(), composite, spec, target, out)
            }
            Arg::Map(_) => self.write_value(spec.prefix.as_deref().unwrap_or(""), None, value, spec, target, out),
            _ => {
                let key = join_key(spec.prefix.as_deref(), &spec.delimiter, name);
                self.write_value(&key, type_tag, value, spec, target, out)
            }
        }
    }

    fn write_object(
        &self,
        base: Option<&str>,
        composite: &Composite,
        spec: &QuerySpec,
        target: PairTarget,
        out: &mut Vec<(String, String)>,
    ) -> Result<()> {
        for property in &composite.properties {
            let spec = property.query.as_ref().unwrap_or(spec);
            let key = join_key(base, &spec.delimiter, &self.property_key(property, target));
            self.write_value(&key, None, &property.value, spec, target, out)?;
        }
        Ok(())
    }

    fn write_value(
        &self,
        key: &str,
        type_tag: Option<&TypeTag>,
        value: &Arg,
        spec: &QuerySpec,
        target: PairTarget,
        out: &mut Vec<(String, String)>,
    ) -> Result<()> {
        let context = FormatContext {
            name: key,
            type_tag,
            format: spec.format.as_deref(),
        };
        match value {
            Arg::Null => {}
            Arg::Scalar(scalar) => {
                if let Some(formatted) = self.formatter.format(scalar, &context) {
                    out.push((key.to_string(), formatted));
                }
            }
            Arg::List(items) if items.iter().all(|i| matches!(i, Arg::Scalar(_) | Arg::Null)) => {
                let formatted = items
                    .iter()
                    .filter_map(Arg::as_scalar)
                    .filter_map(|s| self.formatter.format(s, &context));
                let format = spec.collection_format.unwrap_or(self.collection_format);
                match format.separator() {
                    None => out.extend(formatted.map(|v| (key.to_string(), v))),
                    Some(separator) => {
                        out.push((key.to_string(), formatted.collect::<Vec<_>>().join(separator)))
                    }
                }
            }
            Arg::List(items) => {
                for item in items {
                    self.write_value(key, type_tag, item, spec, target, out)?;
                }
            }
            Arg::Map(entries) => {
                for (map_key, map_value) in entries {
                    let Some(sub) = self.formatter.format(map_key, &context) else {
                        continue;
                    };
                    let full = join_key(non_empty(key), &spec.delimiter, &sub);
                    self.write_value(&full, None, map_value, spec, target, out)?;
                }
            }
            Arg::Object(composite) => {
                self.write_object(non_empty(key), composite, spec, target, out)?;
            }
            other => {
                return Err(Error::Configuration(format!(
                    "a {} value cannot be written as `{}`",
                    other.type_name(),
                    key
                )))
            }
        }
        Ok(())
    }

    fn property_key(&self, property: &Property, target: PairTarget) -> String {
        if let Some(alias) = &property.alias {
            return alias.clone();
        }
        match target {
            PairTarget::Query => property.name.clone(),
            PairTarget::Form => self
                .serializer
                .field_name_for(property)
                .unwrap_or_else(|| property.name.clone()),
        }
    }
}

fn non_empty(key: &str) -> Option<&str> {
    (!key.is_empty()).then_some(key)
}

fn join_key(base: Option<&str>, delimiter: &str, name: &str) -> String {
    match base {
        Some(base) => format!("{}{}{}", base, delimiter, name),
        None => name.to_string(),
    }
}

/// Renders pairs as an escaped query string, without the leading `?`.
pub fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", escape_data(k), escape_data(v)))
        .collect::<Vec<_>>()
        .join("&")
}
