//! Pluggable body serialization.

use crate::error::{BoxError, Error, Result};
use crate::value::{Arg, Content, Property};
use std::fmt;

/// Default content type for serialized bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Turns argument values into request content and response bodies into
/// structured values.
///
/// Implementations must be safe to share across concurrent calls.
pub trait ContentSerializer: Send + Sync + fmt::Debug {
    /// Serializes `value` into request content.
    fn to_content(&self, value: &Arg) -> Result<Content>;

    /// Parses a response body. The value is then converted into the
    /// declared return type.
    fn from_content(&self, body: &[u8]) -> std::result::Result<serde_json::Value, BoxError>;

    /// The wire name of a property, or `None` to use its declared name.
    fn field_name_for(&self, property: &Property) -> Option<String>;
}

/// How property names are written on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldNaming {
    /// Use declared names unchanged.
    #[default]
    AsIs,
    /// `first_name` and `FirstName` become `firstName`.
    CamelCase,
}

/// JSON serializer backed by `serde_json`.
#[derive(Debug, Clone, Default)]
pub struct JsonContentSerializer {
    naming: FieldNaming,
}

impl JsonContentSerializer {
    pub fn new(naming: FieldNaming) -> Self {
        Self { naming }
    }

    fn key_for(&self, property: &Property) -> String {
        property
            .alias
            .clone()
            .or_else(|| self.field_name_for(property))
            .unwrap_or_else(|| property.name.clone())
    }
}

impl ContentSerializer for JsonContentSerializer {
    fn to_content(&self, value: &Arg) -> Result<Content> {
        let json = value
            .to_json_with(&|p: &Property| self.key_for(p))
            .ok_or_else(|| {
                Error::Serialization(format!("a {} value has no JSON form", value.type_name()))
            })?;
        let data = serde_json::to_vec(&json).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(Content::new(data).with_content_type(JSON_CONTENT_TYPE))
    }

    fn from_content(&self, body: &[u8]) -> std::result::Result<serde_json::Value, BoxError> {
        Ok(serde_json::from_slice(body)?)
    }

    fn field_name_for(&self, property: &Property) -> Option<String> {
        match self.naming {
            FieldNaming::AsIs => None,
            FieldNaming::CamelCase => Some(camel_case(&property.name)),
        }
    }
}

fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for (i, segment) in name.split('_').filter(|s| !s.is_empty()).enumerate() {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                out.extend(first.to_lowercase());
            } else {
                out.extend(first.to_uppercase());
            }
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Composite;

    #[test]
    fn camel_case_handles_snake_and_pascal() {
        assert_eq!(camel_case("first_name"), "firstName");
        assert_eq!(camel_case("FirstName"), "firstName");
        assert_eq!(camel_case("id"), "id");
        assert_eq!(camel_case("_private_field"), "privateField");
    }

    #[test]
    fn alias_wins_over_naming_policy() {
        let serializer = JsonContentSerializer::new(FieldNaming::CamelCase);
        let user = Composite::new("User")
            .field("first_name", "Ann")
            .with(Property::new("last_name", "Lee").alias("surname"));

        let content = serializer.to_content(&Arg::Object(user)).unwrap();
        assert_eq!(content.content_type.as_deref(), Some(JSON_CONTENT_TYPE));
        assert_eq!(&content.data[..], br#"{"firstName":"Ann","surname":"Lee"}"#);
    }

    #[test]
    fn non_structural_values_fail_to_serialize() {
        let serializer = JsonContentSerializer::default();
        let err = serializer
            .to_content(&Arg::File("/tmp/x".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn parses_json_bodies() {
        let serializer = JsonContentSerializer::default();
        let value = serializer.from_content(br#"[1,2]"#).unwrap();
        assert_eq!(value, serde_json::json!([1, 2]));
        assert!(serializer.from_content(b"not json").is_err());
    }
}
