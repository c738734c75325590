//! `multipart/form-data` bodies.

use crate::error::{Error, Result};
use crate::serializer::ContentSerializer;
use crate::value::{Arg, ByteStream, Scalar};
use bytes::Bytes;
use futures::stream;
use reqwest::multipart::{Form, Part};
use std::fmt;
use std::path::PathBuf;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// The payload of a multipart part.
pub enum PartData {
    Bytes(Bytes),
    Text(String),
    Stream(ByteStream),
    /// Read lazily when the body is streamed.
    File(PathBuf),
}

impl fmt::Debug for PartData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartData::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            PartData::Text(t) => f.debug_tuple("Text").field(t).finish(),
            PartData::Stream(_) => f.write_str("Stream(..)"),
            PartData::File(p) => f.debug_tuple("File").field(p).finish(),
        }
    }
}

/// A single part: its payload plus the name, file name and content type
/// written in the part headers.
#[derive(Debug)]
pub struct MultipartItem {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: PartData,
}

impl MultipartItem {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Self::with_data(PartData::Bytes(data.into()))
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::with_data(PartData::Text(text.into()))
    }

    pub fn stream(stream: ByteStream) -> Self {
        Self::with_data(PartData::Stream(stream))
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        Self {
            file_name,
            ..Self::with_data(PartData::File(path))
        }
    }

    fn with_data(data: PartData) -> Self {
        Self {
            name: None,
            file_name: None,
            content_type: None,
            data,
        }
    }

    /// Overrides the part name, which otherwise defaults to the parameter name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Clones the item unless its payload is a one-shot stream.
    pub fn try_clone(&self) -> Option<Self> {
        let data = match &self.data {
            PartData::Bytes(b) => PartData::Bytes(b.clone()),
            PartData::Text(t) => PartData::Text(t.clone()),
            PartData::File(p) => PartData::File(p.clone()),
            PartData::Stream(_) => return None,
        };
        Some(Self {
            name: self.name.clone(),
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            data,
        })
    }

    /// Builds the part for a multipart-captured argument.
    ///
    /// Lists contribute one part per element. Arguments with no direct part
    /// form go through the content serializer; if that fails the argument is
    /// rejected.
    pub(crate) fn from_arg(
        parameter: &str,
        value: Arg,
        serializer: &dyn ContentSerializer,
    ) -> Result<Vec<MultipartItem>> {
        let item = match value {
            Arg::Null => return Ok(Vec::new()),
            Arg::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.extend(Self::from_arg(parameter, item, serializer)?);
                }
                return Ok(parts);
            }
            Arg::Part(item) => item,
            Arg::Content(content) => MultipartItem {
                content_type: content.content_type,
                ..MultipartItem::bytes(content.data)
            },
            Arg::Bytes(data) => MultipartItem::bytes(data),
            Arg::Stream(stream) => MultipartItem::stream(stream),
            Arg::File(path) => MultipartItem::file(path),
            Arg::Scalar(Scalar::Str(text)) => MultipartItem::text(text),
            other => {
                let content = serializer.to_content(&other).map_err(|source| {
                    Error::UnsupportedMultipartParameter {
                        parameter: parameter.to_string(),
                        type_name: other.type_name(),
                        source: Box::new(source),
                    }
                })?;
                MultipartItem {
                    content_type: content.content_type,
                    ..MultipartItem::bytes(content.data)
                }
            }
        };

        Ok(vec![MultipartItem {
            name: item.name.or_else(|| Some(parameter.to_string())),
            ..item
        }])
    }

    fn into_part(self) -> Result<(String, Part)> {
        let default_type = match self.data {
            PartData::Text(_) => TEXT_PLAIN,
            _ => OCTET_STREAM,
        };
        let content_type = self.content_type.as_deref().unwrap_or(default_type);

        let part = match self.data {
            PartData::Bytes(b) => Part::stream(reqwest::Body::from(b)),
            PartData::Text(t) => Part::text(t),
            PartData::Stream(s) => Part::stream(reqwest::Body::wrap_stream(s)),
            PartData::File(path) => Part::stream(reqwest::Body::wrap_stream(stream::once(async move {
                tokio::fs::read(path).await.map(Bytes::from)
            }))),
        };
        let mut part = part.mime_str(content_type).map_err(|e| {
            Error::Configuration(format!("invalid part content type `{}`: {}", content_type, e))
        })?;
        if let Some(file_name) = self.file_name {
            part = part.file_name(header_safe(&file_name));
        }
        Ok((self.name.unwrap_or_default(), part))
    }
}

/// Part headers are line based; control characters in a file name are dropped.
fn header_safe(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// An ordered set of parts.
///
/// Parts are encoded by `reqwest`'s multipart form, which picks the boundary
/// and percent-encodes part names.
#[derive(Debug, Default)]
pub struct MultipartBody {
    items: Vec<MultipartItem>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: MultipartItem) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[MultipartItem] {
        &self.items
    }

    /// Whether the body can be produced more than once.
    pub fn is_replayable(&self) -> bool {
        !self
            .items
            .iter()
            .any(|i| matches!(i.data, PartData::Stream(_)))
    }

    /// Clones the body if every part is replayable.
    pub fn try_clone(&self) -> Option<Self> {
        let items = self
            .items
            .iter()
            .map(MultipartItem::try_clone)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { items })
    }

    /// Builds the form. Files are read when their part is reached.
    pub fn into_form(self) -> Result<Form> {
        self.items.into_iter().try_fold(Form::new(), |form, item| {
            let (name, part) = item.into_part()?;
            Ok(form.part(name, part))
        })
    }

    /// The wire body and its `multipart/form-data` content type.
    pub(crate) fn into_wire(self) -> Result<(reqwest::Body, String)> {
        let form = self.into_form()?;
        let content_type = format!("multipart/form-data; boundary={}", form.boundary());
        Ok((reqwest::Body::wrap_stream(form.into_stream()), content_type))
    }
}
