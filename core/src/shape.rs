//! Output shapes and their response resolvers.
//!
//! # Design
//! The caller picks what a request produces by passing one of six shape tags:
//! [`Empty`], [`RawBytes`], [`UntypedJson`], [`Record<T>`], [`RecordList<T>`]
//! and [`RecordList<T>`] built with [`RecordList::at`]. Each tag implements
//! [`ResponseShape`], whose `resolve` turns a 2xx body into the tag's
//! `Output`. The trait is sealed, so the set of shapes is closed and
//! [`ShapeKind`] enumerates it.
//!
//! Resolution never inspects the body to decide what to do. Asking for a
//! `Record<T>` against a body that happens to be an array is a decoding
//! failure, not a silent coercion.

use std::fmt;
use std::marker::PhantomData;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::decoder::Decoder;
use crate::error::{DecodingError, JsonKind};

mod sealed {
    pub trait Sealed {}
}

/// The closed set of output shapes, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Empty,
    RawBytes,
    UntypedJson,
    Record,
    RecordList,
    RecordListAtKeypath,
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::Empty => "empty",
            ShapeKind::RawBytes => "raw_bytes",
            ShapeKind::UntypedJson => "untyped_json",
            ShapeKind::Record => "record",
            ShapeKind::RecordList => "record_list",
            ShapeKind::RecordListAtKeypath => "record_list_at_keypath",
        };
        f.write_str(name)
    }
}

/// A requested output shape and the resolver that produces it.
///
/// `resolve` is only ever called with the body of a 2xx response.
pub trait ResponseShape: sealed::Sealed + Send + 'static {
    type Output: Send + 'static;

    fn kind(&self) -> ShapeKind;

    fn resolve<D: Decoder>(&self, body: Bytes, decoder: &D) -> Result<Self::Output, DecodingError>;
}

/// No value. The body is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Empty;

/// The body, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytes;

/// Any syntactically valid JSON, as a `serde_json::Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UntypedJson;

/// A single record decoded from the whole body.
pub struct Record<T> {
    _marker: PhantomData<fn() -> T>,
}

/// A list of records: either the body itself is the array, or a keypath
/// names the top-level field holding it.
pub struct RecordList<T> {
    keypath: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Record<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> RecordList<T> {
    /// The body must be a JSON array.
    pub fn new() -> Self {
        Self {
            keypath: None,
            _marker: PhantomData,
        }
    }

    /// The body must be a JSON object whose field `keypath` is an array.
    pub fn at(keypath: impl Into<String>) -> Self {
        Self {
            keypath: Some(keypath.into()),
            _marker: PhantomData,
        }
    }

    pub fn keypath(&self) -> Option<&str> {
        self.keypath.as_deref()
    }
}

// Manual impls: deriving would put bounds on `T` that the marker doesn't need.
impl<T> Default for Record<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Record<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Record<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Default for RecordList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for RecordList<T> {
    fn clone(&self) -> Self {
        Self {
            keypath: self.keypath.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RecordList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordList")
            .field("type", &std::any::type_name::<T>())
            .field("keypath", &self.keypath)
            .finish()
    }
}

impl sealed::Sealed for Empty {}
impl sealed::Sealed for RawBytes {}
impl sealed::Sealed for UntypedJson {}
impl<T> sealed::Sealed for Record<T> {}
impl<T> sealed::Sealed for RecordList<T> {}

impl ResponseShape for Empty {
    type Output = ();

    fn kind(&self) -> ShapeKind {
        ShapeKind::Empty
    }

    fn resolve<D: Decoder>(&self, _body: Bytes, _decoder: &D) -> Result<(), DecodingError> {
        Ok(())
    }
}

impl ResponseShape for RawBytes {
    type Output = Bytes;

    fn kind(&self) -> ShapeKind {
        ShapeKind::RawBytes
    }

    fn resolve<D: Decoder>(&self, body: Bytes, _decoder: &D) -> Result<Bytes, DecodingError> {
        Ok(body)
    }
}

impl ResponseShape for UntypedJson {
    type Output = Value;

    fn kind(&self) -> ShapeKind {
        ShapeKind::UntypedJson
    }

    fn resolve<D: Decoder>(&self, body: Bytes, decoder: &D) -> Result<Value, DecodingError> {
        decoder.decode(&body)
    }
}

impl<T> ResponseShape for Record<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn kind(&self) -> ShapeKind {
        ShapeKind::Record
    }

    fn resolve<D: Decoder>(&self, body: Bytes, decoder: &D) -> Result<T, DecodingError> {
        decoder.decode(&body)
    }
}

impl<T> ResponseShape for RecordList<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Output = Vec<T>;

    fn kind(&self) -> ShapeKind {
        match self.keypath {
            Some(_) => ShapeKind::RecordListAtKeypath,
            None => ShapeKind::RecordList,
        }
    }

    fn resolve<D: Decoder>(&self, body: Bytes, decoder: &D) -> Result<Vec<T>, DecodingError> {
        let value: Value = decoder.decode(&body)?;
        let items = match &self.keypath {
            None => expect_array(value)?,
            Some(key) => {
                let mut fields = match value {
                    Value::Object(fields) => fields,
                    other => {
                        return Err(DecodingError::UnexpectedShape {
                            expected: JsonKind::Object,
                            found: JsonKind::of(&other),
                        })
                    }
                };
                let field = fields
                    .remove(key.as_str())
                    .ok_or_else(|| DecodingError::MissingKey(key.clone()))?;
                expect_array(field)?
            }
        };
        decode_elements(items, decoder)
    }
}

fn expect_array(value: Value) -> Result<Vec<Value>, DecodingError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(DecodingError::UnexpectedShape {
            expected: JsonKind::Array,
            found: JsonKind::of(&other),
        }),
    }
}

/// All-or-nothing: the first element that fails rejects the whole list.
fn decode_elements<T, D>(items: Vec<Value>, decoder: &D) -> Result<Vec<T>, DecodingError>
where
    T: DeserializeOwned,
    D: Decoder,
{
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            decoder
                .decode_value(item)
                .map_err(|source| DecodingError::Element {
                    index,
                    source: Box::new(source),
                })
        })
        .collect()
}
