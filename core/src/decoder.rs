//! The record decoding capability used by the response resolvers.
//!
//! Resolvers only ever see this trait, so the JSON engine can be swapped
//! without touching them. [`JsonDecoder`] is the `serde_json` implementation.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::DecodingError;

pub trait Decoder: Send + Sync + 'static {
    /// Decode raw body bytes into `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodingError>;

    /// Decode an already-parsed JSON value into `T`. Used for list elements.
    fn decode_value<T: DeserializeOwned>(&self, value: Value) -> Result<T, DecodingError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodingError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn decode_value<T: DeserializeOwned>(&self, value: Value) -> Result<T, DecodingError> {
        Ok(serde_json::from_value(value)?)
    }
}
