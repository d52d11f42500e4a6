//! Serializer Module
//!
//! Value <-> bytes conversion for backends that cannot hold live values.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Serializer Trait ==
/// Encodes values to bytes and back.
///
/// `decode(encode(v))` must equal `v` for every supported value. Values the
/// format cannot represent fail with `Unserializable` at encode time; bytes
/// that do not decode fail with `Corrupt`.
pub trait Serializer: Send + Sync + std::fmt::Debug {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>>;

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V>;
}

// == JSON ==
/// JSON via serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output; useful when inspecting a disk cache by hand.
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Serializer for JsonSerializer {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map_err(|e| CacheError::Unserializable(e.to_string()))
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}

// == Bincode ==
/// Compact binary encoding via bincode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeSerializer;

impl Serializer for BincodeSerializer {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| CacheError::Unserializable(e.to_string()))
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V> {
        bincode::deserialize(bytes).map_err(|e| CacheError::Corrupt(e.to_string()))
    }
}
