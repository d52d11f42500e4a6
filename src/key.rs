//! Key Module
//!
//! Turns a call (callable identity plus arguments) into a cache key.

use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{self, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{CacheError, Result};

// == Cache Key ==
/// Opaque byte key. Equality is byte-exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(Vec<u8>);

impl CacheKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for CacheKey {
    fn from(bytes: Vec<u8>) -> Self {
        CacheKey(bytes)
    }
}

impl From<&[u8]> for CacheKey {
    fn from(bytes: &[u8]) -> Self {
        CacheKey(bytes.to_vec())
    }
}

impl From<&str> for CacheKey {
    fn from(text: &str) -> Self {
        CacheKey(text.as_bytes().to_vec())
    }
}

impl From<String> for CacheKey {
    fn from(text: String) -> Self {
        CacheKey(text.into_bytes())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

// == Call Signature ==
/// A single invocation: who was called and with what.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSignature {
    /// Human-readable identity of the callable
    pub callable: String,
    /// Positional arguments, in call order
    pub positional: Vec<Value>,
    /// Named arguments, ordered by name
    pub named: BTreeMap<String, Value>,
}

impl CallSignature {
    /// Captures the arguments of a call.
    ///
    /// Sequences and tuples become positional arguments, structs and maps
    /// become named arguments, unit means no arguments and any other value
    /// (`None` included) is a single positional argument.
    ///
    /// # Errors
    /// `Unrepresentable` for non-finite floats and for maps whose keys are
    /// not strings.
    pub fn capture<A>(callable: impl Into<String>, args: &A) -> Result<Self>
    where
        A: Serialize + ?Sized,
    {
        let unrepresentable = |e: serde_json::Error| CacheError::Unrepresentable(e.to_string());

        let is_unit = args.serialize(Inspector).map_err(unrepresentable)?;
        let value = serde_json::to_value(args).map_err(unrepresentable)?;

        let (positional, named) = match value {
            _ if is_unit => (Vec::new(), BTreeMap::new()),
            Value::Array(items) => (items, BTreeMap::new()),
            Value::Object(fields) => (Vec::new(), fields.into_iter().collect()),
            scalar => (vec![scalar], BTreeMap::new()),
        };

        Ok(Self {
            callable: callable.into(),
            positional,
            named,
        })
    }

    /// Canonical rendering of the argument list, e.g. `1, "a", "flag": true`.
    pub fn canonical_args(&self) -> String {
        let mut out = String::new();
        let mut first = true;

        for arg in &self.positional {
            if !first {
                out.push_str(", ");
            }
            first = false;
            write_canonical(arg, &mut out);
        }

        for (name, arg) in &self.named {
            if !first {
                out.push_str(", ");
            }
            first = false;
            write_canonical(&Value::String(name.clone()), &mut out);
            out.push_str(": ");
            write_canonical(arg, &mut out);
        }

        out
    }
}

/// Compact JSON with object keys sorted at every depth.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            let mut sorted: Vec<_> = fields.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(&Value::String(name.clone()), out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// == Argument Inspection ==
type Inspected = std::result::Result<bool, serde_json::Error>;

/// Walks an argument value without producing output.
///
/// Yields `true` only for a unit value. Fails on non-finite floats, which the
/// JSON rendering would otherwise collapse into `null`.
struct Inspector;

impl Inspector {
    fn visit<T>(value: &T) -> std::result::Result<(), serde_json::Error>
    where
        T: ?Sized + Serialize,
    {
        value.serialize(Inspector).map(drop)
    }
}

impl ser::Serializer for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _v: bool) -> Inspected {
        Ok(false)
    }
    fn serialize_i8(self, _v: i8) -> Inspected {
        Ok(false)
    }
    fn serialize_i16(self, _v: i16) -> Inspected {
        Ok(false)
    }
    fn serialize_i32(self, _v: i32) -> Inspected {
        Ok(false)
    }
    fn serialize_i64(self, _v: i64) -> Inspected {
        Ok(false)
    }
    fn serialize_i128(self, _v: i128) -> Inspected {
        Ok(false)
    }
    fn serialize_u8(self, _v: u8) -> Inspected {
        Ok(false)
    }
    fn serialize_u16(self, _v: u16) -> Inspected {
        Ok(false)
    }
    fn serialize_u32(self, _v: u32) -> Inspected {
        Ok(false)
    }
    fn serialize_u64(self, _v: u64) -> Inspected {
        Ok(false)
    }
    fn serialize_u128(self, _v: u128) -> Inspected {
        Ok(false)
    }

    fn serialize_f32(self, v: f32) -> Inspected {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Inspected {
        if v.is_finite() {
            Ok(false)
        } else {
            Err(serde_json::Error::custom(format!(
                "non-finite float {v} cannot be part of a key"
            )))
        }
    }

    fn serialize_char(self, _v: char) -> Inspected {
        Ok(false)
    }
    fn serialize_str(self, _v: &str) -> Inspected {
        Ok(false)
    }
    fn serialize_bytes(self, _v: &[u8]) -> Inspected {
        Ok(false)
    }
    fn serialize_none(self) -> Inspected {
        Ok(false)
    }

    fn serialize_some<T>(self, value: &T) -> Inspected
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value).map(|()| false)
    }

    fn serialize_unit(self) -> Inspected {
        Ok(true)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Inspected {
        Ok(true)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Inspected {
        Ok(false)
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Inspected
    where
        T: ?Sized + Serialize,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Inspected
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value).map(|()| false)
    }

    fn serialize_seq(self, _len: Option<usize>) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_element<T>(&mut self, value: &T) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value)
    }

    fn end(self) -> Inspected {
        Ok(false)
    }
}

impl ser::SerializeTuple for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_element<T>(&mut self, value: &T) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value)
    }

    fn end(self) -> Inspected {
        Ok(false)
    }
}

impl ser::SerializeTupleStruct for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, value: &T) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value)
    }

    fn end(self) -> Inspected {
        Ok(false)
    }
}

impl ser::SerializeTupleVariant for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T>(&mut self, value: &T) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value)
    }

    fn end(self) -> Inspected {
        Ok(false)
    }
}

impl ser::SerializeMap for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_key<T>(&mut self, key: &T) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(key)
    }

    fn serialize_value<T>(&mut self, value: &T) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value)
    }

    fn end(self) -> Inspected {
        Ok(false)
    }
}

impl ser::SerializeStruct for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value)
    }

    fn end(self) -> Inspected {
        Ok(false)
    }
}

impl ser::SerializeStructVariant for Inspector {
    type Ok = bool;
    type Error = serde_json::Error;

    fn serialize_field<T>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> std::result::Result<(), Self::Error>
    where
        T: ?Sized + Serialize,
    {
        Self::visit(value)
    }

    fn end(self) -> Inspected {
        Ok(false)
    }
}

// == Key Maker Trait ==
/// Derives a cache key from a call signature.
///
/// Implementations must be deterministic within a process.
pub trait KeyMaker: Send + Sync + fmt::Debug {
    fn make_key(&self, call: &CallSignature) -> Result<CacheKey>;
}

// == Key Hashing ==
/// How much of the rendered key `ReprKeyMaker` condenses with SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyHashing {
    /// Keep the full readable rendering
    #[default]
    None,
    /// Hash only the argument list; the callable stays readable
    Args,
    /// Hash the whole rendering
    Full,
}

impl std::str::FromStr for KeyHashing {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(KeyHashing::None),
            "args" => Ok(KeyHashing::Args),
            "full" => Ok(KeyHashing::Full),
            other => Err(format!("unknown key hashing mode: {other}")),
        }
    }
}

// == Repr Key Maker ==
/// Renders `callable(args)` from canonical JSON, optionally hashed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReprKeyMaker {
    hashing: KeyHashing,
}

impl ReprKeyMaker {
    pub fn new(hashing: KeyHashing) -> Self {
        Self { hashing }
    }

    pub fn hashing(&self) -> KeyHashing {
        self.hashing
    }
}

impl KeyMaker for ReprKeyMaker {
    fn make_key(&self, call: &CallSignature) -> Result<CacheKey> {
        let args = call.canonical_args();
        let key = match self.hashing {
            KeyHashing::None => format!("{}({})", call.callable, args),
            KeyHashing::Args => format!("{}({})", call.callable, sha256_hex(&args)),
            KeyHashing::Full => sha256_hex(&format!("{}({})", call.callable, args)),
        };
        Ok(CacheKey::from(key))
    }
}

fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize)]
    struct Query {
        user: String,
        limit: u32,
    }

    #[test]
    fn test_capture_tuple_is_positional() {
        let call = CallSignature::capture("fetch", &(1, "a")).unwrap();
        assert_eq!(call.positional.len(), 2);
        assert!(call.named.is_empty());
        assert_eq!(call.canonical_args(), r#"1, "a""#);
    }

    #[test]
    fn test_capture_struct_is_named_and_sorted() {
        let query = Query {
            user: "ada".to_string(),
            limit: 10,
        };
        let call = CallSignature::capture("search", &query).unwrap();
        assert!(call.positional.is_empty());
        assert_eq!(call.canonical_args(), r#""limit": 10, "user": "ada""#);
    }

    #[test]
    fn test_capture_unit_and_scalar() {
        let unit = CallSignature::capture("ping", &()).unwrap();
        assert_eq!(unit.canonical_args(), "");

        let scalar = CallSignature::capture("square", &7).unwrap();
        assert_eq!(scalar.canonical_args(), "7");
    }

    #[test]
    fn test_capture_rejects_non_finite_floats() {
        for value in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let top_level = CallSignature::capture("neg", &value);
            assert!(matches!(top_level, Err(CacheError::Unrepresentable(_))));

            let nested = CallSignature::capture("neg", &(1, vec![value]));
            assert!(matches!(nested, Err(CacheError::Unrepresentable(_))));
        }

        let single = CallSignature::capture("neg", &f32::NAN);
        assert!(matches!(single, Err(CacheError::Unrepresentable(_))));

        let finite = CallSignature::capture("neg", &-2.5f64).unwrap();
        assert_eq!(finite.canonical_args(), "-2.5");
    }

    #[test]
    fn test_none_is_an_argument_and_unit_is_not() {
        let maker = ReprKeyMaker::default();
        let none = CallSignature::capture("find", &None::<u32>).unwrap();
        let some = CallSignature::capture("find", &Some(0u32)).unwrap();
        let unit = CallSignature::capture("find", &()).unwrap();

        assert_eq!(none.positional, vec![Value::Null]);
        assert!(unit.positional.is_empty());

        let none_key = maker.make_key(&none).unwrap();
        assert_eq!(none_key.as_bytes(), b"find(null)");
        assert_ne!(none_key, maker.make_key(&unit).unwrap());
        assert_ne!(none_key, maker.make_key(&some).unwrap());
    }

    #[test]
    fn test_capture_rejects_non_string_map_keys() {
        let mut args = HashMap::new();
        args.insert((1, 2), "pair");
        let result = CallSignature::capture("lookup", &args);
        assert!(matches!(result, Err(CacheError::Unrepresentable(_))));
    }

    #[test]
    fn test_nested_maps_are_canonical() {
        let mut first = HashMap::new();
        let mut second = HashMap::new();
        for i in 0..32 {
            first.insert(format!("k{i}"), i);
        }
        for i in (0..32).rev() {
            second.insert(format!("k{i}"), i);
        }

        let a = CallSignature::capture("f", &(first,)).unwrap();
        let b = CallSignature::capture("f", &(second,)).unwrap();
        assert_eq!(a.canonical_args(), b.canonical_args());
    }

    #[test]
    fn test_repr_key_is_readable() {
        let call = CallSignature::capture("app::fetch", &("foo", 2)).unwrap();
        let key = ReprKeyMaker::default().make_key(&call).unwrap();
        assert_eq!(key.as_bytes(), br#"app::fetch("foo", 2)"#);
    }

    #[test]
    fn test_key_is_deterministic() {
        let maker = ReprKeyMaker::default();
        let a = maker
            .make_key(&CallSignature::capture("f", &(1, 2)).unwrap())
            .unwrap();
        let b = maker
            .make_key(&CallSignature::capture("f", &(1, 2)).unwrap())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_distinguishes_arguments_and_callables() {
        let maker = ReprKeyMaker::default();
        let base = maker
            .make_key(&CallSignature::capture("f", &(1,)).unwrap())
            .unwrap();
        let other_arg = maker
            .make_key(&CallSignature::capture("f", &(2,)).unwrap())
            .unwrap();
        let other_fn = maker
            .make_key(&CallSignature::capture("g", &(1,)).unwrap())
            .unwrap();
        assert_ne!(base, other_arg);
        assert_ne!(base, other_fn);
    }

    #[test]
    fn test_hash_args_keeps_callable_readable() {
        let call = CallSignature::capture("app::fetch", &("foo",)).unwrap();
        let key = ReprKeyMaker::new(KeyHashing::Args).make_key(&call).unwrap();
        let text = key.to_string();
        assert!(text.starts_with("app::fetch("));
        // 64 hex chars plus the surrounding parentheses
        assert_eq!(text.len(), "app::fetch".len() + 66);
    }

    #[test]
    fn test_full_hash_bounds_key_size() {
        let long_arg = "x".repeat(10_000);
        let call = CallSignature::capture("f", &(long_arg,)).unwrap();
        let key = ReprKeyMaker::new(KeyHashing::Full).make_key(&call).unwrap();
        assert_eq!(key.as_bytes().len(), 64);
        assert!(key.as_bytes().iter().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_hashing_from_str() {
        assert_eq!("args".parse::<KeyHashing>().unwrap(), KeyHashing::Args);
        assert_eq!("FULL".parse::<KeyHashing>().unwrap(), KeyHashing::Full);
        assert_eq!("none".parse::<KeyHashing>().unwrap(), KeyHashing::None);
        assert!("md5".parse::<KeyHashing>().is_err());
    }
}
