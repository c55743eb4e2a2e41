//! Type registry: a fixed, wire-stable table of `TypeDescriptor`s used to
//! (de)serialize command arguments and return values.

use base64::Engine;
use serde_json::Value;
use std::fmt;

use crate::error::{ProtocolError, Result};

/// Stable wire id of a built-in `TypeDescriptor`. Ids must never be
/// reordered between peers — the table in [`BUILTIN_TYPES`] is the single
/// source of truth for the assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeId(pub u8);

/// A (de)serialization strategy for one semantic type flowing through a
/// command argument or return value.
pub trait TypeDescriptor: fmt::Debug + Sync {
    /// Wire-stable id for this descriptor.
    fn id(&self) -> TypeId;
    /// Human-readable name, used in `requestCommands` introspection and logs.
    fn name(&self) -> &'static str;
    /// Convert a native Rust value (already shaped as JSON) to the
    /// JSON-encodable form placed in the argument array / response body.
    fn serialize(&self, value: &Value) -> Result<Value>;
    /// Convert a JSON-encodable entry back to its native form.
    fn deserialize(&self, entry: &Value) -> Result<Value>;
}

macro_rules! passthrough_descriptor {
    ($struct_name:ident, $id:expr, $name:expr) => {
        #[derive(Debug)]
        pub struct $struct_name;

        impl TypeDescriptor for $struct_name {
            fn id(&self) -> TypeId {
                TypeId($id)
            }
            fn name(&self) -> &'static str {
                $name
            }
            fn serialize(&self, value: &Value) -> Result<Value> {
                Ok(value.clone())
            }
            fn deserialize(&self, entry: &Value) -> Result<Value> {
                Ok(entry.clone())
            }
        }
    };
}

passthrough_descriptor!(NoneType, 0, "None");
passthrough_descriptor!(JsonObjectType, 1, "JsonObject");
passthrough_descriptor!(JsonArrayType, 2, "JsonArray");
passthrough_descriptor!(StringType, 3, "String");
passthrough_descriptor!(BooleanType, 4, "Boolean");
passthrough_descriptor!(IntegerType, 5, "Integer");
passthrough_descriptor!(FloatType, 6, "Float");

/// `Bytes` serializes as base64 text so any byte value round-trips —
/// the original implementation this protocol is derived from used a
/// 1-byte-per-character ASCII encoding that fails for bytes >= 0x80; this
/// is the documented fix (see SPEC_FULL.md §9).
#[derive(Debug)]
pub struct BytesType;

impl TypeDescriptor for BytesType {
    fn id(&self) -> TypeId {
        TypeId(7)
    }
    fn name(&self) -> &'static str {
        "Bytes"
    }

    fn serialize(&self, value: &Value) -> Result<Value> {
        let bytes = value
            .as_array()
            .ok_or_else(|| ProtocolError::InvalidMessage("Bytes value must be a byte array".into()))?
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| ProtocolError::InvalidMessage("Bytes array element out of range".into()))
            })
            .collect::<Result<Vec<u8>>>()?;
        Ok(Value::String(base64::engine::general_purpose::STANDARD.encode(bytes)))
    }

    fn deserialize(&self, entry: &Value) -> Result<Value> {
        let text = entry
            .as_str()
            .ok_or_else(|| ProtocolError::InvalidMessage("Bytes entry must be a base64 string".into()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(text)
            .map_err(|e| ProtocolError::InvalidMessage(format!("invalid base64: {e}")))?;
        Ok(Value::Array(bytes.into_iter().map(|b| Value::from(b)).collect()))
    }
}

/// Wire-stable order: `None, JsonObject, JsonArray, String, Boolean,
/// Integer, Float, Bytes` at ids 0..7 (distilled spec §6).
pub static BUILTIN_TYPES: [&(dyn TypeDescriptor + Sync); 8] = [
    &NoneType,
    &JsonObjectType,
    &JsonArrayType,
    &StringType,
    &BooleanType,
    &IntegerType,
    &FloatType,
    &BytesType,
];

/// Look up the built-in descriptor for a wire id.
pub fn from_id(id: TypeId) -> Result<&'static (dyn TypeDescriptor + Sync)> {
    BUILTIN_TYPES
        .get(id.0 as usize)
        .copied()
        .ok_or(ProtocolError::UnknownType(id.0))
}

/// Find the wire id for a descriptor already present in [`BUILTIN_TYPES`].
pub fn to_id(descriptor: &(dyn TypeDescriptor + Sync)) -> Result<TypeId> {
    BUILTIN_TYPES
        .iter()
        .find(|d| d.name() == descriptor.name())
        .map(|d| d.id())
        .ok_or_else(|| ProtocolError::UnknownType(255))
}

/// Convenience native value shapes a caller can request a descriptor for,
/// without naming a concrete descriptor type. Mirrors `getIfBuiltIn` from
/// the distilled spec's type registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    List,
    Dict,
    None,
}

/// Normalize a [`NativeType`] to its built-in descriptor.
pub fn descriptor_for_native(native: NativeType) -> &'static (dyn TypeDescriptor + Sync) {
    match native {
        NativeType::None => &NoneType,
        NativeType::Dict => &JsonObjectType,
        NativeType::List => &JsonArrayType,
        NativeType::Str => &StringType,
        NativeType::Bool => &BooleanType,
        NativeType::Int => &IntegerType,
        NativeType::Float => &FloatType,
        NativeType::Bytes => &BytesType,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_table_is_wire_stable() {
        assert_eq!(NoneType.id(), TypeId(0));
        assert_eq!(JsonObjectType.id(), TypeId(1));
        assert_eq!(JsonArrayType.id(), TypeId(2));
        assert_eq!(StringType.id(), TypeId(3));
        assert_eq!(BooleanType.id(), TypeId(4));
        assert_eq!(IntegerType.id(), TypeId(5));
        assert_eq!(FloatType.id(), TypeId(6));
        assert_eq!(BytesType.id(), TypeId(7));
    }

    #[test]
    fn to_id_from_id_round_trip() {
        for d in BUILTIN_TYPES.iter() {
            let id = to_id(*d).unwrap();
            let back = from_id(id).unwrap();
            assert_eq!(back.name(), d.name());
        }
    }

    #[test]
    fn from_id_out_of_range_is_unknown_type() {
        assert!(matches!(from_id(TypeId(8)), Err(ProtocolError::UnknownType(8))));
    }

    #[test]
    fn string_round_trip() {
        let v = json!("hello");
        let s = StringType.serialize(&v).unwrap();
        let back = StringType.deserialize(&s).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn integer_round_trip() {
        let v = json!(-42);
        let s = IntegerType.serialize(&v).unwrap();
        let back = IntegerType.deserialize(&s).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn bytes_round_trip_including_high_bytes() {
        let raw: Vec<u8> = vec![0, 1, 127, 128, 200, 255];
        let v = Value::Array(raw.iter().map(|b| Value::from(*b)).collect());
        let serialized = BytesType.serialize(&v).unwrap();
        assert!(serialized.is_string());
        let back = BytesType.deserialize(&serialized).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn none_serializes_to_null() {
        let v = Value::Null;
        let s = NoneType.serialize(&v).unwrap();
        assert_eq!(s, Value::Null);
    }

    #[test]
    fn descriptor_for_native_matches_ids() {
        assert_eq!(descriptor_for_native(NativeType::Str).id(), StringType.id());
        assert_eq!(descriptor_for_native(NativeType::Bytes).id(), BytesType.id());
        assert_eq!(descriptor_for_native(NativeType::List).id(), JsonArrayType.id());
    }
}
