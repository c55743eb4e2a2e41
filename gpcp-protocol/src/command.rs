//! Command payload encoding: a REQUEST body is the UTF-8 concatenation of
//! a command name and a JSON argument array; a RESPONSE body carrying a
//! command return value is a bare JSON document.

use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// Encode `(name, args)` into a REQUEST body: `<name><json-array>`.
pub fn encode_request(name: &str, args: &[Value]) -> Vec<u8> {
    let mut out = name.as_bytes().to_vec();
    out.extend_from_slice(serde_json::to_string(args).unwrap().as_bytes());
    out
}

/// Decode a REQUEST body produced by [`encode_request`]. The command name
/// is everything before the first `[`; the rest is JSON-parsed as the
/// argument array.
pub fn decode_request(data: &[u8]) -> Result<(String, Vec<Value>)> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ProtocolError::InvalidMessage(format!("not valid UTF-8: {e}")))?;

    let split = text
        .find('[')
        .ok_or_else(|| ProtocolError::InvalidMessage("missing argument array".into()))?;
    let (name, args_json) = text.split_at(split);
    let args: Vec<Value> = serde_json::from_str(args_json)?;
    Ok((name.to_string(), args))
}

/// Encode a command return value as a bare JSON document (no name prefix).
pub fn encode_response(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

/// Decode a RESPONSE body produced by [`encode_response`].
pub fn decode_response(data: &[u8]) -> Result<Value> {
    Ok(serde_json::from_slice(data)?)
}
