//! Shared wire-format types for GPCP: the packet codec and the type
//! registry. Both the requester and responder sides of a GPCP connection
//! depend on this crate so the framing and type-id tables never drift
//! between peers.

pub mod command;
pub mod error;
pub mod frame;
pub mod types;

pub use command::{decode_request, decode_response, encode_request, encode_response};
pub use error::{ProtocolError, Result};
pub use frame::{decode_header, encode_header, receive_frame, send_frame, PacketType, HEADER_SIZE, MAX_LENGTH};
pub use types::{
    descriptor_for_native, from_id, to_id, BooleanType, BytesType, FloatType, IntegerType,
    JsonArrayType, JsonObjectType, NativeType, NoneType, StringType, TypeDescriptor, TypeId,
    BUILTIN_TYPES,
};
