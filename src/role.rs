//! Connection role negotiation.
//!
//! Every GPCP connection has two ends, each configured as a responder
//! (`R`, serves commands), a requester (`A`, issues commands), or both
//! (`AR`/`RA`, accepted on the wire and normalized to `Both`). The two
//! ends exchange their configured role as the very first thing on the
//! wire, as a JSON object `{"role": "R"|"A"|"AR"|"RA"}`; the pairing is
//! rejected if both ends declared the same single-direction role.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A connection's configured role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Serves commands; never issues one to the peer.
    Responder,
    /// Issues commands; never serves one from the peer.
    Requester,
    /// Both serves and issues commands.
    Both,
}

impl Role {
    fn wire_tag(self) -> &'static str {
        match self {
            Role::Responder => "R",
            Role::Requester => "A",
            Role::Both => "AR",
        }
    }

    fn from_wire_tag(tag: &str) -> Option<Self> {
        match tag {
            "R" => Some(Role::Responder),
            "A" => Some(Role::Requester),
            "AR" | "RA" => Some(Role::Both),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Role::Responder => "responder",
            Role::Requester => "requester",
            Role::Both => "both",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RoleMessage {
    role: String,
}

/// Serialize the negotiation handshake message for `role`.
pub(crate) fn encode_handshake(role: Role) -> Vec<u8> {
    serde_json::to_vec(&RoleMessage {
        role: role.wire_tag().to_string(),
    })
    .expect("role message is always serializable")
}

/// Parse an inbound negotiation handshake message.
pub(crate) fn decode_handshake(body: &[u8]) -> Result<Role> {
    let msg: RoleMessage = serde_json::from_slice(body)
        .map_err(|e| Error::Protocol(gpcp_protocol::ProtocolError::Json(e)))?;
    Role::from_wire_tag(&msg.role).ok_or_else(|| {
        Error::Protocol(gpcp_protocol::ProtocolError::InvalidMessage(format!(
            "unknown role in handshake: {}",
            msg.role
        )))
    })
}

/// The direction(s) a negotiated connection actually carries, once the
/// local and remote roles have been reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedRoles {
    /// This endpoint may send REQUEST frames to the peer.
    pub may_request: bool,
    /// This endpoint may serve REQUEST frames sent by the peer.
    pub may_serve: bool,
}

/// Reconcile a local and remote [`Role`] announcement. Rejects `R`/`R`
/// and `A`/`A` pairings — those connections can never carry a command in
/// either direction.
pub fn negotiate(local: Role, remote: Role) -> Result<NegotiatedRoles> {
    if local == Role::Responder && remote == Role::Responder {
        return Err(role_mismatch(local, remote));
    }
    if local == Role::Requester && remote == Role::Requester {
        return Err(role_mismatch(local, remote));
    }

    let may_request = local != Role::Responder && remote != Role::Requester;
    let may_serve = local != Role::Requester && remote != Role::Responder;

    Ok(NegotiatedRoles {
        may_request,
        may_serve,
    })
}

fn role_mismatch(local: Role, remote: Role) -> Error {
    Error::RoleMismatch {
        local: local.label().to_string(),
        remote: remote.label().to_string(),
    }
}
