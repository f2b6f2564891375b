use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

/// Command carried by the first frame on every stream.
///
/// An unknown command string is not a decode error by itself — the receiver
/// decodes the envelope fine, inspects `command`, and then logs+closes the
/// stream if it doesn't recognize it (spec §4.1).
pub const GET_ROUTES_REQ: &str = "GetRoutesReq";
pub const ESTABLISH_CONNECTION: &str = "EstablishConnection";

/// Application-level close code meaning "ordinary shutdown" (spec §3, §6).
pub const APPLICATION_OK: u64 = 0;

/// Generic application-level close code for any non-benign close. The wire
/// protocol only distinguishes `ApplicationOK` from "everything else" (spec
/// §4.7), so this is the one code every other close reason uses.
pub const APPLICATION_ERROR: u64 = 1;

/// The first frame on every Raido stream: a command name plus an opaque
/// payload the command defines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub command: String,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn new(command: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            command: command.into(),
            body,
        }
    }

    pub fn get_routes_request() -> Self {
        Self::new(GET_ROUTES_REQ, Vec::new())
    }

    pub fn establish_connection(body: Vec<u8>) -> Self {
        Self::new(ESTABLISH_CONNECTION, body)
    }

    /// Encode directly to bytes, with no outer length prefix. Used by
    /// callers that already own stream framing (see `raido-proto::codec`
    /// for the length-prefixed variant used on the wire).
    pub fn encode(&self) -> Result<Vec<u8>, ProtoError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode directly from bytes. Any buffer shorter than 3 bytes can
    /// never hold a valid envelope and is rejected without attempting to
    /// deserialize it (spec §8 boundary behavior).
    pub fn decode(buf: &[u8]) -> Result<Self, ProtoError> {
        if buf.len() < 3 {
            return Err(ProtoError::Malformed(format!(
                "envelope shorter than 3 bytes: {} bytes",
                buf.len()
            )));
        }
        Ok(bincode::deserialize(buf)?)
    }
}

/// Agent's reply to `GetRoutesReq`: an informational name and the agent's
/// advertised route list (not yet filtered — the proxy server filters it).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetRoutesResp {
    pub name: String,
    pub routes: Vec<String>,
}

/// Agent's reply to `EstablishConnection`, after attempting to dial the
/// requested target locally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectResponse {
    pub established: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::establish_connection(vec![1, 2, 3]);
        let encoded = env.encode().unwrap();
        let decoded = Envelope::decode(&encoded).unwrap();
        assert_eq!(decoded, env);
    }

    #[test]
    fn envelope_too_short_is_malformed() {
        let err = Envelope::decode(&[0u8, 1]).unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }

    #[test]
    fn get_routes_resp_roundtrip() {
        let resp = GetRoutesResp {
            name: "alice@host".to_string(),
            routes: vec!["10.0.0.0/24".to_string(), "127.0.0.0/8".to_string()],
        };
        let bytes = bincode::serialize(&resp).unwrap();
        let decoded: GetRoutesResp = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, resp);
    }

    #[test]
    fn connect_response_roundtrip() {
        for established in [true, false] {
            let resp = ConnectResponse { established };
            let bytes = bincode::serialize(&resp).unwrap();
            let decoded: ConnectResponse = bincode::deserialize(&bytes).unwrap();
            assert_eq!(decoded, resp);
        }
    }
}
