//! Wire codec for the Raido control protocol.
//!
//! Two message families share a stream at different phases (spec §4.1):
//! an [`Envelope`] is always the first frame, carrying a command name and
//! an opaque body; the body is then decoded as one of [`GetRoutesResp`],
//! [`ConnectionRequest`] or [`ConnectResponse`] depending on that command.

mod codec;
mod connection_request;
mod envelope;
mod error;

pub use codec::{decode_frame, encode_frame, read_frame, write_frame, MAX_FRAME_SIZE};
pub use connection_request::{ConnectionRequest, NetworkFamily, TransportProtocol};
pub use envelope::{
    ConnectResponse, Envelope, GetRoutesResp, APPLICATION_ERROR, APPLICATION_OK,
    ESTABLISH_CONNECTION, GET_ROUTES_REQ,
};
pub use error::ProtoError;
