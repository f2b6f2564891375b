//! Proxy-server library: the reverse handshake, listener accept loop, and
//! [`ProxyController`](raido_control::ProxyController) implementation
//! binding them to the operator control channel (spec §4.6, §4.11).
//!
//! Grounded on `original_source/proxy/server.go` for the accept/handshake
//! shape, generalized so the listener itself starts and stops on
//! `ProxyStart`/`ProxyStop` rather than at process launch (spec §6).

mod accept;
mod controller;
mod error;
mod handshake;

pub use controller::ServerController;
pub use error::ServerError;
