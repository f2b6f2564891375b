use thiserror::Error;

/// Errors from netlink link/route operations (spec §4.9). Fatal only for
/// link creation and destruction — route add/remove already swallow the
/// "already exists"/"not found" cases the kernel returns for operations
/// that raced another actor.
#[derive(Debug, Error)]
pub enum SysNetError {
    #[error("netlink request failed: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[error("failed to open netlink connection: {0}")]
    ConnectionSetup(#[from] std::io::Error),

    #[error("link {0} not found")]
    LinkNotFound(String),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("no 240.0.0.0/4 addresses remain for a loopback stand-in")]
    LoopbackBlockExhausted,
}
