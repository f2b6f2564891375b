use std::fmt;
use std::io;

use thiserror::Error;

/// Errors surfaced by [`crate::relay`] after benign closes have already
/// been filtered out (spec §4.3).
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("source→destination: {0}")]
    SourceToDestination(#[source] io::Error),

    #[error("destination→source: {0}")]
    DestinationToSource(#[source] io::Error),

    #[error("{0}")]
    Both(JoinedIoError),
}

/// Both relay directions failed with a non-benign error; neither is
/// dropped silently.
#[derive(Debug)]
pub struct JoinedIoError {
    pub source_to_dest: io::Error,
    pub dest_to_source: io::Error,
}

impl fmt::Display for JoinedIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source→destination: {}; destination→source: {}",
            self.source_to_dest, self.dest_to_source
        )
    }
}

/// True when `err` represents a connection closing normally rather than
/// failing (spec §4.3): EOF, "use of closed network connection", a TLS
/// close-notify arriving after the stream already closed, or a wrapped
/// multi-error whose every inner cause is itself benign.
pub fn is_benign_close(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected
    ) {
        return true;
    }

    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("use of closed network connection")
        || msg.contains("closenotify")
        || msg.contains("close notify")
        || msg.contains("eof")
}

/// Distinguished from a plain benign close: the peer actively refused or
/// reset the connection rather than shutting it down cleanly (spec §4.3
/// — "host responded negatively"). Still not surfaced as a relay error,
/// since it's the expected shape of "target isn't listening".
pub fn is_host_negative_response(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionAborted
    )
}

/// True when this error should be swallowed rather than returned from
/// [`crate::relay`] — either a benign close or a negative host response.
pub fn is_suppressed(err: &io::Error) -> bool {
    is_benign_close(err) || is_host_negative_response(err)
}
