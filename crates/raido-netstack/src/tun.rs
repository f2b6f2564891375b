//! Opens the TUN kernel interface (spec §4.7, C7). Creation, naming and
//! fd lifetime only; the kernel link itself (oper-state, routes) is owned
//! by `raido-sysnet`, which operates on the interface by name once this
//! module has handed it back.

use tracing::{debug, info};

use crate::error::NetStackError;

/// The stack requires MTU headroom for IPv6 minimum-MTU paths.
pub const MIN_MTU: u16 = 1280;

const NAME_PREFIX: &str = "raido";
const MAX_INDEX: u32 = 256;

/// Probe `raido0`, `raido1`, ... until one creates successfully. The `tun`
/// crate surfaces "name already in use" as a generic I/O-backed error, so
/// any failure just advances to the next candidate; only exhausting the
/// whole range is fatal.
pub async fn open() -> Result<(String, tun::AsyncDevice), NetStackError> {
    let mut last_err = None;

    for index in 0..MAX_INDEX {
        let name = format!("{NAME_PREFIX}{index}");
        let mut config = tun::Configuration::default();
        config.name(&name).mtu(MIN_MTU as i32).up();

        #[cfg(target_os = "linux")]
        config.platform(|platform| {
            platform.packet_information(false);
        });

        match tun::create_as_async(&config) {
            Ok(device) => {
                info!(interface = %name, "created TUN link");
                return Ok((name, device));
            }
            Err(e) => {
                debug!(interface = %name, error = %e, "candidate name unavailable, trying next");
                last_err = Some(e);
            }
        }
    }

    Err(last_err
        .map(NetStackError::Tun)
        .unwrap_or(NetStackError::SocketSetExhausted))
}
