//! smoltcp [`Device`](smoltcp::phy::Device) implementation backed by
//! plain byte buffers fed from the real TUN fd by the tasks in
//! [`crate::stack`].
//!
//! Grounded on the in-memory stub device pattern used to plug smoltcp
//! into a TUN-backed interface (an `InMemoryDevice`/`RxToken`/`TxToken`
//! triple over `VecDeque`s of whole packets).

use std::collections::VecDeque;

use smoltcp::phy::{Device, DeviceCapabilities, Medium, RxToken, TxToken};
use smoltcp::time::Instant;

use crate::tun::MIN_MTU;

/// Packets large enough for any IPv6 path plus headroom; the real cap is
/// the interface MTU configured in [`crate::tun::open`].
const MAX_PACKET_SIZE: usize = 65536;

#[derive(Default)]
pub struct TunChannelDevice {
    inbound: VecDeque<Vec<u8>>,
    outbound: VecDeque<Vec<u8>>,
}

impl TunChannelDevice {
    pub fn push_inbound(&mut self, packet: Vec<u8>) {
        self.inbound.push_back(packet);
    }

    pub fn pop_outbound(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    pub fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }
}

impl Device for TunChannelDevice {
    type RxToken<'a> = RxBuf;
    type TxToken<'a> = TxBuf<'a>;

    fn receive(&mut self, _timestamp: Instant) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        let packet = self.inbound.pop_front()?;
        let rx = RxBuf { packet };
        let tx = TxBuf {
            outbound: &mut self.outbound,
        };
        Some((rx, tx))
    }

    fn transmit(&mut self, _timestamp: Instant) -> Option<Self::TxToken<'_>> {
        Some(TxBuf {
            outbound: &mut self.outbound,
        })
    }

    fn capabilities(&self) -> DeviceCapabilities {
        let mut caps = DeviceCapabilities::default();
        caps.medium = Medium::Ip;
        caps.max_transmission_unit = MAX_PACKET_SIZE.min(u16::MAX as usize).max(MIN_MTU as usize);
        caps
    }
}

pub struct RxBuf {
    packet: Vec<u8>,
}

impl RxToken for RxBuf {
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(&self.packet)
    }
}

pub struct TxBuf<'a> {
    outbound: &'a mut VecDeque<Vec<u8>>,
}

impl<'a> TxToken for TxBuf<'a> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut buf = vec![0u8; len];
        let result = f(&mut buf);
        self.outbound.push_back(buf);
        result
    }
}
