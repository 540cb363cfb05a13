//! In-memory socket-offload chip
//!
//! `SimChip` models what the socket manager and the DHCP client can observe
//! of a real chip: per-slot status registers, TCP byte streams, UDP receive
//! framing (8-byte header before every datagram) and the datagram staging
//! area that only goes on the wire at SEND. It is used for host-side tests
//! and for bring-up without hardware.
//!
//! A responder closure can be installed to answer outgoing datagrams, which
//! is how tests play the part of a DHCP server.

use super::{Protocol, SocketChip, SocketStatus};
use crate::error::NetError;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::string::ToString;
use alloc::vec::Vec;
use config::IpConfig;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

/// TX memory per slot
pub const SIM_TX_BUFFER: usize = 2048;

/// A UDP datagram as seen on the simulated wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Port on the chip's side (source when sent, destination when received)
    pub local_port: u16,
    /// Address of the other end
    pub remote: Ipv4Address,
    pub remote_port: u16,
    pub payload: Vec<u8>,
}

/// Produces replies to a transmitted datagram
pub type Responder = Box<dyn FnMut(&Datagram) -> Vec<Datagram>>;

#[derive(Debug)]
struct SimSlot {
    protocol: Option<Protocol>,
    status: SocketStatus,
    port: u16,
    multicast: Option<Ipv4Address>,
    remote: Option<(Ipv4Address, u16)>,
    rx: VecDeque<u8>,
    transmitted: Vec<u8>,
    staging: Vec<u8>,
    datagram_dest: Option<(Ipv4Address, u16)>,
    opens: usize,
    closes: usize,
}

impl SimSlot {
    fn new() -> Self {
        Self {
            protocol: None,
            status: SocketStatus::Closed,
            port: 0,
            multicast: None,
            remote: None,
            rx: VecDeque::new(),
            transmitted: Vec::new(),
            staging: Vec::new(),
            datagram_dest: None,
            opens: 0,
            closes: 0,
        }
    }

    fn reset(&mut self) {
        self.protocol = None;
        self.status = SocketStatus::Closed;
        self.port = 0;
        self.multicast = None;
        self.remote = None;
        self.rx.clear();
        self.staging.clear();
        self.datagram_dest = None;
    }
}

/// Simulated chip with a fixed number of socket slots
pub struct SimChip {
    slots: Vec<SimSlot>,
    mac: EthernetAddress,
    ip_config: IpConfig,
    link_up: bool,
    entropy: u32,
    tx_capacity: usize,
    refuse_connections: bool,
    fail_next_open: bool,
    sent: Vec<Datagram>,
    responder: Option<Responder>,
}

impl SimChip {
    pub fn new(sockets: usize) -> Self {
        let mut slots = Vec::with_capacity(sockets);
        slots.resize_with(sockets, SimSlot::new);
        Self {
            slots,
            mac: EthernetAddress([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]),
            ip_config: IpConfig::UNCONFIGURED,
            link_up: true,
            entropy: 0x5eed,
            tx_capacity: SIM_TX_BUFFER,
            refuse_connections: false,
            fail_next_open: false,
            sent: Vec::new(),
            responder: None,
        }
    }

    /// Answer every transmitted datagram with whatever `responder` returns
    pub fn set_responder<F>(&mut self, responder: F)
    where
        F: FnMut(&Datagram) -> Vec<Datagram> + 'static,
    {
        self.responder = Some(Box::new(responder));
    }

    pub fn clear_responder(&mut self) {
        self.responder = None;
    }

    /// Deliver a datagram to the UDP slot bound to `datagram.local_port`
    ///
    /// # Returns
    /// `false` if no open UDP slot listens on that port (the datagram is dropped)
    pub fn inject_datagram(&mut self, datagram: &Datagram) -> bool {
        let target = self.slots.iter_mut().find(|slot| {
            slot.protocol == Some(Protocol::Udp)
                && slot.status == SocketStatus::Udp
                && slot.port == datagram.local_port
        });
        let Some(slot) = target else {
            return false;
        };
        slot.rx.extend(datagram.remote.as_bytes().iter().copied());
        slot.rx.extend(datagram.remote_port.to_be_bytes());
        slot.rx.extend((datagram.payload.len() as u16).to_be_bytes());
        slot.rx.extend(datagram.payload.iter().copied());
        true
    }

    /// Append bytes to a slot's RX stream (data from the TCP peer)
    pub fn inject_stream(&mut self, slot: usize, data: &[u8]) {
        if let Some(slot) = self.slots.get_mut(slot) {
            slot.rx.extend(data.iter().copied());
        }
    }

    /// Force a status register value (peer close, TIME_WAIT, ...)
    pub fn set_status(&mut self, slot: usize, status: SocketStatus) {
        if let Some(slot) = self.slots.get_mut(slot) {
            slot.status = status;
        }
    }

    /// Limit how many bytes one `send` call accepts; 0 models a full buffer
    pub fn set_tx_capacity(&mut self, bytes: usize) {
        self.tx_capacity = bytes;
    }

    /// Make subsequent `connect` calls end in `Closed` (RST from the peer)
    pub fn set_refuse_connections(&mut self, refuse: bool) {
        self.refuse_connections = refuse;
    }

    /// Make the next OPEN command fail
    pub fn fail_next_open(&mut self) {
        self.fail_next_open = true;
    }

    pub fn set_link_up(&mut self, up: bool) {
        self.link_up = up;
    }

    pub fn set_entropy(&mut self, value: u32) {
        self.entropy = value;
    }

    /// Bytes transmitted so far on a TCP slot
    pub fn transmitted(&self, slot: usize) -> &[u8] {
        self.slots
            .get(slot)
            .map(|s| s.transmitted.as_slice())
            .unwrap_or(&[])
    }

    /// Datagram bytes staged but not yet sent
    pub fn staged(&self, slot: usize) -> &[u8] {
        self.slots
            .get(slot)
            .map(|s| s.staging.as_slice())
            .unwrap_or(&[])
    }

    /// Every datagram transmitted, oldest first
    pub fn sent_datagrams(&self) -> &[Datagram] {
        &self.sent
    }

    /// Local port a slot was opened on
    pub fn bound_port(&self, slot: usize) -> Option<u16> {
        self.slots
            .get(slot)
            .filter(|s| s.protocol.is_some())
            .map(|s| s.port)
    }

    pub fn multicast_group(&self, slot: usize) -> Option<Ipv4Address> {
        self.slots.get(slot).and_then(|s| s.multicast)
    }

    /// Remote end of the last `connect` on a slot
    pub fn remote(&self, slot: usize) -> Option<(Ipv4Address, u16)> {
        self.slots.get(slot).and_then(|s| s.remote)
    }

    /// Number of OPEN commands issued to a slot
    pub fn open_count(&self, slot: usize) -> usize {
        self.slots.get(slot).map(|s| s.opens).unwrap_or(0)
    }

    /// Number of CLOSE commands issued to a slot
    pub fn close_count(&self, slot: usize) -> usize {
        self.slots.get(slot).map(|s| s.closes).unwrap_or(0)
    }

    /// Address configuration last programmed
    pub fn ip_config(&self) -> IpConfig {
        self.ip_config
    }

    fn respond(&mut self, sent: &Datagram) {
        let Some(mut responder) = self.responder.take() else {
            return;
        };
        let replies = responder(sent);
        self.responder = Some(responder);
        for reply in &replies {
            self.inject_datagram(reply);
        }
    }
}

impl SocketChip for SimChip {
    fn socket_count(&self) -> usize {
        self.slots.len()
    }

    fn open(
        &mut self,
        slot: usize,
        protocol: Protocol,
        port: u16,
        multicast: Option<Ipv4Address>,
    ) -> Result<(), NetError> {
        if core::mem::take(&mut self.fail_next_open) {
            return Err(NetError::ChipError("OPEN command not acknowledged".to_string()));
        }
        let slot = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| NetError::ChipError("slot out of range".to_string()))?;
        slot.reset();
        slot.opens += 1;
        slot.protocol = Some(protocol);
        slot.port = port;
        slot.multicast = multicast;
        slot.status = match protocol {
            Protocol::Tcp => SocketStatus::Init,
            Protocol::Udp => SocketStatus::Udp,
            Protocol::IpRaw => SocketStatus::IpRaw,
        };
        Ok(())
    }

    fn status(&mut self, slot: usize) -> SocketStatus {
        self.slots
            .get(slot)
            .map(|s| s.status)
            .unwrap_or(SocketStatus::Closed)
    }

    fn close(&mut self, slot: usize) {
        if let Some(slot) = self.slots.get_mut(slot) {
            slot.closes += 1;
            slot.reset();
        }
    }

    fn connect(&mut self, slot: usize, addr: Ipv4Address, port: u16) {
        let refuse = self.refuse_connections;
        if let Some(slot) = self.slots.get_mut(slot) {
            if slot.status != SocketStatus::Init {
                return;
            }
            slot.remote = Some((addr, port));
            slot.status = if refuse {
                SocketStatus::Closed
            } else {
                SocketStatus::Established
            };
        }
    }

    fn disconnect(&mut self, slot: usize) {
        if let Some(slot) = self.slots.get_mut(slot) {
            if slot.status.can_send() {
                slot.status = SocketStatus::Closed;
            }
        }
    }

    fn listen(&mut self, slot: usize) -> Result<(), NetError> {
        let slot = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| NetError::ChipError("slot out of range".to_string()))?;
        if slot.status != SocketStatus::Init {
            return Err(NetError::ChipError("LISTEN outside INIT".to_string()));
        }
        slot.status = SocketStatus::Listen;
        Ok(())
    }

    fn send(&mut self, slot: usize, data: &[u8]) -> usize {
        let capacity = self.tx_capacity;
        match self.slots.get_mut(slot) {
            Some(slot) if slot.status.can_send() => {
                let n = data.len().min(capacity);
                slot.transmitted.extend_from_slice(&data[..n]);
                n
            }
            _ => 0,
        }
    }

    fn recv(&mut self, slot: usize, buf: &mut [u8]) -> usize {
        let Some(slot) = self.slots.get_mut(slot) else {
            return 0;
        };
        let n = buf.len().min(slot.rx.len());
        for (dst, src) in buf.iter_mut().zip(slot.rx.drain(..n)) {
            *dst = src;
        }
        n
    }

    fn recv_available(&mut self, slot: usize) -> usize {
        self.slots.get(slot).map(|s| s.rx.len()).unwrap_or(0)
    }

    fn peek(&mut self, slot: usize) -> Option<u8> {
        self.slots.get(slot).and_then(|s| s.rx.front().copied())
    }

    fn start_datagram(
        &mut self,
        slot: usize,
        addr: Ipv4Address,
        port: u16,
    ) -> Result<(), NetError> {
        let slot = self
            .slots
            .get_mut(slot)
            .ok_or_else(|| NetError::ChipError("slot out of range".to_string()))?;
        if !matches!(slot.status, SocketStatus::Udp | SocketStatus::IpRaw) {
            return Err(NetError::ChipError("slot not open for datagrams".to_string()));
        }
        if addr.is_unspecified() || port == 0 {
            return Err(NetError::ChipError("invalid datagram destination".to_string()));
        }
        slot.staging.clear();
        slot.datagram_dest = Some((addr, port));
        Ok(())
    }

    fn buffer_datagram(&mut self, slot: usize, offset: usize, data: &[u8]) -> usize {
        let Some(slot) = self.slots.get_mut(slot) else {
            return 0;
        };
        if slot.datagram_dest.is_none() || offset >= SIM_TX_BUFFER {
            return 0;
        }
        let n = data.len().min(SIM_TX_BUFFER - offset);
        if slot.staging.len() < offset + n {
            slot.staging.resize(offset + n, 0);
        }
        slot.staging[offset..offset + n].copy_from_slice(&data[..n]);
        n
    }

    fn send_datagram(&mut self, slot: usize) -> Result<(), NetError> {
        let datagram = {
            let slot = self
                .slots
                .get_mut(slot)
                .ok_or_else(|| NetError::ChipError("slot out of range".to_string()))?;
            let (remote, remote_port) = slot
                .datagram_dest
                .take()
                .ok_or_else(|| NetError::ChipError("SEND without destination".to_string()))?;
            Datagram {
                local_port: slot.port,
                remote,
                remote_port,
                payload: core::mem::take(&mut slot.staging),
            }
        };
        if !self.link_up {
            return Err(NetError::LinkDown);
        }
        self.sent.push(datagram.clone());
        self.respond(&datagram);
        Ok(())
    }

    fn mac_address(&self) -> EthernetAddress {
        self.mac
    }

    fn set_mac_address(&mut self, mac: EthernetAddress) {
        self.mac = mac;
    }

    fn set_ip_config(&mut self, config: &IpConfig) {
        self.ip_config = *config;
    }

    fn is_link_up(&self) -> bool {
        self.link_up
    }

    fn entropy(&mut self) -> u32 {
        self.entropy
    }
}
