// Chip driver interface and implementations

pub mod sim;

use crate::error::NetError;
use config::IpConfig;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

/// Protocol a hardware socket slot is opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    IpRaw,
}

impl Protocol {
    /// Value for the chip's socket mode register (Sn_MR), without flags
    pub fn mode_register(self) -> u8 {
        match self {
            Protocol::Tcp => 0x01,
            Protocol::Udp => 0x02,
            Protocol::IpRaw => 0x03,
        }
    }

    /// Whether the slot carries datagrams rather than a byte stream
    pub fn is_datagram(self) -> bool {
        matches!(self, Protocol::Udp | Protocol::IpRaw)
    }
}

impl core::fmt::Display for Protocol {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::IpRaw => write!(f, "IPRAW"),
        }
    }
}

/// Socket status as reported by the chip (Sn_SR)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketStatus {
    Closed,
    Init,
    Listen,
    SynSent,
    SynRecv,
    Established,
    FinWait,
    Closing,
    TimeWait,
    CloseWait,
    LastAck,
    Udp,
    IpRaw,
    MacRaw,
    /// A transient or vendor-specific code
    Other(u8),
}

impl SocketStatus {
    /// Decode the Sn_SR register value
    pub fn from_register(value: u8) -> Self {
        match value {
            0x00 => SocketStatus::Closed,
            0x13 => SocketStatus::Init,
            0x14 => SocketStatus::Listen,
            0x15 => SocketStatus::SynSent,
            0x16 => SocketStatus::SynRecv,
            0x17 => SocketStatus::Established,
            0x18 => SocketStatus::FinWait,
            0x1A => SocketStatus::Closing,
            0x1B => SocketStatus::TimeWait,
            0x1C => SocketStatus::CloseWait,
            0x1D => SocketStatus::LastAck,
            0x22 => SocketStatus::Udp,
            0x32 => SocketStatus::IpRaw,
            0x42 => SocketStatus::MacRaw,
            other => SocketStatus::Other(other),
        }
    }

    /// Data may be sent in this state
    pub fn can_send(self) -> bool {
        matches!(self, SocketStatus::Established | SocketStatus::CloseWait)
    }

    /// A TCP connection winding down that may be reclaimed when slots run out
    pub fn is_lingering(self) -> bool {
        matches!(
            self,
            SocketStatus::FinWait
                | SocketStatus::Closing
                | SocketStatus::TimeWait
                | SocketStatus::LastAck
        )
    }
}

/// Trait for socket-offload chip drivers
///
/// The chip owns the TCP/IP stack; the driver only moves commands and data
/// for individual socket slots. Slot indices passed in are always below
/// `socket_count()`; the socket manager guarantees that. All calls must be
/// non-blocking.
pub trait SocketChip {
    /// Number of hardware socket slots
    fn socket_count(&self) -> usize;

    /// Open `slot` in `protocol` bound to local `port`
    ///
    /// # Arguments
    /// * `multicast` - group to join (UDP only); the chip derives the group MAC
    ///
    /// # Returns
    /// * `Ok(())` if the chip accepted the OPEN command
    /// * `Err(NetError)` if the slot could not be opened
    fn open(
        &mut self,
        slot: usize,
        protocol: Protocol,
        port: u16,
        multicast: Option<Ipv4Address>,
    ) -> Result<(), NetError>;

    /// Current status register of `slot`
    fn status(&mut self, slot: usize) -> SocketStatus;

    /// Issue CLOSE; the slot reports `Closed` afterwards
    fn close(&mut self, slot: usize);

    /// Start an active TCP open towards `addr:port`
    fn connect(&mut self, slot: usize, addr: Ipv4Address, port: u16);

    /// Start a graceful TCP close (FIN)
    fn disconnect(&mut self, slot: usize);

    /// Put an initialised TCP slot into LISTEN
    fn listen(&mut self, slot: usize) -> Result<(), NetError>;

    /// Queue and transmit as much of `data` as fits in the TX buffer
    ///
    /// # Returns
    /// Number of bytes accepted; 0 when the buffer is momentarily full
    fn send(&mut self, slot: usize, data: &[u8]) -> usize;

    /// Copy up to `buf.len()` received bytes out of the RX buffer
    ///
    /// For UDP slots every datagram is preceded by the chip's 8-byte header
    /// (source IP, source port, payload length; big-endian).
    fn recv(&mut self, slot: usize, buf: &mut [u8]) -> usize;

    /// Bytes waiting in the RX buffer
    fn recv_available(&mut self, slot: usize) -> usize;

    /// Next RX byte without consuming it
    fn peek(&mut self, slot: usize) -> Option<u8>;

    /// Set the destination of the next datagram and reset the TX write offset
    fn start_datagram(&mut self, slot: usize, addr: Ipv4Address, port: u16)
        -> Result<(), NetError>;

    /// Write `data` into TX memory at `offset` from the datagram start
    ///
    /// # Returns
    /// Number of bytes written (less than `data.len()` when TX memory is short)
    fn buffer_datagram(&mut self, slot: usize, offset: usize, data: &[u8]) -> usize;

    /// Transmit the buffered datagram
    fn send_datagram(&mut self, slot: usize) -> Result<(), NetError>;

    /// Get the MAC address programmed into the chip
    fn mac_address(&self) -> EthernetAddress;

    fn set_mac_address(&mut self, mac: EthernetAddress);

    /// Program source IP, mask and gateway registers
    fn set_ip_config(&mut self, config: &IpConfig);

    /// Check if the network link is up
    fn is_link_up(&self) -> bool;

    /// A hardware-derived value for seeding pseudo-random generators
    /// (floating ADC pin, free-running timer, ...)
    fn entropy(&mut self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_register_decoding() {
        assert_eq!(SocketStatus::from_register(0x00), SocketStatus::Closed);
        assert_eq!(SocketStatus::from_register(0x17), SocketStatus::Established);
        assert_eq!(SocketStatus::from_register(0x22), SocketStatus::Udp);
        assert_eq!(SocketStatus::from_register(0x11), SocketStatus::Other(0x11));
    }

    #[test]
    fn test_lingering_states() {
        assert!(SocketStatus::TimeWait.is_lingering());
        assert!(SocketStatus::LastAck.is_lingering());
        assert!(!SocketStatus::Established.is_lingering());
        assert!(!SocketStatus::Closed.is_lingering());
    }

    #[test]
    fn test_can_send() {
        assert!(SocketStatus::Established.can_send());
        assert!(SocketStatus::CloseWait.can_send());
        assert!(!SocketStatus::Listen.can_send());
    }

    #[test]
    fn test_protocol_display() {
        assert_eq!(format!("{}", Protocol::Tcp), "TCP");
        assert_eq!(format!("{}", Protocol::IpRaw), "IPRAW");
        assert!(Protocol::Udp.is_datagram());
        assert!(!Protocol::Tcp.is_datagram());
    }
}
