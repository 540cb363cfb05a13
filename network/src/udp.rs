// UDP endpoint on top of the socket manager

use crate::drivers::{Protocol, SocketChip};
use crate::error::NetError;
use crate::socket::{SocketHandle, SocketManager, Stream};
use smoltcp::wire::Ipv4Address;

/// Size of the header the chip puts in front of every received datagram
pub const UDP_HEADER_LEN: usize = 8;

/// A UDP socket holding at most one hardware slot
///
/// Receiving works a packet at a time: `parse_packet` moves to the next
/// datagram, after which `available`/`read` are limited to its payload.
/// Sending is `begin_packet`, any number of `write`s, then `end_packet`.
#[derive(Debug, Clone)]
pub struct UdpSocket {
    handle: Option<SocketHandle>,
    port: u16,
    remote_ip: Ipv4Address,
    remote_port: u16,
    /// Write offset into the datagram being assembled
    offset: usize,
    /// Unread payload bytes of the current incoming datagram
    remaining: usize,
}

impl Default for UdpSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpSocket {
    pub const fn new() -> Self {
        Self {
            handle: None,
            port: 0,
            remote_ip: Ipv4Address::UNSPECIFIED,
            remote_port: 0,
            offset: 0,
            remaining: 0,
        }
    }

    /// Bind to `port` (0 for an ephemeral one), releasing any slot already held
    pub fn begin<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        port: u16,
    ) -> Result<(), NetError> {
        self.stop(sockets);
        let handle = sockets.allocate(Protocol::Udp, port)?;
        self.bind(sockets, handle);
        Ok(())
    }

    /// Bind to `port` and join the multicast `group`
    pub fn begin_multicast<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        group: Ipv4Address,
        port: u16,
    ) -> Result<(), NetError> {
        self.stop(sockets);
        let handle = sockets.allocate_multicast(Protocol::Udp, group, port)?;
        self.bind(sockets, handle);
        Ok(())
    }

    fn bind<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &SocketManager<C, N>,
        handle: SocketHandle,
    ) {
        self.handle = Some(handle);
        self.port = sockets.local_port(handle).unwrap_or(0);
        self.offset = 0;
        self.remaining = 0;
    }

    /// Release the slot. Safe to call repeatedly.
    pub fn stop<C: SocketChip, const N: usize>(&mut self, sockets: &mut SocketManager<C, N>) {
        if let Some(handle) = self.handle.take() {
            sockets.close(handle);
        }
        self.port = 0;
        self.remaining = 0;
        self.offset = 0;
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Local port bound by `begin`
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Sender of the datagram currently being read
    pub fn remote_ip(&self) -> Ipv4Address {
        self.remote_ip
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Start a datagram to `ip:port`
    pub fn begin_packet<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        ip: Ipv4Address,
        port: u16,
    ) -> Result<(), NetError> {
        let handle = self.handle.ok_or(NetError::InvalidHandle)?;
        self.offset = 0;
        sockets.begin_datagram(handle, ip, port)
    }

    /// Transmit the datagram started with `begin_packet`
    pub fn end_packet<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> Result<(), NetError> {
        let handle = self.handle.ok_or(NetError::InvalidHandle)?;
        self.offset = 0;
        sockets.send_datagram(handle)
    }

    /// Move to the next received datagram, discarding what is left of the current one
    ///
    /// # Returns
    /// Payload size of the new datagram, or 0 if none is waiting
    pub fn parse_packet<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> usize {
        self.flush(sockets);
        let Some(handle) = self.handle else {
            return 0;
        };
        if sockets.recv_available(handle).unwrap_or(0) < UDP_HEADER_LEN {
            return 0;
        }

        let mut header = [0u8; UDP_HEADER_LEN];
        if sockets.recv(handle, &mut header).unwrap_or(0) != UDP_HEADER_LEN {
            return 0;
        }
        self.remote_ip = Ipv4Address::from_bytes(&header[0..4]);
        self.remote_port = u16::from_be_bytes([header[4], header[5]]);
        self.remaining = u16::from_be_bytes([header[6], header[7]]) as usize;
        self.remaining
    }

    /// Skip the unread rest of the current datagram
    pub fn flush<C: SocketChip, const N: usize>(&mut self, sockets: &mut SocketManager<C, N>) {
        let Some(handle) = self.handle else {
            self.remaining = 0;
            return;
        };
        let mut scratch = [0u8; 64];
        while self.remaining > 0 {
            let want = self.remaining.min(scratch.len());
            match sockets.recv(handle, &mut scratch[..want]) {
                Ok(n) if n > 0 => self.remaining -= n,
                _ => break,
            }
        }
        self.remaining = 0;
    }
}

impl Stream for UdpSocket {
    fn handle(&self) -> Option<SocketHandle> {
        self.handle
    }

    fn available<C: SocketChip, const N: usize>(
        &mut self,
        _sockets: &mut SocketManager<C, N>,
    ) -> usize {
        self.remaining
    }

    fn read<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        buf: &mut [u8],
    ) -> usize {
        let Some(handle) = self.handle else {
            return 0;
        };
        let want = buf.len().min(self.remaining);
        if want == 0 {
            return 0;
        }
        let n = sockets.recv(handle, &mut buf[..want]).unwrap_or(0);
        self.remaining -= n;
        n
    }

    fn peek<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> Option<u8> {
        let handle = self.handle?;
        if self.remaining == 0 {
            return None;
        }
        sockets.peek(handle).ok().flatten()
    }

    /// Append to the datagram started with `begin_packet`
    fn write<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        data: &[u8],
    ) -> usize {
        let Some(handle) = self.handle else {
            return 0;
        };
        let n = sockets.buffer_data(handle, self.offset, data).unwrap_or(0);
        self.offset += n;
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::{Datagram, SimChip};

    fn sockets() -> SocketManager<SimChip> {
        SocketManager::with_seed(SimChip::new(2), 1)
    }

    fn deliver(sockets: &mut SocketManager<SimChip>, port: u16, payload: &[u8]) {
        sockets.chip_mut().inject_datagram(&Datagram {
            local_port: port,
            remote: Ipv4Address::new(192, 0, 2, 1),
            remote_port: 4000,
            payload: payload.to_vec(),
        });
    }

    #[test]
    fn test_packet_at_a_time() {
        let mut sockets = sockets();
        let mut udp = UdpSocket::new();
        udp.begin(&mut sockets, 9000).unwrap();
        deliver(&mut sockets, 9000, b"first");
        deliver(&mut sockets, 9000, b"second!");

        assert_eq!(udp.parse_packet(&mut sockets), 5);
        assert_eq!(udp.remote_ip(), Ipv4Address::new(192, 0, 2, 1));
        assert_eq!(udp.remote_port(), 4000);
        assert_eq!(udp.read_byte(&mut sockets), Some(b'f'));

        // The unread tail of "first" is skipped
        assert_eq!(udp.parse_packet(&mut sockets), 7);
        let mut buf = [0u8; 32];
        let n = udp.read(&mut sockets, &mut buf);
        assert_eq!(&buf[..n], b"second!");
        assert_eq!(udp.available(&mut sockets), 0);
        assert_eq!(udp.parse_packet(&mut sockets), 0);
    }

    #[test]
    fn test_write_assembles_datagram() {
        let mut sockets = sockets();
        let mut udp = UdpSocket::new();
        udp.begin(&mut sockets, 0).unwrap();
        udp.begin_packet(&mut sockets, Ipv4Address::new(192, 0, 2, 7), 53)
            .unwrap();
        assert_eq!(udp.write(&mut sockets, b"hello "), 6);
        assert_eq!(udp.write(&mut sockets, b"world"), 5);
        udp.end_packet(&mut sockets).unwrap();

        let sent = &sockets.chip().sent_datagrams()[0];
        assert_eq!(sent.payload, b"hello world".to_vec());
        assert_eq!(sent.remote_port, 53);
        assert_eq!(sent.local_port, udp.local_port());
    }

    #[test]
    fn test_stop_releases_slot() {
        let mut sockets = sockets();
        let mut a = UdpSocket::new();
        let mut b = UdpSocket::new();
        a.begin(&mut sockets, 1).unwrap();
        b.begin(&mut sockets, 2).unwrap();
        let mut c = UdpSocket::new();
        assert_eq!(c.begin(&mut sockets, 3), Err(NetError::ResourceExhausted));
        a.stop(&mut sockets);
        a.stop(&mut sockets);
        assert!(c.begin(&mut sockets, 3).is_ok());
    }

    #[test]
    fn test_unopened_socket_is_inert() {
        let mut sockets = sockets();
        let mut udp = UdpSocket::new();
        assert_eq!(udp.parse_packet(&mut sockets), 0);
        assert_eq!(udp.write(&mut sockets, b"x"), 0);
        assert_eq!(
            udp.end_packet(&mut sockets),
            Err(NetError::InvalidHandle)
        );
    }
}
