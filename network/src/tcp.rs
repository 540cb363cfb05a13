// TCP client and listener on top of the socket manager

use crate::drivers::{Protocol, SocketChip, SocketStatus};
use crate::error::NetError;
use crate::socket::{SocketHandle, SocketManager, Stream};
use shared::timer::Clock;
use smoltcp::wire::Ipv4Address;

/// How long `connect` and `stop` wait for the chip by default
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 1_000;

/// An outgoing or accepted TCP connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpClient {
    handle: Option<SocketHandle>,
    timeout_ms: u64,
}

impl Default for TcpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpClient {
    pub const fn new() -> Self {
        Self {
            handle: None,
            timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
        }
    }

    /// Wrap a slot that already carries a connection (from a listener)
    pub(crate) fn from_handle(handle: SocketHandle) -> Self {
        Self {
            handle: Some(handle),
            timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
        }
    }

    pub fn set_connection_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    /// Hardware slot index, if a slot is held
    pub fn socket_number(&self) -> Option<usize> {
        self.handle.map(|h| h.index())
    }

    /// Open a connection to `ip:port`, waiting up to the connection timeout
    ///
    /// # Returns
    /// * `Ok(())` - connection established
    /// * `Err(NetError::ResourceExhausted)` - no free slot
    /// * `Err(NetError::NotConnected)` - the peer refused
    /// * `Err(NetError::Timeout)` - no answer within the timeout
    pub fn connect<C: SocketChip, K: Clock, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        clock: &mut K,
        ip: Ipv4Address,
        port: u16,
    ) -> Result<(), NetError> {
        if let Some(old) = self.handle.take() {
            if sockets.status(old).map_or(false, |s| s != SocketStatus::Closed) {
                let _ = sockets.disconnect(old);
            }
            sockets.close(old);
        }

        let handle = sockets.allocate(Protocol::Tcp, 0)?;
        if let Err(e) = sockets.connect(handle, ip, port) {
            sockets.close(handle);
            return Err(e);
        }

        let start = clock.now_ms();
        let result = loop {
            match sockets.status(handle) {
                Ok(SocketStatus::Established) | Ok(SocketStatus::CloseWait) => break Ok(()),
                Ok(SocketStatus::Closed) => break Err(NetError::NotConnected),
                Err(e) => break Err(e),
                Ok(_) => {}
            }
            if clock.elapsed_ms(start) >= self.timeout_ms {
                break Err(NetError::Timeout);
            }
            clock.delay_ms(1);
        };

        match result {
            Ok(()) => {
                log::debug!("tcp: {} connected to {}:{}", handle, ip, port);
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                log::debug!("tcp: connect to {}:{} failed: {}", ip, port, e);
                sockets.close(handle);
                Err(e)
            }
        }
    }

    /// True while the connection can still deliver or accept data
    pub fn connected<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> bool {
        match self.status(sockets) {
            SocketStatus::Listen | SocketStatus::Closed | SocketStatus::FinWait => false,
            SocketStatus::CloseWait => self.available(sockets) > 0,
            _ => self.handle.is_some(),
        }
    }

    /// Close gracefully, forcing the close if the peer does not finish in time
    pub fn stop<C: SocketChip, K: Clock, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        clock: &mut K,
    ) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = sockets.disconnect(handle);
        let start = clock.now_ms();
        while clock.elapsed_ms(start) < self.timeout_ms {
            if sockets.status(handle).map_or(true, |s| s == SocketStatus::Closed) {
                break;
            }
            clock.delay_ms(1);
        }
        sockets.close(handle);
    }
}

impl Stream for TcpClient {
    fn handle(&self) -> Option<SocketHandle> {
        self.handle
    }

    fn available<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> usize {
        self.handle
            .and_then(|h| sockets.recv_available(h).ok())
            .unwrap_or(0)
    }

    fn read<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        buf: &mut [u8],
    ) -> usize {
        self.handle
            .and_then(|h| sockets.recv(h, buf).ok())
            .unwrap_or(0)
    }

    fn peek<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> Option<u8> {
        sockets.peek(self.handle?).ok().flatten()
    }

    /// Send all of `data` unless the connection stalls or drops
    fn write<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        data: &[u8],
    ) -> usize {
        let Some(handle) = self.handle else {
            return 0;
        };
        let mut total = 0;
        while total < data.len() {
            match sockets.send(handle, &data[total..]) {
                Ok(0) | Err(_) => break,
                Ok(n) => total += n,
            }
        }
        total
    }
}

/// Accepts connections on a local port
///
/// One slot is kept in LISTEN; once a peer connects, that slot becomes a
/// connection and the next `available`/`accept` call opens a new listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpServer {
    port: u16,
}

impl TcpServer {
    pub const fn new(port: u16) -> Self {
        Self { port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Open a listening slot
    pub fn begin<C: SocketChip, const N: usize>(
        &self,
        sockets: &mut SocketManager<C, N>,
    ) -> Result<(), NetError> {
        let handle = sockets.allocate(Protocol::Tcp, self.port)?;
        if let Err(e) = sockets.listen(handle) {
            sockets.close(handle);
            return Err(e);
        }
        sockets.set_server_port(handle, self.port)?;
        log::debug!("tcp: {} listening on port {}", handle, self.port);
        Ok(())
    }

    /// A connection with unread data, if any; the server keeps tracking it
    pub fn available<C: SocketChip, const N: usize>(
        &self,
        sockets: &mut SocketManager<C, N>,
    ) -> Option<TcpClient> {
        self.scan(sockets, false)
    }

    /// Take over an established connection; the server stops tracking it
    pub fn accept<C: SocketChip, const N: usize>(
        &self,
        sockets: &mut SocketManager<C, N>,
    ) -> Option<TcpClient> {
        self.scan(sockets, true)
    }

    /// Send `data` to every connection of this server
    ///
    /// # Returns
    /// Total bytes sent across connections
    pub fn write<C: SocketChip, const N: usize>(
        &self,
        sockets: &mut SocketManager<C, N>,
        data: &[u8],
    ) -> usize {
        let mut total = 0;
        for handle in self.slots(sockets) {
            if sockets.status(handle).map_or(false, |s| s == SocketStatus::Established) {
                total += TcpClient::from_handle(handle).write(sockets, data);
            }
        }
        total
    }

    fn slots<C: SocketChip, const N: usize>(
        &self,
        sockets: &SocketManager<C, N>,
    ) -> heapless::Vec<SocketHandle, N> {
        sockets.server_slots(self.port).collect()
    }

    fn scan<C: SocketChip, const N: usize>(
        &self,
        sockets: &mut SocketManager<C, N>,
        take: bool,
    ) -> Option<TcpClient> {
        let mut listening = false;
        let mut chosen = None;

        for handle in self.slots(sockets) {
            let status = sockets.status(handle).unwrap_or(SocketStatus::Closed);
            let pending = sockets.recv_available(handle).unwrap_or(0);
            match status {
                SocketStatus::Listen => listening = true,
                SocketStatus::Established | SocketStatus::CloseWait if chosen.is_none() => {
                    if take || pending > 0 {
                        chosen = Some(handle);
                    } else if status == SocketStatus::CloseWait {
                        // Peer finished and nothing is left to read
                        let _ = sockets.disconnect(handle);
                    }
                }
                SocketStatus::Closed => sockets.close(handle),
                _ => {}
            }
        }

        if !listening {
            if let Err(e) = self.begin(sockets) {
                log::debug!("tcp: cannot reopen listener on {}: {}", self.port, e);
            }
        }

        let handle = chosen?;
        if take {
            let _ = sockets.set_server_port(handle, 0);
        }
        Some(TcpClient::from_handle(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::SimChip;
    use shared::timer::ManualClock;

    fn sockets() -> SocketManager<SimChip> {
        SocketManager::with_seed(SimChip::new(2), 0)
    }

    #[test]
    fn test_connect_write_read() {
        let mut sockets = sockets();
        let mut clock = ManualClock::new(0);
        let mut client = TcpClient::new();
        client
            .connect(&mut sockets, &mut clock, Ipv4Address::new(192, 0, 2, 10), 80)
            .unwrap();
        let slot = client.socket_number().unwrap();
        assert!(client.connected(&mut sockets));

        assert_eq!(client.write(&mut sockets, b"GET /"), 5);
        assert_eq!(sockets.chip().transmitted(slot), b"GET /");

        sockets.chip_mut().inject_stream(slot, b"OK");
        assert_eq!(client.available(&mut sockets), 2);
        assert_eq!(client.peek(&mut sockets), Some(b'O'));
        let mut buf = [0u8; 8];
        assert_eq!(client.read(&mut sockets, &mut buf), 2);
        assert_eq!(&buf[..2], b"OK");
    }

    #[test]
    fn test_write_spans_small_tx_buffer() {
        let mut sockets = sockets();
        let mut clock = ManualClock::new(0);
        let mut client = TcpClient::new();
        client
            .connect(&mut sockets, &mut clock, Ipv4Address::new(192, 0, 2, 10), 80)
            .unwrap();
        sockets.chip_mut().set_tx_capacity(3);
        assert_eq!(client.write(&mut sockets, b"0123456789"), 10);
    }

    #[test]
    fn test_refused_connect_releases_slot() {
        let mut sockets = sockets();
        let mut clock = ManualClock::new(0);
        sockets.chip_mut().set_refuse_connections(true);
        let mut client = TcpClient::new();
        let result = client.connect(&mut sockets, &mut clock, Ipv4Address::new(192, 0, 2, 10), 80);
        assert_eq!(result, Err(NetError::NotConnected));
        assert!(client.socket_number().is_none());
        assert!(sockets.handle_at(0).is_none());
    }

    #[test]
    fn test_stop_frees_slot() {
        let mut sockets = sockets();
        let mut clock = ManualClock::new(0);
        let mut client = TcpClient::new();
        client
            .connect(&mut sockets, &mut clock, Ipv4Address::new(192, 0, 2, 10), 80)
            .unwrap();
        client.stop(&mut sockets, &mut clock);
        assert!(!client.connected(&mut sockets));
        assert!(sockets.handle_at(0).is_none());
        client.stop(&mut sockets, &mut clock);
    }

    #[test]
    fn test_server_hands_out_connection_with_data() {
        let mut sockets = sockets();
        let server = TcpServer::new(80);
        server.begin(&mut sockets).unwrap();
        assert!(server.available(&mut sockets).is_none());

        // Peer connects to the listening slot and sends a request
        sockets.chip_mut().set_status(0, SocketStatus::Established);
        sockets.chip_mut().inject_stream(0, b"ping");

        let mut client = server.available(&mut sockets).unwrap();
        assert_eq!(client.socket_number(), Some(0));
        assert_eq!(client.available(&mut sockets), 4);
        // A fresh listener took the other slot
        assert_eq!(sockets.chip_mut().status(1), SocketStatus::Listen);
    }

    #[test]
    fn test_accept_stops_tracking() {
        let mut sockets = sockets();
        let server = TcpServer::new(8080);
        server.begin(&mut sockets).unwrap();
        sockets.chip_mut().set_status(0, SocketStatus::Established);

        let client = server.accept(&mut sockets).unwrap();
        assert_eq!(client.socket_number(), Some(0));
        assert!(sockets.server_slots(8080).all(|h| h.index() != 0));
    }

    #[test]
    fn test_server_write_reaches_connections() {
        let mut sockets = sockets();
        let server = TcpServer::new(23);
        server.begin(&mut sockets).unwrap();
        sockets.chip_mut().set_status(0, SocketStatus::Established);
        assert_eq!(server.write(&mut sockets, b"hi"), 2);
        assert_eq!(sockets.chip().transmitted(0), b"hi");
    }
}
