//! Socket slot manager
//!
//! The chip exposes a handful of hardware socket slots and keeps no
//! bookkeeping of its own beyond a status register per slot. `SocketManager`
//! owns the slot table: it hands out slots, remembers what each was opened
//! as, and validates every operation against that record before touching the
//! chip.
//!
//! Callers hold a `SocketHandle`, which is a slot index plus the generation
//! the slot had when it was allocated. Once a slot is closed or handed to
//! someone else, old handles stop working instead of reaching the new owner's
//! connection. A bad handle never panics; it yields `NetError::InvalidHandle`
//! (or nothing, for `close`).

use crate::drivers::{Protocol, SocketChip, SocketStatus};
use crate::error::NetError;
use smoltcp::wire::Ipv4Address;

/// Default number of slots managed
pub const MAX_SOCK_NUM: usize = 2;

/// First port of the IANA dynamic range, used for ephemeral ports
pub const EPHEMERAL_PORT_START: u16 = 49152;

/// How many times `send` polls a full TX buffer before giving up for now
pub const SEND_POLL_LIMIT: usize = 64;

/// Borrowed reference to an allocated slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle {
    index: u8,
    generation: u32,
}

impl SocketHandle {
    /// Hardware slot index
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl core::fmt::Display for SocketHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Outgoing datagram being assembled
#[derive(Debug, Clone, Copy)]
struct DatagramCursor {
    /// High-water mark of buffered bytes
    len: usize,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    protocol: Option<Protocol>,
    port: u16,
    /// Listening port of the server that owns this slot, 0 if none
    server_port: u16,
    generation: u32,
    datagram: Option<DatagramCursor>,
}

impl Slot {
    const FREE: Slot = Slot {
        protocol: None,
        port: 0,
        server_port: 0,
        generation: 0,
        datagram: None,
    };

    fn release(&mut self) {
        self.protocol = None;
        self.port = 0;
        self.server_port = 0;
        self.datagram = None;
    }
}

/// Exclusive owner of the chip's socket slots
pub struct SocketManager<C: SocketChip, const N: usize = MAX_SOCK_NUM> {
    chip: C,
    slots: [Slot; N],
    usable: usize,
    local_port: u16,
}

impl<C: SocketChip, const N: usize> SocketManager<C, N> {
    /// Take ownership of the chip, seeding ephemeral ports from its entropy source
    pub fn new(mut chip: C) -> Self {
        let seed = chip.entropy() as u16;
        Self::with_seed(chip, seed)
    }

    /// Take ownership of the chip with an explicit ephemeral-port seed
    pub fn with_seed(chip: C, seed: u16) -> Self {
        let usable = N.min(chip.socket_count()).min(u8::MAX as usize);
        let mut manager = Self {
            chip,
            slots: [Slot::FREE; N],
            usable,
            local_port: EPHEMERAL_PORT_START,
        };
        manager.reseed_ports(seed);
        manager
    }

    /// Restart the ephemeral port sequence from `seed`
    ///
    /// Only the low 14 bits are used, so ports stay in 49152..=65535.
    pub fn reseed_ports(&mut self, seed: u16) {
        self.local_port = EPHEMERAL_PORT_START ^ (seed & 0x3FFF);
    }

    /// Number of slots available for allocation
    pub fn capacity(&self) -> usize {
        self.usable
    }

    pub fn chip(&self) -> &C {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut C {
        &mut self.chip
    }

    /// Allocate a slot and open it in `protocol` on `port` (0 picks an ephemeral port)
    ///
    /// # Returns
    /// * `Ok(SocketHandle)` - the slot is exclusively yours until closed
    /// * `Err(NetError::ResourceExhausted)` - every slot is in use
    pub fn allocate(&mut self, protocol: Protocol, port: u16) -> Result<SocketHandle, NetError> {
        self.open_slot(protocol, port, None)
    }

    /// Like `allocate`, additionally joining the multicast `group`
    pub fn allocate_multicast(
        &mut self,
        protocol: Protocol,
        group: Ipv4Address,
        port: u16,
    ) -> Result<SocketHandle, NetError> {
        if !group.is_multicast() {
            return Err(NetError::InvalidAddress);
        }
        if protocol != Protocol::Udp {
            return Err(NetError::WrongProtocol);
        }
        self.open_slot(protocol, port, Some(group))
    }

    fn open_slot(
        &mut self,
        protocol: Protocol,
        port: u16,
        multicast: Option<Ipv4Address>,
    ) -> Result<SocketHandle, NetError> {
        let index = match self.find_free_slot() {
            Some(index) => index,
            None => {
                log::warn!("socket: no free slot for {} port {}", protocol, port);
                return Err(NetError::ResourceExhausted);
            }
        };

        let port = if port == 0 {
            self.next_ephemeral_port()
        } else {
            port
        };

        if let Err(e) = self.chip.open(index, protocol, port, multicast) {
            log::warn!("socket: chip refused to open slot {}: {}", index, e);
            self.chip.close(index);
            self.slots[index].release();
            return Err(e);
        }

        let slot = &mut self.slots[index];
        slot.release();
        slot.generation = slot.generation.wrapping_add(1);
        slot.protocol = Some(protocol);
        slot.port = port;

        let handle = SocketHandle {
            index: index as u8,
            generation: slot.generation,
        };
        log::debug!("socket: {} opened as {} on port {}", handle, protocol, port);
        Ok(handle)
    }

    /// First closed slot; failing that, reclaim one stuck in TCP teardown
    fn find_free_slot(&mut self) -> Option<usize> {
        let mut lingering = None;
        for index in 0..self.usable {
            let status = self.chip.status(index);
            if status == SocketStatus::Closed {
                return Some(index);
            }
            if lingering.is_none() && status.is_lingering() {
                lingering = Some(index);
            }
        }

        let index = lingering?;
        log::warn!("socket: reclaiming slot {} from TCP teardown", index);
        self.chip.close(index);
        Some(index)
    }

    fn next_ephemeral_port(&mut self) -> u16 {
        self.local_port = self.local_port.wrapping_add(1);
        if self.local_port < EPHEMERAL_PORT_START {
            self.local_port = EPHEMERAL_PORT_START;
        }
        self.local_port
    }

    fn slot(&self, handle: SocketHandle) -> Result<&Slot, NetError> {
        let slot = self
            .slots
            .get(handle.index())
            .filter(|_| handle.index() < self.usable)
            .ok_or(NetError::InvalidHandle)?;
        match slot.protocol {
            Some(_) if slot.generation == handle.generation => Ok(slot),
            _ => Err(NetError::InvalidHandle),
        }
    }

    fn slot_mut(&mut self, handle: SocketHandle) -> Result<&mut Slot, NetError> {
        self.slot(handle)?;
        Ok(&mut self.slots[handle.index()])
    }

    fn require(&self, handle: SocketHandle, protocol: Protocol) -> Result<(), NetError> {
        match self.slot(handle)?.protocol {
            Some(p) if p == protocol => Ok(()),
            _ => Err(NetError::WrongProtocol),
        }
    }

    /// Whether `handle` still refers to the allocation it was issued for
    pub fn is_valid(&self, handle: SocketHandle) -> bool {
        self.slot(handle).is_ok()
    }

    /// Protocol the slot was opened in
    pub fn protocol(&self, handle: SocketHandle) -> Option<Protocol> {
        self.slot(handle).ok().and_then(|s| s.protocol)
    }

    /// Local port the slot is bound to
    pub fn local_port(&self, handle: SocketHandle) -> Option<u16> {
        self.slot(handle).ok().map(|s| s.port)
    }

    /// Current handle of an allocated slot
    pub fn handle_at(&self, index: usize) -> Option<SocketHandle> {
        if index >= self.usable {
            return None;
        }
        let slot = &self.slots[index];
        slot.protocol.map(|_| SocketHandle {
            index: index as u8,
            generation: slot.generation,
        })
    }

    /// Hardware status of the slot
    pub fn status(&mut self, handle: SocketHandle) -> Result<SocketStatus, NetError> {
        self.slot(handle)?;
        Ok(self.chip.status(handle.index()))
    }

    /// Close the slot and forget it. Stale or already-closed handles are ignored.
    pub fn close(&mut self, handle: SocketHandle) {
        if self.slot(handle).is_err() {
            return;
        }
        self.chip.close(handle.index());
        self.slots[handle.index()].release();
        log::debug!("socket: {} closed", handle);
    }

    /// Start a TCP connection to `addr:port`; completion shows up in `status`
    pub fn connect(
        &mut self,
        handle: SocketHandle,
        addr: Ipv4Address,
        port: u16,
    ) -> Result<(), NetError> {
        self.require(handle, Protocol::Tcp)?;
        if addr.is_unspecified() || addr.is_broadcast() || port == 0 {
            return Err(NetError::InvalidAddress);
        }
        self.chip.connect(handle.index(), addr, port);
        Ok(())
    }

    /// Put a TCP slot into LISTEN
    pub fn listen(&mut self, handle: SocketHandle) -> Result<(), NetError> {
        self.require(handle, Protocol::Tcp)?;
        self.chip.listen(handle.index())
    }

    /// Begin a graceful TCP close
    pub fn disconnect(&mut self, handle: SocketHandle) -> Result<(), NetError> {
        self.require(handle, Protocol::Tcp)?;
        self.chip.disconnect(handle.index());
        Ok(())
    }

    /// Send on a connected TCP slot
    ///
    /// # Returns
    /// * `Ok(n)` - bytes accepted; may be fewer than `data.len()` (0 when the TX
    ///   buffer stayed full), the caller retries the rest
    /// * `Err(NetError::NotConnected)` - the connection is not (or no longer) established
    pub fn send(&mut self, handle: SocketHandle, data: &[u8]) -> Result<usize, NetError> {
        self.require(handle, Protocol::Tcp)?;
        let index = handle.index();
        for _ in 0..SEND_POLL_LIMIT {
            if !self.chip.status(index).can_send() {
                return Err(NetError::NotConnected);
            }
            let sent = self.chip.send(index, data);
            if sent > 0 || data.is_empty() {
                return Ok(sent);
            }
        }
        log::debug!("socket: {} TX buffer full, nothing sent", handle);
        Ok(0)
    }

    /// Copy buffered received bytes into `buf`; 0 means nothing available now
    pub fn recv(&mut self, handle: SocketHandle, buf: &mut [u8]) -> Result<usize, NetError> {
        self.slot(handle)?;
        Ok(self.chip.recv(handle.index(), buf))
    }

    /// Bytes waiting to be read
    pub fn recv_available(&mut self, handle: SocketHandle) -> Result<usize, NetError> {
        self.slot(handle)?;
        Ok(self.chip.recv_available(handle.index()))
    }

    /// Next received byte without consuming it
    pub fn peek(&mut self, handle: SocketHandle) -> Result<Option<u8>, NetError> {
        self.slot(handle)?;
        Ok(self.chip.peek(handle.index()))
    }

    /// Start assembling a datagram to `addr:port`, discarding any unsent one
    pub fn begin_datagram(
        &mut self,
        handle: SocketHandle,
        addr: Ipv4Address,
        port: u16,
    ) -> Result<(), NetError> {
        let slot = self.slot_mut(handle)?;
        match slot.protocol {
            Some(p) if p.is_datagram() => {}
            _ => return Err(NetError::WrongProtocol),
        }
        slot.datagram = None;
        if addr.is_unspecified() || port == 0 {
            return Err(NetError::InvalidAddress);
        }
        self.chip.start_datagram(handle.index(), addr, port)?;
        self.slots[handle.index()].datagram = Some(DatagramCursor { len: 0 });
        Ok(())
    }

    /// Write `data` at `offset` into the datagram being assembled
    ///
    /// # Returns
    /// Bytes buffered; fewer than `data.len()` when TX memory runs out
    pub fn buffer_data(
        &mut self,
        handle: SocketHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<usize, NetError> {
        let cursor = self.slot(handle)?.datagram.ok_or(NetError::NoDatagram)?;
        let written = self.chip.buffer_datagram(handle.index(), offset, data);
        let len = cursor.len.max(offset + written);
        self.slots[handle.index()].datagram = Some(DatagramCursor { len });
        Ok(written)
    }

    /// Transmit the assembled datagram. Without a prior `begin_datagram`
    /// nothing reaches the chip.
    pub fn send_datagram(&mut self, handle: SocketHandle) -> Result<(), NetError> {
        let cursor = self
            .slot_mut(handle)?
            .datagram
            .take()
            .ok_or(NetError::NoDatagram)?;
        log::trace!("socket: {} sending {} byte datagram", handle, cursor.len);
        self.chip.send_datagram(handle.index())
    }

    /// Length of the datagram being assembled, if any
    pub fn pending_datagram_len(&self, handle: SocketHandle) -> Option<usize> {
        self.slot(handle).ok()?.datagram.map(|c| c.len)
    }

    /// Record that `handle` accepts connections for a server on `port`
    pub fn set_server_port(&mut self, handle: SocketHandle, port: u16) -> Result<(), NetError> {
        self.require(handle, Protocol::Tcp)?;
        self.slots[handle.index()].server_port = port;
        Ok(())
    }

    /// Slots owned by the server listening on `port`
    pub fn server_slots(&self, port: u16) -> impl Iterator<Item = SocketHandle> + '_ {
        (0..self.usable).filter_map(move |index| {
            let slot = &self.slots[index];
            if slot.server_port == port && port != 0 {
                self.handle_at(index)
            } else {
                None
            }
        })
    }
}

/// Capability shared by the socket facades: a current slot and byte I/O on it
pub trait Stream {
    /// The slot currently held, if any
    fn handle(&self) -> Option<SocketHandle>;

    /// Bytes that can be read without blocking
    fn available<C: SocketChip, const N: usize>(&mut self, sockets: &mut SocketManager<C, N>)
        -> usize;

    /// Read up to `buf.len()` bytes; 0 when nothing is available
    fn read<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        buf: &mut [u8],
    ) -> usize;

    /// Next byte without consuming it
    fn peek<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> Option<u8>;

    /// Write bytes; returns how many were taken
    fn write<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        data: &[u8],
    ) -> usize;

    /// Hardware status of the held slot; `Closed` when nothing is held
    fn status<C: SocketChip, const N: usize>(
        &self,
        sockets: &mut SocketManager<C, N>,
    ) -> SocketStatus {
        self.handle()
            .and_then(|h| sockets.status(h).ok())
            .unwrap_or(SocketStatus::Closed)
    }

    /// Read a single byte
    fn read_byte<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
    ) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.read(sockets, &mut byte) {
            1 => Some(byte[0]),
            _ => None,
        }
    }
}
