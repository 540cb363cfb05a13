//! DHCP client
//!
//! Acquires and maintains an IPv4 lease over one UDP slot borrowed from the
//! socket manager. The client is an explicit state machine:
//!
//! ```text
//! Idle -> Selecting -> Requesting -> Bound -> Renewing -> Rebinding
//!            ^______________| NAK        ^________|___________| ACK
//! ```
//!
//! `start_acquire`/`start_maintenance` arm an exchange and `poll` advances it
//! without ever blocking. `acquire_lease` and `check_lease` are blocking
//! drivers that poll and sleep on a `Clock` until the exchange finishes.
//!
//! Replies are only accepted when they carry the current transaction id and
//! our hardware address. The id is drawn at random per acquisition and bumped
//! for every DISCOVER and every renewal, so replies to an earlier exchange
//! never match a later one. The UDP slot is given back after every exchange.

pub mod lease;
pub mod message;

pub use lease::{Lease, LeasePhase};
pub use message::{DhcpMessage, MessageType, WireError};

use crate::drivers::SocketChip;
use crate::error::NetError;
use crate::socket::{SocketManager, Stream};
use crate::udp::UdpSocket;
use alloc::format;
use config::DhcpConfig;
use core::fmt::Write as _;
use message::{
    BOOTREPLY, DHCP_CLIENT_PORT, DHCP_SERVER_PORT, FLAG_BROADCAST, PARAMETER_REQUEST_LIST,
};
use rand_core::RngCore;
use shared::rng::SeededRng;
use shared::timer::Clock;
use smoltcp::wire::{EthernetAddress, Ipv4Address};
use thiserror::Error;

/// Longest reply read; the rest of a bigger datagram is dropped
const MAX_MESSAGE_LEN: usize = 1024;

/// Room left in option 12 after the six hex digits of the MAC suffix
const MAX_HOST_PREFIX_LEN: usize = 64 - 6;

/// DHCP client state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpState {
    /// No lease and nothing in progress
    Idle,
    /// DISCOVER sent, waiting for an OFFER
    Selecting,
    /// REQUEST sent for an offer, waiting for the ACK
    Requesting,
    /// Lease held, T1 not reached
    Bound,
    /// Past T1, renewing with the granting server
    Renewing,
    /// Past T2, rebinding with any server
    Rebinding,
}

impl core::fmt::Display for DhcpState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DhcpState::Idle => write!(f, "Idle"),
            DhcpState::Selecting => write!(f, "Selecting"),
            DhcpState::Requesting => write!(f, "Requesting"),
            DhcpState::Bound => write!(f, "Bound"),
            DhcpState::Renewing => write!(f, "Renewing"),
            DhcpState::Rebinding => write!(f, "Rebinding"),
        }
    }
}

/// Outcome of a lease check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseCheck {
    /// Nothing was due
    Unchanged,
    Renewed,
    /// Renewal got no ACK; the lease is still valid and renewal is retried
    RenewFailed,
    Rebound,
    /// Rebinding got no ACK; the lease is still valid and rebinding is retried
    RebindFailed,
    /// The lease ran out and was dropped
    Expired,
}

impl LeaseCheck {
    /// Numeric `maintain()` result code
    ///
    /// 0 nothing happened, 1 renew failed, 2 renewed, 3 rebind failed, 4 rebound.
    /// Expiry reports 3.
    pub fn code(self) -> u8 {
        match self {
            LeaseCheck::Unchanged => 0,
            LeaseCheck::RenewFailed => 1,
            LeaseCheck::Renewed => 2,
            LeaseCheck::RebindFailed | LeaseCheck::Expired => 3,
            LeaseCheck::Rebound => 4,
        }
    }

    /// Whether the lease was refreshed
    pub fn is_refreshed(self) -> bool {
        matches!(self, LeaseCheck::Renewed | LeaseCheck::Rebound)
    }
}

/// What one call to `poll` produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpEvent {
    /// No exchange armed
    Idle,
    /// Exchange still running; poll again later
    Pending,
    Acquired,
    /// The acquisition budget ran out
    AcquireFailed,
    /// A renewal or rebinding finished
    LeaseChecked(LeaseCheck),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Purpose {
    Acquire,
    Renew,
    Rebind,
}

/// An exchange in flight
#[derive(Debug, Clone, Copy)]
struct Exchange {
    purpose: Purpose,
    started_ms: u64,
    deadline_ms: u64,
    response_timeout_ms: u64,
    /// When the outstanding message went out; `None` until it is (re)sent
    sent_at_ms: Option<u64>,
    send_at_ms: u64,
    retries: u32,
}

/// Why a received datagram was ignored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
enum Discard {
    #[error("{0}")]
    Wire(#[from] WireError),

    #[error("not a BOOTREPLY")]
    NotReply,

    #[error("transaction id {0:#010x} is not ours")]
    Xid(u32),

    #[error("addressed to {0}")]
    OtherClient(EthernetAddress),

    #[error("no message type")]
    NoMessageType,

    #[error("no server identifier")]
    NoServerId,

    #[error("from server {0}, expected {1}")]
    WrongServer(Ipv4Address, Ipv4Address),

    #[error("no address offered")]
    NoAddress,
}

/// DHCP client for one interface
pub struct DhcpClient<R: RngCore = SeededRng> {
    config: DhcpConfig,
    rng: R,
    mac: EthernetAddress,
    state: DhcpState,
    udp: UdpSocket,
    xid: u32,
    offered_ip: Ipv4Address,
    offer_server: Ipv4Address,
    lease: Option<Lease>,
    exchange: Option<Exchange>,
    nak_seen: bool,
    last_checked_ms: Option<u64>,
}

impl DhcpClient<SeededRng> {
    /// Client with the built-in generator seeded from `seed`
    pub fn new(config: DhcpConfig, seed: u64) -> Self {
        Self::with_rng(config, SeededRng::new(seed))
    }
}

impl<R: RngCore> DhcpClient<R> {
    pub fn with_rng(config: DhcpConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            mac: EthernetAddress([0; 6]),
            state: DhcpState::Idle,
            udp: UdpSocket::new(),
            xid: 0,
            offered_ip: Ipv4Address::UNSPECIFIED,
            offer_server: Ipv4Address::UNSPECIFIED,
            lease: None,
            exchange: None,
            nak_seen: false,
            last_checked_ms: None,
        }
    }

    pub fn config(&self) -> &DhcpConfig {
        &self.config
    }

    /// Generator used for transaction ids and retry jitter
    pub fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }

    pub fn state(&self) -> DhcpState {
        self.state
    }

    pub fn mac(&self) -> EthernetAddress {
        self.mac
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    /// Transaction id of the current (or last) exchange
    pub fn transaction_id(&self) -> u32 {
        self.xid
    }

    /// Whether an exchange is in flight
    pub fn is_busy(&self) -> bool {
        self.exchange.is_some()
    }

    /// Clock reading of the last lease check that left a valid lease
    pub fn last_checked_ms(&self) -> Option<u64> {
        self.last_checked_ms
    }

    pub fn local_ip(&self) -> Ipv4Address {
        self.lease_field(|l| l.local_ip)
    }

    pub fn subnet_mask(&self) -> Ipv4Address {
        self.lease_field(|l| l.subnet_mask)
    }

    pub fn gateway_ip(&self) -> Ipv4Address {
        self.lease_field(|l| l.gateway_ip)
    }

    pub fn dhcp_server_ip(&self) -> Ipv4Address {
        self.lease_field(|l| l.dhcp_server_ip)
    }

    pub fn dns_server_ip(&self) -> Ipv4Address {
        self.lease_field(|l| l.dns_server_ip)
    }

    fn lease_field(&self, field: impl Fn(&Lease) -> Ipv4Address) -> Ipv4Address {
        self.lease.as_ref().map_or(Ipv4Address::UNSPECIFIED, field)
    }

    /// Acquire a lease, blocking until bound or `timeout_ms` runs out
    ///
    /// # Arguments
    /// * `timeout_ms` - budget for the whole acquisition
    /// * `response_timeout_ms` - how long each DISCOVER or REQUEST waits for a reply
    ///
    /// # Returns
    /// * `Ok(())` - bound; the lease is available through the accessors
    /// * `Err(NetError::ResourceExhausted)` - no UDP slot for port 68
    /// * `Err(NetError::DhcpTimeout)` - no lease within `timeout_ms`
    pub fn acquire_lease<C: SocketChip, K: Clock, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        clock: &mut K,
        mac: EthernetAddress,
        timeout_ms: u64,
        response_timeout_ms: u64,
    ) -> Result<(), NetError> {
        self.start_acquire(sockets, mac, timeout_ms, response_timeout_ms, clock.now_ms())?;
        loop {
            match self.poll(sockets, clock.now_ms()) {
                DhcpEvent::Acquired => return Ok(()),
                DhcpEvent::Pending => clock.delay_ms(self.config.poll_interval_ms),
                _ => {
                    let detail = if self.nak_seen { ", server sent NAK" } else { "" };
                    return Err(NetError::DhcpTimeout(format!(
                        "no lease within {} ms{}",
                        timeout_ms, detail
                    )));
                }
            }
        }
    }

    /// `acquire_lease` with the configured timeouts
    pub fn acquire<C: SocketChip, K: Clock, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        clock: &mut K,
        mac: EthernetAddress,
    ) -> Result<(), NetError> {
        let (timeout, response_timeout) = (self.config.timeout_ms, self.config.response_timeout_ms);
        self.acquire_lease(sockets, clock, mac, timeout, response_timeout)
    }

    /// Arm a new acquisition; the previous lease and any exchange are dropped
    pub fn start_acquire<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        mac: EthernetAddress,
        timeout_ms: u64,
        response_timeout_ms: u64,
        now_ms: u64,
    ) -> Result<(), NetError> {
        self.abort(sockets);
        self.lease = None;
        self.last_checked_ms = None;
        self.nak_seen = false;
        self.state = DhcpState::Idle;

        self.udp.begin(sockets, DHCP_CLIENT_PORT)?;
        self.mac = mac;
        self.xid = self.rng.next_u32();
        self.state = DhcpState::Selecting;

        let delay = self.jitter();
        self.exchange = Some(Exchange {
            purpose: Purpose::Acquire,
            started_ms: now_ms,
            deadline_ms: now_ms.saturating_add(timeout_ms),
            response_timeout_ms,
            sent_at_ms: None,
            send_at_ms: now_ms + delay,
            retries: 0,
        });
        log::info!("dhcp: acquiring lease for {}", mac);
        Ok(())
    }

    /// Check the lease, renewing or rebinding if due, blocking until done
    ///
    /// Cheap when nothing is due: no packet is sent and no slot is taken.
    pub fn check_lease<C: SocketChip, K: Clock, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        clock: &mut K,
    ) -> LeaseCheck {
        if let Some(result) = self.start_maintenance(sockets, clock.now_ms()) {
            return result;
        }
        loop {
            match self.poll(sockets, clock.now_ms()) {
                DhcpEvent::LeaseChecked(result) => return result,
                DhcpEvent::Pending => clock.delay_ms(self.config.poll_interval_ms),
                _ => return LeaseCheck::Unchanged,
            }
        }
    }

    /// Start a renewal or rebinding if the lease needs one
    ///
    /// # Returns
    /// * `Some(result)` - decided on the spot, nothing to poll
    /// * `None` - an exchange is running; `poll` reports its `LeaseChecked` result
    pub fn start_maintenance<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        now_ms: u64,
    ) -> Option<LeaseCheck> {
        if let Some(exchange) = &self.exchange {
            return match exchange.purpose {
                Purpose::Acquire => Some(LeaseCheck::Unchanged),
                _ => None,
            };
        }
        let Some(lease) = self.lease else {
            return Some(LeaseCheck::Unchanged);
        };
        let purpose = match lease.phase(now_ms) {
            LeasePhase::Valid => {
                self.last_checked_ms = Some(now_ms);
                return Some(LeaseCheck::Unchanged);
            }
            LeasePhase::Renew => Purpose::Renew,
            LeasePhase::Rebind => Purpose::Rebind,
            LeasePhase::Expired => {
                self.expire();
                return Some(LeaseCheck::Expired);
            }
        };

        self.state = match purpose {
            Purpose::Renew => DhcpState::Renewing,
            _ => DhcpState::Rebinding,
        };
        if let Err(e) = self.udp.begin(sockets, DHCP_CLIENT_PORT) {
            log::warn!("dhcp: no socket for {}: {}", self.state, e);
            return Some(self.check_failed(purpose, now_ms));
        }
        self.xid = self.xid.wrapping_add(1);
        self.exchange = Some(Exchange {
            purpose,
            started_ms: now_ms,
            deadline_ms: now_ms.saturating_add(self.config.response_timeout_ms),
            response_timeout_ms: self.config.response_timeout_ms,
            sent_at_ms: None,
            send_at_ms: now_ms,
            retries: 0,
        });
        log::info!("dhcp: lease on {} due, {}", lease.local_ip, self.state);
        None
    }

    /// Advance the running exchange
    pub fn poll<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        now_ms: u64,
    ) -> DhcpEvent {
        let Some(mut exchange) = self.exchange.take() else {
            return DhcpEvent::Idle;
        };
        let event = self.step(sockets, &mut exchange, now_ms);
        if event == DhcpEvent::Pending {
            self.exchange = Some(exchange);
        } else {
            self.udp.stop(sockets);
        }
        event
    }

    /// Drop any exchange in flight and give the slot back
    ///
    /// An unfinished acquisition returns to `Idle`; a held lease is kept.
    pub fn abort<C: SocketChip, const N: usize>(&mut self, sockets: &mut SocketManager<C, N>) {
        if self.exchange.take().is_some() {
            log::debug!("dhcp: exchange aborted in {}", self.state);
        }
        self.udp.stop(sockets);
        if matches!(self.state, DhcpState::Selecting | DhcpState::Requesting) {
            self.state = DhcpState::Idle;
        }
    }

    fn step<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        exchange: &mut Exchange,
        now_ms: u64,
    ) -> DhcpEvent {
        if now_ms >= exchange.deadline_ms {
            return self.finish_failed(exchange, now_ms);
        }

        if exchange.sent_at_ms.is_none() && now_ms >= exchange.send_at_ms {
            if let Err(e) = self.transmit(sockets, exchange, now_ms) {
                log::debug!("dhcp: send failed in {}: {}", self.state, e);
                if exchange.purpose != Purpose::Acquire {
                    return self.finish_failed(exchange, now_ms);
                }
                self.back_off(exchange, now_ms);
                return DhcpEvent::Pending;
            }
        }

        if exchange.sent_at_ms.is_some() {
            if let Some(event) = self.receive(sockets, exchange, now_ms) {
                return event;
            }
        }

        if let Some(sent) = exchange.sent_at_ms {
            if now_ms.saturating_sub(sent) >= exchange.response_timeout_ms {
                if exchange.purpose != Purpose::Acquire {
                    return self.finish_failed(exchange, now_ms);
                }
                log::debug!("dhcp: no reply in {}", self.state);
                self.back_off(exchange, now_ms);
            }
        }
        DhcpEvent::Pending
    }

    /// Drain received datagrams until one finishes the exchange
    fn receive<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        exchange: &mut Exchange,
        now_ms: u64,
    ) -> Option<DhcpEvent> {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        while self.udp.parse_packet(sockets) > 0 {
            let n = self.udp.read(sockets, &mut buf);
            let reply = match self.validate(&buf[..n]) {
                Ok(reply) => reply,
                Err(reason) => {
                    log::debug!("dhcp: reply discarded: {}", reason);
                    continue;
                }
            };
            let Some(kind) = reply.message_type() else {
                continue;
            };

            match (self.state, kind) {
                (DhcpState::Selecting, MessageType::Offer) => {
                    self.offered_ip = reply.yiaddr;
                    self.offer_server = reply.options.server_id.unwrap_or(Ipv4Address::BROADCAST);
                    self.state = DhcpState::Requesting;
                    log::info!("dhcp: offer of {} from {}", self.offered_ip, self.offer_server);
                    exchange.sent_at_ms = None;
                    if let Err(e) = self.transmit(sockets, exchange, now_ms) {
                        log::debug!("dhcp: REQUEST not sent: {}", e);
                        self.back_off(exchange, now_ms);
                        return None;
                    }
                }
                (
                    DhcpState::Requesting | DhcpState::Renewing | DhcpState::Rebinding,
                    MessageType::Ack,
                ) => {
                    if let Some(lease) = Lease::from_ack(&reply, &self.config.policy, now_ms) {
                        return Some(self.commit(lease, exchange, now_ms));
                    }
                }
                (DhcpState::Requesting, MessageType::Nak) => {
                    log::info!("dhcp: {} declined by {}", self.offered_ip, self.offer_server);
                    self.nak_seen = true;
                    self.back_off(exchange, now_ms);
                    return None;
                }
                (DhcpState::Renewing | DhcpState::Rebinding, MessageType::Nak) => {
                    log::info!("dhcp: {} refused in {}", self.local_ip(), self.state);
                    return Some(self.finish_failed(exchange, now_ms));
                }
                (state, kind) => log::debug!("dhcp: ignoring {} in {}", kind, state),
            }
        }
        None
    }

    fn validate(&self, bytes: &[u8]) -> Result<DhcpMessage, Discard> {
        let reply = DhcpMessage::from_bytes(bytes)?;
        if reply.op != BOOTREPLY {
            return Err(Discard::NotReply);
        }
        if reply.xid != self.xid {
            return Err(Discard::Xid(reply.xid));
        }
        if reply.chaddr != self.mac {
            return Err(Discard::OtherClient(reply.chaddr));
        }
        let kind = reply.message_type().ok_or(Discard::NoMessageType)?;
        let server = reply.options.server_id.ok_or(Discard::NoServerId)?;

        let expected = match self.state {
            DhcpState::Requesting => Some(self.offer_server),
            DhcpState::Renewing => self.lease.map(|l| l.dhcp_server_ip),
            _ => None,
        };
        if let Some(expected) = expected {
            if server != expected {
                return Err(Discard::WrongServer(server, expected));
            }
        }
        if matches!(kind, MessageType::Offer | MessageType::Ack) && reply.yiaddr.is_unspecified() {
            return Err(Discard::NoAddress);
        }
        Ok(reply)
    }

    /// Send the message the current state calls for
    fn transmit<C: SocketChip, const N: usize>(
        &mut self,
        sockets: &mut SocketManager<C, N>,
        exchange: &mut Exchange,
        now_ms: u64,
    ) -> Result<(), NetError> {
        let kind = if self.state == DhcpState::Selecting {
            self.xid = self.xid.wrapping_add(1);
            MessageType::Discover
        } else {
            MessageType::Request
        };

        let mut message = DhcpMessage::new_request(kind, self.xid, self.mac);
        let secs = now_ms.saturating_sub(exchange.started_ms) / 1000;
        message.secs = secs.min(u64::from(u16::MAX)) as u16;
        message.options.client_id = Some(self.mac);
        message.options.host_name = Some(self.host_name());
        message.options.parameter_request =
            heapless::Vec::from_slice(&PARAMETER_REQUEST_LIST).unwrap_or_default();

        let mut destination = Ipv4Address::BROADCAST;
        match self.state {
            DhcpState::Requesting => {
                message.options.requested_ip = Some(self.offered_ip);
                message.options.server_id = Some(self.offer_server);
            }
            DhcpState::Renewing | DhcpState::Rebinding => {
                let lease = self.lease.ok_or(NetError::DhcpNotConfigured)?;
                message.ciaddr = lease.local_ip;
                if self.state == DhcpState::Renewing && !lease.dhcp_server_ip.is_unspecified() {
                    destination = lease.dhcp_server_ip;
                }
            }
            _ => {}
        }
        if destination.is_broadcast() {
            message.flags = FLAG_BROADCAST;
        }

        let bytes = message.to_bytes();
        self.udp.begin_packet(sockets, destination, DHCP_SERVER_PORT)?;
        if self.udp.write(sockets, &bytes) != bytes.len() {
            return Err(NetError::BufferTooSmall);
        }
        self.udp.end_packet(sockets)?;

        exchange.sent_at_ms = Some(now_ms);
        log::debug!("dhcp: {} xid {:#010x} sent to {}", kind, self.xid, destination);
        Ok(())
    }

    /// Option 12: configured prefix plus the last three MAC bytes in hex
    ///
    /// A prefix too long for the option is cut so the MAC suffix always fits.
    fn host_name(&self) -> heapless::String<64> {
        let prefix = self.config.hostname_prefix.as_str();
        let mut end = prefix.len().min(MAX_HOST_PREFIX_LEN);
        while !prefix.is_char_boundary(end) {
            end -= 1;
        }
        if end < prefix.len() {
            log::debug!("dhcp: host name prefix cut to {} bytes", end);
        }
        let mut name = heapless::String::new();
        let _ = name.push_str(&prefix[..end]);
        let mac = self.mac.as_bytes();
        let _ = write!(name, "{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
        name
    }

    /// Go back to SELECTING and schedule the next DISCOVER
    fn back_off(&mut self, exchange: &mut Exchange, now_ms: u64) {
        let base = self.config.retry_backoff_ms;
        let delay = base
            .saturating_mul(1u64 << exchange.retries.min(32))
            .min(self.config.retry_backoff_max_ms)
            + self.jitter();
        exchange.retries = exchange.retries.saturating_add(1);
        exchange.sent_at_ms = None;
        exchange.send_at_ms = now_ms.saturating_add(delay);
        self.state = DhcpState::Selecting;
        log::debug!("dhcp: retry {} in {} ms", exchange.retries, delay);
    }

    /// Random delay below the base backoff
    fn jitter(&mut self) -> u64 {
        match self.config.retry_backoff_ms {
            0 => 0,
            base => u64::from(self.rng.next_u32()) % base,
        }
    }

    fn commit(&mut self, lease: Lease, exchange: &Exchange, now_ms: u64) -> DhcpEvent {
        log::info!(
            "dhcp: bound to {}/{} via {} for {} s",
            lease.local_ip,
            lease.subnet_mask,
            lease.dhcp_server_ip,
            lease.lease_secs
        );
        self.lease = Some(lease);
        self.state = DhcpState::Bound;
        self.last_checked_ms = Some(now_ms);
        match exchange.purpose {
            Purpose::Acquire => DhcpEvent::Acquired,
            Purpose::Renew => DhcpEvent::LeaseChecked(LeaseCheck::Renewed),
            Purpose::Rebind => DhcpEvent::LeaseChecked(LeaseCheck::Rebound),
        }
    }

    fn finish_failed(&mut self, exchange: &Exchange, now_ms: u64) -> DhcpEvent {
        match exchange.purpose {
            Purpose::Acquire => {
                log::warn!(
                    "dhcp: no lease after {} ms",
                    now_ms.saturating_sub(exchange.started_ms)
                );
                self.state = DhcpState::Idle;
                DhcpEvent::AcquireFailed
            }
            purpose => DhcpEvent::LeaseChecked(self.check_failed(purpose, now_ms)),
        }
    }

    fn check_failed(&mut self, purpose: Purpose, now_ms: u64) -> LeaseCheck {
        let expired = self
            .lease
            .map_or(true, |l| l.phase(now_ms) == LeasePhase::Expired);
        if expired {
            self.expire();
            return LeaseCheck::Expired;
        }
        match purpose {
            Purpose::Renew => LeaseCheck::RenewFailed,
            _ => LeaseCheck::RebindFailed,
        }
    }

    fn expire(&mut self) {
        if let Some(lease) = self.lease.take() {
            log::warn!("dhcp: lease on {} expired", lease.local_ip);
        }
        self.state = DhcpState::Idle;
        self.last_checked_ms = None;
    }
}
