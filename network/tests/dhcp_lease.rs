// DHCP lease acquisition and maintenance against a simulated server

use std::cell::RefCell;
use std::rc::Rc;

use config::DhcpConfig;
use network::dhcp::message::{
    DhcpMessage, MessageType, DHCP_CLIENT_PORT, DHCP_SERVER_PORT, FLAG_BROADCAST,
};
use network::dhcp::{DhcpClient, DhcpEvent, DhcpState, LeaseCheck};
use network::drivers::sim::{Datagram, SimChip};
use network::{Ethernet, NetError, SocketManager};
use shared::timer::{Clock, ManualClock};
use smoltcp::wire::{EthernetAddress, Ipv4Address};

const MAC: EthernetAddress = EthernetAddress([0x02, 0x00, 0x00, 0xc0, 0xff, 0xee]);
const SERVER: Ipv4Address = Ipv4Address([192, 0, 2, 1]);
const OFFERED: Ipv4Address = Ipv4Address([192, 0, 2, 5]);
const DNS: Ipv4Address = Ipv4Address([192, 0, 2, 53]);

/// What the simulated server does and has seen
struct ServerState {
    silent: bool,
    nak_requests: usize,
    lease_secs: u32,
    discovers: usize,
    requests: usize,
}

type Server = Rc<RefCell<ServerState>>;

fn install_server(sockets: &mut SocketManager<SimChip>, lease_secs: u32) -> Server {
    let server = Rc::new(RefCell::new(ServerState {
        silent: false,
        nak_requests: 0,
        lease_secs,
        discovers: 0,
        requests: 0,
    }));
    let state = Rc::clone(&server);
    sockets.chip_mut().set_responder(move |sent| {
        let mut state = state.borrow_mut();
        let Ok(request) = DhcpMessage::from_bytes(&sent.payload) else {
            return Vec::new();
        };
        match request.message_type() {
            Some(MessageType::Discover) => state.discovers += 1,
            Some(MessageType::Request) => state.requests += 1,
            _ => return Vec::new(),
        }
        if state.silent {
            return Vec::new();
        }

        let kind = match request.message_type() {
            Some(MessageType::Discover) => MessageType::Offer,
            _ if state.nak_requests > 0 => {
                state.nak_requests -= 1;
                MessageType::Nak
            }
            _ => MessageType::Ack,
        };
        let mut reply = DhcpMessage::new_reply(kind, request.xid, request.chaddr);
        reply.options.server_id = Some(SERVER);
        if kind != MessageType::Nak {
            reply.yiaddr = if request.ciaddr.is_unspecified() {
                request.options.requested_ip.unwrap_or(OFFERED)
            } else {
                request.ciaddr
            };
            reply.options.subnet_mask = Some(Ipv4Address::new(255, 255, 255, 0));
            reply.options.router = Some(SERVER);
            reply.options.dns_server = Some(DNS);
            reply.options.lease_time = Some(state.lease_secs);
        }
        vec![Datagram {
            local_port: sent.local_port,
            remote: SERVER,
            remote_port: DHCP_SERVER_PORT,
            payload: reply.to_bytes(),
        }]
    });
    server
}

fn setup(lease_secs: u32) -> (SocketManager<SimChip>, ManualClock, DhcpClient, Server) {
    let mut sockets = SocketManager::with_seed(SimChip::new(2), 7);
    let server = install_server(&mut sockets, lease_secs);
    let dhcp = DhcpClient::new(DhcpConfig::default(), 0x0bad_cafe);
    (sockets, ManualClock::new(0), dhcp, server)
}

fn sent_messages(sockets: &SocketManager<SimChip>) -> Vec<(Datagram, DhcpMessage)> {
    sockets
        .chip()
        .sent_datagrams()
        .iter()
        .map(|d| (d.clone(), DhcpMessage::from_bytes(&d.payload).unwrap()))
        .collect()
}

fn deliver(sockets: &mut SocketManager<SimChip>, message: &DhcpMessage) {
    sockets.chip_mut().inject_datagram(&Datagram {
        local_port: DHCP_CLIENT_PORT,
        remote: SERVER,
        remote_port: DHCP_SERVER_PORT,
        payload: message.to_bytes(),
    });
}

fn offer(xid: u32, chaddr: EthernetAddress) -> DhcpMessage {
    let mut offer = DhcpMessage::new_reply(MessageType::Offer, xid, chaddr);
    offer.yiaddr = OFFERED;
    offer.options.server_id = Some(SERVER);
    offer.options.lease_time = Some(86_400);
    offer
}

#[test]
fn test_acquire_commits_lease() {
    let (mut sockets, mut clock, mut dhcp, server) = setup(86_400);
    dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 60_000, 4_000)
        .unwrap();

    assert_eq!(dhcp.state(), DhcpState::Bound);
    assert_eq!(dhcp.local_ip(), OFFERED);
    assert_eq!(dhcp.subnet_mask(), Ipv4Address::new(255, 255, 255, 0));
    assert_eq!(dhcp.gateway_ip(), SERVER);
    assert_eq!(dhcp.dhcp_server_ip(), SERVER);
    assert_eq!(dhcp.dns_server_ip(), DNS);
    assert_eq!(dhcp.lease().unwrap().lease_secs, 86_400);

    let sent = sent_messages(&sockets);
    assert_eq!(sent.len(), 2);
    let (discover_datagram, discover) = &sent[0];
    let (request_datagram, request) = &sent[1];
    assert_eq!(discover.message_type(), Some(MessageType::Discover));
    assert_eq!(discover_datagram.remote, Ipv4Address::BROADCAST);
    assert_eq!(request.message_type(), Some(MessageType::Request));
    assert_eq!(request_datagram.remote, Ipv4Address::BROADCAST);
    // REQUEST answers the OFFER under the same transaction
    assert_eq!(request.xid, discover.xid);
    assert_eq!(request.options.requested_ip, Some(OFFERED));
    assert_eq!(request.options.server_id, Some(SERVER));
    assert_eq!(server.borrow().discovers, 1);

    // Slot is given back once bound
    assert!(sockets.handle_at(0).is_none());
    assert!(sockets.handle_at(1).is_none());
}

#[test]
fn test_mismatched_xid_offer_ignored() {
    let (mut sockets, _, mut dhcp, server) = setup(86_400);
    server.borrow_mut().silent = true;

    dhcp.start_acquire(&mut sockets, MAC, 60_000, 4_000, 0).unwrap();
    assert_eq!(dhcp.poll(&mut sockets, 1_000), DhcpEvent::Pending);
    let xid = dhcp.transaction_id();

    deliver(&mut sockets, &offer(xid ^ 0x5555, MAC));
    assert_eq!(dhcp.poll(&mut sockets, 1_100), DhcpEvent::Pending);
    assert_eq!(dhcp.state(), DhcpState::Selecting);

    deliver(&mut sockets, &offer(xid, MAC));
    assert_eq!(dhcp.poll(&mut sockets, 1_200), DhcpEvent::Pending);
    assert_eq!(dhcp.state(), DhcpState::Requesting);
    let (_, request) = sent_messages(&sockets).pop().unwrap();
    assert_eq!(request.options.requested_ip, Some(OFFERED));
}

#[test]
fn test_offer_for_other_client_ignored() {
    let (mut sockets, _, mut dhcp, server) = setup(86_400);
    server.borrow_mut().silent = true;

    dhcp.start_acquire(&mut sockets, MAC, 60_000, 4_000, 0).unwrap();
    dhcp.poll(&mut sockets, 1_000);
    let xid = dhcp.transaction_id();

    let other = EthernetAddress([0x02, 0, 0, 0, 0, 0x99]);
    deliver(&mut sockets, &offer(xid, other));
    assert_eq!(dhcp.poll(&mut sockets, 1_100), DhcpEvent::Pending);
    assert_eq!(dhcp.state(), DhcpState::Selecting);
    assert!(dhcp.lease().is_none());
}

#[test]
fn test_acquire_times_out_and_releases_slot() {
    let (mut sockets, mut clock, mut dhcp, server) = setup(86_400);
    server.borrow_mut().silent = true;

    let result = dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 20_000, 2_000);
    assert!(matches!(result, Err(NetError::DhcpTimeout(_))));
    assert!(clock.now_ms() >= 20_000);
    assert_eq!(dhcp.state(), DhcpState::Idle);
    assert!(dhcp.lease().is_none());
    assert!(sockets.handle_at(0).is_none());

    // Retransmissions, each DISCOVER under a new transaction id
    let sent = sent_messages(&sockets);
    assert!(sent.len() > 1);
    for pair in sent.windows(2) {
        assert_eq!(pair[1].1.xid, pair[0].1.xid.wrapping_add(1));
    }
    assert_eq!(server.borrow().discovers, sent.len());
}

#[test]
fn test_nak_restarts_selection() {
    let (mut sockets, mut clock, mut dhcp, server) = setup(3_600);
    server.borrow_mut().nak_requests = 1;

    dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 60_000, 4_000)
        .unwrap();
    assert_eq!(dhcp.local_ip(), OFFERED);
    assert_eq!(server.borrow().discovers, 2);
    assert_eq!(server.borrow().requests, 2);
}

#[test]
fn test_no_free_slot() {
    let (mut sockets, mut clock, mut dhcp, _) = setup(3_600);
    let _a = sockets.allocate(network::Protocol::Udp, 1000).unwrap();
    let _b = sockets.allocate(network::Protocol::Udp, 1001).unwrap();
    assert_eq!(
        dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 10_000, 1_000),
        Err(NetError::ResourceExhausted)
    );
}

#[test]
fn test_check_lease_follows_timers() {
    let (mut sockets, mut clock, mut dhcp, _) = setup(86_400);
    dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 60_000, 4_000)
        .unwrap();
    let lease = *dhcp.lease().unwrap();
    assert_eq!(lease.renewal_secs, 43_200);
    assert_eq!(lease.rebinding_secs, 75_600);

    // Before T1 nothing goes on the wire
    clock.set(lease.renew_at_ms() - 1);
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::Unchanged);
    assert_eq!(sockets.chip().sent_datagrams().len(), 2);
    assert_eq!(dhcp.last_checked_ms(), Some(lease.renew_at_ms() - 1));

    // At T1: unicast REQUEST to the granting server
    clock.set(lease.renew_at_ms());
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::Renewed);
    let (datagram, request) = sent_messages(&sockets).pop().unwrap();
    assert_eq!(datagram.remote, SERVER);
    assert_eq!(request.message_type(), Some(MessageType::Request));
    assert_eq!(request.ciaddr, OFFERED);
    assert_eq!(request.flags & FLAG_BROADCAST, 0);
    assert_eq!(request.options.requested_ip, None);
    assert_eq!(request.options.server_id, None);

    // The renewed lease runs from the renewal
    let renewed = *dhcp.lease().unwrap();
    assert_eq!(renewed.acquired_at_ms, lease.renew_at_ms());
    assert_eq!(dhcp.state(), DhcpState::Bound);
    assert!(sockets.handle_at(0).is_none());
}

#[test]
fn test_renew_then_rebind_then_expire() {
    let (mut sockets, mut clock, mut dhcp, server) = setup(1_000);
    dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 60_000, 4_000)
        .unwrap();
    let lease = *dhcp.lease().unwrap();
    server.borrow_mut().silent = true;

    clock.set(lease.renew_at_ms());
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::RenewFailed);
    assert_eq!(dhcp.state(), DhcpState::Renewing);
    assert_eq!(dhcp.local_ip(), OFFERED);
    assert!(sockets.handle_at(0).is_none());

    clock.set(lease.rebind_at_ms());
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::RebindFailed);
    assert_eq!(dhcp.state(), DhcpState::Rebinding);
    let (datagram, request) = sent_messages(&sockets).pop().unwrap();
    assert_eq!(datagram.remote, Ipv4Address::BROADCAST);
    assert_eq!(request.ciaddr, OFFERED);
    assert_eq!(request.flags, FLAG_BROADCAST);

    // Server is back before the lease runs out
    server.borrow_mut().silent = false;
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::Rebound);
    assert_eq!(dhcp.state(), DhcpState::Bound);

    // Gone for good: the lease lapses
    server.borrow_mut().silent = true;
    let lease = *dhcp.lease().unwrap();
    clock.set(lease.expires_at_ms());
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::Expired);
    assert_eq!(dhcp.state(), DhcpState::Idle);
    assert!(dhcp.lease().is_none());
    assert_eq!(dhcp.local_ip(), Ipv4Address::UNSPECIFIED);
}

#[test]
fn test_renewal_nak_keeps_lease() {
    let (mut sockets, mut clock, mut dhcp, server) = setup(1_000);
    dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 60_000, 4_000)
        .unwrap();
    let lease = *dhcp.lease().unwrap();
    server.borrow_mut().nak_requests = 1;

    clock.set(lease.renew_at_ms());
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::RenewFailed);
    assert_eq!(*dhcp.lease().unwrap(), lease);

    // Next check retries and succeeds
    assert_eq!(dhcp.check_lease(&mut sockets, &mut clock), LeaseCheck::Renewed);
}

#[test]
fn test_stale_replies_during_renewal_ignored() {
    let (mut sockets, mut clock, mut dhcp, server) = setup(1_000);
    dhcp.acquire_lease(&mut sockets, &mut clock, MAC, 60_000, 4_000)
        .unwrap();
    let lease = *dhcp.lease().unwrap();
    let acquisition_xid = dhcp.transaction_id();
    server.borrow_mut().silent = true;

    let now = lease.renew_at_ms();
    assert_eq!(dhcp.start_maintenance(&mut sockets, now), None);
    assert_eq!(dhcp.poll(&mut sockets, now), DhcpEvent::Pending);
    assert_ne!(dhcp.transaction_id(), acquisition_xid);

    let mut stale = DhcpMessage::new_reply(MessageType::Ack, acquisition_xid, MAC);
    stale.yiaddr = Ipv4Address::new(192, 0, 2, 77);
    stale.options.server_id = Some(SERVER);
    deliver(&mut sockets, &stale);

    let other_mac = EthernetAddress([2, 0, 0, 0, 0, 2]);
    let mut foreign = DhcpMessage::new_reply(MessageType::Ack, dhcp.transaction_id(), other_mac);
    foreign.yiaddr = Ipv4Address::new(192, 0, 2, 78);
    foreign.options.server_id = Some(SERVER);
    deliver(&mut sockets, &foreign);

    assert_eq!(dhcp.poll(&mut sockets, now + 100), DhcpEvent::Pending);
    assert_eq!(*dhcp.lease().unwrap(), lease);
    assert_eq!(dhcp.state(), DhcpState::Renewing);

    dhcp.abort(&mut sockets);
    assert!(sockets.handle_at(0).is_none());
    assert_eq!(dhcp.state(), DhcpState::Renewing);
}

#[test]
fn test_ethernet_dhcp_bring_up_and_maintain() {
    let mut eth: Ethernet<SimChip, ManualClock> =
        Ethernet::new(SimChip::new(2), ManualClock::new(0));
    install_server(eth.sockets(), 1_000);

    eth.begin_dhcp(MAC.0).unwrap();
    assert_eq!(eth.local_ip(), OFFERED);
    assert_eq!(eth.dns_server_ip(), DNS);
    assert_eq!(eth.sockets().chip().ip_config().ip, OFFERED.0);
    assert_eq!(eth.maintain(), LeaseCheck::Unchanged);

    let renew_at = eth.dhcp().unwrap().lease().unwrap().renew_at_ms();
    eth.clock().set(renew_at);
    let result = eth.maintain();
    assert_eq!(result, LeaseCheck::Renewed);
    assert_eq!(result.code(), 2);
    assert_eq!(eth.local_ip(), OFFERED);
}

#[test]
fn test_ethernet_clears_address_on_expiry() {
    let mut eth: Ethernet<SimChip, ManualClock> =
        Ethernet::new(SimChip::new(2), ManualClock::new(0));
    let server = install_server(eth.sockets(), 600);
    eth.begin_dhcp(MAC.0).unwrap();

    server.borrow_mut().silent = true;
    let expires_at = eth.dhcp().unwrap().lease().unwrap().expires_at_ms();
    eth.clock().set(expires_at);
    assert_eq!(eth.maintain(), LeaseCheck::Expired);
    assert_eq!(eth.local_ip(), Ipv4Address::UNSPECIFIED);
    assert_eq!(eth.sockets().chip().ip_config().ip, [0, 0, 0, 0]);
}
