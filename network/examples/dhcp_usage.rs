//! Example: bring an interface up by DHCP and keep the lease alive
//!
//! Runs on the host against the simulated chip. A closure stands in for
//! the DHCP server on the segment.
//!
//! # DHCP Flow
//!
//! 1. **DISCOVER**: broadcast from port 68 to find servers
//! 2. **OFFER**: a server proposes an address
//! 3. **REQUEST**: the client asks for the offered address
//! 4. **ACK**: the server confirms and the address registers are programmed
//!
//! After that `Ethernet::maintain` is called from the main loop. It renews
//! at T1 with the granting server, rebinds at T2 with any server and clears
//! the address once the lease runs out.

use network::dhcp::message::{DhcpMessage, MessageType, DHCP_SERVER_PORT};
use network::drivers::sim::{Datagram, SimChip};
use network::{Ethernet, LeaseCheck, Stream, UdpSocket};
use shared::timer::{Clock, ManualClock};
use smoltcp::wire::Ipv4Address;

const MAC: [u8; 6] = [0xde, 0xad, 0xbe, 0xef, 0xfe, 0xed];
const SERVER: Ipv4Address = Ipv4Address([192, 168, 1, 1]);

fn server(sent: &Datagram) -> Vec<Datagram> {
    let Ok(request) = DhcpMessage::from_bytes(&sent.payload) else {
        return Vec::new();
    };
    let kind = match request.message_type() {
        Some(MessageType::Discover) => MessageType::Offer,
        Some(MessageType::Request) => MessageType::Ack,
        _ => return Vec::new(),
    };
    let mut reply = DhcpMessage::new_reply(kind, request.xid, request.chaddr);
    reply.yiaddr = Ipv4Address::new(192, 168, 1, 100);
    reply.options.server_id = Some(SERVER);
    reply.options.subnet_mask = Some(Ipv4Address::new(255, 255, 255, 0));
    reply.options.router = Some(SERVER);
    reply.options.dns_server = Some(Ipv4Address::new(192, 168, 1, 53));
    reply.options.lease_time = Some(120);
    vec![Datagram {
        local_port: sent.local_port,
        remote: SERVER,
        remote_port: DHCP_SERVER_PORT,
        payload: reply.to_bytes(),
    }]
}

fn main() {
    let mut chip = SimChip::new(2);
    chip.set_responder(server);
    let mut eth: Ethernet<SimChip, ManualClock> = Ethernet::new(chip, ManualClock::new(0));

    if let Err(e) = eth.begin_dhcp(MAC) {
        println!("DHCP failed: {}", e);
        return;
    }
    println!("Configured:");
    println!("  IP:      {}", eth.local_ip());
    println!("  Mask:    {}", eth.subnet_mask());
    println!("  Gateway: {}", eth.gateway_ip());
    println!("  DNS:     {}", eth.dns_server_ip());

    // The lease slot is free again; use it for an application socket
    let (sockets, _) = eth.split();
    let mut udp = UdpSocket::new();
    if udp.begin(sockets, 9000).is_ok() {
        let _ = udp.begin_packet(sockets, Ipv4Address::new(192, 168, 1, 20), 9000);
        udp.write(sockets, b"hello");
        let _ = udp.end_packet(sockets);
        udp.stop(sockets);
    }

    // Main loop: two minutes of simulated time in one second steps
    for _ in 0..120 {
        eth.clock().advance(1_000);
        match eth.maintain() {
            LeaseCheck::Unchanged => {}
            result => println!(
                "t={}s lease check: {:?} ({})",
                eth.clock().now_ms() / 1_000,
                result,
                eth.local_ip()
            ),
        }
    }
}
