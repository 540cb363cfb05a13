//! DHCP message encoding and parsing
//!
//! A DHCP message is a fixed 236-byte BOOTP header followed by the magic
//! cookie and a list of type-length-value options (RFC 2131, RFC 2132).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +---------------+---------------+---------------+---------------+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |          ciaddr, yiaddr, siaddr, giaddr (4 each)              |
//! +---------------------------------------------------------------+
//! |                  chaddr (16), sname (64), file (128)          |
//! +---------------------------------------------------------------+
//! |                  magic cookie, options (variable)             |
//! +---------------------------------------------------------------+
//! ```
//!
//! Only the options the client sends or consumes are modelled; anything else
//! in a received message is skipped.

use alloc::vec::Vec;
use smoltcp::wire::{EthernetAddress, Ipv4Address};
use thiserror::Error;

/// UDP port the server listens on
pub const DHCP_SERVER_PORT: u16 = 67;

/// UDP port the client listens on
pub const DHCP_CLIENT_PORT: u16 = 68;

pub const MAGIC_COOKIE: u32 = 0x6382_5363;

pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;

/// Ask the server to broadcast its reply
pub const FLAG_BROADCAST: u16 = 0x8000;

const HTYPE_ETHERNET: u8 = 1;
const HLEN_ETHERNET: u8 = 6;

/// Fixed BOOTP header, without the cookie
pub const HEADER_LEN: usize = 236;

/// Smallest message a BOOTP relay is required to accept
const MIN_MESSAGE_LEN: usize = 300;

/// Option codes
pub mod option {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DNS_SERVER: u8 = 6;
    pub const HOST_NAME: u8 = 12;
    pub const DOMAIN_NAME: u8 = 15;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const PARAMETER_REQUEST: u8 = 55;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const CLIENT_ID: u8 = 61;
    pub const END: u8 = 255;
}

/// Parameters the client asks every server for
pub const PARAMETER_REQUEST_LIST: [u8; 5] = [
    option::SUBNET_MASK,
    option::ROUTER,
    option::DNS_SERVER,
    option::RENEWAL_TIME,
    option::REBINDING_TIME,
];

/// Reasons a received buffer is not a usable DHCP message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,

    #[error("bad magic cookie")]
    BadMagicCookie,

    #[error("malformed option {0}")]
    BadOption(u8),
}

/// DHCP message type (option 53)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::Discover),
            2 => Some(MessageType::Offer),
            3 => Some(MessageType::Request),
            4 => Some(MessageType::Decline),
            5 => Some(MessageType::Ack),
            6 => Some(MessageType::Nak),
            7 => Some(MessageType::Release),
            8 => Some(MessageType::Inform),
            _ => None,
        }
    }
}

impl core::fmt::Display for MessageType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            MessageType::Discover => "DISCOVER",
            MessageType::Offer => "OFFER",
            MessageType::Request => "REQUEST",
            MessageType::Decline => "DECLINE",
            MessageType::Ack => "ACK",
            MessageType::Nak => "NAK",
            MessageType::Release => "RELEASE",
            MessageType::Inform => "INFORM",
        };
        f.write_str(name)
    }
}

/// Options carried by a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    pub message_type: Option<MessageType>,
    pub subnet_mask: Option<Ipv4Address>,
    /// First router listed
    pub router: Option<Ipv4Address>,
    /// First DNS server listed
    pub dns_server: Option<Ipv4Address>,
    pub server_id: Option<Ipv4Address>,
    pub requested_ip: Option<Ipv4Address>,
    pub lease_time: Option<u32>,
    pub renewal_time: Option<u32>,
    pub rebinding_time: Option<u32>,
    /// Hardware-type 1 client identifier
    pub client_id: Option<EthernetAddress>,
    pub host_name: Option<heapless::String<64>>,
    pub parameter_request: heapless::Vec<u8, 16>,
}

/// A decoded DHCP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpMessage {
    pub op: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    /// Client address, set only when the client already owns it
    pub ciaddr: Ipv4Address,
    /// Address offered or assigned by the server
    pub yiaddr: Ipv4Address,
    pub siaddr: Ipv4Address,
    pub giaddr: Ipv4Address,
    pub chaddr: EthernetAddress,
    pub options: DhcpOptions,
}

impl DhcpMessage {
    /// A client message of `message_type` with everything else blank
    pub fn new_request(message_type: MessageType, xid: u32, chaddr: EthernetAddress) -> Self {
        Self {
            op: BOOTREQUEST,
            xid,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Address::UNSPECIFIED,
            yiaddr: Ipv4Address::UNSPECIFIED,
            siaddr: Ipv4Address::UNSPECIFIED,
            giaddr: Ipv4Address::UNSPECIFIED,
            chaddr,
            options: DhcpOptions {
                message_type: Some(message_type),
                ..DhcpOptions::default()
            },
        }
    }

    /// A server reply of `message_type` to `xid`
    pub fn new_reply(message_type: MessageType, xid: u32, chaddr: EthernetAddress) -> Self {
        let mut message = Self::new_request(message_type, xid, chaddr);
        message.op = BOOTREPLY;
        message
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.options.message_type
    }

    /// Serialize to wire format, padded to the BOOTP minimum
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MIN_MESSAGE_LEN);

        bytes.push(self.op);
        bytes.push(HTYPE_ETHERNET);
        bytes.push(HLEN_ETHERNET);
        bytes.push(0); // hops
        bytes.extend_from_slice(&self.xid.to_be_bytes());
        bytes.extend_from_slice(&self.secs.to_be_bytes());
        bytes.extend_from_slice(&self.flags.to_be_bytes());
        for addr in [self.ciaddr, self.yiaddr, self.siaddr, self.giaddr] {
            bytes.extend_from_slice(addr.as_bytes());
        }
        bytes.extend_from_slice(self.chaddr.as_bytes());
        // Rest of chaddr, then sname and file
        bytes.resize(HEADER_LEN, 0);
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());

        self.options.encode(&mut bytes);
        bytes.push(option::END);

        if bytes.len() < MIN_MESSAGE_LEN {
            bytes.resize(MIN_MESSAGE_LEN, option::PAD);
        }
        bytes
    }

    /// Parse a message from wire format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN + 4 {
            return Err(WireError::Truncated);
        }
        let cookie = u32::from_be_bytes([bytes[236], bytes[237], bytes[238], bytes[239]]);
        if cookie != MAGIC_COOKIE {
            return Err(WireError::BadMagicCookie);
        }

        Ok(Self {
            op: bytes[0],
            xid: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            secs: u16::from_be_bytes([bytes[8], bytes[9]]),
            flags: u16::from_be_bytes([bytes[10], bytes[11]]),
            ciaddr: Ipv4Address::from_bytes(&bytes[12..16]),
            yiaddr: Ipv4Address::from_bytes(&bytes[16..20]),
            siaddr: Ipv4Address::from_bytes(&bytes[20..24]),
            giaddr: Ipv4Address::from_bytes(&bytes[24..28]),
            chaddr: EthernetAddress::from_bytes(&bytes[28..34]),
            options: DhcpOptions::decode(&bytes[HEADER_LEN + 4..])?,
        })
    }
}

impl DhcpOptions {
    fn encode(&self, out: &mut Vec<u8>) {
        if let Some(kind) = self.message_type {
            put(out, option::MESSAGE_TYPE, &[kind as u8]);
        }
        if let Some(mac) = self.client_id {
            out.extend_from_slice(&[option::CLIENT_ID, 7, HTYPE_ETHERNET]);
            out.extend_from_slice(mac.as_bytes());
        }
        if let Some(name) = &self.host_name {
            put(out, option::HOST_NAME, name.as_bytes());
        }
        if let Some(ip) = self.requested_ip {
            put(out, option::REQUESTED_IP, ip.as_bytes());
        }
        if let Some(ip) = self.server_id {
            put(out, option::SERVER_ID, ip.as_bytes());
        }
        if let Some(mask) = self.subnet_mask {
            put(out, option::SUBNET_MASK, mask.as_bytes());
        }
        if let Some(ip) = self.router {
            put(out, option::ROUTER, ip.as_bytes());
        }
        if let Some(ip) = self.dns_server {
            put(out, option::DNS_SERVER, ip.as_bytes());
        }
        if let Some(secs) = self.lease_time {
            put(out, option::LEASE_TIME, &secs.to_be_bytes());
        }
        if let Some(secs) = self.renewal_time {
            put(out, option::RENEWAL_TIME, &secs.to_be_bytes());
        }
        if let Some(secs) = self.rebinding_time {
            put(out, option::REBINDING_TIME, &secs.to_be_bytes());
        }
        if !self.parameter_request.is_empty() {
            put(out, option::PARAMETER_REQUEST, &self.parameter_request);
        }
    }

    fn decode(mut data: &[u8]) -> Result<Self, WireError> {
        let mut options = DhcpOptions::default();

        while let Some((&code, rest)) = data.split_first() {
            match code {
                option::PAD => {
                    data = rest;
                    continue;
                }
                option::END => break,
                _ => {}
            }
            let (&len, rest) = rest.split_first().ok_or(WireError::Truncated)?;
            let len = len as usize;
            if rest.len() < len {
                return Err(WireError::Truncated);
            }
            let (value, rest) = rest.split_at(len);
            data = rest;

            match code {
                option::MESSAGE_TYPE => {
                    let kind = value.first().ok_or(WireError::BadOption(code))?;
                    // An unknown type leaves the message unusable rather than malformed
                    options.message_type = MessageType::from_u8(*kind);
                }
                option::SUBNET_MASK => options.subnet_mask = Some(address(code, value)?),
                option::ROUTER => options.router = Some(address(code, value)?),
                option::DNS_SERVER => options.dns_server = Some(address(code, value)?),
                option::SERVER_ID => options.server_id = Some(address(code, value)?),
                option::REQUESTED_IP => options.requested_ip = Some(address(code, value)?),
                option::LEASE_TIME => options.lease_time = Some(seconds(code, value)?),
                option::RENEWAL_TIME => options.renewal_time = Some(seconds(code, value)?),
                option::REBINDING_TIME => options.rebinding_time = Some(seconds(code, value)?),
                option::CLIENT_ID => {
                    if value.len() == 7 && value[0] == HTYPE_ETHERNET {
                        options.client_id = Some(EthernetAddress::from_bytes(&value[1..]));
                    }
                }
                // Informational only; never a reason to reject the message
                option::HOST_NAME => options.host_name = host_name(value),
                option::PARAMETER_REQUEST => {
                    let keep = value.len().min(options.parameter_request.capacity());
                    options.parameter_request.clear();
                    let _ = options.parameter_request.extend_from_slice(&value[..keep]);
                }
                _ => {}
            }
        }

        Ok(options)
    }
}

fn put(out: &mut Vec<u8>, code: u8, value: &[u8]) {
    out.push(code);
    out.push(value.len() as u8);
    out.extend_from_slice(value);
}

/// First address of an address-list option
fn address(code: u8, value: &[u8]) -> Result<Ipv4Address, WireError> {
    if value.len() < 4 || value.len() % 4 != 0 {
        return Err(WireError::BadOption(code));
    }
    Ok(Ipv4Address::from_bytes(&value[..4]))
}

/// Host name cut to what fits; `None` unless it is UTF-8
fn host_name(value: &[u8]) -> Option<heapless::String<64>> {
    let name = core::str::from_utf8(value).ok()?;
    let mut end = name.len().min(64);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut host_name = heapless::String::new();
    host_name.push_str(&name[..end]).ok()?;
    Some(host_name)
}

fn seconds(code: u8, value: &[u8]) -> Result<u32, WireError> {
    match value {
        [a, b, c, d] => Ok(u32::from_be_bytes([*a, *b, *c, *d])),
        _ => Err(WireError::BadOption(code)),
    }
}
