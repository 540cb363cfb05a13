#![cfg_attr(not(test), no_std)]

// Network driver for socket-offload Ethernet chips
// Socket slot management, TCP/UDP endpoints and DHCP configuration

extern crate alloc;

pub mod dhcp;
pub mod drivers;
pub mod error;
pub mod socket;
pub mod stack;
pub mod tcp;
pub mod udp;

// Re-export commonly used types
pub use dhcp::{DhcpClient, DhcpEvent, DhcpState, Lease, LeaseCheck};
pub use drivers::{Protocol, SocketChip, SocketStatus};
pub use error::NetError;
pub use socket::{SocketHandle, SocketManager, Stream, MAX_SOCK_NUM};
pub use stack::Ethernet;
pub use tcp::{TcpClient, TcpServer};
pub use udp::UdpSocket;
