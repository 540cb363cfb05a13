// Error types for network operations

use alloc::string::String;
use thiserror::Error;

/// Network-related errors
///
/// None of these are fatal: the socket manager and the DHCP client recover
/// locally and only surface what the caller has to decide about.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    #[error("Chip error: {0}")]
    ChipError(String),

    #[error("No free socket slot")]
    ResourceExhausted,

    #[error("Invalid or stale socket handle")]
    InvalidHandle,

    #[error("Operation not valid for the socket's protocol")]
    WrongProtocol,

    #[error("Socket not connected")]
    NotConnected,

    #[error("No datagram in progress")]
    NoDatagram,

    #[error("Invalid remote address or port")]
    InvalidAddress,

    #[error("Buffer too small")]
    BufferTooSmall,

    #[error("Timed out")]
    Timeout,

    #[error("Link down")]
    LinkDown,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("DHCP timeout: {0}")]
    DhcpTimeout(String),

    #[error("DHCP not configured")]
    DhcpNotConfigured,
}

impl From<config::ConfigError> for NetError {
    fn from(err: config::ConfigError) -> Self {
        NetError::InvalidConfig(alloc::format!("{}", err))
    }
}
