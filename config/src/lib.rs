#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{AddressMode, DhcpConfig, Fraction, IpConfig, LeasePolicy, NetConfig};
