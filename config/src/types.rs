//! Configuration types for the network driver
//!
//! Defines the interface configuration and the DHCP timing policy. Every
//! structure has a usable `Default` and a `validate` that rejects values the
//! driver cannot honour.

use crate::error::ConfigError;
use alloc::string::String;

/// Interface configuration
#[derive(Debug, Clone, PartialEq)]
pub struct NetConfig {
    pub mac: [u8; 6],
    pub mode: AddressMode,
    pub dhcp: DhcpConfig,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            mac: [0; 6],
            mode: AddressMode::Dhcp,
            dhcp: DhcpConfig::default(),
        }
    }
}

impl NetConfig {
    /// Configuration that obtains its address through DHCP
    pub fn dhcp(mac: [u8; 6]) -> Self {
        Self {
            mac,
            ..Self::default()
        }
    }

    /// Configuration with a fixed address
    pub fn fixed(mac: [u8; 6], ip: IpConfig) -> Self {
        Self {
            mac,
            mode: AddressMode::Static(ip),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mac == [0; 6] {
            return Err(ConfigError::missing_value("mac"));
        }
        if self.mac[0] & 0x01 != 0 {
            return Err(ConfigError::invalid_value("mac must be a unicast address"));
        }
        if let AddressMode::Static(ip) = &self.mode {
            ip.validate()?;
        }
        self.dhcp.validate()
    }
}

/// How the interface obtains its address
#[derive(Debug, Clone, PartialEq)]
pub enum AddressMode {
    Dhcp,
    Static(IpConfig),
}

/// IP configuration (for static IP, or as applied from a lease)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpConfig {
    pub ip: [u8; 4],
    pub gateway: [u8; 4],
    pub dns: [u8; 4],
    pub subnet_mask: [u8; 4],
}

impl IpConfig {
    /// Configuration with everything zeroed (no address)
    pub const UNCONFIGURED: IpConfig = IpConfig {
        ip: [0; 4],
        gateway: [0; 4],
        dns: [0; 4],
        subnet_mask: [0; 4],
    };

    /// Derive a full configuration from an address alone.
    ///
    /// Gateway and DNS default to the `.1` host of the address' /24 and the
    /// mask to 255.255.255.0.
    pub fn from_ip(ip: [u8; 4]) -> Self {
        let router = [ip[0], ip[1], ip[2], 1];
        Self {
            ip,
            gateway: router,
            dns: router,
            subnet_mask: [255, 255, 255, 0],
        }
    }

    pub fn with_dns(mut self, dns: [u8; 4]) -> Self {
        self.dns = dns;
        self
    }

    /// Set the gateway address
    pub fn with_gateway(mut self, gateway: [u8; 4]) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_subnet_mask(mut self, subnet_mask: [u8; 4]) -> Self {
        self.subnet_mask = subnet_mask;
        self
    }

    /// Number of leading one bits in the mask
    pub fn prefix_len(&self) -> u8 {
        u32::from_be_bytes(self.subnet_mask).leading_ones() as u8
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ip == [0; 4] {
            return Err(ConfigError::missing_value("ip"));
        }
        let mask = u32::from_be_bytes(self.subnet_mask);
        // Contiguous ones followed by zeros
        if mask.leading_ones() + mask.trailing_zeros() != 32 {
            return Err(ConfigError::invalid_value("subnet mask is not contiguous"));
        }
        Ok(())
    }
}

/// DHCP client timing
#[derive(Debug, Clone, PartialEq)]
pub struct DhcpConfig {
    /// Overall budget for one lease acquisition
    pub timeout_ms: u64,
    /// How long to wait for a reply to a single DISCOVER or REQUEST
    pub response_timeout_ms: u64,
    /// First retransmission backoff; doubles per retry
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,
    /// Sleep between polls while waiting
    pub poll_interval_ms: u64,
    /// Host name sent in option 12, followed by the last three MAC bytes in hex
    pub hostname_prefix: String,
    pub policy: LeasePolicy,
}

impl Default for DhcpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            response_timeout_ms: 4_000,
            retry_backoff_ms: 250,
            retry_backoff_max_ms: 4_000,
            poll_interval_ms: 50,
            hostname_prefix: String::from("WIZnet"),
            policy: LeasePolicy::default(),
        }
    }
}

impl DhcpConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 || self.response_timeout_ms == 0 {
            return Err(ConfigError::out_of_range("DHCP timeouts must be non-zero"));
        }
        if self.response_timeout_ms > self.timeout_ms {
            return Err(ConfigError::out_of_range(
                "response timeout exceeds overall timeout",
            ));
        }
        if self.retry_backoff_ms > self.retry_backoff_max_ms {
            return Err(ConfigError::out_of_range("retry backoff exceeds its maximum"));
        }
        if self.hostname_prefix.len() > 32 || !self.hostname_prefix.is_ascii() {
            return Err(ConfigError::invalid_value(
                "hostname prefix must be ASCII, at most 32 bytes",
            ));
        }
        self.policy.validate()
    }
}

/// A fraction of the lease duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub num: u32,
    pub den: u32,
}

impl Fraction {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// `secs * num / den`, rounded down
    pub fn of(&self, secs: u32) -> u32 {
        if self.den == 0 {
            return 0;
        }
        (u64::from(secs) * u64::from(self.num) / u64::from(self.den)) as u32
    }

    fn is_proper(&self) -> bool {
        self.den != 0 && self.num > 0 && self.num < self.den
    }
}

/// When to renew (T1) and rebind (T2), as fractions of the lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    pub renewal: Fraction,
    pub rebinding: Fraction,
    /// Lease length assumed when the server does not send option 51
    pub default_lease_secs: u32,
    /// Use the server's T1/T2 options (58/59) when present and consistent
    pub prefer_server_timers: bool,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            renewal: Fraction::new(1, 2),
            rebinding: Fraction::new(7, 8),
            default_lease_secs: 900,
            prefer_server_timers: true,
        }
    }
}

impl LeasePolicy {
    /// T1 and T2 in seconds for a lease of `lease_secs`
    pub fn timers(&self, lease_secs: u32) -> (u32, u32) {
        (self.renewal.of(lease_secs), self.rebinding.of(lease_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.renewal.is_proper() || !self.rebinding.is_proper() {
            return Err(ConfigError::out_of_range(
                "lease fractions must lie strictly between 0 and 1",
            ));
        }
        let t1 = u64::from(self.renewal.num) * u64::from(self.rebinding.den);
        let t2 = u64::from(self.rebinding.num) * u64::from(self.renewal.den);
        if t1 >= t2 {
            return Err(ConfigError::invalid_value("renewal must come before rebinding"));
        }
        if self.default_lease_secs == 0 {
            return Err(ConfigError::out_of_range("default lease must be non-zero"));
        }
        Ok(())
    }
}
