// Lease bookkeeping: what the server granted and when it has to be refreshed

use super::message::DhcpMessage;
use config::{IpConfig, LeasePolicy};
use smoltcp::wire::Ipv4Address;

/// Where a lease stands at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeasePhase {
    /// Before T1
    Valid,
    /// Between T1 and T2: renew with the granting server
    Renew,
    /// Between T2 and expiry: rebind with any server
    Rebind,
    Expired,
}

/// Configuration granted by a DHCP server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub local_ip: Ipv4Address,
    pub subnet_mask: Ipv4Address,
    pub gateway_ip: Ipv4Address,
    pub dns_server_ip: Ipv4Address,
    pub dhcp_server_ip: Ipv4Address,
    /// Lease duration in seconds
    pub lease_secs: u32,
    /// T1 in seconds after acquisition
    pub renewal_secs: u32,
    /// T2 in seconds after acquisition
    pub rebinding_secs: u32,
    /// Clock reading when the ACK was accepted
    pub acquired_at_ms: u64,
}

impl Lease {
    /// Build a lease from an ACK
    ///
    /// Returns `None` if the ACK carries no address. Server T1/T2 are used
    /// only when `policy` allows it and they are ordered within the lease.
    pub fn from_ack(ack: &DhcpMessage, policy: &LeasePolicy, now_ms: u64) -> Option<Self> {
        if ack.yiaddr.is_unspecified() {
            return None;
        }
        let options = &ack.options;
        let lease_secs = match options.lease_time {
            Some(0) | None => policy.default_lease_secs,
            Some(secs) => secs,
        };
        let (renewal_secs, rebinding_secs) = timers(
            policy,
            lease_secs,
            options.renewal_time,
            options.rebinding_time,
        );

        Some(Self {
            local_ip: ack.yiaddr,
            subnet_mask: options.subnet_mask.unwrap_or(Ipv4Address::UNSPECIFIED),
            gateway_ip: options.router.unwrap_or(Ipv4Address::UNSPECIFIED),
            dns_server_ip: options.dns_server.unwrap_or(Ipv4Address::UNSPECIFIED),
            dhcp_server_ip: options.server_id.unwrap_or(Ipv4Address::UNSPECIFIED),
            lease_secs,
            renewal_secs,
            rebinding_secs,
            acquired_at_ms: now_ms,
        })
    }

    /// Clock reading at T1
    pub fn renew_at_ms(&self) -> u64 {
        self.acquired_at_ms + secs_to_ms(self.renewal_secs)
    }

    /// Clock reading at T2
    pub fn rebind_at_ms(&self) -> u64 {
        self.acquired_at_ms + secs_to_ms(self.rebinding_secs)
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.acquired_at_ms + secs_to_ms(self.lease_secs)
    }

    pub fn phase(&self, now_ms: u64) -> LeasePhase {
        if now_ms >= self.expires_at_ms() {
            LeasePhase::Expired
        } else if now_ms >= self.rebind_at_ms() {
            LeasePhase::Rebind
        } else if now_ms >= self.renew_at_ms() {
            LeasePhase::Renew
        } else {
            LeasePhase::Valid
        }
    }

    /// Address registers to program into the chip
    pub fn ip_config(&self) -> IpConfig {
        IpConfig {
            ip: self.local_ip.0,
            gateway: self.gateway_ip.0,
            dns: self.dns_server_ip.0,
            subnet_mask: self.subnet_mask.0,
        }
    }
}

fn secs_to_ms(secs: u32) -> u64 {
    u64::from(secs) * 1000
}

fn timers(
    policy: &LeasePolicy,
    lease_secs: u32,
    server_t1: Option<u32>,
    server_t2: Option<u32>,
) -> (u32, u32) {
    let (t1, t2) = policy.timers(lease_secs);
    if !policy.prefer_server_timers {
        return (t1, t2);
    }
    let t1 = server_t1.unwrap_or(t1);
    let t2 = server_t2.unwrap_or(t2);
    if 0 < t1 && t1 < t2 && t2 < lease_secs {
        (t1, t2)
    } else {
        policy.timers(lease_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::message::MessageType;
    use smoltcp::wire::EthernetAddress;

    fn ack(lease: Option<u32>) -> DhcpMessage {
        let mut ack = DhcpMessage::new_reply(
            MessageType::Ack,
            7,
            EthernetAddress([2, 0, 0, 0, 0, 1]),
        );
        ack.yiaddr = Ipv4Address::new(192, 0, 2, 5);
        ack.options.server_id = Some(Ipv4Address::new(192, 0, 2, 1));
        ack.options.subnet_mask = Some(Ipv4Address::new(255, 255, 255, 0));
        ack.options.router = Some(Ipv4Address::new(192, 0, 2, 1));
        ack.options.lease_time = lease;
        ack
    }

    #[test]
    fn test_default_fractions() {
        let lease = Lease::from_ack(&ack(Some(86_400)), &LeasePolicy::default(), 0).unwrap();
        assert_eq!(lease.renewal_secs, 43_200);
        assert_eq!(lease.rebinding_secs, 75_600);
        assert_eq!(lease.renew_at_ms(), 43_200_000);
        assert_eq!(lease.expires_at_ms(), 86_400_000);
    }

    #[test]
    fn test_missing_lease_time_uses_default() {
        let lease = Lease::from_ack(&ack(None), &LeasePolicy::default(), 1_000).unwrap();
        assert_eq!(lease.lease_secs, 900);
        assert_eq!(lease.renewal_secs, 450);
        assert_eq!(lease.rebind_at_ms(), 1_000 + 787_000);
    }

    #[test]
    fn test_server_timers_preferred_when_consistent() {
        let mut message = ack(Some(3_600));
        message.options.renewal_time = Some(1_000);
        message.options.rebinding_time = Some(3_000);
        let lease = Lease::from_ack(&message, &LeasePolicy::default(), 0).unwrap();
        assert_eq!((lease.renewal_secs, lease.rebinding_secs), (1_000, 3_000));

        // T2 beyond the lease is ignored
        message.options.rebinding_time = Some(7_200);
        let lease = Lease::from_ack(&message, &LeasePolicy::default(), 0).unwrap();
        assert_eq!((lease.renewal_secs, lease.rebinding_secs), (1_800, 3_150));

        let policy = LeasePolicy {
            prefer_server_timers: false,
            ..LeasePolicy::default()
        };
        message.options.rebinding_time = Some(3_000);
        let lease = Lease::from_ack(&message, &policy, 0).unwrap();
        assert_eq!(lease.renewal_secs, 1_800);
    }

    #[test]
    fn test_phases() {
        let lease = Lease::from_ack(&ack(Some(800)), &LeasePolicy::default(), 10_000).unwrap();
        assert_eq!(lease.phase(10_000), LeasePhase::Valid);
        assert_eq!(lease.phase(10_000 + 399_999), LeasePhase::Valid);
        assert_eq!(lease.phase(10_000 + 400_000), LeasePhase::Renew);
        assert_eq!(lease.phase(10_000 + 700_000), LeasePhase::Rebind);
        assert_eq!(lease.phase(10_000 + 800_000), LeasePhase::Expired);
    }

    #[test]
    fn test_ack_without_address() {
        let mut message = ack(Some(60));
        message.yiaddr = Ipv4Address::UNSPECIFIED;
        assert!(Lease::from_ack(&message, &LeasePolicy::default(), 0).is_none());
    }

    #[test]
    fn test_ip_config() {
        let lease = Lease::from_ack(&ack(Some(60)), &LeasePolicy::default(), 0).unwrap();
        let config = lease.ip_config();
        assert_eq!(config.ip, [192, 0, 2, 5]);
        assert_eq!(config.prefix_len(), 24);
        assert_eq!(config.dns, [0, 0, 0, 0]);
    }
}
