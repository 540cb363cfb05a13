// Interface controller
// Owns the chip (through the socket manager), the clock and the DHCP client,
// and keeps the chip's address registers in step with the current lease.

use crate::dhcp::{DhcpClient, LeaseCheck};
use crate::drivers::SocketChip;
use crate::error::NetError;
use crate::socket::{SocketManager, MAX_SOCK_NUM};
use config::{AddressMode, DhcpConfig, IpConfig, NetConfig};
use shared::timer::Clock;
use smoltcp::wire::{EthernetAddress, Ipv4Address};

/// One Ethernet interface on a socket-offload chip
///
/// Facades (`UdpSocket`, `TcpClient`, `TcpServer`) borrow the socket manager
/// and the clock through `split`.
pub struct Ethernet<C: SocketChip, K: Clock, const N: usize = MAX_SOCK_NUM> {
    sockets: SocketManager<C, N>,
    clock: K,
    dhcp_config: DhcpConfig,
    dhcp: Option<DhcpClient>,
    ip: IpConfig,
}

impl<C: SocketChip, K: Clock, const N: usize> Ethernet<C, K, N> {
    pub fn new(chip: C, clock: K) -> Self {
        Self::with_dhcp_config(chip, clock, DhcpConfig::default())
    }

    pub fn with_dhcp_config(chip: C, clock: K, dhcp_config: DhcpConfig) -> Self {
        Self {
            sockets: SocketManager::new(chip),
            clock,
            dhcp_config,
            dhcp: None,
            ip: IpConfig::UNCONFIGURED,
        }
    }

    /// Bring the interface up as described by `config`
    pub fn begin(&mut self, config: &NetConfig) -> Result<(), NetError> {
        config.validate()?;
        config.dhcp.validate()?;
        self.dhcp_config = config.dhcp.clone();
        match config.mode {
            AddressMode::Dhcp => self.begin_dhcp(config.mac),
            AddressMode::Static(ip) => self.begin_static(config.mac, ip),
        }
    }

    /// Configure through DHCP with the configured timeouts
    pub fn begin_dhcp(&mut self, mac: [u8; 6]) -> Result<(), NetError> {
        let timeout = self.dhcp_config.timeout_ms;
        let response_timeout = self.dhcp_config.response_timeout_ms;
        self.begin_dhcp_with(mac, timeout, response_timeout)
    }

    /// Configure through DHCP
    ///
    /// # Arguments
    /// * `timeout_ms` - budget for the whole acquisition
    /// * `response_timeout_ms` - wait for each single reply
    ///
    /// # Returns
    /// * `Ok(())` - lease acquired and programmed into the chip
    /// * `Err(NetError::DhcpTimeout)` - no lease in time; the chip stays unconfigured
    pub fn begin_dhcp_with(
        &mut self,
        mac: [u8; 6],
        timeout_ms: u64,
        response_timeout_ms: u64,
    ) -> Result<(), NetError> {
        let mac = EthernetAddress(mac);
        self.sockets.chip_mut().set_mac_address(mac);
        self.apply(IpConfig::UNCONFIGURED);

        if let Some(mut previous) = self.dhcp.take() {
            previous.abort(&mut self.sockets);
        }
        let seed = (u64::from(self.sockets.chip_mut().entropy()) << 32)
            | u64::from(u32::from_be_bytes([mac.0[2], mac.0[3], mac.0[4], mac.0[5]]));
        let dhcp = self
            .dhcp
            .insert(DhcpClient::new(self.dhcp_config.clone(), seed));

        dhcp.acquire_lease(
            &mut self.sockets,
            &mut self.clock,
            mac,
            timeout_ms,
            response_timeout_ms,
        )?;

        if let Some(config) = dhcp.lease().map(|lease| lease.ip_config()) {
            self.apply(config);
        }
        log::info!("ethernet: configured {} by DHCP", self.local_ip());
        Ok(())
    }

    /// Configure a fixed address
    pub fn begin_static(&mut self, mac: [u8; 6], ip: IpConfig) -> Result<(), NetError> {
        ip.validate()?;
        if let Some(mut dhcp) = self.dhcp.take() {
            dhcp.abort(&mut self.sockets);
        }
        self.sockets.chip_mut().set_mac_address(EthernetAddress(mac));
        self.apply(ip);
        log::info!("ethernet: configured {}/{}", self.local_ip(), ip.prefix_len());
        Ok(())
    }

    /// Keep the DHCP lease alive; call periodically
    ///
    /// Without DHCP this is always `Unchanged`. A refreshed lease is written
    /// to the chip; an expired one leaves the chip unconfigured.
    pub fn maintain(&mut self) -> LeaseCheck {
        let Some(dhcp) = self.dhcp.as_mut() else {
            return LeaseCheck::Unchanged;
        };
        let result = dhcp.check_lease(&mut self.sockets, &mut self.clock);
        match result {
            LeaseCheck::Renewed | LeaseCheck::Rebound => {
                if let Some(config) = dhcp.lease().map(|lease| lease.ip_config()) {
                    self.apply(config);
                }
            }
            LeaseCheck::Expired => self.apply(IpConfig::UNCONFIGURED),
            _ => {}
        }
        result
    }

    fn apply(&mut self, ip: IpConfig) {
        self.ip = ip;
        self.sockets.chip_mut().set_ip_config(&ip);
    }

    pub fn local_ip(&self) -> Ipv4Address {
        Ipv4Address(self.ip.ip)
    }

    pub fn subnet_mask(&self) -> Ipv4Address {
        Ipv4Address(self.ip.subnet_mask)
    }

    pub fn gateway_ip(&self) -> Ipv4Address {
        Ipv4Address(self.ip.gateway)
    }

    pub fn dns_server_ip(&self) -> Ipv4Address {
        Ipv4Address(self.ip.dns)
    }

    pub fn set_local_ip(&mut self, ip: Ipv4Address) {
        let config = IpConfig { ip: ip.0, ..self.ip };
        self.apply(config);
    }

    pub fn set_subnet_mask(&mut self, mask: Ipv4Address) {
        let config = IpConfig {
            subnet_mask: mask.0,
            ..self.ip
        };
        self.apply(config);
    }

    pub fn set_gateway_ip(&mut self, gateway: Ipv4Address) {
        let config = IpConfig {
            gateway: gateway.0,
            ..self.ip
        };
        self.apply(config);
    }

    /// The DNS server is not a chip register; only the cached copy changes
    pub fn set_dns_server_ip(&mut self, dns: Ipv4Address) {
        self.ip.dns = dns.0;
    }

    pub fn mac_address(&self) -> EthernetAddress {
        self.sockets.chip().mac_address()
    }

    pub fn is_link_up(&self) -> bool {
        self.sockets.chip().is_link_up()
    }

    /// The DHCP client, once `begin_dhcp` has run
    pub fn dhcp(&self) -> Option<&DhcpClient> {
        self.dhcp.as_ref()
    }

    pub fn sockets(&mut self) -> &mut SocketManager<C, N> {
        &mut self.sockets
    }

    pub fn clock(&mut self) -> &mut K {
        &mut self.clock
    }

    /// Socket manager and clock, borrowed together for the facades
    pub fn split(&mut self) -> (&mut SocketManager<C, N>, &mut K) {
        (&mut self.sockets, &mut self.clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::sim::SimChip;
    use shared::timer::ManualClock;

    const MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x42];

    fn ethernet() -> Ethernet<SimChip, ManualClock> {
        Ethernet::new(SimChip::new(2), ManualClock::new(0))
    }

    #[test]
    fn test_static_configuration() {
        let mut eth = ethernet();
        eth.begin_static(MAC, IpConfig::from_ip([10, 1, 2, 3])).unwrap();
        assert_eq!(eth.local_ip(), Ipv4Address::new(10, 1, 2, 3));
        assert_eq!(eth.gateway_ip(), Ipv4Address::new(10, 1, 2, 1));
        assert_eq!(eth.subnet_mask(), Ipv4Address::new(255, 255, 255, 0));
        assert_eq!(eth.mac_address(), EthernetAddress(MAC));
        assert_eq!(eth.sockets().chip().ip_config().ip, [10, 1, 2, 3]);
        assert_eq!(eth.maintain(), LeaseCheck::Unchanged);
    }

    #[test]
    fn test_begin_with_static_mode() {
        let mut eth = ethernet();
        let ip = IpConfig::from_ip([192, 168, 0, 20]).with_dns([9, 9, 9, 9]);
        eth.begin(&NetConfig::fixed(MAC, ip)).unwrap();
        assert_eq!(eth.dns_server_ip(), Ipv4Address::new(9, 9, 9, 9));
    }

    #[test]
    fn test_invalid_static_mask_rejected() {
        let mut eth = ethernet();
        let ip = IpConfig::from_ip([10, 0, 0, 2]).with_subnet_mask([255, 0, 255, 0]);
        assert!(matches!(
            eth.begin_static(MAC, ip),
            Err(NetError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_dhcp_timeout_leaves_interface_unconfigured() {
        let mut eth = ethernet();
        let result = eth.begin_dhcp_with(MAC, 5_000, 1_000);
        assert!(matches!(result, Err(NetError::DhcpTimeout(_))));
        assert_eq!(eth.local_ip(), Ipv4Address::UNSPECIFIED);
        assert!(eth.sockets().handle_at(0).is_none());
        assert!(!eth.sockets().chip().sent_datagrams().is_empty());
    }

    #[test]
    fn test_setters_program_chip() {
        let mut eth = ethernet();
        eth.begin_static(MAC, IpConfig::from_ip([10, 0, 0, 2])).unwrap();
        eth.set_gateway_ip(Ipv4Address::new(10, 0, 0, 254));
        assert_eq!(eth.sockets().chip().ip_config().gateway, [10, 0, 0, 254]);
        eth.set_local_ip(Ipv4Address::new(10, 0, 0, 3));
        assert_eq!(eth.local_ip(), Ipv4Address::new(10, 0, 0, 3));
    }
}
