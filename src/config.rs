//! Server configuration.
//!
//! Configuration lives in a JSON file next to the binary. A missing file
//! is created with defaults on first start, so `dhcplet run` works out of
//! the box on a 192.168.1.0/24 segment.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

use crate::error::{Error, Result};

fn default_port() -> u16 {
    67
}

fn default_receive_timeout() -> u64 {
    1
}

/// On-disk server configuration.
///
/// The address range is half-open: `range_start` is handed out,
/// `range_end` is not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server_ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns1: Ipv4Addr,
    pub dns2: Option<Ipv4Addr>,
    /// Broadcast address; computed from `server_ip | !netmask` when absent.
    pub broadcast: Option<Ipv4Addr>,
    pub range_start: Ipv4Addr,
    pub range_end: Ipv4Addr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Receive timeout in seconds; doubles as the expiry sweep interval.
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_secs: u64,
    pub lease_seconds: u32,
    /// Renewal time T1; defaults to 50% of the lease.
    pub renewal_seconds: Option<u32>,
    /// Rebinding time T2; defaults to 87.5% of the lease.
    pub rebinding_seconds: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::new(192, 168, 1, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(192, 168, 1, 1),
            dns1: Ipv4Addr::new(8, 8, 8, 8),
            dns2: Some(Ipv4Addr::new(8, 8, 4, 4)),
            broadcast: None,
            range_start: Ipv4Addr::new(192, 168, 1, 100),
            range_end: Ipv4Addr::new(192, 168, 1, 200),
            port: default_port(),
            receive_timeout_secs: default_receive_timeout(),
            lease_seconds: 86400,
            renewal_seconds: None,
            rebinding_seconds: None,
        }
    }
}

impl Config {
    /// Loads the configuration, writing a default file if none exists.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let start = u32::from(self.range_start);
        let end = u32::from(self.range_end);

        if start >= end {
            return Err(Error::InvalidConfig(
                "range_start must be less than range_end".to_string(),
            ));
        }

        let server = u32::from(self.server_ip);
        if server >= start && server < end {
            return Err(Error::InvalidConfig(
                "server_ip must not be within the address range".to_string(),
            ));
        }

        let gw = u32::from(self.gateway);
        if gw >= start && gw < end {
            return Err(Error::InvalidConfig(
                "gateway must not be within the address range".to_string(),
            ));
        }

        if self.lease_seconds == 0 {
            return Err(Error::InvalidConfig(
                "lease_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn ip_in_range(&self, ip: Ipv4Addr) -> bool {
        let addr = u32::from(ip);
        addr >= u32::from(self.range_start) && addr < u32::from(self.range_end)
    }

    pub fn range_size(&self) -> u32 {
        u32::from(self.range_end) - u32::from(self.range_start)
    }

    pub fn calculate_broadcast(&self) -> Ipv4Addr {
        if let Some(broadcast) = self.broadcast {
            return broadcast;
        }

        let ip = u32::from(self.server_ip);
        let mask = u32::from(self.netmask);
        Ipv4Addr::from(ip | !mask)
    }

    /// Builds the read-only network snapshot handed to the protocol core.
    pub fn context(&self) -> ServerContext {
        let lease = self.lease_seconds;
        ServerContext {
            server_ip: self.server_ip,
            netmask: self.netmask,
            gateway: self.gateway,
            broadcast: self.calculate_broadcast(),
            dns1: self.dns1,
            dns2: self.dns2,
            lease_secs: lease,
            renewal_secs: self.renewal_seconds.unwrap_or(lease / 2),
            rebinding_secs: self.rebinding_seconds.unwrap_or(lease / 8 * 7),
        }
    }
}

/// Read-only network parameters shared with the codec and dispatcher.
///
/// Derived from [`Config`] once at startup; the protocol core only
/// reads it.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub server_ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub dns1: Ipv4Addr,
    pub dns2: Option<Ipv4Addr>,
    pub lease_secs: u32,
    pub renewal_secs: u32,
    pub rebinding_secs: u32,
}

impl ServerContext {
    /// DNS servers in reply order: primary, then secondary if configured.
    pub fn dns_servers(&self) -> Vec<Ipv4Addr> {
        match self.dns2 {
            Some(dns2) => vec![self.dns1, dns2],
            None => vec![self.dns1],
        }
    }
}
