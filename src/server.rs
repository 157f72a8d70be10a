//! The UDP server loop.
//!
//! A single thread owns the socket, the pool, and the network context.
//! The receive call carries a timeout, so the loop wakes at least once
//! per interval to sweep expired bindings; no other timer exists.
//! Per-datagram failures are logged and dropped, never fatal.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{error, info, warn};

use crate::config::{Config, ServerContext};
use crate::dispatcher::{dispatch, sweep_expired};
use crate::error::{Error, Result};
use crate::packet::DhcpMessage;
use crate::pool::{LeasePool, PoolStats};

const RECV_BUFFER_SIZE: usize = 1500;

pub struct DhcpServer {
    config: Config,
    ctx: ServerContext,
    pool: LeasePool,
    socket: UdpSocket,
}

impl DhcpServer {
    /// Builds the pool and binds the socket. Any failure here is fatal;
    /// the process has nothing to serve without them.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let ctx = config.context();
        let pool = LeasePool::build(config.range_start, config.range_end, &ctx)?;
        let socket = Self::create_socket(&config)?;

        info!(
            "DHCP server starting on {}:{}",
            config.server_ip, config.port
        );
        info!(
            "Address range: {} - {} ({} addresses)",
            config.range_start,
            config.range_end,
            config.range_size()
        );

        Ok(Self {
            config,
            ctx,
            pool,
            socket,
        })
    }

    fn create_socket(config: &Config) -> Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|error| Error::Socket(format!("Failed to create socket: {}", error)))?;

        socket
            .set_reuse_address(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_REUSEADDR: {}", error)))?;

        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("Failed to set SO_BROADCAST: {}", error)))?;

        // The receive timeout is the loop's only clock tick.
        socket
            .set_read_timeout(Some(Duration::from_secs(config.receive_timeout_secs.max(1))))
            .map_err(|error| Error::Socket(format!("Failed to set SO_RCVTIMEO: {}", error)))?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
        socket
            .bind(&bind_addr.into())
            .map_err(|error| Error::Socket(format!("Failed to bind to {}: {}", bind_addr, error)))?;

        Ok(socket.into())
    }

    /// Receive, dispatch, send, sweep. Runs until the process exits.
    pub fn run(&mut self) -> Result<()> {
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        info!("DHCP server ready and listening");

        loop {
            match self.socket.recv_from(&mut buffer) {
                Ok((size, source)) => self.handle_datagram(&buffer[..size], source),
                Err(error)
                    if matches!(
                        error.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(error) => {
                    error!("Error receiving datagram: {}", error);
                }
            }

            sweep_expired(&mut self.pool, Instant::now());
        }
    }

    fn handle_datagram(&mut self, data: &[u8], source: SocketAddr) {
        let msg = match DhcpMessage::decode(data) {
            Ok(msg) => msg,
            Err(error) => {
                warn!("Dropping malformed datagram from {}: {}", source, error);
                return;
            }
        };

        if let Some(reply) = dispatch(&msg, &mut self.pool, &self.ctx, Instant::now())
            && let Err(error) = self.socket.send_to(&reply.bytes, reply.destination())
        {
            error!("Failed to send reply to {}: {}", reply.destination(), error);
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{MessageType, OptionCode};
    use crate::packet::{BOOTREQUEST, DHCP_MAGIC_COOKIE, HLEN_ETHERNET, HTYPE_ETHERNET};
    use crate::pool::LeaseState;

    fn test_config() -> Config {
        Config {
            server_ip: Ipv4Addr::new(10, 0, 0, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            dns1: Ipv4Addr::new(10, 0, 0, 1),
            dns2: None,
            broadcast: None,
            range_start: Ipv4Addr::new(10, 0, 0, 10),
            range_end: Ipv4Addr::new(10, 0, 0, 13),
            // Port 0 avoids needing privileges in tests.
            port: 0,
            receive_timeout_secs: 1,
            lease_seconds: 3600,
            renewal_seconds: None,
            rebinding_seconds: None,
        }
    }

    fn discover_datagram(xid: u32) -> Vec<u8> {
        let mut packet = vec![0u8; 300];
        packet[0] = BOOTREQUEST;
        packet[1] = HTYPE_ETHERNET;
        packet[2] = HLEN_ETHERNET;
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet[10..12].copy_from_slice(&0x8000u16.to_be_bytes());
        packet[28..34].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
        packet[240] = OptionCode::MessageType as u8;
        packet[241] = 1;
        packet[242] = MessageType::Discover as u8;
        packet[243] = OptionCode::End as u8;
        packet
    }

    #[test]
    fn test_server_builds_and_binds() {
        let server = DhcpServer::new(test_config()).unwrap();
        assert_eq!(server.stats().free, 3);
        assert_eq!(server.config().range_size(), 3);
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let config = Config {
            range_start: Ipv4Addr::new(10, 0, 0, 13),
            range_end: Ipv4Addr::new(10, 0, 0, 10),
            ..test_config()
        };
        assert!(DhcpServer::new(config).is_err());
    }

    #[test]
    fn test_malformed_datagram_dropped() {
        let mut server = DhcpServer::new(test_config()).unwrap();
        let source: SocketAddr = "127.0.0.1:68".parse().unwrap();

        server.handle_datagram(&[0u8; 10], source);
        server.handle_datagram(&[0u8; 300], source);
        assert_eq!(server.stats().free, 3);
    }

    #[test]
    fn test_discover_datagram_drives_pool() {
        let mut server = DhcpServer::new(test_config()).unwrap();
        let source: SocketAddr = "127.0.0.1:68".parse().unwrap();

        server.handle_datagram(&discover_datagram(0x42), source);
        assert_eq!(server.stats().offered, 1);

        let offered = server
            .pool
            .find_by_xid(0x42)
            .map(|record| (record.addr, record.state));
        assert_eq!(
            offered,
            Some((Ipv4Addr::new(10, 0, 0, 10), LeaseState::Offered))
        );
    }
}
