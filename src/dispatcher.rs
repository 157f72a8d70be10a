//! Request dispatch.
//!
//! [`dispatch`] is the protocol core: it interprets one decoded message,
//! drives the pool transitions, and returns the encoded reply with its
//! routing target. It touches no sockets, so the full exchange logic is
//! testable without the network; the server loop owns I/O.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Instant;

use tracing::{info, warn};

use crate::config::ServerContext;
use crate::error::Error;
use crate::options::MessageType;
use crate::packet::{BOOTREQUEST, DhcpMessage, ReplyKind, encode_reply};
use crate::pool::{LeasePool, LeaseState};

const DHCP_CLIENT_PORT: u16 = 68;

/// Where a reply is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyTarget {
    /// 255.255.255.255:68, for clients without a usable address.
    Broadcast,
    /// Directly to a configured client, port 68.
    Unicast(Ipv4Addr),
}

/// An encoded reply and its destination.
#[derive(Debug)]
pub struct Reply {
    pub bytes: Vec<u8>,
    pub target: ReplyTarget,
}

impl Reply {
    fn broadcast(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            target: ReplyTarget::Broadcast,
        }
    }

    fn unicast(bytes: Vec<u8>, addr: Ipv4Addr) -> Self {
        Self {
            bytes,
            target: ReplyTarget::Unicast(addr),
        }
    }

    /// Socket address the reply goes to.
    pub fn destination(&self) -> SocketAddrV4 {
        match self.target {
            ReplyTarget::Broadcast => SocketAddrV4::new(Ipv4Addr::BROADCAST, DHCP_CLIENT_PORT),
            ReplyTarget::Unicast(addr) => SocketAddrV4::new(addr, DHCP_CLIENT_PORT),
        }
    }
}

/// Handles one decoded message, returning the reply to send, if any.
///
/// Only BOOTREQUEST datagrams carrying a DHCP message type are acted on;
/// everything else is discarded. Protocol mismatches (unknown xid, wrong
/// server identifier, no lease to renew) are logged and answered per the
/// message type's rules, never with a process failure.
pub fn dispatch(
    msg: &DhcpMessage,
    pool: &mut LeasePool,
    ctx: &ServerContext,
    now: Instant,
) -> Option<Reply> {
    if msg.op != BOOTREQUEST {
        warn!(op = msg.op, "Ignoring non-BOOTREQUEST datagram");
        return None;
    }

    let Some(message_type) = msg.message_type() else {
        warn!(mac = %msg.format_mac(), "Ignoring message without DHCP message type");
        return None;
    };

    info!(
        "{} from {} (xid {:#010x})",
        message_type,
        msg.format_mac(),
        msg.xid
    );

    match message_type {
        MessageType::Discover => handle_discover(msg, pool, now),
        MessageType::Request => handle_request(msg, pool, ctx, now),
        MessageType::Decline => handle_decline(msg, pool),
        MessageType::Release => handle_release(msg, pool, ctx),
        MessageType::Inform => handle_inform(msg, pool, ctx),
        other => {
            warn!("Ignoring {} message", other);
            None
        }
    }
}

fn handle_discover(msg: &DhcpMessage, pool: &mut LeasePool, now: Instant) -> Option<Reply> {
    if msg.giaddr != Ipv4Addr::UNSPECIFIED {
        warn!(giaddr = %msg.giaddr, "Ignoring relayed DISCOVER");
        return None;
    }

    let (addr, net) = match pool.offer(msg.xid, now) {
        Ok(record) => (record.addr, record.net.clone()),
        Err(Error::PoolExhausted) => {
            warn!(mac = %msg.format_mac(), "Pool exhausted, no offer made");
            return None;
        }
        Err(error) => {
            warn!(mac = %msg.format_mac(), %error, "DISCOVER not served");
            return None;
        }
    };

    info!("OFFER {} to {}", addr, msg.format_mac());
    let bytes = encode_reply(MessageType::Offer, addr, msg, &net, ReplyKind::Lease);
    Some(Reply::broadcast(bytes))
}

fn handle_request(
    msg: &DhcpMessage,
    pool: &mut LeasePool,
    ctx: &ServerContext,
    now: Instant,
) -> Option<Reply> {
    if msg.ciaddr == Ipv4Addr::UNSPECIFIED {
        // Selecting: the client is accepting an offer. It must name us.
        match msg.server_identifier() {
            Some(server_id) if server_id == ctx.server_ip => {}
            Some(server_id) => {
                info!(
                    "REQUEST from {} is for different server {}",
                    msg.format_mac(),
                    server_id
                );
                return None;
            }
            None => {
                warn!("REQUEST from {} without server identifier", msg.format_mac());
                return None;
            }
        }

        match pool.confirm(msg.xid, msg.mac(), msg.hostname(), now) {
            Ok(record) => {
                info!("ACK {} to {}", record.addr, msg.format_mac());
                let bytes = encode_reply(
                    MessageType::Ack,
                    record.addr,
                    msg,
                    &record.net,
                    ReplyKind::Lease,
                );
                Some(Reply::broadcast(bytes))
            }
            Err(error) => {
                warn!(mac = %msg.format_mac(), %error, "REQUEST does not match an offer");
                None
            }
        }
    } else {
        // Renewing: the client already holds an address.
        match pool.renew(msg.ciaddr, now) {
            Ok(record) => {
                info!("ACK {} to {} (renewal)", record.addr, msg.format_mac());
                let bytes = encode_reply(
                    MessageType::Ack,
                    record.addr,
                    msg,
                    &record.net,
                    ReplyKind::Lease,
                );
                Some(Reply::broadcast(bytes))
            }
            Err(error) => {
                warn!(mac = %msg.format_mac(), %error, "NAK, no lease to renew");
                let bytes = encode_reply(
                    MessageType::Nak,
                    Ipv4Addr::UNSPECIFIED,
                    msg,
                    ctx,
                    ReplyKind::InfoOnly,
                );
                Some(Reply::broadcast(bytes))
            }
        }
    }
}

fn handle_decline(msg: &DhcpMessage, pool: &mut LeasePool) -> Option<Reply> {
    // A DECLINE carries the conflicted address in option 50 with ciaddr
    // zero; fall back to ciaddr for clients that set it anyway.
    let declined = msg.requested_ip().or_else(|| {
        (msg.ciaddr != Ipv4Addr::UNSPECIFIED).then_some(msg.ciaddr)
    });

    let Some(ip) = declined else {
        warn!(mac = %msg.format_mac(), "DECLINE without an address");
        return None;
    };

    if pool.decline(ip) {
        warn!("DECLINE from {} for {}, address withdrawn", msg.format_mac(), ip);
    } else {
        warn!(
            "DECLINE from {} for unbound {}, ignored",
            msg.format_mac(),
            ip
        );
    }
    None
}

fn handle_release(msg: &DhcpMessage, pool: &mut LeasePool, ctx: &ServerContext) -> Option<Reply> {
    match msg.server_identifier() {
        Some(server_id) if server_id == ctx.server_ip => {}
        _ => {
            info!("RELEASE from {} not addressed to us", msg.format_mac());
            return None;
        }
    }

    if pool.release(msg.ciaddr, msg.mac()) {
        info!("RELEASE from {} for {}", msg.format_mac(), msg.ciaddr);
    }
    None
}

fn handle_inform(msg: &DhcpMessage, pool: &LeasePool, ctx: &ServerContext) -> Option<Reply> {
    // Configuration only: yiaddr stays zero even for a bound client.
    // The reply is answered either way; an info-only ACK carries
    // nothing lease-specific, so the lookup only shapes the log line.
    let bytes = encode_reply(
        MessageType::Ack,
        Ipv4Addr::UNSPECIFIED,
        msg,
        ctx,
        ReplyKind::InfoOnly,
    );
    match pool.find_by_ip_and_state(msg.ciaddr, LeaseState::Leased) {
        Some(record) => info!(
            "INFORM response to {} (leased {})",
            msg.format_mac(),
            record.addr
        ),
        None => info!(
            "INFORM response to {}, no matching lease",
            msg.format_mac()
        ),
    }
    if msg.ciaddr != Ipv4Addr::UNSPECIFIED {
        Some(Reply::unicast(bytes, msg.ciaddr))
    } else {
        Some(Reply::broadcast(bytes))
    }
}

/// Sweeps expired bindings; the server loop calls this on every tick.
pub fn sweep_expired(pool: &mut LeasePool, now: Instant) {
    let freed = pool.sweep(now);
    if freed > 0 {
        info!(freed, "Expired bindings reclaimed");
    }
}
