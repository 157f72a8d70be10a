//! DHCP packet parsing and encoding per RFC 2131.
//!
//! A DHCP packet consists of a fixed 236-byte header followed by a 4-byte
//! magic cookie and variable-length options. This module handles decoding
//! incoming datagrams and constructing reply buffers.
//!
//! # Packet Structure
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     op (1)    |   htype (1)   |   hlen (1)    |   hops (1)    |
//! +---------------+---------------+---------------+---------------+
//! |                            xid (4)                            |
//! +-------------------------------+-------------------------------+
//! |           secs (2)            |           flags (2)           |
//! +-------------------------------+-------------------------------+
//! |                          ciaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          yiaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          siaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          giaddr (4)                           |
//! +---------------------------------------------------------------+
//! |                          chaddr (16)                          |
//! +---------------------------------------------------------------+
//! |                          sname (64)                           |
//! +---------------------------------------------------------------+
//! |                          file (128)                           |
//! +---------------------------------------------------------------+
//! |                    magic cookie (4) = 99.130.83.99            |
//! +---------------------------------------------------------------+
//! |                          options (variable)                   |
//! +---------------------------------------------------------------+
//! ```
//!
//! # References
//!
//! - RFC 2131: Dynamic Host Configuration Protocol

use std::net::Ipv4Addr;

use crate::config::ServerContext;
use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType, OptionCode, OverloadFlag};

/// DHCP magic cookie that identifies DHCP packets (vs BOOTP).
pub const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];

const DHCP_CHADDR_OFFSET: usize = 28;
const DHCP_CHADDR_SIZE: usize = 16;
const DHCP_SNAME_OFFSET: usize = 44;
const DHCP_SNAME_SIZE: usize = 64;
const DHCP_FILE_OFFSET: usize = 108;
const DHCP_FILE_SIZE: usize = 128;
const DHCP_MAGIC_COOKIE_OFFSET: usize = 236;

/// Size of the fixed header portion including magic cookie.
pub const DHCP_FIXED_HEADER_SIZE: usize = DHCP_MAGIC_COOKIE_OFFSET + DHCP_MAGIC_COOKIE.len();

/// Minimum DHCP packet size per RFC 2131 §2.
///
/// Replies are padded to 300 bytes for compatibility with BOOTP
/// relay agents.
pub const DHCP_MIN_PACKET_SIZE: usize = 300;

/// BOOTP/DHCP operation code for client requests.
pub const BOOTREQUEST: u8 = 1;

/// BOOTP/DHCP operation code for server replies.
pub const BOOTREPLY: u8 = 2;

/// Hardware type for Ethernet (most common).
pub const HTYPE_ETHERNET: u8 = 1;

/// Hardware address length for Ethernet (6 bytes).
pub const HLEN_ETHERNET: u8 = 6;

/// Whether a reply carries an address binding or configuration only.
///
/// Lease replies (OFFER, ACK of a REQUEST) include the lease time
/// option; info-only replies (NAK, INFORM ACK) omit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Reply binds an address: options 53, 54, 51, 1, 3, 6.
    Lease,
    /// Configuration-only reply: options 53, 54, 1, 3, 6.
    InfoOnly,
}

/// A decoded DHCP message.
///
/// Represents an incoming client request. Replies are not modeled as a
/// struct; [`encode_reply`] writes them directly from the request and
/// the server's network context.
#[derive(Debug, Clone)]
pub struct DhcpMessage {
    /// Operation code: [`BOOTREQUEST`] (1) or [`BOOTREPLY`] (2).
    pub op: u8,

    /// Hardware address type. [`HTYPE_ETHERNET`] (1) for Ethernet.
    pub htype: u8,

    /// Hardware address length. [`HLEN_ETHERNET`] (6) for Ethernet.
    pub hlen: u8,

    /// Hop count, incremented by relay agents.
    pub hops: u8,

    /// Transaction ID chosen by client, echoed in replies.
    pub xid: u32,

    /// Seconds elapsed since client began address acquisition.
    pub secs: u16,

    /// Flags. Bit 15 (0x8000) = broadcast flag.
    pub flags: u16,

    /// Client IP address (set by client in RENEWING/REBINDING states).
    pub ciaddr: Ipv4Addr,

    /// "Your" IP address - the address being assigned to the client.
    pub yiaddr: Ipv4Addr,

    /// Server IP address (next server in BOOTP, or DHCP server).
    pub siaddr: Ipv4Addr,

    /// Gateway IP address - set by relay agents.
    pub giaddr: Ipv4Addr,

    /// Client hardware address (MAC for Ethernet).
    pub chaddr: [u8; 16],

    /// Server host name (or option overflow area if Option 52 is set).
    pub sname: [u8; 64],

    /// Boot file name (or option overflow area if Option 52 is set).
    pub file: [u8; 128],

    /// Recognized DHCP options decoded from the packet.
    pub options: Vec<DhcpOption>,
}

impl DhcpMessage {
    /// Decodes a DHCP message from raw bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::Truncated`] if the datagram is shorter than 240 bytes
    ///   (fixed header + magic cookie)
    /// - [`Error::InvalidMagicCookie`] if bytes 236..240 are not 99.130.83.99
    /// - [`Error::OptionOverrun`] if an option's declared length runs past
    ///   the end of the buffer
    /// - [`Error::InvalidOption`] if a recognized option's payload is the
    ///   wrong shape
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < DHCP_FIXED_HEADER_SIZE {
            return Err(Error::Truncated(data.len()));
        }

        if data[DHCP_MAGIC_COOKIE_OFFSET..DHCP_FIXED_HEADER_SIZE] != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidMagicCookie);
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; DHCP_CHADDR_SIZE];
        chaddr.copy_from_slice(&data[DHCP_CHADDR_OFFSET..DHCP_CHADDR_OFFSET + DHCP_CHADDR_SIZE]);

        let mut sname = [0u8; DHCP_SNAME_SIZE];
        sname.copy_from_slice(&data[DHCP_SNAME_OFFSET..DHCP_SNAME_OFFSET + DHCP_SNAME_SIZE]);

        let mut file = [0u8; DHCP_FILE_SIZE];
        file.copy_from_slice(&data[DHCP_FILE_OFFSET..DHCP_FILE_OFFSET + DHCP_FILE_SIZE]);

        let mut options = Self::decode_options(&data[DHCP_FIXED_HEADER_SIZE..])?;

        let overload = options.iter().find_map(|opt| {
            if let DhcpOption::OptionOverload(flag) = opt {
                Some(*flag)
            } else {
                None
            }
        });

        if let Some(flag) = overload {
            if matches!(flag, OverloadFlag::File | OverloadFlag::Both) {
                options.extend(Self::decode_options(&file)?);
            }
            if matches!(flag, OverloadFlag::Sname | OverloadFlag::Both) {
                options.extend(Self::decode_options(&sname)?);
            }
        }

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Decodes the TLV option area.
    ///
    /// The declared length is checked against the remaining bytes before
    /// the value is touched; unrecognized codes are skipped with the
    /// cursor still advancing by the declared length.
    fn decode_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::OptionOverrun {
                    code,
                    declared: 1,
                    remaining: 0,
                });
            }

            let declared = data[index + 1] as usize;
            let remaining = data.len() - index - 2;
            if declared > remaining {
                return Err(Error::OptionOverrun {
                    code,
                    declared,
                    remaining,
                });
            }

            let option_data = &data[index + 2..index + 2 + declared];
            if let Some(option) = DhcpOption::parse(code, option_data)? {
                options.push(option);
            }

            index += 2 + declared;
        }

        Ok(options)
    }

    /// Returns the DHCP message type (Option 53) if present.
    ///
    /// Returns `None` for BOOTP packets which don't have this option.
    pub fn message_type(&self) -> Option<MessageType> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::MessageType(t) => Some(*t),
            _ => None,
        })
    }

    /// Returns the requested IP address (Option 50) if present.
    ///
    /// Clients include this in DISCOVER to request a specific IP,
    /// and in REQUEST to confirm the offered IP.
    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::RequestedIpAddress(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Returns the server identifier (Option 54) if present.
    ///
    /// Clients include this in REQUEST to indicate which server's
    /// offer they are accepting, and in RELEASE to address the server.
    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::ServerIdentifier(ip) => Some(*ip),
            _ => None,
        })
    }

    /// Returns the client hostname (Option 12) if present.
    pub fn hostname(&self) -> Option<&str> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::Hostname(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Returns the maximum DHCP message size (Option 57) if present.
    pub fn max_message_size(&self) -> Option<u16> {
        self.options.iter().find_map(|opt| match opt {
            DhcpOption::MaxMessageSize(size) => Some(*size),
            _ => None,
        })
    }

    /// Returns the first six bytes of the client hardware address.
    ///
    /// Lease records bind Ethernet-sized addresses; shorter hardware
    /// addresses are zero-padded on the wire already.
    pub fn mac(&self) -> [u8; 6] {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&self.chaddr[..6]);
        mac
    }

    /// Formats the client hardware address as a colon-separated string.
    ///
    /// For Ethernet, returns format like "aa:bb:cc:dd:ee:ff".
    pub fn format_mac(&self) -> String {
        use std::fmt::Write;
        let len = (self.hlen as usize).min(self.chaddr.len());
        let mut result = String::with_capacity(len * 3);
        for (index, byte) in self.chaddr[..len].iter().enumerate() {
            if index > 0 {
                result.push(':');
            }
            let _ = write!(result, "{:02x}", byte);
        }
        result
    }

    /// Returns true if the broadcast flag (bit 15) is set.
    ///
    /// When set, servers must broadcast replies instead of unicasting.
    pub fn is_broadcast(&self) -> bool {
        (self.flags & 0x8000) != 0
    }
}

/// Encodes a server reply for the given request.
///
/// The header echoes htype/hlen/hops/xid/secs/flags and chaddr from the
/// request; op is always [`BOOTREPLY`], `yiaddr` is `reply_ip` (zero for
/// info-only replies with no binding), and ciaddr/siaddr/giaddr are zero.
///
/// Options are written in a fixed order so replies are byte-comparable:
/// message type (53), server identifier (54), lease time (51, lease
/// replies only), subnet mask (1), router (3), DNS servers (6), then the
/// end marker. The buffer is padded to the 300-byte RFC 2131 minimum.
pub fn encode_reply(
    message_type: MessageType,
    reply_ip: Ipv4Addr,
    request: &DhcpMessage,
    ctx: &ServerContext,
    kind: ReplyKind,
) -> Vec<u8> {
    let mut packet = Vec::with_capacity(DHCP_MIN_PACKET_SIZE);

    packet.push(BOOTREPLY);
    packet.push(request.htype);
    packet.push(request.hlen);
    packet.push(request.hops);

    packet.extend_from_slice(&request.xid.to_be_bytes());
    packet.extend_from_slice(&request.secs.to_be_bytes());
    packet.extend_from_slice(&request.flags.to_be_bytes());

    packet.extend_from_slice(&Ipv4Addr::UNSPECIFIED.octets());
    packet.extend_from_slice(&reply_ip.octets());
    packet.extend_from_slice(&Ipv4Addr::UNSPECIFIED.octets());
    packet.extend_from_slice(&Ipv4Addr::UNSPECIFIED.octets());

    packet.extend_from_slice(&request.chaddr);
    packet.extend_from_slice(&[0u8; DHCP_SNAME_SIZE]);
    packet.extend_from_slice(&[0u8; DHCP_FILE_SIZE]);

    packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

    packet.extend_from_slice(&DhcpOption::MessageType(message_type).encode());
    packet.extend_from_slice(&DhcpOption::ServerIdentifier(ctx.server_ip).encode());
    if kind == ReplyKind::Lease {
        packet.extend_from_slice(&DhcpOption::LeaseTime(ctx.lease_secs).encode());
    }
    packet.extend_from_slice(&DhcpOption::SubnetMask(ctx.netmask).encode());
    packet.extend_from_slice(&DhcpOption::Router(vec![ctx.gateway]).encode());
    packet.extend_from_slice(&DhcpOption::DnsServer(ctx.dns_servers()).encode());

    packet.push(OptionCode::End as u8);

    while packet.len() < DHCP_MIN_PACKET_SIZE {
        packet.push(0);
    }

    packet
}
