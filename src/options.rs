//! DHCP options as defined in RFC 2132.
//!
//! DHCP uses options to convey configuration parameters between servers and
//! clients. Each option has a code (1 byte), length (1 byte), and
//! variable-length data.
//!
//! This module implements parsing and encoding for the options this server
//! acts on. Codes outside that set decode to `None` and are skipped by the
//! caller; the cursor still advances by the declared length, so a packet
//! full of exotic options parses cleanly.
//!
//! # References
//!
//! - RFC 2132: DHCP Options and BOOTP Vendor Extensions

use std::net::Ipv4Addr;

use crate::error::{Error, Result};

/// Maximum number of DNS server addresses retained from Option 6.
///
/// The reply format carries at most a primary and a secondary resolver,
/// so anything past the second address is dropped at parse time.
const MAX_DNS_SERVERS: usize = 2;

/// DHCP option codes as defined in RFC 2132.
///
/// Only codes this server acts on are defined; anything else is skipped
/// during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    /// Padding (no operation). Used for alignment.
    Pad = 0,
    /// Subnet mask (RFC 2132 §3.3).
    SubnetMask = 1,
    /// Router/gateway addresses (RFC 2132 §3.5).
    Router = 3,
    /// DNS server addresses (RFC 2132 §3.8).
    DnsServer = 6,
    /// Client hostname (RFC 2132 §3.14).
    Hostname = 12,
    /// Domain name for DNS resolution (RFC 2132 §3.17).
    DomainName = 15,
    /// Broadcast address (RFC 2132 §5.3).
    BroadcastAddress = 28,
    /// Classful static routes (RFC 2132 §5.8).
    StaticRoute = 33,
    /// Requested IP address (RFC 2132 §9.1).
    RequestedIpAddress = 50,
    /// IP address lease time in seconds (RFC 2132 §9.2).
    LeaseTime = 51,
    /// Option overload - indicates sname/file fields contain options (RFC 2132 §9.3).
    OptionOverload = 52,
    /// DHCP message type (RFC 2132 §9.6).
    MessageType = 53,
    /// Server identifier (RFC 2132 §9.7).
    ServerIdentifier = 54,
    /// Parameter request list (RFC 2132 §9.8).
    ParameterRequestList = 55,
    /// Error message text (RFC 2132 §9.9).
    Message = 56,
    /// Maximum DHCP message size (RFC 2132 §9.10).
    MaxMessageSize = 57,
    /// Renewal time T1 (RFC 2132 §9.11).
    RenewalTime = 58,
    /// Rebinding time T2 (RFC 2132 §9.12).
    RebindingTime = 59,
    /// Vendor class identifier (RFC 2132 §9.13).
    VendorClassId = 60,
    /// Client identifier (RFC 2132 §9.14).
    ClientIdentifier = 61,
    /// TFTP server name (RFC 2132 §9.4).
    TftpServerName = 66,
    /// Bootfile name (RFC 2132 §9.5).
    BootfileName = 67,
    /// End of options marker.
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DnsServer),
            12 => Ok(Self::Hostname),
            15 => Ok(Self::DomainName),
            28 => Ok(Self::BroadcastAddress),
            33 => Ok(Self::StaticRoute),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            52 => Ok(Self::OptionOverload),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            56 => Ok(Self::Message),
            57 => Ok(Self::MaxMessageSize),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            60 => Ok(Self::VendorClassId),
            61 => Ok(Self::ClientIdentifier),
            66 => Ok(Self::TftpServerName),
            67 => Ok(Self::BootfileName),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

/// DHCP message types (Option 53) as defined in RFC 2132 §9.6.
///
/// These values indicate the purpose of a DHCP message in the protocol exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Client broadcast to locate servers.
    Discover = 1,
    /// Server response to DISCOVER with IP offer.
    Offer = 2,
    /// Client request for offered parameters.
    Request = 3,
    /// Client indicates address is already in use.
    Decline = 4,
    /// Server acknowledgement with configuration.
    Ack = 5,
    /// Server negative acknowledgement.
    Nak = 6,
    /// Client releases IP address.
    Release = 7,
    /// Client requests config without IP allocation.
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// Option overload flags (Option 52) as defined in RFC 2132 §9.3.
///
/// Indicates that the `sname` and/or `file` fields in the DHCP packet
/// header contain DHCP options instead of their normal content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OverloadFlag {
    /// The `file` field contains options.
    File = 1,
    /// The `sname` field contains options.
    Sname = 2,
    /// Both `file` and `sname` fields contain options.
    Both = 3,
}

impl TryFrom<u8> for OverloadFlag {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::File),
            2 => Ok(Self::Sname),
            3 => Ok(Self::Both),
            other => Err(other),
        }
    }
}

/// A parsed DHCP option.
///
/// Each variant corresponds to a specific option code from RFC 2132.
/// This is a closed set: [`parse`](Self::parse) returns `Ok(None)` for
/// codes outside it, and the packet parser skips them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    /// Subnet mask (Option 1).
    SubnetMask(Ipv4Addr),
    /// Router/gateway addresses (Option 3). First address is the default gateway.
    Router(Vec<Ipv4Addr>),
    /// DNS server addresses (Option 6). At most two are retained.
    DnsServer(Vec<Ipv4Addr>),
    /// Client hostname (Option 12).
    Hostname(String),
    /// Domain name for client DNS resolution (Option 15).
    DomainName(String),
    /// Broadcast address (Option 28).
    BroadcastAddress(Ipv4Addr),
    /// Classful static routes as (destination, router) pairs (Option 33).
    /// Accepted for well-formedness but otherwise unused.
    StaticRoute(Vec<(Ipv4Addr, Ipv4Addr)>),
    /// Client's requested IP address (Option 50).
    RequestedIpAddress(Ipv4Addr),
    /// Lease time in seconds (Option 51).
    LeaseTime(u32),
    /// Indicates sname/file fields contain options (Option 52).
    OptionOverload(OverloadFlag),
    /// DHCP message type (Option 53).
    MessageType(MessageType),
    /// Server identifier - IP of the DHCP server (Option 54).
    ServerIdentifier(Ipv4Addr),
    /// List of option codes the client wants (Option 55).
    ParameterRequestList(Vec<u8>),
    /// Human-readable error text, used in NAK/DECLINE (Option 56).
    Message(String),
    /// Maximum DHCP message size the sender accepts (Option 57).
    MaxMessageSize(u16),
    /// Renewal time T1 in seconds (Option 58).
    RenewalTime(u32),
    /// Rebinding time T2 in seconds (Option 59).
    RebindingTime(u32),
    /// Vendor class identifier (Option 60).
    VendorClassId(String),
    /// Client identifier for unique identification (Option 61).
    ClientIdentifier(Vec<u8>),
    /// TFTP server name for netboot (Option 66).
    TftpServerName(String),
    /// Bootfile name for netboot (Option 67).
    BootfileName(String),
}

fn addr4(data: &[u8]) -> Ipv4Addr {
    Ipv4Addr::new(data[0], data[1], data[2], data[3])
}

impl DhcpOption {
    /// Returns the RFC 2132 option code for this option.
    pub fn option_code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::DnsServer(_) => OptionCode::DnsServer as u8,
            Self::Hostname(_) => OptionCode::Hostname as u8,
            Self::DomainName(_) => OptionCode::DomainName as u8,
            Self::BroadcastAddress(_) => OptionCode::BroadcastAddress as u8,
            Self::StaticRoute(_) => OptionCode::StaticRoute as u8,
            Self::RequestedIpAddress(_) => OptionCode::RequestedIpAddress as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::OptionOverload(_) => OptionCode::OptionOverload as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::ParameterRequestList(_) => OptionCode::ParameterRequestList as u8,
            Self::Message(_) => OptionCode::Message as u8,
            Self::MaxMessageSize(_) => OptionCode::MaxMessageSize as u8,
            Self::RenewalTime(_) => OptionCode::RenewalTime as u8,
            Self::RebindingTime(_) => OptionCode::RebindingTime as u8,
            Self::VendorClassId(_) => OptionCode::VendorClassId as u8,
            Self::ClientIdentifier(_) => OptionCode::ClientIdentifier as u8,
            Self::TftpServerName(_) => OptionCode::TftpServerName as u8,
            Self::BootfileName(_) => OptionCode::BootfileName as u8,
        }
    }

    /// Parses a DHCP option from its code and raw data.
    ///
    /// Returns `Ok(None)` for codes outside the recognized set so the
    /// caller can skip them without failing the whole packet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] if the data length is invalid for
    /// the option type (e.g., subnet mask must be exactly 4 bytes).
    pub fn parse(code: u8, data: &[u8]) -> Result<Option<Self>> {
        let invalid = |reason| Err(Error::InvalidOption { code, reason });
        let known = match OptionCode::try_from(code) {
            Ok(known) => known,
            Err(_) => return Ok(None),
        };
        match known {
            OptionCode::SubnetMask => {
                if data.len() != 4 {
                    return invalid("subnet mask must be 4 bytes");
                }
                Ok(Some(Self::SubnetMask(addr4(data))))
            }
            OptionCode::Router => {
                if !data.len().is_multiple_of(4) || data.is_empty() {
                    return invalid("router list must be a non-empty multiple of 4 bytes");
                }
                let routers: Vec<Ipv4Addr> = data.chunks_exact(4).map(addr4).collect();
                Ok(Some(Self::Router(routers)))
            }
            OptionCode::DnsServer => {
                if !data.len().is_multiple_of(4) || data.is_empty() {
                    return invalid("DNS server list must be a non-empty multiple of 4 bytes");
                }
                let servers: Vec<Ipv4Addr> = data
                    .chunks_exact(4)
                    .take(MAX_DNS_SERVERS)
                    .map(addr4)
                    .collect();
                Ok(Some(Self::DnsServer(servers)))
            }
            OptionCode::Hostname => {
                let name = String::from_utf8_lossy(data).to_string();
                Ok(Some(Self::Hostname(name)))
            }
            OptionCode::DomainName => {
                let name = String::from_utf8_lossy(data).to_string();
                Ok(Some(Self::DomainName(name)))
            }
            OptionCode::BroadcastAddress => {
                if data.len() != 4 {
                    return invalid("broadcast address must be 4 bytes");
                }
                Ok(Some(Self::BroadcastAddress(addr4(data))))
            }
            OptionCode::StaticRoute => {
                if !data.len().is_multiple_of(8) || data.is_empty() {
                    return invalid("static route list must be a non-empty multiple of 8 bytes");
                }
                let routes: Vec<(Ipv4Addr, Ipv4Addr)> = data
                    .chunks_exact(8)
                    .map(|chunk| (addr4(&chunk[..4]), addr4(&chunk[4..])))
                    .collect();
                Ok(Some(Self::StaticRoute(routes)))
            }
            OptionCode::RequestedIpAddress => {
                if data.len() != 4 {
                    return invalid("requested IP address must be 4 bytes");
                }
                Ok(Some(Self::RequestedIpAddress(addr4(data))))
            }
            OptionCode::LeaseTime => {
                if data.len() != 4 {
                    return invalid("lease time must be 4 bytes");
                }
                let time = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                Ok(Some(Self::LeaseTime(time)))
            }
            OptionCode::OptionOverload => {
                if data.len() != 1 {
                    return invalid("option overload must be 1 byte");
                }
                let flag = OverloadFlag::try_from(data[0])
                    .map_err(|_| Error::InvalidOption { code, reason: "unknown overload flag" })?;
                Ok(Some(Self::OptionOverload(flag)))
            }
            OptionCode::MessageType => {
                if data.len() != 1 {
                    return invalid("message type must be 1 byte");
                }
                let msg_type = MessageType::try_from(data[0])
                    .map_err(|_| Error::InvalidOption { code, reason: "unknown message type" })?;
                Ok(Some(Self::MessageType(msg_type)))
            }
            OptionCode::ServerIdentifier => {
                if data.len() != 4 {
                    return invalid("server identifier must be 4 bytes");
                }
                Ok(Some(Self::ServerIdentifier(addr4(data))))
            }
            OptionCode::ParameterRequestList => {
                Ok(Some(Self::ParameterRequestList(data.to_vec())))
            }
            OptionCode::Message => {
                let text = String::from_utf8_lossy(data).to_string();
                Ok(Some(Self::Message(text)))
            }
            OptionCode::MaxMessageSize => {
                if data.len() != 2 {
                    return invalid("max message size must be 2 bytes");
                }
                let size = u16::from_be_bytes([data[0], data[1]]);
                Ok(Some(Self::MaxMessageSize(size)))
            }
            OptionCode::RenewalTime => {
                if data.len() != 4 {
                    return invalid("renewal time must be 4 bytes");
                }
                let time = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                Ok(Some(Self::RenewalTime(time)))
            }
            OptionCode::RebindingTime => {
                if data.len() != 4 {
                    return invalid("rebinding time must be 4 bytes");
                }
                let time = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
                Ok(Some(Self::RebindingTime(time)))
            }
            OptionCode::VendorClassId => {
                let id = String::from_utf8_lossy(data).to_string();
                Ok(Some(Self::VendorClassId(id)))
            }
            OptionCode::ClientIdentifier => Ok(Some(Self::ClientIdentifier(data.to_vec()))),
            OptionCode::TftpServerName => {
                let name = String::from_utf8_lossy(data).to_string();
                Ok(Some(Self::TftpServerName(name)))
            }
            OptionCode::BootfileName => {
                let name = String::from_utf8_lossy(data).to_string();
                Ok(Some(Self::BootfileName(name)))
            }
            OptionCode::Pad | OptionCode::End => {
                invalid("Pad/End are markers, not options")
            }
        }
    }

    /// Encodes the option to its wire format (code + length + data).
    ///
    /// The returned bytes can be directly appended to a DHCP packet's
    /// options section.
    pub fn encode(&self) -> Vec<u8> {
        fn string_option(code: OptionCode, text: &str) -> Vec<u8> {
            let bytes = text.as_bytes();
            let len = bytes.len().min(255);
            let mut result = vec![code as u8, len as u8];
            result.extend_from_slice(&bytes[..len]);
            result
        }

        match self {
            Self::SubnetMask(addr) => {
                let mut result = vec![OptionCode::SubnetMask as u8, 4];
                result.extend_from_slice(&addr.octets());
                result
            }
            Self::Router(addrs) => {
                let mut result = vec![OptionCode::Router as u8, (addrs.len() * 4) as u8];
                for addr in addrs {
                    result.extend_from_slice(&addr.octets());
                }
                result
            }
            Self::DnsServer(addrs) => {
                let count = addrs.len().min(MAX_DNS_SERVERS);
                let mut result = vec![OptionCode::DnsServer as u8, (count * 4) as u8];
                for addr in addrs.iter().take(count) {
                    result.extend_from_slice(&addr.octets());
                }
                result
            }
            Self::Hostname(name) => string_option(OptionCode::Hostname, name),
            Self::DomainName(name) => string_option(OptionCode::DomainName, name),
            Self::BroadcastAddress(addr) => {
                let mut result = vec![OptionCode::BroadcastAddress as u8, 4];
                result.extend_from_slice(&addr.octets());
                result
            }
            Self::StaticRoute(routes) => {
                let mut result = vec![OptionCode::StaticRoute as u8, (routes.len() * 8) as u8];
                for (dest, router) in routes {
                    result.extend_from_slice(&dest.octets());
                    result.extend_from_slice(&router.octets());
                }
                result
            }
            Self::RequestedIpAddress(addr) => {
                let mut result = vec![OptionCode::RequestedIpAddress as u8, 4];
                result.extend_from_slice(&addr.octets());
                result
            }
            Self::LeaseTime(time) => {
                let mut result = vec![OptionCode::LeaseTime as u8, 4];
                result.extend_from_slice(&time.to_be_bytes());
                result
            }
            Self::OptionOverload(flag) => {
                vec![OptionCode::OptionOverload as u8, 1, *flag as u8]
            }
            Self::MessageType(msg_type) => {
                vec![OptionCode::MessageType as u8, 1, *msg_type as u8]
            }
            Self::ServerIdentifier(addr) => {
                let mut result = vec![OptionCode::ServerIdentifier as u8, 4];
                result.extend_from_slice(&addr.octets());
                result
            }
            Self::ParameterRequestList(params) => {
                let len = params.len().min(255);
                let mut result = vec![OptionCode::ParameterRequestList as u8, len as u8];
                result.extend_from_slice(&params[..len]);
                result
            }
            Self::Message(text) => string_option(OptionCode::Message, text),
            Self::MaxMessageSize(size) => {
                let mut result = vec![OptionCode::MaxMessageSize as u8, 2];
                result.extend_from_slice(&size.to_be_bytes());
                result
            }
            Self::RenewalTime(time) => {
                let mut result = vec![OptionCode::RenewalTime as u8, 4];
                result.extend_from_slice(&time.to_be_bytes());
                result
            }
            Self::RebindingTime(time) => {
                let mut result = vec![OptionCode::RebindingTime as u8, 4];
                result.extend_from_slice(&time.to_be_bytes());
                result
            }
            Self::VendorClassId(id) => string_option(OptionCode::VendorClassId, id),
            Self::ClientIdentifier(data) => {
                let len = data.len().min(255);
                let mut result = vec![OptionCode::ClientIdentifier as u8, len as u8];
                result.extend_from_slice(&data[..len]);
                result
            }
            Self::TftpServerName(name) => string_option(OptionCode::TftpServerName, name),
            Self::BootfileName(name) => string_option(OptionCode::BootfileName, name),
        }
    }
}
