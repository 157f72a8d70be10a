//! Error types for the DHCP server.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

use std::net::Ipv4Addr;

/// Errors that can occur during DHCP server operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File system or network I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config file).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Datagram shorter than the 240-byte fixed header + magic cookie.
    #[error("Packet truncated: {0} bytes (minimum 240)")]
    Truncated(usize),

    /// Bytes 236..240 are not the DHCP magic cookie (99.130.83.99).
    #[error("Invalid magic cookie")]
    InvalidMagicCookie,

    /// An option's declared length runs past the end of the buffer.
    ///
    /// Raised before the option value is interpreted, so a malformed
    /// length can never cause an out-of-bounds read.
    #[error("Option {code} declares {declared} bytes but only {remaining} remain")]
    OptionOverrun {
        code: u8,
        declared: usize,
        remaining: usize,
    },

    /// An option's payload is the wrong shape for its code.
    #[error("Invalid option {code}: {reason}")]
    InvalidOption { code: u8, reason: &'static str },

    /// The configured address range cannot form a pool.
    #[error("Invalid address range: {0}")]
    InvalidRange(String),

    /// Every address in the pool is offered, leased, or prohibited.
    #[error("No free address in pool")]
    PoolExhausted,

    /// No lease record matches the given transaction id or address.
    ///
    /// Returned by `confirm` and `renew`; the dispatcher turns a failed
    /// renew into a NAK.
    #[error("No matching lease for {0}")]
    LeaseNotFound(String),

    /// Invalid server configuration.
    ///
    /// Returned by [`Config::validate`](crate::Config::validate) when the
    /// configuration contains invalid values (e.g., an inverted range).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Socket creation or configuration error.
    ///
    /// Typically occurs when binding to port 67 without root privileges.
    #[error("Socket error: {0}")]
    Socket(String),
}

impl Error {
    pub(crate) fn lease_not_found_ip(ip: Ipv4Addr) -> Self {
        Error::LeaseNotFound(ip.to_string())
    }

    pub(crate) fn lease_not_found_xid(xid: u32) -> Self {
        Error::LeaseNotFound(format!("xid {:#010x}", xid))
    }
}

/// A specialized Result type for DHCP operations.
pub type Result<T> = std::result::Result<T, Error>;
