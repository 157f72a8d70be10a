//! # dhcplet
//!
//! A small DHCP server implementing the core of RFC 2131 (DHCP) and
//! RFC 2132 (DHCP Options): dynamic address assignment, renewal, release,
//! decline handling, and INFORM, over a fixed in-memory address pool.
//!
//! The server is deliberately single-threaded and synchronous. One loop
//! owns the socket and the pool; the blocking receive carries a timeout
//! that doubles as the lease-expiry sweep tick, so there are no locks
//! and no background tasks.
//!
//! ## Quick Start
//!
//! ```no_run
//! use dhcplet::{Config, DhcpServer};
//!
//! fn main() -> dhcplet::Result<()> {
//!     let config = Config::load_or_create("config.json")?;
//!     let mut server = DhcpServer::new(config)?;
//!     server.run()
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`DhcpMessage`] - wire decode of client datagrams; replies are
//!   encoded directly by [`packet::encode_reply`]
//! - [`LeasePool`] - per-address state machine over the configured range
//! - [`dispatcher::dispatch`] - socket-free protocol core mapping one
//!   message to pool transitions and a routed reply
//! - [`DhcpServer`] - the UDP loop on port 67
//! - [`Config`] - JSON configuration and the derived network context

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod options;
pub mod packet;
pub mod pool;
pub mod server;

pub use config::{Config, ServerContext};
pub use error::{Error, Result};
pub use options::{DhcpOption, MessageType};
pub use packet::DhcpMessage;
pub use pool::{LeasePool, LeaseRecord, LeaseState};
pub use server::DhcpServer;
