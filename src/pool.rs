//! In-memory lease pool.
//!
//! The pool owns one [`LeaseRecord`] per address in the configured range
//! and drives the per-address state machine. Records live in a `Vec` in
//! ascending address order, built once at startup and never resized;
//! auxiliary maps index them by address and by transaction id so the
//! hot-path lookups stay O(1).
//!
//! All time-dependent operations take `now` as an argument, so tests can
//! drive expiry without sleeping. Timers use the monotonic clock.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::ServerContext;
use crate::error::{Error, Result};

/// Upper bound on pool size; a range larger than a /16 is rejected.
pub const MAX_POOL_SIZE: u32 = 65_536;

/// Per-address lease state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Available for allocation.
    Free,
    /// Tentatively assigned to a transaction id, awaiting REQUEST.
    Offered,
    /// Bound to a client with a running expiry timer.
    Leased,
    /// Withdrawn from allocation after a client reported a conflict.
    /// Only an operator action puts the address back in service.
    Prohibited,
    /// Held back for a fixed assignment; never allocated dynamically.
    Reserved,
    /// Timer ran out; transitional, normally swept straight to Free.
    Expired,
}

impl std::fmt::Display for LeaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Offered => write!(f, "offered"),
            Self::Leased => write!(f, "leased"),
            Self::Prohibited => write!(f, "prohibited"),
            Self::Reserved => write!(f, "reserved"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// One address and its binding state.
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    pub state: LeaseState,
    pub addr: Ipv4Addr,
    /// Network parameters captured at pool build; replies for this
    /// address are encoded from this snapshot.
    pub net: ServerContext,
    /// Transaction id of the owning exchange; 0 when unbound.
    pub xid: u32,
    /// Client hardware address; zeroed when unbound.
    pub mac: [u8; 6],
    /// Hostname the client supplied, if any.
    pub hostname: Option<String>,
    acquired_at: Option<Instant>,
}

impl LeaseRecord {
    fn new(addr: Ipv4Addr, net: ServerContext) -> Self {
        Self {
            state: LeaseState::Free,
            addr,
            net,
            xid: 0,
            mac: [0; 6],
            hostname: None,
            acquired_at: None,
        }
    }

    fn clear_binding(&mut self) {
        self.state = LeaseState::Free;
        self.xid = 0;
        self.mac = [0; 6];
        self.hostname = None;
        self.acquired_at = None;
    }

    /// True if the record's timer is running and has outlived the lease.
    fn expired_at(&self, now: Instant) -> bool {
        match self.acquired_at {
            Some(acquired) => {
                now.duration_since(acquired) >= Duration::from_secs(u64::from(self.net.lease_secs))
            }
            None => false,
        }
    }
}

/// Occupancy counts for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub free: usize,
    pub offered: usize,
    pub leased: usize,
    pub prohibited: usize,
    pub reserved: usize,
    pub expired: usize,
}

/// The set of manageable addresses.
pub struct LeasePool {
    records: Vec<LeaseRecord>,
    by_ip: HashMap<Ipv4Addr, usize>,
    by_xid: HashMap<u32, usize>,
}

impl LeasePool {
    /// Builds the pool over the half-open range `[range_start, range_end)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] when the range is empty, inverted,
    /// or larger than [`MAX_POOL_SIZE`] addresses.
    pub fn build(range_start: Ipv4Addr, range_end: Ipv4Addr, ctx: &ServerContext) -> Result<Self> {
        let start = u32::from(range_start);
        let end = u32::from(range_end);

        if start >= end {
            return Err(Error::InvalidRange(format!(
                "{} .. {} is empty or inverted",
                range_start, range_end
            )));
        }
        if end - start > MAX_POOL_SIZE {
            return Err(Error::InvalidRange(format!(
                "{} .. {} spans {} addresses (maximum {})",
                range_start,
                range_end,
                end - start,
                MAX_POOL_SIZE
            )));
        }

        let mut records = Vec::with_capacity((end - start) as usize);
        let mut by_ip = HashMap::with_capacity((end - start) as usize);
        for raw in start..end {
            let addr = Ipv4Addr::from(raw);
            by_ip.insert(addr, records.len());
            records.push(LeaseRecord::new(addr, ctx.clone()));
        }

        info!(
            range_start = %range_start,
            range_end = %range_end,
            size = records.len(),
            "Lease pool built"
        );

        Ok(Self {
            records,
            by_ip,
            by_xid: HashMap::new(),
        })
    }

    /// Offers the first free address, in ascending order, to `xid`.
    ///
    /// Idempotent: a repeated DISCOVER with an already-offered xid gets
    /// the same record back without consuming another address. The offer
    /// timer starts at `now` so abandoned offers are reclaimed by
    /// [`sweep`](Self::sweep).
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolExhausted`] when no record is free.
    pub fn offer(&mut self, xid: u32, now: Instant) -> Result<&LeaseRecord> {
        if let Some(&index) = self.by_xid.get(&xid)
            && self.records[index].state == LeaseState::Offered
        {
            debug!(xid = format_args!("{:#010x}", xid), addr = %self.records[index].addr, "Repeated DISCOVER, re-offering");
            return Ok(&self.records[index]);
        }

        let index = self
            .records
            .iter()
            .position(|record| record.state == LeaseState::Free)
            .ok_or(Error::PoolExhausted)?;

        let record = &mut self.records[index];
        record.state = LeaseState::Offered;
        record.xid = xid;
        record.acquired_at = Some(now);
        self.by_xid.insert(xid, index);

        info!(addr = %record.addr, xid = format_args!("{:#010x}", xid), "Address offered");
        Ok(&self.records[index])
    }

    /// Converts the offer bound to `xid` into a lease.
    ///
    /// Binds the client hardware address, stores the hostname, and
    /// restarts the timer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LeaseNotFound`] when no offered record carries
    /// this xid.
    pub fn confirm(
        &mut self,
        xid: u32,
        mac: [u8; 6],
        hostname: Option<&str>,
        now: Instant,
    ) -> Result<&LeaseRecord> {
        let index = match self.by_xid.get(&xid) {
            Some(&index) if self.records[index].state == LeaseState::Offered => index,
            _ => return Err(Error::lease_not_found_xid(xid)),
        };

        let record = &mut self.records[index];
        record.state = LeaseState::Leased;
        record.mac = mac;
        record.hostname = hostname.map(String::from);
        record.acquired_at = Some(now);

        info!(addr = %record.addr, xid = format_args!("{:#010x}", xid), "Lease confirmed");
        Ok(&self.records[index])
    }

    /// Restarts the timer on an active lease.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LeaseNotFound`] when `ip` is not currently leased;
    /// the caller turns that into a NAK.
    pub fn renew(&mut self, ip: Ipv4Addr, now: Instant) -> Result<&LeaseRecord> {
        let index = match self.by_ip.get(&ip) {
            Some(&index) if self.records[index].state == LeaseState::Leased => index,
            _ => return Err(Error::lease_not_found_ip(ip)),
        };

        let record = &mut self.records[index];
        record.acquired_at = Some(now);

        debug!(addr = %record.addr, "Lease renewed");
        Ok(&self.records[index])
    }

    /// Drops the xid index entry for `index`, but only if it still
    /// resolves there. A client restarting its exchange can reuse the
    /// xid of a still-running lease, which repoints the index at the
    /// new offer; tearing down the old record must not orphan it.
    fn forget_xid(&mut self, index: usize) {
        let xid = self.records[index].xid;
        if self.by_xid.get(&xid) == Some(&index) {
            self.by_xid.remove(&xid);
        }
    }

    /// Frees a lease when both the address and the hardware address match.
    ///
    /// A mismatched or unknown release is a silent no-op; a RELEASE is
    /// client-asserted and never NAKed. Returns whether a lease was freed.
    pub fn release(&mut self, ip: Ipv4Addr, mac: [u8; 6]) -> bool {
        let Some(&index) = self.by_ip.get(&ip) else {
            return false;
        };
        let record = &self.records[index];
        if record.state != LeaseState::Leased || record.mac != mac {
            debug!(addr = %ip, "RELEASE ignored, no matching lease");
            return false;
        }

        self.forget_xid(index);
        self.records[index].clear_binding();
        info!(addr = %ip, "Lease released");
        true
    }

    /// Withdraws an address from allocation after a reported conflict.
    ///
    /// Only a bound record (Offered or Leased) can be withdrawn; a
    /// DECLINE is unauthenticated, and honoring one for a free address
    /// would let a stray client blackhole the pool. The record keeps no
    /// timer, so the sweep never puts it back in service;
    /// [`clear_prohibited`](Self::clear_prohibited) does.
    /// Returns whether a record was marked.
    pub fn decline(&mut self, ip: Ipv4Addr) -> bool {
        let Some(&index) = self.by_ip.get(&ip) else {
            return false;
        };
        if !matches!(
            self.records[index].state,
            LeaseState::Offered | LeaseState::Leased
        ) {
            debug!(addr = %ip, "DECLINE ignored, address not bound");
            return false;
        }

        self.forget_xid(index);
        let record = &mut self.records[index];
        record.clear_binding();
        record.state = LeaseState::Prohibited;

        info!(addr = %ip, "Address prohibited after DECLINE");
        true
    }

    /// Returns a prohibited address to the free set. Operator action.
    pub fn clear_prohibited(&mut self, ip: Ipv4Addr) -> bool {
        let Some(&index) = self.by_ip.get(&ip) else {
            return false;
        };
        let record = &mut self.records[index];
        if record.state != LeaseState::Prohibited {
            return false;
        }
        record.clear_binding();
        info!(addr = %ip, "Prohibited address cleared");
        true
    }

    /// Frees every record whose timer has outlived the lease duration.
    ///
    /// Covers abandoned offers as well as expired leases. Records without
    /// a running timer (Free, Prohibited, Reserved) are untouched.
    /// Returns the number of records freed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let mut freed = 0;
        for index in 0..self.records.len() {
            if !self.records[index].expired_at(now) {
                continue;
            }
            let record = &self.records[index];
            info!(addr = %record.addr, state = %record.state, "Lease expired");
            self.forget_xid(index);
            self.records[index].clear_binding();
            freed += 1;
        }
        freed
    }

    /// Looks up the record bound to a transaction id, if any.
    pub fn find_by_xid(&self, xid: u32) -> Option<&LeaseRecord> {
        self.by_xid.get(&xid).map(|&index| &self.records[index])
    }

    /// Looks up the record for `ip` if it is currently in `state`.
    pub fn find_by_ip_and_state(&self, ip: Ipv4Addr, state: LeaseState) -> Option<&LeaseRecord> {
        self.by_ip
            .get(&ip)
            .map(|&index| &self.records[index])
            .filter(|record| record.state == state)
    }

    /// All records in ascending address order.
    pub fn records(&self) -> &[LeaseRecord] {
        &self.records
    }

    /// Occupancy counts per state.
    pub fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for record in &self.records {
            match record.state {
                LeaseState::Free => stats.free += 1,
                LeaseState::Offered => stats.offered += 1,
                LeaseState::Leased => stats.leased += 1,
                LeaseState::Prohibited => stats.prohibited += 1,
                LeaseState::Reserved => stats.reserved += 1,
                LeaseState::Expired => stats.expired += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_context() -> ServerContext {
        ServerContext {
            server_ip: Ipv4Addr::new(10, 0, 0, 1),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::new(10, 0, 0, 1),
            broadcast: Ipv4Addr::new(10, 0, 0, 255),
            dns1: Ipv4Addr::new(10, 0, 0, 1),
            dns2: None,
            lease_secs: 3600,
            renewal_secs: 1800,
            rebinding_secs: 3150,
        }
    }

    fn small_pool() -> LeasePool {
        LeasePool::build(
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 13),
            &test_context(),
        )
        .unwrap()
    }

    const MAC_A: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01];
    const MAC_B: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02];

    #[test]
    fn test_build_covers_range_in_order() {
        let pool = small_pool();
        let addrs: Vec<Ipv4Addr> = pool.records().iter().map(|r| r.addr).collect();
        assert_eq!(
            addrs,
            vec![
                Ipv4Addr::new(10, 0, 0, 10),
                Ipv4Addr::new(10, 0, 0, 11),
                Ipv4Addr::new(10, 0, 0, 12),
            ]
        );
        assert!(pool.records().iter().all(|r| r.state == LeaseState::Free));
    }

    #[test]
    fn test_build_rejects_bad_ranges() {
        let ctx = test_context();
        assert!(matches!(
            LeasePool::build(
                Ipv4Addr::new(10, 0, 0, 20),
                Ipv4Addr::new(10, 0, 0, 10),
                &ctx
            ),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            LeasePool::build(
                Ipv4Addr::new(10, 0, 0, 10),
                Ipv4Addr::new(10, 0, 0, 10),
                &ctx
            ),
            Err(Error::InvalidRange(_))
        ));
        // A /15 is past the cap.
        assert!(matches!(
            LeasePool::build(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(10, 2, 0, 1), &ctx),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_offer_ascending_and_idempotent() {
        let mut pool = small_pool();
        let now = Instant::now();

        let first = pool.offer(1, now).unwrap().addr;
        assert_eq!(first, Ipv4Addr::new(10, 0, 0, 10));

        // Same xid again: same address, nothing new consumed.
        let again = pool.offer(1, now).unwrap().addr;
        assert_eq!(again, first);
        assert_eq!(pool.stats().offered, 1);

        let second = pool.offer(2, now).unwrap().addr;
        assert_eq!(second, Ipv4Addr::new(10, 0, 0, 11));
    }

    #[test]
    fn test_offer_exhaustion() {
        let mut pool = small_pool();
        let now = Instant::now();
        pool.offer(1, now).unwrap();
        pool.offer(2, now).unwrap();
        pool.offer(3, now).unwrap();
        assert!(matches!(pool.offer(4, now), Err(Error::PoolExhausted)));
    }

    #[test]
    fn test_confirm_requires_exact_xid() {
        let mut pool = small_pool();
        let now = Instant::now();
        pool.offer(7, now).unwrap();

        assert!(matches!(
            pool.confirm(8, MAC_A, None, now),
            Err(Error::LeaseNotFound(_))
        ));
        assert_eq!(pool.stats().leased, 0);

        let record = pool.confirm(7, MAC_A, Some("host-a"), now).unwrap();
        assert_eq!(record.state, LeaseState::Leased);
        assert_eq!(record.mac, MAC_A);
        assert_eq!(record.hostname.as_deref(), Some("host-a"));
    }

    #[test]
    fn test_renew_resets_timer() {
        let mut pool = small_pool();
        let t0 = Instant::now();
        let ip = pool.offer(1, t0).unwrap().addr;
        pool.confirm(1, MAC_A, None, t0).unwrap();

        // Renew at half the lease; at t0 + lease the record must survive.
        let half = t0 + Duration::from_secs(1800);
        pool.renew(ip, half).unwrap();
        pool.sweep(t0 + Duration::from_secs(3600));
        assert!(pool.find_by_ip_and_state(ip, LeaseState::Leased).is_some());

        // A full lease after the renewal it expires.
        pool.sweep(half + Duration::from_secs(3600));
        assert!(pool.find_by_ip_and_state(ip, LeaseState::Free).is_some());
    }

    #[test]
    fn test_renew_unknown_address() {
        let mut pool = small_pool();
        assert!(matches!(
            pool.renew(Ipv4Addr::new(10, 0, 0, 10), Instant::now()),
            Err(Error::LeaseNotFound(_))
        ));
        assert!(matches!(
            pool.renew(Ipv4Addr::new(172, 16, 0, 1), Instant::now()),
            Err(Error::LeaseNotFound(_))
        ));
    }

    #[test]
    fn test_release_requires_matching_mac() {
        let mut pool = small_pool();
        let now = Instant::now();
        let ip = pool.offer(1, now).unwrap().addr;
        pool.confirm(1, MAC_A, None, now).unwrap();

        assert!(!pool.release(ip, MAC_B));
        assert!(pool.find_by_ip_and_state(ip, LeaseState::Leased).is_some());

        assert!(pool.release(ip, MAC_A));
        let record = pool.find_by_ip_and_state(ip, LeaseState::Free).unwrap();
        assert_eq!(record.mac, [0; 6]);
        assert_eq!(record.xid, 0);
        assert!(record.hostname.is_none());
    }

    #[test]
    fn test_xid_reuse_survives_expiry_of_old_lease() {
        let mut pool = small_pool();
        let t0 = Instant::now();
        let leased = pool.offer(1, t0).unwrap().addr;
        pool.confirm(1, MAC_A, None, t0).unwrap();

        // The client restarts its exchange with the same xid while its
        // old lease is still running; the xid index moves to the offer.
        let half = t0 + Duration::from_secs(1800);
        let offered = pool.offer(1, half).unwrap().addr;
        assert_ne!(offered, leased);

        // The old lease expires, but the live offer keeps its index.
        pool.sweep(t0 + Duration::from_secs(3600));
        assert!(
            pool.find_by_ip_and_state(leased, LeaseState::Free)
                .is_some()
        );
        assert_eq!(pool.find_by_xid(1).map(|r| r.addr), Some(offered));

        let record = pool.confirm(1, MAC_A, None, half).unwrap();
        assert_eq!(record.addr, offered);
        assert_eq!(record.state, LeaseState::Leased);
    }

    #[test]
    fn test_release_keeps_reused_xid_index() {
        let mut pool = small_pool();
        let now = Instant::now();
        let leased = pool.offer(1, now).unwrap().addr;
        pool.confirm(1, MAC_A, None, now).unwrap();
        let offered = pool.offer(1, now).unwrap().addr;
        assert_ne!(offered, leased);

        // Releasing the old lease must not drop the offer's xid entry.
        assert!(pool.release(leased, MAC_A));
        assert_eq!(pool.find_by_xid(1).map(|r| r.addr), Some(offered));
        assert!(pool.confirm(1, MAC_A, None, now).is_ok());
    }

    #[test]
    fn test_decline_of_unbound_address_ignored() {
        let mut pool = small_pool();
        let free = Ipv4Addr::new(10, 0, 0, 12);

        assert!(!pool.decline(free));
        assert!(pool.find_by_ip_and_state(free, LeaseState::Free).is_some());
        assert_eq!(pool.stats().prohibited, 0);
    }

    #[test]
    fn test_decline_prohibits_until_cleared() {
        let mut pool = small_pool();
        let now = Instant::now();
        let ip = pool.offer(1, now).unwrap().addr;
        pool.confirm(1, MAC_A, None, now).unwrap();

        assert!(pool.decline(ip));
        assert!(
            pool.find_by_ip_and_state(ip, LeaseState::Prohibited)
                .is_some()
        );

        // The allocator skips it, and the sweep never frees it.
        let next = pool.offer(2, now).unwrap().addr;
        assert_ne!(next, ip);
        pool.sweep(now + Duration::from_secs(1_000_000));
        assert!(
            pool.find_by_ip_and_state(ip, LeaseState::Prohibited)
                .is_some()
        );

        assert!(pool.clear_prohibited(ip));
        assert!(pool.find_by_ip_and_state(ip, LeaseState::Free).is_some());
    }

    #[test]
    fn test_sweep_frees_expired_leases_and_offers() {
        let mut pool = small_pool();
        let t0 = Instant::now();
        let leased = pool.offer(1, t0).unwrap().addr;
        pool.confirm(1, MAC_A, None, t0).unwrap();
        pool.offer(2, t0).unwrap();

        assert_eq!(pool.sweep(t0 + Duration::from_secs(3599)), 0);
        let freed = pool.sweep(t0 + Duration::from_secs(3600));
        assert_eq!(freed, 2);
        assert_eq!(pool.stats().free, 3);

        // Lowest address is handed out again.
        let reused = pool.offer(3, t0).unwrap().addr;
        assert_eq!(reused, leased);
    }

    #[test]
    fn test_stale_xid_forgotten_after_sweep() {
        let mut pool = small_pool();
        let t0 = Instant::now();
        pool.offer(1, t0).unwrap();
        pool.sweep(t0 + Duration::from_secs(3600));

        assert!(pool.find_by_xid(1).is_none());
        assert!(matches!(
            pool.confirm(1, MAC_A, None, t0),
            Err(Error::LeaseNotFound(_))
        ));
    }

    #[test]
    fn test_stats_counts() {
        let mut pool = small_pool();
        let now = Instant::now();
        pool.offer(1, now).unwrap();
        pool.confirm(1, MAC_A, None, now).unwrap();
        pool.offer(2, now).unwrap();
        let declined = pool.offer(3, now).unwrap().addr;
        pool.decline(declined);

        let stats = pool.stats();
        assert_eq!(stats.leased, 1);
        assert_eq!(stats.offered, 1);
        assert_eq!(stats.prohibited, 1);
        assert_eq!(stats.free, 0);
    }
}
