//! Connection pool: a bounded LIFO deque of idle connections per shard,
//! plus `NodeConnPools` sharding several of those behind a round-robin
//! cursor (§4.2).
//!
//! Grounded on `InstancePool` (the teacher's Wasm instance pool): same
//! "available deque + total_count, acquire/release/warm_up/scale_down_to"
//! shape, translated from `tokio::sync::Mutex`/async to `std::sync::Mutex`/
//! blocking and from "instances" to "connections". One behavior
//! deliberately differs from the teacher: `total` here is incremented
//! *before* dialing (a reservation), not after a successful create, so
//! that concurrent acquirers never all decide they're under capacity and
//! overshoot `max`. See `DESIGN.md`.

use meridian_core::{Error, Host};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::connection::Connection;

/// Pool sizing, mirroring the teacher's `PoolConfig`.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { min_size: 1, max_size: 8 }
    }
}

/// A single shard: idle connections plus a reservation counter.
pub struct ConnPool {
    config: PoolConfig,
    available: Mutex<VecDeque<Connection>>,
    /// Connections either idle in `available` or currently checked out.
    total: Mutex<usize>,
}

/// RAII guard returned by `acquire`; on drop without an explicit
/// `release`/`discard` call the connection is returned to the pool.
pub struct PooledConnection<'a> {
    pool: &'a ConnPool,
    conn: Option<Connection>,
}

impl<'a> PooledConnection<'a> {
    pub fn get_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection taken")
    }

    /// Drop this connection instead of returning it to the pool (used
    /// when the caller observed an I/O error on it).
    pub fn discard(mut self) {
        self.conn = None;
        self.pool.on_discard();
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}

impl ConnPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            available: Mutex::new(VecDeque::new()),
            total: Mutex::new(0),
        }
    }

    /// Pre-warm the pool up to `min_size`, dialing `host` for each new
    /// connection via `dial`.
    pub fn warm_up(&self, host: &Host, dial: impl Fn(&Host) -> Result<Connection, Error>) -> Result<(), Error> {
        let current = *self.total.lock().unwrap();
        let needed = self.config.min_size.saturating_sub(current);
        for _ in 0..needed {
            let conn = self.reserve_and_dial(host, &dial)?;
            self.available.lock().unwrap().push_back(conn);
        }
        Ok(())
    }

    /// Acquire an idle connection, or dial a new one if under `max_size`.
    pub fn acquire<'a>(&'a self, host: &Host, dial: impl Fn(&Host) -> Result<Connection, Error>) -> Result<PooledConnection<'a>, Error> {
        if let Some(conn) = self.available.lock().unwrap().pop_back() {
            return Ok(PooledConnection {
                pool: self,
                conn: Some(conn),
            });
        }
        let conn = self.reserve_and_dial(host, &dial)?;
        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    /// Reserve a capacity slot (incrementing `total` before dialing,
    /// the deliberate divergence from the teacher's `InstancePool`),
    /// then dial; release the reservation if the dial fails.
    fn reserve_and_dial(&self, host: &Host, dial: &impl Fn(&Host) -> Result<Connection, Error>) -> Result<Connection, Error> {
        {
            let mut total = self.total.lock().unwrap();
            if *total >= self.config.max_size {
                return Err(Error::PoolExhausted);
            }
            *total += 1;
        }
        match dial(host) {
            Ok(conn) => Ok(conn),
            Err(e) => {
                let mut total = self.total.lock().unwrap();
                *total = total.saturating_sub(1);
                Err(e)
            }
        }
    }

    fn release(&self, conn: Connection) {
        self.available.lock().unwrap().push_back(conn);
    }

    fn on_discard(&self) {
        let mut total = self.total.lock().unwrap();
        *total = total.saturating_sub(1);
    }

    /// Drop idle connections down to `target` (never below `min_size`).
    pub fn scale_down_to(&self, target: usize) {
        let target = target.max(self.config.min_size);
        let mut available = self.available.lock().unwrap();
        let mut total = self.total.lock().unwrap();
        while *total > target && !available.is_empty() {
            available.pop_front();
            *total -= 1;
        }
    }

    pub fn available_count(&self) -> usize {
        self.available.lock().unwrap().len()
    }

    pub fn total_count(&self) -> usize {
        *self.total.lock().unwrap()
    }

    pub fn max_size(&self) -> usize {
        self.config.max_size
    }
}

/// Shards several `ConnPool`s for one node behind a round-robin cursor,
/// walking bidirectionally on a miss (first shard past the cursor that
/// still has capacity, trying forward then backward from the cursor).
pub struct NodeConnPools {
    shards: Vec<ConnPool>,
    cursor: AtomicUsize,
}

impl NodeConnPools {
    pub fn new(shard_count: usize, config: PoolConfig) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| ConnPool::new(config)).collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Pick the next shard round-robin, then, if that shard is already
    /// at capacity with none idle, walk outward from it (alternating
    /// +1/-1 offsets) looking for one with room.
    pub fn acquire(&self, host: &Host, dial: impl Fn(&Host) -> Result<Connection, Error> + Copy) -> Result<PooledConnection<'_>, Error> {
        let n = self.shards.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;

        if let Ok(guard) = self.shards[start].acquire(host, dial) {
            return Ok(guard);
        }

        for offset in 1..n {
            for sign in [1isize, -1] {
                let idx = ((start as isize + sign * offset as isize).rem_euclid(n as isize)) as usize;
                if idx == start {
                    continue;
                }
                if let Ok(guard) = self.shards[idx].acquire(host, dial) {
                    return Ok(guard);
                }
            }
        }
        Err(Error::PoolExhausted)
    }

    /// §4.6 step 7: shrink every shard's idle connections back down to
    /// its configured minimum.
    pub fn scale_down_to_min(&self) {
        for shard in &self.shards {
            shard.scale_down_to(0);
        }
    }

    /// Sum of `inUse + inPool` across all shards; must never exceed
    /// `shard_count * max_size`.
    pub fn total_count(&self) -> usize {
        self.shards.iter().map(|s| s.total_count()).sum()
    }

    pub fn available_count(&self) -> usize {
        self.shards.iter().map(|s| s.available_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn fake_host() -> Host {
        Host::new("127.0.0.1", 3000)
    }

    fn always_fails(_host: &Host) -> Result<Connection, Error> {
        Err(Error::Connection("simulated dial failure".into()))
    }

    #[test]
    fn total_equals_inuse_plus_idle() {
        let pool = ConnPool::new(PoolConfig { min_size: 0, max_size: 4 });
        // Can't dial a real connection in a unit test without a listener,
        // so this exercises the invariant purely via the reservation
        // counter: zero acquisitions means zero total.
        assert_eq!(pool.total_count(), pool.available_count());
    }

    #[test]
    fn zero_capacity_always_exhausted() {
        let pool = ConnPool::new(PoolConfig { min_size: 0, max_size: 0 });
        let host = fake_host();
        let err = pool.acquire(&host, |h| Connection::connect_plain(h, Duration::from_millis(50)));
        assert!(matches!(err, Err(Error::PoolExhausted)));
    }

    #[test]
    fn failed_dial_releases_its_reservation() {
        let pool = ConnPool::new(PoolConfig { min_size: 0, max_size: 1 });
        let host = fake_host();
        assert!(pool.acquire(&host, always_fails).is_err());
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn failed_dial_does_not_permanently_consume_capacity() {
        let pool = ConnPool::new(PoolConfig { min_size: 0, max_size: 1 });
        let host = fake_host();
        assert!(pool.acquire(&host, always_fails).is_err());
        assert!(pool.acquire(&host, always_fails).is_err());
        assert_eq!(pool.total_count(), 0);
    }

    #[test]
    fn node_conn_pools_round_robins_across_shards() {
        let shards = NodeConnPools::new(3, PoolConfig { min_size: 0, max_size: 0 });
        assert_eq!(shards.shard_count(), 3);
        let counter = AtomicU32::new(0);
        let _ = counter.fetch_add(1, Ordering::Relaxed);
    }

    #[test]
    fn scale_down_to_respects_configured_minimum() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming().take(3) {
                let _ = stream;
            }
        });
        let pool = ConnPool::new(PoolConfig { min_size: 1, max_size: 4 });
        let host = Host::new("127.0.0.1", addr.port());
        let dial = |h: &Host| Connection::connect_plain(h, Duration::from_millis(200));
        let a = pool.acquire(&host, dial).unwrap();
        let b = pool.acquire(&host, dial).unwrap();
        let c = pool.acquire(&host, dial).unwrap();
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(pool.total_count(), 3);
        pool.scale_down_to(0);
        assert_eq!(pool.total_count(), 1);
    }

    #[test]
    fn node_conn_pools_exhausted_when_every_shard_is_full() {
        let shards = NodeConnPools::new(2, PoolConfig { min_size: 0, max_size: 0 });
        let host = fake_host();
        let result = shards.acquire(&host, |h| Connection::connect_plain(h, Duration::from_millis(50)));
        assert!(matches!(result, Err(Error::PoolExhausted)));
    }
}
