//! # The Brig
//!
//! The intrusion detector: a process-wide map of misbehaving client
//! keys with TTL expiry, plus the probe that decides whether a missed
//! path looks like vulnerability scanning.
//!
//! ## Overview
//!
//! A key is `"{address}_{reason}"`, e.g. `10.0.0.9_vuln_seeking`. While
//! a key is jailed the dispatcher drops that client's connections
//! without reading a byte. Entries expire on a monotonic deadline;
//! expired entries are evicted lazily on lookup and in bulk by a
//! background sweeper coroutine.
//!
//! Disabled entirely by `IS_THE_BRIG_ENABLED=false`: every predicate
//! answers `false` and jailing is a no-op, so the rest of the server
//! needs no conditional logic of its own.

use crate::config::ServerConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Process-wide jail of suspicious client keys.
pub struct TheBrig {
    enabled: bool,
    jail: RwLock<HashMap<String, Instant>>,
    suspicious_paths: Vec<String>,
}

impl TheBrig {
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            enabled: config.is_the_brig_enabled,
            jail: RwLock::new(HashMap::new()),
            suspicious_paths: config
                .suspicious_paths
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Jail `key` for `duration` from now, extending any existing
    /// sentence. No-op while the brig is disabled.
    pub fn send_to_jail(&self, key: &str, duration: Duration) {
        if !self.enabled {
            return;
        }
        let deadline = Instant::now() + duration;
        let mut jail = self.jail.write().unwrap();
        jail.insert(key.to_string(), deadline);
        info!(
            key = %key,
            duration_ms = duration.as_millis() as u64,
            population = jail.len(),
            "client sent to jail"
        );
    }

    /// Whether `key` is currently jailed. An expired entry is evicted
    /// on the spot and reported as free.
    #[must_use]
    pub fn is_in_jail(&self, key: &str) -> bool {
        if !self.enabled {
            return false;
        }
        {
            let jail = self.jail.read().unwrap();
            match jail.get(key) {
                Some(deadline) if Instant::now() < *deadline => return true,
                Some(_) => {}
                None => return false,
            }
        }
        // the entry has expired: evict it under the write lock
        let mut jail = self.jail.write().unwrap();
        if let Some(deadline) = jail.get(key).copied() {
            // the sentence may have been extended since the read lock dropped
            if Instant::now() < deadline {
                return true;
            }
            jail.remove(key);
            debug!(key = %key, "expired jail entry evicted");
        }
        false
    }

    /// Whether a requested path contains any honeypot token. Always
    /// `false` while the brig is disabled.
    #[must_use]
    pub fn is_looking_for_suspicious_paths(&self, path: &str) -> bool {
        if !self.enabled {
            return false;
        }
        let path = path.to_lowercase();
        self.suspicious_paths.iter().any(|t| path.contains(t))
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut jail = self.jail.write().unwrap();
        let before = jail.len();
        jail.retain(|_, deadline| *deadline > now);
        before - jail.len()
    }

    /// Number of currently jailed keys, expired entries included until
    /// the next sweep.
    #[must_use]
    pub fn population(&self) -> usize {
        self.jail.read().unwrap().len()
    }

    /// Spawn the background sweeper. It runs until the server process
    /// cancels it at shutdown.
    ///
    /// # Safety
    ///
    /// Calls `may::coroutine::Builder::spawn`, which is unsafe in the
    /// `may` runtime; the caller must have the coroutine runtime
    /// initialized, which `may` does on first use.
    pub fn start_sweeper(
        brig: Arc<TheBrig>,
        interval: Duration,
    ) -> std::io::Result<may::coroutine::JoinHandle<()>> {
        unsafe {
            may::coroutine::Builder::new()
                .name("brig-sweeper".to_string())
                .stack_size(0x8000)
                .spawn(move || loop {
                    may::coroutine::sleep(interval);
                    let evicted = brig.sweep();
                    if evicted > 0 {
                        debug!(evicted, population = brig.population(), "jail sweep");
                    }
                })
        }
        .map_err(std::io::Error::other)
    }
}
