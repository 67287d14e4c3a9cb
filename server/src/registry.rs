use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// One worker's routable address, shared by every country it serves.
/// Replacing a crashed worker rewrites the address in place, so every
/// country of the slot flips to the new worker with a single write.
type Slot = Arc<RwLock<SocketAddr>>;

/// Maps countries to the worker that owns their shard, plus the roster
/// of all live worker slots for fan-out queries.
///
/// The country map and the roster have independent locks; lookups on
/// one shard never contend with registrations on another.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    by_country: DashMap<String, Slot>,
    roster: Mutex<Vec<Slot>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh worker at `addr` serving `countries`. All the
    /// countries share one slot.
    pub fn register(&self, addr: SocketAddr, countries: &[String]) {
        let slot: Slot = Arc::new(RwLock::new(addr));
        for country in countries {
            self.by_country
                .entry(country.clone())
                .or_insert_with(|| slot.clone());
        }
        self.roster.lock().push(slot);
        info!(%addr, countries = countries.len(), "registered worker");
    }

    /// Point the slot that owns `country` at a replacement address.
    /// Every other country of the same slot follows automatically.
    pub fn patch(&self, country: &str, addr: SocketAddr) -> bool {
        match self.by_country.get(country) {
            Some(slot) => {
                *slot.write() = addr;
                info!(country, %addr, "patched worker slot");
                true
            }
            None => false,
        }
    }

    /// Current address of the worker owning `country`.
    pub fn lookup(&self, country: &str) -> Option<SocketAddr> {
        self.by_country.get(country).map(|slot| *slot.read())
    }

    /// Current address of every registered worker, for fan-out queries.
    pub fn workers(&self) -> Vec<SocketAddr> {
        self.roster.lock().iter().map(|slot| *slot.read()).collect()
    }

    pub fn worker_count(&self) -> usize {
        self.roster.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn countries(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn patch_moves_every_country_of_the_slot() {
        let registry = WorkerRegistry::new();
        registry.register(addr(9001), &countries(&["Spain", "Peru", "Chile"]));
        registry.register(addr(9002), &countries(&["Kenya"]));

        assert!(registry.patch("Peru", addr(9100)));

        // One write via one country repoints all three.
        assert_eq!(registry.lookup("Spain"), Some(addr(9100)));
        assert_eq!(registry.lookup("Peru"), Some(addr(9100)));
        assert_eq!(registry.lookup("Chile"), Some(addr(9100)));
        // The other slot is untouched.
        assert_eq!(registry.lookup("Kenya"), Some(addr(9002)));

        // The roster sees the patched address too.
        let mut workers = registry.workers();
        workers.sort();
        assert_eq!(workers, vec![addr(9002), addr(9100)]);
    }

    #[test]
    fn unknown_countries_miss() {
        let registry = WorkerRegistry::new();
        registry.register(addr(9001), &countries(&["Spain"]));

        assert_eq!(registry.lookup("Atlantis"), None);
        assert!(!registry.patch("Atlantis", addr(9100)));
        assert_eq!(registry.worker_count(), 1);
    }
}
