//! Monotonic aggregate counters derived from the alert stream.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::alert::Alert;
use crate::fanout::{AlertSubscriber, SubscriberError};
use crate::protocol_constants::{CRITICAL_COUNTER, KIND_COUNTER_PREFIX};

/// Named counters that only ever grow within a session.
///
/// Each increment runs under the owning `DashMap` shard lock, so concurrent
/// increments of the same name never lose updates.
#[derive(Debug, Default)]
pub struct AggregateCounters {
    counts: DashMap<String, u64>,
}

impl AggregateCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one to `name` and returns the new value.
    pub fn increment(&self, name: &str) -> u64 {
        let mut count = self.counts.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Current value of `name`; 0 if it was never incremented.
    #[must_use]
    pub fn read(&self, name: &str) -> u64 {
        self.counts.get(name).map(|count| *count).unwrap_or(0)
    }

    /// All counters, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    /// Drops every counter back to zero. Only used at session boundaries.
    pub fn reset(&self) {
        self.counts.clear();
    }
}

/// Every alert counts as critical; each kind also gets its own counter.
#[async_trait]
impl AlertSubscriber for AggregateCounters {
    fn name(&self) -> &str {
        "counters"
    }

    async fn on_alert(&self, alert: Arc<Alert>) -> Result<(), SubscriberError> {
        let critical = self.increment(CRITICAL_COUNTER);
        self.increment(&format!("{}{}", KIND_COUNTER_PREFIX, alert.kind()));
        log::debug!("[Counters] {} -> critical={}", alert, critical);
        Ok(())
    }

    async fn on_reset(&self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn unknown_counter_reads_zero() {
        let counters = AggregateCounters::new();
        assert_eq!(counters.read("critical"), 0);
    }

    #[test]
    fn k_increments_read_k() {
        let counters = AggregateCounters::new();
        let mut last = 0;
        for _ in 0..7 {
            let value = counters.increment("critical");
            assert!(value > last);
            last = value;
        }
        assert_eq!(counters.read("critical"), 7);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let counters = Arc::new(AggregateCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counters = Arc::clone(&counters);
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        counters.increment("critical");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counters.read("critical"), 8_000);
    }

    #[tokio::test]
    async fn alerts_bump_critical_and_kind_counters() {
        let counters = AggregateCounters::new();
        for (kind, location) in [("weapon", "gate"), ("crowd-surge", "lobby"), ("weapon", "gate")] {
            let alert = Arc::new(Alert::new(kind, location).unwrap());
            counters.on_alert(alert).await.unwrap();
        }

        assert_eq!(counters.read("critical"), 3);
        assert_eq!(counters.read("kind:weapon"), 2);
        assert_eq!(counters.read("kind:crowd-surge"), 1);

        let snapshot = counters.snapshot();
        assert_eq!(
            snapshot.keys().collect::<Vec<_>>(),
            vec!["critical", "kind:crowd-surge", "kind:weapon"]
        );
    }

    #[test]
    fn reset_returns_counters_to_zero() {
        let counters = AggregateCounters::new();
        counters.increment("critical");
        counters.reset();
        assert_eq!(counters.read("critical"), 0);
    }
}
