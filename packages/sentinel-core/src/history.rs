//! Bounded, most-recent-first alert history.
//!
//! Two instances exist per controller: the recent-alerts feed and the
//! notification tray. Both are fed by the fan-out and read by presentation
//! code through [`BoundedHistory::snapshot`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::alert::Alert;
use crate::fanout::{AlertSubscriber, SubscriberError};

/// Fixed-capacity ring of alerts, newest at the head.
///
/// # Concurrency design
///
/// Insertion and tail eviction happen under one write lock, so no reader can
/// ever observe `capacity + 1` entries. Readers copy the `Arc` handles out
/// under a short read lock and never hold a reference into the buffer.
pub struct BoundedHistory {
    name: &'static str,
    capacity: usize,
    entries: RwLock<VecDeque<Arc<Alert>>>,
}

impl BoundedHistory {
    /// Creates an empty history. `name` identifies the store in logs and stats.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    /// Inserts an alert at the head, evicting the oldest entry when full.
    ///
    /// Returns the evicted alert, if any.
    pub fn push(&self, alert: Arc<Alert>) -> Option<Arc<Alert>> {
        let mut entries = self.entries.write();
        entries.push_front(alert);
        if entries.len() > self.capacity {
            entries.pop_back()
        } else {
            None
        }
    }

    /// Returns the current contents, most recent first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Alert>> {
        self.entries.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Empties the history. Only used at session boundaries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl AlertSubscriber for BoundedHistory {
    fn name(&self) -> &str {
        self.name
    }

    async fn on_alert(&self, alert: Arc<Alert>) -> Result<(), SubscriberError> {
        if let Some(evicted) = self.push(alert) {
            log::trace!("[History:{}] Evicted {}", self.name, evicted);
        }
        Ok(())
    }

    async fn on_reset(&self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn numbered(n: usize) -> Arc<Alert> {
        Arc::new(Alert::new("weapon", format!("cam-{}", n)).unwrap())
    }

    fn locations(history: &BoundedHistory) -> Vec<String> {
        history
            .snapshot()
            .iter()
            .map(|a| a.location().to_string())
            .collect()
    }

    #[test]
    fn newest_alert_is_at_the_head() {
        let history = BoundedHistory::new("recent", 100);
        history.push(numbered(1));
        history.push(numbered(2));

        assert_eq!(locations(&history), vec!["cam-2", "cam-1"]);
    }

    #[test]
    fn tray_of_ten_keeps_the_last_ten_of_fifteen() {
        let tray = BoundedHistory::new("notifications", 10);
        for n in 1..=15 {
            tray.push(numbered(n));
        }

        let expected: Vec<String> = (6..=15).rev().map(|n| format!("cam-{}", n)).collect();
        assert_eq!(tray.len(), 10);
        assert_eq!(locations(&tray), expected);
    }

    #[test]
    fn push_returns_evicted_tail() {
        let history = BoundedHistory::new("recent", 2);
        assert!(history.push(numbered(1)).is_none());
        assert!(history.push(numbered(2)).is_none());

        let evicted = history.push(numbered(3)).unwrap();
        assert_eq!(evicted.location(), "cam-1");
    }

    #[test]
    fn stores_share_the_same_alert_handle() {
        let feed = BoundedHistory::new("recent", 100);
        let tray = BoundedHistory::new("notifications", 10);
        let alert = numbered(1);

        feed.push(Arc::clone(&alert));
        tray.push(Arc::clone(&alert));

        assert!(Arc::ptr_eq(&feed.snapshot()[0], &tray.snapshot()[0]));
    }

    #[test]
    fn snapshot_is_detached_from_later_pushes() {
        let history = BoundedHistory::new("recent", 3);
        history.push(numbered(1));
        let before = history.snapshot();
        history.push(numbered(2));

        assert_eq!(before.len(), 1);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn concurrent_readers_never_see_more_than_capacity() {
        let history = Arc::new(BoundedHistory::new("recent", 5));

        let writer = {
            let history = Arc::clone(&history);
            thread::spawn(move || {
                for n in 0..2_000 {
                    history.push(numbered(n));
                }
            })
        };
        let reader = {
            let history = Arc::clone(&history);
            thread::spawn(move || {
                for _ in 0..2_000 {
                    assert!(history.snapshot().len() <= 5);
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn clear_empties_the_store() {
        let history = BoundedHistory::new("recent", 3);
        history.push(numbered(1));
        history.clear();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn subscriber_impl_pushes() {
        let history = BoundedHistory::new("recent", 3);
        history.on_alert(numbered(1)).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
