//! Paced value queries
//!
//! After the device enumerates its push-enabled controls, one `$e GS` query is
//! sent per control, spaced by a fixed interval so the unit is not flooded.
//! The whole queue is dropped on teardown.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::state::ControlId;

/// Spacing between consecutive value queries
pub const QUERY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
pub struct QueryScheduler {
    queue: VecDeque<(Instant, ControlId)>,
}

impl QueryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue queries for `controls` in order, the first at `now`
    ///
    /// A batch arriving while another is still draining is appended after it,
    /// keeping the same spacing.
    pub fn schedule(&mut self, controls: &[ControlId], now: Instant) {
        let start = match self.queue.back() {
            Some((last, _)) => (*last + QUERY_INTERVAL).max(now),
            None => now,
        };
        for (index, control) in controls.iter().enumerate() {
            self.queue
                .push_back((start + QUERY_INTERVAL * index as u32, *control));
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.front().map(|(deadline, _)| *deadline)
    }

    /// Remove and return every query due at `now`, in order
    pub fn pop_due(&mut self, now: Instant) -> Vec<ControlId> {
        let mut due = Vec::new();
        while let Some((deadline, control)) = self.queue.front() {
            if *deadline > now {
                break;
            }
            due.push(*control);
            self.queue.pop_front();
        }
        due
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[u32]) -> Vec<ControlId> {
        list.iter().map(|n| ControlId::new(*n).unwrap()).collect()
    }

    #[test]
    fn test_staggered_deadlines() {
        let now = Instant::now();
        let mut scheduler = QueryScheduler::new();
        scheduler.schedule(&ids(&[10, 20, 30]), now);

        assert_eq!(scheduler.next_deadline(), Some(now));
        assert_eq!(scheduler.pop_due(now), ids(&[10]));
        assert!(scheduler.pop_due(now + Duration::from_millis(49)).is_empty());
        assert_eq!(scheduler.pop_due(now + Duration::from_millis(50)), ids(&[20]));
        assert_eq!(scheduler.pop_due(now + Duration::from_millis(500)), ids(&[30]));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_second_batch_appends() {
        let now = Instant::now();
        let mut scheduler = QueryScheduler::new();
        scheduler.schedule(&ids(&[1, 2]), now);
        scheduler.schedule(&ids(&[3]), now);

        assert_eq!(scheduler.len(), 3);
        assert_eq!(scheduler.pop_due(now + Duration::from_millis(99)), ids(&[1, 2]));
        assert_eq!(scheduler.next_deadline(), Some(now + Duration::from_millis(100)));
    }

    #[test]
    fn test_clear_cancels_everything() {
        let now = Instant::now();
        let mut scheduler = QueryScheduler::new();
        scheduler.schedule(&ids(&[1, 2, 3]), now);
        scheduler.clear();
        assert_eq!(scheduler.next_deadline(), None);
        assert!(scheduler.pop_due(now + Duration::from_secs(1)).is_empty());
    }
}
