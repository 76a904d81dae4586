//! Presence tracker — live member count per room.
//!
//! The room actor reports every admission and eviction here and
//! broadcasts the frame it gets back. The payload is always the
//! post-transition member count, never a delta. The last published
//! count is also readable from outside the actor for health reporting.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::frame::{Frame, Presence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Joined,
    Left,
}

#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    published: Arc<AtomicUsize>,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently published member count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.published.load(Ordering::Acquire)
    }

    /// Publish `members` as the new count and build the frame announcing it.
    pub fn record(&self, transition: Transition, members: usize, client_id: &str) -> Frame {
        self.published.store(members, Ordering::Release);
        let payload = Presence { count: members, client_id: Some(client_id.to_string()) };
        match transition {
            Transition::Joined => Frame::UserJoined(payload),
            Transition::Left => Frame::UserLeft(payload),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_publishes_count_and_names_transition() {
        let tracker = PresenceTracker::new();
        assert_eq!(tracker.count(), 0);

        let joined = tracker.record(Transition::Joined, 2, "a");
        assert_eq!(joined, Frame::UserJoined(Presence { count: 2, client_id: Some("a".into()) }));
        assert_eq!(tracker.count(), 2);

        let left = tracker.record(Transition::Left, 1, "b");
        assert_eq!(left.kind(), "user_left");
        assert_eq!(tracker.count(), 1);
    }

    #[test]
    fn clones_share_the_published_count() {
        let tracker = PresenceTracker::new();
        let reader = tracker.clone();
        tracker.record(Transition::Joined, 5, "a");
        assert_eq!(reader.count(), 5);
    }
}
