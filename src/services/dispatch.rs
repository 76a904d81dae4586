//! Broadcast dispatcher — per-room subscriber list and fan-out.
//!
//! DESIGN
//! ======
//! Each member owns a bounded outbound queue drained by its connection
//! task. Fan-out uses `try_send` only, so delivery never waits on a
//! socket: a member whose queue is full or closed is reported back as
//! failed and the caller evicts it. One dead sink therefore costs the
//! other members nothing, and the list is per room, so a failure cannot
//! reach another room.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::frame::Frame;
use crate::services::registry::ConnectionId;

/// Outbound queue of one connection.
pub type Sink = mpsc::Sender<Frame>;

/// Smallest sink a room admits: `init` plus the joiner's own `user_joined`
/// are queued before the connection task starts draining.
pub const MIN_SINK_CAPACITY: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound queue full")]
    Full,
    #[error("outbound queue closed")]
    Closed,
}

/// One admitted connection as seen by its room.
#[derive(Debug)]
pub struct Member {
    /// Distinguishes successive connections that share an id.
    pub session: Uuid,
    pub sink: Sink,
}

#[derive(Debug, Default)]
pub struct Subscribers {
    members: HashMap<ConnectionId, Member>,
}

impl Subscribers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member, returning the one it replaced under the same id.
    pub fn insert(&mut self, id: ConnectionId, member: Member) -> Option<Member> {
        self.members.insert(id, member)
    }

    /// Remove a member. With `Some(session)` only that exact session is removed.
    pub fn remove(&mut self, id: &str, session: Option<Uuid>) -> Option<Member> {
        let current = self.members.get(id)?;
        if session.is_some_and(|s| s != current.session) {
            return None;
        }
        self.members.remove(id)
    }

    #[must_use]
    pub fn is_member(&self, id: &str, session: Uuid) -> bool {
        self.members.get(id).is_some_and(|m| m.session == session)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Deliver a frame to every member except `exclude`.
    /// Returns the ids whose sinks could not take it.
    #[must_use]
    pub fn broadcast(&self, frame: &Frame, exclude: Option<&str>) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        for (id, member) in &self.members {
            if exclude == Some(id.as_str()) {
                continue;
            }
            if let Err(e) = deliver(&member.sink, frame.clone()) {
                tracing::debug!(client_id = %id, kind = frame.kind(), error = %e, "dispatch: delivery failed");
                failed.push(id.clone());
            }
        }
        failed
    }
}

fn deliver(sink: &Sink, frame: Frame) -> Result<(), DeliveryError> {
    sink.try_send(frame).map_err(|e| match e {
        TrySendError::Full(_) => DeliveryError::Full,
        TrySendError::Closed(_) => DeliveryError::Closed,
    })
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
