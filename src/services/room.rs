//! Room actor — single serializing owner of one room's log and members.
//!
//! DESIGN
//! ======
//! Each room runs as one task draining a bounded command queue. Admit,
//! evict, append, clear, relay and snapshot are applied one at a time in
//! arrival order, which makes the order of the queue the room's single
//! total order: every member sees draws and clears exactly as the actor
//! applied them.
//!
//! Applying a command is synchronous. The log is updated first, then the
//! frame is fanned out with `try_send` against the member list as it
//! stands at that moment. No socket I/O happens inside the actor; the
//! connection tasks own their sockets.
//!
//! Commands from a connection that is no longer a member (evicted by the
//! dispatcher, or replaced by a newer connection with the same id) are
//! dropped, so nothing is processed for a connection once it is closing.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{Frame, Stroke};
use crate::services::dispatch::{MIN_SINK_CAPACITY, Member, Sink, Subscribers};
use crate::services::log::StrokeLog;
use crate::services::presence::{PresenceTracker, Transition};
use crate::services::registry::{ConnectionId, RoomId};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room actor stopped: {0}")]
    Stopped(RoomId),
    #[error("room {room} refused connection {id}")]
    Refused { room: RoomId, id: ConnectionId },
}

#[derive(Debug)]
pub enum RoomCommand {
    /// Replies `false` when the sink cannot take `init` and the join notice.
    Admit { id: ConnectionId, session: Uuid, sink: Sink, reply: oneshot::Sender<bool> },
    Evict { id: ConnectionId, session: Uuid },
    Append { from: ConnectionId, session: Uuid, stroke: Stroke },
    Clear { from: ConnectionId, session: Uuid },
    /// Ephemeral frame for the rest of the room. Never touches the log.
    Relay { from: ConnectionId, session: Uuid, frame: Frame },
    Snapshot { reply: oneshot::Sender<Vec<Stroke>> },
}

/// Cloneable handle used to submit commands to a room.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: RoomId,
    tx: mpsc::Sender<RoomCommand>,
    presence: PresenceTracker,
}

// =============================================================================
// HANDLE
// =============================================================================

impl RoomHandle {
    /// Spawn the actor for a new, empty room.
    #[must_use]
    pub fn spawn(id: RoomId, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let presence = PresenceTracker::new();
        let room = Room { id: id.clone(), log: StrokeLog::new(), subscribers: Subscribers::new(), presence: presence.clone() };
        tokio::spawn(room.run(rx));
        info!(room = %id, "room created");
        Self { id, tx, presence }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Member count as of the last presence broadcast.
    #[must_use]
    pub fn members(&self) -> usize {
        self.presence.count()
    }

    /// Admit a connection. The actor queues `init` to the sink before
    /// any later broadcast, then announces the new count to the room.
    ///
    /// # Errors
    ///
    /// `RoomError::Refused` if the sink is smaller than `MIN_SINK_CAPACITY`
    /// or already closed; the connection is then not a member.
    pub async fn admit(&self, id: ConnectionId, session: Uuid, sink: Sink) -> Result<(), RoomError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::Admit { id: id.clone(), session, sink, reply }).await?;
        if rx.await.map_err(|_| self.stopped())? {
            Ok(())
        } else {
            Err(RoomError::Refused { room: self.id.clone(), id })
        }
    }

    pub async fn evict(&self, id: ConnectionId, session: Uuid) -> Result<(), RoomError> {
        self.submit(RoomCommand::Evict { id, session }).await
    }

    pub async fn append(&self, from: ConnectionId, session: Uuid, stroke: Stroke) -> Result<(), RoomError> {
        self.submit(RoomCommand::Append { from, session, stroke }).await
    }

    pub async fn clear(&self, from: ConnectionId, session: Uuid) -> Result<(), RoomError> {
        self.submit(RoomCommand::Clear { from, session }).await
    }

    pub async fn relay(&self, from: ConnectionId, session: Uuid, frame: Frame) -> Result<(), RoomError> {
        self.submit(RoomCommand::Relay { from, session, frame }).await
    }

    /// Current log, ordered after every command submitted before it.
    pub async fn snapshot(&self) -> Result<Vec<Stroke>, RoomError> {
        let (reply, rx) = oneshot::channel();
        self.submit(RoomCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| self.stopped())
    }

    async fn submit(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.tx.send(cmd).await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> RoomError {
        RoomError::Stopped(self.id.clone())
    }
}

// =============================================================================
// ACTOR
// =============================================================================

struct Room {
    id: RoomId,
    log: StrokeLog,
    subscribers: Subscribers,
    presence: PresenceTracker,
}

impl Room {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.apply(cmd);
        }
        debug!(room = %self.id, "room actor stopped");
    }

    fn apply(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Admit { id, session, sink, reply } => {
                let admitted = self.admit(id, session, sink);
                let _ = reply.send(admitted);
            }
            RoomCommand::Evict { id, session } => self.evict(&id, session),
            RoomCommand::Append { from, session, stroke } => {
                if !self.subscribers.is_member(&from, session) {
                    debug!(room = %self.id, client_id = %from, "ignoring draw from non-member");
                    return;
                }
                let seq = self.log.append(stroke.clone());
                debug!(room = %self.id, client_id = %from, seq, strokes = self.log.len(), "stroke appended");
                self.fan_out(&Frame::Draw(stroke), Some(from.as_str()));
            }
            RoomCommand::Clear { from, session } => {
                if !self.subscribers.is_member(&from, session) {
                    debug!(room = %self.id, client_id = %from, "ignoring clear from non-member");
                    return;
                }
                if self.log.is_empty() {
                    debug!(room = %self.id, client_id = %from, "clear on empty canvas");
                }
                let seq = self.log.clear();
                info!(room = %self.id, client_id = %from, seq, "canvas cleared");
                self.fan_out(&Frame::clear(), Some(from.as_str()));
            }
            RoomCommand::Relay { from, session, frame } => {
                if self.subscribers.is_member(&from, session) {
                    self.fan_out(&frame, Some(from.as_str()));
                }
            }
            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.log.snapshot());
            }
        }
    }

    fn admit(&mut self, id: ConnectionId, session: Uuid, sink: Sink) -> bool {
        if sink.max_capacity() < MIN_SINK_CAPACITY {
            warn!(room = %self.id, client_id = %id, capacity = sink.max_capacity(), "outbound queue too small; connection not admitted");
            return false;
        }
        // The queue is fresh, so the snapshot is the first thing it carries.
        let member = Member { session, sink };
        if let Err(e) = member.sink.try_send(Frame::Init(self.log.snapshot())) {
            warn!(room = %self.id, client_id = %id, error = %e, "init not delivered; connection not admitted");
            return false;
        }

        if let Some(replaced) = self.subscribers.insert(id.clone(), member) {
            info!(room = %self.id, client_id = %id, old_session = %replaced.session, "replaced connection with same id");
        }
        info!(room = %self.id, client_id = %id, members = self.subscribers.len(), "client joined room");

        let notice = self.presence.record(Transition::Joined, self.subscribers.len(), &id);
        self.fan_out(&notice, None);
        true
    }

    fn evict(&mut self, id: &str, session: Uuid) {
        if self.subscribers.remove(id, Some(session)).is_none() {
            return;
        }
        info!(room = %self.id, client_id = %id, members = self.subscribers.len(), "client left room");
        let notice = self.presence.record(Transition::Left, self.subscribers.len(), id);
        self.fan_out(&notice, None);
        if self.subscribers.is_empty() {
            info!(room = %self.id, strokes = self.log.len(), "room is now empty");
        }
    }

    /// Broadcast, then evict every member whose sink refused the frame and
    /// announce each eviction. Repeats until a broadcast fails nobody.
    fn fan_out(&mut self, frame: &Frame, exclude: Option<&str>) {
        let mut failed = self.subscribers.broadcast(frame, exclude);
        while let Some(id) = failed.pop() {
            if self.subscribers.remove(&id, None).is_none() {
                continue;
            }
            warn!(room = %self.id, client_id = %id, members = self.subscribers.len(), "evicted unresponsive client");
            let notice = self.presence.record(Transition::Left, self.subscribers.len(), &id);
            failed.extend(self.subscribers.broadcast(&notice, None));
        }
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
