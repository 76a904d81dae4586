//! Connection registry — identity, room membership and room lookup.
//!
//! DESIGN
//! ======
//! The registry owns the set of live connections and the flat room
//! namespace. Rooms are spawned lazily on first admission and kept for the
//! life of the process, so a canvas survives everyone leaving.
//!
//! A connection's outbound sink is handed to its room on admission; the
//! room's subscriber list is the only holder. Dropping it there (eviction,
//! replacement, dispatcher failure) closes the connection's queue, which
//! ends its task.
//!
//! Identity collisions resolve as last-admitted-wins: the older
//! connection is evicted from its room and replaced. Every admission gets
//! a fresh session id, so a stale connection releasing itself later can
//! never evict its replacement.
//!
//! The `connections` lock is only held to read or swap entries, never
//! while a room command is queued. Admissions that share an id take turns
//! on a per-id mutex so their room commands arrive in admission order;
//! admissions under other ids, and every release, proceed independently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::services::dispatch::Sink;
use crate::services::room::{RoomError, RoomHandle};

/// Client-chosen or server-assigned connection identity.
pub type ConnectionId = String;

pub type RoomId = String;

/// Longest accepted connection id or room name.
pub const MAX_IDENT_LEN: usize = 64;

/// A live, admitted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub session: Uuid,
    pub room: RoomId,
}

pub struct Registry {
    default_room: RoomId,
    room_queue_capacity: usize,
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    /// One turn per id with an admission in flight.
    admitting: Mutex<HashMap<ConnectionId, Arc<Mutex<()>>>>,
}

/// Ids and room names: 1-64 chars of `[A-Za-z0-9_.-]`.
#[must_use]
pub fn is_valid_ident(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_IDENT_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}

impl Registry {
    #[must_use]
    pub fn new(default_room: impl Into<RoomId>, room_queue_capacity: usize) -> Self {
        Self {
            default_room: default_room.into(),
            room_queue_capacity,
            rooms: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            admitting: Mutex::new(HashMap::new()),
        }
    }

    /// Admit a connection into a room.
    ///
    /// An absent or invalid candidate id gets a generated UUID; an absent or
    /// invalid room name maps to the default room. The room queues the
    /// `init` snapshot on `sink` and announces the new member.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Stopped` if the room actor is gone, or
    /// `RoomError::Refused` if the room rejects `sink`. Either way nothing is
    /// registered under the new session; a same-room connection it would
    /// have replaced stays registered.
    pub async fn admit(
        &self,
        candidate: Option<&str>,
        room: Option<&str>,
        sink: Sink,
    ) -> Result<(Connection, RoomHandle), RoomError> {
        let id = match candidate.map(str::trim) {
            Some(raw) if is_valid_ident(raw) => raw.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let room_id = match room.map(str::trim) {
            Some(raw) if is_valid_ident(raw) => raw.to_string(),
            _ => self.default_room.clone(),
        };
        let handle = self.room_or_create(&room_id).await;
        let conn = Connection { id: id.clone(), session: Uuid::new_v4(), room: room_id };

        let turn = self.admission_turn(&id).await;
        let guard = turn.lock().await;
        let admitted = self.swap_and_admit(&conn, &handle, sink).await;
        drop(guard);
        self.finish_admission(&id, turn).await;

        admitted.map(|()| (conn, handle))
    }

    async fn swap_and_admit(&self, conn: &Connection, handle: &RoomHandle, sink: Sink) -> Result<(), RoomError> {
        let previous = self.connections.write().await.insert(conn.id.clone(), conn.clone());
        let mut kept = None;
        if let Some(previous) = previous {
            info!(client_id = %conn.id, old_room = %previous.room, room = %conn.room, "replacing live connection with same id");
            if previous.room == conn.room {
                // The Admit below replaces the member in place.
                kept = Some(previous);
            } else if let Err(e) = self.evict_from_room(previous).await {
                warn!(client_id = %conn.id, error = %e, "previous room unavailable during replacement");
            }
        }

        if let Err(e) = handle.admit(conn.id.clone(), conn.session, sink).await {
            let mut connections = self.connections.write().await;
            if connections.get(&conn.id).is_some_and(|current| current.session == conn.session) {
                match kept {
                    Some(previous) => connections.insert(conn.id.clone(), previous),
                    None => connections.remove(&conn.id),
                };
            }
            return Err(e);
        }
        Ok(())
    }

    async fn admission_turn(&self, id: &str) -> Arc<Mutex<()>> {
        let mut admitting = self.admitting.lock().await;
        Arc::clone(admitting.entry(id.to_string()).or_default())
    }

    async fn finish_admission(&self, id: &str, turn: Arc<Mutex<()>>) {
        let mut admitting = self.admitting.lock().await;
        // Waiters clone under this lock, so two holders means nobody is queued behind us.
        if Arc::strong_count(&turn) == 2 {
            admitting.remove(id);
        }
    }

    /// Evict whatever connection currently holds `id`. No-op if none does.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Stopped` if the room actor is gone.
    pub async fn evict(&self, id: &str) -> Result<(), RoomError> {
        let removed = self.connections.write().await.remove(id);
        let Some(conn) = removed else {
            return Ok(());
        };
        self.evict_from_room(conn).await
    }

    /// Evict exactly this connection. No-op if it was already evicted or
    /// has been replaced by a newer connection with the same id.
    ///
    /// # Errors
    ///
    /// Returns `RoomError::Stopped` if the room actor is gone.
    pub async fn release(&self, conn: &Connection) -> Result<(), RoomError> {
        {
            let mut connections = self.connections.write().await;
            match connections.get(&conn.id) {
                Some(current) if current.session == conn.session => {
                    connections.remove(&conn.id);
                }
                _ => return Ok(()),
            }
        }
        self.evict_from_room(conn.clone()).await
    }

    pub async fn lookup(&self, id: &str) -> Option<Connection> {
        self.connections.read().await.get(id).cloned()
    }

    pub async fn room(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    async fn evict_from_room(&self, conn: Connection) -> Result<(), RoomError> {
        if let Some(room) = self.room(&conn.room).await {
            room.evict(conn.id, conn.session).await?;
        }
        Ok(())
    }

    async fn room_or_create(&self, room_id: &str) -> RoomHandle {
        if let Some(handle) = self.room(room_id).await {
            return handle;
        }
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| RoomHandle::spawn(room_id.to_string(), self.room_queue_capacity))
            .clone()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
