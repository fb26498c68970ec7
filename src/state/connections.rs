//! Live WebSocket connections keyed by room and username.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::mpsc;

use crate::dto::events::ServerEvent;

#[derive(Clone)]
/// Handle used to push events to a connected player.
pub struct PlayerConnection {
    /// Distinguishes a reconnect from the socket it replaced.
    pub id: u64,
    /// Outbound queue drained by the socket's writer task.
    pub tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Registry resolving `(room, username)` to a live connection.
///
/// Entries are created when a socket identifies itself and removed when it closes or
/// when the room is torn down.
#[derive(Default)]
pub struct ConnectionRegistry {
    rooms: DashMap<String, IndexMap<String, PlayerConnection>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection, replacing any previous socket of the same player.
    pub fn register(
        &self,
        room_id: &str,
        username: &str,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.rooms
            .entry(room_id.to_owned())
            .or_default()
            .insert(username.to_owned(), PlayerConnection { id, tx });
        id
    }

    /// Remove a connection unless it was already replaced by a newer one.
    pub fn unregister(&self, room_id: &str, username: &str, connection_id: u64) {
        let mut now_empty = false;
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            if members
                .get(username)
                .is_some_and(|connection| connection.id == connection_id)
            {
                members.shift_remove(username);
            }
            now_empty = members.is_empty();
        }
        if now_empty {
            self.rooms.remove_if(room_id, |_, members| members.is_empty());
        }
    }

    /// Current connection of `username` in the room, if they are online.
    pub fn resolve(&self, room_id: &str, username: &str) -> Option<PlayerConnection> {
        self.rooms
            .get(room_id)
            .and_then(|members| members.get(username).cloned())
    }

    /// Snapshot of every live connection of a room, in connection order.
    pub fn room_connections(&self, room_id: &str) -> Vec<(String, PlayerConnection)> {
        self.rooms
            .get(room_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(username, connection)| (username.clone(), connection.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop a player's connection if the channel is closed.
    pub fn prune(&self, room_id: &str, username: &str) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            if members
                .get(username)
                .is_some_and(|connection| connection.tx.is_closed())
            {
                members.shift_remove(username);
            }
        }
    }

    /// Number of live sockets across every room.
    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|members| members.len()).sum()
    }

    /// Forget every connection of a room.
    pub fn remove_room(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_is_not_removed_by_stale_socket() {
        let registry = ConnectionRegistry::new();
        let (first_tx, _first_rx) = mpsc::unbounded_channel();
        let (second_tx, _second_rx) = mpsc::unbounded_channel();

        let first = registry.register("ROOM01", "alice", first_tx);
        let second = registry.register("ROOM01", "alice", second_tx);

        registry.unregister("ROOM01", "alice", first);
        assert_eq!(registry.resolve("ROOM01", "alice").map(|c| c.id), Some(second));

        registry.unregister("ROOM01", "alice", second);
        assert!(registry.resolve("ROOM01", "alice").is_none());
        assert!(registry.room_connections("ROOM01").is_empty());
    }

    #[test]
    fn prune_drops_closed_channels_only() {
        let registry = ConnectionRegistry::new();
        let (alice_tx, alice_rx) = mpsc::unbounded_channel();
        let (bob_tx, _bob_rx) = mpsc::unbounded_channel();
        registry.register("ROOM01", "alice", alice_tx);
        registry.register("ROOM01", "bob", bob_tx);

        drop(alice_rx);
        registry.prune("ROOM01", "alice");
        registry.prune("ROOM01", "bob");

        let names: Vec<_> = registry
            .room_connections("ROOM01")
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["bob".to_string()]);
    }
}
