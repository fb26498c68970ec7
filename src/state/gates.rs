//! Per-room mutexes serializing player actions and phase deadlines.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-room mutex serializing every state-changing handler of that room.
///
/// Rooms never share a gate, so a slow transition in one room cannot delay another.
#[derive(Default)]
pub struct RoomGates {
    gates: DashMap<String, Arc<Mutex<()>>>,
}

impl RoomGates {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the room.
    pub async fn lock(&self, room_id: &str) -> OwnedMutexGuard<()> {
        let gate = self
            .gates
            .entry(room_id.to_owned())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        gate.lock_owned().await
    }

    /// Release `guard` and forget the room's gate unless another handler holds or
    /// awaits it.
    pub fn release(&self, room_id: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.gates
            .remove_if(room_id, |_, gate| Arc::strong_count(gate) == 1);
    }
}
