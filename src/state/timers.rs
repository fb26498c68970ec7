//! Per-room single-slot scheduler for phase deadlines.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::{task::JoinHandle, time::sleep};
use tracing::debug;

struct TimerSlot {
    token: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn abort(self) {
        if let Some(handle) = self.handle {
            handle.abort();
        }
    }
}

/// Registry holding at most one pending deadline task per room.
///
/// A task claims its slot (removing it) right before running its callback, so a
/// callback that started is never aborted by a later [`PhaseTimers::clear`], and a
/// task whose slot was cleared or replaced does nothing when it wakes up.
#[derive(Default)]
pub struct PhaseTimers {
    slots: Arc<DashMap<String, TimerSlot>>,
    next_token: AtomicU64,
}

impl PhaseTimers {
    /// Registry with no pending deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `callback` after `delay`, replacing any pending deadline of the room.
    pub fn start(&self, room_id: &str, delay: Duration, callback: BoxFuture<'static, ()>) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = self.slots.insert(
            room_id.to_owned(),
            TimerSlot {
                token,
                handle: None,
            },
        ) {
            previous.abort();
        }

        let slots = Arc::clone(&self.slots);
        let room = room_id.to_owned();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            if slots
                .remove_if(&room, |_, slot| slot.token == token)
                .is_none()
            {
                debug!(room_id = %room, token, "deadline superseded before firing");
                return;
            }
            callback.await;
        });

        // the task may already have claimed its slot, or another start may have replaced it
        if let Some(mut slot) = self.slots.get_mut(room_id) {
            if slot.token == token {
                slot.handle = Some(handle);
            }
        }
    }

    /// Cancel the pending deadline of a room. Returns whether one was pending.
    pub fn clear(&self, room_id: &str) -> bool {
        match self.slots.remove(room_id) {
            Some((_, slot)) => {
                slot.abort();
                true
            }
            None => false,
        }
    }

    /// Whether the room has a deadline armed that has not fired yet.
    pub fn is_pending(&self, room_id: &str) -> bool {
        self.slots.contains_key(room_id)
    }

    /// Number of rooms with a pending deadline.
    pub fn pending_count(&self) -> usize {
        self.slots.len()
    }
}
