//! Re-sequencing queue for messages decoded out of order.
//!
//! Hosts that deserialize payloads on worker threads take an id from
//! [`MessageQueue::new_id`] in receive order, then [`push`] the decoded item
//! when its worker finishes. Items come back out strictly in id order.
//!
//! [`push`]: MessageQueue::push

use crate::error::{WireError, WireResult};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug)]
struct QueueState<T> {
    next_id: u64,
    next_undelivered: u64,
    pending: BTreeMap<u64, T>,
}

/// Thread-safe ordered delivery queue.
#[derive(Debug)]
pub struct MessageQueue<T> {
    state: Mutex<QueueState<T>>,
}

impl<T> Default for MessageQueue<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(QueueState {
                next_id: 0,
                next_undelivered: 0,
                pending: BTreeMap::new(),
            }),
        }
    }
}

impl<T> MessageQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id.
    pub fn new_id(&self) -> u64 {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    /// Complete `id` with `item`. Returns every item that is now deliverable,
    /// in id order; empty while an earlier id is still outstanding.
    pub fn push(&self, id: u64, item: T) -> WireResult<Vec<T>> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if id >= state.next_id || id < state.next_undelivered || state.pending.contains_key(&id) {
            return Err(WireError::Protocol(format!(
                "message id {id} was not reserved or is already complete"
            )));
        }
        state.pending.insert(id, item);
        let mut ready = Vec::new();
        loop {
            let next = state.next_undelivered;
            match state.pending.remove(&next) {
                Some(item) => {
                    ready.push(item);
                    state.next_undelivered += 1;
                }
                None => break,
            }
        }
        Ok(ready)
    }

    /// Completed items held back by an earlier outstanding id.
    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .len()
    }
}
