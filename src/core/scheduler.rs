//! Admission control
//!
//! Bounds how many jobs hold a worker slot at once. Jobs that arrive while
//! every slot is taken wait in FIFO order and are handed the slot of the
//! next job that finishes.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Outcome of asking for a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A slot was taken; the job may start now
    Admitted,
    /// No slot free; the job waits at this 1-based queue position
    Queued { position: usize },
}

#[derive(Debug, Default)]
struct SlotState {
    running: usize,
    waiting: VecDeque<String>,
}

/// Counting slot pool with a FIFO wait queue
#[derive(Debug)]
pub struct AdmissionQueue {
    capacity: usize,
    state: Mutex<SlotState>,
}

impl AdmissionQueue {
    /// Pool of `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Take a slot for `id` or append it to the wait queue
    ///
    /// The check and the increment happen under one lock, so simultaneous
    /// callers can never over-admit.
    pub fn admit_or_enqueue(&self, id: &str) -> Admission {
        let mut state = self.state.lock();
        if state.running < self.capacity {
            state.running += 1;
            Admission::Admitted
        } else {
            state.waiting.push_back(id.to_string());
            Admission::Queued {
                position: state.waiting.len(),
            }
        }
    }

    /// Give up a slot
    ///
    /// When a job is waiting the slot passes straight to it and its id is
    /// returned; the caller must start that job or release again.
    pub fn release(&self) -> Option<String> {
        let mut state = self.state.lock();
        match state.waiting.pop_front() {
            Some(next) => Some(next),
            None => {
                state.running = state.running.saturating_sub(1);
                None
            }
        }
    }

    /// Drop `id` from the wait queue; false if it was not waiting
    pub fn remove_waiting(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        match state.waiting.iter().position(|w| w == id) {
            Some(idx) => {
                state.waiting.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Slots in use
    pub fn running(&self) -> usize {
        self.state.lock().running
    }

    /// Jobs waiting for a slot
    pub fn waiting(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Total slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
