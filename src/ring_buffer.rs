//! Fixed-capacity message ring guarded by a spin lock
//!
//! The lock never sleeps, so it is only ever held for index bookkeeping and
//! reference-count bumps. Allocation happens before the lock is taken and
//! evicted or cleared messages are dropped after it is released.
//!
//! # Layout
//! - `head`: slot the next message is written to
//! - `tail`: slot of the oldest live message
//! - `count`: live messages; `head == (tail + count) % capacity`

use crate::command::ReadMode;
use crate::error::{MailboxError, Result};
use crate::message::Message;
use spin::Mutex;
use std::fmt;
use tracing::{debug, info};

/// Number of messages kept before the oldest is evicted
pub const MAX_ENTRIES: usize = 10;

struct RingState {
    slots: Box<[Option<Message>]>,
    head: usize,
    tail: usize,
    count: usize,
    /// Bumped by every insert and by every clear that drops something
    generation: u64,
    /// Device-wide read mode, kept under the same lock as the slots
    mode: ReadMode,
}

impl RingState {
    fn new(capacity: usize) -> Self {
        Self {
            slots: empty_slots(capacity),
            head: 0,
            tail: 0,
            count: 0,
            generation: 0,
            mode: ReadMode::Normal,
        }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn last(&self) -> Option<Message> {
        if self.count == 0 {
            return None;
        }
        let cap = self.capacity();
        self.slots[(self.head + cap - 1) % cap].clone()
    }

    fn collect_into(&self, out: &mut Vec<Message>) {
        let cap = self.capacity();
        for i in 0..self.count {
            if let Some(msg) = &self.slots[(self.tail + i) % cap] {
                out.push(msg.clone());
            }
        }
    }
}

fn empty_slots(capacity: usize) -> Box<[Option<Message>]> {
    (0..capacity).map(|_| None).collect()
}

/// Point-in-time copy of the live messages, oldest first
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    messages: Vec<Message>,
}

impl Snapshot {
    /// Ring generation the snapshot was taken at
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total bytes across all messages
    pub fn total_len(&self) -> usize {
        self.messages.iter().map(Message::len).sum()
    }

    /// Concatenate the messages back to back, with no separators
    pub fn concat(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.total_len())
            .map_err(|_| MailboxError::OutOfMemory)?;
        for msg in &self.messages {
            out.extend_from_slice(msg.as_bytes());
        }
        Ok(out)
    }
}

/// What a read observed after consuming the device-wide read mode
#[derive(Debug, Clone)]
pub enum View {
    All(Snapshot),
    Last(Option<Message>),
}

/// Circular store of at most `capacity` messages with FIFO eviction
pub struct RingBuffer {
    state: Mutex<RingState>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a ring holding [`MAX_ENTRIES`] messages
    pub fn new() -> Self {
        Self::with_capacity(MAX_ENTRIES)
    }

    /// Create a ring holding `capacity` messages (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(RingState::new(capacity)),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live messages
    pub fn len(&self) -> usize {
        self.state.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current generation; changes whenever the contents change
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Store `msg` as the newest message.
    ///
    /// When the ring is full the oldest message is evicted first and
    /// returned to the caller.
    pub fn insert(&self, msg: Message) -> Option<Message> {
        let len = msg.len();
        let (evicted, stale, generation) = {
            let mut state = self.state.lock();
            let cap = state.capacity();

            let mut evicted = None;
            if state.count == cap {
                let tail = state.tail;
                evicted = state.slots[tail].take();
                state.tail = (tail + 1) % cap;
                state.count -= 1;
            }

            let head = state.head;
            let stale = state.slots[head].replace(msg);
            state.head = (head + 1) % cap;
            state.count += 1;
            state.generation += 1;

            (evicted, stale, state.generation)
        };

        debug_assert!(stale.is_none(), "occupied slot at head");
        drop(stale);

        match &evicted {
            Some(old) => debug!(len, evicted_len = old.len(), generation, "inserted message, evicted oldest"),
            None => debug!(len, generation, "inserted message"),
        }

        evicted
    }

    /// Copy every live message, oldest first
    pub fn snapshot_all(&self) -> Result<Snapshot> {
        let mut messages = Vec::new();
        messages
            .try_reserve_exact(self.capacity)
            .map_err(|_| MailboxError::OutOfMemory)?;

        let state = self.state.lock();
        state.collect_into(&mut messages);
        Ok(Snapshot {
            generation: state.generation,
            messages,
        })
    }

    /// Copy the newest message, if any
    pub fn snapshot_last(&self) -> Option<Message> {
        self.state.lock().last()
    }

    /// Drop every message and reset the cursors. Idempotent.
    pub fn clear(&self) {
        let fresh = empty_slots(self.capacity);
        let (old, dropped) = {
            let mut state = self.state.lock();
            let dropped = state.count;
            if dropped > 0 {
                state.generation += 1;
            }
            state.head = 0;
            state.tail = 0;
            state.count = 0;
            (std::mem::replace(&mut state.slots, fresh), dropped)
        };
        drop(old);

        info!(dropped, "mailbox cleared");
    }

    /// Set the device-wide read mode
    pub fn set_read_mode(&self, mode: ReadMode) {
        self.state.lock().mode = mode;
    }

    /// Make the next [`take_view`](Self::take_view) return only the newest message
    pub fn arm_last_mode(&self) {
        self.set_read_mode(ReadMode::LastOnly);
    }

    pub fn read_mode(&self) -> ReadMode {
        self.state.lock().mode
    }

    /// Consume the read mode and snapshot the view it selects.
    ///
    /// Both happen under one lock acquisition, so a concurrent `LAST` is
    /// either fully observed by this read or left armed for the next one.
    pub fn take_view(&self) -> Result<View> {
        let mut messages = Vec::new();
        messages
            .try_reserve_exact(self.capacity)
            .map_err(|_| MailboxError::OutOfMemory)?;

        let mut state = self.state.lock();
        match std::mem::take(&mut state.mode) {
            ReadMode::LastOnly => Ok(View::Last(state.last())),
            ReadMode::Normal => {
                state.collect_into(&mut messages);
                Ok(View::All(Snapshot {
                    generation: state.generation,
                    messages,
                }))
            }
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let state = self.state.lock();
        let cap = state.capacity();
        assert!(state.count <= cap);
        assert_eq!(state.head, (state.tail + state.count) % cap);
        let occupied = state.slots.iter().filter(|s| s.is_some()).count();
        assert_eq!(occupied, state.count);
        for i in 0..state.count {
            assert!(state.slots[(state.tail + i) % cap].is_some());
        }
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity)
            .field("count", &state.count)
            .field("head", &state.head)
            .field("tail", &state.tail)
            .field("generation", &state.generation)
            .finish()
    }
}
