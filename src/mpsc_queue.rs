//! Bounded MPSC (Multiple Producer Single Consumer) request queue
//!
//! Clients (producers) push request frames that the daemon (consumer) pops,
//! without locks, across process boundaries.
//!
//! # Design
//! - Fixed-size slots, each carrying a sequence number
//! - A slot at position `pos` is free for producers when `seq == pos`
//!   and ready for the consumer when `seq == pos + 1`
//! - Producers claim `pos` by CAS on the write index, write, then publish
//! - The consumer copies out and releases the slot for the next lap

use crate::error::{MailboxError, Result};
use std::ptr::addr_of_mut;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Maximum request frame size in bytes
pub const MAX_REQUEST_SIZE: usize = 512;

/// Cache line size
const CACHE_LINE_SIZE: usize = 64;

/// Padding to cache line
#[repr(C, align(64))]
struct CachePadded<T>(T);

/// A single request slot
#[repr(C)]
pub struct RequestSlot {
    /// Lap-tagged position this slot is ready for
    sequence: AtomicU64,
    /// Client that sent the request
    client_id: AtomicU32,
    /// Length of the request frame
    len: AtomicU32,
    _pad: [u8; CACHE_LINE_SIZE - 16],
    /// Frame bytes (separate cache line)
    data: [u8; MAX_REQUEST_SIZE],
}

/// MPSC queue header in shared memory
#[repr(C)]
pub struct MpscQueueHeader {
    /// Next position producers claim
    write_idx: CachePadded<AtomicU64>,
    /// Next position the consumer reads
    read_idx: CachePadded<AtomicU64>,
    num_slots: usize,
    _pad: [u8; CACHE_LINE_SIZE - 8],
}

impl MpscQueueHeader {
    /// Size of the queue in bytes (header + slots)
    pub const fn size_for_slots(num_slots: usize) -> usize {
        std::mem::size_of::<MpscQueueHeader>() + num_slots * std::mem::size_of::<RequestSlot>()
    }

    /// Initialize a new queue header and its slots
    ///
    /// # Safety
    /// Pointer must be valid, properly aligned and followed by room for
    /// `num_slots` slots
    pub unsafe fn init(ptr: *mut Self, num_slots: usize) {
        (*ptr).write_idx.0 = AtomicU64::new(0);
        (*ptr).read_idx.0 = AtomicU64::new(0);
        (*ptr).num_slots = num_slots;

        let slots = slots_of(ptr);
        for i in 0..num_slots {
            let slot = &mut *slots.add(i);
            slot.sequence = AtomicU64::new(i as u64);
            slot.client_id = AtomicU32::new(0);
            slot.len = AtomicU32::new(0);
        }
    }
}

unsafe fn slots_of(header: *const MpscQueueHeader) -> *mut RequestSlot {
    (header as *mut u8).add(std::mem::size_of::<MpscQueueHeader>()) as *mut RequestSlot
}

/// Producer handle for sending requests
pub struct MpscProducer {
    header: *const MpscQueueHeader,
    slots: *mut RequestSlot,
    client_id: u32,
}

// SAFETY: producers only touch slots they claimed through the write index
unsafe impl Send for MpscProducer {}
unsafe impl Sync for MpscProducer {}

impl MpscProducer {
    /// Create a producer from raw pointers
    ///
    /// # Safety
    /// Pointer must be valid and point to an initialized queue
    pub unsafe fn from_raw(header: *const MpscQueueHeader, client_id: u32) -> Self {
        Self {
            header,
            slots: slots_of(header),
            client_id,
        }
    }

    /// Try to push a request frame (non-blocking)
    pub fn try_push(&self, frame: &[u8]) -> Result<()> {
        if frame.len() > MAX_REQUEST_SIZE {
            return Err(MailboxError::InvalidArgument {
                max: MAX_REQUEST_SIZE,
                got: frame.len(),
            });
        }

        let header = unsafe { &*self.header };
        let num_slots = header.num_slots as u64;

        let mut pos = header.write_idx.0.load(Ordering::Relaxed);
        let slot_ptr = loop {
            let slot_ptr = unsafe { self.slots.add((pos % num_slots) as usize) };
            let seq = unsafe { (*slot_ptr).sequence.load(Ordering::Acquire) };

            if seq == pos {
                match header.write_idx.0.compare_exchange_weak(
                    pos,
                    pos + 1,
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => break slot_ptr,
                    Err(current) => pos = current,
                }
            } else if seq < pos {
                // Previous lap not consumed yet
                return Err(MailboxError::QueueFull);
            } else {
                pos = header.write_idx.0.load(Ordering::Relaxed);
            }
        };

        unsafe {
            let slot = &*slot_ptr;
            slot.client_id.store(self.client_id, Ordering::Relaxed);
            slot.len.store(frame.len() as u32, Ordering::Relaxed);
            std::ptr::copy_nonoverlapping(
                frame.as_ptr(),
                addr_of_mut!((*slot_ptr).data) as *mut u8,
                frame.len(),
            );
            slot.sequence.store(pos + 1, Ordering::Release);
        }

        Ok(())
    }

    /// Push a request, spinning while the queue is full
    #[cfg(test)]
    fn push(&self, frame: &[u8]) -> Result<()> {
        loop {
            match self.try_push(frame) {
                Err(MailboxError::QueueFull) => core::hint::spin_loop(),
                other => return other,
            }
        }
    }
}

/// Consumer handle for receiving requests
pub struct MpscConsumer {
    header: *const MpscQueueHeader,
    slots: *mut RequestSlot,
}

// SAFETY: Only one consumer should exist
unsafe impl Send for MpscConsumer {}

impl MpscConsumer {
    /// Create a consumer from raw pointer
    ///
    /// # Safety
    /// Pointer must be valid and only one consumer should exist
    pub unsafe fn from_raw(header: *const MpscQueueHeader) -> Self {
        Self {
            header,
            slots: slots_of(header),
        }
    }

    /// Try to pop a request (non-blocking)
    ///
    /// Returns `Some((client_id, frame_len))`; the frame is copied into
    /// `buf`, cut at its length
    pub fn try_pop(&self, buf: &mut [u8]) -> Option<(u32, usize)> {
        let header = unsafe { &*self.header };
        let num_slots = header.num_slots as u64;

        let pos = header.read_idx.0.load(Ordering::Relaxed);
        let slot_ptr = unsafe { self.slots.add((pos % num_slots) as usize) };
        let slot = unsafe { &*slot_ptr };

        if slot.sequence.load(Ordering::Acquire) != pos + 1 {
            return None;
        }

        let client_id = slot.client_id.load(Ordering::Relaxed);
        let len = (slot.len.load(Ordering::Relaxed) as usize).min(MAX_REQUEST_SIZE);
        let copy_len = len.min(buf.len());

        unsafe {
            std::ptr::copy_nonoverlapping(
                addr_of_mut!((*slot_ptr).data) as *const u8,
                buf.as_mut_ptr(),
                copy_len,
            );
        }

        // Hand the slot to the producer of the next lap
        slot.sequence.store(pos + num_slots, Ordering::Release);
        header.read_idx.0.store(pos + 1, Ordering::Relaxed);

        Some((client_id, len))
    }

    /// Pop with a maximum number of spins, then return None
    pub fn pop_with_spins(&self, buf: &mut [u8], max_spins: u32) -> Option<(u32, usize)> {
        for _ in 0..max_spins {
            if let Some(result) = self.try_pop(buf) {
                return Some(result);
            }
            core::hint::spin_loop();
        }
        None
    }
}
