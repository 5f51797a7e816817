//! SeqLock - Sequence Lock for one writer and many readers
//!
//! Each client response slot of the device is a seqlock region written only
//! by the daemon. Readers never block the writer; they retry when the
//! sequence changed under them.
//!
//! Data layout: `[len: u64 LE][len bytes]`

use std::sync::atomic::{AtomicU64, Ordering};

/// Cache line size for most modern x86_64 CPUs
const CACHE_LINE_SIZE: usize = 64;

/// Size of the length prefix stored before each frame
const LEN_PREFIX: usize = 8;

/// Ensures the wrapped value is on its own cache line
#[repr(C, align(64))]
pub struct CacheAligned<T>(pub T);

/// SeqLock header stored in shared memory
#[repr(C)]
pub struct SeqLockHeader {
    /// Sequence number: odd = write in progress, even = stable
    sequence: CacheAligned<AtomicU64>,
    /// Size of the data region following the header
    data_size: usize,
    _pad: [u8; CACHE_LINE_SIZE - 8],
}

impl SeqLockHeader {
    /// Initialize a new SeqLock header
    ///
    /// # Safety
    /// The pointer must point to valid, properly aligned memory
    pub unsafe fn init(ptr: *mut Self, data_size: usize) {
        (*ptr).sequence.0 = AtomicU64::new(0);
        (*ptr).data_size = data_size;
    }

    /// Bytes needed for a header followed by `data_size` bytes of data
    pub const fn size_for(data_size: usize) -> usize {
        std::mem::size_of::<SeqLockHeader>() + data_size
    }

    /// Largest frame that fits behind the length prefix
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        self.data_size.saturating_sub(LEN_PREFIX)
    }

    /// Current sequence number
    #[cfg(test)]
    fn sequence(&self) -> u64 {
        self.sequence.0.load(Ordering::Acquire)
    }
}

/// Writer-side SeqLock operations
pub struct SeqLockWriter {
    header: *mut SeqLockHeader,
    data: *mut u8,
}

// SAFETY: SeqLockWriter only used by single writer
unsafe impl Send for SeqLockWriter {}

impl SeqLockWriter {
    /// Create a new writer from raw pointers
    ///
    /// # Safety
    /// - `header` must point to a valid, initialized SeqLockHeader
    /// - `data` must point to the data region immediately after the header
    /// - Only one SeqLockWriter should exist at a time
    pub unsafe fn from_raw(header: *mut SeqLockHeader, data: *mut u8) -> Self {
        Self { header, data }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        unsafe { (*self.header).capacity() }
    }

    /// Publish a frame made of `parts`, concatenated.
    ///
    /// Returns the number of bytes published; a frame longer than
    /// [`capacity`](Self::capacity) is cut at the capacity.
    pub fn write_frame(&self, parts: &[&[u8]]) -> usize {
        let header = unsafe { &*self.header };
        let capacity = header.capacity();

        // Increment to odd - write in progress
        header.sequence.0.fetch_add(1, Ordering::Acquire);

        let mut written = 0;
        for part in parts {
            let n = part.len().min(capacity - written);
            unsafe {
                std::ptr::copy_nonoverlapping(part.as_ptr(), self.data.add(LEN_PREFIX + written), n);
            }
            written += n;
        }

        unsafe {
            let len_bytes = (written as u64).to_le_bytes();
            std::ptr::copy_nonoverlapping(len_bytes.as_ptr(), self.data, LEN_PREFIX);
        }

        std::sync::atomic::fence(Ordering::Release);

        // Increment to even - write complete
        header.sequence.0.fetch_add(1, Ordering::Release);

        written
    }
}

/// Reader-side SeqLock operations
pub struct SeqLockReader {
    header: *const SeqLockHeader,
    data: *const u8,
}

// SAFETY: SeqLockReader is read-only and uses atomic operations
unsafe impl Send for SeqLockReader {}
unsafe impl Sync for SeqLockReader {}

impl SeqLockReader {
    /// Create a new reader from raw pointers
    ///
    /// # Safety
    /// - `header` must point to a valid SeqLockHeader
    /// - `data` must point to the data region
    pub unsafe fn from_raw(header: *const SeqLockHeader, data: *const u8) -> Self {
        Self { header, data }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        unsafe { (*self.header).capacity() }
    }

    /// Try to read the current frame once without spinning.
    ///
    /// Returns `Some(frame_len)` on a consistent read; at most `buf.len()`
    /// bytes are copied. `None` means a write was in progress.
    #[inline]
    pub fn try_read_frame(&self, buf: &mut [u8]) -> Option<usize> {
        let header = unsafe { &*self.header };

        let seq1 = header.sequence.0.load(Ordering::Acquire);
        if seq1 & 1 == 1 {
            return None;
        }

        let len = unsafe {
            let mut len_bytes = [0u8; LEN_PREFIX];
            std::ptr::copy_nonoverlapping(self.data, len_bytes.as_mut_ptr(), LEN_PREFIX);
            u64::from_le_bytes(len_bytes) as usize
        };

        // A torn length can be anything; never read past the region
        let len = len.min(header.capacity());
        let copy_len = len.min(buf.len());

        unsafe {
            std::ptr::copy_nonoverlapping(self.data.add(LEN_PREFIX), buf.as_mut_ptr(), copy_len);
        }

        std::sync::atomic::fence(Ordering::Acquire);

        let seq2 = header.sequence.0.load(Ordering::Acquire);
        if seq1 == seq2 {
            Some(len)
        } else {
            None
        }
    }

    /// Read the current frame, spinning until a consistent read is obtained
    #[cfg(test)]
    fn read_frame(&self, buf: &mut [u8]) -> usize {
        loop {
            if let Some(len) = self.try_read_frame(buf) {
                return len;
            }
            core::hint::spin_loop();
        }
    }
}
