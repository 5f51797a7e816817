//! Immutable, length-bounded messages stored in the ring buffer

use crate::error::{MailboxError, Result};
use std::fmt;
use std::sync::Arc;

/// Maximum size of a single message in bytes
pub const ENTRY_SIZE: usize = 128;

/// A stored message.
///
/// The bytes are shared behind an `Arc` so that snapshots taken under the
/// ring lock only bump a reference count.
#[derive(Clone, PartialEq, Eq)]
pub struct Message(Arc<[u8]>);

impl Message {
    /// Copy `bytes` into a new message bounded by [`ENTRY_SIZE`]
    pub fn new(bytes: &[u8]) -> Result<Self> {
        Self::with_limit(bytes, ENTRY_SIZE)
    }

    /// Copy `bytes` into a new message bounded by `max_len`
    pub fn with_limit(bytes: &[u8], max_len: usize) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > max_len {
            return Err(MailboxError::InvalidArgument {
                max: max_len,
                got: bytes.len(),
            });
        }

        let mut owned = Vec::new();
        owned
            .try_reserve_exact(bytes.len())
            .map_err(|_| MailboxError::OutOfMemory)?;
        owned.extend_from_slice(bytes);

        Ok(Self(Arc::from(owned)))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; a stored message holds at least one byte
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message")
            .field(&String::from_utf8_lossy(&self.0))
            .finish()
    }
}
