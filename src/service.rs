//! Mailbox read/write protocol
//!
//! [`MailboxService`] is the device-wide endpoint: every read rebuilds its
//! view from the live ring and the `LAST` mode is shared by all callers.
//! [`Session`] is one open handle: it keeps its own read mode and serves a
//! drain sequence from the view pinned by its first read.

use crate::command::{Command, ReadMode};
use crate::error::{MailboxError, Result};
use crate::message::{Message, ENTRY_SIZE};
use crate::ring_buffer::{RingBuffer, View, MAX_ENTRIES};
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Mailbox configuration
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    /// Messages kept before FIFO eviction
    pub max_entries: usize,
    /// Largest accepted write in bytes
    pub entry_size: usize,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            max_entries: MAX_ENTRIES,
            entry_size: ENTRY_SIZE,
        }
    }
}

/// Shared mailbox; clones refer to the same ring
#[derive(Debug, Clone)]
pub struct MailboxService {
    ring: Arc<RingBuffer>,
    config: MailboxConfig,
}

impl MailboxService {
    pub fn new() -> Self {
        Self::with_config(MailboxConfig::default())
    }

    pub fn with_config(config: MailboxConfig) -> Self {
        Self {
            ring: Arc::new(RingBuffer::with_capacity(config.max_entries)),
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &MailboxConfig {
        &self.config
    }

    #[inline]
    pub fn ring(&self) -> &RingBuffer {
        &self.ring
    }

    /// Handle a write payload.
    ///
    /// `CLEAR` empties the ring, `LAST` arms last-message mode for the next
    /// read on the device, anything else is stored as a message. Returns the
    /// number of bytes consumed, which is always the whole payload.
    pub fn write(&self, payload: &[u8]) -> Result<usize> {
        self.validate(payload)?;

        match Command::classify(payload) {
            Command::Clear => self.ring.clear(),
            Command::SetLastMode => {
                self.ring.arm_last_mode();
                debug!("device-wide last mode armed");
            }
            Command::Append(bytes) => self.append(bytes)?,
        }

        Ok(payload.len())
    }

    /// Read up to `max_len` bytes of the current view starting at `offset`.
    ///
    /// An empty result means there is nothing more to deliver. A pending
    /// `LAST` is consumed by this call whether or not it returns bytes.
    pub fn read(&self, offset: u64, max_len: usize) -> Result<Vec<u8>> {
        let rendered = match self.ring.take_view()? {
            View::Last(None) => return Ok(Vec::new()),
            View::Last(Some(msg)) => format_last(&msg)?,
            View::All(snapshot) => snapshot.concat()?,
        };

        match window(rendered.len(), offset, max_len) {
            Some(range) => copy_out(&rendered[range]),
            None => Ok(Vec::new()),
        }
    }

    /// Like [`read`](Self::read), copying into `buf`; returns bytes copied
    pub fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.read(offset, buf.len())?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Open a new handle on this mailbox
    pub fn open(&self) -> Session {
        Session {
            service: self.clone(),
            mode: ReadMode::Normal,
            pinned: None,
        }
    }

    fn validate(&self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() || payload.len() > self.config.entry_size {
            return Err(MailboxError::InvalidArgument {
                max: self.config.entry_size,
                got: payload.len(),
            });
        }
        Ok(())
    }

    fn append(&self, bytes: &[u8]) -> Result<()> {
        let msg = Message::with_limit(bytes, self.config.entry_size)?;
        self.ring.insert(msg);
        Ok(())
    }
}

impl Default for MailboxService {
    fn default() -> Self {
        Self::new()
    }
}

struct PinnedView {
    /// Ring generation for a full dump, `None` for a last-message view
    generation: Option<u64>,
    bytes: Vec<u8>,
}

/// One open handle on a mailbox
pub struct Session {
    service: MailboxService,
    mode: ReadMode,
    pinned: Option<PinnedView>,
}

impl Session {
    /// Read mode that the next read on this handle will use
    #[inline]
    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// Generation of the pinned full-dump view, if one is pinned
    pub fn pinned_generation(&self) -> Option<u64> {
        self.pinned.as_ref().and_then(|p| p.generation)
    }

    /// Handle a write payload.
    ///
    /// Same grammar as [`MailboxService::write`], except that `LAST` only
    /// arms this handle. Any write drops the pinned view.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize> {
        self.service.validate(payload)?;
        self.pinned = None;

        match Command::classify(payload) {
            Command::Clear => self.service.ring.clear(),
            Command::SetLastMode => {
                self.mode = ReadMode::LastOnly;
                debug!("session last mode armed");
            }
            Command::Append(bytes) => self.service.append(bytes)?,
        }

        Ok(payload.len())
    }

    /// Read up to `max_len` bytes starting at `offset`.
    ///
    /// A read at offset 0, or with nothing pinned, builds a fresh view and
    /// pins it; later offsets are served from the pinned view so a drain
    /// never mixes two versions of the mailbox. The pin is released once a
    /// read reaches its end.
    pub fn read(&mut self, offset: u64, max_len: usize) -> Result<Vec<u8>> {
        if max_len == 0 {
            // An armed LAST is spent even by an empty read
            self.mode = ReadMode::Normal;
            return Ok(Vec::new());
        }

        if offset == 0 || self.pinned.is_none() || self.mode == ReadMode::LastOnly {
            self.pin()?;
        }

        let Some(pinned) = &self.pinned else {
            return Ok(Vec::new());
        };

        match window(pinned.bytes.len(), offset, max_len) {
            Some(range) => copy_out(&pinned.bytes[range]),
            None => {
                self.pinned = None;
                Ok(Vec::new())
            }
        }
    }

    /// Like [`read`](Self::read), copying into `buf`; returns bytes copied
    pub fn read_into(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let bytes = self.read(offset, buf.len())?;
        buf[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    fn pin(&mut self) -> Result<()> {
        let ring = &self.service.ring;
        self.pinned = match std::mem::take(&mut self.mode) {
            ReadMode::LastOnly => match ring.snapshot_last() {
                Some(msg) => Some(PinnedView {
                    generation: None,
                    bytes: format_last(&msg)?,
                }),
                None => None,
            },
            ReadMode::Normal => {
                let snapshot = ring.snapshot_all()?;
                debug!(
                    generation = snapshot.generation(),
                    messages = snapshot.messages().len(),
                    "pinned mailbox view"
                );
                Some(PinnedView {
                    generation: Some(snapshot.generation()),
                    bytes: snapshot.concat()?,
                })
            }
        };
        Ok(())
    }
}

/// Newest message followed by a newline, whatever the message ends with
fn format_last(msg: &Message) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(msg.len() + 1)
        .map_err(|_| MailboxError::OutOfMemory)?;
    out.extend_from_slice(msg.as_bytes());
    out.push(b'\n');
    Ok(out)
}

/// Byte range `[offset, offset + to_copy)` of a view of `len` bytes, or
/// `None` when there is nothing left to deliver
fn window(len: usize, offset: u64, max_len: usize) -> Option<Range<usize>> {
    let start = usize::try_from(offset).ok().filter(|&start| start < len)?;
    let end = start + max_len.min(len - start);
    (end > start).then_some(start..end)
}

fn copy_out(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes.len())
        .map_err(|_| MailboxError::OutOfMemory)?;
    out.extend_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_service(svc: &MailboxService, chunk: usize) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let part = svc.read(out.len() as u64, chunk).unwrap();
            if part.is_empty() {
                return out;
            }
            out.extend_from_slice(&part);
        }
    }

    #[test]
    fn test_hello_world_scenario() {
        let svc = MailboxService::new();
        assert_eq!(svc.write(b"hello").unwrap(), 5);
        assert_eq!(svc.write(b"world").unwrap(), 5);
        assert_eq!(svc.read(0, 4096).unwrap(), b"helloworld");

        assert_eq!(svc.write(b"LAST").unwrap(), 4);
        assert_eq!(svc.read(0, 4096).unwrap(), b"world\n");

        assert_eq!(svc.write(b"CLEAR").unwrap(), 5);
        assert!(svc.read(0, 4096).unwrap().is_empty());
    }

    #[test]
    fn test_size_boundary() {
        let svc = MailboxService::new();
        assert_eq!(svc.write(&[b'a'; 128]).unwrap(), 128);
        assert!(matches!(
            svc.write(&[b'a'; 129]),
            Err(MailboxError::InvalidArgument { max: 128, got: 129 })
        ));
        assert!(matches!(
            svc.write(b""),
            Err(MailboxError::InvalidArgument { got: 0, .. })
        ));
        assert_eq!(svc.ring().len(), 1);
    }

    #[test]
    fn test_last_mode_is_one_shot() {
        let svc = MailboxService::new();
        svc.write(b"a").unwrap();
        svc.write(b"b").unwrap();
        svc.write(b"LAST").unwrap();

        assert_eq!(svc.read(0, 64).unwrap(), b"b\n");
        assert_eq!(svc.read(0, 64).unwrap(), b"ab");
    }

    #[test]
    fn test_last_mode_consumed_on_empty_ring() {
        let svc = MailboxService::new();
        svc.write(b"LAST").unwrap();
        assert!(svc.read(0, 64).unwrap().is_empty());
        assert_eq!(svc.ring().read_mode(), ReadMode::Normal);
    }

    #[test]
    fn test_last_mode_consumed_past_end() {
        let svc = MailboxService::new();
        svc.write(b"abc").unwrap();
        svc.write(b"LAST").unwrap();
        assert!(svc.read(10, 64).unwrap().is_empty());
        assert_eq!(svc.read(0, 64).unwrap(), b"abc");
    }

    #[test]
    fn test_last_mode_adds_newline_even_if_present() {
        let svc = MailboxService::new();
        svc.write(b"line\n").unwrap();
        svc.write(b"LAST").unwrap();
        assert_eq!(svc.read(0, 64).unwrap(), b"line\n\n");
    }

    #[test]
    fn test_partial_read_drain() {
        let svc = MailboxService::new();
        for s in ["a", "b", "c"] {
            svc.write(s.as_bytes()).unwrap();
        }
        assert_eq!(svc.read(0, 2).unwrap(), b"ab");
        assert_eq!(svc.read(2, 2).unwrap(), b"c");
        assert!(svc.read(3, 2).unwrap().is_empty());
        assert_eq!(drain_service(&svc, 1), b"abc");
    }

    #[test]
    fn test_zero_max_len_returns_empty() {
        let svc = MailboxService::new();
        svc.write(b"abc").unwrap();
        assert!(svc.read(0, 0).unwrap().is_empty());
        assert!(svc.read(u64::MAX, 16).unwrap().is_empty());
    }

    #[test]
    fn test_read_into() {
        let svc = MailboxService::new();
        svc.write(b"hello").unwrap();
        let mut buf = [0u8; 3];
        assert_eq!(svc.read_into(0, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(svc.read_into(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
    }

    #[test]
    fn test_commands_are_never_stored() {
        let svc = MailboxService::new();
        svc.write(b"LAST").unwrap();
        svc.write(b"CLEAR").unwrap();
        assert!(svc.ring().is_empty());
    }

    #[test]
    fn test_custom_config() {
        let svc = MailboxService::with_config(MailboxConfig {
            max_entries: 2,
            entry_size: 4,
        });
        assert!(svc.write(b"abcde").is_err());
        for s in ["aa", "bb", "cc"] {
            svc.write(s.as_bytes()).unwrap();
        }
        assert_eq!(svc.read(0, 64).unwrap(), b"bbcc");
    }

    #[test]
    fn test_session_drain_survives_concurrent_write() {
        let svc = MailboxService::new();
        for s in ["one", "two", "three"] {
            svc.write(s.as_bytes()).unwrap();
        }

        let mut session = svc.open();
        assert_eq!(session.read(0, 4).unwrap(), b"onet");
        let pinned = session.pinned_generation();
        assert_eq!(pinned, Some(3));

        // Another writer slips in mid-drain
        svc.write(b"CLEAR").unwrap();
        svc.write(b"four").unwrap();

        assert_eq!(session.read(4, 4).unwrap(), b"woth");
        assert_eq!(session.read(8, 4).unwrap(), b"ree");
        assert!(session.read(11, 4).unwrap().is_empty());
        assert_eq!(session.pinned_generation(), None);

        // A new drain sees the new contents
        assert_eq!(session.read(0, 64).unwrap(), b"four");
    }

    #[test]
    fn test_session_last_mode_is_private() {
        let svc = MailboxService::new();
        svc.write(b"hello").unwrap();
        svc.write(b"world").unwrap();

        let mut armed = svc.open();
        let mut other = svc.open();
        armed.write(b"LAST").unwrap();
        assert_eq!(armed.mode(), ReadMode::LastOnly);

        assert_eq!(other.read(0, 64).unwrap(), b"helloworld");
        assert_eq!(svc.read(0, 64).unwrap(), b"helloworld");

        assert_eq!(armed.read(0, 3).unwrap(), b"wor");
        assert_eq!(armed.mode(), ReadMode::Normal);
        assert_eq!(armed.read(3, 3).unwrap(), b"ld\n");
        assert!(armed.read(6, 3).unwrap().is_empty());
        assert_eq!(armed.read(0, 64).unwrap(), b"helloworld");
    }

    #[test]
    fn test_session_last_on_empty() {
        let svc = MailboxService::new();
        let mut session = svc.open();
        session.write(b"LAST").unwrap();
        assert!(session.read(0, 64).unwrap().is_empty());
        assert_eq!(session.mode(), ReadMode::Normal);
    }

    #[test]
    fn test_zero_length_read_consumes_last_mode() {
        let svc = MailboxService::new();
        svc.write(b"a").unwrap();
        svc.write(b"b").unwrap();

        svc.write(b"LAST").unwrap();
        assert!(svc.read(0, 0).unwrap().is_empty());
        assert_eq!(svc.read(0, 64).unwrap(), b"ab");

        let mut session = svc.open();
        session.write(b"LAST").unwrap();
        assert!(session.read(0, 0).unwrap().is_empty());
        assert_eq!(session.mode(), ReadMode::Normal);
        assert_eq!(session.read(0, 64).unwrap(), b"ab");
    }

    #[test]
    fn test_zero_length_read_keeps_pinned_drain() {
        let svc = MailboxService::new();
        svc.write(b"abc").unwrap();
        let mut session = svc.open();
        assert_eq!(session.read(0, 1).unwrap(), b"a");
        svc.write(b"CLEAR").unwrap();

        assert!(session.read(1, 0).unwrap().is_empty());
        assert_eq!(session.read(1, 64).unwrap(), b"bc");
    }

    #[test]
    fn test_session_write_drops_pin() {
        let svc = MailboxService::new();
        let mut session = svc.open();
        session.write(b"ab").unwrap();
        assert_eq!(session.read(0, 1).unwrap(), b"a");
        session.write(b"cd").unwrap();
        // Fresh view built at a non-zero offset
        assert_eq!(session.read(1, 64).unwrap(), b"bcd");
    }

    #[test]
    fn test_session_clear_and_size_errors() {
        let svc = MailboxService::new();
        let mut session = svc.open();
        session.write(b"x").unwrap();
        assert!(session.write(&[0u8; 129]).is_err());
        session.write(b"CLEAR").unwrap();
        assert!(svc.ring().is_empty());
        assert!(session.read(0, 64).unwrap().is_empty());
    }

    #[test]
    fn test_window() {
        assert_eq!(window(10, 0, 4), Some(0..4));
        assert_eq!(window(10, 8, 4), Some(8..10));
        assert_eq!(window(10, 10, 4), None);
        assert_eq!(window(10, 3, 0), None);
        assert_eq!(window(0, 0, 4), None);
    }
}
