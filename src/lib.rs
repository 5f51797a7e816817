//! Chardev Mailbox - a small shared message mailbox with a file-like interface
//!
//! Writers append short messages, readers drain them in FIFO order, and the
//! `LAST` command lets a reader fetch only the newest message.
//!
//! # Architecture
//!
//! - **RingBuffer**: fixed-capacity circular store with FIFO eviction,
//!   guarded by a spin lock that is never held across allocation
//! - **MailboxService / Session**: the write grammar (`CLEAR`, `LAST`,
//!   messages) and the offset-based read protocol
//! - **Device**: a daemon exposing the mailbox to other processes over
//!   shared memory (MPSC request queue + per-client seqlock responses)
//!
//! # Capacity
//!
//! - [`MAX_ENTRIES`] messages of at most [`ENTRY_SIZE`] bytes

pub mod error;
pub mod message;
pub mod command;
pub mod ring_buffer;
pub mod service;
pub mod shm;
pub mod seqlock;
pub mod mpsc_queue;
pub mod protocol;
pub mod device;
pub mod bindings;

pub use error::{MailboxError, Result};
pub use message::{Message, ENTRY_SIZE};
pub use command::{Command, ReadMode};
pub use ring_buffer::{RingBuffer, Snapshot, View, MAX_ENTRIES};
pub use service::{MailboxConfig, MailboxService, Session};
pub use device::{DeviceClient, DeviceConfig, DeviceServer, DEFAULT_DEVICE_NAME};
