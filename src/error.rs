//! Error types for the mailbox

use rustix::io::Errno;
use std::io;
use thiserror::Error;

/// Result type for mailbox operations
pub type Result<T> = std::result::Result<T, MailboxError>;

/// Errors that can occur in mailbox operations
#[derive(Debug, Error)]
pub enum MailboxError {
    /// Write payload is empty or longer than the entry size
    #[error("Invalid message length: expected 1..={max} bytes, got {got}")]
    InvalidArgument { max: usize, got: usize },

    /// Allocation failed while storing or formatting messages
    #[error("Out of memory")]
    OutOfMemory,

    /// Bytes could not be delivered across the read/write boundary
    #[error("Transfer fault: {0}")]
    TransferFault(&'static str),

    /// Failed to create shared memory
    #[error("Failed to create shared memory '{name}': {source}")]
    ShmCreate {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to open shared memory
    #[error("Failed to open shared memory '{name}': {source}")]
    ShmOpen {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Failed to map memory
    #[error("Failed to map memory: {0}")]
    Mmap(#[source] io::Error),

    /// Failed to truncate shared memory
    #[error("Failed to set shared memory size: {0}")]
    Truncate(#[source] io::Error),

    /// Invalid device magic number
    #[error("Invalid device magic number: expected 0x{expected:08X}, got 0x{got:08X}")]
    InvalidMagic { expected: u32, got: u32 },

    /// Device name too long
    #[error("Device name too long: max {max} chars, got {got}")]
    NameTooLong { max: usize, got: usize },

    /// Device name contains an interior NUL byte
    #[error("Device name contains a NUL byte: {0:?}")]
    InvalidName(String),

    /// Every client slot of the device is claimed
    #[error("No free client slot: all {max} slots in use")]
    ClientsExhausted { max: usize },

    /// Request queue is full
    #[error("Request queue is full")]
    QueueFull,

    /// Daemon did not answer in time
    #[error("Timed out waiting for response to request {request_id}")]
    Timeout { request_id: u64 },

    /// Daemon answered with an errno that has no dedicated variant
    #[error("Device request failed: {0}")]
    Device(Errno),
}

impl MailboxError {
    /// Errno reported for this error across the device and C boundaries
    pub fn errno(&self) -> Errno {
        match self {
            MailboxError::InvalidArgument { .. } => Errno::INVAL,
            MailboxError::OutOfMemory => Errno::NOMEM,
            MailboxError::TransferFault(_) => Errno::FAULT,
            MailboxError::ShmCreate { .. }
            | MailboxError::ShmOpen { .. }
            | MailboxError::Mmap(_)
            | MailboxError::Truncate(_) => Errno::NOENT,
            MailboxError::InvalidMagic { .. } => Errno::IO,
            MailboxError::NameTooLong { .. } => Errno::NAMETOOLONG,
            MailboxError::InvalidName(_) => Errno::INVAL,
            MailboxError::ClientsExhausted { .. } => Errno::BUSY,
            MailboxError::QueueFull => Errno::AGAIN,
            MailboxError::Timeout { .. } => Errno::TIMEDOUT,
            MailboxError::Device(errno) => *errno,
        }
    }

    /// Negative errno, the status code used on the wire and in the C API
    pub fn status(&self) -> i32 {
        -self.errno().raw_os_error()
    }

    /// Rebuild an error from a negative status returned by the daemon.
    ///
    /// `payload_len` is the length of the write that caused it, if any.
    pub fn from_status(status: i32, payload_len: usize, max: usize) -> Self {
        let errno = Errno::from_raw_os_error(-status);
        if errno == Errno::INVAL {
            MailboxError::InvalidArgument {
                max,
                got: payload_len,
            }
        } else if errno == Errno::NOMEM {
            MailboxError::OutOfMemory
        } else if errno == Errno::FAULT {
            MailboxError::TransferFault("device reported a transfer fault")
        } else {
            MailboxError::Device(errno)
        }
    }
}

impl From<MailboxError> for io::Error {
    fn from(err: MailboxError) -> Self {
        let kind = io::Error::from_raw_os_error(err.errno().raw_os_error()).kind();
        io::Error::new(kind, err)
    }
}
