//! Write payload classification and the read mode it controls

/// Payload that empties the mailbox
pub const CLEAR_COMMAND: &[u8] = b"CLEAR";

/// Payload that arms last-message mode for the next read
pub const LAST_COMMAND: &[u8] = b"LAST";

/// What a write payload asks the mailbox to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Clear,
    SetLastMode,
    Append(&'a [u8]),
}

impl<'a> Command<'a> {
    /// Classify a payload.
    ///
    /// Only exact byte matches are commands; `"CLEAR\n"` or `"last"` are
    /// ordinary messages.
    pub fn classify(payload: &'a [u8]) -> Self {
        if payload == CLEAR_COMMAND {
            Command::Clear
        } else if payload == LAST_COMMAND {
            Command::SetLastMode
        } else {
            Command::Append(payload)
        }
    }
}

/// Which view the next read serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Every live message, oldest first
    #[default]
    Normal,
    /// Only the newest message, followed by a newline
    LastOnly,
}
