//! Error types for hookrelay.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to install hook procedure '{procedure}': {reason}")]
    HookInstall { procedure: String, reason: String },

    #[error("Return channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("No hook procedure has been set")]
    HookNotInstalled,

    #[error("Invalid processor state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsError(windows::core::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures of the enforced turn-taking mailbox operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MailboxError {
    #[error("Mailbox already holds a pending payload")]
    Occupied,

    #[error("Mailbox holds no pending payload")]
    Empty,

    #[error("Mailbox region is not a valid slot (magic {magic:#010x}, capacity {capacity})")]
    BadRegion { magic: u32, capacity: u32 },
}

#[cfg(windows)]
impl From<windows::core::Error> for Error {
    fn from(e: windows::core::Error) -> Self {
        Error::WindowsError(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
