//! Shared types, staging mailbox and hook processor for hookrelay
//!
//! The agent module (loaded into a host process through a Windows hook) and
//! the controller process exchange raw byte payloads over three transports:
//! - A synchronous `WM_COPYDATA` push from a transient message-only window
//! - A message-mode named pipe (the return channel)
//! - A single-slot staging mailbox in named shared memory
//!
//! # Architecture
//!
//! - [`Mailbox`] - Single-slot staging buffer over a [`SlotRegion`]
//! - [`HookProcessor`] - Owns the hook and channel handles of one relay
//! - [`RelayTransport`] - Platform seam implemented by the agent crate

pub mod error;
pub mod framing;
pub mod mailbox;
pub mod processor;
pub mod settings;
#[cfg(windows)]
pub mod shm;
pub mod transport;

pub use error::{Error, MailboxError, Result};
pub use framing::{FrameRead, FrameStatus, reassemble};
pub use mailbox::{
    HeapRegion, Mailbox, SLOT_HEADER_SIZE, SlotHeader, SlotRegion, SlotState, encode_wide,
};
pub use processor::{HookProcessor, ProcessorState};
pub use settings::{CommunicationMode, FailurePolicy, HookScope, HookSettings, WindowHandle};
#[cfg(windows)]
pub use shm::SharedRegion;
pub use transport::RelayTransport;

/// Physical capacity of the staging mailbox payload (32KB)
pub const MAX_BUFFER_SIZE: usize = 32 * 1024;

/// Size of one return channel message frame
pub const PIPE_FRAME_SIZE: usize = 1024;

/// Well-known name of the return channel pipe
pub const PIPE_NAME: &str = r"\\.\pipe\nhsupspipe";

/// How long a client waits for the return channel to appear
pub const PIPE_CONNECTION_TIMEOUT_MS: u32 = 5000;

/// SACL granting no-write-up access to low integrity processes
pub const LOW_INTEGRITY_SDDL_SACL: &str = "S:(ML;;NW;;;LW)";

/// Name of the file mapping backing the process-wide mailbox
pub const MAILBOX_NAME: &str = r"Local\hookrelay_mailbox";

/// Magic value to identify a valid mailbox region ("HKRL")
pub const MAGIC: u32 = 0x484B_524C;

/// `dwData` tag carried by every `WM_COPYDATA` push
pub const COPY_DATA_TAG: usize = 1;
