//! Agent module loaded into the host process through a Windows hook.
//!
//! The crate builds as a `cdylib` so a host can be hooked with it directly,
//! and as an `rlib` so an agent DLL can export its own hook procedures and
//! reuse the relay. Hook procedures are resolved by name from whichever
//! module this code is linked into.

#[cfg(windows)]
pub mod hook;
#[cfg(windows)]
pub mod pipe;
#[cfg(windows)]
pub mod receiver;
#[cfg(windows)]
pub mod staging;
#[cfg(windows)]
mod transport;

#[cfg(windows)]
pub use hook::HookHandle;
#[cfg(windows)]
pub use pipe::{ReturnChannel, write_bytes, write_bytes_lossy};
#[cfg(windows)]
pub use receiver::store_copy_data;
#[cfg(windows)]
pub use staging::staging;
#[cfg(windows)]
pub use transport::Win32Transport;

/// Hook processor wired to the Win32 transports
#[cfg(windows)]
pub type AgentHookProcessor = hookrelay_shared::HookProcessor<Win32Transport>;

/// Create an uninitialized processor for this agent module
#[cfg(windows)]
pub fn processor() -> AgentHookProcessor {
    hookrelay_shared::HookProcessor::new(Win32Transport::default())
}

/// Create an uninitialized processor whose hook procedures live in the agent
/// DLL at `path`
#[cfg(windows)]
pub fn processor_for_module(
    path: &std::path::Path,
) -> hookrelay_shared::Result<AgentHookProcessor> {
    Ok(hookrelay_shared::HookProcessor::new(
        Win32Transport::with_agent_module(path)?,
    ))
}
