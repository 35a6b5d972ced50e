//! Platform seam between [`HookProcessor`](crate::HookProcessor) and the OS.

use crate::{HookScope, Result, WindowHandle};

/// Operations the hook processor needs from the platform.
///
/// Handles are returned by value and handed back exactly once for release,
/// so an implementation never sees a double close.
pub trait RelayTransport {
    /// Installed hook
    type Hook;
    /// Server end of the return channel
    type Channel;

    /// Thread that owns `window`, or 0 if it has none
    fn owner_thread(&self, window: WindowHandle) -> u32;

    /// Resolve `procedure_name` in the agent module and install it.
    fn install_hook(
        &mut self,
        procedure_name: &str,
        procedure_type: i32,
        scope: HookScope,
    ) -> Result<Self::Hook>;

    fn uninstall_hook(&mut self, hook: Self::Hook);

    /// Create the server end of the return channel.
    fn create_channel(&mut self) -> Result<Self::Channel>;

    fn close_channel(&mut self, channel: Self::Channel);

    /// Wait for a client and append its next message to `out`.
    ///
    /// Returns the total length of `out`.
    fn pull(&mut self, channel: &mut Self::Channel, out: &mut Vec<u8>) -> Result<usize>;

    /// Deliver `payload` to `target` with one blocking copy.
    ///
    /// Returns the raw result of the send.
    fn copy_data(&mut self, target: Option<WindowHandle>, payload: &[u8]) -> Result<isize>;

    /// Reset the process-wide staging mailbox.
    fn clear_staging(&mut self);
}
