//! Hook processor: owns the hook and return channel of one relay.
//!
//! Lifecycle:
//! ```text
//! Uninitialized ──initialize──▶ Active ──dispose──▶ Disposed
//!        └────────────────dispose─────────────────────▲
//! ```
//! Under [`FailurePolicy::Degrade`] a processor becomes active even when the
//! hook or the channel could not be set up; check [`HookProcessor::is_hook_installed`]
//! and [`HookProcessor::is_channel_open`] when that matters.

use crate::mailbox::encode_wide;
use crate::{
    CommunicationMode, Error, FailurePolicy, HookScope, HookSettings, MAX_BUFFER_SIZE,
    RelayTransport, Result, WindowHandle,
};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Uninitialized,
    Active,
    Disposed,
}

/// Orchestrates hook installation, synchronous pushes and return channel pulls.
pub struct HookProcessor<T: RelayTransport> {
    transport: T,
    hook: Option<T::Hook>,
    channel: Option<T::Channel>,
    target_window: Option<WindowHandle>,
    mode: CommunicationMode,
    state: ProcessorState,
}

impl<T: RelayTransport> HookProcessor<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            hook: None,
            channel: None,
            target_window: None,
            mode: CommunicationMode::OneWay,
            state: ProcessorState::Uninitialized,
        }
    }

    pub fn state(&self) -> ProcessorState {
        self.state
    }

    pub fn mode(&self) -> CommunicationMode {
        self.mode
    }

    pub fn target_window(&self) -> Option<WindowHandle> {
        self.target_window
    }

    pub fn is_hook_installed(&self) -> bool {
        self.hook.is_some()
    }

    pub fn is_channel_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Initialize a one-way, session-wide hook that degrades on failure.
    pub fn initialize_with(&mut self, procedure_name: &str, procedure_type: i32) -> Result<()> {
        self.initialize(&HookSettings::new(procedure_name, procedure_type))
    }

    /// Create the return channel (two-way only) and install the hook.
    pub fn initialize(&mut self, settings: &HookSettings) -> Result<()> {
        if self.state != ProcessorState::Uninitialized {
            return Err(Error::InvalidState(format!(
                "cannot initialize a processor that is {:?}",
                self.state
            )));
        }

        self.target_window = settings.window;
        self.mode = settings.mode;
        self.state = ProcessorState::Active;

        if self.mode == CommunicationMode::TwoWay {
            match self.transport.create_channel() {
                Ok(channel) => self.channel = Some(channel),
                Err(e) => {
                    warn!(
                        error = %e,
                        "Failed to create return channel. Communication back from the host will not work."
                    );
                    self.fail(settings.policy, e)?;
                }
            }
        }

        let transport = &self.transport;
        let scope = HookScope::resolve(self.target_window, |window| transport.owner_thread(window));

        match self
            .transport
            .install_hook(&settings.procedure_name, settings.procedure_type, scope)
        {
            Ok(hook) => {
                info!(
                    procedure = %settings.procedure_name,
                    hook_type = settings.procedure_type,
                    ?scope,
                    "Installed hook procedure"
                );
                self.hook = Some(hook);
            }
            Err(e) => {
                warn!(
                    procedure = %settings.procedure_name,
                    error = %e,
                    "Unable to set hook procedure"
                );
                self.fail(settings.policy, e)?;
            }
        }

        Ok(())
    }

    fn fail(&mut self, policy: FailurePolicy, error: Error) -> Result<()> {
        match policy {
            FailurePolicy::Degrade => Ok(()),
            FailurePolicy::Strict => {
                self.dispose();
                Err(error)
            }
        }
    }

    /// Release the channel and hook. Safe to call any number of times.
    pub fn dispose(&mut self) {
        if self.state == ProcessorState::Disposed {
            return;
        }

        if self.state == ProcessorState::Active {
            self.transport.clear_staging();
        }

        if let Some(channel) = self.channel.take() {
            self.transport.close_channel(channel);
        }

        if let Some(hook) = self.hook.take() {
            self.transport.uninstall_hook(hook);
        }

        debug!(previous = ?self.state, "Disposed hook processor");
        self.state = ProcessorState::Disposed;
    }

    /// Push a payload to the target window with one synchronous copy.
    ///
    /// Fails only when no hook is installed. Whether the destination consumed
    /// the message is not reported. Payloads over [`MAX_BUFFER_SIZE`], the
    /// fixed capacity of a receiving mailbox, are still sent but logged; a
    /// mailbox with a lowered size marker is not consulted.
    pub fn push_bytes(&mut self, data: &[u8]) -> Result<()> {
        trace!(len = data.len(), "Pushing payload");
        if self.hook.is_none() {
            warn!("No hook procedure has been set");
            return Err(Error::HookNotInstalled);
        }

        if data.len() > MAX_BUFFER_SIZE {
            warn!(
                len = data.len(),
                capacity = MAX_BUFFER_SIZE,
                "Destination data buffer not large enough"
            );
        }

        match self.transport.copy_data(self.target_window, data) {
            Ok(result) => info!(result, "Copy data send result"),
            Err(e) => warn!(error = %e, "Copy data send failed"),
        }
        Ok(())
    }

    /// Push text as UTF-16LE bytes
    pub fn push_text(&mut self, text: &str) -> Result<()> {
        self.push_bytes(&encode_wide(text))
    }

    /// Wait for a client on the return channel and append its message to `out`.
    ///
    /// Returns the total length of `out`.
    pub fn pull_bytes(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let Some(channel) = self.channel.as_mut() else {
            warn!("Return channel is not open");
            return Err(Error::ChannelUnavailable("return channel is not open".into()));
        };
        self.transport.pull(channel, out)
    }
}

impl<T: RelayTransport> Drop for HookProcessor<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}
