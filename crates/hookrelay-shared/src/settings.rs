//! Hook configuration supplied by the controller.

use std::fmt;
use tracing::warn;

/// Raw window handle value, as passed between processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Direction(s) the relay carries data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommunicationMode {
    /// Agent pushes data outward only
    #[default]
    OneWay,
    /// A return channel is created as well
    TwoWay,
}

/// What initialization does when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log a warning and keep going without the failed capability
    #[default]
    Degrade,
    /// Release everything acquired so far and return the error
    Strict,
}

/// Settings for one hook installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSettings {
    /// Name of the hook procedure exported by the agent module
    pub procedure_name: String,
    /// Platform hook type (`WH_*` value)
    pub procedure_type: i32,
    /// Window whose thread is hooked; `None` hooks every thread in the session
    pub window: Option<WindowHandle>,
    pub mode: CommunicationMode,
    pub policy: FailurePolicy,
}

impl HookSettings {
    /// One-way, session-wide settings that degrade on failure
    pub fn new(procedure_name: impl Into<String>, procedure_type: i32) -> Self {
        Self {
            procedure_name: procedure_name.into(),
            procedure_type,
            window: None,
            mode: CommunicationMode::OneWay,
            policy: FailurePolicy::Degrade,
        }
    }

    pub fn with_window(mut self, window: WindowHandle) -> Self {
        self.window = Some(window);
        self
    }

    pub fn with_mode(mut self, mode: CommunicationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Threads a hook applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookScope {
    /// The thread that owns the target window
    Thread(u32),
    /// Every thread in the interactive session
    Session,
}

impl HookScope {
    /// Pick the scope for an optional target window.
    ///
    /// `owner_thread` maps a window to its owning thread id and returns 0 when
    /// the window is gone, in which case the hook falls back to the session.
    pub fn resolve<F>(target: Option<WindowHandle>, owner_thread: F) -> Self
    where
        F: FnOnce(WindowHandle) -> u32,
    {
        let Some(window) = target else {
            return HookScope::Session;
        };

        match owner_thread(window) {
            0 => {
                warn!(%window, "Target window has no owning thread, hooking the whole session");
                HookScope::Session
            }
            thread_id => HookScope::Thread(thread_id),
        }
    }

    /// Thread id argument for the platform call (0 = all threads)
    pub fn thread_id(&self) -> u32 {
        match self {
            HookScope::Thread(id) => *id,
            HookScope::Session => 0,
        }
    }
}
