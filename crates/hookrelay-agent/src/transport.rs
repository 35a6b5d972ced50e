//! Win32 implementation of the relay transport.

use crate::hook::{self, HookHandle};
use crate::pipe::ReturnChannel;
use crate::receiver;
use crate::staging::staging;
use hookrelay_shared::{Error, HookScope, RelayTransport, Result, WindowHandle};
use std::path::Path;
use tracing::warn;
use windows::Win32::Foundation::HMODULE;

/// Hooks, pipes and windows of the running agent module.
#[derive(Debug, Default, Clone, Copy)]
pub struct Win32Transport {
    /// Module hook procedures are resolved in; `None` means the module this
    /// code is linked into.
    module: Option<HMODULE>,
}

impl Win32Transport {
    /// Resolve hook procedures in the agent DLL at `path`.
    pub fn with_agent_module(path: &Path) -> Result<Self> {
        Ok(Self {
            module: Some(hook::load_agent_module(path)?),
        })
    }

    fn hook_module(&self, procedure_name: &str) -> Result<HMODULE> {
        match self.module {
            Some(module) => Ok(module),
            None => hook::agent_module().map_err(|e| Error::HookInstall {
                procedure: procedure_name.to_string(),
                reason: format!("agent module not found: {}", e),
            }),
        }
    }
}

impl RelayTransport for Win32Transport {
    type Hook = HookHandle;
    type Channel = ReturnChannel;

    fn owner_thread(&self, window: WindowHandle) -> u32 {
        hook::owner_thread(window)
    }

    fn install_hook(
        &mut self,
        procedure_name: &str,
        procedure_type: i32,
        scope: HookScope,
    ) -> Result<HookHandle> {
        let module = self.hook_module(procedure_name)?;
        hook::install(module, procedure_name, procedure_type, scope)
    }

    fn uninstall_hook(&mut self, hook: HookHandle) {
        hook::uninstall(hook);
    }

    fn create_channel(&mut self) -> Result<ReturnChannel> {
        ReturnChannel::create()
    }

    fn close_channel(&mut self, channel: ReturnChannel) {
        drop(channel);
    }

    fn pull(&mut self, channel: &mut ReturnChannel, out: &mut Vec<u8>) -> Result<usize> {
        channel.pull(out)
    }

    fn copy_data(&mut self, target: Option<WindowHandle>, payload: &[u8]) -> Result<isize> {
        receiver::push(target, payload)
    }

    fn clear_staging(&mut self) {
        match staging() {
            Ok(mut mailbox) => mailbox.clear(),
            Err(e) => warn!(error = %e, "Unable to clear staging mailbox"),
        }
    }
}
