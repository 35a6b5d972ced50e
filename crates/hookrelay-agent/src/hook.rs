//! Installation and removal of the Windows hook.

use hookrelay_shared::{Error, HookScope, Result, WindowHandle};
use std::ffi::{CString, c_void};
use std::path::Path;
use tracing::{debug, trace, warn};
use windows::Win32::Foundation::{HINSTANCE, HMODULE, HWND, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::{
    GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    GetModuleHandleExW, GetProcAddress, LoadLibraryW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    GetWindowThreadProcessId, HHOOK, SetWindowsHookExW, UnhookWindowsHookEx, WINDOWS_HOOK_ID,
};
use windows::core::{PCSTR, PCWSTR};

/// Signature of an exported hook procedure
type HookProcedure = unsafe extern "system" fn(i32, WPARAM, LPARAM) -> LRESULT;

/// An installed hook, removed when dropped.
#[derive(Debug)]
pub struct HookHandle(HHOOK);

impl Drop for HookHandle {
    fn drop(&mut self) {
        trace!("Removing hook");
        if let Err(e) = unsafe { UnhookWindowsHookEx(self.0) } {
            warn!(error = %e, "Unable to remove hook");
        }
    }
}

/// Module handle of the DLL this code is linked into.
pub fn agent_module() -> Result<HMODULE> {
    let mut module = HMODULE::default();
    unsafe {
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(agent_module as *const () as *const u16),
            &mut module,
        )?;
    }
    Ok(module)
}

/// Load an agent DLL whose exports will be installed as hook procedures.
pub fn load_agent_module(path: &Path) -> Result<HMODULE> {
    let path_wide: Vec<u16> = path
        .to_string_lossy()
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();

    let module = unsafe { LoadLibraryW(PCWSTR::from_raw(path_wide.as_ptr())) }?;
    debug!(path = %path.display(), "Loaded agent module");
    Ok(module)
}

/// Thread that owns `window`, or 0 if the window is gone.
pub fn owner_thread(window: WindowHandle) -> u32 {
    unsafe { GetWindowThreadProcessId(HWND(window.0 as *mut c_void), None) }
}

/// Resolve `procedure_name` in `module` and install it as a `procedure_type`
/// hook over `scope`.
pub fn install(
    module: HMODULE,
    procedure_name: &str,
    procedure_type: i32,
    scope: HookScope,
) -> Result<HookHandle> {
    trace!(procedure = procedure_name, procedure_type, ?scope, "Installing hook");
    let hook_error = |reason: String| Error::HookInstall {
        procedure: procedure_name.to_string(),
        reason,
    };

    let name = CString::new(procedure_name)
        .map_err(|e| hook_error(format!("invalid procedure name: {}", e)))?;

    let procedure: HookProcedure = unsafe {
        match GetProcAddress(module, PCSTR(name.as_ptr() as *const u8)) {
            Some(p) => {
                std::mem::transmute::<unsafe extern "system" fn() -> isize, HookProcedure>(p)
            }
            None => {
                warn!(
                    procedure = procedure_name,
                    "Unable to get address of hook procedure"
                );
                return Err(hook_error("procedure not exported by the agent module".into()));
            }
        }
    };

    let hook = unsafe {
        SetWindowsHookExW(
            WINDOWS_HOOK_ID(procedure_type),
            Some(procedure),
            HINSTANCE(module.0),
            scope.thread_id(),
        )
    }
    .map_err(|e| {
        warn!(procedure = procedure_name, error = %e, "Unable to set windows hook");
        hook_error(e.to_string())
    })?;

    Ok(HookHandle(hook))
}

/// Remove an installed hook.
pub fn uninstall(hook: HookHandle) {
    drop(hook);
}
