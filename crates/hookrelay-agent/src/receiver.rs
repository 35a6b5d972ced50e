//! Synchronous `WM_COPYDATA` push through a transient message-only window.
//!
//! The window exists only to give the destination a sender handle it can
//! answer through. It is created for one send and destroyed right after.
//!
//! N.B. the destination window procedure *must* copy the payload out of the
//! `COPYDATASTRUCT` before returning (see [`store_copy_data`]); the sender's
//! buffer is gone once `SendMessageW` returns.

use crate::hook::agent_module;
use hookrelay_shared::{COPY_DATA_TAG, Error, Mailbox, Result, SlotRegion, WindowHandle};
use std::ffi::c_void;
use tracing::{trace, warn};
use windows::Win32::Foundation::{
    ERROR_CLASS_ALREADY_EXISTS, HINSTANCE, HWND, LPARAM, LRESULT, WPARAM,
};
use windows::Win32::System::DataExchange::COPYDATASTRUCT;
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, HMENU, HWND_MESSAGE, RegisterClassExW,
    SendMessageW, WINDOW_EX_STYLE, WINDOW_STYLE, WM_COPYDATA, WNDCLASSEXW,
};
use windows::core::{PCWSTR, w};

const HOLDER_CLASS_NAME: PCWSTR = w!("HookRelayCopyDataHolderWindow");

unsafe extern "system" fn holder_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) }
}

fn register_holder_class(instance: HINSTANCE) -> Result<()> {
    let class = WNDCLASSEXW {
        cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
        lpfnWndProc: Some(holder_window_proc),
        hInstance: instance,
        lpszClassName: HOLDER_CLASS_NAME,
        ..Default::default()
    };

    if unsafe { RegisterClassExW(&class) } == 0 {
        let error = windows::core::Error::from_win32();
        if error.code() != ERROR_CLASS_ALREADY_EXISTS.to_hresult() {
            return Err(error.into());
        }
    }
    Ok(())
}

/// Message-only window destroyed when dropped.
struct CopyDataHolder {
    hwnd: HWND,
}

impl CopyDataHolder {
    fn create() -> Result<Self> {
        let instance = HINSTANCE(agent_module()?.0);
        register_holder_class(instance)?;

        let hwnd = unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                HOLDER_CLASS_NAME,
                PCWSTR::null(),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                HMENU::default(),
                instance,
                None,
            )
        }?;
        Ok(Self { hwnd })
    }

    /// Send `payload` to `destination`, naming this window as the sender.
    fn copy_data(&self, destination: HWND, payload: &[u8]) -> isize {
        // Transport-local copy, valid for the duration of the send.
        let mut buffer = payload.to_vec();
        let data = COPYDATASTRUCT {
            dwData: COPY_DATA_TAG,
            cbData: buffer.len() as u32,
            lpData: buffer.as_mut_ptr() as *mut c_void,
        };

        let result = unsafe {
            SendMessageW(
                destination,
                WM_COPYDATA,
                WPARAM(self.hwnd.0 as usize),
                LPARAM(&data as *const COPYDATASTRUCT as isize),
            )
        };
        result.0
    }
}

impl Drop for CopyDataHolder {
    fn drop(&mut self) {
        if let Err(e) = unsafe { DestroyWindow(self.hwnd) } {
            warn!(error = %e, "Unable to destroy copy data holder window");
        }
    }
}

/// Deliver `payload` to `target` with one blocking `WM_COPYDATA`.
///
/// Returns the destination's `LRESULT`.
pub fn push(target: Option<WindowHandle>, payload: &[u8]) -> Result<isize> {
    let Some(target) = target else {
        return Err(Error::InvalidState("no target window to push to".into()));
    };

    let holder = CopyDataHolder::create()?;
    let result = holder.copy_data(HWND(target.0 as *mut c_void), payload);
    trace!(%target, len = payload.len(), result, "Sent copy data message");
    Ok(result)
}

/// Copy the payload of a received `WM_COPYDATA` into `mailbox`.
///
/// Call from the `WM_COPYDATA` handler before it returns. Returns the bytes
/// stored.
///
/// # Safety
/// `lparam` must be the `LPARAM` of a `WM_COPYDATA` message currently being
/// handled.
pub unsafe fn store_copy_data<R: SlotRegion>(mailbox: &mut Mailbox<R>, lparam: LPARAM) -> usize {
    let data = unsafe { &*(lparam.0 as *const COPYDATASTRUCT) };
    if data.lpData.is_null() || data.cbData == 0 {
        return mailbox.store_bytes(&[]);
    }

    let payload =
        unsafe { std::slice::from_raw_parts(data.lpData as *const u8, data.cbData as usize) };
    mailbox.store_bytes(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hookrelay_shared::HeapRegion;
    use std::cell::{Cell, RefCell};
    use windows::Win32::UI::WindowsAndMessaging::IsWindow;

    const DESTINATION_CLASS_NAME: PCWSTR = w!("HookRelayTestDestinationWindow");

    thread_local! {
        static RECEIVED: RefCell<Mailbox<HeapRegion>> = RefCell::new(Mailbox::with_capacity(256));
        static SENDER: Cell<isize> = const { Cell::new(0) };
        static SENDER_WAS_WINDOW: Cell<bool> = const { Cell::new(false) };
        static TAG: Cell<usize> = const { Cell::new(0) };
    }

    unsafe extern "system" fn destination_window_proc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        if msg != WM_COPYDATA {
            return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
        }

        let sender = HWND(wparam.0 as *mut c_void);
        SENDER.with(|s| s.set(wparam.0 as isize));
        SENDER_WAS_WINDOW.with(|s| s.set(unsafe { IsWindow(sender) }.as_bool()));
        TAG.with(|t| t.set(unsafe { (*(lparam.0 as *const COPYDATASTRUCT)).dwData }));
        let stored = RECEIVED.with(|m| unsafe { store_copy_data(&mut *m.borrow_mut(), lparam) });
        LRESULT(stored as isize)
    }

    /// Message-only window that stores every `WM_COPYDATA` it receives.
    fn destination_window() -> HWND {
        let instance = HINSTANCE(agent_module().expect("agent module").0);
        let class = WNDCLASSEXW {
            cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
            lpfnWndProc: Some(destination_window_proc),
            hInstance: instance,
            lpszClassName: DESTINATION_CLASS_NAME,
            ..Default::default()
        };
        unsafe { RegisterClassExW(&class) };

        unsafe {
            CreateWindowExW(
                WINDOW_EX_STYLE(0),
                DESTINATION_CLASS_NAME,
                PCWSTR::null(),
                WINDOW_STYLE(0),
                0,
                0,
                0,
                0,
                HWND_MESSAGE,
                HMENU::default(),
                instance,
                None,
            )
        }
        .expect("create destination window")
    }

    #[test]
    fn test_push_delivers_payload_to_destination_mailbox() {
        let destination = destination_window();
        let payload = b"relayed through WM_COPYDATA";

        let result = push(Some(WindowHandle(destination.0 as isize)), payload).expect("push");

        assert_eq!(result, payload.len() as isize);
        assert_eq!(TAG.with(Cell::get), COPY_DATA_TAG);
        assert!(SENDER_WAS_WINDOW.with(Cell::get));
        assert_ne!(SENDER.with(Cell::get), destination.0 as isize);

        // The holder window only lives for the duration of the send.
        let holder = HWND(SENDER.with(Cell::get) as *mut c_void);
        assert!(!unsafe { IsWindow(holder) }.as_bool());

        let received = RECEIVED.with(|m| m.borrow_mut().take());
        assert_eq!(received, payload);

        unsafe { DestroyWindow(destination) }.expect("destroy destination window");
    }

    #[test]
    fn test_push_without_target_is_rejected() {
        assert!(matches!(push(None, b"nowhere"), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_store_copy_data_copies_payload() {
        let mut source = b"copy me".to_vec();
        let data = COPYDATASTRUCT {
            dwData: COPY_DATA_TAG,
            cbData: source.len() as u32,
            lpData: source.as_mut_ptr() as *mut c_void,
        };
        let mut mailbox = Mailbox::with_capacity(64);

        let stored = unsafe {
            store_copy_data(&mut mailbox, LPARAM(&data as *const COPYDATASTRUCT as isize))
        };

        // The mailbox owns its copy once the handler returns.
        source.fill(0);
        assert_eq!(stored, 7);
        assert_eq!(mailbox.take(), b"copy me");
    }

    #[test]
    fn test_store_copy_data_without_payload_stores_nothing() {
        let data = COPYDATASTRUCT {
            dwData: COPY_DATA_TAG,
            cbData: 0,
            lpData: std::ptr::null_mut(),
        };
        let mut mailbox = Mailbox::with_capacity(64);
        mailbox.store_bytes(b"stale");

        let stored = unsafe {
            store_copy_data(&mut mailbox, LPARAM(&data as *const COPYDATASTRUCT as isize))
        };

        assert_eq!(stored, 0);
        assert!(mailbox.take().is_empty());
    }

    #[test]
    fn test_store_copy_data_truncates_to_capacity() {
        let mut source = vec![0xAB; 32];
        let data = COPYDATASTRUCT {
            dwData: COPY_DATA_TAG,
            cbData: source.len() as u32,
            lpData: source.as_mut_ptr() as *mut c_void,
        };
        let mut mailbox = Mailbox::with_capacity(16);

        let stored = unsafe {
            store_copy_data(&mut mailbox, LPARAM(&data as *const COPYDATASTRUCT as isize))
        };

        assert_eq!(stored, 16);
        assert_eq!(mailbox.take(), vec![0xAB; 16]);
    }
}
