//! Return channel: message-mode named pipe from the agent to the controller
//!
//! The controller creates the server end and blocks in [`ReturnChannel::pull`].
//! The agent connects as a client with [`write_bytes`], writes one message and
//! disconnects. Messages longer than one frame are reassembled on read.

use hookrelay_shared::{
    Error, FrameRead, FrameStatus, LOW_INTEGRITY_SDDL_SACL, PIPE_CONNECTION_TIMEOUT_MS,
    PIPE_FRAME_SIZE, PIPE_NAME, Result, reassemble,
};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_FILE_NOT_FOUND, ERROR_MORE_DATA, ERROR_NO_DATA, ERROR_PIPE_CONNECTED,
    GENERIC_READ, GENERIC_WRITE, HANDLE, HLOCAL, LocalFree,
};
use windows::Win32::Security::Authorization::{
    ConvertStringSecurityDescriptorToSecurityDescriptorW, SDDL_REVISION_1,
};
use windows::Win32::Security::{PSECURITY_DESCRIPTOR, SECURITY_ATTRIBUTES};
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_SHARE_NONE, OPEN_EXISTING, PIPE_ACCESS_DUPLEX,
    ReadFile, WriteFile,
};
use windows::Win32::System::Pipes::{
    ConnectNamedPipe, CreateNamedPipeW, DisconnectNamedPipe, NAMED_PIPE_MODE,
    PIPE_READMODE_MESSAGE, PIPE_TYPE_MESSAGE, PIPE_UNLIMITED_INSTANCES, PIPE_WAIT,
    SetNamedPipeHandleState, WaitNamedPipeW,
};
use windows::core::PCWSTR;

/// Delay between checks for a return channel that does not exist yet
const PIPE_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Server end of the return channel, closed when dropped.
pub struct ReturnChannel {
    handle: HANDLE,
}

impl ReturnChannel {
    /// Create the pipe so that low integrity clients can write to it.
    pub fn create() -> Result<Self> {
        let sddl = wide(LOW_INTEGRITY_SDDL_SACL);
        let mut descriptor = PSECURITY_DESCRIPTOR::default();
        unsafe {
            ConvertStringSecurityDescriptorToSecurityDescriptorW(
                PCWSTR(sddl.as_ptr()),
                SDDL_REVISION_1,
                &mut descriptor,
                None,
            )
        }
        .map_err(|e| Error::ChannelUnavailable(format!("invalid security descriptor: {}", e)))?;

        let attributes = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: descriptor.0,
            bInheritHandle: false.into(),
        };

        let name = wide(PIPE_NAME);
        let handle = unsafe {
            CreateNamedPipeW(
                PCWSTR(name.as_ptr()),
                PIPE_ACCESS_DUPLEX,
                PIPE_TYPE_MESSAGE | PIPE_READMODE_MESSAGE | PIPE_WAIT,
                PIPE_UNLIMITED_INSTANCES,
                PIPE_FRAME_SIZE as u32,
                0,
                0,
                Some(&attributes as *const SECURITY_ATTRIBUTES),
            )
        };
        let create_error = handle
            .is_invalid()
            .then(windows::core::Error::from_win32);

        unsafe {
            let _ = LocalFree(HLOCAL(descriptor.0));
        }

        if let Some(e) = create_error {
            return Err(Error::ChannelUnavailable(format!(
                "failed to create {}: {}",
                PIPE_NAME, e
            )));
        }

        debug!(name = PIPE_NAME, "Created return channel");
        Ok(Self { handle })
    }

    /// Wait for a client and append its message to `out`.
    ///
    /// A client that already wrote and closed before this call still has its
    /// message read. The instance is disconnected after every connect attempt
    /// so the next client can use it. Returns the total length of `out`.
    pub fn pull(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let connected = match unsafe { ConnectNamedPipe(self.handle, None) } {
            Ok(()) => true,
            Err(e)
                if e.code() == ERROR_PIPE_CONNECTED.to_hresult()
                    || e.code() == ERROR_NO_DATA.to_hresult() =>
            {
                true
            }
            Err(e) => {
                warn!(error = %e, "Return channel client failed to connect");
                false
            }
        };

        if connected {
            let mut frames = PipeFrames {
                handle: self.handle,
            };
            reassemble(&mut frames, PIPE_FRAME_SIZE, out);
        }

        if let Err(e) = unsafe { DisconnectNamedPipe(self.handle) } {
            debug!(error = %e, "Unable to disconnect return channel client");
        }

        Ok(out.len())
    }
}

impl Drop for ReturnChannel {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.handle);
        }
    }
}

struct PipeFrames {
    handle: HANDLE,
}

impl FrameRead for PipeFrames {
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<FrameStatus> {
        let mut read = 0u32;
        match unsafe { ReadFile(self.handle, Some(buf), Some(&mut read as *mut u32), None) } {
            Ok(()) => Ok(FrameStatus::Complete(read as usize)),
            Err(e) if e.code() == ERROR_MORE_DATA.to_hresult() => {
                Ok(FrameStatus::More(read as usize))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Client handle closed when dropped
struct PipeClient(HANDLE);

impl Drop for PipeClient {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// Wait until a return channel instance is free to connect to.
///
/// Keeps polling while the pipe does not exist yet, so a controller that is
/// still starting up gets the full [`PIPE_CONNECTION_TIMEOUT_MS`].
fn wait_for_channel(name: &[u16]) -> Result<()> {
    let timeout = Duration::from_millis(PIPE_CONNECTION_TIMEOUT_MS as u64);
    let deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let wait_ms = (remaining.as_millis() as u32).max(1);
        match unsafe { WaitNamedPipeW(PCWSTR(name.as_ptr()), wait_ms) } {
            Ok(()) => return Ok(()),
            Err(e) if e.code() == ERROR_FILE_NOT_FOUND.to_hresult() && !remaining.is_zero() => {
                std::thread::sleep(PIPE_POLL_INTERVAL.min(remaining));
            }
            Err(e) => {
                return Err(Error::ChannelUnavailable(format!(
                    "{} not available after {} ms: {}",
                    PIPE_NAME, PIPE_CONNECTION_TIMEOUT_MS, e
                )));
            }
        }
    }
}

/// Write one message into the return channel.
///
/// Waits up to [`PIPE_CONNECTION_TIMEOUT_MS`] for the controller to create
/// the pipe or free its instance. `process_id` identifies the caller in logs
/// only.
pub fn write_bytes(process_id: u32, data: &[u8]) -> Result<()> {
    let name = wide(PIPE_NAME);
    wait_for_channel(&name)?;

    let handle = unsafe {
        CreateFileW(
            PCWSTR(name.as_ptr()),
            (GENERIC_READ | GENERIC_WRITE).0,
            FILE_SHARE_NONE,
            None,
            OPEN_EXISTING,
            FILE_FLAGS_AND_ATTRIBUTES(0),
            HANDLE::default(),
        )
    }
    .map_err(|e| Error::ChannelUnavailable(format!("unable to open {}: {}", PIPE_NAME, e)))?;
    let client = PipeClient(handle);

    let mode: NAMED_PIPE_MODE = PIPE_READMODE_MESSAGE;
    unsafe { SetNamedPipeHandleState(client.0, Some(&mode as *const NAMED_PIPE_MODE), None, None) }?;

    let mut written = 0u32;
    unsafe { WriteFile(client.0, Some(data), Some(&mut written as *mut u32), None) }?;

    debug!(process_id, written, "Wrote payload to return channel");
    Ok(())
}

/// [`write_bytes`], logging and discarding any failure.
pub fn write_bytes_lossy(process_id: u32, data: &[u8]) {
    if let Err(e) = write_bytes(process_id, data) {
        warn!(process_id, error = %e, "Skipped return channel write");
    }
}
