//! Named shared memory backing for the staging mailbox
//!
//! Every process that loads the agent module maps the same named section, so
//! a payload stored by one side can be retrieved by the other. Whichever
//! process maps it first writes the slot header.

use crate::mailbox::{SLOT_HEADER_SIZE, SlotHeader, SlotRegion};
use crate::{MAGIC, Result};
use std::sync::atomic::AtomicU32;
use tracing::debug;
use windows::Win32::Foundation::{
    CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, HANDLE, INVALID_HANDLE_VALUE,
};
use windows::Win32::System::Memory::{
    CreateFileMappingW, FILE_MAP_ALL_ACCESS, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile,
    PAGE_READWRITE, UnmapViewOfFile,
};
use windows::core::{Error, PCWSTR};

/// Mapped view of the named mailbox section
pub struct SharedRegion {
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
    capacity: usize,
}

// SAFETY: the view stays mapped for the lifetime of the region and all header
// fields other processes touch concurrently are atomics.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Create the named section, or open it if another process already did.
    pub fn open_or_create(name: &str, capacity: usize) -> Result<Self> {
        let total_size = SLOT_HEADER_SIZE + capacity;
        let name_wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();

        unsafe {
            let handle = CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                None,
                PAGE_READWRITE,
                0,
                total_size as u32,
                PCWSTR(name_wide.as_ptr()),
            )?;
            let existed = GetLastError() == ERROR_ALREADY_EXISTS;

            let view = MapViewOfFile(handle, FILE_MAP_ALL_ACCESS, 0, 0, total_size);
            if view.Value.is_null() {
                let error = Error::from_win32();
                let _ = CloseHandle(handle);
                return Err(error.into());
            }

            // A fresh section is zero-filled, so a missing magic means nobody
            // has written the header yet.
            let header = &mut *(view.Value as *mut SlotHeader);
            if !existed || header.magic != MAGIC {
                header.magic = MAGIC;
                header.capacity = capacity as u32;
                header.size_in_use = AtomicU32::new(capacity as u32);
                header.state = AtomicU32::new(0);
                header.sequence = AtomicU32::new(0);
                header.reserved = [0; 3];
            }

            debug!(name, capacity, existed, "Mapped mailbox section");
            Ok(Self {
                handle,
                view,
                capacity,
            })
        }
    }
}

impl SlotRegion for SharedRegion {
    fn header(&self) -> &SlotHeader {
        unsafe { &*(self.view.Value as *const SlotHeader) }
    }

    fn payload(&self) -> &[u8] {
        unsafe {
            let ptr = (self.view.Value as *const u8).add(SLOT_HEADER_SIZE);
            std::slice::from_raw_parts(ptr, self.capacity)
        }
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        unsafe {
            let ptr = (self.view.Value as *mut u8).add(SLOT_HEADER_SIZE);
            std::slice::from_raw_parts_mut(ptr, self.capacity)
        }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            let _ = UnmapViewOfFile(self.view);
            let _ = CloseHandle(self.handle);
        }
    }
}
