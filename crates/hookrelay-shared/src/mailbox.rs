//! Single-slot staging mailbox
//!
//! Layout of a slot region:
//! ```text
//! ┌─────────────────────┐
//! │ magic: u32          │  <- 0x484B524C "HKRL"
//! │ capacity: u32       │  <- payload bytes available to the slot
//! │ size_in_use: u32    │  <- reset to capacity on every clear
//! │ state: u32          │  <- SlotState
//! │ sequence: u32       │  <- incremented by every store
//! │ reserved: [u32; 3]  │
//! ├─────────────────────┤
//! │ payload...          │  <- capacity bytes, zero-filled when cleared
//! └─────────────────────┘
//! ```
//!
//! Two families of operations work on the slot. `store_bytes`/`retrieve_bytes`
//! keep the legacy behaviour: a store always wins and a retrieve always
//! consumes. `try_store`/`try_take` claim the slot with a compare-and-swap on
//! the state word so two writers can never interleave.

use crate::error::MailboxError;
use crate::{MAGIC, MAX_BUFFER_SIZE};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, trace, warn};

/// Size of one wide character in bytes
const WIDE_CHAR_SIZE: usize = std::mem::size_of::<u16>();

/// Header at the start of every slot region
#[repr(C)]
pub struct SlotHeader {
    /// Magic value to verify a valid region
    pub magic: u32,
    /// Payload capacity in bytes
    pub capacity: u32,
    /// Bytes a retrieval reports
    pub size_in_use: AtomicU32,
    /// Current [`SlotState`]
    pub state: AtomicU32,
    /// Token of the most recent store
    pub sequence: AtomicU32,
    /// Reserved for future use / padding
    pub reserved: [u32; 3],
}

/// Size of [`SlotHeader`] in bytes (32)
pub const SLOT_HEADER_SIZE: usize = std::mem::size_of::<SlotHeader>();

impl SlotHeader {
    /// Create a header for an empty slot of `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity as u32;
        Self {
            magic: MAGIC,
            capacity,
            size_in_use: AtomicU32::new(capacity),
            state: AtomicU32::new(SlotState::Empty as u32),
            sequence: AtomicU32::new(0),
            reserved: [0; 3],
        }
    }
}

/// Occupancy of the slot
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing pending
    Empty = 0,
    /// A writer has claimed the slot
    Writing = 1,
    /// A payload is waiting to be retrieved
    Full = 2,
    /// A reader has claimed the slot
    Reading = 3,
}

impl From<u32> for SlotState {
    fn from(v: u32) -> Self {
        match v {
            1 => SlotState::Writing,
            2 => SlotState::Full,
            3 => SlotState::Reading,
            _ => SlotState::Empty,
        }
    }
}

/// Memory backing a mailbox: a header plus a payload area.
pub trait SlotRegion {
    fn header(&self) -> &SlotHeader;

    fn payload(&self) -> &[u8];

    fn payload_mut(&mut self) -> &mut [u8];
}

/// Process-local slot region
pub struct HeapRegion {
    header: SlotHeader,
    data: Box<[u8]>,
}

impl HeapRegion {
    pub fn new(capacity: usize) -> Self {
        Self {
            header: SlotHeader::new(capacity),
            data: vec![0u8; capacity].into_boxed_slice(),
        }
    }
}

impl SlotRegion for HeapRegion {
    fn header(&self) -> &SlotHeader {
        &self.header
    }

    fn payload(&self) -> &[u8] {
        &self.data
    }

    fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Encode text as UTF-16LE bytes without a terminator
pub fn encode_wide(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Single-slot staging buffer for one payload at a time.
pub struct Mailbox<R: SlotRegion> {
    region: R,
}

impl Mailbox<HeapRegion> {
    /// Create a process-local mailbox
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            region: HeapRegion::new(capacity),
        }
    }
}

impl Default for Mailbox<HeapRegion> {
    fn default() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }
}

impl<R: SlotRegion> Mailbox<R> {
    /// Wrap a region, verifying its header
    pub fn new(region: R) -> Result<Self, MailboxError> {
        let header = region.header();
        if header.magic != MAGIC || header.capacity as usize > region.payload().len() {
            return Err(MailboxError::BadRegion {
                magic: header.magic,
                capacity: header.capacity,
            });
        }
        Ok(Self { region })
    }

    fn header(&self) -> &SlotHeader {
        self.region.header()
    }

    /// Payload capacity of the slot
    pub fn capacity(&self) -> usize {
        self.header().capacity as usize
    }

    /// Size a retrieval will report
    pub fn size_in_use(&self) -> usize {
        self.header().size_in_use.load(Ordering::Acquire) as usize
    }

    /// Overwrite the size marker, clamped to the slot capacity
    pub fn set_size_in_use(&mut self, size: usize) {
        let capacity = self.capacity();
        if size > capacity {
            warn!(size, capacity, "Requested mailbox size exceeds capacity, clamping");
        }
        self.header()
            .size_in_use
            .store(size.min(capacity) as u32, Ordering::Release);
    }

    /// Token of the most recent store
    pub fn sequence(&self) -> u32 {
        self.header().sequence.load(Ordering::Acquire)
    }

    pub fn state(&self) -> SlotState {
        SlotState::from(self.header().state.load(Ordering::Acquire))
    }

    /// Check if a payload is waiting to be retrieved
    pub fn is_occupied(&self) -> bool {
        self.state() == SlotState::Full
    }

    /// Reset the size marker to capacity, zero the payload and mark the slot empty
    pub fn clear(&mut self) {
        self.reset_contents();
        self.header()
            .state
            .store(SlotState::Empty as u32, Ordering::Release);
    }

    fn reset_contents(&mut self) {
        let capacity = self.capacity();
        self.region.payload_mut()[..capacity].fill(0);
        self.header()
            .size_in_use
            .store(capacity as u32, Ordering::Release);
    }

    /// Copy `source` into a freshly reset slot. Returns the bytes copied.
    fn write_payload(&mut self, source: &[u8]) -> usize {
        let limit = self.size_in_use();
        let copied = source.len().min(limit);
        if source.len() < limit {
            self.header()
                .size_in_use
                .store(source.len() as u32, Ordering::Release);
        } else if source.len() > limit {
            debug!(
                len = source.len(),
                capacity = limit,
                "Payload truncated to mailbox capacity"
            );
        }

        self.region.payload_mut()[..copied].copy_from_slice(&source[..copied]);
        self.header().sequence.fetch_add(1, Ordering::AcqRel);
        copied
    }

    /// Store a payload, replacing anything pending.
    ///
    /// Copies at most `capacity` bytes; longer input is truncated silently.
    /// Returns the number of bytes stored.
    pub fn store_bytes(&mut self, source: &[u8]) -> usize {
        if self.is_occupied() {
            warn!(
                sequence = self.sequence(),
                "Overwriting a mailbox payload that was never retrieved"
            );
        }

        self.clear();
        let copied = self.write_payload(source);
        self.header()
            .state
            .store(SlotState::Full as u32, Ordering::Release);
        trace!(copied, sequence = self.sequence(), "Stored mailbox payload");
        copied
    }

    /// Take the payload out of the slot and clear it.
    ///
    /// When the stored size is at least `requested`, the whole stored payload
    /// is returned even if the caller asked for less. Otherwise `requested`
    /// bytes (bounded by capacity) are returned, zero-padded past the payload.
    pub fn retrieve_bytes(&mut self, requested: usize) -> Vec<u8> {
        let stored = self.size_in_use();
        let effective = if stored >= requested {
            stored
        } else {
            requested.min(self.capacity())
        };

        let bytes = self.region.payload()[..effective].to_vec();
        self.clear();
        trace!(effective, "Retrieved mailbox payload");
        bytes
    }

    /// Take the stored payload at its recorded size
    pub fn take(&mut self) -> Vec<u8> {
        self.retrieve_bytes(0)
    }

    /// Store text as UTF-16LE
    pub fn store_text(&mut self, text: &str) -> usize {
        self.store_bytes(&encode_wide(text))
    }

    /// Retrieve UTF-16LE text, forcing a terminator after the payload
    pub fn retrieve_text(&mut self) -> String {
        let local_size = self.size_in_use() + WIDE_CHAR_SIZE;
        let mut bytes = self.retrieve_bytes(local_size);
        bytes.resize(local_size, 0);

        let mut wide: Vec<u16> = bytes
            .chunks_exact(WIDE_CHAR_SIZE)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        if let Some(last) = wide.last_mut() {
            *last = 0;
        }

        let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
        String::from_utf16_lossy(&wide[..end])
    }

    /// Store a payload only if the slot is empty.
    ///
    /// Returns the sequence token of the new payload.
    pub fn try_store(&mut self, source: &[u8]) -> Result<u32, MailboxError> {
        self.header()
            .state
            .compare_exchange(
                SlotState::Empty as u32,
                SlotState::Writing as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| MailboxError::Occupied)?;

        self.reset_contents();
        self.write_payload(source);
        self.header()
            .state
            .store(SlotState::Full as u32, Ordering::Release);
        Ok(self.sequence())
    }

    /// Take the pending payload only if one was stored.
    pub fn try_take(&mut self) -> Result<Vec<u8>, MailboxError> {
        self.header()
            .state
            .compare_exchange(
                SlotState::Full as u32,
                SlotState::Reading as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| MailboxError::Empty)?;

        let size = self.size_in_use();
        let bytes = self.region.payload()[..size].to_vec();
        self.clear();
        Ok(bytes)
    }
}
