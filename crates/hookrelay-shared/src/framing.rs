//! Reassembly of message-mode reads
//!
//! A message-mode pipe hands back at most one frame per read. When a message
//! is longer than the frame, the read reports that more data remains and the
//! caller keeps reading until the final piece arrives.

use crate::Result;
use tracing::{debug, trace};

/// Outcome of one frame read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Last piece of the current message (bytes read)
    Complete(usize),
    /// More of the current message remains (bytes read)
    More(usize),
}

/// Source of message frames.
pub trait FrameRead {
    /// Read up to `buf.len()` bytes of the current message.
    fn read_frame(&mut self, buf: &mut [u8]) -> Result<FrameStatus>;
}

/// Read one whole message into `out`, one frame at a time.
///
/// Returns the total length of `out`. A failed read ends the message; bytes
/// accumulated before the failure are kept.
pub fn reassemble<R: FrameRead>(reader: &mut R, frame_size: usize, out: &mut Vec<u8>) -> usize {
    let mut scratch = vec![0u8; frame_size];
    let mut frames = 0usize;

    loop {
        match reader.read_frame(&mut scratch) {
            Ok(FrameStatus::More(read)) => {
                out.extend_from_slice(&scratch[..read]);
                frames += 1;
            }
            Ok(FrameStatus::Complete(read)) => {
                out.extend_from_slice(&scratch[..read]);
                frames += 1;
                break;
            }
            Err(e) => {
                debug!(error = %e, frames, "Frame read failed, ending message");
                break;
            }
        }
    }

    trace!(frames, total = out.len(), "Reassembled message");
    out.len()
}
