//! Bookkeeping for empty pulls while watching the return channel.

/// Consecutive empty pulls after which `watch` gives up on the channel
pub const MAX_EMPTY_PULLS: usize = 3;

/// Counts consecutive pulls that delivered nothing.
#[derive(Debug)]
pub struct EmptyPulls {
    consecutive: usize,
    limit: usize,
}

impl EmptyPulls {
    pub fn new(limit: usize) -> Self {
        Self {
            consecutive: 0,
            limit,
        }
    }

    /// Record the bytes one pull delivered.
    ///
    /// Returns `false` once `limit` pulls in a row came back empty.
    pub fn record(&mut self, received: usize) -> bool {
        if received > 0 {
            self.consecutive = 0;
            return true;
        }
        self.consecutive += 1;
        self.consecutive < self.limit
    }

    pub fn consecutive(&self) -> usize {
        self.consecutive
    }
}

impl Default for EmptyPulls {
    fn default() -> Self {
        Self::new(MAX_EMPTY_PULLS)
    }
}
