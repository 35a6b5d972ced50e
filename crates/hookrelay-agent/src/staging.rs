//! Process-wide staging mailbox shared by every process that loads the agent.

use hookrelay_shared::{MAILBOX_NAME, MAX_BUFFER_SIZE, Mailbox, Result, SharedRegion};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

type StagingMailbox = Mailbox<SharedRegion>;

static STAGING: OnceLock<Mutex<StagingMailbox>> = OnceLock::new();

fn lock(mailbox: &'static Mutex<StagingMailbox>) -> MutexGuard<'static, StagingMailbox> {
    mailbox.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lock the staging mailbox, mapping it on first use.
///
/// The slot is sized once, to [`MAX_BUFFER_SIZE`], for every process.
pub fn staging() -> Result<MutexGuard<'static, Mailbox<SharedRegion>>> {
    if let Some(mailbox) = STAGING.get() {
        return Ok(lock(mailbox));
    }

    let region = SharedRegion::open_or_create(MAILBOX_NAME, MAX_BUFFER_SIZE)?;
    let mailbox = Mailbox::new(region)?;
    Ok(lock(STAGING.get_or_init(|| Mutex::new(mailbox))))
}
