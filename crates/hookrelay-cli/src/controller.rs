//! Controller side commands.

use crate::idle::EmptyPulls;
use hookrelay_agent::{AgentHookProcessor, processor, processor_for_module, staging, write_bytes};
use hookrelay_shared::{CommunicationMode, Error, HookSettings, MailboxError, Result, SlotState};
use std::path::Path;
use tracing::{info, warn};

fn new_processor(agent: Option<&Path>) -> Result<AgentHookProcessor> {
    match agent {
        Some(path) => processor_for_module(path),
        None => Ok(processor()),
    }
}

/// Print a received payload, as text when it looks like UTF-8.
fn print_payload(index: usize, payload: &[u8]) {
    match std::str::from_utf8(payload) {
        Ok(text) => println!("[{}] {} bytes: {}", index, payload.len(), text),
        Err(_) => println!("[{}] {} bytes: {:02X?}", index, payload.len(), payload),
    }
}

/// Install the hook and, in two-way mode, pull messages from the return channel.
pub fn watch(
    agent: Option<&Path>,
    settings: &HookSettings,
    count: Option<usize>,
) -> Result<()> {
    let mut processor = new_processor(agent)?;
    processor.initialize(settings)?;

    if !processor.is_hook_installed() {
        warn!("Continuing without an installed hook");
    }

    if settings.mode == CommunicationMode::OneWay || !processor.is_channel_open() {
        println!("Hook active. Press Enter to uninstall...");
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        return Ok(());
    }

    println!("Waiting for messages on the return channel...");
    let mut received = 0usize;
    let mut empty = EmptyPulls::default();
    while count.is_none_or(|limit| received < limit) {
        let mut message = Vec::new();
        let total = processor.pull_bytes(&mut message)?;
        if !empty.record(total) {
            return Err(Error::ChannelUnavailable(format!(
                "{} pulls in a row returned no data",
                empty.consecutive()
            )));
        }
        if total == 0 {
            continue;
        }
        received += 1;
        print_payload(received, &message);
    }

    info!(received, "Finished watching return channel");
    Ok(())
}

/// Hook the window's thread and push `text` to it.
pub fn send(agent: Option<&Path>, settings: &HookSettings, text: &str) -> Result<()> {
    let mut processor = new_processor(agent)?;
    processor.initialize(settings)?;
    processor.push_text(text)?;
    println!("Pushed {} characters", text.chars().count());
    Ok(())
}

/// Write `text` into the return channel as a client.
pub fn write(process_id: u32, text: &str) -> Result<()> {
    write_bytes(process_id, text.as_bytes())?;
    println!("Wrote {} bytes to the return channel", text.len());
    Ok(())
}

pub fn mailbox_read(as_text: bool) -> Result<()> {
    let mut mailbox = staging()?;
    if mailbox.state() != SlotState::Full {
        return Err(Error::Mailbox(MailboxError::Empty));
    }

    if as_text {
        println!("{}", mailbox.retrieve_text());
    } else {
        let payload = mailbox.take();
        print_payload(mailbox.sequence() as usize, &payload);
    }
    Ok(())
}

pub fn mailbox_clear() -> Result<()> {
    staging()?.clear();
    println!("Mailbox cleared");
    Ok(())
}

pub fn mailbox_status() -> Result<()> {
    let mailbox = staging()?;
    println!("State:       {:?}", mailbox.state());
    println!("Sequence:    {}", mailbox.sequence());
    println!("Size in use: {}", mailbox.size_in_use());
    println!("Capacity:    {}", mailbox.capacity());
    Ok(())
}
