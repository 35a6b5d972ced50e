#[cfg(windows)]
mod controller;
#[cfg_attr(not(windows), allow(dead_code))]
mod idle;

use clap::{Parser, Subcommand};
use hookrelay_shared::WindowHandle;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hookrelay")]
#[command(about = "Install relay hooks into a host process and collect what the agent sends back")]
struct Cli {
    /// Log filter (e.g. "info", "hookrelay_shared=trace")
    #[arg(long, global = true, env = "HOOKRELAY_LOG", default_value = "info")]
    log_level: String,

    /// Agent DLL exporting the hook procedures. Required to install hooks:
    /// this executable exports none, so without it installation fails
    #[arg(long, global = true, env = "HOOKRELAY_AGENT")]
    agent: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a hook and print messages arriving on the return channel
    Watch {
        /// Hook procedure exported by the agent module
        #[arg(short, long)]
        procedure: String,
        /// Hook type (WH_* value, e.g. 3 for WH_GETMESSAGE)
        #[arg(short = 't', long)]
        hook_type: i32,
        /// Window whose thread is hooked (hex or decimal); omit for all threads
        #[arg(short, long, value_parser = parse_window_handle)]
        window: Option<WindowHandle>,
        /// Create the return channel and pull from it
        #[arg(long)]
        two_way: bool,
        /// Fail instead of continuing without the hook or channel
        #[arg(long)]
        strict: bool,
        /// Stop after this many messages
        #[arg(short, long)]
        count: Option<usize>,
    },
    /// Install a hook on a window's thread and push text to that window
    Send {
        #[arg(short, long)]
        procedure: String,
        #[arg(short = 't', long)]
        hook_type: i32,
        #[arg(short, long, value_parser = parse_window_handle)]
        window: WindowHandle,
        /// Text to push
        text: String,
    },
    /// Write a message into the return channel as a client
    Write {
        /// Process id reported with the write (default: this process)
        #[arg(long)]
        pid: Option<u32>,
        text: String,
    },
    /// Inspect the shared staging mailbox
    Mailbox {
        #[command(subcommand)]
        action: MailboxAction,
    },
}

#[derive(Subcommand)]
enum MailboxAction {
    /// Retrieve (and consume) the pending payload
    Read {
        /// Decode the payload as UTF-16 text
        #[arg(long)]
        text: bool,
    },
    /// Discard the pending payload
    Clear,
    /// Show slot state without consuming it
    Status,
}

/// Parse a window handle given as `0x`-prefixed hex or decimal.
fn parse_window_handle(value: &str) -> Result<WindowHandle, String> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => isize::from_str_radix(hex, 16),
        None => value.parse::<isize>(),
    };

    match parsed {
        Ok(0) => Err("window handle must not be zero".to_string()),
        Ok(handle) => Ok(WindowHandle(handle)),
        Err(e) => Err(format!("invalid window handle '{}': {}", value, e)),
    }
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(e) = run(cli.command, cli.agent.as_deref()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(windows)]
fn run(command: Commands, agent: Option<&Path>) -> hookrelay_shared::Result<()> {
    use hookrelay_shared::{CommunicationMode, FailurePolicy, HookSettings};

    match command {
        Commands::Watch {
            procedure,
            hook_type,
            window,
            two_way,
            strict,
            count,
        } => {
            let mut settings = HookSettings::new(procedure, hook_type)
                .with_mode(if two_way {
                    CommunicationMode::TwoWay
                } else {
                    CommunicationMode::OneWay
                })
                .with_policy(if strict {
                    FailurePolicy::Strict
                } else {
                    FailurePolicy::Degrade
                });
            settings.window = window;
            controller::watch(agent, &settings, count)
        }
        Commands::Send {
            procedure,
            hook_type,
            window,
            text,
        } => controller::send(
            agent,
            &HookSettings::new(procedure, hook_type).with_window(window),
            &text,
        ),
        Commands::Write { pid, text } => {
            controller::write(pid.unwrap_or_else(std::process::id), &text)
        }
        Commands::Mailbox { action } => match action {
            MailboxAction::Read { text } => controller::mailbox_read(text),
            MailboxAction::Clear => controller::mailbox_clear(),
            MailboxAction::Status => controller::mailbox_status(),
        },
    }
}

#[cfg(not(windows))]
fn run(_command: Commands, _agent: Option<&Path>) -> hookrelay_shared::Result<()> {
    Err(hookrelay_shared::Error::InvalidState(
        "hookrelay hooks and pipes are only available on Windows".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_window_handle() {
        assert_eq!(parse_window_handle("0x1A2B"), Ok(WindowHandle(0x1A2B)));
        assert_eq!(parse_window_handle("0X10"), Ok(WindowHandle(0x10)));
        assert_eq!(parse_window_handle(" 4660 "), Ok(WindowHandle(4660)));
        assert!(parse_window_handle("0").is_err());
        assert!(parse_window_handle("0xZZ").is_err());
        assert!(parse_window_handle("window").is_err());
    }

    #[test]
    fn test_parse_watch_command() {
        let cli = Cli::try_parse_from([
            "hookrelay",
            "watch",
            "--procedure",
            "GetMessageProc",
            "-t",
            "3",
            "--window",
            "0x40",
            "--two-way",
            "--count",
            "2",
        ])
        .unwrap();

        match cli.command {
            Commands::Watch {
                procedure,
                hook_type,
                window,
                two_way,
                strict,
                count,
            } => {
                assert_eq!(procedure, "GetMessageProc");
                assert_eq!(hook_type, 3);
                assert_eq!(window, Some(WindowHandle(0x40)));
                assert!(two_way);
                assert!(!strict);
                assert_eq!(count, Some(2));
            }
            _ => panic!("expected watch command"),
        }
    }
}
