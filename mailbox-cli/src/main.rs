//! Mailbox CLI - reads and writes the mailbox device
//!
//!   mailbox "hello"      write a message (a newline is appended)
//!   mailbox -r           print every stored message
//!   mailbox -l           print only the newest message
//!   mailbox --clean      empty the mailbox
//!   mailbox --count      print the number of stored entries

use anyhow::{Context, Result};
use chardev_mailbox::command::{CLEAR_COMMAND, LAST_COMMAND};
use chardev_mailbox::{DeviceClient, DEFAULT_DEVICE_NAME};
use clap::{ArgGroup, Parser};
use console::style;
use mailbox_cli::{count_entries, init_tracing};
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "mailbox")]
#[command(about = "📬 Chardev Mailbox Client", long_about = None)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args(["read", "last", "clean", "count", "shutdown", "message"])
))]
struct Cli {
    /// Mailbox device name
    #[arg(short, long, default_value = DEFAULT_DEVICE_NAME)]
    device: String,

    /// Read every stored message
    #[arg(short, long)]
    read: bool,

    /// Show only the newest message
    #[arg(short, long)]
    last: bool,

    /// Clear the mailbox
    #[arg(long)]
    clean: bool,

    /// Count the stored entries
    #[arg(long)]
    count: bool,

    /// Stop the mailbox daemon
    #[arg(long)]
    shutdown: bool,

    /// Message to write
    message: Option<String>,
}

fn main() -> ExitCode {
    init_tracing("info");
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut client = DeviceClient::connect(&cli.device).with_context(|| {
        format!("cannot open mailbox device '{}' (is mailboxd running?)", cli.device)
    })?;
    debug!(device = %cli.device, client_id = client.client_id(), "connected");

    if cli.read {
        let dump = client.read_to_end().context("read failed")?;
        print_contents(&dump)?;
    } else if cli.last {
        client.write(LAST_COMMAND).context("cannot arm last-message mode")?;
        let last = client.read_to_end().context("read failed")?;
        print_contents(&last)?;
    } else if cli.clean {
        client.write(CLEAR_COMMAND).context("clear failed")?;
        println!("{} mailbox cleared", style("✓").green());
    } else if cli.count {
        let dump = client.read_to_end().context("read failed")?;
        println!("{}", count_entries(&dump));
    } else if cli.shutdown {
        info!(device = %cli.device, "requesting daemon shutdown");
        client.shutdown_server().context("shutdown failed")?;
        println!("{} daemon stopped", style("✓").green());
    } else if let Some(message) = &cli.message {
        let mut payload = Vec::with_capacity(message.len() + 1);
        payload.extend_from_slice(message.as_bytes());
        payload.push(b'\n');
        let written = client.write(&payload).context("write failed")?;
        println!("{} wrote {} bytes", style("✓").green(), written);
    }

    Ok(())
}

fn print_contents(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        println!("{}", style("(mailbox is empty)").dim());
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    stdout.write_all(bytes)?;
    if !bytes.ends_with(b"\n") {
        writeln!(stdout)?;
    }
    stdout.flush()?;
    Ok(())
}
