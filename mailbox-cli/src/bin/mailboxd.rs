//! Mailbox daemon
//!
//! Creates the mailbox device and serves clients until `mailbox --shutdown`.

use anyhow::{Context, Result};
use chardev_mailbox::{
    DeviceConfig, DeviceServer, MailboxConfig, MailboxService, DEFAULT_DEVICE_NAME, MAX_ENTRIES,
};
use clap::Parser;
use console::style;
use mailbox_cli::init_tracing;
use tracing::info;

#[derive(Parser)]
#[command(name = "mailboxd")]
#[command(about = "📬 Chardev Mailbox Daemon", long_about = None)]
struct Args {
    /// Mailbox device name
    #[arg(short, long, default_value = DEFAULT_DEVICE_NAME)]
    device: String,

    /// Messages kept before the oldest is evicted
    #[arg(long, default_value_t = MAX_ENTRIES)]
    max_entries: usize,

    /// Maximum number of connected clients
    #[arg(long, default_value = "16")]
    max_clients: usize,

    /// Number of request queue slots
    #[arg(long, default_value = "32")]
    request_slots: usize,
}

fn main() -> Result<()> {
    init_tracing("info");
    let args = Args::parse();

    let service = MailboxService::with_config(MailboxConfig {
        max_entries: args.max_entries,
        ..MailboxConfig::default()
    });
    let config = DeviceConfig {
        max_clients: args.max_clients,
        request_slots: args.request_slots,
        ..DeviceConfig::default()
    };

    info!(
        device = %args.device,
        max_entries = args.max_entries,
        max_clients = args.max_clients,
        request_slots = args.request_slots,
        "starting mailboxd"
    );
    let server = DeviceServer::create(&args.device, config, service)
        .with_context(|| format!("cannot create mailbox device '{}'", args.device))?;

    println!(
        "{} serving {} ({} entries, {} clients)",
        style("📬").bold(),
        style(server.name()).green(),
        args.max_entries,
        args.max_clients
    );

    server.run();
    info!(device = %args.device, "mailboxd exiting");
    Ok(())
}
