//! Shared setup for the mailbox binaries

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the tracing subscriber.
///
/// Environment variables:
/// - RUST_LOG: log filter (default: `default_level`)
/// - MAILBOX_TRACE_JSON: `1`/`true` for JSON output
///
/// Logs go to stderr so they never mix with mailbox contents on stdout.
pub fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let use_json = std::env::var("MAILBOX_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }
}

/// Number of newline-delimited entries in a mailbox dump
pub fn count_entries(dump: &[u8]) -> usize {
    dump.split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .count()
}
