//! Log setup. Diagnostics go to stderr through `tracing`; stdout is left for the
//! moves and summaries the CLI prints.

use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Level for the `boardsight` crate at a given `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "boardsight=info",
        1 => "boardsight=debug",
        _ => "boardsight=trace",
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `verbosity`.
/// Calling this more than once is a no-op.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_timer(fmt::time::Uptime::default())
        .with_target(false)
        .finish()
        .try_init();
}
