use anyhow::Result;
use clap::Parser;
use rtlfix::cli::{self, Cli};
use rtlfix::sync::ConfigSync;
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging init for cleaner output)
    let (command, options) = Cli::parse().into_parts();

    // Initialize unified logging: routes all log::info!() etc. to /tmp/rtlfix_debug.log.
    // When RUST_LOG is set, also mirrors to stderr.
    // CLI --log-level flag takes highest precedence, then RUST_LOG, then DEBUG_LEVEL.
    rtlfix::debug::init_log_bridge(options.log_level);

    log::info!("Starting rtlfix {}", rtlfix::VERSION);

    let settings = cli::load_settings(&options)?;

    // Create Tokio runtime for the scheduler worker and blocking fetches
    let runtime = Runtime::new()?;
    let result = runtime.block_on(async {
        let sync = ConfigSync::open(&settings)?;
        let result = cli::execute(command, &sync).await;
        sync.shutdown();
        result
    });

    // Use `shutdown_timeout` to avoid blocking forever on a fetch still
    // running on the blocking pool
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));

    if let Err(ref e) = result {
        log::error!("rtlfix failed: {e:#}");
    }
    result
}
