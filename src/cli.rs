//! Command-line interface for rtlfix.
//!
//! Every subcommand operates on the same `ConfigSync` service the extension
//! host embeds, using the settings file and data directory given on the
//! command line (or the platform defaults).

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;

use rtlfix_config::{ConfigType, SyncSettings, format_timestamp, now_millis};

use crate::sync::{ConfigEvent, ConfigStatus, ConfigSync, CycleReport};

/// rtlfix - remote configuration sync for the RTL text fixer
#[derive(Parser)]
#[command(name = "rtlfix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file (default: ~/.config/rtlfix/settings.yaml)
    #[arg(long, value_name = "PATH", global = true)]
    pub settings: Option<PathBuf>,

    /// Directory holding the config store (overrides the settings file)
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level: off, error, warn, info, debug, trace
    #[arg(long, value_name = "LEVEL", global = true, value_parser = parse_log_level)]
    pub log_level: Option<log::LevelFilter>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Show sync metadata and the provenance of each config type
    Status,

    /// Print the active document for a config type
    Show {
        /// defaults, domains, styles or ui
        config_type: ConfigType,
    },

    /// Refresh from the remote source if the interval has elapsed
    Refresh {
        /// Refresh even if the interval has not elapsed
        #[arg(short, long)]
        force: bool,
    },

    /// Clear all cached configs and fall back to the bundled baseline
    Reset {
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Set the refresh interval in minutes (15 to 10080)
    Interval { minutes: u32 },

    /// Keep running, refreshing whenever the interval elapses
    Run,
}

fn parse_log_level(value: &str) -> Result<log::LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("invalid log level '{value}'"))
}

/// Options that apply to every subcommand
#[derive(Clone, Debug, Default)]
pub struct RuntimeOptions {
    pub settings_path: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub log_level: Option<log::LevelFilter>,
}

impl Cli {
    /// Split into the subcommand and the global options.
    pub fn into_parts(self) -> (Commands, RuntimeOptions) {
        (
            self.command,
            RuntimeOptions {
                settings_path: self.settings,
                data_dir: self.data_dir,
                log_level: self.log_level,
            },
        )
    }
}

/// Load settings for this invocation, applying command-line overrides.
pub fn load_settings(options: &RuntimeOptions) -> anyhow::Result<SyncSettings> {
    let mut settings = match &options.settings_path {
        Some(path) => SyncSettings::load_from(path)?,
        None => SyncSettings::load()?,
    };
    if let Some(dir) = &options.data_dir {
        settings.data_dir = Some(dir.clone());
    }
    Ok(settings)
}

/// Run a subcommand against `sync`.
pub async fn execute(command: Commands, sync: &ConfigSync) -> anyhow::Result<()> {
    match command {
        Commands::Status => {
            print!("{}", render_status(&sync.status()));
        }
        Commands::Show { config_type } => {
            println!("{}", sync.read(config_type).to_pretty_string());
        }
        Commands::Refresh { force } => {
            let handle = if force {
                sync.force_refresh()
            } else {
                match sync.check_and_refresh() {
                    Some(handle) => handle,
                    None => {
                        let minutes = minutes_until_due(&sync.status());
                        println!("Refresh not due (next check in {minutes} min).");
                        println!("Use --force to refresh now.");
                        return Ok(());
                    }
                }
            };
            let report = handle
                .wait()
                .await
                .context("Config sync worker stopped before the refresh finished")?;
            print!("{}", render_report(&report));
        }
        Commands::Reset { yes } => {
            if !yes && !confirm("Clear all cached configs and use the bundled baseline?")? {
                println!("Reset cancelled.");
                return Ok(());
            }
            sync.clear_all_configs().await?;
            println!("All cached configs cleared. Bundled configs are active.");
        }
        Commands::Interval { minutes } => {
            let applied = sync.update_refresh_interval(minutes)?;
            if applied != minutes {
                println!("Interval {minutes} min is out of range.");
            }
            println!("Refresh interval set to {applied} min.");
        }
        Commands::Run => run_forever(sync).await?,
    }
    Ok(())
}

async fn run_forever(sync: &ConfigSync) -> anyhow::Result<()> {
    let (consumer, mut events) = sync.register();
    let timer = sync.spawn_periodic();
    println!("Watching for config updates. Press Ctrl-C to stop.");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ConfigEvent::Refreshed(report)) => print!("{}", render_report(&report)),
                Some(ConfigEvent::Reset) => println!("Configs reset to bundled."),
                None => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                log::info!("Ctrl-C received, stopping");
                break;
            }
        }
    }

    sync.unregister(consumer);
    sync.shutdown();
    let _ = timer.await;
    Ok(())
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;

    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    let response = response.trim().to_lowercase();
    Ok(response == "y" || response == "yes")
}

fn minutes_until_due(status: &ConfigStatus) -> i64 {
    let Some(last_check) = status.last_check else {
        return 0;
    };
    let elapsed = (now_millis() - last_check).max(0) / 60_000;
    (i64::from(status.refresh_interval_minutes) - elapsed).max(0)
}

/// Human-readable status block.
pub fn render_status(status: &ConfigStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Last check:        {}\n",
        format_timestamp(status.last_check)
    ));
    out.push_str(&format!(
        "Last update:       {} ({})\n",
        format_timestamp(status.last_update_timestamp),
        status.last_update_status.display_name()
    ));
    out.push_str(&format!(
        "Last success:      {}\n",
        format_timestamp(status.last_successful_update)
    ));
    out.push_str(&format!(
        "Refresh interval:  {} min\n",
        status.refresh_interval_minutes
    ));
    out.push('\n');
    for entry in &status.per_type {
        let hash = entry
            .content_hash
            .as_deref()
            .map(|h| &h[..h.len().min(12)])
            .unwrap_or("-");
        out.push_str(&format!(
            "  {:<9} {:<8} {:<24} {}\n",
            entry.config_type.as_str(),
            entry.source.display_name(),
            format_timestamp(entry.timestamp),
            hash
        ));
    }
    out
}

/// Human-readable summary of one update cycle.
pub fn render_report(report: &CycleReport) -> String {
    let mut out = format!(
        "Update {}: {}/{} config(s) succeeded\n",
        report.status.display_name(),
        report.succeeded(),
        report.outcomes.len()
    );
    for (config_type, outcome) in &report.outcomes {
        out.push_str(&format!("  {:<9} {}\n", config_type.as_str(), outcome));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{TypeOutcome, TypeStatus};
    use rtlfix_config::{EntrySource, UpdateStatus};

    #[test]
    fn test_parse_show() {
        let cli = Cli::try_parse_from(["rtlfix", "show", "styles"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Show {
                config_type: ConfigType::Styles
            }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_type() {
        assert!(Cli::try_parse_from(["rtlfix", "show", "colors"]).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_log_level() {
        assert!(Cli::try_parse_from(["rtlfix", "status", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "rtlfix",
            "refresh",
            "--force",
            "--data-dir",
            "/tmp/rtlfix-data",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let (command, options) = cli.into_parts();
        assert_eq!(command, Commands::Refresh { force: true });
        assert_eq!(options.data_dir, Some(PathBuf::from("/tmp/rtlfix-data")));
        assert_eq!(options.log_level, Some(log::LevelFilter::Debug));
    }

    #[test]
    fn test_load_settings_applies_data_dir_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let options = RuntimeOptions {
            settings_path: Some(dir.path().join("settings.yaml")),
            data_dir: Some(dir.path().join("store")),
            log_level: None,
        };
        let settings = load_settings(&options).unwrap();
        assert_eq!(settings.resolved_data_dir(), dir.path().join("store"));
        assert!(dir.path().join("settings.yaml").exists());
    }

    #[test]
    fn test_render_status() {
        let status = ConfigStatus {
            last_check: None,
            last_update_timestamp: Some(0),
            last_update_status: UpdateStatus::Partial,
            last_successful_update: None,
            refresh_interval_minutes: 360,
            per_type: vec![TypeStatus {
                config_type: ConfigType::Ui,
                source: EntrySource::Remote,
                timestamp: Some(0),
                content_hash: Some("0123456789abcdef0123".into()),
            }],
        };
        let text = render_status(&status);
        assert!(text.contains("Last check:        never"));
        assert!(text.contains("1970-01-01 00:00:00 UTC (partial)"));
        assert!(text.contains("360 min"));
        assert!(text.contains("ui"));
        assert!(text.contains("0123456789ab"));
        assert!(!text.contains("0123456789abc"));
    }

    #[test]
    fn test_render_report() {
        let report = CycleReport {
            status: UpdateStatus::Success,
            outcomes: vec![(ConfigType::Domains, TypeOutcome::Unchanged)],
            started_at: 0,
            finished_at: 0,
        };
        let text = render_report(&report);
        assert!(text.starts_with("Update success: 1/1"));
        assert!(text.contains("domains   unchanged"));
    }

    #[test]
    fn test_minutes_until_due() {
        let mut status = ConfigStatus {
            last_check: None,
            last_update_timestamp: None,
            last_update_status: UpdateStatus::Never,
            last_successful_update: None,
            refresh_interval_minutes: 60,
            per_type: Vec::new(),
        };
        assert_eq!(minutes_until_due(&status), 0);
        status.last_check = Some(now_millis() - 15 * 60_000);
        assert_eq!(minutes_until_due(&status), 45);
    }
}
