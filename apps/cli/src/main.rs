use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;
use visitflow_core::AppConfig;

use crate::{
    format::{format_duration, format_report_readable},
    simulate::SimulationOptions,
};

mod format;
mod simulate;

const CONFIG_ENV: &str = "VISITFLOW_CONFIG";

#[derive(Parser)]
#[command(name = "visitflow")]
#[command(about = "Batch visit events into storage and close idle guest sessions")]
struct Cli {
    /// Path to config.toml (falls back to $VISITFLOW_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the pipeline with synthetic traffic against the in-memory store
    Simulate {
        /// How long producers keep emitting events
        #[arg(long, default_value_t = 30)]
        duration_secs: u64,

        /// Number of concurrent producers
        #[arg(long, default_value_t = 4)]
        producers: usize,

        /// Number of guest sessions seeded before the run
        #[arg(long, default_value_t = 200)]
        sessions: usize,

        /// Interval between producer bursts
        #[arg(long, default_value_t = 100)]
        tick_ms: u64,

        /// Smallest burst per tick
        #[arg(long, default_value_t = 1)]
        min_events: usize,

        /// Largest burst per tick
        #[arg(long, default_value_t = 20)]
        max_events: usize,

        /// Print metrics as JSON instead of the readable summary
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .or_else(|| dirs::config_dir().map(|dir| dir.join("visitflow").join("config.toml")))
}

fn load_config(explicit: Option<PathBuf>) -> Result<AppConfig> {
    match config_path(explicit) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn create_spinner(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")?,
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    Ok(pb)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Command::Simulate {
            duration_secs,
            producers,
            sessions,
            tick_ms,
            min_events,
            max_events,
            json,
        } => {
            let opts = SimulationOptions {
                duration: Duration::from_secs(duration_secs),
                producers,
                sessions,
                tick: Duration::from_millis(tick_ms),
                min_events,
                max_events,
            };

            println!(
                "\n{}  {}\n",
                style("visitflow").cyan().bold(),
                style("Traffic Simulation").dim()
            );

            let start = Instant::now();
            let spinner = create_spinner(&format!(
                "Simulating {} producers over {} sessions for {}s...",
                producers, sessions, duration_secs
            ))?;
            let report = simulate::run(&config, opts).await?;
            spinner.finish_with_message(format!(
                "{} Simulation finished {}",
                style("✓").green().bold(),
                style(format!("[{}]", format_duration(start.elapsed()))).dim()
            ));

            println!("{}", style("─".repeat(60)).dim());

            if json {
                let metrics = serde_json::json!({
                    "run_id": report.run_id,
                    "produced": report.produced,
                    "tracker": report.tracker,
                    "sweeper": report.sweeper,
                    "active_sessions": report.active_sessions,
                    "stored_events": report.stored_events,
                });
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                println!("\n{}", format_report_readable(&report));
            }
        }
    }

    Ok(())
}
