//! clockctl entry point.
//!
//! Drives libclock through the bridge: sets alarms and waits for them,
//! lists pending alarms, and runs several clocks side by side to show that
//! events reach only the clock that scheduled them.

mod signals;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clock_bridge::{Clock, ClockEvent, EventCallbacks};
use clock_common::config::{Backend, BridgeConfig};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::signals::SignalHandler;

/// clockctl command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "clockctl",
    about = "Set and watch alarms on libclock",
    version,
    long_about = None
)]
struct Args {
    /// Path to a bridge configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Drive the native libclock instead of the configured backend.
    #[arg(long, global = true)]
    native: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set an alarm and wait for it to fire.
    Alarm {
        /// Delay before the alarm fires (e.g. "1s", "250ms").
        #[arg(long, short = 'd', value_parser = humantime::parse_duration)]
        delay: Option<Duration>,

        /// Message carried by the alarm.
        #[arg(long, short = 'm')]
        message: Option<String>,
    },
    /// Set alarms with the given delays and print the pending list.
    List {
        /// Delays of the alarms to set first.
        #[arg(value_parser = humantime::parse_duration)]
        delays: Vec<Duration>,
    },
    /// Run several clocks concurrently, each with its own alarm.
    Demo {
        /// Number of clocks.
        #[arg(long, short = 'n', default_value = "2")]
        clocks: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    let mut config = load_config(&args)?;
    if args.native {
        config.backend = Backend::Native;
    }
    info!(backend = ?config.backend, "Configuration loaded");

    let signals = SignalHandler::install();

    match args.command {
        Command::Alarm { delay, message } => {
            let delay = delay.unwrap_or(config.cli.default_delay);
            let message = message.unwrap_or_else(|| config.cli.default_message.clone());
            run_alarm(&config, signals, delay, &message)
        }
        Command::List { delays } => run_list(&config, &delays),
        Command::Demo { clocks } => run_demo(&config, signals, clocks),
    }
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!("clockctl={level},clock_bridge={level},clock_common={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `CLOCK_CONFIG_PATH` environment variable
/// 3. `config/clock.toml` (local development)
/// 4. Built-in defaults
fn load_config(args: &Args) -> Result<BridgeConfig> {
    if let Some(config_path) = &args.config {
        info!(?config_path, "Loading config from command-line argument");
        return BridgeConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("CLOCK_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from CLOCK_CONFIG_PATH");
            return BridgeConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from CLOCK_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "CLOCK_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    let local_path = PathBuf::from("config/clock.toml");
    if local_path.exists() {
        info!(?local_path, "Loading config from local path");
        return BridgeConfig::from_file(&local_path)
            .with_context(|| format!("Failed to load config from {local_path:?}"));
    }

    info!("No config file found, using built-in defaults");
    Ok(BridgeConfig::default())
}

fn create_clock(config: &BridgeConfig) -> Result<Clock> {
    Clock::builder()
        .config(config.clone())
        .build()
        .context("Failed to create clock")
}

/// Set one alarm, wait for its event and print it as JSON.
fn run_alarm(
    config: &BridgeConfig,
    signals: SignalHandler,
    delay: Duration,
    message: &str,
) -> Result<()> {
    let clock = create_clock(config)?;
    let events = clock.subscribe();

    clock
        .set_alarm(delay, message)
        .context("Failed to set alarm")?;

    let wait = delay + config.cli.wait_slack;
    let deadline = Instant::now() + wait;
    let mut fired = None;
    while fired.is_none() && !signals.shutdown_requested() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        // Short slices so a signal is noticed while the alarm is pending.
        if let Ok(ClockEvent::Alarm(alarm)) =
            events.recv_timeout(remaining.min(Duration::from_millis(100)))
        {
            fired = Some(alarm);
        }
    }

    clock.destroy().context("Failed to destroy clock")?;

    match fired {
        Some(alarm) => {
            println!("{}", serde_json::to_string(&ClockEvent::Alarm(alarm))?);
            Ok(())
        }
        None if signals.shutdown_requested() => {
            info!(
                signals = signals.signal_count(),
                "Interrupted before the alarm fired"
            );
            Ok(())
        }
        None => bail!(
            "alarm did not fire within {}",
            humantime::format_duration(wait)
        ),
    }
}

/// Set alarms with the given delays and print the pending list.
fn run_list(config: &BridgeConfig, delays: &[Duration]) -> Result<()> {
    let clock = create_clock(config)?;

    for (index, delay) in delays.iter().enumerate() {
        clock
            .set_alarm(*delay, &format!("alarm #{}", index + 1))
            .with_context(|| format!("Failed to set alarm #{}", index + 1))?;
    }

    let alarms = clock.list_alarms().context("Failed to list alarms")?;
    clock.destroy().context("Failed to destroy clock")?;

    println!("{}", serde_json::to_string_pretty(&alarms)?);
    Ok(())
}

/// Run `count` clocks on separate threads and check that each one only
/// receives its own alarm.
fn run_demo(config: &BridgeConfig, signals: SignalHandler, count: usize) -> Result<()> {
    if count == 0 {
        bail!("demo needs at least one clock");
    }

    let delay = config.cli.default_delay;
    let wait = delay + config.cli.wait_slack;

    let workers: Vec<_> = (0..count)
        .map(|index| {
            let config = config.clone();
            thread::Builder::new()
                .name(format!("demo-clock-{index}"))
                .spawn(move || -> Result<(String, Vec<String>)> {
                    let clock = create_clock(&config)?;
                    let received = Arc::new(Mutex::new(Vec::new()));
                    let sink = Arc::clone(&received);
                    clock.register_callbacks(EventCallbacks::new().on_alarm(move |alarm| {
                        if let Ok(mut messages) = sink.lock() {
                            messages.push(alarm.msg.clone());
                        }
                    }));

                    let message = format!("clock {index}");
                    clock.set_alarm(delay, &message)?;
                    signals.sleep_until(Instant::now() + wait);
                    clock.destroy()?;

                    let messages = received.lock().map(|m| m.clone()).unwrap_or_default();
                    Ok((message, messages))
                })
                .context("Failed to spawn demo thread")
        })
        .collect::<Result<_>>()?;

    let mut crossed = 0;
    for worker in workers {
        let (expected, received) = worker
            .join()
            .map_err(|_| anyhow::anyhow!("demo thread panicked"))??;
        let own = received.iter().filter(|m| **m == expected).count();
        let foreign = received.len() - own;
        crossed += foreign;
        println!("{expected}: {own} own alarm(s), {foreign} foreign alarm(s)");
    }

    if crossed > 0 {
        bail!("{crossed} alarm(s) were delivered to the wrong clock");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_alarm() {
        let args = Args::parse_from(["clockctl", "alarm", "-d", "250ms", "-m", "tea"]);
        match args.command {
            Command::Alarm { delay, message } => {
                assert_eq!(delay, Some(Duration::from_millis(250)));
                assert_eq!(message.as_deref(), Some("tea"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_args_list_with_config() {
        let args = Args::parse_from(["clockctl", "list", "1s", "2m", "-c", "clock.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("clock.toml")));
        match args.command {
            Command::List { delays } => {
                assert_eq!(delays, [Duration::from_secs(1), Duration::from_secs(120)]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_args_demo_defaults() {
        let args = Args::parse_from(["clockctl", "--native", "demo"]);
        assert!(args.native);
        assert!(matches!(args.command, Command::Demo { clocks: 2 }));
    }

    #[test]
    fn test_list_reports_pending_alarms() {
        let config = BridgeConfig::default();
        assert!(run_list(&config, &[Duration::from_secs(60)]).is_ok());
    }
}
