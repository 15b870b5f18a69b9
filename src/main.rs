//! Symetrix GW - console host for a Symetrix DSP
//!
//! Connects to the unit, prints state changes and configured feedbacks, and
//! accepts commands from an interactive prompt.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use symetrix_gw::cli::{self, ReplCommand};
use symetrix_gw::config::{AppConfig, ConfigChange, ConfigWatcher, NamedFeedback};
use symetrix_gw::feedback::FeedbackOutput;
use symetrix_gw::session::{Endpoint, SessionHandle};
use symetrix_gw::state::StateEvent;

/// Symetrix GW - control a Symetrix DSP from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "symetrix.yaml")]
    config: String,

    /// DSP address (overrides the configuration file)
    #[arg(long, env = "DSP_HOST")]
    host: Option<String>,

    /// DSP control port (overrides the configuration file)
    #[arg(short, long, env = "DSP_PORT")]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long)]
    log_dir: Option<String>,

    /// Run without the interactive prompt
    #[arg(long)]
    no_repl: bool,
}

impl Args {
    fn endpoint(&self, config: &AppConfig) -> Endpoint {
        let base = config.endpoint();
        Endpoint::new(
            self.host.clone().unwrap_or(base.host),
            self.port.unwrap_or(base.port),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _log_guard = init_logging(&args.log_level, args.log_dir.as_deref())?;

    info!("Starting Symetrix GW v{}...", env!("CARGO_PKG_VERSION"));

    // A missing file means defaults and no hot reload
    let (config_watcher, config) = if Path::new(&args.config).exists() {
        info!("Configuration file: {}", args.config);
        let (watcher, config) = ConfigWatcher::new(&args.config).await?;
        (Some(watcher), config)
    } else {
        warn!("Config file {} not found, using defaults", args.config);
        (None, AppConfig::default())
    };

    let endpoint = args.endpoint(&config);
    let session = SessionHandle::spawn(endpoint.clone());

    let (event_tx, event_rx) = mpsc::unbounded_channel::<StateEvent>();
    session
        .subscribe(Arc::new(move |event: &StateEvent| {
            let _ = event_tx.send(event.clone());
        }))
        .await?;

    session.start()?;

    let repl_rx = if args.no_repl {
        None
    } else {
        cli::print_help();
        Some(cli::spawn_repl()?)
    };

    run_app(&args, &session, config, endpoint, config_watcher, event_rx, repl_rx).await?;

    session.destroy().await;
    info!("Symetrix GW shutdown complete");
    Ok(())
}

async fn run_app(
    args: &Args,
    session: &SessionHandle,
    mut config: AppConfig,
    mut endpoint: Endpoint,
    mut config_watcher: Option<ConfigWatcher>,
    mut event_rx: mpsc::UnboundedReceiver<StateEvent>,
    mut repl_rx: Option<mpsc::UnboundedReceiver<String>>,
) -> Result<()> {
    let mut feedback_outputs: HashMap<String, FeedbackOutput> = HashMap::new();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                cli::print_event(&event);
                refresh_feedbacks(session, &config.feedbacks, &mut feedback_outputs, false).await;
            }

            line = next_line(&mut repl_rx) => {
                let Some(line) = line else {
                    info!("Prompt closed");
                    break;
                };
                match cli::parse_command(&line) {
                    Ok(Some(ReplCommand::Quit)) => break,
                    Ok(Some(command)) => {
                        run_command(session, command, &config.feedbacks, &mut feedback_outputs).await?;
                    },
                    Ok(None) => {},
                    Err(e) => println!("{} {}", "✗".red(), e),
                }
            }

            Some(change) = next_change(&mut config_watcher) => {
                // Command-line overrides still win over the file
                let new_endpoint = args.endpoint(&change.config);
                if change.dsp_changed && new_endpoint != endpoint {
                    session.reconfigure(new_endpoint.host.clone(), new_endpoint.port)?;
                    endpoint = new_endpoint;
                }
                if change.feedbacks_changed {
                    info!("📝 Feedbacks reloaded ({} defined)", change.config.feedbacks.len());
                    feedback_outputs.clear();
                }
                config = change.config;
                refresh_feedbacks(session, &config.feedbacks, &mut feedback_outputs, false).await;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping event loop");
                break;
            }
        }
    }

    Ok(())
}

async fn run_command(
    session: &SessionHandle,
    command: ReplCommand,
    feedbacks: &[NamedFeedback],
    outputs: &mut HashMap<String, FeedbackOutput>,
) -> Result<()> {
    match command {
        ReplCommand::Action(action) => match session.issue(action).await {
            Ok(()) => println!("{} {}", "✓".green(), action),
            Err(e) => println!("{} {}: {}", "✗".red(), action, e),
        },
        ReplCommand::Show(only) => cli::print_snapshot(&session.snapshot().await?, only),
        ReplCommand::Json => {
            let snapshot = session.snapshot().await?;
            let json = serde_json::json!({
                "snapshot": snapshot,
                "variables": snapshot.variables(),
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        },
        ReplCommand::Feedbacks => {
            if feedbacks.is_empty() {
                println!("{}", "no feedbacks configured".dimmed());
            }
            refresh_feedbacks(session, feedbacks, outputs, true).await;
        },
        ReplCommand::Help => cli::print_help(),
        ReplCommand::Quit => {},
    }
    Ok(())
}

/// Evaluate feedbacks and print the ones that changed (or all with `force`)
async fn refresh_feedbacks(
    session: &SessionHandle,
    feedbacks: &[NamedFeedback],
    outputs: &mut HashMap<String, FeedbackOutput>,
    force: bool,
) {
    if feedbacks.is_empty() {
        return;
    }
    let snapshot = match session.snapshot().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            debug!("Feedback refresh skipped: {}", e);
            return;
        },
    };

    for named in feedbacks {
        let output = named.feedback.evaluate(&snapshot);
        if force || outputs.get(&named.name) != Some(&output) {
            cli::print_feedback(&named.name, &output);
            outputs.insert(named.name.clone(), output);
        }
    }
}

async fn next_line(rx: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_change(watcher: &mut Option<ConfigWatcher>) -> Option<ConfigChange> {
    match watcher {
        Some(watcher) => watcher.next_change().await,
        None => std::future::pending().await,
    }
}

fn init_logging(level: &str, log_dir: Option<&str>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "symetrix-gw.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
}
