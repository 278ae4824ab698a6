// Trial orchestration and cross-device trigger sync for number-tapping experiments

// Enable coverage attribute on nightly for explicit exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod audio;
pub mod audio_constants;
pub mod cli;
pub mod config;
pub mod events;
pub mod history;
pub mod operator;
pub mod plan;
pub mod relay;
pub mod server;
pub mod session;
pub mod session_log;
pub mod shutdown;
pub mod speech;
pub mod trial;
pub mod trigger;
pub mod upload;

use std::process::ExitCode;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use clap::Parser;

use cli::{Cli, Command};
use config::{AppConfig, ConfigError};
use events::LoggingEmitter;
use plan::{StimulusPlan, TriggerPlan};
use relay::{HttpRelayClient, RelayError, ScreenConsumer};
use server::ServerError;
use session::{ServicesError, SessionError, SessionServices, TaskSession};

// Re-export log macros for use throughout the crate
pub use log::{debug, error, info, trace, warn};

/// Errors that end a CLI command
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Services(#[from] ServicesError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Debug in debug builds, Info in release; `RUST_LOG` wins
fn init_logging() {
    let level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };
    // A second init (tests, embedding) keeps the first logger
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

/// Entry point for the `tapsync` binary
#[cfg_attr(coverage_nightly, coverage(off))]
pub fn run() -> ExitCode {
    init_logging();

    let command = Cli::parse().command;

    match start(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn start(command: Command) -> Result<(), RunError> {
    let mut config = AppConfig::load()?;
    command.apply(&mut config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(command, config))
}

/// Run `command` until it finishes or Ctrl+C is pressed
pub async fn execute(command: Command, config: AppConfig) -> Result<(), RunError> {
    let cancel = CancellationToken::new();
    tokio::spawn(shutdown::cancel_on_ctrl_c(cancel.clone()));

    let result = match command {
        Command::Serve(_) => server::serve(&config.server, cancel.clone())
            .await
            .map_err(RunError::from),
        Command::Screen(_) => run_screen(&config, cancel.clone()).await,
        Command::Task(args) => run_task(&config, &args.participant, cancel.clone()).await,
    };
    // Stops the Ctrl+C listener when the command ends on its own
    cancel.cancel();
    if shutdown::is_shutting_down() {
        info!("Stopped by signal");
    }
    result
}

async fn run_screen(config: &AppConfig, cancel: CancellationToken) -> Result<(), RunError> {
    let relay = Arc::new(HttpRelayClient::from_config(&config.relay)?);
    info!(
        "[screen] following room {} at {}",
        relay.room_id(),
        config.relay.api_base
    );
    let consumer = ScreenConsumer::new(
        relay,
        Arc::new(LoggingEmitter),
        StimulusPlan::default(),
        &config.relay,
        &config.screen,
    );
    consumer.run(cancel).await;
    Ok(())
}

async fn run_task(
    config: &AppConfig,
    participant: &str,
    cancel: CancellationToken,
) -> Result<(), RunError> {
    let services = SessionServices::from_config(config)?;
    let session = Arc::new(TaskSession::new(
        participant,
        config,
        TriggerPlan::session_default(),
        services,
    ));
    session.begin_session().await?;
    info!("[task] commands: start, <number>, next, status, menu, finish");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    operator::run_operator(session, stdin, cancel).await;
    Ok(())
}
