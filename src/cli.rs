// Command line for `tapsync serve`, `tapsync screen` and `tapsync task`

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;

/// Trial orchestration and trigger relay for number-tapping experiments
///
/// Settings come from `$TAPSYNC_CONFIG` or the user config dir, then
/// `TAPSYNC_*` variables; flags win over both.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "tapsync", author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the collector backend (event relay and uploads)
    Serve(ServeArgs),
    /// Follow a room and show stimuli as triggers arrive
    Screen(ScreenArgs),
    /// Run a participant's task session, driven by operator commands on stdin
    Task(TaskArgs),
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ServeArgs {
    /// Listen address, e.g. 0.0.0.0:8787
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Storage root for events and uploads
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenArgs {
    /// Room shared with the task device
    #[arg(long, value_name = "ID")]
    pub room: Option<String>,

    /// Collector API base, e.g. http://host:8787/api
    #[arg(long, value_name = "URL")]
    pub api_base: Option<String>,
}

#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskArgs {
    /// Participant id stamped on every upload
    #[arg(long, short, value_name = "ID")]
    pub participant: String,

    /// Room shared with the screen device
    #[arg(long, value_name = "ID")]
    pub room: Option<String>,

    /// Collector API base, e.g. http://host:8787/api
    #[arg(long, value_name = "URL")]
    pub api_base: Option<String>,
}

impl Command {
    /// Fold the flags into `config`
    pub fn apply(&self, config: &mut AppConfig) {
        match self {
            Command::Serve(args) => {
                if let Some(bind) = &args.bind {
                    config.server.bind = bind.clone();
                }
                if let Some(dir) = &args.data_dir {
                    config.server.data_dir = dir.clone();
                }
            }
            Command::Screen(ScreenArgs { room, api_base })
            | Command::Task(TaskArgs { room, api_base, .. }) => {
                if let Some(room) = room {
                    config.relay.room_id = room.clone();
                }
                if let Some(base) = api_base {
                    config.relay.api_base = base.trim_end_matches('/').to_string();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;
