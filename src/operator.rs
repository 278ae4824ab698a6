// Operator console: line commands that drive a task session
//
// Taps run on their own worker so a completion that is still uploading does
// not hold up `menu`. Other commands wait for queued taps first.

use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::session::{SessionError, TaskSession};
use crate::{debug, info, warn};

const TAP_QUEUE: usize = 64;

/// One line typed by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorAction {
    Start,
    Tap(u32),
    Next,
    Status,
    Menu,
    Finish,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command '{0}' (start, <number>, next, status, menu, finish)")]
    Unknown(String),
}

impl FromStr for OperatorAction {
    type Err = ActionParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let word = line.trim();
        if word.is_empty() {
            return Err(ActionParseError::Empty);
        }
        if let Ok(n) = word.parse::<u32>() {
            return Ok(OperatorAction::Tap(n));
        }
        match word.to_ascii_lowercase().as_str() {
            "start" | "s" => Ok(OperatorAction::Start),
            "next" | "n" => Ok(OperatorAction::Next),
            "status" | "?" => Ok(OperatorAction::Status),
            "menu" | "m" | "quit" | "q" => Ok(OperatorAction::Menu),
            "finish" | "f" => Ok(OperatorAction::Finish),
            _ => Err(ActionParseError::Unknown(word.to_string())),
        }
    }
}

/// Whether the console keeps reading after an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Leave,
}

enum TapJob {
    Tap(u32),
    /// Answered once every tap queued before it has been handled
    Barrier(oneshot::Sender<()>),
}

/// Apply one non-tap action to `session`
pub async fn dispatch(session: &TaskSession, action: OperatorAction) -> Flow {
    match action {
        OperatorAction::Start => match session.press_start() {
            Ok(state) => info!("[operator] trial {} running", state.trial_index + 1),
            Err(e) => warn!("[operator] {}", e),
        },
        OperatorAction::Tap(n) => {
            session.click(n).await;
        }
        OperatorAction::Next => match session.next_trial() {
            Ok(index) => info!("[operator] trial {} ready", index + 1),
            Err(e) => warn!("[operator] {}", e),
        },
        OperatorAction::Status => {
            let state = session.trial_state();
            info!(
                "[operator] trial {} {:?}: next {}, misses {}, finish {}, audio {:?}, speech {:?}",
                state.trial_index + 1,
                state.phase,
                state.next_expected,
                state.miss_count,
                if session.can_finish() { "open" } else { "locked" },
                session.audio_status(),
                session.speech_status()
            );
        }
        OperatorAction::Menu => {
            session.return_to_menu().await;
            return Flow::Leave;
        }
        OperatorAction::Finish => match session.finish_session().await {
            Ok(()) => return Flow::Leave,
            Err(SessionError::Closed) => return Flow::Leave,
            Err(e) => warn!("[operator] {}", e),
        },
    }
    Flow::Continue
}

/// Read commands from `input` until `menu`/`finish`, end of input or `cancel`
///
/// The session is shut down on every exit path.
pub async fn run_operator<R>(session: Arc<TaskSession>, input: R, cancel: CancellationToken)
where
    R: AsyncBufRead + Unpin,
{
    let (tap_tx, mut tap_rx) = mpsc::channel::<TapJob>(TAP_QUEUE);
    let tapper = {
        let session = session.clone();
        tokio::spawn(async move {
            while let Some(job) = tap_rx.recv().await {
                match job {
                    TapJob::Tap(n) => {
                        session.click(n).await;
                    }
                    TapJob::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
        })
    };

    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("[operator] input closed");
                break;
            }
            Err(e) => {
                warn!("[operator] failed to read input: {}", e);
                break;
            }
        };

        let action = match line.parse::<OperatorAction>() {
            Ok(action) => action,
            Err(ActionParseError::Empty) => continue,
            Err(e) => {
                warn!("[operator] {}", e);
                continue;
            }
        };
        debug!("[operator] {:?}", action);

        let flow = match action {
            OperatorAction::Tap(n) => {
                if tap_tx.send(TapJob::Tap(n)).await.is_err() {
                    warn!("[operator] tap worker stopped; ignoring {}", n);
                }
                Flow::Continue
            }
            OperatorAction::Menu => dispatch(&session, action).await,
            other => {
                let (done_tx, done_rx) = oneshot::channel();
                if tap_tx.send(TapJob::Barrier(done_tx)).await.is_ok() {
                    let _ = done_rx.await;
                }
                dispatch(&session, other).await
            }
        };
        if flow == Flow::Leave {
            break;
        }
    }

    drop(tap_tx);
    if let Err(e) = tapper.await {
        warn!("[operator] tap worker failed: {}", e);
    }
    session.shutdown().await;
}

#[cfg(test)]
#[path = "operator_test.rs"]
mod tests;
