// Cancellation registry for delayed scheduler actions

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::debug;

/// What a pending timer will do when it fires
///
/// Cue, clip start and prompt belong to the trial whose trigger armed them
/// and are swept with it. The end unlock is session-scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Cue,
    ClipStart,
    Prompt,
    EndUnlock,
}

impl TimerKind {
    fn is_trial_scoped(self) -> bool {
        !matches!(self, TimerKind::EndUnlock)
    }
}

struct TimerEntry {
    kind: TimerKind,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Every delayed action the scheduler arms, each with its own token
#[derive(Default)]
pub struct TimerRegistry {
    timers: Mutex<Vec<TimerEntry>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` after `delay` unless cancelled first
    ///
    /// The cue is a single slot: arming a new cue cancels a pending one.
    pub fn schedule<F>(&self, kind: TimerKind, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {}
                _ = tokio::time::sleep(delay) => action.await,
            }
        });

        let mut timers = self.timers.lock();
        timers.retain(|t| !t.handle.is_finished());
        if kind == TimerKind::Cue {
            for pending in timers.iter().filter(|t| t.kind == TimerKind::Cue) {
                debug!("[timers] replacing pending cue");
                pending.token.cancel();
            }
            timers.retain(|t| t.kind != TimerKind::Cue);
        }
        timers.push(TimerEntry {
            kind,
            token,
            handle,
        });
    }

    /// Timers that have neither fired nor been cancelled
    pub fn pending(&self) -> usize {
        self.timers
            .lock()
            .iter()
            .filter(|t| !t.handle.is_finished() && !t.token.is_cancelled())
            .count()
    }

    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.timers
            .lock()
            .iter()
            .any(|t| t.kind == kind && !t.handle.is_finished() && !t.token.is_cancelled())
    }

    /// True while a cue, clip start or prompt has yet to run
    pub fn has_trial_pending(&self) -> bool {
        self.timers
            .lock()
            .iter()
            .any(|t| t.kind.is_trial_scoped() && !t.handle.is_finished() && !t.token.is_cancelled())
    }

    /// Cancel timers that belong to the current trial
    pub fn sweep_trial(&self) -> usize {
        self.sweep_where(TimerKind::is_trial_scoped)
    }

    /// Cancel everything, the end unlock included
    pub fn sweep_all(&self) -> usize {
        self.sweep_where(|_| true)
    }

    fn sweep_where(&self, predicate: impl Fn(TimerKind) -> bool) -> usize {
        let mut timers = self.timers.lock();
        let mut cancelled = 0;
        timers.retain(|t| {
            if !predicate(t.kind) {
                return true;
            }
            if !t.handle.is_finished() {
                t.token.cancel();
                cancelled += 1;
            }
            false
        });
        if cancelled > 0 {
            debug!("[timers] cancelled {} pending timer(s)", cancelled);
        }
        cancelled
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().iter() {
            timer.token.cancel();
        }
    }
}
