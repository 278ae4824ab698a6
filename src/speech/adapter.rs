// Keeps a recognizer running for the duration of a trial

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{RecognitionEvent, SpeechRecognizer, SpeechStatus};
use crate::session_log::{LogEntry, SessionLogAggregator};
use crate::{debug, info, warn};

/// Pause before reopening a session the backend closed
pub const RESTART_DELAY: Duration = Duration::from_millis(300);

struct Capture {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Feeds final utterances into the session log as `Text` entries
///
/// Sessions the backend ends on its own are reopened while capture is active.
/// A recognizer that fails to start leaves the adapter `Unavailable` and the
/// trial carries on without speech.
pub struct SpeechCaptureAdapter {
    recognizer: Arc<dyn SpeechRecognizer>,
    log: Arc<SessionLogAggregator>,
    status: Arc<Mutex<SpeechStatus>>,
    capture: Mutex<Option<Capture>>,
}

impl SpeechCaptureAdapter {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, log: Arc<SessionLogAggregator>) -> Self {
        Self {
            recognizer,
            log,
            status: Arc::new(Mutex::new(SpeechStatus::Idle)),
            capture: Mutex::new(None),
        }
    }

    pub fn status(&self) -> SpeechStatus {
        *self.status.lock()
    }

    pub fn is_active(&self) -> bool {
        self.capture
            .lock()
            .as_ref()
            .is_some_and(|c| !c.task.is_finished())
    }

    /// Begin capturing; no-op while already active
    pub fn start(&self) -> bool {
        let mut capture = self.capture.lock();
        if capture.as_ref().is_some_and(|c| !c.task.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(capture_loop(
            self.recognizer.clone(),
            self.log.clone(),
            self.status.clone(),
            cancel.clone(),
        ));
        *capture = Some(Capture { cancel, task });
        true
    }

    /// Stop capturing and wait for the loop to exit
    ///
    /// Finals already delivered by the backend are recorded before returning.
    pub async fn stop(&self) {
        let capture = self.capture.lock().take();
        if let Some(capture) = capture {
            capture.cancel.cancel();
            if let Err(e) = capture.task.await {
                warn!("[speech] capture task failed: {}", e);
            }
        }
        let mut status = self.status.lock();
        if *status == SpeechStatus::Listening {
            *status = SpeechStatus::Idle;
        }
    }
}

async fn capture_loop(
    recognizer: Arc<dyn SpeechRecognizer>,
    log: Arc<SessionLogAggregator>,
    status: Arc<Mutex<SpeechStatus>>,
    cancel: CancellationToken,
) {
    loop {
        let started = tokio::select! {
            _ = cancel.cancelled() => return,
            started = recognizer.start() => started,
        };
        let mut results = match started {
            Ok(results) => results,
            Err(e) => {
                warn!("[speech] continuing without speech capture: {}", e);
                *status.lock() = SpeechStatus::Unavailable;
                return;
            }
        };
        *status.lock() = SpeechStatus::Listening;
        info!("[speech] recognition session started");

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    drain_finals(&mut results, &log);
                    return;
                }
                event = results.recv() => event,
            };
            match event {
                Some(RecognitionEvent::Final(text)) => record_final(&log, &text),
                Some(RecognitionEvent::Interim(_)) => {}
                Some(RecognitionEvent::Ended) | None => break,
            }
        }

        debug!("[speech] session ended; restarting");
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RESTART_DELAY) => {}
        }
    }
}

fn record_final(log: &SessionLogAggregator, text: &str) {
    let transcript = text.trim();
    if transcript.is_empty() {
        return;
    }
    debug!("[speech] final utterance: {}", transcript);
    log.record(
        LogEntry::Text {
            transcript: transcript.to_string(),
        },
        Instant::now(),
    );
}

/// Keep finals the backend delivered before capture stopped
fn drain_finals(results: &mut mpsc::Receiver<RecognitionEvent>, log: &SessionLogAggregator) {
    while let Ok(event) = results.try_recv() {
        if let RecognitionEvent::Final(text) = event {
            record_final(log, &text);
        }
    }
}

impl Drop for SpeechCaptureAdapter {
    fn drop(&mut self) {
        if let Some(capture) = self.capture.get_mut().take() {
            capture.cancel.cancel();
        }
    }
}
