// Per-trial event log with a one-shot upload guard

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::events::{LogEntry, LogEvent, TaskLogEnvelope, TextLogEnvelope};
use crate::events::epoch_ms;
use crate::upload::{ArtifactUploader, LogUploadMeta};
use crate::{debug, info, warn};

/// What a call to [`SessionLogAggregator::flush`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another flush already claimed this trial
    AlreadyFlushed,
    /// This call uploaded; flags report per-artifact success
    Flushed { task_log: bool, text_log: bool },
}

#[derive(Default)]
struct LogBuffer {
    trial_zero: Option<Instant>,
    start_ts: Option<i64>,
    events: Vec<LogEvent>,
    texts: Vec<LogEvent>,
    next_sequence: u32,
    /// Set once the upload snapshot is taken; later records are refused
    sealed: bool,
}

/// Accumulates one trial's events and uploads them exactly once
///
/// Events are stamped relative to the Start instant set by
/// [`begin_trial`](Self::begin_trial). Anything recorded before that is dropped.
pub struct SessionLogAggregator {
    uploader: Arc<dyn ArtifactUploader>,
    buffer: Mutex<LogBuffer>,
    flushed: AtomicBool,
}

impl SessionLogAggregator {
    pub fn new(uploader: Arc<dyn ArtifactUploader>) -> Self {
        Self {
            uploader,
            buffer: Mutex::new(LogBuffer::default()),
            flushed: AtomicBool::new(false),
        }
    }

    /// Set the trial zero instant; relative times count from here
    pub fn begin_trial(&self, now: Instant) {
        let mut buffer = self.buffer.lock();
        buffer.trial_zero = Some(now);
        buffer.start_ts = Some(epoch_ms());
    }

    pub fn trial_zero(&self) -> Option<Instant> {
        self.buffer.lock().trial_zero
    }

    /// Epoch ms captured at trial zero
    pub fn start_ts(&self) -> Option<i64> {
        self.buffer.lock().start_ts
    }

    /// Stamp and append an event; returns the stamped event, or None when
    /// trial zero has not been set or the log was already uploaded
    pub fn record(&self, entry: LogEntry, now: Instant) -> Option<LogEvent> {
        let mut buffer = self.buffer.lock();
        if buffer.sealed {
            warn!("[log] trial log already uploaded; dropping {:?}", entry);
            return None;
        }
        let Some(zero) = buffer.trial_zero else {
            debug!("[log] dropping event before trial start: {:?}", entry);
            return None;
        };
        let relative_ms = now.saturating_duration_since(zero).as_millis() as u64;

        let is_text = matches!(entry, LogEntry::Text { .. });
        let sequence_id = if is_text {
            buffer.next_sequence += 1;
            buffer.next_sequence
        } else {
            0
        };
        let event = LogEvent::stamp(entry, relative_ms, sequence_id);
        if is_text {
            buffer.texts.push(event.clone());
        } else {
            buffer.events.push(event.clone());
        }
        Some(event)
    }

    /// Snapshot of click/beep/trigger events
    pub fn events(&self) -> Vec<LogEvent> {
        self.buffer.lock().events.clone()
    }

    /// Snapshot of speech events
    pub fn texts(&self) -> Vec<LogEvent> {
        self.buffer.lock().texts.clone()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::SeqCst)
    }

    /// Claim this trial's one upload without uploading yet
    ///
    /// Returns None if another caller already claimed it. The claim is taken
    /// synchronously, so a path that claims before its first await wins any
    /// race with paths that claim later. Events keep being recorded until
    /// [`FlushClaim::upload`] takes its snapshot.
    #[must_use = "a claim that is never uploaded leaves the trial log unsent"]
    pub fn claim(&self) -> Option<FlushClaim<'_>> {
        self.flushed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then_some(FlushClaim { log: self })
    }

    /// Claim and upload `{meta, events}` and `{meta, texts}` at most once per trial
    ///
    /// Upload failures are logged and not retried.
    pub async fn flush(&self, meta: LogUploadMeta) -> FlushOutcome {
        match self.claim() {
            Some(claim) => claim.upload(meta).await,
            None => {
                debug!(
                    "[log] flush skipped for trial {} ({}): already flushed",
                    meta.trial_no, meta.status
                );
                FlushOutcome::AlreadyFlushed
            }
        }
    }

    /// Seal the buffer and take what the upload will carry
    fn seal(&self) -> (Vec<LogEvent>, Vec<LogEvent>) {
        let mut buffer = self.buffer.lock();
        buffer.sealed = true;
        (buffer.events.clone(), buffer.texts.clone())
    }

    /// Clear events, texts, sequence counter, trial zero, the seal and the
    /// flush guard
    pub fn reset(&self) {
        *self.buffer.lock() = LogBuffer::default();
        self.flushed.store(false, Ordering::SeqCst);
    }
}

/// The right to upload one trial's logs
pub struct FlushClaim<'a> {
    log: &'a SessionLogAggregator,
}

impl FlushClaim<'_> {
    /// Seal the log and upload both envelopes
    pub async fn upload(self, meta: LogUploadMeta) -> FlushOutcome {
        let log = self.log;
        let (events, texts) = log.seal();
        info!(
            "[log] flushing trial {} ({}): {} events, {} texts",
            meta.trial_no,
            meta.status,
            events.len(),
            texts.len()
        );

        let task_body = serde_json::to_vec(&TaskLogEnvelope {
            meta: &meta,
            events: &events,
        });
        let text_body = serde_json::to_vec(&TextLogEnvelope {
            meta: &meta,
            texts: &texts,
        });

        let task_log = match task_body {
            Ok(body) => match log.uploader.upload_task_log(body, meta.clone()).await {
                Ok(receipt) => {
                    debug!("[log] task log stored as {}", receipt.file);
                    true
                }
                Err(e) => {
                    warn!("[log] task log upload failed: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("[log] failed to encode task log: {}", e);
                false
            }
        };

        let text_log = match text_body {
            Ok(body) => match log.uploader.upload_text_log(body, meta).await {
                Ok(receipt) => {
                    debug!("[log] text log stored as {}", receipt.file);
                    true
                }
                Err(e) => {
                    warn!("[log] text log upload failed: {}", e);
                    false
                }
            },
            Err(e) => {
                warn!("[log] failed to encode text log: {}", e);
                false
            }
        };

        FlushOutcome::Flushed { task_log, text_log }
    }
}
