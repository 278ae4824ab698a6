// Screen-side relay consumer: poll, dedupe by watermark, queue stimuli

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::client::EventRelay;
use super::types::RelayEvent;
use crate::config::{RelayConfig, ScreenConfig};
use crate::events::{ScreenEventEmitter, StimulusShownPayload};
use crate::plan::{Stimulus, StimulusPlan};
use crate::{debug, info, warn};

/// Pure poll/queue state, driven by [`ScreenConsumer::run`]
#[derive(Debug)]
pub struct ConsumerState {
    watermark: u64,
    primed: bool,
    queue: VecDeque<(u64, Stimulus)>,
    /// Earliest instant the next queued stimulus may be shown
    free_at: Option<Instant>,
    display: Duration,
    gap: Duration,
}

impl ConsumerState {
    pub fn new(display: Duration, gap: Duration) -> Self {
        Self {
            watermark: 0,
            primed: false,
            queue: VecDeque::new(),
            free_at: None,
            display,
            gap,
        }
    }

    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Advance the watermark over a startup backlog without queueing anything
    pub fn prime(&mut self, events: &[RelayEvent]) {
        if let Some(max) = events.iter().map(|e| e.id).max() {
            self.watermark = self.watermark.max(max);
        }
    }

    /// Mark the backlog as consumed; later batches are queued
    pub fn finish_priming(&mut self) {
        if !self.primed {
            info!("[screen] primed at watermark {}", self.watermark);
        }
        self.primed = true;
    }

    /// Queue new TRIGGER events; returns how many stimuli were queued
    pub fn ingest(&mut self, mut events: Vec<RelayEvent>, plan: &StimulusPlan) -> usize {
        events.sort_by_key(|e| e.id);
        let mut queued = 0;
        for event in events {
            if event.id <= self.watermark {
                continue;
            }
            self.watermark = event.id;
            if !event.is_trigger() {
                debug!("[screen] ignoring {} event {}", event.event_type, event.id);
                continue;
            }

            let stimulus = event
                .trigger_index
                .and_then(|i| usize::try_from(i).ok())
                .and_then(|i| plan.get(i));
            match stimulus {
                Some(stimulus) => {
                    self.queue.push_back((event.id, stimulus.clone()));
                    queued += 1;
                }
                None => warn!(
                    "[screen] event {} has invalid triggerIndex {:?}",
                    event.id, event.trigger_index
                ),
            }
        }
        queued
    }

    /// Pop the next stimulus if the display is free at `now`
    pub fn next_due(&mut self, now: Instant) -> Option<(u64, Stimulus)> {
        if self.free_at.is_some_and(|t| now < t) {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.free_at = Some(now + self.display + self.gap);
        Some(next)
    }

    /// When the loop should wake to show a queued stimulus
    pub fn next_wake(&self) -> Option<Instant> {
        if self.queue.is_empty() {
            return None;
        }
        self.free_at
    }
}

/// Polls the relay and shows each triggered stimulus in turn
pub struct ScreenConsumer<R: EventRelay + ?Sized, E: ScreenEventEmitter + ?Sized> {
    relay: Arc<R>,
    emitter: Arc<E>,
    plan: StimulusPlan,
    poll_interval: Duration,
    poll_limit: u32,
    state: ConsumerState,
}

impl<R: EventRelay + ?Sized, E: ScreenEventEmitter + ?Sized> ScreenConsumer<R, E> {
    pub fn new(
        relay: Arc<R>,
        emitter: Arc<E>,
        plan: StimulusPlan,
        relay_config: &RelayConfig,
        screen_config: &ScreenConfig,
    ) -> Self {
        Self {
            relay,
            emitter,
            plan,
            poll_interval: Duration::from_millis(relay_config.poll_interval_ms.max(1)),
            poll_limit: relay_config.poll_limit.max(1),
            state: ConsumerState::new(
                Duration::from_millis(screen_config.display_ms),
                Duration::from_millis(screen_config.queue_gap_ms),
            ),
        }
    }

    pub fn state(&self) -> &ConsumerState {
        &self.state
    }

    /// One poll; failures are logged and retried on the next tick
    pub async fn poll_once(&mut self) {
        loop {
            let events = match self
                .relay
                .fetch_since(self.state.watermark(), self.poll_limit)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!("[screen] poll failed: {}", e);
                    return;
                }
            };

            if self.state.is_primed() {
                let queued = self.state.ingest(events, &self.plan);
                if queued > 0 {
                    debug!("[screen] queued {} stimuli", queued);
                }
                return;
            }

            // Drain the whole backlog before going live
            let full_page = events.len() as u32 >= self.poll_limit;
            self.state.prime(&events);
            if !full_page {
                self.state.finish_priming();
                return;
            }
        }
    }

    /// Show every stimulus that is due at `now`
    pub fn show_due(&mut self, now: Instant) {
        while let Some((relay_id, stimulus)) = self.state.next_due(now) {
            self.emitter
                .emit_stimulus_shown(StimulusShownPayload { relay_id, stimulus });
        }
    }

    /// Poll until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[screen] polling every {:?}", self.poll_interval);

        loop {
            let wake = self.state.next_wake();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => self.poll_once().await,
                _ = tokio::time::sleep_until(wake.unwrap_or_else(Instant::now)), if wake.is_some() => {}
            }
            self.show_due(Instant::now());
        }
        info!("[screen] stopped at watermark {}", self.state.watermark());
    }
}
