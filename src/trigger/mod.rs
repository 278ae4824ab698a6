// Trigger scheduling: plan pointer, delayed cue/clip/prompt actions, end unlock

mod scheduler;
mod timers;

pub use scheduler::{PollOutcome, SchedulerContext, TriggerScheduler};
pub use timers::{TimerKind, TimerRegistry};

#[cfg(test)]
#[path = "trigger_test.rs"]
mod tests;
