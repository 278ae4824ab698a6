// Session log: relative-time event capture and single-shot upload per trial

mod aggregator;
mod events;

pub use aggregator::{FlushClaim, FlushOutcome, SessionLogAggregator};
pub use events::{LogEntry, LogEvent, TaskLogEnvelope, TextLogEnvelope};

#[cfg(test)]
#[path = "aggregator_test.rs"]
mod tests;
