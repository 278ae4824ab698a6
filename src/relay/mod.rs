// Event relay: trigger producer (task device) and consumer (screen device)

mod client;
mod consumer;
mod types;

pub use client::{EventRelay, HttpRelayClient};
pub use consumer::{ConsumerState, ScreenConsumer};
pub use types::{PostAck, RelayEvent, TriggerMessage, RESET, TRIGGER};

/// Errors that can occur talking to the relay
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Relay rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("Malformed relay reply: {0}")]
    MalformedReply(String),
}

#[cfg(test)]
#[path = "relay_test.rs"]
pub(crate) mod tests;
