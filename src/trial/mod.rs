// Trial module: click-sequence state machine and grid layout

mod layout;
mod machine;

pub use layout::{GridLayout, GridPosition};
pub use machine::{format_seconds, ClickOutcome, TrialError, TrialMachine, TrialPhase, TrialState};

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
