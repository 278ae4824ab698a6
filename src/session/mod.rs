// Participant sessions: the orchestrated task and the standalone practice run

mod controller;
pub use controller::{SessionError, TaskSession};

mod services;
pub use services::{ServicesError, SessionServices};

mod practice;
pub use practice::PracticeSession;

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
