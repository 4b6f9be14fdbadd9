//! Upload support: progress relay between a push and its progress bar

pub mod progress;

pub use progress::{RelayOutcome, Update, spawn_progress_relay};
