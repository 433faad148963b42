//! Shared state and messaging between the scan loop and its renderers
//!
//! The scan loop publishes [`PresentationEvent`]s through a
//! [`PresentationSink`] and keeps a [`RuntimeState`] snapshot current.

pub mod messages;
pub mod state;

pub use messages::{PresentationEvent, PresentationSink, ScannerStatus};
pub use state::RuntimeState;
