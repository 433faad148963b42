//! Events published to whatever renders the scanner (terminal, UI, tests)

use std::fmt;

use crate::search::{QueryOrigin, SearchOutcome};
use crate::vision::RecognizedCode;

/// Status line shown over the camera view
#[derive(Debug, Clone, PartialEq)]
pub enum ScannerStatus {
    Initializing,
    LoadingEngine,
    Ready,
    Detected(RecognizedCode),
    ScanFailed,
    NetworkError,
    Stopped,
    /// Scanning was requested but there is no camera
    ScanUnavailable,
    /// Startup failed; shown once, no retry
    InitFailed(String),
}

impl fmt::Display for ScannerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerStatus::Initializing => f.write_str("initializing"),
            ScannerStatus::LoadingEngine => f.write_str("loading-engine"),
            ScannerStatus::Ready => f.write_str("ready"),
            ScannerStatus::Detected(code) => write!(f, "detected:{}", code),
            ScannerStatus::ScanFailed => f.write_str("scan-failed"),
            ScannerStatus::NetworkError => f.write_str("network-error"),
            ScannerStatus::Stopped => f.write_str("stopped"),
            ScannerStatus::ScanUnavailable => f.write_str("scan-unavailable"),
            ScannerStatus::InitFailed(reason) => write!(f, "init-error:{}", reason),
        }
    }
}

/// Everything the scan loop tells the outside world
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationEvent {
    /// Status line update
    Status(ScannerStatus),
    /// A new code was read; the manual entry field should show it
    CodeDetected(RecognizedCode),
    /// A search was issued
    Searching { keyword: String, origin: QueryOrigin },
    /// A search finished
    Outcome {
        keyword: String,
        origin: QueryOrigin,
        outcome: SearchOutcome,
    },
    /// A scanned code found nothing; ask the user to type a product name
    ManualEntryRequested { keyword: String },
}

/// Consumer of [`PresentationEvent`]s
pub trait PresentationSink: Send + Sync {
    fn publish(&self, event: PresentationEvent);
}

impl PresentationSink for crossbeam_channel::Sender<PresentationEvent> {
    fn publish(&self, event: PresentationEvent) {
        // A closed receiver means nobody is rendering any more
        let _ = self.send(event);
    }
}

impl PresentationSink for tokio::sync::mpsc::UnboundedSender<PresentationEvent> {
    fn publish(&self, event: PresentationEvent) {
        let _ = self.send(event);
    }
}
