//! Read-only snapshot of the scan loop for renderers

use crate::scanner::state::ScanPhase;
use crate::vision::RecognizedCode;

/// Runtime state that is not persisted
#[derive(Debug, Clone)]
pub struct RuntimeState {
    /// Whether the sampling timer is running
    pub is_scanning: bool,
    /// Current coordinator phase
    pub phase: ScanPhase,
    /// Most recent code that triggered a search
    pub last_code: Option<RecognizedCode>,
    /// Whether re-detection is suppressed right now
    pub cooling_down: bool,
    /// Whether a search call is outstanding
    pub search_in_flight: bool,
    /// Last error message (if any)
    pub last_error: Option<String>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            is_scanning: false,
            phase: ScanPhase::Idle,
            last_code: None,
            cooling_down: false,
            search_in_flight: false,
            last_error: None,
        }
    }
}

impl RuntimeState {
    /// Clear any error state
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Set an error message
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }
}
