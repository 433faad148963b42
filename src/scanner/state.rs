//! Scan coordinator state machine
//!
//! All coordinator state lives in [`ScanState`] and changes only through
//! [`ScanState::apply`]. Events that make no sense in the current phase are
//! rejected instead of being folded into flag combinations.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::search::{FailureReason, SearchOutcome};
use crate::vision::RecognizedCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Sampling,
    Recognizing,
    Cooling,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Sampling => "sampling",
            ScanPhase::Recognizing => "recognizing",
            ScanPhase::Cooling => "cooling",
        };
        f.write_str(name)
    }
}

/// How a scan-triggered search ended, as far as the coordinator cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResolution {
    /// Results came back
    Found,
    /// Empty answer or service-reported failure
    NotFound,
    /// Transport fault
    Unreachable,
    /// The query was never sent (a manual search took its place)
    Dropped,
}

impl From<&SearchOutcome> for SearchResolution {
    fn from(outcome: &SearchOutcome) -> Self {
        match outcome {
            SearchOutcome::Success { .. } => SearchResolution::Found,
            SearchOutcome::Empty { .. } => SearchResolution::NotFound,
            SearchOutcome::Failure {
                reason: FailureReason::Service(_),
            } => SearchResolution::NotFound,
            SearchOutcome::Failure {
                reason: FailureReason::NetworkError(_),
            } => SearchResolution::Unreachable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Sampling timer fired
    Tick,
    /// Region extracted and handed to the recognizer
    SampleReady,
    /// No usable region (frame source not ready, recognizer busy)
    SampleUnavailable,
    /// Recognition finished; `Some` if the text held a code
    Recognized(Option<RecognizedCode>),
    /// Recognition engine failed this cycle
    RecognitionFailed,
    /// The search for detection `cycle` finished
    SearchResolved {
        cycle: u64,
        resolution: SearchResolution,
    },
    /// The reset timer for detection `cycle` fired
    CooldownElapsed { cycle: u64 },
    /// Scanning stopped
    Stop,
}

impl ScanEvent {
    fn name(&self) -> &'static str {
        match self {
            ScanEvent::Tick => "tick",
            ScanEvent::SampleReady => "sample-ready",
            ScanEvent::SampleUnavailable => "sample-unavailable",
            ScanEvent::Recognized(_) => "recognized",
            ScanEvent::RecognitionFailed => "recognition-failed",
            ScanEvent::SearchResolved { .. } => "search-resolved",
            ScanEvent::CooldownElapsed { .. } => "cooldown-elapsed",
            ScanEvent::Stop => "stop",
        }
    }
}

/// What the owner of the state must do next
#[derive(Debug, Clone, PartialEq)]
pub enum ScanAction {
    None,
    /// Crop a region from the latest frame
    ExtractRegion,
    /// Start the recognition call for the extracted region
    Recognize,
    /// Announce `code` and search for it
    Search { code: RecognizedCode, cycle: u64 },
    /// Deliver `CooldownElapsed { cycle }` after `delay`
    ScheduleReset { cycle: u64, delay: Duration },
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("event {event} is not valid while {phase}")]
    Invalid { phase: ScanPhase, event: &'static str },
    #[error("event {event} for detection {cycle} is stale (current detection {current})")]
    Stale {
        event: &'static str,
        cycle: u64,
        current: u64,
    },
}

/// Reset delays applied after a scan-triggered search
#[derive(Debug, Clone, Copy)]
pub struct CooldownPolicy {
    pub success: Duration,
    pub failure: Duration,
}

/// Coordinator state. `cycle` counts detections so late search answers and
/// reset timers can be matched to the detection they belong to.
#[derive(Debug, Clone)]
pub struct ScanState {
    phase: ScanPhase,
    last_code: Option<RecognizedCode>,
    cooldown_until: Option<Instant>,
    awaiting_search: bool,
    cycle: u64,
}

impl Default for ScanState {
    fn default() -> Self {
        Self {
            phase: ScanPhase::Idle,
            last_code: None,
            cooldown_until: None,
            awaiting_search: false,
            cycle: 0,
        }
    }
}

impl ScanState {
    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn last_code(&self) -> Option<&RecognizedCode> {
        self.last_code.as_ref()
    }

    pub fn cooldown_until(&self) -> Option<Instant> {
        self.cooldown_until
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Re-detection is suppressed: a scan search is outstanding or its reset
    /// timer has not fired yet
    pub fn is_cooling_down(&self) -> bool {
        self.awaiting_search || self.cooldown_until.is_some()
    }

    pub fn apply(
        &mut self,
        event: ScanEvent,
        now: Instant,
        policy: &CooldownPolicy,
    ) -> Result<ScanAction, TransitionError> {
        let name = event.name();
        let invalid = |phase| TransitionError::Invalid { phase, event: name };

        match event {
            ScanEvent::Tick => {
                // Skipped, never queued
                if self.phase != ScanPhase::Idle || self.is_cooling_down() {
                    return Ok(ScanAction::None);
                }
                self.phase = ScanPhase::Sampling;
                Ok(ScanAction::ExtractRegion)
            }

            ScanEvent::SampleReady => {
                if self.phase != ScanPhase::Sampling {
                    return Err(invalid(self.phase));
                }
                self.phase = ScanPhase::Recognizing;
                Ok(ScanAction::Recognize)
            }

            ScanEvent::SampleUnavailable => {
                if self.phase != ScanPhase::Sampling {
                    return Err(invalid(self.phase));
                }
                self.phase = ScanPhase::Idle;
                Ok(ScanAction::None)
            }

            ScanEvent::Recognized(code) => {
                if self.phase != ScanPhase::Recognizing {
                    return Err(invalid(self.phase));
                }
                match code {
                    Some(code) if self.last_code.as_ref() != Some(&code) => {
                        self.cycle += 1;
                        self.last_code = Some(code.clone());
                        self.awaiting_search = true;
                        self.cooldown_until = None;
                        self.phase = ScanPhase::Cooling;
                        Ok(ScanAction::Search {
                            code,
                            cycle: self.cycle,
                        })
                    }
                    // No code, or the same code again
                    _ => {
                        self.phase = ScanPhase::Idle;
                        Ok(ScanAction::None)
                    }
                }
            }

            ScanEvent::RecognitionFailed => {
                if self.phase != ScanPhase::Recognizing {
                    return Err(invalid(self.phase));
                }
                self.phase = ScanPhase::Idle;
                Ok(ScanAction::None)
            }

            ScanEvent::SearchResolved { cycle, resolution } => {
                if cycle != self.cycle || !self.awaiting_search {
                    return Err(TransitionError::Stale {
                        event: name,
                        cycle,
                        current: self.cycle,
                    });
                }
                self.awaiting_search = false;

                match resolution {
                    SearchResolution::Found => {
                        self.cooldown_until = Some(now + policy.success);
                        Ok(ScanAction::ScheduleReset {
                            cycle,
                            delay: policy.success,
                        })
                    }
                    SearchResolution::NotFound => {
                        self.last_code = None;
                        self.cooldown_until = Some(now + policy.failure);
                        Ok(ScanAction::ScheduleReset {
                            cycle,
                            delay: policy.failure,
                        })
                    }
                    SearchResolution::Unreachable => {
                        self.last_code = None;
                        self.cooldown_until = None;
                        self.leave_cooling();
                        Ok(ScanAction::None)
                    }
                    // The code stays suppressed; the user chose to search something else
                    SearchResolution::Dropped => {
                        self.cooldown_until = None;
                        self.leave_cooling();
                        Ok(ScanAction::None)
                    }
                }
            }

            ScanEvent::CooldownElapsed { cycle } => {
                if cycle != self.cycle || self.awaiting_search || self.cooldown_until.is_none() {
                    return Err(TransitionError::Stale {
                        event: name,
                        cycle,
                        current: self.cycle,
                    });
                }
                self.last_code = None;
                self.cooldown_until = None;
                self.leave_cooling();
                Ok(ScanAction::None)
            }

            ScanEvent::Stop => {
                // Cooldown bookkeeping survives a stop so a late search answer
                // or reset timer still settles it
                self.phase = ScanPhase::Idle;
                Ok(ScanAction::None)
            }
        }
    }

    fn leave_cooling(&mut self) {
        if self.phase == ScanPhase::Cooling {
            self.phase = ScanPhase::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::CodeMatcher;

    fn code(text: &str) -> RecognizedCode {
        CodeMatcher::default().find(text).unwrap()
    }

    fn policy() -> CooldownPolicy {
        CooldownPolicy {
            success: Duration::from_secs(5),
            failure: Duration::from_secs(2),
        }
    }

    fn step(state: &mut ScanState, event: ScanEvent) -> ScanAction {
        state.apply(event, Instant::now(), &policy()).unwrap()
    }

    /// Drive Idle -> Sampling -> Recognizing -> (result)
    fn scan(state: &mut ScanState, read: Option<&str>) -> ScanAction {
        assert_eq!(step(state, ScanEvent::Tick), ScanAction::ExtractRegion);
        assert_eq!(step(state, ScanEvent::SampleReady), ScanAction::Recognize);
        step(state, ScanEvent::Recognized(read.map(code)))
    }

    #[test]
    fn test_new_code_enters_cooling_and_searches() {
        let mut state = ScanState::default();

        let action = scan(&mut state, Some("ABCDE-12"));
        assert_eq!(
            action,
            ScanAction::Search {
                code: code("ABCDE-12"),
                cycle: 1
            }
        );
        assert_eq!(state.phase(), ScanPhase::Cooling);
        assert_eq!(state.last_code(), Some(&code("ABCDE-12")));
        assert!(state.is_cooling_down());
    }

    #[test]
    fn test_no_match_returns_to_idle() {
        let mut state = ScanState::default();
        assert_eq!(scan(&mut state, None), ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert_eq!(state.cycle(), 0);
    }

    #[test]
    fn test_duplicate_code_is_suppressed() {
        let mut state = ScanState::default();
        state.last_code = Some(code("ABCDE-12"));

        assert_eq!(scan(&mut state, Some("ABCDE-12")), ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert_eq!(state.cycle(), 0);

        // A different code still goes through
        assert!(matches!(
            scan(&mut state, Some("ZZZZZ-99")),
            ScanAction::Search { .. }
        ));
    }

    #[test]
    fn test_ticks_skipped_outside_idle() {
        let mut state = ScanState::default();
        step(&mut state, ScanEvent::Tick);
        assert_eq!(step(&mut state, ScanEvent::Tick), ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Sampling);

        step(&mut state, ScanEvent::SampleReady);
        assert_eq!(step(&mut state, ScanEvent::Tick), ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Recognizing);

        step(&mut state, ScanEvent::Recognized(Some(code("ABCDE-12"))));
        assert_eq!(step(&mut state, ScanEvent::Tick), ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Cooling);
    }

    #[test]
    fn test_sample_unavailable_returns_to_idle() {
        let mut state = ScanState::default();
        step(&mut state, ScanEvent::Tick);
        assert_eq!(step(&mut state, ScanEvent::SampleUnavailable), ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Idle);
    }

    #[test]
    fn test_recognition_failure_is_not_fatal() {
        let mut state = ScanState::default();
        step(&mut state, ScanEvent::Tick);
        step(&mut state, ScanEvent::SampleReady);
        assert_eq!(step(&mut state, ScanEvent::RecognitionFailed), ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert_eq!(step(&mut state, ScanEvent::Tick), ScanAction::ExtractRegion);
    }

    #[test]
    fn test_success_holds_code_until_reset() {
        let mut state = ScanState::default();
        scan(&mut state, Some("ABCDE-12"));

        let now = Instant::now();
        let action = state
            .apply(
                ScanEvent::SearchResolved {
                    cycle: 1,
                    resolution: SearchResolution::Found,
                },
                now,
                &policy(),
            )
            .unwrap();
        assert_eq!(
            action,
            ScanAction::ScheduleReset {
                cycle: 1,
                delay: Duration::from_secs(5)
            }
        );
        assert_eq!(state.cooldown_until(), Some(now + Duration::from_secs(5)));
        assert_eq!(state.phase(), ScanPhase::Cooling);
        assert_eq!(state.last_code(), Some(&code("ABCDE-12")));
        assert_eq!(step(&mut state, ScanEvent::Tick), ScanAction::None);

        step(&mut state, ScanEvent::CooldownElapsed { cycle: 1 });
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert!(state.last_code().is_none());
        assert!(!state.is_cooling_down());

        // Same code is eligible again
        assert!(matches!(
            scan(&mut state, Some("ABCDE-12")),
            ScanAction::Search { cycle: 2, .. }
        ));
    }

    #[test]
    fn test_not_found_clears_code_and_uses_short_delay() {
        let mut state = ScanState::default();
        scan(&mut state, Some("ABCDE-12"));

        let action = step(
            &mut state,
            ScanEvent::SearchResolved {
                cycle: 1,
                resolution: SearchResolution::NotFound,
            },
        );
        assert_eq!(
            action,
            ScanAction::ScheduleReset {
                cycle: 1,
                delay: Duration::from_secs(2)
            }
        );
        assert!(state.last_code().is_none());
        assert_eq!(state.phase(), ScanPhase::Cooling);

        step(&mut state, ScanEvent::CooldownElapsed { cycle: 1 });
        assert_eq!(state.phase(), ScanPhase::Idle);
    }

    #[test]
    fn test_network_error_resets_immediately() {
        let mut state = ScanState::default();
        scan(&mut state, Some("ABCDE-12"));

        let action = step(
            &mut state,
            ScanEvent::SearchResolved {
                cycle: 1,
                resolution: SearchResolution::Unreachable,
            },
        );
        assert_eq!(action, ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert!(state.last_code().is_none());
        assert!(!state.is_cooling_down());
    }

    #[test]
    fn test_dropped_search_keeps_code_suppressed() {
        let mut state = ScanState::default();
        scan(&mut state, Some("ABCDE-12"));

        let action = step(
            &mut state,
            ScanEvent::SearchResolved {
                cycle: 1,
                resolution: SearchResolution::Dropped,
            },
        );
        assert_eq!(action, ScanAction::None);
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert!(!state.is_cooling_down());
        assert_eq!(state.last_code(), Some(&code("ABCDE-12")));

        // Same code in view again: no second search
        assert_eq!(scan(&mut state, Some("ABCDE-12")), ScanAction::None);
        assert_eq!(state.cycle(), 1);

        // A different code is searched
        assert!(matches!(
            scan(&mut state, Some("ZZZZZ-99")),
            ScanAction::Search { cycle: 2, .. }
        ));
    }

    #[test]
    fn test_stale_reset_and_search_rejected() {
        let mut state = ScanState::default();
        scan(&mut state, Some("ABCDE-12"));

        // Reset before the search resolved
        assert!(matches!(
            state.apply(ScanEvent::CooldownElapsed { cycle: 1 }, Instant::now(), &policy()),
            Err(TransitionError::Stale { .. })
        ));

        // Answer for a detection that is not current
        assert!(matches!(
            state.apply(
                ScanEvent::SearchResolved {
                    cycle: 0,
                    resolution: SearchResolution::Found
                },
                Instant::now(),
                &policy()
            ),
            Err(TransitionError::Stale { cycle: 0, current: 1, .. })
        ));

        // Second answer for the same detection
        step(
            &mut state,
            ScanEvent::SearchResolved {
                cycle: 1,
                resolution: SearchResolution::Found,
            },
        );
        assert!(state
            .apply(
                ScanEvent::SearchResolved {
                    cycle: 1,
                    resolution: SearchResolution::Found
                },
                Instant::now(),
                &policy()
            )
            .is_err());
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut state = ScanState::default();
        assert_eq!(
            state.apply(ScanEvent::SampleReady, Instant::now(), &policy()),
            Err(TransitionError::Invalid {
                phase: ScanPhase::Idle,
                event: "sample-ready"
            })
        );
        assert!(state
            .apply(ScanEvent::Recognized(None), Instant::now(), &policy())
            .is_err());
        assert!(state
            .apply(ScanEvent::RecognitionFailed, Instant::now(), &policy())
            .is_err());
        assert_eq!(state.phase(), ScanPhase::Idle);
    }

    #[test]
    fn test_stop_keeps_cooldown_bookkeeping() {
        let mut state = ScanState::default();
        scan(&mut state, Some("ABCDE-12"));

        step(&mut state, ScanEvent::Stop);
        assert_eq!(state.phase(), ScanPhase::Idle);
        assert!(state.is_cooling_down());
        // Restarted ticks must not sample while the search is outstanding
        assert_eq!(step(&mut state, ScanEvent::Tick), ScanAction::None);

        // Late answer still settles the detection
        step(
            &mut state,
            ScanEvent::SearchResolved {
                cycle: 1,
                resolution: SearchResolution::Found,
            },
        );
        assert_eq!(state.phase(), ScanPhase::Idle);
        step(&mut state, ScanEvent::CooldownElapsed { cycle: 1 });
        assert!(!state.is_cooling_down());
        assert!(state.last_code().is_none());
        assert_eq!(step(&mut state, ScanEvent::Tick), ScanAction::ExtractRegion);
    }

    #[test]
    fn test_stop_mid_recognition() {
        let mut state = ScanState::default();
        step(&mut state, ScanEvent::Tick);
        step(&mut state, ScanEvent::SampleReady);
        step(&mut state, ScanEvent::Stop);

        assert_eq!(state.phase(), ScanPhase::Idle);
        // The discarded result must not be applied
        assert!(state
            .apply(ScanEvent::Recognized(Some(code("ABCDE-12"))), Instant::now(), &policy())
            .is_err());
    }

    #[test]
    fn test_resolution_from_outcome() {
        let found = SearchOutcome::Success {
            products: vec![],
            duration_sec: 0.1,
        };
        assert_eq!(SearchResolution::from(&found), SearchResolution::Found);

        let empty = SearchOutcome::Empty {
            keyword: "X".to_string(),
        };
        assert_eq!(SearchResolution::from(&empty), SearchResolution::NotFound);

        let failed = SearchOutcome::Failure {
            reason: FailureReason::Service("boom".to_string()),
        };
        assert_eq!(SearchResolution::from(&failed), SearchResolution::NotFound);

        let offline = SearchOutcome::Failure {
            reason: FailureReason::NetworkError("refused".to_string()),
        };
        assert_eq!(SearchResolution::from(&offline), SearchResolution::Unreachable);
    }
}
