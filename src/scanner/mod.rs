//! Scan Coordinator
//!
//! A single owner task drives the scan loop: it samples the frame source on a
//! fixed interval, feeds the recognizer, turns new codes into searches, and is
//! the only writer of the coordinator state. Recognition calls, searches and
//! reset timers run as spawned tasks that report back over a channel.

pub mod state;

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::capture::FrameSource;
use crate::config::{ConfigError, ScannerSettings};
use crate::search::{
    QueryOrigin, SearchDispatcher, SearchJob, SearchOutcome, SearchQuery, SearchReport,
    SearchService, Submission,
};
use crate::shared::{PresentationEvent, PresentationSink, RuntimeState, ScannerStatus};
use crate::vision::{
    CodeMatcher, RecognitionEngine, RecognitionError, Recognizer, RegionExtractor,
};

use state::{CooldownPolicy, ScanAction, ScanEvent, ScanState, SearchResolution};

/// Requests accepted by a running pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineCommand {
    /// Start the sampling timer
    Start,
    /// Stop sampling; in-flight recognition is cancelled
    Stop,
    /// Search for text typed by the user
    ManualSearch(String),
    /// Tear the pipeline down
    Shutdown,
}

/// Completions reported by spawned work
enum Completion {
    Recognition {
        session: u64,
        result: Result<String, RecognitionError>,
    },
    Search(SearchReport),
    CooldownElapsed {
        cycle: u64,
    },
}

/// External capabilities the pipeline is built from
pub struct ScanComponents {
    pub frames: Arc<dyn FrameSource>,
    pub engine: Arc<dyn RecognitionEngine>,
    pub search: Arc<dyn SearchService>,
    pub sink: Arc<dyn PresentationSink>,
}

/// Cheap handle for controlling a spawned pipeline
#[derive(Clone)]
pub struct PipelineHandle {
    commands: mpsc::UnboundedSender<PipelineCommand>,
    runtime: Arc<RwLock<RuntimeState>>,
}

impl PipelineHandle {
    pub fn start_scanning(&self) {
        self.send(PipelineCommand::Start);
    }

    pub fn stop_scanning(&self) {
        self.send(PipelineCommand::Stop);
    }

    pub fn manual_search(&self, text: impl Into<String>) {
        self.send(PipelineCommand::ManualSearch(text.into()));
    }

    pub fn shutdown(&self) {
        self.send(PipelineCommand::Shutdown);
    }

    /// Snapshot of the coordinator
    pub fn runtime(&self) -> RuntimeState {
        self.runtime.read().clone()
    }

    fn send(&self, command: PipelineCommand) {
        if self.commands.send(command).is_err() {
            debug!("Pipeline already shut down");
        }
    }
}

pub struct ScanPipeline {
    settings: ScannerSettings,
    policy: CooldownPolicy,
    frames: Arc<dyn FrameSource>,
    extractor: RegionExtractor,
    recognizer: Recognizer,
    matcher: CodeMatcher,
    dispatcher: SearchDispatcher,
    sink: Arc<dyn PresentationSink>,
    state: ScanState,
    runtime: Arc<RwLock<RuntimeState>>,
    scanning: bool,
    /// Cleared for manual-only pipelines
    camera: bool,
    /// Bumped on every stop so late recognition results can be told apart
    session: u64,
    session_cancel: CancellationToken,
    shutdown: CancellationToken,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
}

impl ScanPipeline {
    pub fn new(settings: ScannerSettings, components: ScanComponents) -> Result<Self, ConfigError> {
        let matcher = CodeMatcher::new(&settings.code_pattern)?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        Ok(Self {
            policy: CooldownPolicy {
                success: settings.success_cooldown(),
                failure: settings.failure_cooldown(),
            },
            extractor: RegionExtractor::new(settings.roi_width, settings.roi_height),
            settings,
            frames: components.frames,
            recognizer: Recognizer::new(components.engine),
            matcher,
            dispatcher: SearchDispatcher::new(components.search),
            sink: components.sink,
            state: ScanState::default(),
            runtime: Arc::new(RwLock::new(RuntimeState::default())),
            scanning: false,
            camera: true,
            session: 0,
            session_cancel: shutdown.child_token(),
            shutdown,
            completions_tx,
            completions_rx,
        })
    }

    /// Manual search only: start requests are refused
    pub fn without_camera(mut self) -> Self {
        self.camera = false;
        self
    }

    /// Bring the recognition engine up
    pub async fn prepare_engine(&self) -> Result<(), RecognitionError> {
        self.recognizer.prepare().await
    }

    /// Run the loop on the current tokio runtime
    pub fn spawn(self) -> (PipelineHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = PipelineHandle {
            commands: commands_tx,
            runtime: self.runtime.clone(),
        };
        let task = tokio::spawn(self.run(commands_rx));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<PipelineCommand>) {
        let mut ticker = tokio::time::interval(self.settings.sample_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(PipelineCommand::Shutdown) | None => break,
                    Some(PipelineCommand::Start) => {
                        if self.start() {
                            ticker.reset_immediately();
                        }
                    }
                    Some(PipelineCommand::Stop) => self.stop(),
                    Some(PipelineCommand::ManualSearch(text)) => self.manual_search(&text),
                },
                Some(completion) = self.completions_rx.recv() => self.on_completion(completion),
                _ = ticker.tick(), if self.scanning => self.on_tick(),
            }
            self.sync_runtime();
        }

        self.shutdown.cancel();
        info!("Scan pipeline shut down");
    }

    fn start(&mut self) -> bool {
        if !self.camera {
            warn!("Scanning requested without a camera, ignoring");
            self.sink
                .publish(PresentationEvent::Status(ScannerStatus::ScanUnavailable));
            return false;
        }
        if self.scanning {
            debug!("Scanning already active");
            return false;
        }
        self.scanning = true;
        info!(
            "Scanning started ({}x{} region every {:?})",
            self.settings.roi_width,
            self.settings.roi_height,
            self.settings.sample_interval()
        );
        self.sink.publish(PresentationEvent::Status(ScannerStatus::Ready));
        true
    }

    fn stop(&mut self) {
        if !self.scanning {
            return;
        }
        self.scanning = false;
        self.session += 1;
        self.session_cancel.cancel();
        self.session_cancel = self.shutdown.child_token();
        self.apply(ScanEvent::Stop);
        info!("Scanning stopped");
        self.sink.publish(PresentationEvent::Status(ScannerStatus::Stopped));
    }

    fn on_tick(&mut self) {
        // A cancelled call from an earlier session may still hold the slot
        if self.recognizer.is_busy() {
            trace!("Recognition in flight, skipping tick");
            return;
        }
        if self.apply(ScanEvent::Tick) != ScanAction::ExtractRegion {
            return;
        }

        let sample = match self.extractor.extract(self.frames.as_ref()) {
            Ok(sample) => sample,
            Err(e) => {
                debug!("No sample this cycle: {}", e);
                self.apply(ScanEvent::SampleUnavailable);
                return;
            }
        };

        let call = match self.recognizer.begin(sample) {
            Ok(call) => call,
            Err(e) => {
                debug!("Recognizer not available: {}", e);
                self.apply(ScanEvent::SampleUnavailable);
                return;
            }
        };

        if self.apply(ScanEvent::SampleReady) != ScanAction::Recognize {
            return;
        }

        let tx = self.completions_tx.clone();
        let session = self.session;
        let cancel = self.session_cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => debug!("Recognition cancelled"),
                result = call => {
                    let _ = tx.send(Completion::Recognition { session, result });
                }
            }
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Recognition { session, result } => self.on_recognition(session, result),
            Completion::Search(report) => self.on_search(report),
            Completion::CooldownElapsed { cycle } => {
                self.apply(ScanEvent::CooldownElapsed { cycle });
            }
        }
    }

    fn on_recognition(&mut self, session: u64, result: Result<String, RecognitionError>) {
        if session != self.session || !self.scanning {
            debug!("Discarding recognition result from a stopped session");
            return;
        }

        let text = match result {
            Ok(text) => text,
            Err(e) => {
                warn!("Recognition failed: {}", e);
                self.apply(ScanEvent::RecognitionFailed);
                return;
            }
        };

        let code = self.matcher.find(&text);
        trace!("Recognized {:?} -> {:?}", text, code);

        if let ScanAction::Search { code, cycle } = self.apply(ScanEvent::Recognized(code)) {
            info!("Detected {}", code);
            self.sink.publish(PresentationEvent::CodeDetected(code.clone()));
            self.sink
                .publish(PresentationEvent::Status(ScannerStatus::Detected(code.clone())));
            self.submit(SearchQuery::scan(&code, cycle));
        }
    }

    fn manual_search(&mut self, text: &str) {
        match SearchQuery::manual(text) {
            Ok(query) => self.submit(query),
            Err(e) => debug!("Ignoring manual search: {}", e),
        }
    }

    fn submit(&mut self, query: SearchQuery) {
        let searching = PresentationEvent::Searching {
            keyword: query.text().to_string(),
            origin: query.origin(),
        };

        match self.dispatcher.submit(query) {
            Submission::Started(job) => {
                self.sink.publish(searching);
                self.spawn_search(job);
            }
            Submission::Queued { replaced } => {
                self.sink.publish(searching);
                if let Some(old) = replaced {
                    debug!("Dropping queued search {:?}", old.text());
                    self.drop_scan_query(&old);
                }
            }
            Submission::Declined(query) => self.drop_scan_query(&query),
        }
    }

    /// A scan query that never runs must still release the coordinator
    fn drop_scan_query(&mut self, query: &SearchQuery) {
        if let Some(cycle) = query.scan_cycle() {
            self.apply(ScanEvent::SearchResolved {
                cycle,
                resolution: SearchResolution::Dropped,
            });
        }
    }

    fn spawn_search(&self, job: SearchJob) {
        debug!("Searching {:?} ({})", job.query.text(), job.query.origin());
        let tx = self.completions_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                report = job.run() => {
                    let _ = tx.send(Completion::Search(report));
                }
            }
        });
    }

    fn on_search(&mut self, report: SearchReport) {
        let settled = match self.dispatcher.complete(report.ticket) {
            Ok(settled) => settled,
            Err(e) => {
                warn!("Ignoring search completion: {}", e);
                return;
            }
        };

        let (query, outcome) = report.into_outcome();

        if let Some(cycle) = query.scan_cycle() {
            let resolution = SearchResolution::from(&outcome);
            if let ScanAction::ScheduleReset { cycle, delay } =
                self.apply(ScanEvent::SearchResolved { cycle, resolution })
            {
                self.schedule_reset(cycle, delay);
            }
        }

        if settled.superseded {
            debug!("Search {:?} superseded, not publishing", query.text());
        } else if query.origin() == QueryOrigin::Scan && !self.scanning {
            debug!("Scanning stopped, not publishing {:?}", query.text());
        } else {
            self.publish_outcome(query, outcome);
        }

        if let Some(next) = settled.next {
            self.spawn_search(next);
        }
    }

    fn publish_outcome(&mut self, query: SearchQuery, outcome: SearchOutcome) {
        let origin = query.origin();
        let keyword = match &outcome {
            SearchOutcome::Empty { keyword } => keyword.clone(),
            _ => query.text().to_string(),
        };

        match &outcome {
            SearchOutcome::Success { products, duration_sec } => {
                info!(
                    "Found {} result(s) for {:?} in {}s",
                    products.len(),
                    keyword,
                    duration_sec
                );
                self.runtime.write().clear_error();
            }
            SearchOutcome::Failure { reason } => {
                warn!("Search for {:?} failed: {}", keyword, reason);
                self.runtime.write().set_error(reason.to_string());
            }
            SearchOutcome::Empty { .. } => info!("No results for {:?}", keyword),
        }

        let network_error = outcome.is_network_error();
        let fallback = origin == QueryOrigin::Scan
            && !network_error
            && !matches!(outcome, SearchOutcome::Success { .. });

        self.sink.publish(PresentationEvent::Outcome {
            keyword: keyword.clone(),
            origin,
            outcome,
        });

        if network_error {
            self.sink
                .publish(PresentationEvent::Status(ScannerStatus::NetworkError));
        } else if fallback {
            self.sink
                .publish(PresentationEvent::Status(ScannerStatus::ScanFailed));
            self.sink
                .publish(PresentationEvent::ManualEntryRequested { keyword });
        }
    }

    fn schedule_reset(&self, cycle: u64, delay: std::time::Duration) {
        debug!("Detection {} resets in {:?}", cycle, delay);
        let tx = self.completions_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Completion::CooldownElapsed { cycle });
                }
            }
        });
    }

    /// Feed one event to the state machine. Rejected events are logged and
    /// leave the state untouched.
    fn apply(&mut self, event: ScanEvent) -> ScanAction {
        let before = self.state.phase();
        match self.state.apply(event, Instant::now(), &self.policy) {
            Ok(action) => {
                let after = self.state.phase();
                if before != after {
                    debug!("Scan state {} -> {}", before, after);
                }
                action
            }
            Err(e) => {
                debug!("Rejected scan event: {}", e);
                ScanAction::None
            }
        }
    }

    fn sync_runtime(&self) {
        let mut runtime = self.runtime.write();
        runtime.is_scanning = self.scanning;
        runtime.phase = self.state.phase();
        runtime.last_code = self.state.last_code().cloned();
        runtime.cooling_down = self.state.is_cooling_down();
        runtime.search_in_flight = self.dispatcher.is_busy();
    }
}
