//! Application Coordinator
//!
//! Brings the camera feed, recognition engine and search client up, starts the
//! scan pipeline, and tears everything down again.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::capture::{FrameReplay, FrameSlot, ReplayConfig};
use crate::config::{AppConfig, ConfigError};
use crate::scanner::{PipelineHandle, ScanComponents, ScanPipeline};
use crate::search::HttpSearchClient;
use crate::shared::{PresentationEvent, PresentationSink, ScannerStatus};
use crate::vision::{RecognitionError, TesseractEngine};

/// Startup failures. Fatal to the whole pipeline and reported once.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("camera unavailable: {0}")]
    Camera(String),
    #[error("{0}")]
    Engine(#[from] RecognitionError),
    #[error("search client unavailable: {0}")]
    Search(String),
}

/// Main application coordinator
pub struct ProductScannerApp {
    pipeline: PipelineHandle,
    task: Option<JoinHandle<()>>,
    /// Keeps the frame feed alive while scanning
    replay: Option<FrameReplay>,
}

impl ProductScannerApp {
    /// Start with the real adapters. Without frame images only manual search
    /// is available.
    pub async fn launch(
        config: &AppConfig,
        frame_paths: Vec<PathBuf>,
        sink: Arc<dyn PresentationSink>,
    ) -> Result<Self, InitializationError> {
        sink.publish(PresentationEvent::Status(ScannerStatus::Initializing));

        let scanning = !frame_paths.is_empty();
        let frames = Arc::new(FrameSlot::new());

        let mut replay = if scanning {
            let replay = FrameReplay::new(
                ReplayConfig {
                    paths: frame_paths,
                    max_fps: config.capture.max_fps,
                },
                frames.clone(),
            )
            .map_err(|e| InitializationError::Camera(format!("{:#}", e)));
            Some(report_failure(replay, sink.as_ref())?)
        } else {
            None
        };

        let search = HttpSearchClient::new(&config.search)
            .map_err(|e| InitializationError::Search(format!("{:#}", e)));
        let search = report_failure(search, sink.as_ref())?;

        let components = ScanComponents {
            frames,
            engine: Arc::new(TesseractEngine::new(&config.recognition)),
            search: Arc::new(search),
            sink,
        };

        let mut app = Self::assemble(config, components, scanning).await?;
        if let Some(replay) = replay.as_mut() {
            replay.start();
        }
        app.replay = replay;
        Ok(app)
    }

    /// Start from already built components
    pub async fn assemble(
        config: &AppConfig,
        components: ScanComponents,
        scanning: bool,
    ) -> Result<Self, InitializationError> {
        let sink = components.sink.clone();

        report_failure(
            config.validate().map_err(InitializationError::from),
            sink.as_ref(),
        )?;
        let mut pipeline = report_failure(
            ScanPipeline::new(config.scanner.clone(), components)
                .map_err(InitializationError::from),
            sink.as_ref(),
        )?;
        if !scanning {
            pipeline = pipeline.without_camera();
        }

        if scanning {
            sink.publish(PresentationEvent::Status(ScannerStatus::LoadingEngine));
            report_failure(
                pipeline.prepare_engine().await.map_err(InitializationError::from),
                sink.as_ref(),
            )?;
        }

        let (handle, task) = pipeline.spawn();
        if scanning {
            handle.start_scanning();
        } else {
            info!("No camera frames given, manual search only");
            sink.publish(PresentationEvent::Status(ScannerStatus::Ready));
        }

        Ok(Self {
            pipeline: handle,
            task: Some(task),
            replay: None,
        })
    }

    /// Handle for sending commands to the pipeline
    pub fn pipeline(&self) -> &PipelineHandle {
        &self.pipeline
    }

    /// Stop everything and wait for the pipeline task
    pub async fn shutdown(mut self) {
        if let Some(replay) = self.replay.as_mut() {
            replay.stop().await;
        }
        self.pipeline.shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Scan pipeline task failed: {}", e);
            }
        }
    }
}

impl Drop for ProductScannerApp {
    fn drop(&mut self) {
        // Signal the pipeline to stop
        self.pipeline.shutdown();
    }
}

/// Surface an initialization error once, then hand it back
fn report_failure<T>(
    result: Result<T, InitializationError>,
    sink: &dyn PresentationSink,
) -> Result<T, InitializationError> {
    result.map_err(|e| {
        error!("Initialization failed: {}", e);
        sink.publish(PresentationEvent::Status(ScannerStatus::InitFailed(
            e.to_string(),
        )));
        e
    })
}
