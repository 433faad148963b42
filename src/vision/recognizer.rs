//! Recognition adapter
//!
//! Wraps an external text recognition engine behind an async capability and
//! guarantees at most one call is in flight.

use async_trait::async_trait;
use image::RgbaImage;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;

use super::region::ScanSample;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("a recognition call is already in flight")]
    Busy,
    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),
    #[error("recognition failed: {0}")]
    Failed(String),
}

/// Black-box text recognition engine. Implementations may be slow and need not
/// be safe to call concurrently; [`Recognizer`] serializes access.
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Load models / check the engine can run
    async fn prepare(&self) -> Result<(), RecognitionError> {
        Ok(())
    }

    /// Read the text in an image
    async fn recognize(&self, image: &RgbaImage) -> Result<String, RecognitionError>;
}

/// Single-flight front for a [`RecognitionEngine`]
#[derive(Clone)]
pub struct Recognizer {
    engine: Arc<dyn RecognitionEngine>,
    in_flight: Arc<Semaphore>,
}

impl Recognizer {
    pub fn new(engine: Arc<dyn RecognitionEngine>) -> Self {
        Self {
            engine,
            in_flight: Arc::new(Semaphore::new(1)),
        }
    }

    pub async fn prepare(&self) -> Result<(), RecognitionError> {
        self.engine.prepare().await
    }

    /// Whether a call is currently outstanding
    pub fn is_busy(&self) -> bool {
        self.in_flight.available_permits() == 0
    }

    /// Claim the in-flight slot and return the call as a future.
    ///
    /// The slot is held until the returned future completes or is dropped.
    pub fn begin(
        &self,
        sample: ScanSample,
    ) -> Result<impl Future<Output = Result<String, RecognitionError>> + Send + 'static, RecognitionError>
    {
        let permit = self
            .in_flight
            .clone()
            .try_acquire_owned()
            .map_err(|_| RecognitionError::Busy)?;
        let engine = self.engine.clone();

        Ok(async move {
            let _permit = permit;
            let text = engine.recognize(&sample.image).await?;
            Ok::<_, RecognitionError>(text.trim().to_string())
        })
    }
}
