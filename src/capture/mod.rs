//! Frame Source Layer
//!
//! The camera itself is external. Producers push frames into a [`FrameSlot`];
//! the scan loop only ever reads the most recent one.

pub mod frame;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use frame::CapturedFrame;

/// Anything that can hand out the latest camera frame
pub trait FrameSource: Send + Sync {
    /// The most recent frame, or `None` while the source is not ready yet
    fn latest_frame(&self) -> Option<Arc<CapturedFrame>>;
}

/// Latest-frame cell shared between a frame producer and the scan loop
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: RwLock<Option<Arc<CapturedFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame
    pub fn publish(&self, frame: CapturedFrame) {
        *self.latest.write() = Some(Arc::new(frame));
    }

    /// Drop the current frame (source went away)
    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}

impl FrameSource for FrameSlot {
    fn latest_frame(&self) -> Option<Arc<CapturedFrame>> {
        self.latest.read().clone()
    }
}

/// Still-image feed configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Images to cycle through
    pub paths: Vec<PathBuf>,
    /// Frames published per second
    pub max_fps: u32,
}

/// Stands in for a camera by publishing still images into a [`FrameSlot`]
pub struct FrameReplay {
    frames: Vec<Arc<image::RgbaImage>>,
    max_fps: u32,
    slot: Arc<FrameSlot>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FrameReplay {
    /// Decode every image up front so a bad file fails startup, not the feed
    pub fn new(config: ReplayConfig, slot: Arc<FrameSlot>) -> Result<Self> {
        if config.paths.is_empty() {
            anyhow::bail!("No frame images given");
        }

        let frames = config
            .paths
            .iter()
            .map(|path| {
                image::open(path)
                    .map(|img| Arc::new(img.to_rgba8()))
                    .with_context(|| format!("Failed to load frame image {:?}", path))
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Loaded {} frame image(s) for replay", frames.len());

        Ok(Self {
            frames,
            max_fps: config.max_fps.max(1),
            slot,
            cancel: CancellationToken::new(),
            handle: None,
        })
    }

    /// Start publishing frames
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }

        let frames = self.frames.clone();
        let slot = self.slot.clone();
        let cancel = self.cancel.clone();
        let period = Duration::from_secs_f64(1.0 / self.max_fps as f64);

        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            let mut index = 0usize;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let image = frames[index % frames.len()].as_ref().clone();
                        slot.publish(CapturedFrame::from_image(image));
                        index = index.wrapping_add(1);
                    }
                }
            }
            // Cleared here so no publish can land after it
            slot.clear();
            debug!("Frame replay stopped");
        }));
    }

    /// Stop publishing frames and wait for the feed task to finish. The slot
    /// is empty once this returns.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        match self.handle.take() {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!("Frame replay task failed: {}", e);
                    self.slot.clear();
                }
            }
            None => self.slot.clear(),
        }
    }
}

impl Drop for FrameReplay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_starts_empty() {
        let slot = FrameSlot::new();
        assert!(slot.latest_frame().is_none());
    }

    #[test]
    fn test_slot_keeps_only_latest() {
        let slot = FrameSlot::new();
        slot.publish(CapturedFrame::new(vec![0; 4], 1, 1));
        slot.publish(CapturedFrame::new(vec![0; 16], 2, 2));

        let frame = slot.latest_frame().unwrap();
        assert_eq!(frame.dimensions(), (2, 2));

        slot.clear();
        assert!(slot.latest_frame().is_none());
    }

    #[test]
    fn test_replay_requires_images() {
        let config = ReplayConfig {
            paths: vec![],
            max_fps: 10,
        };
        assert!(FrameReplay::new(config, Arc::new(FrameSlot::new())).is_err());
    }

    #[tokio::test]
    async fn test_replay_publishes_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbaImage::from_pixel(8, 4, image::Rgba([255, 255, 255, 255]))
            .save(&path)
            .unwrap();

        let slot = Arc::new(FrameSlot::new());
        let mut replay = FrameReplay::new(
            ReplayConfig {
                paths: vec![path],
                max_fps: 50,
            },
            slot.clone(),
        )
        .unwrap();

        replay.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(slot.latest_frame().unwrap().dimensions(), (8, 4));

        replay.stop().await;
        assert!(slot.latest_frame().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stop_leaves_slot_empty_while_feed_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbaImage::from_pixel(64, 64, image::Rgba([0, 0, 0, 255]))
            .save(&path)
            .unwrap();

        let slot = Arc::new(FrameSlot::new());
        let mut replay = FrameReplay::new(
            ReplayConfig {
                paths: vec![path],
                max_fps: 1000,
            },
            slot.clone(),
        )
        .unwrap();

        replay.start();
        tokio::time::sleep(Duration::from_millis(20)).await;
        replay.stop().await;

        // Nothing publishes after stop returns
        for _ in 0..5 {
            assert!(slot.latest_frame().is_none());
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_stop_before_start_clears_slot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbaImage::new(2, 2).save(&path).unwrap();

        let slot = Arc::new(FrameSlot::new());
        slot.publish(CapturedFrame::new(vec![0; 4], 1, 1));
        let mut replay = FrameReplay::new(
            ReplayConfig {
                paths: vec![path],
                max_fps: 10,
            },
            slot.clone(),
        )
        .unwrap();

        replay.stop().await;
        assert!(slot.latest_frame().is_none());
    }
}
