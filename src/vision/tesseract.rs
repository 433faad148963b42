//! Tesseract CLI recognition engine
//!
//! Pipes a PNG-encoded region into `tesseract stdin stdout` and reads back the
//! text. The child process is killed if the call is dropped.

use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::recognizer::{RecognitionEngine, RecognitionError};
use crate::config::RecognitionSettings;

/// Recognition engine backed by the `tesseract` executable
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
    language: String,
    whitelist: String,
    psm: u8,
}

impl TesseractEngine {
    pub fn new(settings: &RecognitionSettings) -> Self {
        Self {
            binary: settings.tesseract_path.clone(),
            language: settings.language.clone(),
            whitelist: settings.char_whitelist.clone(),
            psm: settings.page_segmentation_mode,
        }
    }

    /// Arguments for one recognition run
    fn recognize_args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            self.psm.to_string(),
            "-c".to_string(),
            format!("tessedit_char_whitelist={}", self.whitelist),
        ]
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RecognitionError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| RecognitionError::Failed(format!("PNG encoding failed: {}", e)))?;
    Ok(buffer.into_inner())
}

#[async_trait]
impl RecognitionEngine for TesseractEngine {
    async fn prepare(&self) -> Result<(), RecognitionError> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RecognitionError::Unavailable(format!("cannot run {:?}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            return Err(RecognitionError::Unavailable(format!(
                "{:?} --version exited with {}",
                self.binary, output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!(
            "Tesseract ready: {}",
            version.lines().next().unwrap_or("unknown version")
        );
        Ok(())
    }

    async fn recognize(&self, image: &RgbaImage) -> Result<String, RecognitionError> {
        let png = encode_png(image)?;

        let mut child = Command::new(&self.binary)
            .args(self.recognize_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecognitionError::Failed(format!("cannot spawn tesseract: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&png)
                .await
                .map_err(|e| RecognitionError::Failed(format!("writing image failed: {}", e)))?;
            // Closing stdin signals end of image
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RecognitionError::Failed(format!("tesseract did not finish: {}", e)))?;

        if !output.status.success() {
            return Err(RecognitionError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("Tesseract read {:?}", text.trim());
        Ok(text)
    }
}
