//! Vision Layer
//!
//! Turns the latest camera frame into a model code:
//! - [`region`] crops the region of interest
//! - [`recognizer`] runs the text recognition engine (single flight)
//! - [`matcher`] picks the model code out of the recognized text

pub mod matcher;
pub mod recognizer;
pub mod region;
pub mod tesseract;

pub use matcher::{CodeMatcher, RecognizedCode};
pub use recognizer::{RecognitionEngine, RecognitionError, Recognizer};
pub use region::{RegionError, RegionExtractor, ScanSample};
pub use tesseract::TesseractEngine;
