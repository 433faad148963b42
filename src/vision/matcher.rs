//! Model code matching on recognized text

use regex::Regex;
use std::fmt;

/// Default model code shape: five uppercase letters, a hyphen, two digits
pub const DEFAULT_CODE_PATTERN: &str = "[A-Z]{5}-[0-9]{2}";

/// A model code pulled out of recognized text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecognizedCode(String);

impl RecognizedCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecognizedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Finds the first model code in a blob of text
#[derive(Debug, Clone)]
pub struct CodeMatcher {
    pattern: Regex,
}

impl CodeMatcher {
    /// Compile a matcher for the given pattern
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// First code in `text`, ignoring anything around it
    pub fn find(&self, text: &str) -> Option<RecognizedCode> {
        self.pattern
            .find(text)
            .map(|m| RecognizedCode(m.as_str().to_string()))
    }
}

impl Default for CodeMatcher {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_CODE_PATTERN).expect("default code pattern is valid"),
        }
    }
}
