//! # Conquest Development Tools
//!
//! Command-line tools for development:
//! - Ruleset validators
//! - Legacy snapshot normalization

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod normalize;
pub mod validate;

use thiserror::Error;

/// Error type for tool operations.
#[derive(Error, Debug)]
pub enum ToolError {
    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(String),
    /// Failed to read or write a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to encode RON output.
    #[error("Failed to encode RON: {0}")]
    Encode(#[from] ron::Error),
    /// The engine rejected the input.
    #[error(transparent)]
    Engine(#[from] conquest_core::error::EngineError),
}

fn read(path: &std::path::Path) -> Result<String, ToolError> {
    if !path.exists() {
        return Err(ToolError::FileNotFound(path.display().to_string()));
    }
    Ok(std::fs::read_to_string(path)?)
}
