// ==============================================================================
// error.rs - Merge Error Taxonomy
// ==============================================================================
// Description: Fail-fast error types shared by every merge strategy
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-18
// Version: 1.0.0
// ==============================================================================

use thiserror::Error;

use crate::parsers::ParseError;

/// Errors raised while loading, merging or emitting variant tables.
///
/// Every variant is fatal to the batch: the first violation aborts the run
/// and nothing is handed to the sink.
#[derive(Error, Debug)]
pub enum MergeError {
    /// No sources supplied, or a source could not be read
    #[error("Input error: {message}")]
    Input { message: String },

    /// A source could not be parsed as a delimited table
    #[error("Failed to parse source '{source_name}': {error}")]
    Parse {
        source_name: String,
        #[source]
        error: ParseError,
    },

    /// Missing mandatory column, or schemas that were expected to match differ
    #[error("Schema error in '{source_name}': {message}")]
    Schema { source_name: String, message: String },

    /// Source name does not decompose into the required parts
    #[error("Invalid source name '{source_name}': {message}")]
    Naming { source_name: String, message: String },

    /// Cross-source identity mismatch, or an empty join result
    #[error("Join error: {message}")]
    Join { message: String },

    /// Indel representation violates the one-character shared-prefix rule
    #[error("Normalization error in '{source_name}' (line {line}): {message}")]
    Normalization {
        source_name: String,
        line: usize,
        message: String,
    },

    /// Lifecycle method called out of order
    #[error("Usage error: {0}")]
    Usage(String),

    /// Unknown strategy identifier or invalid option
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rendering or packaging an artifact failed
    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MergeError>;

impl MergeError {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    pub fn schema(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn naming(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Naming {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn join(message: impl Into<String>) -> Self {
        Self::Join {
            message: message.into(),
        }
    }

    pub fn normalization(
        source_name: impl Into<String>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Normalization {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }
}
