// ==============================================================================
// lib.rs - Variant Merge Library
// ==============================================================================
// Description: Library interface for the variant table merge engine
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2025-11-19
// Version: 2.0.0
// ==============================================================================

pub mod error;
pub mod merge;
pub mod models;
pub mod output;
pub mod parsers;
pub mod validator;

pub use error::{MergeError, Result};
pub use merge::{Merge, MergeConfig, MergeStrategy, Stage, StrategyKind};
pub use models::{ColumnSchema, InputSource, OutputTable, PositionKey, Row};
pub use output::{Artifact, ArtifactKind, ArtifactSink, DirectorySink, MemorySink};
