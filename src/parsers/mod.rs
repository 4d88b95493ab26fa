// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Parsers for variant-caller table formats
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2025-11-14
// Version: 2.0.0
// ==============================================================================

pub mod delimited;

pub use delimited::{DelimitedParser, LinePredicate, ParseError, ParseOptions, ParsedTable};
