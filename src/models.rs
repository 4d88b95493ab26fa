// ==============================================================================
// models.rs - Variant Table Data Models
// ==============================================================================
// Description: Schemas, rows, position keys and output tables shared by the
//              parser and every merge strategy
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2025-11-18
// Version: 3.0.0
// ==============================================================================

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Columns that identify a genomic position/allele, in key order.
/// Every input table must carry all of them.
pub const POSITION_COLUMNS: [&str; 4] = ["CHROM", "POS", "REF", "ALT"];

/// Ordered set of distinct column names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<String>,
}

impl ColumnSchema {
    /// Build a schema, keeping the first occurrence of repeated names
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if !unique.contains(&column) {
                unique.push(column);
            }
        }
        Self { columns: unique }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    pub fn names(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Mandatory columns absent from this schema, in key order
    pub fn missing_position_columns(&self) -> Vec<&'static str> {
        POSITION_COLUMNS
            .iter()
            .copied()
            .filter(|column| !self.contains(column))
            .collect()
    }

    /// Schema without the position columns, original order preserved
    pub fn without_position_columns(&self) -> ColumnSchema {
        ColumnSchema {
            columns: self
                .columns
                .iter()
                .filter(|c| !POSITION_COLUMNS.contains(&c.as_str()))
                .cloned()
                .collect(),
        }
    }
}

/// One table row: values aligned with a shared schema
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    schema: Arc<ColumnSchema>,
    values: Vec<String>,
    /// 1-based source line, 0 when the row was not read from a stream
    line: usize,
}

impl Row {
    pub fn new(schema: Arc<ColumnSchema>, values: Vec<String>) -> Self {
        debug_assert_eq!(schema.len(), values.len(), "row width must match schema");
        Self {
            schema,
            values,
            line: 0,
        }
    }

    /// Record the source line this row was read from
    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.schema
            .position(column)
            .map(|idx| self.values[idx].as_str())
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// (column, value) pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.schema
            .iter()
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn into_values(self) -> Vec<String> {
        self.values
    }
}

/// Key aligning rows that describe the same genomic position and allele.
///
/// Kept as four separate fields so that, for example, CHROM "1" + POS "23"
/// and CHROM "12" + POS "3" never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PositionKey {
    pub chrom: String,
    pub pos: String,
    pub ref_allele: String,
    pub alt_allele: String,
}

impl PositionKey {
    /// Derive the key from a row's CHROM, POS, REF and ALT values.
    ///
    /// Returns the name of the first absent position column on failure.
    pub fn from_row(row: &Row) -> Result<Self, &'static str> {
        let field = |column: &'static str| row.get(column).map(str::to_string).ok_or(column);

        Ok(Self {
            chrom: field("CHROM")?,
            pos: field("POS")?,
            ref_allele: field("REF")?,
            alt_allele: field("ALT")?,
        })
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chrom, self.pos, self.ref_allele, self.alt_allele
        )
    }
}

/// Named, already-identified input buffer handed to a strategy
#[derive(Debug, Clone)]
pub struct InputSource {
    /// Source name (file name without its extension chain, e.g. "S1_gatk")
    pub name: String,

    /// Decompressed table bytes
    pub bytes: Vec<u8>,
}

impl InputSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Table produced by a strategy's `save` step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputTable {
    /// Packaging key (sample name, source name, ...)
    pub name: String,

    /// Suggested file name, `<key><extension>`
    pub file_name: String,

    pub header: Vec<String>,

    #[serde(skip)]
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    pub fn new(name: impl Into<String>, extension: &str, header: Vec<String>) -> Self {
        let name = name.into();
        Self {
            file_name: format!("{}{}", name, extension),
            name,
            header,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}
