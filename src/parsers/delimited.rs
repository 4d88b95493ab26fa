// ==============================================================================
// parsers/delimited.rs - Generic Delimited Table Parser
// ==============================================================================
// Description: Parses header-first delimited text into a column schema and rows
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-18
// Version: 1.1.0
// ==============================================================================
// Format: One record per line, fields separated by a single delimiter
// Example (tab-delimited):
//   ##source=caller
//   CHROM    POS    REF    ALT    QUAL
//   1        100    A      T      30
//   1        200    AT     A      12
// ==============================================================================

use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{ColumnSchema, Row};

/// Predicate deciding whether a raw line is dropped before parsing
pub type LinePredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Parsed delimited table
#[derive(Debug, Clone)]
pub struct ParsedTable {
    /// Source name the table was parsed from
    pub name: String,

    /// Column schema (empty if the stream held no records at all)
    pub schema: Arc<ColumnSchema>,

    /// Data rows, every one aligned with `schema`
    pub rows: Vec<Row>,
}

impl ParsedTable {
    pub fn has_header(&self) -> bool {
        !self.schema.is_empty()
    }
}

/// Errors that can occur during delimited table parsing
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Column \"{0}\" is not defined in the file")]
    MissingColumn(String),

    #[error("Line {line}: expected at least {expected} fields, found {found}")]
    ShortLine {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {line} is not valid UTF-8")]
    InvalidEncoding { line: usize },
}

/// Options controlling how lines become rows
#[derive(Clone)]
pub struct ParseOptions {
    /// Logical column name -> header name in the file, in output order.
    /// `None` selects every header column under its own name.
    pub columns: Option<Vec<(String, String)>>,

    /// Lines matching any predicate are dropped before anything else
    pub ignored_lines: Vec<LinePredicate>,

    /// Treat the first surviving line as the header
    pub first_line_is_header: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            columns: None,
            ignored_lines: Vec::new(),
            first_line_is_header: true,
        }
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("columns", &self.columns)
            .field("ignored_lines", &self.ignored_lines.len())
            .field("first_line_is_header", &self.first_line_is_header)
            .finish()
    }
}

impl ParseOptions {
    /// Drop lines starting with `prefix` (e.g. "#" or "##")
    pub fn ignore_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.ignored_lines
            .push(Arc::new(move |line: &str| line.starts_with(prefix.as_str())));
        self
    }

    /// Drop lines matching an arbitrary predicate
    pub fn ignore_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.ignored_lines.push(Arc::new(predicate));
        self
    }

    /// Select (and rename) columns: each pair is (logical name, file header name)
    pub fn with_columns<I, L, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (L, S)>,
        L: Into<String>,
        S: Into<String>,
    {
        self.columns = Some(
            columns
                .into_iter()
                .map(|(logical, source)| (logical.into(), source.into()))
                .collect(),
        );
        self
    }

    pub fn without_header(mut self) -> Self {
        self.first_line_is_header = false;
        self
    }

    fn is_ignored(&self, line: &str) -> bool {
        self.ignored_lines.iter().any(|predicate| predicate(line))
    }
}

/// Parser for delimiter-separated tables
#[derive(Debug, Clone)]
pub struct DelimitedParser {
    /// Column delimiter
    pub delimiter: char,

    pub options: ParseOptions,
}

impl Default for DelimitedParser {
    fn default() -> Self {
        Self::new('\t')
    }
}

impl DelimitedParser {
    /// Create a parser with default options (header line, all columns)
    pub fn new(delimiter: char) -> Self {
        Self {
            delimiter,
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(delimiter: char, options: ParseOptions) -> Self {
        Self { delimiter, options }
    }

    /// Parse a whole stream into a table
    ///
    /// # Arguments
    /// * `reader` - Delimited text source
    /// * `name` - Name recorded on the resulting table
    ///
    /// # Returns
    /// * `Ok(ParsedTable)` - Schema and rows (possibly none)
    /// * `Err(ParseError)` - Unreadable stream, missing selected column or
    ///   a line too short for the selected columns
    pub fn parse<R: Read>(&self, reader: R, name: &str) -> Result<ParsedTable, ParseError> {
        let lines = self.read_lines(reader)?;
        let mut lines = lines.into_iter();

        let (schema, projection) = if self.options.first_line_is_header {
            match lines.next() {
                Some((_, header)) => self.header_projection(&header)?,
                None => return Ok(Self::empty(name)),
            }
        } else {
            match lines.as_slice().first() {
                Some((_, first)) => self.positional_projection(self.split(first).len())?,
                None => return Ok(Self::empty(name)),
            }
        };

        let schema = Arc::new(schema);
        let mut rows = Vec::new();

        for (line_number, line) in lines {
            let fields = self.split(&line);
            let values = projection.apply(fields, line_number)?;
            rows.push(Row::new(Arc::clone(&schema), values).at_line(line_number));
        }

        Ok(ParsedTable {
            name: name.to_string(),
            schema,
            rows,
        })
    }

    /// Parse an in-memory buffer
    pub fn parse_bytes(&self, bytes: &[u8], name: &str) -> Result<ParsedTable, ParseError> {
        self.parse(bytes, name)
    }

    fn empty(name: &str) -> ParsedTable {
        ParsedTable {
            name: name.to_string(),
            schema: Arc::new(ColumnSchema::default()),
            rows: Vec::new(),
        }
    }

    /// Surviving (line number, text) pairs: blank and ignored lines removed
    fn read_lines<R: Read>(&self, reader: R) -> Result<Vec<(usize, String)>, ParseError> {
        let mut reader = BufReader::new(reader);
        let mut lines = Vec::new();
        let mut buffer = Vec::new();
        let mut line_number = 0;

        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            line_number += 1;

            let text = std::str::from_utf8(&buffer)
                .map_err(|_| ParseError::InvalidEncoding { line: line_number })?;
            let text = text.trim_end_matches(['\n', '\r']);

            if text.trim().is_empty() || self.options.is_ignored(text) {
                continue;
            }

            lines.push((line_number, text.to_string()));
        }

        Ok(lines)
    }

    fn split(&self, line: &str) -> Vec<String> {
        line.split(self.delimiter)
            .map(|field| field.trim().to_string())
            .collect()
    }

    fn header_projection(&self, header_line: &str) -> Result<(ColumnSchema, Projection), ParseError> {
        self.select_columns(&self.split(header_line))
    }

    /// Columns are named "0".."width-1"; a column map selects by those names
    fn positional_projection(&self, width: usize) -> Result<(ColumnSchema, Projection), ParseError> {
        let names: Vec<String> = (0..width).map(|i| i.to_string()).collect();

        if self.options.columns.is_some() {
            return self.select_columns(&names);
        }

        Ok((ColumnSchema::new(names), Projection::Positional(width)))
    }

    fn select_columns(&self, header: &[String]) -> Result<(ColumnSchema, Projection), ParseError> {
        let mut columns: Vec<(String, String)> = match &self.options.columns {
            Some(columns) => columns.clone(),
            None => header.iter().map(|c| (c.clone(), c.clone())).collect(),
        };
        // Repeated logical names keep their first mapping.
        let mut seen = Vec::with_capacity(columns.len());
        columns.retain(|(logical, _)| {
            if seen.contains(logical) {
                false
            } else {
                seen.push(logical.clone());
                true
            }
        });

        let mut indices = Vec::with_capacity(columns.len());
        for (_, source) in &columns {
            let idx = header
                .iter()
                .position(|token| token == source)
                .ok_or_else(|| ParseError::MissingColumn(source.clone()))?;
            indices.push(idx);
        }

        let schema = ColumnSchema::new(columns.into_iter().map(|(logical, _)| logical));

        Ok((schema, Projection::Indices(indices)))
    }
}

/// How split fields become row values
enum Projection {
    /// Pick these field positions, in order
    Indices(Vec<usize>),
    /// Use every field as-is; lines must have exactly this many
    Positional(usize),
}

impl Projection {
    fn apply(&self, fields: Vec<String>, line: usize) -> Result<Vec<String>, ParseError> {
        match self {
            Projection::Indices(indices) => {
                let needed = indices.iter().max().map_or(0, |max| max + 1);
                if fields.len() < needed {
                    return Err(ParseError::ShortLine {
                        line,
                        expected: needed,
                        found: fields.len(),
                    });
                }
                Ok(indices.iter().map(|&idx| fields[idx].clone()).collect())
            }
            Projection::Positional(width) => {
                if fields.len() != *width {
                    return Err(ParseError::FieldCount {
                        line,
                        expected: *width,
                        found: fields.len(),
                    });
                }
                Ok(fields)
            }
        }
    }
}
