// ==============================================================================
// merge/pivot_join.rs - Pivot Join Merge
// ==============================================================================
// Description: Joins per-sample, per-caller tables into one wide row per
//              position, with N/A placeholders for callers that missed it
// Author: Matt Barham
// Created: 2025-11-15
// Modified: 2025-11-19
// Version: 1.2.0
// ==============================================================================
// Source naming: "<sample>_<caller>", split at the first '_'
//   S1_gatk      -> sample "S1", caller "gatk"
//   S1_gatk_hc   -> sample "S1", caller "gatk_hc"
//
// Output header per sample:
//   CHROM POS REF ALT  <caller>_<col>...  VC_DETECTION_COUNT  SAMPLE
// ==============================================================================

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{load_tables, position_key, Lifecycle, Merge, MergeConfig, Stage};
use crate::error::{MergeError, Result};
use crate::models::{ColumnSchema, InputSource, OutputTable, PositionKey, Row, POSITION_COLUMNS};
use crate::parsers::ParsedTable;

/// Placeholder value for callers without a call at a position
pub const MISSING_VALUE: &str = "N/A";

pub const DETECTION_COUNT_COLUMN: &str = "VC_DETECTION_COUNT";
pub const SAMPLE_COLUMN: &str = "SAMPLE";

const RESULT_EXTENSION: &str = ".vc_sample.tsv";

/// Pivot join options
#[derive(Debug, Clone)]
pub struct PivotJoinOptions {
    /// Separator between sample and caller in a source name
    pub separator: char,

    /// Reject inputs that describe more than one sample
    pub single_sample: bool,
}

impl Default for PivotJoinOptions {
    fn default() -> Self {
        Self {
            separator: '_',
            single_sample: false,
        }
    }
}

/// Sample and caller encoded in a source name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceName {
    pub sample: String,
    pub caller: String,
}

impl SourceName {
    /// Split `name` at the first separator into (sample, caller)
    pub fn parse(name: &str, separator: char) -> Result<Self> {
        match name.split_once(separator) {
            Some((sample, caller)) if !sample.is_empty() && !caller.is_empty() => Ok(Self {
                sample: sample.to_string(),
                caller: caller.to_string(),
            }),
            _ => Err(MergeError::naming(
                name,
                format!(
                    "sample not provided (expected <sample>{}<caller>)",
                    separator
                ),
            )),
        }
    }
}

/// Everything recorded for one sample
#[derive(Debug, Default)]
struct SampleAccumulation {
    /// Caller -> non-position schema, captured from the caller's first row.
    /// Later tables for the same (sample, caller) never replace it.
    callers: IndexMap<String, Arc<ColumnSchema>>,

    /// Position -> caller -> row, in first-appearance order
    positions: IndexMap<PositionKey, IndexMap<String, Row>>,
}

impl SampleAccumulation {
    fn add_row(&mut self, caller: &str, key: PositionKey, row: Row) {
        if !self.callers.contains_key(caller) {
            self.callers
                .insert(caller.to_string(), Arc::new(row.schema().without_position_columns()));
        }

        if let Some(previous) = self
            .positions
            .entry(key)
            .or_default()
            .insert(caller.to_string(), row)
        {
            warn!(
                "Caller '{}' reported the same position twice; keeping the later row (was {:?})",
                caller,
                previous.values()
            );
        }
    }
}

/// Sample -> accumulation, in first-appearance order
type PivotAccumulation = IndexMap<String, SampleAccumulation>;

/// Join of per-caller tables into one wide table per sample
#[derive(Debug)]
pub struct PivotJoinMerge {
    tables: Vec<ParsedTable>,
    options: PivotJoinOptions,
    lifecycle: Lifecycle<PivotAccumulation>,
}

impl PivotJoinMerge {
    pub fn new(sources: Vec<InputSource>, config: &MergeConfig) -> Result<Self> {
        Ok(Self {
            tables: load_tables(sources, config)?,
            options: config.pivot.clone(),
            lifecycle: Lifecycle::default(),
        })
    }

    fn build_sample_table(sample: &str, accumulation: SampleAccumulation) -> Result<OutputTable> {
        let SampleAccumulation { callers, positions } = accumulation;

        let mut header: Vec<String> = POSITION_COLUMNS.iter().map(|c| c.to_string()).collect();
        for (caller, schema) in &callers {
            header.extend(schema.iter().map(|column| format!("{}_{}", caller, column)));
        }
        header.push(DETECTION_COUNT_COLUMN.to_string());
        header.push(SAMPLE_COLUMN.to_string());

        let mut table = OutputTable::new(sample, RESULT_EXTENSION, header);

        for (key, calls) in positions {
            // Position values are the key fields of the first caller's row
            let mut values = vec![
                key.chrom.clone(),
                key.pos.clone(),
                key.ref_allele.clone(),
                key.alt_allele.clone(),
            ];

            for (caller, schema) in &callers {
                match calls.get(caller) {
                    Some(row) => {
                        for column in schema.iter() {
                            let value = row.get(column).ok_or_else(|| {
                                MergeError::join(format!(
                                    "caller '{}' of sample '{}' lacks column {} at {} (schema fixed by its first table)",
                                    caller, sample, column, key
                                ))
                            })?;
                            values.push(value.to_string());
                        }
                    }
                    None => {
                        values.extend(schema.iter().map(|_| MISSING_VALUE.to_string()));
                    }
                }
            }

            values.push(calls.len().to_string());
            values.push(sample.to_string());
            table.rows.push(values);
        }

        Ok(table)
    }
}

impl Merge for PivotJoinMerge {
    fn stage(&self) -> Stage {
        self.lifecycle.stage()
    }

    fn process(&mut self) -> Result<()> {
        self.lifecycle.ensure_unprocessed()?;

        let names = self
            .tables
            .iter()
            .map(|table| SourceName::parse(&table.name, self.options.separator))
            .collect::<Result<Vec<_>>>()?;

        if self.options.single_sample {
            if let Some(first) = names.first() {
                if let Some(other) = names.iter().find(|n| n.sample != first.sample) {
                    return Err(MergeError::join(format!(
                        "sample mismatch: '{}' and '{}' in single-sample mode",
                        first.sample, other.sample
                    )));
                }
            }
        }

        let mut accumulation = PivotAccumulation::new();

        for (table, name) in self.tables.iter().zip(&names) {
            if table.rows.is_empty() {
                continue;
            }

            let sample = accumulation.entry(name.sample.clone()).or_default();

            if let Some(recorded) = sample.callers.get(&name.caller) {
                let schema = table.schema.without_position_columns();
                if **recorded != schema {
                    warn!(
                        "Ignoring schema of '{}': caller '{}' of sample '{}' keeps its first schema [{}]",
                        table.name,
                        name.caller,
                        name.sample,
                        recorded.names().join(", ")
                    );
                }
            }

            for row in &table.rows {
                let key = position_key(&table.name, row)?;
                sample.add_row(&name.caller, key, row.clone());
            }

            debug!(
                "Joined '{}' as sample '{}', caller '{}' ({} rows)",
                table.name,
                name.sample,
                name.caller,
                table.rows.len()
            );
        }

        self.lifecycle.processed(accumulation);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let accumulation = self.lifecycle.take_for_save()?;

        if accumulation.values().all(|s| s.positions.is_empty()) {
            return Err(MergeError::join("result is empty"));
        }

        let outputs = accumulation
            .into_iter()
            .map(|(sample, acc)| Self::build_sample_table(&sample, acc))
            .collect::<Result<Vec<_>>>()?;

        self.lifecycle.saved(outputs);
        Ok(())
    }

    fn outputs(&self) -> Result<&[OutputTable]> {
        self.lifecycle.outputs()
    }

    fn archive_name(&self) -> &'static str {
        "vc_samples.zip"
    }
}
