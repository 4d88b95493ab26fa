// ==============================================================================
// merge/mod.rs - Merge Strategy Contract and Selector
// ==============================================================================
// Description: Shared loading/validation, lifecycle tracking and dispatch for
//              the position-keyed merge strategies
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-19
// Version: 1.2.0
// ==============================================================================
// Lifecycle (every strategy):
//   UNPROCESSED --process--> PROCESSED --save--> SAVED --emit--> EMITTED
// emit() consumes the strategy, so a strategy can never be reused afterwards.
// ==============================================================================

pub mod allele_normalize;
pub mod pivot_join;
pub mod union_count;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{MergeError, Result};
use crate::models::{InputSource, OutputTable, PositionKey, Row};
use crate::output::{self, Artifact, ArtifactSink};
use crate::parsers::{DelimitedParser, ParseOptions, ParsedTable};

pub use allele_normalize::{normalize_allele, AlleleNormalizer, NormalizedAllele};
pub use pivot_join::{PivotJoinMerge, PivotJoinOptions, SourceName};
pub use union_count::UnionCountMerge;

/// Identifier choosing a merge strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// Union rows of same-schema files, annotate same-position counts
    UnionCount,
    /// One wide row per position from per-sample, per-caller tables
    PivotJoin,
    /// Canonicalize indel representation row by row
    AlleleNormalize,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [
        StrategyKind::UnionCount,
        StrategyKind::PivotJoin,
        StrategyKind::AlleleNormalize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::UnionCount => "union-count",
            StrategyKind::PivotJoin => "pivot-join",
            StrategyKind::AlleleNormalize => "allele-normalize",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                MergeError::Config(format!(
                    "Unknown merge strategy \"{}\" (expected one of: union-count, pivot-join, allele-normalize)",
                    s
                ))
            })
    }
}

/// Options shared by all strategies
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Input column delimiter
    pub delimiter: char,

    /// Header, column selection and ignored-line handling for every input
    pub parse_options: ParseOptions,

    pub pivot: PivotJoinOptions,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            delimiter: '\t',
            parse_options: ParseOptions::default(),
            pivot: PivotJoinOptions::default(),
        }
    }
}

impl MergeConfig {
    /// Parser applied to every input source
    pub fn parser(&self) -> DelimitedParser {
        DelimitedParser::with_options(self.delimiter, self.parse_options.clone())
    }
}

/// Lifecycle stage of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unprocessed,
    Processed,
    Saved,
}

/// Operations every merge strategy provides
pub trait Merge {
    fn stage(&self) -> Stage;

    /// Build the keyed accumulation from the parsed inputs
    fn process(&mut self) -> Result<()>;

    /// Flatten the accumulation into output tables (consumes it)
    fn save(&mut self) -> Result<()>;

    /// Output tables; only available once saved
    fn outputs(&self) -> Result<&[OutputTable]>;

    /// File name used when several outputs are packaged together
    fn archive_name(&self) -> &'static str;
}

/// Owned accumulation plus finalized outputs, tracking the lifecycle stage
#[derive(Debug)]
pub(crate) struct Lifecycle<A> {
    accumulation: Option<A>,
    outputs: Option<Vec<OutputTable>>,
}

impl<A> Default for Lifecycle<A> {
    fn default() -> Self {
        Self {
            accumulation: None,
            outputs: None,
        }
    }
}

impl<A> Lifecycle<A> {
    pub(crate) fn stage(&self) -> Stage {
        match (&self.accumulation, &self.outputs) {
            (_, Some(_)) => Stage::Saved,
            (Some(_), None) => Stage::Processed,
            (None, None) => Stage::Unprocessed,
        }
    }

    pub(crate) fn ensure_unprocessed(&self) -> Result<()> {
        match self.stage() {
            Stage::Unprocessed => Ok(()),
            _ => Err(MergeError::Usage("Data has already been processed".to_string())),
        }
    }

    pub(crate) fn processed(&mut self, accumulation: A) {
        self.accumulation = Some(accumulation);
    }

    /// Hand the accumulation to `save`; it can be taken exactly once
    pub(crate) fn take_for_save(&mut self) -> Result<A> {
        match self.stage() {
            Stage::Unprocessed => Err(MergeError::Usage("Cannot save unprocessed data".to_string())),
            Stage::Saved => Err(MergeError::Usage("Data has already been saved".to_string())),
            Stage::Processed => self
                .accumulation
                .take()
                .ok_or_else(|| MergeError::Usage("Cannot save unprocessed data".to_string())),
        }
    }

    pub(crate) fn saved(&mut self, outputs: Vec<OutputTable>) {
        self.outputs = Some(outputs);
    }

    pub(crate) fn outputs(&self) -> Result<&[OutputTable]> {
        self.outputs
            .as_deref()
            .ok_or_else(|| MergeError::Usage("Outputs are not available before save".to_string()))
    }
}

/// Parse every source and check the mandatory position columns.
///
/// Tables without any header (empty sources) are kept but skip the column
/// check; if no source yields a header at all the input set is rejected.
pub(crate) fn load_tables(sources: Vec<InputSource>, config: &MergeConfig) -> Result<Vec<ParsedTable>> {
    if sources.is_empty() || sources.iter().all(|s| s.bytes.is_empty()) {
        return Err(MergeError::input("No files provided"));
    }

    let parser = config.parser();
    let mut tables = Vec::with_capacity(sources.len());

    for source in sources {
        let table = parser
            .parse_bytes(&source.bytes, &source.name)
            .map_err(|error| MergeError::Parse {
                source_name: source.name.clone(),
                error,
            })?;

        if table.has_header() {
            let missing = table.schema.missing_position_columns();
            if !missing.is_empty() {
                return Err(MergeError::schema(
                    &table.name,
                    format!("invalid header, missing mandatory column(s): {}", missing.join(", ")),
                ));
            }
        }

        debug!(
            "Parsed source '{}': {} columns, {} rows",
            table.name,
            table.schema.len(),
            table.rows.len()
        );
        tables.push(table);
    }

    if !tables.iter().any(ParsedTable::has_header) {
        return Err(MergeError::input("No files parsed: every source is empty"));
    }

    Ok(tables)
}

/// Position key of a row from a validated table
pub(crate) fn position_key(table_name: &str, row: &Row) -> Result<PositionKey> {
    PositionKey::from_row(row).map_err(|column| {
        MergeError::schema(table_name, format!("row lacks position column {}", column))
    })
}

/// Closed set of merge strategies
#[derive(Debug)]
pub enum MergeStrategy {
    UnionCount(UnionCountMerge),
    PivotJoin(PivotJoinMerge),
    AlleleNormalize(AlleleNormalizer),
}

impl MergeStrategy {
    /// Create the strategy for `kind`, parsing and validating all sources
    pub fn select(kind: StrategyKind, sources: Vec<InputSource>, config: &MergeConfig) -> Result<Self> {
        info!("Selecting {} merge over {} source(s)", kind, sources.len());

        let strategy = match kind {
            StrategyKind::UnionCount => MergeStrategy::UnionCount(UnionCountMerge::new(sources, config)?),
            StrategyKind::PivotJoin => MergeStrategy::PivotJoin(PivotJoinMerge::new(sources, config)?),
            StrategyKind::AlleleNormalize => {
                MergeStrategy::AlleleNormalize(AlleleNormalizer::new(sources, config)?)
            }
        };

        Ok(strategy)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            MergeStrategy::UnionCount(_) => StrategyKind::UnionCount,
            MergeStrategy::PivotJoin(_) => StrategyKind::PivotJoin,
            MergeStrategy::AlleleNormalize(_) => StrategyKind::AlleleNormalize,
        }
    }

    /// Package the saved outputs and hand the artifact to `sink`
    pub fn emit(self, sink: &mut dyn ArtifactSink) -> Result<Artifact> {
        let artifact = output::package(self.outputs()?, self.archive_name())?;
        sink.accept(&artifact.file_name, &artifact.bytes)?;

        info!(
            "Emitted {} artifact {} ({} bytes)",
            artifact.kind.as_str(),
            artifact.file_name,
            artifact.bytes.len()
        );
        Ok(artifact)
    }

    fn as_merge(&self) -> &dyn Merge {
        match self {
            MergeStrategy::UnionCount(m) => m,
            MergeStrategy::PivotJoin(m) => m,
            MergeStrategy::AlleleNormalize(m) => m,
        }
    }

    fn as_merge_mut(&mut self) -> &mut dyn Merge {
        match self {
            MergeStrategy::UnionCount(m) => m,
            MergeStrategy::PivotJoin(m) => m,
            MergeStrategy::AlleleNormalize(m) => m,
        }
    }
}

impl Merge for MergeStrategy {
    fn stage(&self) -> Stage {
        self.as_merge().stage()
    }

    fn process(&mut self) -> Result<()> {
        let kind = self.kind();
        self.as_merge_mut().process()?;
        info!("{} merge processed", kind);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let kind = self.kind();
        self.as_merge_mut().save()?;
        info!("{} merge saved {} table(s)", kind, self.outputs()?.len());
        Ok(())
    }

    fn outputs(&self) -> Result<&[OutputTable]> {
        self.as_merge().outputs()
    }

    fn archive_name(&self) -> &'static str {
        self.as_merge().archive_name()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::output::MemorySink;

    pub(crate) fn source(name: &str, text: &str) -> InputSource {
        InputSource::new(name, text.as_bytes().to_vec())
    }

    #[test]
    fn test_strategy_kind_from_str() {
        assert_eq!("union-count".parse::<StrategyKind>().unwrap(), StrategyKind::UnionCount);
        assert_eq!("Pivot-Join".parse::<StrategyKind>().unwrap(), StrategyKind::PivotJoin);
        assert_eq!(
            "allele-normalize".parse::<StrategyKind>().unwrap(),
            StrategyKind::AlleleNormalize
        );

        let err = "vcSample".parse::<StrategyKind>().unwrap_err();
        assert!(matches!(err, MergeError::Config(_)));
    }

    #[test]
    fn test_strategy_kind_serde() {
        let json = serde_json::to_string(&StrategyKind::AlleleNormalize).unwrap();
        assert_eq!(json, "\"allele-normalize\"");

        let kind: StrategyKind = serde_json::from_str("\"pivot-join\"").unwrap();
        assert_eq!(kind, StrategyKind::PivotJoin);
    }

    #[test]
    fn test_no_sources_is_input_error() {
        let err = MergeStrategy::select(StrategyKind::UnionCount, vec![], &MergeConfig::default())
            .unwrap_err();
        assert!(matches!(err, MergeError::Input { .. }));

        let err = MergeStrategy::select(
            StrategyKind::UnionCount,
            vec![source("a", ""), source("b", "")],
            &MergeConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::Input { .. }));
    }

    #[test]
    fn test_missing_mandatory_column_names_source() {
        let err = MergeStrategy::select(
            StrategyKind::AlleleNormalize,
            vec![
                source("good", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tC\n"),
                source("bad", "CHROM\tPOS\tALT\tREF_ALLELE\n1\t1\tC\tA\n"),
            ],
            &MergeConfig::default(),
        )
        .unwrap_err();

        match err {
            MergeError::Schema { source_name, message } => {
                assert_eq!(source_name, "bad");
                assert!(message.contains("REF"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mandatory_check_is_order_independent() {
        let strategy = MergeStrategy::select(
            StrategyKind::AlleleNormalize,
            vec![source("s", "ALT\tREF\tPOS\tCHROM\nC\tA\t1\t1\n")],
            &MergeConfig::default(),
        );
        assert!(strategy.is_ok());
    }

    #[test]
    fn test_duplicate_source_names_rejected_for_per_table_outputs() {
        let text = "CHROM\tPOS\tREF\tALT\n1\t1\tA\tC\n";
        let err = MergeStrategy::select(
            StrategyKind::AlleleNormalize,
            vec![source("a", text), source("a", text)],
            &MergeConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MergeError::Input { .. }));
    }

    #[test]
    fn test_parse_failure_names_source() {
        let config = MergeConfig {
            parse_options: ParseOptions::default().with_columns([
                ("CHROM", "CHROM"),
                ("POS", "POS"),
                ("REF", "REF"),
                ("ALT", "ALT"),
                ("QUAL", "QUAL"),
            ]),
            ..MergeConfig::default()
        };
        let err = MergeStrategy::select(
            StrategyKind::UnionCount,
            vec![source("noqual", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tC\n")],
            &config,
        )
        .unwrap_err();

        assert!(matches!(err, MergeError::Parse { ref source_name, .. } if source_name == "noqual"));
        assert!(err.to_string().contains("QUAL"));
    }

    #[test]
    fn test_lifecycle_order_is_enforced() {
        let mut strategy = MergeStrategy::select(
            StrategyKind::UnionCount,
            vec![source("a", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tC\n")],
            &MergeConfig::default(),
        )
        .unwrap();

        assert_eq!(strategy.stage(), Stage::Unprocessed);
        assert!(matches!(strategy.save(), Err(MergeError::Usage(_))));
        assert!(matches!(strategy.outputs(), Err(MergeError::Usage(_))));

        strategy.process().unwrap();
        assert_eq!(strategy.stage(), Stage::Processed);
        assert!(matches!(strategy.process(), Err(MergeError::Usage(_))));
        assert!(matches!(strategy.outputs(), Err(MergeError::Usage(_))));

        strategy.save().unwrap();
        assert_eq!(strategy.stage(), Stage::Saved);
        assert!(matches!(strategy.save(), Err(MergeError::Usage(_))));
        assert_eq!(strategy.outputs().unwrap().len(), 1);
    }

    #[test]
    fn test_emit_before_save_touches_no_sink() {
        let mut strategy = MergeStrategy::select(
            StrategyKind::UnionCount,
            vec![source("a", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tC\n")],
            &MergeConfig::default(),
        )
        .unwrap();
        strategy.process().unwrap();

        let mut sink = MemorySink::default();
        assert!(matches!(strategy.emit(&mut sink), Err(MergeError::Usage(_))));
        assert!(sink.artifacts.is_empty());
    }

    #[test]
    fn test_reruns_are_byte_identical() {
        let sources = || {
            vec![
                source("S1_gatk", "CHROM\tPOS\tREF\tALT\tQUAL\n1\t100\tA\tT\t50\n1\t200\tA\tT\t40\n"),
                source("S1_strelka", "CHROM\tPOS\tREF\tALT\tQUAL\n1\t100\tA\tT\t20\n"),
                source("S2_gatk", "CHROM\tPOS\tREF\tALT\tQUAL\n2\t10\tG\tGA\t70\n"),
            ]
        };

        for kind in StrategyKind::ALL {
            let run = || {
                let mut strategy = MergeStrategy::select(kind, sources(), &MergeConfig::default()).unwrap();
                strategy.process().unwrap();
                strategy.save().unwrap();
                let mut sink = MemorySink::default();
                strategy.emit(&mut sink).unwrap();
                sink.artifacts
            };

            assert_eq!(run(), run(), "{} output differs between runs", kind);
        }
    }
}
