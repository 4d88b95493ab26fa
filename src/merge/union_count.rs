// ==============================================================================
// merge/union_count.rs - Union-Count Merge
// ==============================================================================
// Description: Unions rows of same-schema tables and annotates every row with
//              the number of rows sharing its position key
// Author: Matt Barham
// Created: 2025-11-14
// Modified: 2025-11-17
// Version: 1.0.0
// ==============================================================================

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::debug;

use super::{load_tables, position_key, Lifecycle, Merge, MergeConfig, Stage};
use crate::error::{MergeError, Result};
use crate::models::{ColumnSchema, InputSource, OutputTable, PositionKey, Row};
use crate::parsers::ParsedTable;

/// Name of the appended count column
pub const SAMPLES_COUNT_COLUMN: &str = "SAMPLES_COUNT";

const RESULT_NAME: &str = "samples_merge";
const RESULT_EXTENSION: &str = ".tsv";

#[derive(Debug)]
struct UnionAccumulation {
    schema: Arc<ColumnSchema>,
    buckets: IndexMap<PositionKey, Vec<Row>>,
}

/// Union of identically-shaped tables with per-position occurrence counts
#[derive(Debug)]
pub struct UnionCountMerge {
    tables: Vec<ParsedTable>,
    lifecycle: Lifecycle<UnionAccumulation>,
}

impl UnionCountMerge {
    pub fn new(sources: Vec<InputSource>, config: &MergeConfig) -> Result<Self> {
        Ok(Self {
            tables: load_tables(sources, config)?,
            lifecycle: Lifecycle::default(),
        })
    }
}

impl Merge for UnionCountMerge {
    fn stage(&self) -> Stage {
        self.lifecycle.stage()
    }

    fn process(&mut self) -> Result<()> {
        self.lifecycle.ensure_unprocessed()?;

        let mut schema: Option<&Arc<ColumnSchema>> = None;
        let mut buckets: IndexMap<PositionKey, Vec<Row>> = IndexMap::new();

        for table in self.tables.iter().filter(|t| t.has_header()) {
            match schema {
                None => schema = Some(&table.schema),
                Some(expected) if **expected != *table.schema => {
                    return Err(MergeError::schema(
                        &table.name,
                        format!(
                            "incompatible headers: expected [{}], found [{}]",
                            expected.names().join(", "),
                            table.schema.names().join(", ")
                        ),
                    ));
                }
                Some(_) => {}
            }

            for row in &table.rows {
                let key = position_key(&table.name, row)?;
                buckets.entry(key).or_default().push(row.clone());
            }
        }

        // load_tables guarantees at least one table with a header
        let schema = schema
            .cloned()
            .ok_or_else(|| MergeError::input("No files parsed: every source is empty"))?;

        debug!("Union accumulated {} position(s)", buckets.len());
        self.lifecycle.processed(UnionAccumulation { schema, buckets });
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let UnionAccumulation { schema, buckets } = self.lifecycle.take_for_save()?;

        let mut header = schema.names().to_vec();
        header.push(SAMPLES_COUNT_COLUMN.to_string());
        let mut table = OutputTable::new(RESULT_NAME, RESULT_EXTENSION, header);

        for rows in buckets.into_values() {
            let count = rows.len().to_string();
            for row in rows {
                let mut values = row.into_values();
                values.push(count.clone());
                table.rows.push(values);
            }
        }

        self.lifecycle.saved(vec![table]);
        Ok(())
    }

    fn outputs(&self) -> Result<&[OutputTable]> {
        self.lifecycle.outputs()
    }

    fn archive_name(&self) -> &'static str {
        "samples_merge.zip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tests::source;

    fn run(sources: Vec<InputSource>) -> Result<OutputTable> {
        let mut merge = UnionCountMerge::new(sources, &MergeConfig::default())?;
        merge.process()?;
        merge.save()?;
        Ok(merge.outputs()?[0].clone())
    }

    #[test]
    fn test_counts_rows_sharing_a_position() {
        let table = run(vec![
            source("a", "CHROM\tPOS\tREF\tALT\tQUAL\n1\t100\tA\tT\t30\n1\t200\tG\tC\t10\n"),
            source("b", "CHROM\tPOS\tREF\tALT\tQUAL\n1\t100\tA\tT\t45\n"),
            source("c", "CHROM\tPOS\tREF\tALT\tQUAL\n1\t100\tA\tT\t45\n1\t100\tA\tG\t5\n"),
        ])
        .unwrap();

        assert_eq!(table.file_name, "samples_merge.tsv");
        assert_eq!(table.header, vec!["CHROM", "POS", "REF", "ALT", "QUAL", "SAMPLES_COUNT"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["1", "100", "A", "T", "30", "3"],
                vec!["1", "100", "A", "T", "45", "3"],
                vec!["1", "100", "A", "T", "45", "3"],
                vec!["1", "200", "G", "C", "10", "1"],
                vec!["1", "100", "A", "G", "5", "1"],
            ]
        );
    }

    #[test]
    fn test_row_count_is_preserved() {
        let table = run(vec![
            source("a", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tT\n1\t1\tA\tT\n2\t5\tC\tG\n"),
            source("b", "CHROM\tPOS\tREF\tALT\n2\t5\tC\tG\n3\t9\tT\tA\n"),
        ])
        .unwrap();

        assert_eq!(table.row_count(), 5);
        for row in &table.rows {
            let expected = table
                .rows
                .iter()
                .filter(|other| other[..4] == row[..4])
                .count()
                .to_string();
            assert_eq!(row[4], expected);
        }
    }

    #[test]
    fn test_incompatible_headers_rejected() {
        let err = run(vec![
            source("first", "CHROM\tPOS\tREF\tALT\tQUAL\n1\t1\tA\tT\t1\n"),
            source("second", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tT\n"),
        ])
        .unwrap_err();

        match err {
            MergeError::Schema { source_name, message } => {
                assert_eq!(source_name, "second");
                assert!(message.contains("incompatible headers"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_header_order_matters() {
        let err = run(vec![
            source("first", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tT\n"),
            source("second", "POS\tCHROM\tREF\tALT\n1\t1\tA\tT\n"),
        ])
        .unwrap_err();
        assert!(matches!(err, MergeError::Schema { .. }));
    }

    #[test]
    fn test_empty_source_is_skipped() {
        let table = run(vec![
            source("empty", ""),
            source("a", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tT\n"),
        ])
        .unwrap();
        assert_eq!(table.rows, vec![vec!["1", "1", "A", "T", "1"]]);
    }
}
