// ==============================================================================
// merge/allele_normalize.rs - Allele Normalizer
// ==============================================================================
// Description: Canonicalizes indel representation row by row and adds END
// Author: Matt Barham
// Created: 2025-11-16
// Modified: 2025-11-18
// Version: 1.0.0
// ==============================================================================
// Representation (VCF-style padded -> annotation-style):
//   deletion   POS=50 REF=ATG ALT=A    ->  REF=TG ALT=-  END=51
//   insertion  POS=50 REF=A   ALT=ATG  ->  REF=-  ALT=TG END=50
//   SNV/MNV    POS=50 REF=A   ALT=G    ->  unchanged     END=50
// ==============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::{load_tables, Lifecycle, Merge, MergeConfig, Stage};
use crate::error::{MergeError, Result};
use crate::models::{ColumnSchema, InputSource, OutputTable, Row};
use crate::parsers::ParsedTable;

pub const END_COLUMN: &str = "END";

/// Placeholder for the emptied allele
pub const GAP: &str = "-";

const RESULT_EXTENSION: &str = ".annoin";

/// Leading output columns, in order
const ORDERED_COLUMNS: [&str; 5] = ["CHROM", "POS", END_COLUMN, "REF", "ALT"];

/// Normalized REF/ALT pair with the END coordinate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAllele {
    pub ref_allele: String,
    pub alt_allele: String,
    pub end: u64,
}

/// Strip the shared leading base from an indel.
///
/// The shorter allele must be a single base equal to the first base of the
/// longer one; anything else is rejected with a description.
pub fn normalize_allele(pos: u64, ref_allele: &str, alt_allele: &str) -> std::result::Result<NormalizedAllele, String> {
    let ref_len = ref_allele.chars().count();
    let alt_len = alt_allele.chars().count();

    if ref_len > alt_len {
        let ref_allele = strip_anchor(ref_allele, alt_allele)?;
        let span = ref_allele.chars().count() as u64 - 1;
        let end = pos
            .checked_add(span)
            .ok_or_else(|| format!("END overflows for POS {} and REF \"{}\"", pos, ref_allele))?;
        Ok(NormalizedAllele {
            ref_allele,
            alt_allele: GAP.to_string(),
            end,
        })
    } else if ref_len < alt_len {
        Ok(NormalizedAllele {
            alt_allele: strip_anchor(alt_allele, ref_allele)?,
            ref_allele: GAP.to_string(),
            end: pos,
        })
    } else {
        Ok(NormalizedAllele {
            ref_allele: ref_allele.to_string(),
            alt_allele: alt_allele.to_string(),
            end: pos,
        })
    }
}

/// `longer` minus its first base, which must equal the one-base `anchor`
fn strip_anchor(longer: &str, anchor: &str) -> std::result::Result<String, String> {
    if anchor.chars().count() != 1 {
        return Err(format!(
            "shorter allele \"{}\" must be exactly one base",
            anchor
        ));
    }

    let mut bases = longer.chars();
    match bases.next() {
        Some(first) if anchor.starts_with(first) => Ok(bases.as_str().to_string()),
        _ => Err(format!(
            "first base of \"{}\" does not match shorter allele \"{}\"",
            longer, anchor
        )),
    }
}

#[derive(Debug)]
struct NormalizedRow {
    row: Row,
    end: u64,
}

#[derive(Debug)]
struct NormalizedTable {
    name: String,
    schema: Arc<ColumnSchema>,
    rows: Vec<NormalizedRow>,
}

/// Per-table, per-row indel normalizer
#[derive(Debug)]
pub struct AlleleNormalizer {
    tables: Vec<ParsedTable>,
    lifecycle: Lifecycle<Vec<NormalizedTable>>,
}

impl AlleleNormalizer {
    pub fn new(sources: Vec<InputSource>, config: &MergeConfig) -> Result<Self> {
        let mut names = HashSet::new();
        for source in &sources {
            if !names.insert(source.name.as_str()) {
                return Err(MergeError::input(format!(
                    "Duplicate source name \"{}\" (each source yields its own output)",
                    source.name
                )));
            }
        }

        Ok(Self {
            tables: load_tables(sources, config)?,
            lifecycle: Lifecycle::default(),
        })
    }

    fn normalize_table(table: &ParsedTable) -> Result<NormalizedTable> {
        let positions = ["POS", "REF", "ALT"].map(|c| table.schema.position(c));
        let [Some(pos_idx), Some(ref_idx), Some(alt_idx)] = positions else {
            return Err(MergeError::schema(&table.name, "missing POS, REF or ALT column"));
        };

        let mut rows = Vec::with_capacity(table.rows.len());

        for row in &table.rows {
            let values = row.values();
            let pos: u64 = values[pos_idx].parse().map_err(|_| {
                MergeError::normalization(
                    &table.name,
                    row.line(),
                    format!("POS \"{}\" is not a position", values[pos_idx]),
                )
            })?;

            let normalized = normalize_allele(pos, &values[ref_idx], &values[alt_idx])
                .map_err(|message| MergeError::normalization(&table.name, row.line(), message))?;

            let mut values = values.to_vec();
            values[ref_idx] = normalized.ref_allele;
            values[alt_idx] = normalized.alt_allele;

            rows.push(NormalizedRow {
                row: Row::new(Arc::clone(&table.schema), values).at_line(row.line()),
                end: normalized.end,
            });
        }

        Ok(NormalizedTable {
            name: table.name.clone(),
            schema: Arc::clone(&table.schema),
            rows,
        })
    }

    fn build_output(table: NormalizedTable) -> OutputTable {
        let remaining: Vec<&str> = table
            .schema
            .iter()
            .filter(|c| !ORDERED_COLUMNS.contains(c))
            .collect();

        let mut header: Vec<String> = ORDERED_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(remaining.iter().map(|c| c.to_string()));

        let mut output = OutputTable::new(table.name.as_str(), RESULT_EXTENSION, header);

        for NormalizedRow { row, end } in table.rows {
            let mut values = Vec::with_capacity(output.header.len());
            for column in ORDERED_COLUMNS {
                match column {
                    END_COLUMN => values.push(end.to_string()),
                    _ => values.push(row.get(column).unwrap_or_default().to_string()),
                }
            }
            values.extend(remaining.iter().map(|c| row.get(c).unwrap_or_default().to_string()));
            output.rows.push(values);
        }

        output
    }
}

impl Merge for AlleleNormalizer {
    fn stage(&self) -> Stage {
        self.lifecycle.stage()
    }

    fn process(&mut self) -> Result<()> {
        self.lifecycle.ensure_unprocessed()?;

        let normalized = self
            .tables
            .iter()
            .filter(|t| t.has_header())
            .map(|table| {
                let normalized = Self::normalize_table(table)?;
                debug!("Normalized {} row(s) of '{}'", normalized.rows.len(), table.name);
                Ok(normalized)
            })
            .collect::<Result<Vec<_>>>()?;

        self.lifecycle.processed(normalized);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        let tables = self.lifecycle.take_for_save()?;
        let outputs = tables.into_iter().map(Self::build_output).collect();
        self.lifecycle.saved(outputs);
        Ok(())
    }

    fn outputs(&self) -> Result<&[OutputTable]> {
        self.lifecycle.outputs()
    }

    fn archive_name(&self) -> &'static str {
        "annoin.zip"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::tests::source;
    use crate::parsers::ParseOptions;

    fn normalize(sources: Vec<InputSource>) -> Result<Vec<OutputTable>> {
        let mut merge = AlleleNormalizer::new(sources, &MergeConfig::default())?;
        merge.process()?;
        merge.save()?;
        Ok(merge.outputs()?.to_vec())
    }

    #[test]
    fn test_deletion() {
        let n = normalize_allele(50, "ATG", "A").unwrap();
        assert_eq!(
            n,
            NormalizedAllele {
                ref_allele: "TG".to_string(),
                alt_allele: "-".to_string(),
                end: 51
            }
        );
    }

    #[test]
    fn test_insertion() {
        let n = normalize_allele(50, "A", "ATG").unwrap();
        assert_eq!(n.ref_allele, "-");
        assert_eq!(n.alt_allele, "TG");
        assert_eq!(n.end, 50);
    }

    #[test]
    fn test_equal_length_passes_through() {
        let n = normalize_allele(50, "A", "G").unwrap();
        assert_eq!((n.ref_allele.as_str(), n.alt_allele.as_str(), n.end), ("A", "G", 50));

        let n = normalize_allele(50, "AT", "GC").unwrap();
        assert_eq!((n.ref_allele.as_str(), n.alt_allele.as_str(), n.end), ("AT", "GC", 50));
    }

    #[test]
    fn test_single_base_deletion_end_equals_pos() {
        let n = normalize_allele(7, "CA", "C").unwrap();
        assert_eq!(n.ref_allele, "A");
        assert_eq!(n.end, 7);
    }

    #[test]
    fn test_malformed_indels_rejected() {
        // shorter allele longer than one base
        assert!(normalize_allele(10, "ATG", "GC").is_err());
        assert!(normalize_allele(10, "GC", "ATG").is_err());
        // shorter allele differs from the anchor base
        assert!(normalize_allele(10, "AT", "G").is_err());
        assert!(normalize_allele(10, "G", "AT").is_err());
        // empty shorter allele
        assert!(normalize_allele(10, "AT", "").is_err());
    }

    #[test]
    fn test_columns_reordered_with_end() {
        let tables = normalize(vec![source(
            "calls",
            "QUAL\tALT\tCHROM\tREF\tPOS\tDP\n30\tA\t1\tATG\t50\t12\n20\tATG\t2\tA\t50\t8\n",
        )])
        .unwrap();

        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.file_name, "calls.annoin");
        assert_eq!(table.header, vec!["CHROM", "POS", "END", "REF", "ALT", "QUAL", "DP"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["1", "50", "51", "TG", "-", "30", "12"],
                vec!["2", "50", "50", "-", "TG", "20", "8"],
            ]
        );
    }

    #[test]
    fn test_existing_end_column_is_replaced() {
        let tables = normalize(vec![source(
            "t",
            "CHROM\tPOS\tEND\tREF\tALT\n1\t100\t999\tAC\tA\n",
        )])
        .unwrap();
        assert_eq!(tables[0].header, vec!["CHROM", "POS", "END", "REF", "ALT"]);
        assert_eq!(tables[0].rows[0], vec!["1", "100", "100", "C", "-"]);
    }

    #[test]
    fn test_one_output_per_table() {
        let tables = normalize(vec![
            source("a", "CHROM\tPOS\tREF\tALT\n1\t1\tA\tG\n"),
            source("b", "CHROM\tPOS\tREF\tALT\n"),
            source("c", ""),
        ])
        .unwrap();

        let names: Vec<_> = tables.iter().map(|t| t.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.annoin", "b.annoin"]);
        assert!(tables[1].rows.is_empty());
    }

    #[test]
    fn test_error_names_source_and_line() {
        // Blank line 3 is skipped but still counted
        let err = normalize(vec![source(
            "bad",
            "CHROM\tPOS\tREF\tALT\n1\t1\tA\tG\n\n1\t2\tAT\tG\n",
        )])
        .unwrap_err();

        match err {
            MergeError::Normalization { source_name, line, .. } => {
                assert_eq!(source_name, "bad");
                assert_eq!(line, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_headerless_input_with_column_map() {
        let config = MergeConfig {
            parse_options: ParseOptions::default()
                .without_header()
                .with_columns([("CHROM", "0"), ("POS", "1"), ("REF", "2"), ("ALT", "3"), ("QUAL", "4")]),
            ..MergeConfig::default()
        };
        let mut merge = AlleleNormalizer::new(
            vec![source("raw", "1\t100\tAT\tA\t50\n1\t200\tC\tCGG\t20\n")],
            &config,
        )
        .unwrap();
        merge.process().unwrap();
        merge.save().unwrap();

        let table = &merge.outputs().unwrap()[0];
        assert_eq!(table.header, vec!["CHROM", "POS", "END", "REF", "ALT", "QUAL"]);
        assert_eq!(table.rows[0], vec!["1", "100", "100", "T", "-", "50"]);
        assert_eq!(table.rows[1], vec!["1", "200", "200", "-", "GG", "20"]);
    }

    #[test]
    fn test_end_overflow_is_rejected() {
        let err = normalize_allele(u64::MAX, "ATG", "A").unwrap_err();
        assert!(err.contains("END overflows"));

        // A one-base deletion keeps END == POS, so u64::MAX still fits
        let normalized = normalize_allele(u64::MAX, "AT", "A").unwrap();
        assert_eq!(normalized.end, u64::MAX);

        let input = format!("CHROM\tPOS\tREF\tALT\n1\t{}\tATG\tA\n", u64::MAX);
        let err = normalize(vec![source("big", &input)]).unwrap_err();
        match err {
            MergeError::Normalization { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("END overflows"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_pos_rejected() {
        let err = normalize(vec![source("p", "CHROM\tPOS\tREF\tALT\n1\tx\tA\tG\n")]).unwrap_err();
        assert!(matches!(err, MergeError::Normalization { .. }));
    }
}
