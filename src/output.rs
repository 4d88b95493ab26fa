// ==============================================================================
// output.rs - Table Rendering, Packaging and Delivery
// ==============================================================================
// Description: Renders output tables as TSV, packages them (raw or ZIP) and
//              hands the resulting artifact to a sink
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2025-11-19
// Version: 2.0.0
// ==============================================================================
// Packaging rule:
//   one output table    -> raw TSV under its suggested file name
//   several output tables -> one ZIP holding <key><extension> per table
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{MergeError, Result};
use crate::merge::StrategyKind;
use crate::models::OutputTable;

/// Shape of an emitted artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A single tab-delimited table
    Raw,
    /// ZIP archive of several tables
    Archive,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Raw => "raw",
            ArtifactKind::Archive => "archive",
        }
    }

    /// MIME type for HTTP downloads
    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactKind::Raw => "text/tab-separated-values",
            ArtifactKind::Archive => "application/zip",
        }
    }
}

/// Named byte buffer ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub kind: ArtifactKind,
    pub bytes: Vec<u8>,
}

/// Destination for emitted artifacts
pub trait ArtifactSink {
    fn accept(&mut self, file_name: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes artifacts into a directory, creating it on first use
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    /// Paths written so far
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

/// Artifact and entry names must stay inside the output directory
fn check_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty()
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\', '\0'])
    {
        return Err(MergeError::Output(format!("Invalid output file name \"{}\"", file_name)));
    }
    Ok(())
}

impl ArtifactSink for DirectorySink {
    fn accept(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        check_file_name(file_name)?;
        fs::create_dir_all(&self.dir)?;

        let path = self.dir.join(file_name);
        fs::write(&path, bytes)?;

        info!("Wrote {:?} ({} bytes)", path, bytes.len());
        self.written.push(path);
        Ok(())
    }
}

/// Keeps artifacts in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub artifacts: Vec<(String, Vec<u8>)>,
}

impl ArtifactSink for MemorySink {
    fn accept(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        self.artifacts.push((file_name.to_string(), bytes.to_vec()));
        Ok(())
    }
}

/// Render a table as tab-delimited text: header first, `\n`-terminated.
///
/// Values are written unquoted, so a tab or line break inside a value is an
/// OutputError (possible when inputs use another delimiter).
pub fn render_table(table: &OutputTable) -> Result<Vec<u8>> {
    for (line, record) in std::iter::once(&table.header).chain(&table.rows).enumerate() {
        if let Some(value) = record.iter().find(|v| v.contains(['\t', '\n', '\r'])) {
            return Err(MergeError::Output(format!(
                "{}: line {} value {:?} contains a tab or line break",
                table.file_name,
                line + 1,
                value
            )));
        }
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let output_err = |e: csv::Error| MergeError::Output(format!("{}: {}", table.file_name, e));

    writer.write_record(&table.header).map_err(output_err)?;
    for row in &table.rows {
        writer.write_record(row).map_err(output_err)?;
    }

    writer
        .into_inner()
        .map_err(|e| MergeError::Output(format!("{}: {}", table.file_name, e)))
}

/// Apply the packaging rule to a strategy's outputs
pub fn package(tables: &[OutputTable], archive_name: &str) -> Result<Artifact> {
    match tables {
        [] => Err(MergeError::Output("Nothing to package".to_string())),
        [table] => Ok(Artifact {
            file_name: table.file_name.clone(),
            kind: ArtifactKind::Raw,
            bytes: render_table(table)?,
        }),
        _ => Ok(Artifact {
            file_name: archive_name.to_string(),
            kind: ArtifactKind::Archive,
            bytes: build_zip(tables)?,
        }),
    }
}

/// ZIP of every table; entry timestamps are fixed so reruns are byte-identical
fn build_zip(tables: &[OutputTable]) -> Result<Vec<u8>> {
    let zip_err = |e: zip::result::ZipError| MergeError::Output(format!("ZIP packaging failed: {}", e));

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for table in tables {
        check_file_name(&table.file_name)?;
        debug!("Adding to ZIP: {}", table.file_name);
        zip.start_file(table.file_name.as_str(), options).map_err(zip_err)?;
        zip.write_all(&render_table(table)?)?;
    }

    let cursor = zip.finish().map_err(zip_err)?;
    info!("ZIP archive created with {} files", tables.len());
    Ok(cursor.into_inner())
}

/// Digest and size of one input
#[derive(Debug, Clone, Serialize)]
pub struct InputSummary {
    pub name: String,
    pub file_name: String,
    pub size: u64,
    pub sha256: String,
    pub compressed: bool,
}

/// JSON report of a finished run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub strategy: StrategyKind,
    pub generated_at: DateTime<Utc>,
    pub inputs: Vec<InputSummary>,
    pub tables: Vec<TableSummary>,
    pub artifact: ArtifactSummary,
}

#[derive(Debug, Serialize)]
pub struct TableSummary {
    #[serde(flatten)]
    pub table: OutputTable,
    pub rows: usize,
}

#[derive(Debug, Serialize)]
pub struct ArtifactSummary {
    pub file_name: String,
    pub kind: ArtifactKind,
    pub mime_type: &'static str,
    pub size: usize,
}

impl RunSummary {
    pub fn new(
        strategy: StrategyKind,
        inputs: Vec<InputSummary>,
        tables: &[OutputTable],
        artifact: &Artifact,
    ) -> Self {
        Self {
            strategy,
            generated_at: Utc::now(),
            inputs,
            tables: tables
                .iter()
                .map(|t| TableSummary {
                    rows: t.row_count(),
                    table: t.clone(),
                })
                .collect(),
            artifact: ArtifactSummary {
                file_name: artifact.file_name.clone(),
                kind: artifact.kind,
                mime_type: artifact.kind.mime_type(),
                size: artifact.bytes.len(),
            },
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| MergeError::Output(format!("Failed to serialize run summary: {}", e)))?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn table(name: &str, rows: &[&[&str]]) -> OutputTable {
        let mut t = OutputTable::new(name, ".tsv", vec!["CHROM".into(), "POS".into()]);
        t.rows = rows
            .iter()
            .map(|r| r.iter().map(|v| v.to_string()).collect())
            .collect();
        t
    }

    #[test]
    fn test_render_table_tsv() {
        let bytes = render_table(&table("s", &[&["1", "100"], &["2", "5"]])).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "CHROM\tPOS\n1\t100\n2\t5\n");
    }

    #[test]
    fn test_render_header_only() {
        let bytes = render_table(&table("s", &[])).unwrap();
        assert_eq!(bytes, b"CHROM\tPOS\n");
    }

    #[test]
    fn test_render_rejects_ragged_rows() {
        let err = render_table(&table("s", &[&["1"]])).unwrap_err();
        assert!(matches!(err, MergeError::Output(_)));
    }

    #[test]
    fn test_single_table_is_raw() {
        let artifact = package(&[table("S1", &[&["1", "2"]])], "x.zip").unwrap();
        assert_eq!(artifact.kind, ArtifactKind::Raw);
        assert_eq!(artifact.file_name, "S1.tsv");
        assert_eq!(artifact.bytes, b"CHROM\tPOS\n1\t2\n");
    }

    #[test]
    fn test_several_tables_are_zipped() {
        let tables = [table("S1", &[&["1", "2"]]), table("S2", &[&["3", "4"]])];
        let artifact = package(&tables, "vc_samples.zip").unwrap();

        assert_eq!(artifact.kind, ArtifactKind::Archive);
        assert_eq!(artifact.file_name, "vc_samples.zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(artifact.bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut content = String::new();
        archive
            .by_name("S2.tsv")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "CHROM\tPOS\n3\t4\n");
    }

    #[test]
    fn test_zip_is_deterministic() {
        let tables = [table("a", &[&["1", "2"]]), table("b", &[])];
        let first = package(&tables, "out.zip").unwrap();
        let second = package(&tables, "out.zip").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_package_is_error() {
        assert!(package(&[], "out.zip").is_err());
    }

    #[test]
    fn test_directory_sink_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("results"));
        sink.accept("S1.tsv", b"CHROM\n").unwrap();

        assert_eq!(sink.written().len(), 1);
        assert_eq!(fs::read(dir.path().join("results/S1.tsv")).unwrap(), b"CHROM\n");
    }

    #[test]
    fn test_directory_sink_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("results"));

        for name in ["../escape.tsv", "sub/S1.tsv", "..", "", "/tmp/abs.tsv", "a\\b.tsv"] {
            let err = sink.accept(name, b"CHROM\n").unwrap_err();
            assert!(matches!(err, MergeError::Output(_)), "{name:?} was accepted");
        }
        assert!(sink.written().is_empty());
        assert!(!dir.path().join("escape.tsv").exists());
    }

    #[test]
    fn test_zip_rejects_escaping_entry_names() {
        let mut bad = table("x", &[]);
        bad.file_name = "../x.tsv".to_string();
        let err = package(&[table("a", &[]), bad], "out.zip").unwrap_err();
        assert!(matches!(err, MergeError::Output(_)));
    }

    #[test]
    fn test_render_rejects_embedded_tabs() {
        let err = render_table(&table("s", &[&["1", "2"], &["1", "a\tb"]])).unwrap_err();
        assert!(matches!(err, MergeError::Output(ref m) if m.contains("line 3")));

        assert!(render_table(&table("s", &[&["1", "a\nb"]])).is_err());
    }

    #[test]
    fn test_artifact_kind_serde() {
        assert_eq!(serde_json::to_string(&ArtifactKind::Archive).unwrap(), "\"archive\"");
        assert_eq!(ArtifactKind::Raw.mime_type(), "text/tab-separated-values");
    }

    #[test]
    fn test_run_summary_json() {
        let tables = [table("S1", &[&["1", "2"]])];
        let artifact = package(&tables, "x.zip").unwrap();
        let summary = RunSummary::new(StrategyKind::PivotJoin, vec![], &tables, &artifact);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["strategy"], "pivot-join");
        assert_eq!(value["tables"][0]["file_name"], "S1.tsv");
        assert_eq!(value["tables"][0]["rows"], 1);
        assert_eq!(value["artifact"]["kind"], "raw");
    }
}
