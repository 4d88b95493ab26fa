// ==============================================================================
// validator.rs - Input Source Loading & Validation
// ==============================================================================
// Description: Validates uploaded variant tables (size, name, type, gzip) and
//              turns them into named in-memory sources
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2025-11-17
// Version: 2.0.0
// Security: Allowlist-only file types, magic number verification
// ==============================================================================

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{MergeError, Result};
use crate::models::InputSource;
use crate::output::InputSummary;

const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024; // 500 MB

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Table extensions accepted (optionally followed by .gz)
const ALLOWED_EXTENSIONS: [&str; 5] = ["tsv", "txt", "csv", "tab", "vcf"];

/// A source that passed validation
#[derive(Debug)]
pub struct ValidatedSource {
    pub source: InputSource,
    pub original_name: String,
    pub size: u64,
    pub hash_sha256: String,
    pub compressed: bool,
}

impl ValidatedSource {
    pub fn summary(&self) -> InputSummary {
        InputSummary {
            name: self.source.name.clone(),
            file_name: self.original_name.clone(),
            size: self.size,
            sha256: self.hash_sha256.clone(),
            compressed: self.compressed,
        }
    }
}

/// Loads input files into validated sources
pub struct SourceLoader {
    max_file_size: u64,
}

impl SourceLoader {
    pub fn new() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
        }
    }

    pub fn with_max_file_size(max_file_size: u64) -> Self {
        Self { max_file_size }
    }

    pub fn load(&self, file_path: &Path) -> Result<ValidatedSource> {
        let file_name = file_path
            .file_name()
            .ok_or_else(|| MergeError::input(format!("Invalid file path {:?}", file_path)))?
            .to_string_lossy()
            .to_string();

        info!("Validating file: {}", file_name);

        // 1. Size check
        let metadata = fs::metadata(file_path)
            .map_err(|e| MergeError::input(format!("Cannot read {}: {}", file_name, e)))?;
        let size = metadata.len();

        if size > self.max_file_size {
            return Err(MergeError::input(format!(
                "File too large: {} ({} bytes, max: {} bytes)",
                file_name, size, self.max_file_size
            )));
        }
        debug!("Size check passed: {} bytes", size);

        // 2. Filename sanitization
        let safe_name = self.sanitize_filename(&file_name)?;
        debug!("Sanitized filename: {}", safe_name);

        // 3. Extension check (allowlist), which also yields the source name
        let name = self.source_name(&safe_name)?;
        debug!("Source name: {}", name);

        // 4. Read, hash and (if gzip magic present) decompress
        let raw = fs::read(file_path)
            .map_err(|e| MergeError::input(format!("Cannot read {}: {}", file_name, e)))?;
        let hash = self.compute_sha256(&raw);
        debug!("SHA-256: {}", hash);

        let compressed = self.verify_magic_number(&GZIP_MAGIC, &raw);
        let bytes = if compressed {
            let mut decoded = Vec::new();
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut decoded)
                .map_err(|e| MergeError::input(format!("Cannot decompress {}: {}", file_name, e)))?;
            debug!("Decompressed {} -> {} bytes", raw.len(), decoded.len());
            decoded
        } else {
            raw
        };

        Ok(ValidatedSource {
            source: InputSource::new(name, bytes),
            original_name: file_name,
            size,
            hash_sha256: hash,
            compressed,
        })
    }

    /// Load several files, failing on the first invalid one
    pub fn load_all<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<ValidatedSource>> {
        if paths.is_empty() {
            return Err(MergeError::input("No files provided"));
        }
        paths.iter().map(|p| self.load(p.as_ref())).collect()
    }

    fn sanitize_filename(&self, name: &str) -> Result<String> {
        // Remove path separators, null bytes, control characters
        let safe = name
            .replace(['/', '\\', '\0'], "_")
            .chars()
            .filter(|c| {
                c.is_ascii_alphanumeric()
                    || *c == '_'
                    || *c == '.'
                    || *c == '-'
            })
            .collect::<String>();

        // Limit length to 255 characters
        let truncated: String = safe.chars().take(255).collect();

        if truncated.is_empty() {
            return Err(MergeError::input("Invalid filename after sanitization"));
        }

        Ok(truncated)
    }

    /// File name without its extension chain: "S1_gatk.tsv.gz" -> "S1_gatk"
    fn source_name(&self, filename: &str) -> Result<String> {
        let stem = filename.strip_suffix(".gz").unwrap_or(filename);

        let (name, ext) = stem
            .rsplit_once('.')
            .ok_or_else(|| MergeError::input(format!("No file extension found: {}", filename)))?;

        let ext = ext.to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(MergeError::input(format!("Invalid file type: {}", ext)));
        }
        if name.is_empty() {
            return Err(MergeError::input(format!("Missing source name: {}", filename)));
        }

        Ok(name.to_string())
    }

    fn verify_magic_number(&self, expected: &[u8], actual: &[u8]) -> bool {
        expected.len() <= actual.len()
            && expected.iter().zip(actual.iter()).all(|(e, a)| e == a)
    }

    fn compute_sha256(&self, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}

impl Default for SourceLoader {
    fn default() -> Self {
        Self::new()
    }
}
