//! PDF knowledge-base loader.
//!
//! Walks the knowledge-base directory, extracts text from every `.pdf`
//! entry with `pdf-extract`, and returns the concatenation in deterministic
//! path order. A file that fails to open or parse is skipped with a warning
//! on stderr; it never aborts the rest of the batch. A missing or empty
//! directory produces an empty result, which callers treat as "nothing to
//! index" rather than an error.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::KnowledgeBaseConfig;

/// Outcome of a knowledge-base scan.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// All extracted text, concatenated across documents. Empty when there
    /// was nothing to extract.
    pub text: String,
    /// Files read and extracted successfully (including ones that yielded
    /// no text).
    pub documents: usize,
    /// Files skipped because they could not be read or parsed.
    pub skipped: usize,
}

/// Scan `config.root` for PDF files and extract their text.
pub fn load_knowledge_base(config: &KnowledgeBaseConfig) -> Result<LoadSummary> {
    let root = &config.root;
    if !root.exists() {
        return Ok(LoadSummary::default());
    }

    let exclude_set = build_globset(&config.exclude_globs)?;
    let pdfs = collect_pdfs(root, &exclude_set);

    let mut summary = LoadSummary::default();
    for path in pdfs {
        match std::fs::read(&path) {
            Ok(bytes) => match pdf_extract::extract_text_from_mem(&bytes) {
                Ok(text) => {
                    summary.documents += 1;
                    if !text.trim().is_empty() {
                        summary.text.push_str(&text);
                    }
                }
                Err(e) => {
                    eprintln!("Warning: skipping {}: {}", path.display(), e);
                    summary.skipped += 1;
                }
            },
            Err(e) => {
                eprintln!("Warning: skipping {}: {}", path.display(), e);
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// All `.pdf` entries under `root`, exclude-filtered, in sorted path order
/// so repeated scans of the same directory state are identical.
fn collect_pdfs(root: &Path, exclude_set: &GlobSet) -> Vec<PathBuf> {
    let mut pdfs: Vec<PathBuf> = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) {
            continue;
        }
        pdfs.push(path.to_path_buf());
    }

    pdfs.sort();
    pdfs
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
