//! Directory layout and filename conventions.
//!
//! Layout:
//!   cook/<slug>.<YYYY-MM-DD>.cook.md   — one artifact per planned change
//!   .cook/data/audit.jsonl             — append-only workflow event log
//!   .cook/data/feedback.jsonl          — append-only insight feedback log
//!   .cook/data/index.json              — derived artifact index, fully rewritten

use crate::error::{CookError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const COOK_DIR: &str = "cook";
pub const DATA_DIR: &str = ".cook/data";

pub const AUDIT_FILE: &str = ".cook/data/audit.jsonl";
pub const FEEDBACK_FILE: &str = ".cook/data/feedback.jsonl";
pub const INDEX_FILE: &str = ".cook/data/index.json";

pub const ARTIFACT_SUFFIX: &str = ".cook.md";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn cook_dir(root: &Path) -> PathBuf {
    root.join(COOK_DIR)
}

pub fn data_dir(root: &Path) -> PathBuf {
    root.join(DATA_DIR)
}

pub fn audit_path(root: &Path) -> PathBuf {
    root.join(AUDIT_FILE)
}

pub fn feedback_path(root: &Path) -> PathBuf {
    root.join(FEEDBACK_FILE)
}

pub fn index_path(root: &Path) -> PathBuf {
    root.join(INDEX_FILE)
}

pub fn artifact_path(root: &Path, slug: &str, date: &str) -> PathBuf {
    cook_dir(root).join(format!("{slug}.{date}{ARTIFACT_SUFFIX}"))
}

// ---------------------------------------------------------------------------
// Filename parsing: <slug>.<YYYY-MM-DD>.cook.md
// ---------------------------------------------------------------------------

static FILENAME_RE: OnceLock<Regex> = OnceLock::new();

fn filename_re() -> &'static Regex {
    FILENAME_RE
        .get_or_init(|| Regex::new(r"^(.+)\.(\d{4}-\d{2}-\d{2})\.cook\.md$").unwrap())
}

fn basename(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// Extract the `YYYY-MM-DD` date from an artifact filename, if present.
pub fn date_from_filename(path: &Path) -> Option<String> {
    filename_re()
        .captures(basename(path))
        .map(|c| c[2].to_string())
}

/// Extract the slug from an artifact filename.
///
/// Falls back to stripping the `.cook.md` suffix when the date segment is
/// missing, matching how loosely-named artifacts are tolerated everywhere
/// else in the parser.
pub fn slug_from_filename(path: &Path) -> String {
    let name = basename(path);
    if let Some(c) = filename_re().captures(name) {
        return c[1].to_string();
    }
    name.strip_suffix(ARTIFACT_SUFFIX).unwrap_or(name).to_string()
}

/// Cook ID is `<slug>.<date>` — the stable identifier linking an artifact
/// to its branch, commit tags, and audit entries.
pub fn cook_id_from_filename(path: &Path) -> Option<String> {
    let c = filename_re().captures(basename(path))?;
    Some(format!("{}.{}", &c[1], &c[2]))
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(CookError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
