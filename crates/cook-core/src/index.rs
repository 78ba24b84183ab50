//! Artifact index: scan cook/ and distill each artifact into searchable
//! metadata, persisted as pretty JSON under .cook/data/.
//!
//! The on-disk format uses camelCase keys and carries a version string so
//! readers can detect incompatible rewrites. Parse failures for single
//! artifacts are collected into the index instead of aborting the build.

use crate::artifact::{self, Sections};
use crate::error::{CookError, Result};
use crate::io;
use crate::paths;
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const INDEX_VERSION: &str = "1.0.0";

// ---------------------------------------------------------------------------
// Index schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedBlocker {
    #[serde(rename = "type")]
    pub blocker_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PremortemScenario {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    pub risk: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub date: String,
    #[serde(default)]
    pub phase: Option<String>,
    pub decision: String,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedArtifact {
    pub path: String,
    pub filename: String,
    pub slug: String,
    pub date: Option<String>,
    pub status: String,
    pub mode: String,
    pub title: String,
    pub owner: Option<String>,
    pub files_touched: Vec<String>,
    pub risk_level: String,
    pub blockers: Vec<IndexedBlocker>,
    pub premortem: Vec<PremortemScenario>,
    pub decisions: Vec<Decision>,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexError {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_mode: BTreeMap<String, usize>,
    pub by_risk: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactIndex {
    pub version: String,
    pub generated_at: String,
    pub cook_dir: String,
    pub artifacts: Vec<IndexedArtifact>,
    pub errors: Vec<IndexError>,
    pub stats: IndexStats,
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Artifact files in a cook directory, newest date first. Files without a
/// parseable date sort after dated ones, by name.
pub fn scan_artifacts(cook_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(cook_dir) else {
        return Vec::new();
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(paths::ARTIFACT_SUFFIX))
        })
        .collect();

    paths.sort_by(|a, b| {
        let name_a = a.file_name().and_then(|n| n.to_str()).unwrap_or("");
        let name_b = b.file_name().and_then(|n| n.to_str()).unwrap_or("");
        match (paths::date_from_filename(a), paths::date_from_filename(b)) {
            (Some(da), Some(db)) => db.cmp(&da),
            _ => name_a.cmp(name_b),
        }
    });
    paths
}

// ---------------------------------------------------------------------------
// Metadata extraction
// ---------------------------------------------------------------------------

static BACKTICK_FILE_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_FILE_RE: OnceLock<Regex> = OnceLock::new();
static TABLE_FILE_RE: OnceLock<Regex> = OnceLock::new();

/// Paths named in the plan sections, used for similarity matching.
pub fn extract_files_touched(sections: &Sections) -> Vec<String> {
    let combined = format!(
        "{}\n{}",
        sections.get("Implementation Plan").unwrap_or(""),
        sections.get("Patch Plan").unwrap_or(""),
    );

    let patterns = [
        BACKTICK_FILE_RE.get_or_init(|| Regex::new(r"`([^`]+\.[a-z]{2,4})`").unwrap()),
        BULLET_FILE_RE
            .get_or_init(|| Regex::new(r"(?m)^[-*]\s*`?([^\s`]+\.[a-z]{2,4})`?").unwrap()),
        TABLE_FILE_RE
            .get_or_init(|| Regex::new(r"\|\s*`?([^\s|`]+\.[a-z]{2,4})`?\s*\|").unwrap()),
    ];

    let mut files = Vec::new();
    for re in patterns {
        for c in re.captures_iter(&combined) {
            let file = c[1].trim().to_string();
            if !file.contains("http") && !file.starts_with('#') && !files.contains(&file) {
                files.push(file);
            }
        }
    }
    files
}

static RISK_RE: OnceLock<Regex> = OnceLock::new();

pub fn extract_risk_level(sections: &Sections) -> String {
    let security = sections
        .get("Security Review")
        .or_else(|| sections.get("Security Status"))
        .unwrap_or("");

    let risk_re =
        RISK_RE.get_or_init(|| Regex::new(r"(?i)Risk level:\s*(low|medium|high)").unwrap());
    if let Some(c) = risk_re.captures(security) {
        return c[1].to_lowercase();
    }

    let blast = sections
        .get("Blast Radius & Rollout")
        .unwrap_or("")
        .to_lowercase();
    if blast.contains("high") {
        return "high".to_string();
    }
    if blast.contains("medium") {
        return "medium".to_string();
    }
    "unknown".to_string()
}

static BLOCKED_STATUS_RE: OnceLock<Regex> = OnceLock::new();
static BLOCKED_BY_RE: OnceLock<Regex> = OnceLock::new();
static NEEDS_MORE_RE: OnceLock<Regex> = OnceLock::new();
static REASON_RE: OnceLock<Regex> = OnceLock::new();
static CHEF_BLOCKER_RE: OnceLock<Regex> = OnceLock::new();

pub fn extract_blockers(raw: &str, sections: &Sections) -> Vec<IndexedBlocker> {
    let mut blockers = Vec::new();

    let blocked_re = BLOCKED_STATUS_RE
        .get_or_init(|| Regex::new(r"(?mi)^## Status\s*\n+blocked").unwrap());
    if blocked_re.is_match(raw) {
        let by_re = BLOCKED_BY_RE.get_or_init(|| Regex::new(r"(?i)blocked by[:\s]+(.+)").unwrap());
        if let Some(c) = by_re.captures(raw) {
            blockers.push(IndexedBlocker {
                blocker_type: "status".to_string(),
                reason: c[1].trim().to_string(),
            });
        }
    }

    let needs_more_re = NEEDS_MORE_RE
        .get_or_init(|| Regex::new(r"(?mi)^## Status\s*\n+needs-more-cooking").unwrap());
    if needs_more_re.is_match(raw) {
        let reason_re = REASON_RE.get_or_init(|| Regex::new(r"(?i)reason:\s*(.+)").unwrap());
        let reason = reason_re
            .captures(raw)
            .map_or_else(|| "unspecified".to_string(), |c| c[1].trim().to_string());
        blockers.push(IndexedBlocker {
            blocker_type: "needs-more-cooking".to_string(),
            reason,
        });
    }

    let chef_re = CHEF_BLOCKER_RE.get_or_init(|| {
        Regex::new(r"(?i)\|\s*\d{4}-\d{2}-\d{2}\s*\|[^|\n]*blocked[^|\n]*\|([^|\n]+)\|").unwrap()
    });
    for c in chef_re.captures_iter(sections.get("Decision Log").unwrap_or("")) {
        blockers.push(IndexedBlocker {
            blocker_type: "chef".to_string(),
            reason: c[1].trim().to_string(),
        });
    }

    blockers
}

static PREMORTEM_TABLE_RE: OnceLock<Regex> = OnceLock::new();
static PREMORTEM_BULLET_RE: OnceLock<Regex> = OnceLock::new();

pub fn extract_premortem(sections: &Sections) -> Vec<PremortemScenario> {
    let section = sections
        .find_by_prefix("Pre-mortem")
        .or_else(|| sections.get("Risk Management"))
        .unwrap_or("");

    let mut scenarios = Vec::new();

    let table_re = PREMORTEM_TABLE_RE.get_or_init(|| {
        Regex::new(r"\|\s*(\d+)\s*\|([^|\n]+)\|[^|\n]*\|[^|\n]*\|([^|\n]+)\|").unwrap()
    });
    for c in table_re.captures_iter(section) {
        scenarios.push(PremortemScenario {
            id: c[1].parse().ok(),
            risk: c[2].trim().to_string(),
            mitigation: c[3].trim().to_string(),
        });
    }

    let bullet_re = PREMORTEM_BULLET_RE.get_or_init(|| {
        Regex::new(r"(?mi)^\d+\.\s+\*\*?([^*]+)\*\*?\s*-?>?\s*mitigation:\s*(.+)$").unwrap()
    });
    for c in bullet_re.captures_iter(section) {
        scenarios.push(PremortemScenario {
            id: None,
            risk: c[1].trim().to_string(),
            mitigation: c[2].trim().to_string(),
        });
    }

    scenarios
}

static DECISION_ROW_RE: OnceLock<Regex> = OnceLock::new();

/// Decision Log rows in either three or four column form. With four
/// columns the second is the phase.
pub fn extract_decisions(sections: &Sections) -> Vec<Decision> {
    let log = sections.get("Decision Log").unwrap_or("");
    let row_re = DECISION_ROW_RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*\|\s*(\d{4}-\d{2}-\d{2})\s*\|([^|\n]+)\|([^|\n]+)\|([^|\n]*)\|?\s*$")
            .unwrap()
    });

    let mut decisions = Vec::new();
    for c in row_re.captures_iter(log) {
        let fourth = c.get(4).map_or("", |m| m.as_str()).trim().to_string();
        let has_phase = !fourth.is_empty();
        decisions.push(if has_phase {
            Decision {
                date: c[1].to_string(),
                phase: Some(c[2].trim().to_string()),
                decision: c[3].trim().to_string(),
                rationale: fourth,
            }
        } else {
            Decision {
                date: c[1].to_string(),
                phase: None,
                decision: c[2].trim().to_string(),
                rationale: c[3].trim().to_string(),
            }
        });
    }
    decisions
}

// ---------------------------------------------------------------------------
// Building
// ---------------------------------------------------------------------------

pub fn index_artifact(path: &Path) -> Result<IndexedArtifact> {
    let parsed = artifact::parse(path)?;

    Ok(IndexedArtifact {
        path: parsed.path.display().to_string(),
        filename: parsed.filename.clone(),
        slug: parsed.slug.clone(),
        date: parsed.date.clone(),
        status: parsed
            .header
            .status
            .map_or_else(|| "unknown".to_string(), |s| s.to_string()),
        mode: parsed
            .header
            .mode
            .map_or_else(|| "unknown".to_string(), |m| m.to_string()),
        title: parsed.header.title.clone().unwrap_or_default(),
        owner: parsed.header.owner.clone(),
        files_touched: extract_files_touched(&parsed.sections),
        risk_level: extract_risk_level(&parsed.sections),
        blockers: extract_blockers(&parsed.raw, &parsed.sections),
        premortem: extract_premortem(&parsed.sections),
        decisions: extract_decisions(&parsed.sections),
        indexed_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

fn count_by<'a>(
    artifacts: &'a [IndexedArtifact],
    key: impl Fn(&'a IndexedArtifact) -> &'a str,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for artifact in artifacts {
        let k = key(artifact);
        let k = if k.is_empty() { "unknown" } else { k };
        *counts.entry(k.to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn build_index(cook_dir: &Path) -> ArtifactIndex {
    let mut artifacts = Vec::new();
    let mut errors = Vec::new();

    for path in scan_artifacts(cook_dir) {
        match index_artifact(&path) {
            Ok(indexed) => artifacts.push(indexed),
            Err(err) => {
                tracing::warn!(file = %path.display(), %err, "skipping unparseable artifact");
                errors.push(IndexError {
                    file: path.display().to_string(),
                    error: err.to_string(),
                });
            }
        }
    }

    let stats = IndexStats {
        total: artifacts.len(),
        by_status: count_by(&artifacts, |a| &a.status),
        by_mode: count_by(&artifacts, |a| &a.mode),
        by_risk: count_by(&artifacts, |a| &a.risk_level),
    };

    ArtifactIndex {
        version: INDEX_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        cook_dir: cook_dir.display().to_string(),
        artifacts,
        errors,
        stats,
    }
}

// ---------------------------------------------------------------------------
// Persistence and staleness
// ---------------------------------------------------------------------------

pub fn save_index(index: &ArtifactIndex, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(index)?;
    io::atomic_write(path, json.as_bytes())
}

pub fn load_index(path: &Path) -> Result<ArtifactIndex> {
    let content = std::fs::read_to_string(path)
        .map_err(|_| CookError::IndexNotFound(path.display().to_string()))?;
    Ok(serde_json::from_str(&content)?)
}

/// Stale when any artifact file's mtime postdates the index. A missing
/// cook directory is not staleness, there is simply nothing to index.
pub fn is_stale(index: &ArtifactIndex, cook_dir: &Path) -> bool {
    let Ok(generated) = DateTime::parse_from_rfc3339(&index.generated_at) else {
        return true;
    };
    let generated: DateTime<Utc> = generated.into();

    if !cook_dir.exists() {
        return false;
    }

    for path in scan_artifacts(cook_dir) {
        let Ok(meta) = std::fs::metadata(&path) else {
            return true;
        };
        let Ok(mtime) = meta.modified() else {
            return true;
        };
        if DateTime::<Utc>::from(mtime) > generated {
            return true;
        }
    }
    false
}

/// Load the persisted index, rebuilding and saving when missing or stale.
pub fn ensure_index(cook_dir: &Path, index_path: &Path) -> Result<ArtifactIndex> {
    match load_index(index_path) {
        Ok(index) if !is_stale(&index, cook_dir) => Ok(index),
        _ => {
            tracing::debug!(dir = %cook_dir.display(), "rebuilding artifact index");
            let index = build_index(cook_dir);
            save_index(&index, index_path)?;
            Ok(index)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ARTIFACT: &str = "\
# Checkout Flow

Add a new checkout flow with saved cards.

## Status

cooking

## Cooking Mode

well-done

## Patch Plan

- `src/checkout.ts` - new checkout module
- `src/cart.ts` - wire in totals

## Security Review

Risk level: medium

## Pre-mortem (3 scenarios required)

| 1 | Payment provider timeout | x | y | Add retry with backoff |

## Decision Log

| 2026-03-01 | Use saved cards API | Faster checkout |
";

    fn write_cook(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let cook = dir.path().join("cook");
        std::fs::create_dir_all(&cook).unwrap();
        let path = cook.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn indexes_a_full_artifact() {
        let dir = TempDir::new().unwrap();
        let path = write_cook(&dir, "checkout-flow.2026-03-01.cook.md", ARTIFACT);

        let indexed = index_artifact(&path).unwrap();
        assert_eq!(indexed.slug, "checkout-flow");
        assert_eq!(indexed.date.as_deref(), Some("2026-03-01"));
        assert_eq!(indexed.status, "cooking");
        assert_eq!(indexed.mode, "well-done");
        assert_eq!(indexed.risk_level, "medium");
        assert!(indexed.files_touched.contains(&"src/checkout.ts".to_string()));
        assert_eq!(indexed.premortem.len(), 1);
        assert_eq!(indexed.premortem[0].id, Some(1));
        assert_eq!(indexed.decisions.len(), 1);
        assert_eq!(indexed.decisions[0].decision, "Use saved cards API");
        assert!(indexed.decisions[0].phase.is_none());
    }

    #[test]
    fn title_comes_from_dish_section_or_defaults_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_cook(&dir, "checkout-flow.2026-03-01.cook.md", ARTIFACT);
        let indexed = index_artifact(&path).unwrap();
        assert_eq!(indexed.title, "");

        let with_dish = ARTIFACT.replace(
            "# Checkout Flow\n\nAdd a new checkout flow with saved cards.",
            "## Dish\n\nAdd a new checkout flow with saved cards.",
        );
        let path = write_cook(&dir, "with-dish.2026-03-02.cook.md", &with_dish);
        let indexed = index_artifact(&path).unwrap();
        assert_eq!(indexed.title, "Add a new checkout flow with saved cards.");
    }

    #[test]
    fn four_column_decisions_carry_phase() {
        let dir = TempDir::new().unwrap();
        let content = ARTIFACT.replace(
            "| 2026-03-01 | Use saved cards API | Faster checkout |",
            "| 2026-03-01 | plan | Use saved cards API | Faster checkout |",
        );
        let path = write_cook(&dir, "checkout-flow.2026-03-01.cook.md", &content);
        let indexed = index_artifact(&path).unwrap();
        assert_eq!(indexed.decisions[0].phase.as_deref(), Some("plan"));
        assert_eq!(indexed.decisions[0].decision, "Use saved cards API");
    }

    #[test]
    fn blocked_status_extracted_with_reason() {
        let dir = TempDir::new().unwrap();
        let content = ARTIFACT
            .replace("## Status\n\ncooking", "## Status\n\nblocked\n\nBlocked by: missing API keys");
        let path = write_cook(&dir, "checkout-flow.2026-03-01.cook.md", &content);
        let indexed = index_artifact(&path).unwrap();
        assert_eq!(indexed.blockers.len(), 1);
        assert_eq!(indexed.blockers[0].blocker_type, "status");
        assert_eq!(indexed.blockers[0].reason, "missing API keys");
    }

    #[test]
    fn build_index_collects_stats_and_errors() {
        let dir = TempDir::new().unwrap();
        write_cook(&dir, "checkout-flow.2026-03-01.cook.md", ARTIFACT);
        write_cook(&dir, "other-dish.2026-03-02.cook.md", ARTIFACT);
        // An empty file parses with defaults, so corrupt it differently:
        // no content at all still indexes; stats reflect both files.
        let index = build_index(&dir.path().join("cook"));

        assert_eq!(index.stats.total, 2);
        assert_eq!(index.stats.by_status["cooking"], 2);
        assert_eq!(index.stats.by_mode["well-done"], 2);
        assert_eq!(index.version, INDEX_VERSION);
        // Newest first.
        assert_eq!(index.artifacts[0].slug, "other-dish");
    }

    #[test]
    fn save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        write_cook(&dir, "checkout-flow.2026-03-01.cook.md", ARTIFACT);
        let index = build_index(&dir.path().join("cook"));
        let index_path = dir.path().join("data/index.json");

        save_index(&index, &index_path).unwrap();
        let loaded = load_index(&index_path).unwrap();
        assert_eq!(loaded.artifacts.len(), 1);
        assert_eq!(loaded.artifacts[0].slug, "checkout-flow");
    }

    #[test]
    fn load_missing_index_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_index(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CookError::IndexNotFound(_)));
    }

    #[test]
    fn ensure_index_rebuilds_when_stale() {
        let dir = TempDir::new().unwrap();
        let cook = dir.path().join("cook");
        write_cook(&dir, "checkout-flow.2026-03-01.cook.md", ARTIFACT);
        let index_path = dir.path().join("data/index.json");

        let first = ensure_index(&cook, &index_path).unwrap();
        assert_eq!(first.artifacts.len(), 1);

        // Backdate the stored index so the artifact mtime wins.
        let mut stale = first.clone();
        stale.generated_at = "2000-01-01T00:00:00Z".to_string();
        save_index(&stale, &index_path).unwrap();

        let rebuilt = ensure_index(&cook, &index_path).unwrap();
        assert_ne!(rebuilt.generated_at, stale.generated_at);
    }

    #[test]
    fn scan_ignores_non_artifacts() {
        let dir = TempDir::new().unwrap();
        write_cook(&dir, "checkout-flow.2026-03-01.cook.md", ARTIFACT);
        std::fs::write(dir.path().join("cook/README.md"), "not an artifact").unwrap();
        assert_eq!(scan_artifacts(&dir.path().join("cook")).len(), 1);
    }
}
