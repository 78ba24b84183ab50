//! Advisory drift detection: loosely extracted plan vs files changed.
//!
//! Unlike `coverage`, which compares an explicit patch plan exactly, drift
//! extraction sweeps the whole document for path-looking strings and path
//! comparison is fuzzy (exact, substring either way, or same basename).
//! Results are advisory only and never gate a verdict.

use crate::artifact;
use crate::error::Result;
use crate::git::GitFacts;
use crate::types::ArtifactStatus;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

static TABLE_FILE_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_FILE_RE: OnceLock<Regex> = OnceLock::new();
static PATH_RE: OnceLock<Regex> = OnceLock::new();

/// Sweep the whole document for anything path-shaped. Over-collection is
/// acceptable here, the match step is fuzzy anyway.
pub fn extract_planned_files(content: &str) -> Vec<String> {
    let table_re = TABLE_FILE_RE.get_or_init(|| Regex::new(r"\|\s*`([^`]+)`\s*\|").unwrap());
    let bullet_re = BULLET_FILE_RE.get_or_init(|| {
        Regex::new(r"(?m)^[\s\-*]+`?([a-zA-Z0-9_./\-]+\.[a-zA-Z0-9]+)`?\s*[-:]").unwrap()
    });
    let path_re = PATH_RE.get_or_init(|| {
        Regex::new(r"(?m)(?:^|\s)((?:scripts|src|lib|crates|test|tests|docs)/[a-zA-Z0-9_./\-]+\.[a-zA-Z0-9]+)")
            .unwrap()
    });

    let mut files = BTreeSet::new();

    for c in table_re.captures_iter(content) {
        let path = c[1].trim().to_string();
        if path.contains('/') || path.contains('.') {
            files.insert(path);
        }
    }
    for c in bullet_re.captures_iter(content) {
        files.insert(c[1].trim().to_string());
    }
    for c in path_re.captures_iter(content) {
        files.insert(c[1].trim().to_string());
    }

    files.into_iter().collect()
}

/// Lowercased forward-slash form, used only for fuzzy comparison.
fn normalize_loose(path: &str) -> String {
    path.to_lowercase().replace('\\', "/")
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Fuzzy path equality. Known to produce false positives for generic
/// basenames like `index.js`, which is why drift stays advisory.
pub fn paths_match(planned: &str, implemented: &str) -> bool {
    let p = normalize_loose(planned);
    let i = normalize_loose(implemented);

    if p == i {
        return true;
    }
    if p.contains(i.as_str()) || i.contains(p.as_str()) {
        return true;
    }
    basename(&p) == basename(&i)
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftMatch {
    pub planned: String,
    pub implemented: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub planned: usize,
    pub implemented: usize,
    pub matched: Vec<DriftMatch>,
    pub unplanned: Vec<String>,
    pub missing: Vec<String>,
    pub has_drift: bool,
}

/// Cross-product fuzzy match, then partition leftovers. A planned path may
/// match several implemented paths and vice versa.
pub fn detect_drift(planned: &[String], implemented: &[String]) -> DriftReport {
    let mut matched = Vec::new();
    let mut matched_planned: BTreeSet<&str> = BTreeSet::new();
    let mut matched_impl: BTreeSet<&str> = BTreeSet::new();

    for p in planned {
        for i in implemented {
            if paths_match(p, i) {
                matched.push(DriftMatch {
                    planned: p.clone(),
                    implemented: i.clone(),
                });
                matched_planned.insert(p.as_str());
                matched_impl.insert(i.as_str());
            }
        }
    }

    let unplanned: Vec<String> = implemented
        .iter()
        .filter(|i| !matched_impl.contains(i.as_str()))
        .cloned()
        .collect();
    let missing: Vec<String> = planned
        .iter()
        .filter(|p| !matched_planned.contains(p.as_str()))
        .cloned()
        .collect();

    let has_drift = !unplanned.is_empty() || !missing.is_empty();

    DriftReport {
        planned: planned.len(),
        implemented: implemented.len(),
        matched,
        unplanned,
        missing,
        has_drift,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftArtifactInfo {
    pub path: String,
    pub slug: String,
    pub title: String,
    pub date: Option<String>,
    pub status: Option<ArtifactStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftAnalysis {
    pub artifact: DriftArtifactInfo,
    pub planned_files: Vec<String>,
    pub implemented_files: Vec<String>,
    pub drift: DriftReport,
}

/// Window of implemented files when no range or date is available.
const FALLBACK_RANGE: &str = "HEAD~10..HEAD";

/// Full drift analysis for an artifact. The change window is, in order of
/// preference, an explicit range, an explicit since-date, the artifact's
/// own date, or the last ten commits.
pub fn analyze_drift(
    facts: &GitFacts,
    artifact_path: &Path,
    range: Option<&str>,
    since: Option<&str>,
) -> Result<DriftAnalysis> {
    let parsed = artifact::parse(artifact_path)?;
    let planned_files = extract_planned_files(&parsed.raw);

    let implemented = if let Some(range) = range {
        facts.files_in_range(range)
    } else if let Some(since) = since {
        facts.files_since(since)
    } else if let Some(date) = &parsed.date {
        facts.files_since(date)
    } else {
        facts.files_in_range(FALLBACK_RANGE)
    };

    let drift = detect_drift(&planned_files, &implemented);

    Ok(DriftAnalysis {
        artifact: DriftArtifactInfo {
            path: artifact_path.display().to_string(),
            slug: parsed.slug.clone(),
            title: parsed.header.title.clone().unwrap_or_default(),
            date: parsed.date.clone(),
            status: parsed.header.status,
        },
        planned_files,
        implemented_files: implemented,
        drift,
    })
}

fn push_capped(lines: &mut Vec<String>, items: &[String], prefix: &str, cap: usize) {
    for file in items.iter().take(cap) {
        lines.push(format!("  {prefix} {file}"));
    }
    if items.len() > cap {
        lines.push(format!("  ... and {} more", items.len() - cap));
    }
}

pub fn format_drift_report(analysis: &DriftAnalysis) -> String {
    let a = &analysis.artifact;
    let d = &analysis.drift;
    let mut lines = vec![
        String::new(),
        "======================================".to_string(),
        "  Drift Detection Report".to_string(),
        "======================================".to_string(),
        String::new(),
        format!("Artifact: {}", a.slug),
        format!(
            "Status:   {}",
            a.status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
        ),
        format!("Date:     {}", a.date.as_deref().unwrap_or("unknown")),
        String::new(),
    ];

    if !d.has_drift {
        lines.push("No drift detected. Implementation matches plan.".to_string());
        lines.push(String::new());
        lines.push(format!("Planned files:     {}", d.planned));
        lines.push(format!("Implemented files: {}", d.implemented));
        lines.push(format!("Matched:           {}", d.matched.len()));
        lines.push(String::new());
        return lines.join("\n");
    }

    lines.push("DRIFT DETECTED".to_string());
    lines.push(String::new());

    if !d.unplanned.is_empty() {
        lines.push(format!("Unplanned changes (scope creep): {}", d.unplanned.len()));
        push_capped(&mut lines, &d.unplanned, "+", 10);
        lines.push(String::new());
    }

    if !d.missing.is_empty() {
        lines.push(format!("Missing from implementation: {}", d.missing.len()));
        push_capped(&mut lines, &d.missing, "-", 10);
        lines.push(String::new());
    }

    if !d.matched.is_empty() {
        lines.push(format!("Matched (as planned): {}", d.matched.len()));
        let planned: Vec<String> = d.matched.iter().map(|m| m.planned.clone()).collect();
        push_capped(&mut lines, &planned, "=", 5);
        lines.push(String::new());
    }

    lines.push("--------------------------------------".to_string());
    lines.push("Recommendation: review unplanned changes".to_string());
    lines.push("Consider updating the artifact if changes are intentional".to_string());
    lines.push(String::new());

    lines.join("\n")
}
