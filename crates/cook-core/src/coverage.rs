//! Structural verification: patch plan vs actual changes.
//!
//! Layer 1 of 2-layer verification (layer 2 is `verify`, the semantic
//! judge). Path comparison here is exact on a normalized form — fuzzy
//! matching lives in `drift` and is never used for authoritative coverage
//! numbers.

use crate::artifact::{self, PatchPlanItem};
use crate::error::{CookError, Result};
use crate::git::{ChangeRecord, GitFacts};
use crate::types::Verdict;
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Path normalization
// ---------------------------------------------------------------------------

/// Forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let p = path.replace('\\', "/");
    p.strip_prefix("./").unwrap_or(&p).to_string()
}

// ---------------------------------------------------------------------------
// Coverage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MatchedItem {
    pub file: String,
    pub planned: PatchPlanItem,
    pub actual: ChangeRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct MissingItem {
    pub file: String,
    pub planned: PatchPlanItem,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnplannedItem {
    pub file: String,
    pub actual: ChangeRecord,
}

/// Derived, never persisted — recomputed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageResult {
    pub matched: Vec<MatchedItem>,
    pub missing: Vec<MissingItem>,
    pub unplanned: Vec<UnplannedItem>,
    pub covered: usize,
    pub total: usize,
    pub percentage: u32,
}

impl CoverageResult {
    pub fn formatted(&self) -> String {
        format!("{}/{}", self.covered, self.total)
    }

    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }

    pub fn has_unplanned(&self) -> bool {
        !self.unplanned.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Dedup by normalized path: first occurrence keeps its position, a later
/// duplicate replaces the value.
fn dedup_by_path<T: Clone>(items: &[T], key: impl Fn(&T) -> &str) -> Vec<(String, T)> {
    let mut out: Vec<(String, T)> = Vec::with_capacity(items.len());
    for item in items {
        let norm = normalize_path(key(item));
        if let Some(slot) = out.iter_mut().find(|(k, _)| *k == norm) {
            slot.1 = item.clone();
        } else {
            out.push((norm, item.clone()));
        }
    }
    out
}

/// Partition plan and changes into matched / missing / unplanned.
///
/// Invariants: matched + missing covers the (deduped) plan, matched +
/// unplanned covers the (deduped) changes. An empty plan is an explicit
/// error state, never a 0/0 percentage.
pub fn compute_coverage(plan: &[PatchPlanItem], changes: &[ChangeRecord]) -> Result<CoverageResult> {
    if plan.is_empty() {
        return Err(CookError::NoPatchPlan("empty patch plan".to_string()));
    }

    let planned = dedup_by_path(plan, |p| p.file.as_str());
    let changed = dedup_by_path(changes, |c| c.file.as_str());

    let mut matched = Vec::new();
    let mut missing = Vec::new();
    let mut unplanned = Vec::new();

    for (path, item) in &planned {
        match changed.iter().find(|(k, _)| k == path) {
            Some((_, record)) => matched.push(MatchedItem {
                file: path.clone(),
                planned: item.clone(),
                actual: record.clone(),
            }),
            None => missing.push(MissingItem {
                file: path.clone(),
                planned: item.clone(),
            }),
        }
    }

    for (path, record) in &changed {
        if !planned.iter().any(|(k, _)| k == path) {
            unplanned.push(UnplannedItem {
                file: path.clone(),
                actual: record.clone(),
            });
        }
    }

    let covered = matched.len();
    let total = planned.len();
    let percentage = ((covered as f64 / total as f64) * 100.0).round() as u32;

    Ok(CoverageResult {
        matched,
        missing,
        unplanned,
        covered,
        total,
        percentage,
    })
}

// ---------------------------------------------------------------------------
// TODO scanning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TodoKind {
    Todo,
    Fixme,
    Hack,
    Xxx,
}

impl TodoKind {
    /// FIXME and XXX affect the verdict; plain TODO/HACK are reported only.
    pub fn is_critical(self) -> bool {
        matches!(self, TodoKind::Fixme | TodoKind::Xxx)
    }
}

impl std::fmt::Display for TodoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TodoKind::Todo => "TODO",
            TodoKind::Fixme => "FIXME",
            TodoKind::Hack => "HACK",
            TodoKind::Xxx => "XXX",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoMarker {
    pub file: String,
    pub line: usize,
    pub text: String,
    pub kind: TodoKind,
}

static TODO_RE: OnceLock<Regex> = OnceLock::new();

fn todo_re() -> &'static Regex {
    // `//` or `#` comment followed by a marker word.
    TODO_RE.get_or_init(|| {
        Regex::new(r"(?i)(?://|#)\s*(TODO|FIXME|HACK|XXX):?\s*(.+)").unwrap()
    })
}

fn todo_kind(word: &str) -> TodoKind {
    match word.to_uppercase().as_str() {
        "FIXME" => TodoKind::Fixme,
        "HACK" => TodoKind::Hack,
        "XXX" => TodoKind::Xxx,
        _ => TodoKind::Todo,
    }
}

/// Scan changed files for TODO-family markers. Unreadable files are
/// skipped — a missing file already shows up as missing coverage.
pub fn scan_todos(root: &Path, files: &[String]) -> Vec<TodoMarker> {
    let mut todos = Vec::new();

    for file in files {
        let path = root.join(file);
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };
        for (i, line) in content.lines().enumerate() {
            if let Some(c) = todo_re().captures(line) {
                todos.push(TodoMarker {
                    file: file.clone(),
                    line: i + 1,
                    text: c[2].trim().to_string(),
                    kind: todo_kind(&c[1]),
                });
            }
        }
    }

    todos
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct VerdictResult {
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub can_proceed: bool,
    pub summary: String,
}

/// Ordered precedence: missing planned files beat everything, then
/// unplanned files or critical markers, then ready.
pub fn verdict(coverage: &CoverageResult, todos: &[TodoMarker]) -> VerdictResult {
    let mut verdict = Verdict::Ready;
    let mut reasons = Vec::new();

    if coverage.has_missing() {
        verdict = Verdict::NeedsWork;
        reasons.push(format!(
            "{} planned files not modified",
            coverage.missing.len()
        ));
    }

    if coverage.has_unplanned() {
        verdict = verdict.max(Verdict::NeedsReview);
        reasons.push(format!(
            "{} unplanned files modified",
            coverage.unplanned.len()
        ));
    }

    let critical = todos.iter().filter(|t| t.kind.is_critical()).count();
    if critical > 0 {
        verdict = verdict.max(Verdict::NeedsReview);
        reasons.push(format!("{critical} FIXME/XXX comments found"));
    }

    if !todos.is_empty() && verdict == Verdict::Ready {
        reasons.push(format!("{} TODO comments found (non-blocking)", todos.len()));
    }

    let summary = match verdict {
        Verdict::Ready => "All planned files covered, ready for PR",
        Verdict::NeedsReview => "Coverage complete but has warnings",
        Verdict::NeedsWork => "Missing coverage, fix before PR",
    }
    .to_string();

    VerdictResult {
        verdict,
        reasons,
        can_proceed: verdict != Verdict::NeedsWork,
        summary,
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

pub fn format_report(coverage: &CoverageResult) -> String {
    let mut lines = vec![
        "Coverage Report".to_string(),
        "===============".to_string(),
        String::new(),
    ];

    let marker = if coverage.percentage == 100 {
        "ok"
    } else if coverage.percentage >= 50 {
        "warn"
    } else {
        "fail"
    };
    lines.push(format!(
        "[{marker}] Coverage: {} ({}%)",
        coverage.formatted(),
        coverage.percentage
    ));
    lines.push(String::new());

    if !coverage.matched.is_empty() {
        lines.push("Covered (planned -> changed):".to_string());
        for item in &coverage.matched {
            lines.push(format!("  + {}", item.file));
        }
        lines.push(String::new());
    }

    if !coverage.missing.is_empty() {
        lines.push("Missing (planned but NOT changed):".to_string());
        for item in &coverage.missing {
            lines.push(format!("  - {}", item.file));
            if !item.planned.description.is_empty() {
                lines.push(format!("    -> {}", item.planned.description));
            }
        }
        lines.push(String::new());
    }

    if !coverage.unplanned.is_empty() {
        lines.push("Unplanned (changed but NOT in plan):".to_string());
        for item in &coverage.unplanned {
            lines.push(format!("  ! {} ({})", item.file, item.actual.status));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Full structural verification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StructuralVerification {
    pub coverage: CoverageResult,
    pub todos: Vec<TodoMarker>,
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub can_proceed: bool,
    pub summary: String,
    pub report: String,
}

/// Parse the artifact, diff against the base, scan markers, and render a
/// verdict. Fails with `NoPatchPlan` when the artifact has no plan.
pub fn run_structural_verification(
    facts: &GitFacts,
    artifact_path: &Path,
    branch: Option<&str>,
    base: Option<&str>,
) -> Result<StructuralVerification> {
    let parsed = artifact::parse(artifact_path)?;
    let plan = artifact::extract_patch_plan(&parsed.raw);
    if plan.is_empty() {
        return Err(CookError::NoPatchPlan(artifact_path.display().to_string()));
    }

    let changes = facts.changed_files(branch, base);
    let coverage = compute_coverage(&plan, &changes)?;

    let changed_paths: Vec<String> = changes.iter().map(|c| c.file.clone()).collect();
    let todos = scan_todos(facts.root(), &changed_paths);

    let v = verdict(&coverage, &todos);
    let report = format_report(&coverage);

    Ok(StructuralVerification {
        coverage,
        todos,
        verdict: v.verdict,
        reasons: v.reasons,
        can_proceed: v.can_proceed,
        summary: v.summary,
        report,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeStatus, FileAction};

    fn plan_item(file: &str) -> PatchPlanItem {
        PatchPlanItem {
            file: file.to_string(),
            action: FileAction::Modify,
            description: String::new(),
        }
    }

    fn change(file: &str) -> ChangeRecord {
        ChangeRecord {
            file: file.to_string(),
            status: ChangeStatus::Modified,
        }
    }

    #[test]
    fn normalize_strips_dot_slash_and_backslashes() {
        assert_eq!(normalize_path("./src/a.ts"), "src/a.ts");
        assert_eq!(normalize_path("src\\a.ts"), "src/a.ts");
        assert_eq!(normalize_path("src/a.ts"), "src/a.ts");
    }

    #[test]
    fn full_coverage_is_ready() {
        let coverage =
            compute_coverage(&[plan_item("a.ts")], &[change("a.ts")]).unwrap();
        assert_eq!(coverage.covered, 1);
        assert_eq!(coverage.missing.len(), 0);
        assert_eq!(coverage.unplanned.len(), 0);
        assert_eq!(coverage.percentage, 100);

        let v = verdict(&coverage, &[]);
        assert_eq!(v.verdict, Verdict::Ready);
        assert!(v.can_proceed);
    }

    #[test]
    fn missing_file_needs_work() {
        let coverage =
            compute_coverage(&[plan_item("a.ts"), plan_item("b.ts")], &[change("a.ts")])
                .unwrap();
        assert_eq!(coverage.missing.len(), 1);
        assert_eq!(coverage.missing[0].file, "b.ts");
        assert_eq!(coverage.percentage, 50);

        let v = verdict(&coverage, &[]);
        assert_eq!(v.verdict, Verdict::NeedsWork);
        assert!(!v.can_proceed);
    }

    #[test]
    fn unplanned_file_needs_review() {
        let coverage =
            compute_coverage(&[plan_item("a.ts")], &[change("a.ts"), change("c.ts")])
                .unwrap();
        assert_eq!(coverage.matched.len(), 1);
        assert_eq!(coverage.unplanned.len(), 1);
        assert_eq!(coverage.unplanned[0].file, "c.ts");

        let v = verdict(&coverage, &[]);
        assert_eq!(v.verdict, Verdict::NeedsReview);
        assert!(v.can_proceed);
    }

    #[test]
    fn empty_plan_is_an_error() {
        let err = compute_coverage(&[], &[change("a.ts")]).unwrap_err();
        assert!(matches!(err, CookError::NoPatchPlan(_)));
    }

    #[test]
    fn partition_invariants_hold_after_dedup() {
        let plan = vec![plan_item("./a.ts"), plan_item("a.ts"), plan_item("b.ts")];
        let changes = vec![change("a.ts"), change("c.ts"), change("./c.ts")];
        let coverage = compute_coverage(&plan, &changes).unwrap();

        // Deduped plan has 2 entries, deduped changes 2.
        assert_eq!(coverage.matched.len() + coverage.missing.len(), 2);
        assert_eq!(coverage.matched.len() + coverage.unplanned.len(), 2);
        assert!(coverage.percentage <= 100);
    }

    #[test]
    fn percentage_100_iff_nothing_missing() {
        let full = compute_coverage(&[plan_item("a.ts")], &[change("a.ts")]).unwrap();
        assert_eq!(full.percentage, 100);
        assert!(full.is_complete());

        let partial =
            compute_coverage(&[plan_item("a.ts"), plan_item("b.ts")], &[change("a.ts")])
                .unwrap();
        assert!(partial.percentage < 100);
        assert!(!partial.is_complete());
    }

    #[test]
    fn critical_todo_downgrades_ready() {
        let coverage = compute_coverage(&[plan_item("a.ts")], &[change("a.ts")]).unwrap();
        let todos = vec![TodoMarker {
            file: "a.ts".into(),
            line: 3,
            text: "broken edge case".into(),
            kind: TodoKind::Fixme,
        }];
        let v = verdict(&coverage, &todos);
        assert_eq!(v.verdict, Verdict::NeedsReview);
    }

    #[test]
    fn plain_todo_reported_but_ready() {
        let coverage = compute_coverage(&[plan_item("a.ts")], &[change("a.ts")]).unwrap();
        let todos = vec![TodoMarker {
            file: "a.ts".into(),
            line: 3,
            text: "later".into(),
            kind: TodoKind::Todo,
        }];
        let v = verdict(&coverage, &todos);
        assert_eq!(v.verdict, Verdict::Ready);
        assert_eq!(v.reasons.len(), 1);
        assert!(v.reasons[0].contains("non-blocking"));
    }

    #[test]
    fn scan_todos_finds_markers_with_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("x.rs"),
            "fn main() {}\n// TODO: wire up config\n// FIXME handle error\n",
        )
        .unwrap();

        let todos = scan_todos(dir.path(), &["x.rs".to_string()]);
        assert_eq!(todos.len(), 2);
        assert_eq!(todos[0].kind, TodoKind::Todo);
        assert_eq!(todos[0].line, 2);
        assert_eq!(todos[1].kind, TodoKind::Fixme);
        assert_eq!(todos[1].text, "handle error");
    }

    #[test]
    fn verdict_monotonic_under_added_problems() {
        let ready = compute_coverage(&[plan_item("a.ts")], &[change("a.ts")]).unwrap();
        assert_eq!(verdict(&ready, &[]).verdict, Verdict::Ready);

        // Adding an unplanned change can only get worse.
        let worse =
            compute_coverage(&[plan_item("a.ts")], &[change("a.ts"), change("z.ts")])
                .unwrap();
        assert!(verdict(&worse, &[]).verdict >= Verdict::NeedsReview);
    }
}
