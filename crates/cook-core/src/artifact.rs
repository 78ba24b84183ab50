//! Artifact model and parser.
//!
//! One artifact is one markdown file: `cook/<slug>.<YYYY-MM-DD>.cook.md`.
//! The changelog lives inside the artifact (single file, no orphaned
//! metadata) and diffing is section-level (`## ` headings), which matches
//! the artifact template structure.
//!
//! Parsing never fails on malformed markdown — every extractor is
//! best-effort line scanning, and absent sections yield `None` or empty
//! collections. Only a missing file is an error.

use crate::error::{CookError, Result};
use crate::paths;
use crate::types::{ArtifactStatus, CookingMode, FileAction};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Insertion-ordered section map. Keys are unique; a repeated heading
/// replaces the earlier body but keeps its original position.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sections {
    entries: Vec<(String, String)>,
}

impl Sections {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Exact match first, then prefix match for variants like
    /// "Pre-mortem (3 scenarios required)".
    pub fn find_by_prefix(&self, base: &str) -> Option<&str> {
        if let Some(c) = self.get(base) {
            return Some(c);
        }
        let base_lower = base.to_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| n.to_lowercase().starts_with(&base_lower))
            .map(|(_, c)| c.as_str())
    }

    pub fn set(&mut self, name: &str, content: String) {
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| n == name) {
            slot.1 = content;
        } else {
            self.entries.push((name.to_string(), content));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), c.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Header metadata pulled from the top sections of an artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Header {
    pub title: Option<String>,
    pub status: Option<ArtifactStatus>,
    pub mode: Option<CookingMode>,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub date: String,
    pub summary: String,
}

/// One planned file change from the Patch Plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchPlanItem {
    pub file: String,
    pub action: FileAction,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub filename: String,
    pub slug: String,
    pub date: Option<String>,
    pub header: Header,
    pub sections: Sections,
    pub changelog: Vec<ChangelogEntry>,
    pub raw: String,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Read and parse one artifact file.
pub fn parse(path: &Path) -> Result<Artifact> {
    if !path.exists() {
        return Err(CookError::ArtifactNotFound(path.display().to_string()));
    }
    let raw = std::fs::read_to_string(path)?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    Ok(Artifact {
        path: path.to_path_buf(),
        filename,
        slug: paths::slug_from_filename(path),
        date: paths::date_from_filename(path),
        header: parse_header(&raw),
        sections: parse_sections(&raw),
        changelog: parse_changelog(&raw),
        raw,
    })
}

/// Split a document into level-2 sections.
///
/// A line beginning with exactly `## ` opens a section named by the rest of
/// the line; everything up to the next `## ` belongs to it. Deliberately
/// flat: `###` subsections stay as raw text inside the parent so downstream
/// heuristics can pattern-match them.
pub fn parse_sections(content: &str) -> Sections {
    let mut sections = Sections::default();
    let mut current: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("## ") {
            if let Some(name) = current.take() {
                sections.set(&name, body.join("\n").trim().to_string());
            }
            current = Some(rest.trim().to_string());
            body.clear();
        } else if current.is_some() {
            body.push(line);
        }
    }
    if let Some(name) = current {
        sections.set(&name, body.join("\n").trim().to_string());
    }

    sections
}

static OWNER_RE: OnceLock<Regex> = OnceLock::new();

fn owner_re() -> &'static Regex {
    OWNER_RE.get_or_init(|| Regex::new(r"Decision Owner:\s*(.+)").unwrap())
}

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    // First word-with-hyphens token, e.g. "needs-more-cooking".
    TOKEN_RE.get_or_init(|| Regex::new(r"^(\w[\w-]*)").unwrap())
}

fn first_token(section: Option<&str>) -> Option<String> {
    let body = section?;
    let line = body.lines().find(|l| !l.trim().is_empty())?;
    token_re()
        .captures(line.trim())
        .map(|c| c[1].to_string())
}

/// Extract title, status, cooking mode, and decision owner.
///
/// Title is the first paragraph of the `## Dish` section; status and mode
/// are the first token of their sections; the owner label is searched
/// anywhere in the document, not section-scoped.
pub fn parse_header(content: &str) -> Header {
    let sections = parse_sections(content);

    let title = sections.get("Dish").and_then(|body| {
        let para: Vec<&str> = body
            .lines()
            .take_while(|l| !l.trim().is_empty())
            .collect();
        if para.is_empty() {
            None
        } else {
            Some(para.join("\n").trim().to_string())
        }
    });

    let status = first_token(sections.get("Status")).and_then(|t| t.parse().ok());
    let mode = first_token(sections.get("Cooking Mode")).and_then(|t| t.parse().ok());
    let owner = owner_re()
        .captures(content)
        .map(|c| c[1].trim().to_string());

    Header {
        title,
        status,
        mode,
        owner,
    }
}

static CHANGELOG_RE: OnceLock<Regex> = OnceLock::new();

fn changelog_re() -> &'static Regex {
    CHANGELOG_RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2}):\s*(.+)$").unwrap())
}

/// Parse `YYYY-MM-DD: summary` entries from the Changelog section.
pub fn parse_changelog(content: &str) -> Vec<ChangelogEntry> {
    let sections = parse_sections(content);
    let Some(body) = sections.get("Changelog") else {
        return Vec::new();
    };

    body.lines()
        .filter_map(|line| {
            changelog_re().captures(line).map(|c| ChangelogEntry {
                date: c[1].to_string(),
                summary: c[2].trim().to_string(),
            })
        })
        .collect()
}

/// Keep changelog entries on or after `since` (`YYYY-MM-DD`, lexicographic).
pub fn filter_changelog_since(entries: &[ChangelogEntry], since: &str) -> Vec<ChangelogEntry> {
    entries
        .iter()
        .filter(|e| e.date.as_str() >= since)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Patch plan extraction
// ---------------------------------------------------------------------------

/// Section names recognized as holding the patch plan, in lookup order.
pub const PLAN_SECTIONS: [&str; 3] = ["Implementation Plan", "Patch Plan", "Fix Plan"];

static BACKTICK_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();
static TABLE_RE: OnceLock<Regex> = OnceLock::new();

fn backtick_re() -> &'static Regex {
    // `path/to/file.ext` - description
    BACKTICK_RE.get_or_init(|| Regex::new(r"`([^`]+\.\w+)`\s*[-:]?\s*(.*)").unwrap())
}

fn bullet_re() -> &'static Regex {
    // - path/to/file.ext: description
    BULLET_RE.get_or_init(|| Regex::new(r"[-*]\s*(\S+\.\w{1,5})\s*[-:]?\s*(.*)").unwrap())
}

fn table_re() -> &'static Regex {
    // | path/to/file.ext | action | description |
    TABLE_RE.get_or_init(|| Regex::new(r"\|\s*(\S+\.\w+)\s*\|\s*(\w+)\s*\|\s*(.*?)\s*\|").unwrap())
}

/// Extract the patch plan from whichever recognized section exists.
///
/// Per line, three patterns are tried in order — backticked path, bare
/// bulleted path, table row — and the first match wins. The action is
/// inferred from keyword search over the line plus its description, except
/// for table rows which carry an explicit action column.
pub fn extract_patch_plan(content: &str) -> Vec<PatchPlanItem> {
    let sections = parse_sections(content);
    let Some(body) = PLAN_SECTIONS.iter().find_map(|name| sections.get(name)) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(c) = backtick_re().captures(line) {
            let description = c[2].trim().to_string();
            items.push(PatchPlanItem {
                file: c[1].to_string(),
                action: FileAction::infer(line, &description),
                description,
            });
            continue;
        }

        if let Some(c) = bullet_re().captures(line) {
            let description = c[2].trim().to_string();
            items.push(PatchPlanItem {
                file: c[1].to_string(),
                action: FileAction::infer(line, &description),
                description,
            });
            continue;
        }

        if let Some(c) = table_re().captures(line) {
            items.push(PatchPlanItem {
                file: c[1].to_string(),
                action: c[2].parse().unwrap_or(FileAction::Modify),
                description: c[3].trim().to_string(),
            });
        }
    }

    items
}

// ---------------------------------------------------------------------------
// Cook ID
// ---------------------------------------------------------------------------

static COOK_ID_RE: OnceLock<Regex> = OnceLock::new();
static COOK_TAG_RE: OnceLock<Regex> = OnceLock::new();

fn cook_id_re() -> &'static Regex {
    COOK_ID_RE.get_or_init(|| Regex::new(r"([^/]+)\.(\d{4}-\d{2}-\d{2})\.cook\.md").unwrap())
}

pub(crate) fn cook_tag_re() -> &'static Regex {
    COOK_TAG_RE.get_or_init(|| Regex::new(r"\[cook:([^\]]+)\]").unwrap())
}

/// Extract the cook ID from a filename (preferred) or a `[cook:<id>]` tag
/// found in content.
pub fn extract_cook_id(filename_or_content: &str) -> Option<String> {
    if let Some(c) = cook_id_re().captures(filename_or_content) {
        return Some(format!("{}.{}", &c[1], &c[2]));
    }
    cook_tag_re()
        .captures(filename_or_content)
        .map(|c| c[1].to_string())
}

// ---------------------------------------------------------------------------
// Section diffing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SectionChange {
    pub name: String,
    pub before: String,
    pub after: String,
    pub summary: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SectionDiff {
    pub added: Vec<(String, String)>,
    pub removed: Vec<(String, String)>,
    pub modified: Vec<SectionChange>,
    pub unchanged: Vec<String>,
}

/// Compare two section maps.
pub fn diff_sections(a: &Sections, b: &Sections) -> SectionDiff {
    let mut diff = SectionDiff::default();

    for (name, content_a) in a.iter() {
        match b.get(name) {
            None => diff.removed.push((name.to_string(), content_a.to_string())),
            Some(content_b) if content_b != content_a => diff.modified.push(SectionChange {
                name: name.to_string(),
                before: content_a.to_string(),
                after: content_b.to_string(),
                summary: modification_summary(content_a, content_b),
            }),
            Some(_) => diff.unchanged.push(name.to_string()),
        }
    }

    for (name, content_b) in b.iter() {
        if !a.contains(name) {
            diff.added.push((name.to_string(), content_b.to_string()));
        }
    }

    diff
}

fn sample(line: &str) -> String {
    // Truncation point must land on a char boundary.
    match line.char_indices().nth(50) {
        Some((idx, _)) => format!("{}...", &line[..idx]),
        None => line.to_string(),
    }
}

/// One to three bullets describing how a section body changed.
fn modification_summary(before: &str, after: &str) -> Vec<String> {
    let lines_a: Vec<&str> = before.lines().filter(|l| !l.trim().is_empty()).collect();
    let lines_b: Vec<&str> = after.lines().filter(|l| !l.trim().is_empty()).collect();

    let mut summary = Vec::new();

    if let Some(added) = lines_b.iter().find(|l| !lines_a.contains(l)) {
        summary.push(format!("Added: \"{}\"", sample(added)));
    }
    if let Some(removed) = lines_a.iter().find(|l| !lines_b.contains(l)) {
        summary.push(format!("Removed: \"{}\"", sample(removed)));
    }

    let delta = lines_b.len() as i64 - lines_a.len() as i64;
    if delta != 0 && summary.len() < 3 {
        summary.push(format!("{delta:+} lines"));
    }

    summary.truncate(3);
    summary
}

// ---------------------------------------------------------------------------
// In-place document updates
// ---------------------------------------------------------------------------

/// Replace the first token of the `## Status` section. Returns the content
/// unchanged when no Status section exists.
pub fn update_status(content: &str, new_status: ArtifactStatus) -> String {
    static STATUS_RE: OnceLock<Regex> = OnceLock::new();
    let re = STATUS_RE
        .get_or_init(|| Regex::new(r"(?m)^(## Status\s*\n+)(\w[\w-]*)").unwrap());

    re.replace(content, |c: &regex::Captures<'_>| {
        format!("{}{}", &c[1], new_status)
    })
    .into_owned()
}

/// Prepend a dated entry under `## Changelog`, creating the section at the
/// end of the document when absent. Entries are never rewritten in place.
pub fn add_changelog_entry(content: &str, entry: &str, date: &str) -> String {
    static HEADING_RE: OnceLock<Regex> = OnceLock::new();
    let re = HEADING_RE.get_or_init(|| Regex::new(r"(?m)^## Changelog\s*\n").unwrap());

    let new_entry = format!("{date}: {entry}");
    if let Some(m) = re.find(content) {
        let mut out = String::with_capacity(content.len() + new_entry.len() + 1);
        out.push_str(&content[..m.end()]);
        out.push_str(&new_entry);
        out.push('\n');
        out.push_str(&content[m.end()..]);
        out
    } else {
        format!("{content}\n\n## Changelog\n{new_entry}\n")
    }
}

// ---------------------------------------------------------------------------
// Implementation Status section
// ---------------------------------------------------------------------------

/// Parsed `## Implementation Status` section, appended by the system once
/// execution starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImplementationStatus {
    pub execution: Option<String>,
    pub branch: Option<String>,
    pub pr: Option<u32>,
    pub pr_url: Option<String>,
    pub commits: u32,
    pub cook_tag: Option<String>,
    pub coverage: Option<String>,
    pub unplanned_changes: Option<String>,
    pub foreign_commits: Vec<String>,
    pub untracked_changes: Vec<String>,
    pub last_activity: Option<String>,
}

fn indented_list_after<'a>(lines: &[&'a str], start: usize) -> Vec<String> {
    let mut out = Vec::new();
    for line in &lines[start + 1..] {
        let trimmed = line.trim_start();
        if (line.starts_with("  ") || line.starts_with('\t')) && trimmed.starts_with("- ") {
            out.push(trimmed.trim_start_matches("- ").trim().to_string());
        } else if !line.starts_with("  ") {
            break;
        }
    }
    out
}

/// Parse the Implementation Status section, `None` when absent.
pub fn parse_implementation_status(content: &str) -> Option<ImplementationStatus> {
    let sections = parse_sections(content);
    let body = sections.get("Implementation Status")?;

    static EXEC_RE: OnceLock<Regex> = OnceLock::new();
    static BRANCH_RE: OnceLock<Regex> = OnceLock::new();
    static PR_RE: OnceLock<Regex> = OnceLock::new();
    static PR_URL_RE: OnceLock<Regex> = OnceLock::new();
    static COMMITS_RE: OnceLock<Regex> = OnceLock::new();
    static COVERAGE_RE: OnceLock<Regex> = OnceLock::new();
    static UNPLANNED_RE: OnceLock<Regex> = OnceLock::new();
    static ACTIVITY_RE: OnceLock<Regex> = OnceLock::new();
    static FOREIGN_RE: OnceLock<Regex> = OnceLock::new();

    let exec_re =
        EXEC_RE.get_or_init(|| Regex::new(r"(?i)(?:Status|Execution):\s*(\S+)").unwrap());
    let branch_re = BRANCH_RE.get_or_init(|| Regex::new(r"(?i)Branch:\s*(\S+)").unwrap());
    let pr_re = PR_RE.get_or_init(|| Regex::new(r"(?i)PR:\s*#?(\d+)").unwrap());
    let pr_url_re =
        PR_URL_RE.get_or_init(|| Regex::new(r"(?i)PR:.*?(https://github\.com/[^\s)]+)").unwrap());
    // Anchored to the list-item start so "- Foreign commits: N" cannot match.
    let commits_re =
        COMMITS_RE.get_or_init(|| Regex::new(r"(?i)^[-*\s]*Commits:\s*(\d+)").unwrap());
    let coverage_re =
        COVERAGE_RE.get_or_init(|| Regex::new(r"(?i)Coverage:\s*(\d+/\d+)").unwrap());
    let unplanned_re =
        UNPLANNED_RE.get_or_init(|| Regex::new(r"(?i)Unplanned changes:\s*(.+)").unwrap());
    let activity_re =
        ACTIVITY_RE.get_or_init(|| Regex::new(r"(?i)Last activity:\s*(.+)").unwrap());
    let foreign_re =
        FOREIGN_RE.get_or_init(|| Regex::new(r"(?i)Foreign commits:\s*(\d+)").unwrap());

    let mut status = ImplementationStatus::default();
    let lines: Vec<&str> = body.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if let Some(c) = exec_re.captures(line) {
            status.execution = Some(c[1].to_lowercase());
        }
        if let Some(c) = branch_re.captures(line) {
            status.branch = Some(c[1].replace(['(', ')'], ""));
        }
        if let Some(c) = pr_re.captures(line) {
            status.pr = c[1].parse().ok();
        }
        if let Some(c) = pr_url_re.captures(line) {
            status.pr_url = Some(c[1].to_string());
        }
        if let Some(c) = commits_re.captures(line) {
            status.commits = c[1].parse().unwrap_or(0);
        }
        if let Some(c) = cook_tag_re().captures(line) {
            status.cook_tag = Some(c[1].to_string());
        }
        if let Some(c) = coverage_re.captures(line) {
            status.coverage = Some(c[1].to_string());
        }
        if let Some(c) = unplanned_re.captures(line) {
            status.unplanned_changes = Some(c[1].trim().to_string());
        }
        if let Some(c) = activity_re.captures(line) {
            status.last_activity = Some(c[1].trim().to_string());
        }
        if let Some(c) = foreign_re.captures(line) {
            if c[1].parse::<u32>().unwrap_or(0) > 0 {
                status.foreign_commits = indented_list_after(&lines, i);
            }
        }
        if line.contains("UNTRACKED CHANGES DETECTED") {
            status.untracked_changes = indented_list_after(&lines, i);
        }
    }

    Some(status)
}

/// Fields written into the Implementation Status section. The section is
/// fully replaced on each update, never merged.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub execution: Option<String>,
    pub branch: Option<String>,
    pub branch_created: bool,
    pub pr: Option<u32>,
    pub pr_url: Option<String>,
    pub commits: Option<u32>,
    pub cook_tag: Option<String>,
    pub coverage: Option<String>,
    pub unplanned_changes: Option<String>,
    pub foreign_commits: Vec<String>,
    pub untracked_changes: Vec<String>,
}

fn render_status_section(updates: &StatusUpdate, now: &str) -> String {
    let mut s = String::from("## Implementation Status\n");
    s.push_str(&format!(
        "- Status: {}\n",
        updates.execution.as_deref().unwrap_or("planned")
    ));

    if let Some(branch) = &updates.branch {
        s.push_str(&format!("- Branch: {branch}"));
        if updates.branch_created {
            s.push_str(" (auto-created)");
        }
        s.push('\n');
    }

    if let Some(pr) = updates.pr {
        s.push_str(&format!("- PR: #{pr}"));
        if let Some(url) = &updates.pr_url {
            s.push_str(&format!(" ({url})"));
        }
        s.push('\n');
    }

    if let Some(commits) = updates.commits {
        s.push_str(&format!("- Commits: {commits}"));
        if let Some(tag) = &updates.cook_tag {
            s.push_str(&format!(" [cook:{tag}]"));
        }
        s.push('\n');
    }

    if let Some(coverage) = &updates.coverage {
        s.push_str(&format!("- Coverage: {coverage}\n"));
    }

    if let Some(unplanned) = &updates.unplanned_changes {
        let text = if unplanned.is_empty() { "none" } else { unplanned };
        s.push_str(&format!("- Unplanned changes: {text}\n"));
    }

    if !updates.foreign_commits.is_empty() {
        s.push_str(&format!(
            "- Foreign commits: {}\n",
            updates.foreign_commits.len()
        ));
        for fc in &updates.foreign_commits {
            s.push_str(&format!("  - {fc}\n"));
        }
    }

    if !updates.untracked_changes.is_empty() {
        s.push_str("- UNTRACKED CHANGES DETECTED:\n");
        for uc in &updates.untracked_changes {
            s.push_str(&format!("  - {uc}\n"));
        }
    }

    s.push_str(&format!("- Last activity: {now}\n"));
    s
}

/// Replace or insert the Implementation Status section.
///
/// Replacement is bounded by the `## Implementation Status` line and the
/// next `## ` heading (or end of file); the rest of the document is
/// preserved byte-for-byte. When the section does not exist it is inserted
/// after the Cooking Mode section (Status if absent), else appended.
/// Idempotent: reapplying identical updates changes only `Last activity`.
pub fn update_implementation_status(content: &str, updates: &StatusUpdate, now: &str) -> String {
    let new_section = render_status_section(updates, now);
    let lines: Vec<&str> = content.lines().collect();

    // The section is rebuilt with exactly one blank line on each side, so
    // reapplying identical updates reproduces the document byte-for-byte
    // (modulo the Last activity timestamp).
    let splice = |before: &str, after: &str| -> String {
        let mut out = String::with_capacity(content.len() + new_section.len());
        if !before.trim().is_empty() {
            out.push_str(before.trim_end());
            out.push_str("\n\n");
        }
        out.push_str(new_section.trim_end());
        out.push('\n');
        if !after.trim().is_empty() {
            out.push('\n');
            out.push_str(after);
        }
        out
    };

    // Replace existing section.
    if let Some(start) = lines
        .iter()
        .position(|l| l.starts_with("## Implementation Status"))
    {
        let end = lines[start + 1..]
            .iter()
            .position(|l| l.starts_with("## "))
            .map(|i| start + 1 + i)
            .unwrap_or(lines.len());

        return splice(&lines[..start].join("\n"), &lines[end..].join("\n"));
    }

    // Insert after Cooking Mode (or Status) section.
    let sections = parse_sections(content);
    let anchor = if sections.contains("Cooking Mode") {
        "## Cooking Mode"
    } else {
        "## Status"
    };

    if let Some(start) = lines.iter().position(|l| l.starts_with(anchor)) {
        let insert_at = lines[start + 1..]
            .iter()
            .position(|l| l.starts_with("## "))
            .map(|i| start + 1 + i)
            .unwrap_or(lines.len());

        return splice(&lines[..insert_at].join("\n"), &lines[insert_at..].join("\n"));
    }

    // No anchor section either: append at end.
    format!("{}\n\n{new_section}", content.trim_end())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# user-auth

## Dish
Add OAuth login flow

## Status
cooking

## Cooking Mode
well-done

## Ownership
- Decision Owner: @casey

## Implementation Plan
- `src/auth/oauth.ts` - new file with OAuth client
- `src/login.ts` - wire in the new flow
- src/session.ts: persist refresh tokens
| src/config.ts | modify | add client id setting |

## Changelog
2026-02-02: plan approved
2026-02-01: artifact created
";

    #[test]
    fn parse_fails_on_missing_file() {
        let err = parse(Path::new("/nonexistent/x.2026-01-01.cook.md")).unwrap_err();
        assert!(matches!(err, CookError::ArtifactNotFound(_)));
    }

    #[test]
    fn parse_reads_identity_from_filename() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkout-flow.2026-03-01.cook.md");
        std::fs::write(&path, SAMPLE).unwrap();

        let artifact = parse(&path).unwrap();
        assert_eq!(artifact.slug, "checkout-flow");
        assert_eq!(artifact.date.as_deref(), Some("2026-03-01"));
    }

    #[test]
    fn header_fields() {
        let header = parse_header(SAMPLE);
        assert_eq!(header.title.as_deref(), Some("Add OAuth login flow"));
        assert_eq!(header.status, Some(ArtifactStatus::Cooking));
        assert_eq!(header.mode, Some(CookingMode::WellDone));
        assert_eq!(header.owner.as_deref(), Some("@casey"));
    }

    #[test]
    fn sections_preserve_order_and_trim() {
        let sections = parse_sections(SAMPLE);
        let names: Vec<&str> = sections.names().collect();
        assert_eq!(names[0], "Dish");
        assert_eq!(names[1], "Status");
        assert_eq!(sections.get("Status"), Some("cooking"));
        assert!(sections.get("Implementation Plan").unwrap().starts_with("- `src/"));
    }

    #[test]
    fn duplicate_heading_last_wins_keeps_position() {
        let doc = "## A\nfirst\n\n## B\nmid\n\n## A\nsecond\n";
        let sections = parse_sections(doc);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections.get("A"), Some("second"));
        let names: Vec<&str> = sections.names().collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn section_round_trip() {
        let doc = "## One\nalpha\nbeta\n\n## Two\ngamma\n";
        let sections = parse_sections(doc);
        let rebuilt: String = sections
            .iter()
            .map(|(n, c)| format!("## {n}\n{c}\n\n"))
            .collect();
        let reparsed = parse_sections(&rebuilt);
        for (name, content) in sections.iter() {
            assert_eq!(reparsed.get(name), Some(content));
        }
    }

    #[test]
    fn changelog_entries_in_document_order() {
        let entries = parse_changelog(SAMPLE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].date, "2026-02-02");
        assert_eq!(entries[1].summary, "artifact created");
    }

    #[test]
    fn changelog_filter_since() {
        let entries = parse_changelog(SAMPLE);
        let recent = filter_changelog_since(&entries, "2026-02-02");
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].date, "2026-02-02");
    }

    #[test]
    fn patch_plan_all_three_patterns() {
        let plan = extract_patch_plan(SAMPLE);
        assert_eq!(plan.len(), 4);

        assert_eq!(plan[0].file, "src/auth/oauth.ts");
        assert_eq!(plan[0].action, FileAction::Create);
        assert_eq!(plan[1].file, "src/login.ts");
        assert_eq!(plan[1].action, FileAction::Modify);
        assert_eq!(plan[2].file, "src/session.ts");
        assert_eq!(plan[3].file, "src/config.ts");
        assert_eq!(plan[3].action, FileAction::Modify);
        assert_eq!(plan[3].description, "add client id setting");
    }

    #[test]
    fn patch_plan_absent_section() {
        assert!(extract_patch_plan("## Dish\nNothing planned\n").is_empty());
    }

    #[test]
    fn cook_id_from_filename_and_tag() {
        assert_eq!(
            extract_cook_id("cook/user-auth.2026-01-15.cook.md").as_deref(),
            Some("user-auth.2026-01-15")
        );
        assert_eq!(
            extract_cook_id("fix bug [cook:user-auth.2026-01-15]").as_deref(),
            Some("user-auth.2026-01-15")
        );
        assert_eq!(extract_cook_id("no id here"), None);
    }

    #[test]
    fn diff_sections_classifies_changes() {
        let a = parse_sections("## Keep\nsame\n\n## Gone\nbye\n\n## Edit\nold line\n");
        let b = parse_sections("## Keep\nsame\n\n## Edit\nnew line\n\n## New\nhello\n");
        let diff = diff_sections(&a, &b);

        assert_eq!(diff.unchanged, vec!["Keep"]);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.removed[0].0, "Gone");
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.added[0].0, "New");
        assert_eq!(diff.modified.len(), 1);
        assert_eq!(diff.modified[0].name, "Edit");
        assert!(diff.modified[0].summary[0].starts_with("Added:"));
    }

    #[test]
    fn diff_sections_truncates_long_lines_on_char_boundary() {
        // 49 ASCII chars, then a two-byte char straddling the 50-byte mark.
        let long = format!("{}établir une longue description", "x".repeat(49));
        let a = parse_sections("## Edit\nold line\n");
        let b = parse_sections(&format!("## Edit\n{long}\n"));
        let diff = diff_sections(&a, &b);

        assert_eq!(diff.modified.len(), 1);
        let summary = &diff.modified[0].summary[0];
        assert!(summary.starts_with("Added:"));
        assert!(summary.ends_with("...\""));
    }

    #[test]
    fn update_status_replaces_token() {
        let updated = update_status(SAMPLE, ArtifactStatus::WellDone);
        assert!(updated.contains("## Status\nwell-done"));
        assert!(!updated.contains("## Status\ncooking"));
    }

    #[test]
    fn add_changelog_entry_prepends() {
        let updated = add_changelog_entry(SAMPLE, "coverage check passed", "2026-02-03");
        let entries = parse_changelog(&updated);
        assert_eq!(entries[0].date, "2026-02-03");
        assert_eq!(entries[0].summary, "coverage check passed");
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn add_changelog_entry_creates_section() {
        let updated = add_changelog_entry("## Dish\nX\n", "started", "2026-02-03");
        assert!(updated.contains("## Changelog\n2026-02-03: started"));
    }

    #[test]
    fn parse_implementation_status_keeps_commit_and_foreign_counts_apart() {
        let content = "## Implementation Status\n\
                       - Status: in_progress\n\
                       - Commits: 3 [cook:user-auth.2026-01-15]\n\
                       - Foreign commits: 1\n\
                       \x20 - abc1234 unrelated fix\n\
                       - Last activity: 2026-02-03 10:00\n";
        let parsed = parse_implementation_status(content).unwrap();

        assert_eq!(parsed.commits, 3);
        assert_eq!(parsed.foreign_commits, vec!["abc1234 unrelated fix"]);
    }

    #[test]
    fn implementation_status_round_trip() {
        let updates = StatusUpdate {
            execution: Some("in_progress".into()),
            branch: Some("cook/user-auth".into()),
            branch_created: true,
            pr: Some(42),
            pr_url: Some("https://github.com/acme/app/pull/42".into()),
            commits: Some(3),
            cook_tag: Some("user-auth.2026-01-15".into()),
            coverage: Some("2/3".into()),
            unplanned_changes: Some(String::new()),
            foreign_commits: vec!["abc1234 unrelated fix".into()],
            untracked_changes: vec![],
        };

        let updated = update_implementation_status(SAMPLE, &updates, "2026-02-03 10:00");
        let parsed = parse_implementation_status(&updated).unwrap();

        assert_eq!(parsed.execution.as_deref(), Some("in_progress"));
        assert_eq!(parsed.branch.as_deref(), Some("cook/user-auth"));
        assert_eq!(parsed.pr, Some(42));
        assert_eq!(
            parsed.pr_url.as_deref(),
            Some("https://github.com/acme/app/pull/42")
        );
        assert_eq!(parsed.commits, 3);
        assert_eq!(parsed.cook_tag.as_deref(), Some("user-auth.2026-01-15"));
        assert_eq!(parsed.coverage.as_deref(), Some("2/3"));
        assert_eq!(parsed.unplanned_changes.as_deref(), Some("none"));
        assert_eq!(parsed.foreign_commits, vec!["abc1234 unrelated fix"]);
        assert_eq!(parsed.last_activity.as_deref(), Some("2026-02-03 10:00"));
    }

    #[test]
    fn status_update_inserted_after_cooking_mode() {
        let updates = StatusUpdate {
            execution: Some("planned".into()),
            ..Default::default()
        };
        let updated = update_implementation_status(SAMPLE, &updates, "2026-02-03 10:00");

        let names: Vec<String> = parse_sections(&updated)
            .names()
            .map(str::to_string)
            .collect();
        let mode_idx = names.iter().position(|n| n == "Cooking Mode").unwrap();
        assert_eq!(names[mode_idx + 1], "Implementation Status");
    }

    #[test]
    fn status_update_idempotent_modulo_last_activity() {
        let updates = StatusUpdate {
            execution: Some("in_progress".into()),
            branch: Some("cook/user-auth".into()),
            commits: Some(2),
            ..Default::default()
        };
        let once = update_implementation_status(SAMPLE, &updates, "2026-02-03 10:00");
        let twice = update_implementation_status(&once, &updates, "2026-02-03 10:05");

        let strip = |s: &str| {
            s.lines()
                .filter(|l| !l.starts_with("- Last activity:"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip(&once), strip(&twice));
        assert!(twice.contains("- Last activity: 2026-02-03 10:05"));
    }

    #[test]
    fn status_update_preserves_rest_of_document() {
        let updates = StatusUpdate::default();
        let updated = update_implementation_status(SAMPLE, &updates, "2026-02-03 10:00");
        assert!(updated.contains("Add OAuth login flow"));
        assert!(updated.contains("2026-02-01: artifact created"));
        assert_eq!(extract_patch_plan(&updated).len(), 4);
    }
}
