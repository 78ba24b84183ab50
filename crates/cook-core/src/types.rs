//! Shared enums for the cook domain.
//!
//! String forms follow the artifact/markdown conventions: statuses and modes
//! are kebab-case tokens, verdicts and item results are SCREAMING_SNAKE.

use crate::error::{CookError, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Artifact status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactStatus {
    Raw,
    Cooking,
    Blocked,
    NeedsMoreCooking,
    WellDone,
    ReadyForMerge,
    Plated,
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactStatus::Raw => "raw",
            ArtifactStatus::Cooking => "cooking",
            ArtifactStatus::Blocked => "blocked",
            ArtifactStatus::NeedsMoreCooking => "needs-more-cooking",
            ArtifactStatus::WellDone => "well-done",
            ArtifactStatus::ReadyForMerge => "ready-for-merge",
            ArtifactStatus::Plated => "plated",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ArtifactStatus {
    type Err = CookError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "raw" => Ok(ArtifactStatus::Raw),
            "cooking" => Ok(ArtifactStatus::Cooking),
            "blocked" => Ok(ArtifactStatus::Blocked),
            "needs-more-cooking" => Ok(ArtifactStatus::NeedsMoreCooking),
            "well-done" => Ok(ArtifactStatus::WellDone),
            "ready-for-merge" => Ok(ArtifactStatus::ReadyForMerge),
            "plated" => Ok(ArtifactStatus::Plated),
            _ => Err(CookError::InvalidSlug(format!("unknown status '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Cooking mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CookingMode {
    WellDone,
    Microwave,
}

impl std::fmt::Display for CookingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CookingMode::WellDone => f.write_str("well-done"),
            CookingMode::Microwave => f.write_str("microwave"),
        }
    }
}

impl std::str::FromStr for CookingMode {
    type Err = CookError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "well-done" => Ok(CookingMode::WellDone),
            "microwave" => Ok(CookingMode::Microwave),
            _ => Err(CookError::InvalidSlug(format!("unknown mode '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Patch plan actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
    Rename,
}

impl std::fmt::Display for FileAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileAction::Create => "create",
            FileAction::Modify => "modify",
            FileAction::Delete => "delete",
            FileAction::Rename => "rename",
        };
        f.write_str(s)
    }
}

impl FileAction {
    /// Infer the action from free text: the plan line plus its description.
    /// Keyword precedence: create > delete > rename, default modify.
    pub fn infer(line: &str, description: &str) -> FileAction {
        let text = format!("{line} {description}").to_lowercase();
        if text.contains("new file") || text.contains("create") || text.contains("add new") {
            FileAction::Create
        } else if text.contains("delete") || text.contains("remove") {
            FileAction::Delete
        } else if text.contains("rename") || text.contains("move") {
            FileAction::Rename
        } else {
            FileAction::Modify
        }
    }
}

impl std::str::FromStr for FileAction {
    type Err = CookError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "create" | "new" | "add" => Ok(FileAction::Create),
            "delete" | "remove" => Ok(FileAction::Delete),
            "rename" | "move" => Ok(FileAction::Rename),
            _ => Ok(FileAction::Modify),
        }
    }
}

// ---------------------------------------------------------------------------
// Change status (git diff --name-status letters)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Unmerged,
}

impl ChangeStatus {
    /// Map a `--name-status` letter (first character, e.g. `R100` -> `R`).
    pub fn from_letter(letter: char) -> ChangeStatus {
        match letter {
            'A' => ChangeStatus::Added,
            'D' => ChangeStatus::Deleted,
            'R' => ChangeStatus::Renamed,
            'C' => ChangeStatus::Copied,
            'U' => ChangeStatus::Unmerged,
            _ => ChangeStatus::Modified,
        }
    }
}

impl std::fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeStatus::Added => "added",
            ChangeStatus::Modified => "modified",
            ChangeStatus::Deleted => "deleted",
            ChangeStatus::Renamed => "renamed",
            ChangeStatus::Copied => "copied",
            ChangeStatus::Unmerged => "unmerged",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Combined outcome of structural and/or semantic verification.
///
/// Ordered so that `max` picks the worse of two verdicts:
/// `Ready < NeedsReview < NeedsWork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ready,
    NeedsReview,
    NeedsWork,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Ready => "READY",
            Verdict::NeedsReview => "NEEDS_REVIEW",
            Verdict::NeedsWork => "NEEDS_WORK",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Verdict {
    type Err = CookError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "READY" => Ok(Verdict::Ready),
            "NEEDS_REVIEW" => Ok(Verdict::NeedsReview),
            "NEEDS_WORK" => Ok(Verdict::NeedsWork),
            _ => Err(CookError::InvalidVerdict(s.to_string())),
        }
    }
}

/// Per-item outcome of semantic verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemResult {
    Pass,
    Partial,
    Fail,
    Skip,
}

impl std::fmt::Display for ItemResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ItemResult::Pass => "PASS",
            ItemResult::Partial => "PARTIAL",
            ItemResult::Fail => "FAIL",
            ItemResult::Skip => "SKIP",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ItemResult {
    type Err = CookError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PASS" => Ok(ItemResult::Pass),
            "PARTIAL" => Ok(ItemResult::Partial),
            "FAIL" => Ok(ItemResult::Fail),
            "SKIP" => Ok(ItemResult::Skip),
            _ => Err(CookError::InvalidVerdict(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Error => f.write_str("ERROR"),
            Severity::Warning => f.write_str("WARNING"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_ordering_picks_worse() {
        assert_eq!(Verdict::Ready.max(Verdict::NeedsReview), Verdict::NeedsReview);
        assert_eq!(
            Verdict::NeedsReview.max(Verdict::NeedsWork),
            Verdict::NeedsWork
        );
        assert_eq!(Verdict::Ready.max(Verdict::Ready), Verdict::Ready);
    }

    #[test]
    fn status_round_trip() {
        for s in [
            "raw",
            "cooking",
            "blocked",
            "needs-more-cooking",
            "well-done",
            "ready-for-merge",
            "plated",
        ] {
            let parsed: ArtifactStatus = s.parse().unwrap();
            assert_eq!(parsed.to_string(), s);
        }
    }

    #[test]
    fn action_inference() {
        assert_eq!(FileAction::infer("- `a.ts` - new file", ""), FileAction::Create);
        assert_eq!(FileAction::infer("- `a.ts`", "remove legacy shim"), FileAction::Delete);
        assert_eq!(FileAction::infer("- `a.ts` - move to core", ""), FileAction::Rename);
        assert_eq!(FileAction::infer("- `a.ts` - tighten types", ""), FileAction::Modify);
    }

    #[test]
    fn change_status_letters() {
        assert_eq!(ChangeStatus::from_letter('A'), ChangeStatus::Added);
        assert_eq!(ChangeStatus::from_letter('R'), ChangeStatus::Renamed);
        assert_eq!(ChangeStatus::from_letter('M'), ChangeStatus::Modified);
        assert_eq!(ChangeStatus::from_letter('?'), ChangeStatus::Modified);
    }
}
