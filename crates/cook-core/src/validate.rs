//! Artifact validation against mode-specific requirements.
//!
//! Ten checks that catch thin or placeholder planning before any
//! implementation starts. ERROR failures make the artifact invalid,
//! WARNING failures are advisory.

use crate::artifact::{Artifact, Sections};
use crate::types::{CookingMode, Severity};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

const WELL_DONE_SECTIONS: &[&str] = &[
    "Dish",
    "Status",
    "Cooking Mode",
    "Ownership",
    "Scope",
    "Pre-mortem",
    "Trade-offs",
    "Implementation Plan",
    "QA Plan",
    "Security Review",
];

const MICROWAVE_SECTIONS: &[&str] = &[
    "Dish",
    "Status",
    "Cooking Mode",
    "Problem Statement",
    "Fix Plan",
    "Why Safe",
    "Tests",
];

pub fn required_sections(mode: CookingMode) -> &'static [&'static str] {
    match mode {
        CookingMode::WellDone => WELL_DONE_SECTIONS,
        CookingMode::Microwave => MICROWAVE_SECTIONS,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub check_id: &'static str,
    pub passed: bool,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl CheckResult {
    fn pass(check_id: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        CheckResult {
            check_id,
            passed: true,
            severity,
            message: message.into(),
            details: None,
        }
    }

    fn fail(
        check_id: &'static str,
        severity: Severity,
        message: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        CheckResult {
            check_id,
            passed: false,
            severity,
            message: message.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub mode: CookingMode,
    pub results: Vec<CheckResult>,
    pub error_count: usize,
    pub warning_count: usize,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Slice of `content` from `heading` up to the next `###` heading.
fn subsection<'a>(content: &'a str, heading: &str) -> Option<&'a str> {
    let lower = content.to_lowercase();
    let start = lower.find(&heading.to_lowercase())?;
    let rest = &content[start..];
    let end = rest[heading.len()..]
        .find("\n###")
        .map_or(rest.len(), |i| heading.len() + i);
    Some(&rest[..end])
}

fn premortem_section(sections: &Sections) -> Option<&str> {
    sections.iter().find_map(|(name, content)| {
        let lower = name.to_lowercase();
        if lower.contains("pre-mortem") || lower.contains("premortem") {
            Some(content)
        } else {
            None
        }
    })
}

fn strip_comments(content: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").unwrap())
        .replace_all(content, "")
        .to_string()
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

fn check_no_scope(artifact: &Artifact, mode: CookingMode) -> Option<CheckResult> {
    if mode != CookingMode::WellDone {
        return None;
    }
    let scope = artifact.sections.get("Scope").unwrap_or("");
    let has_in = subsection(scope, "### In Scope").is_some();
    let has_out = subsection(scope, "### Out of Scope").is_some();

    if !has_in || !has_out {
        let mut missing = Vec::new();
        if !has_in {
            missing.push("In Scope");
        }
        if !has_out {
            missing.push("Out of Scope");
        }
        return Some(CheckResult::fail(
            "no-scope",
            Severity::Error,
            format!("Missing {} subsection(s)", missing.join(" and ")),
            "Add ### In Scope and ### Out of Scope under ## Scope",
        ));
    }
    Some(CheckResult::pass(
        "no-scope",
        Severity::Error,
        "Scope sections present",
    ))
}

fn check_no_premortem(artifact: &Artifact, _mode: CookingMode) -> Option<CheckResult> {
    if premortem_section(&artifact.sections).is_none() {
        return Some(CheckResult::fail(
            "no-premortem",
            Severity::Error,
            "Missing Pre-mortem section",
            "Add ## Pre-mortem with failure scenarios and mitigations",
        ));
    }
    Some(CheckResult::pass(
        "no-premortem",
        Severity::Error,
        "Pre-mortem present",
    ))
}

fn check_thin_premortem(artifact: &Artifact, mode: CookingMode) -> Option<CheckResult> {
    if mode != CookingMode::WellDone {
        return None;
    }
    let premortem = premortem_section(&artifact.sections)?;

    static RE: OnceLock<Regex> = OnceLock::new();
    let count = RE
        .get_or_init(|| Regex::new(r"(?m)^\d+\.\s+\*?\*?[^*\n]").unwrap())
        .find_iter(premortem)
        .count();

    if count < 3 {
        return Some(CheckResult::fail(
            "thin-premortem",
            Severity::Warning,
            format!("Pre-mortem has {count} scenario(s), need 3+"),
            "Add more failure scenarios with mitigations",
        ));
    }
    Some(CheckResult::pass(
        "thin-premortem",
        Severity::Warning,
        format!("Pre-mortem ({count} scenarios)"),
    ))
}

fn check_no_alternatives(artifact: &Artifact, mode: CookingMode) -> Option<CheckResult> {
    if mode != CookingMode::WellDone {
        return None;
    }
    let tradeoffs = artifact.sections.get("Trade-offs").unwrap_or("");

    static REJECTED_RE: OnceLock<Regex> = OnceLock::new();
    static LISTED_RE: OnceLock<Regex> = OnceLock::new();
    let has_alternatives = REJECTED_RE
        .get_or_init(|| Regex::new(r"(?i)rejected\s+(alternative|because|due)").unwrap())
        .is_match(tradeoffs)
        || LISTED_RE
            .get_or_init(|| Regex::new(r"(?is)alternatives?\s*:?.*?-").unwrap())
            .is_match(tradeoffs);

    if !has_alternatives {
        return Some(CheckResult::fail(
            "no-alternatives",
            Severity::Warning,
            "No rejected alternatives documented",
            "Document at least one alternative that was considered",
        ));
    }
    Some(CheckResult::pass(
        "no-alternatives",
        Severity::Warning,
        "Alternatives documented",
    ))
}

fn check_missing_tests(artifact: &Artifact, mode: CookingMode) -> Option<CheckResult> {
    let qa = artifact.sections.get("QA Plan").unwrap_or("");
    let tests = artifact.sections.get("Tests").unwrap_or("");
    let qa_status = artifact.sections.get("QA Status").unwrap_or("");

    let test_cases = subsection(qa, "### Test Cases").unwrap_or("");
    let combined = format!("{test_cases}{tests}{qa_status}");

    static RE: OnceLock<Regex> = OnceLock::new();
    let count = RE
        .get_or_init(|| Regex::new(r"(?m)^\s*(?:\d+[.)]\s+|[-*]\s+).+").unwrap())
        .find_iter(&combined)
        .count();

    let min_tests = match mode {
        CookingMode::WellDone => 3,
        CookingMode::Microwave => 1,
    };

    if count < min_tests {
        return Some(CheckResult::fail(
            "missing-tests",
            Severity::Error,
            format!("Found {count} test case(s), need {min_tests}+"),
            format!("{mode} mode requires at least {min_tests} test case(s)"),
        ));
    }
    Some(CheckResult::pass(
        "missing-tests",
        Severity::Error,
        format!("Test cases ({count} defined)"),
    ))
}

fn check_no_rollback(artifact: &Artifact, mode: CookingMode) -> Option<CheckResult> {
    if mode != CookingMode::WellDone {
        return None;
    }
    let blast = artifact.sections.get("Blast Radius & Rollout").unwrap_or("");

    static STEP_RE: OnceLock<Regex> = OnceLock::new();
    static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();
    let has_rollback = subsection(blast, "### Rollback").is_some()
        || STEP_RE
            .get_or_init(|| Regex::new(r"(?i)rollback\s+(step|plan)").unwrap())
            .is_match(blast)
        || NUMBERED_RE
            .get_or_init(|| Regex::new(r"(?im)^\s*\d+\.\s+.+rollback").unwrap())
            .is_match(blast);

    if !has_rollback {
        return Some(CheckResult::fail(
            "no-rollback",
            Severity::Warning,
            "Missing rollback plan",
            "Add ### Rollback Steps with numbered steps",
        ));
    }
    Some(CheckResult::pass(
        "no-rollback",
        Severity::Warning,
        "Rollback plan present",
    ))
}

fn check_no_owner(artifact: &Artifact, mode: CookingMode) -> Option<CheckResult> {
    if mode != CookingMode::WellDone {
        return None;
    }
    if artifact.header.owner.is_some() {
        return Some(CheckResult::pass(
            "no-owner",
            Severity::Error,
            "Ownership assigned",
        ));
    }

    let ownership = artifact.sections.get("Ownership").unwrap_or("");
    static RE: OnceLock<Regex> = OnceLock::new();
    let has_owner = RE
        .get_or_init(|| Regex::new(r"(?i)Decision Owner:\s*\S+").unwrap())
        .is_match(ownership);

    if !has_owner {
        return Some(CheckResult::fail(
            "no-owner",
            Severity::Error,
            "No Decision Owner assigned",
            "Add \"- Decision Owner: @name\" in Ownership section",
        ));
    }
    Some(CheckResult::pass(
        "no-owner",
        Severity::Error,
        "Ownership assigned",
    ))
}

fn check_tbd_sections(artifact: &Artifact, _mode: CookingMode) -> Option<CheckResult> {
    static MARKER_RE: OnceLock<Regex> = OnceLock::new();
    static COMMENT_RE: OnceLock<Regex> = OnceLock::new();
    let marker_re =
        MARKER_RE.get_or_init(|| Regex::new(r"(?i)\bTBD\b|\bTODO\b|\bFIXME\b").unwrap());
    let comment_re = COMMENT_RE
        .get_or_init(|| Regex::new(r"(?is)<!--.*?(TBD|TODO|FIXME).*?-->").unwrap());

    let mut flagged = Vec::new();
    for (name, content) in artifact.sections.iter() {
        // Markers inside HTML comments are template guidance, not gaps.
        if marker_re.is_match(content) && !comment_re.is_match(content) {
            flagged.push(name);
        }
    }

    if !flagged.is_empty() {
        return Some(CheckResult::fail(
            "tbd-sections",
            Severity::Error,
            format!("TBD/TODO found in {} section(s)", flagged.len()),
            format!("Sections: {}", flagged.join(", ")),
        ));
    }
    Some(CheckResult::pass(
        "tbd-sections",
        Severity::Error,
        "No TBD placeholders",
    ))
}

fn check_empty_section(artifact: &Artifact, mode: CookingMode) -> Option<CheckResult> {
    static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();
    let placeholder_re =
        PLACEHOLDER_RE.get_or_init(|| Regex::new(r"(?s)^<.*>$").unwrap());

    let mut empty = Vec::new();
    for name in required_sections(mode) {
        let content = artifact.sections.find_by_prefix(name).unwrap_or("");
        let stripped = strip_comments(content);
        let stripped = stripped.trim();
        if stripped.len() < 5 || placeholder_re.is_match(stripped) {
            empty.push(*name);
        }
    }

    if !empty.is_empty() {
        return Some(CheckResult::fail(
            "empty-section",
            Severity::Error,
            format!("{} required section(s) empty", empty.len()),
            format!("Empty: {}", empty.join(", ")),
        ));
    }
    Some(CheckResult::pass(
        "empty-section",
        Severity::Error,
        "Required sections populated",
    ))
}

/// Words too generic to signal creep on their own.
const CREEP_STOP_WORDS: &[&str] = &[
    "feature", "future", "work", "later", "scope", "phase", "version", "release", "nothing",
];

const CREEP_MIN_KEYWORD_LEN: usize = 8;

fn check_scope_creep(artifact: &Artifact, _mode: CookingMode) -> Option<CheckResult> {
    let scope = artifact.sections.get("Scope").unwrap_or("");
    let impl_plan = artifact
        .sections
        .get("Implementation Plan")
        .or_else(|| artifact.sections.get("Fix Plan"))
        .or_else(|| artifact.sections.get("Patch Plan"))
        .unwrap_or("");

    let out_of_scope = subsection(scope, "### Out of Scope")?;
    let items: Vec<String> = out_of_scope
        .lines()
        .filter(|line| {
            let t = line.trim_start();
            t.starts_with('-') || t.starts_with('*')
        })
        .map(|line| {
            line.trim_start()
                .trim_start_matches(['-', '*'])
                .trim()
                .to_lowercase()
        })
        .filter(|item| !item.is_empty())
        .collect();

    if items.is_empty() {
        return None;
    }

    let impl_lower = impl_plan.to_lowercase();
    let creep: Vec<&String> = items
        .iter()
        .filter(|item| {
            item.split_whitespace()
                .map(|w| w.chars().filter(|c| c.is_ascii_alphabetic()).collect::<String>())
                .filter(|w| {
                    w.len() >= CREEP_MIN_KEYWORD_LEN && !CREEP_STOP_WORDS.contains(&w.as_str())
                })
                .any(|keyword| impl_lower.contains(&keyword))
        })
        .collect();

    if !creep.is_empty() {
        let sample: Vec<&str> = creep.iter().take(2).map(|s| s.as_str()).collect();
        return Some(CheckResult::fail(
            "scope-creep",
            Severity::Warning,
            "Potential scope creep detected",
            format!(
                "Out-of-scope items may be in implementation: {}",
                sample.join(", ")
            ),
        ));
    }
    Some(CheckResult::pass(
        "scope-creep",
        Severity::Warning,
        "No scope creep detected",
    ))
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

type CheckFn = fn(&Artifact, CookingMode) -> Option<CheckResult>;

const CHECKS: &[CheckFn] = &[
    check_no_scope,
    check_no_premortem,
    check_thin_premortem,
    check_no_alternatives,
    check_missing_tests,
    check_no_rollback,
    check_no_owner,
    check_tbd_sections,
    check_empty_section,
    check_scope_creep,
];

/// Run every applicable check. Valid means zero ERROR failures.
pub fn validate_artifact(
    artifact: &Artifact,
    mode_override: Option<CookingMode>,
    skip_checks: &[String],
) -> ValidationResult {
    let mode = mode_override
        .or(artifact.header.mode)
        .unwrap_or(CookingMode::WellDone);

    let mut results = Vec::new();
    for check in CHECKS {
        let Some(result) = check(artifact, mode) else {
            continue;
        };
        if skip_checks.iter().any(|s| s == result.check_id) {
            continue;
        }
        results.push(result);
    }

    let error_count = results
        .iter()
        .filter(|r| !r.passed && r.severity == Severity::Error)
        .count();
    let warning_count = results
        .iter()
        .filter(|r| !r.passed && r.severity == Severity::Warning)
        .count();

    ValidationResult {
        valid: error_count == 0,
        mode,
        results,
        error_count,
        warning_count,
    }
}

pub fn format_result(result: &ValidationResult, verbose: bool) -> String {
    let mut lines = Vec::new();
    for check in &result.results {
        if check.passed && !verbose {
            continue;
        }
        let icon = if check.passed {
            "[PASS]"
        } else if check.severity == Severity::Error {
            "[FAIL]"
        } else {
            "[WARN]"
        };
        lines.push(format!("{icon} {}", check.message));
        if !check.passed && verbose {
            if let Some(details) = &check.details {
                lines.push(format!("       {details}"));
            }
        }
    }
    lines.join("\n")
}
