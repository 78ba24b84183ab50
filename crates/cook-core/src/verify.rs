//! Semantic verification framework, layer 2 of 2-layer verification.
//!
//! Builds judge prompts from the patch plan, parses judge responses in the
//! ITEM/SUMMARY format, and provides a heuristic fallback when no judge is
//! available. The judge call itself happens outside this crate.

use crate::artifact::{self, PatchPlanItem};
use crate::coverage::StructuralVerification;
use crate::error::Result;
use crate::types::{FileAction, ItemResult, Verdict};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Verification items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct VerificationItem {
    pub id: usize,
    pub file: String,
    pub intent: String,
    pub action: FileAction,
}

fn item_from_plan(index: usize, item: &PatchPlanItem) -> VerificationItem {
    let intent = if item.description.is_empty() {
        format!("{} {}", item.action, item.file)
    } else {
        item.description.clone()
    };
    VerificationItem {
        id: index + 1,
        file: item.file.clone(),
        intent,
        action: item.action,
    }
}

/// Patch plan entries numbered 1-based for the judge to reference.
pub fn extract_verification_items(artifact_path: &Path) -> Result<Vec<VerificationItem>> {
    let parsed = artifact::parse(artifact_path)?;
    let plan = artifact::extract_patch_plan(&parsed.raw);
    Ok(plan
        .iter()
        .enumerate()
        .map(|(i, item)| item_from_plan(i, item))
        .collect())
}

pub fn read_file_content(root: &Path, file: &str) -> Option<String> {
    std::fs::read_to_string(root.join(file)).ok()
}

// ---------------------------------------------------------------------------
// Prompt building
// ---------------------------------------------------------------------------

const MAX_FILE_CHARS: usize = 5000;

fn truncate_chars(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        return content.to_string();
    }
    let head: String = content.chars().take(max).collect();
    format!("{head}\n... (truncated)")
}

pub fn build_item_prompt(item: &VerificationItem, file_content: &str) -> String {
    format!(
        "Verify if this implementation matches the stated intent.\n\
         \n\
         INTENT: \"{intent}\"\n\
         FILE: {file}\n\
         ACTION: {action}\n\
         \n\
         FILE CONTENT:\n\
         ```\n\
         {content}\n\
         ```\n\
         \n\
         Analyze if the file content fulfills the stated intent. Consider:\n\
         1. Does the code implement what was described?\n\
         2. Are there any obvious logic errors?\n\
         3. Is the implementation complete or partial?\n\
         \n\
         Respond with one of:\n\
         - PASS: Implementation fully matches intent\n\
         - PARTIAL: Implementation exists but incomplete or has minor issues\n\
         - FAIL: Implementation missing or doesn't match intent\n\
         \n\
         Format your response as:\n\
         RESULT: <PASS|PARTIAL|FAIL>\n\
         REASON: <1-2 sentence explanation>\n\
         SUGGESTION: <optional improvement suggestion>",
        intent = item.intent,
        file = item.file,
        action = item.action,
        content = file_content,
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationPrompt {
    pub prompt: String,
    pub items: Vec<VerificationItem>,
    pub file_contents: BTreeMap<String, String>,
}

/// One prompt covering every plan item, file contents inlined and capped.
pub fn build_full_prompt(root: &Path, artifact_path: &Path) -> Result<VerificationPrompt> {
    let items = extract_verification_items(artifact_path)?;

    let mut file_contents = BTreeMap::new();
    for item in &items {
        if let Some(content) = read_file_content(root, &item.file) {
            file_contents.insert(item.file.clone(), content);
        }
    }

    let mut prompt = String::from(
        "# Semantic Verification\n\n\
         Verify that the implementation matches the planned changes from the Patch Plan.\n\n\
         ## Patch Plan Items to Verify:\n\n",
    );

    for item in &items {
        let content = file_contents.get(&item.file);
        prompt.push_str(&format!(
            "\n### Item {}: {}\n- Intent: {}\n- Action: {}\n- File exists: {}\n",
            item.id,
            item.file,
            item.intent,
            item.action,
            if content.is_some() { "Yes" } else { "No" },
        ));
        if let Some(content) = content {
            prompt.push_str(&format!("\n```\n{}\n```\n", truncate_chars(content, MAX_FILE_CHARS)));
        }
    }

    prompt.push_str(
        "\n## Instructions\n\n\
         For each item, determine if the implementation matches the stated intent.\n\n\
         Respond in this format for EACH item:\n\n\
         ITEM <number>:\n\
         - RESULT: <PASS|PARTIAL|FAIL>\n\
         - REASON: <brief explanation>\n\
         - SUGGESTION: <optional, only if PARTIAL or FAIL>\n\n\
         After all items, provide:\n\n\
         SUMMARY:\n\
         - PASS: <count>\n\
         - PARTIAL: <count>\n\
         - FAIL: <count>\n\
         - VERDICT: <READY|NEEDS_REVIEW|NEEDS_WORK>\n",
    );

    Ok(VerificationPrompt {
        prompt,
        items,
        file_contents,
    })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ItemVerification {
    pub id: usize,
    pub file: String,
    pub intent: String,
    pub result: ItemResult,
    pub reason: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ResultCounts {
    pub pass: usize,
    pub partial: usize,
    pub fail: usize,
    pub skip: usize,
}

impl ResultCounts {
    fn tally(results: &[ItemVerification]) -> Self {
        let mut counts = ResultCounts::default();
        for r in results {
            match r.result {
                ItemResult::Pass => counts.pass += 1,
                ItemResult::Partial => counts.partial += 1,
                ItemResult::Fail => counts.fail += 1,
                ItemResult::Skip => counts.skip += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticVerification {
    pub results: Vec<ItemVerification>,
    pub counts: ResultCounts,
    pub verdict: Verdict,
    pub total: usize,
    pub verified: usize,
    pub simplified: bool,
}

static ITEM_HEAD_RE: OnceLock<Regex> = OnceLock::new();
static RESULT_RE: OnceLock<Regex> = OnceLock::new();
static REASON_RE: OnceLock<Regex> = OnceLock::new();
static SUGGESTION_RE: OnceLock<Regex> = OnceLock::new();
static SUMMARY_VERDICT_RE: OnceLock<Regex> = OnceLock::new();

fn item_head_re() -> &'static Regex {
    ITEM_HEAD_RE.get_or_init(|| Regex::new(r"(?mi)^ITEM\s*(\d+):?\s*$").unwrap())
}

fn field_re(slot: &'static OnceLock<Regex>, field: &str) -> &'static Regex {
    slot.get_or_init(|| Regex::new(&format!(r"(?mi)^-?\s*{field}:\s*(.+)$")).unwrap())
}

/// A malformed or missing block degrades the item to SKIP rather than
/// failing the whole parse.
pub fn parse_verification_response(
    response: &str,
    items: &[VerificationItem],
) -> SemanticVerification {
    let mut results = Vec::new();

    // Split the response into per-item blocks by the ITEM headers.
    let heads: Vec<(usize, usize, usize)> = item_head_re()
        .captures_iter(response)
        .map(|c| {
            let m = c.get(0).unwrap();
            let id = c[1].parse::<usize>().unwrap_or(0);
            (m.start(), m.end(), id)
        })
        .collect();

    for (idx, &(_, block_start, id)) in heads.iter().enumerate() {
        let block_end = heads
            .get(idx + 1)
            .map_or(response.len(), |&(next_start, _, _)| next_start);
        let block = &response[block_start..block_end];
        let block = block.split("SUMMARY:").next().unwrap_or(block);

        let result = field_re(&RESULT_RE, "RESULT")
            .captures(block)
            .and_then(|c| c[1].trim().parse::<ItemResult>().ok())
            .unwrap_or(ItemResult::Skip);
        let reason = field_re(&REASON_RE, "REASON")
            .captures(block)
            .map(|c| c[1].trim().to_string())
            .unwrap_or_default();
        let suggestion = field_re(&SUGGESTION_RE, "SUGGESTION")
            .captures(block)
            .map(|c| c[1].trim().to_string());

        let item = items.iter().find(|i| i.id == id);
        results.push(ItemVerification {
            id,
            file: item.map_or_else(|| format!("Item {id}"), |i| i.file.clone()),
            intent: item.map_or_else(String::new, |i| i.intent.clone()),
            result,
            reason,
            suggestion,
        });
    }

    let summary_re = SUMMARY_VERDICT_RE.get_or_init(|| {
        Regex::new(r"(?is)SUMMARY:.*?VERDICT:\s*(READY|NEEDS_REVIEW|NEEDS_WORK)").unwrap()
    });
    let verdict = summary_re
        .captures(response)
        .and_then(|c| c[1].to_uppercase().parse::<Verdict>().ok())
        .unwrap_or_else(|| calculate_verdict(&results));

    let counts = ResultCounts::tally(&results);
    SemanticVerification {
        verified: results.len(),
        counts,
        verdict,
        total: items.len(),
        results,
        simplified: false,
    }
}

/// Any FAIL is NEEDS_WORK, any PARTIAL is NEEDS_REVIEW, else READY.
pub fn calculate_verdict(results: &[ItemVerification]) -> Verdict {
    let mut verdict = Verdict::Ready;
    for r in results {
        match r.result {
            ItemResult::Fail => verdict = verdict.max(Verdict::NeedsWork),
            ItemResult::Partial => verdict = verdict.max(Verdict::NeedsReview),
            _ => {}
        }
    }
    verdict
}

// ---------------------------------------------------------------------------
// Simplified fallback
// ---------------------------------------------------------------------------

/// Content shorter than this is treated as a stub.
const MINIMAL_CONTENT_CHARS: usize = 50;

/// Heuristic verification for when no judge is available. Presence and
/// size checks only, never a substitute for a real judge pass.
pub fn run_simplified_verification(
    root: &Path,
    artifact_path: &Path,
) -> Result<SemanticVerification> {
    let items = extract_verification_items(artifact_path)?;
    let mut results = Vec::new();

    for item in &items {
        let (result, reason, suggestion) = match read_file_content(root, &item.file) {
            None => (
                ItemResult::Fail,
                "File not found or not readable",
                Some("Create the file or check the path"),
            ),
            Some(content) if content.trim().is_empty() => (
                ItemResult::Fail,
                "File is empty",
                Some("Implement the planned functionality"),
            ),
            Some(content)
                if content.len() <= MINIMAL_CONTENT_CHARS
                    && item.action != FileAction::Delete =>
            {
                (
                    ItemResult::Partial,
                    "File exists but appears minimal",
                    Some("Verify implementation is complete"),
                )
            }
            Some(_) => (
                ItemResult::Pass,
                "File exists with content (basic check only)",
                None,
            ),
        };

        results.push(ItemVerification {
            id: item.id,
            file: item.file.clone(),
            intent: item.intent.clone(),
            result,
            reason: reason.to_string(),
            suggestion: suggestion.map(str::to_string),
        });
    }

    let verdict = calculate_verdict(&results);
    let counts = ResultCounts::tally(&results);
    Ok(SemanticVerification {
        verified: results.len(),
        counts,
        verdict,
        total: items.len(),
        results,
        simplified: true,
    })
}

// ---------------------------------------------------------------------------
// Reporting and combination
// ---------------------------------------------------------------------------

pub fn format_verification_report(parsed: &SemanticVerification) -> String {
    let mut lines = vec![
        "Semantic Verification (LLM-Judge)".to_string(),
        "=================================".to_string(),
        String::new(),
    ];

    for item in &parsed.results {
        let icon = match item.result {
            ItemResult::Pass => "+",
            ItemResult::Partial => "~",
            _ => "x",
        };
        lines.push(format!("{}. \"{}\"", item.id, item.intent));
        lines.push(format!("   {icon} {} - {}", item.result, item.reason));
        if let Some(suggestion) = &item.suggestion {
            lines.push(format!("     Suggestion: {suggestion}"));
        }
        lines.push(String::new());
    }

    lines.push("---".to_string());
    lines.push(format!(
        "Semantic Score: {}/{} PASS, {} PARTIAL, {} FAIL",
        parsed.counts.pass, parsed.total, parsed.counts.partial, parsed.counts.fail
    ));
    lines.push(format!("Verdict: {}", parsed.verdict));
    lines.push(
        match parsed.verdict {
            Verdict::Ready => "-> All items verified, ready for PR",
            Verdict::NeedsReview => "-> Some items need attention, proceed with caution",
            Verdict::NeedsWork => "-> Critical issues found, address FAIL items before PR",
        }
        .to_string(),
    );

    lines.join("\n")
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedSummary {
    pub structural_coverage: String,
    pub semantic_score: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, Serialize)]
pub struct CombinedVerification {
    pub structural: StructuralVerification,
    pub semantic: SemanticVerification,
    pub combined_verdict: Verdict,
    pub can_proceed: bool,
    pub summary: CombinedSummary,
}

/// The combined verdict is the worse of the two layers.
pub fn combine_results(
    structural: StructuralVerification,
    semantic: SemanticVerification,
) -> CombinedVerification {
    let combined_verdict = structural.verdict.max(semantic.verdict);
    let summary = CombinedSummary {
        structural_coverage: structural.coverage.formatted(),
        semantic_score: format!("{}/{}", semantic.counts.pass, semantic.total),
        verdict: combined_verdict,
    };
    CombinedVerification {
        structural,
        semantic,
        combined_verdict,
        can_proceed: combined_verdict != Verdict::NeedsWork,
        summary,
    }
}
