//! Memory retrieval: mine audit history for features similar to the one
//! being cooked, surface phase insights, and record feedback on whether
//! the surfaced memories were any use.

use crate::audit::{AuditEntry, AuditLog, EventType};
use crate::error::{CookError, Result};
use crate::io;
use crate::patterns;
use crate::similarity::{file_similarity, text_similarity, tokenize};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Feature similarity over audit history
// ---------------------------------------------------------------------------

/// What we know about the feature currently being cooked.
#[derive(Debug, Clone, Default)]
pub struct FeatureContext {
    pub description: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarFeature {
    pub order_id: String,
    pub similarity: f64,
    pub file_similarity: f64,
    pub keyword_similarity: f64,
    pub entries: Vec<AuditEntry>,
}

const DEFAULT_MIN_SIMILARITY: f64 = 0.3;
const DEFAULT_MAX_RESULTS: usize = 5;

const FILE_WEIGHT: f64 = 0.6;
const KEYWORD_WEIGHT: f64 = 0.4;

fn metadata_strings(entry: &AuditEntry, key: &str) -> Vec<String> {
    let Some(Value::Object(meta)) = &entry.metadata else {
        return Vec::new();
    };
    match meta.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Rank past orders by similarity to the current feature. Weighted
/// average of file overlap (60%) and keyword overlap (40%).
pub fn query_similar_features(
    entries: &[AuditEntry],
    feature: &FeatureContext,
    min_similarity: f64,
    max_results: usize,
) -> Vec<SimilarFeature> {
    let mut order_ids = Vec::new();
    for entry in entries {
        if !order_ids.contains(&entry.order_id) {
            order_ids.push(entry.order_id.clone());
        }
    }

    let mut similarities = Vec::new();

    for order_id in order_ids {
        let order_entries: Vec<AuditEntry> = entries
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect();

        let mut order_files = Vec::new();
        let mut order_keywords = Vec::new();
        for entry in &order_entries {
            order_files.extend(metadata_strings(entry, "files_to_modify"));
            for description in metadata_strings(entry, "feature_description") {
                order_keywords.extend(tokenize(&description));
            }
        }

        let file_sim = file_similarity(&feature.files, &order_files);
        let keyword_sim = text_similarity(&feature.description, &order_keywords.join(" "));
        let similarity = file_sim * FILE_WEIGHT + keyword_sim * KEYWORD_WEIGHT;

        if similarity >= min_similarity {
            similarities.push(SimilarFeature {
                order_id,
                similarity,
                file_similarity: file_sim,
                keyword_similarity: keyword_sim,
                entries: order_entries,
            });
        }
    }

    similarities.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    similarities.truncate(max_results);
    similarities
}

pub fn query_similar(log: &AuditLog, feature: &FeatureContext) -> Vec<SimilarFeature> {
    query_similar_features(
        &log.entries(),
        feature,
        DEFAULT_MIN_SIMILARITY,
        DEFAULT_MAX_RESULTS,
    )
}

// ---------------------------------------------------------------------------
// Phase insights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct InsightWarning {
    #[serde(rename = "type")]
    pub warning_type: String,
    pub message: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecurringIssue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub count: usize,
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InsightSuggestion {
    #[serde(rename = "type")]
    pub suggestion_type: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseInsights {
    pub has_insights: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub similar_features_count: usize,
    pub phase: String,
    pub warnings: Vec<InsightWarning>,
    pub suggestions: Vec<InsightSuggestion>,
    pub recurring_issues: Vec<RecurringIssue>,
}

const HIGH_BLOCK_RATE: f64 = 30.0;

/// Insights for a phase, built only when similar features exist in
/// history. Thresholds match the miner's suggestion thresholds.
pub fn insights_for_phase(
    entries: &[AuditEntry],
    phase: &str,
    feature: &FeatureContext,
) -> PhaseInsights {
    let similar =
        query_similar_features(entries, feature, DEFAULT_MIN_SIMILARITY, DEFAULT_MAX_RESULTS);

    if similar.is_empty() {
        return PhaseInsights {
            has_insights: false,
            message: Some("No similar features found in history".to_string()),
            similar_features_count: 0,
            phase: phase.to_string(),
            warnings: Vec::new(),
            suggestions: Vec::new(),
            recurring_issues: Vec::new(),
        };
    }

    let mut insights = PhaseInsights {
        has_insights: true,
        message: None,
        similar_features_count: similar.len(),
        phase: phase.to_string(),
        warnings: Vec::new(),
        suggestions: Vec::new(),
        recurring_issues: Vec::new(),
    };

    let phase_stats = patterns::find_phase_statistics(entries);
    if let Some(stat) = phase_stats.iter().find(|s| s.phase == phase) {
        if stat.block_rate > HIGH_BLOCK_RATE {
            insights.warnings.push(InsightWarning {
                warning_type: "high_block_rate".to_string(),
                message: format!(
                    "Phase '{phase}' blocks {:.1}% of similar features",
                    stat.block_rate
                ),
                severity: "medium".to_string(),
            });
        }
    }

    for blocker in patterns::find_recurring_blockers(entries, 2).iter().take(3) {
        if blocker.severity == "HIGH" || blocker.count >= 3 {
            insights.recurring_issues.push(RecurringIssue {
                issue_type: blocker.blocker_type.clone(),
                count: blocker.count,
                severity: blocker.severity.clone(),
                message: format!(
                    "Recurring issue: {} ({} occurrences)",
                    blocker.blocker_type, blocker.count
                ),
            });
        }
    }

    let escalations = patterns::find_escalation_patterns(entries);
    for pattern in escalations
        .iter()
        .filter(|p| p.from_chef.contains(phase))
        .take(2)
    {
        if pattern.count >= 3 {
            insights.suggestions.push(InsightSuggestion {
                suggestion_type: "escalation_pattern".to_string(),
                message: format!(
                    "Consider pre-review: {} frequently escalates to {}",
                    pattern.from_chef, pattern.to_chef
                ),
            });
        }
    }

    insights
}

/// Markdown block for embedding the insights into an artifact.
pub fn format_insights(similar: &[SimilarFeature], insights: Option<&PhaseInsights>) -> String {
    if similar.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Historical Insights\n\n");
    out.push_str(&format!(
        "Found {} similar feature(s) in history:\n\n",
        similar.len()
    ));

    for feature in similar.iter().take(3) {
        out.push_str(&format!(
            "- **{}** ({:.0}% similar)\n",
            feature.order_id,
            feature.similarity * 100.0
        ));

        let blockers = feature
            .entries
            .iter()
            .filter(|e| e.event_type == EventType::Blocker)
            .count();
        let escalations = feature
            .entries
            .iter()
            .filter(|e| e.event_type == EventType::Escalation)
            .count();
        let blocked_phases = feature
            .entries
            .iter()
            .filter(|e| {
                e.event_type == EventType::PhaseComplete && e.verdict.as_deref() == Some("block")
            })
            .count();

        if blockers > 0 {
            out.push_str(&format!("  - Blocked {blockers} time(s)\n"));
        }
        if escalations > 0 {
            out.push_str(&format!("  - Escalated {escalations} time(s)\n"));
        }
        if blocked_phases > 0 {
            out.push_str(&format!("  - {blocked_phases} phase(s) blocked\n"));
        }
    }

    if let Some(insights) = insights.filter(|i| i.has_insights) {
        out.push_str("\n### Patterns to Consider:\n\n");
        for warning in &insights.warnings {
            out.push_str(&format!("- {}\n", warning.message));
        }
        for issue in &insights.recurring_issues {
            out.push_str(&format!("- {}\n", issue.message));
        }
        for suggestion in &insights.suggestions {
            out.push_str(&format!("- {}\n", suggestion.message));
        }
    }

    out.push('\n');
    out
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    Helpful,
    NotHelpful,
    Wrong,
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Feedback::Helpful => "helpful",
            Feedback::NotHelpful => "not_helpful",
            Feedback::Wrong => "wrong",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Feedback {
    type Err = CookError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "helpful" => Ok(Feedback::Helpful),
            "not_helpful" => Ok(Feedback::NotHelpful),
            "wrong" => Ok(Feedback::Wrong),
            _ => Err(CookError::InvalidFeedback(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub timestamp: String,
    pub order_id: String,
    pub insight_type: String,
    pub feedback: Feedback,
    #[serde(default)]
    pub context: Value,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FeedbackCounts {
    pub helpful: usize,
    pub not_helpful: usize,
    pub wrong: usize,
}

impl FeedbackCounts {
    fn bump(&mut self, feedback: Feedback) {
        match feedback {
            Feedback::Helpful => self.helpful += 1,
            Feedback::NotHelpful => self.not_helpful += 1,
            Feedback::Wrong => self.wrong += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedbackStats {
    pub total: usize,
    #[serde(flatten)]
    pub counts: FeedbackCounts,
    pub by_type: BTreeMap<String, FeedbackCounts>,
}

/// Sink for feedback on insight quality, same JSONL discipline as the
/// audit log.
#[derive(Debug, Clone)]
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        FeedbackLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(
        &self,
        order_id: &str,
        insight_type: &str,
        feedback: Feedback,
        context: Value,
    ) -> Result<FeedbackEntry> {
        let entry = FeedbackEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            order_id: order_id.to_string(),
            insight_type: insight_type.to_string(),
            feedback,
            context,
        };
        let line = serde_json::to_string(&entry)?;
        io::append_line(&self.path, &line)?;
        Ok(entry)
    }

    pub fn stats(&self) -> FeedbackStats {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return FeedbackStats::default();
        };

        let mut stats = FeedbackStats::default();
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(entry) = serde_json::from_str::<FeedbackEntry>(line) else {
                continue;
            };
            stats.total += 1;
            stats.counts.bump(entry.feedback);
            stats
                .by_type
                .entry(entry.insight_type)
                .or_default()
                .bump(entry.feedback);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn entry_with_metadata(order: &str, metadata: Value) -> AuditEntry {
        serde_json::from_value(json!({
            "timestamp": "2026-02-01T10:00:00Z",
            "order_id": order,
            "event_type": "phase_complete",
            "phase": "plan",
            "verdict": "approve",
            "metadata": metadata,
        }))
        .unwrap()
    }

    #[test]
    fn similar_features_weighted_by_files_and_keywords() {
        let entries = vec![
            entry_with_metadata(
                "order-auth",
                json!({
                    "files_to_modify": ["src/auth.ts", "src/session.ts"],
                    "feature_description": "add oauth login with refresh tokens",
                }),
            ),
            entry_with_metadata(
                "order-billing",
                json!({
                    "files_to_modify": ["src/billing.ts"],
                    "feature_description": "monthly invoice exports",
                }),
            ),
        ];

        let feature = FeatureContext {
            description: "oauth login revamp".to_string(),
            files: vec!["src/auth.ts".to_string(), "src/session.ts".to_string()],
        };
        let similar = query_similar_features(&entries, &feature, 0.3, 5);

        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].order_id, "order-auth");
        assert!(similar[0].file_similarity > 0.9);
        assert!(similar[0].similarity >= 0.6);
    }

    #[test]
    fn results_capped_and_sorted() {
        let mut entries = Vec::new();
        for i in 0..8 {
            entries.push(entry_with_metadata(
                &format!("order-{i}"),
                json!({ "files_to_modify": ["src/shared.ts"] }),
            ));
        }
        let feature = FeatureContext {
            description: String::new(),
            files: vec!["src/shared.ts".to_string()],
        };
        let similar = query_similar_features(&entries, &feature, 0.3, 5);
        assert_eq!(similar.len(), 5);
        assert!(similar
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn no_history_means_no_insights() {
        let insights = insights_for_phase(&[], "plan", &FeatureContext::default());
        assert!(!insights.has_insights);
        assert!(insights.message.is_some());
    }

    #[test]
    fn insights_flag_high_block_rate_phase() {
        let mut entries = vec![entry_with_metadata(
            "order-auth",
            json!({
                "files_to_modify": ["src/auth.ts"],
                "feature_description": "oauth login",
            }),
        )];
        // Two blocked completions for the plan phase.
        for order in ["o1", "o2"] {
            let mut e = entry_with_metadata(order, json!({}));
            e.verdict = Some("block".to_string());
            entries.push(e);
        }

        let feature = FeatureContext {
            description: "oauth login".to_string(),
            files: vec!["src/auth.ts".to_string()],
        };
        let insights = insights_for_phase(&entries, "plan", &feature);
        assert!(insights.has_insights);
        assert_eq!(insights.warnings.len(), 1);
        assert_eq!(insights.warnings[0].warning_type, "high_block_rate");
    }

    #[test]
    fn format_insights_summarizes_outcomes() {
        let mut blocked = entry_with_metadata("order-auth", json!({}));
        blocked.event_type = EventType::Blocker;
        let similar = vec![SimilarFeature {
            order_id: "order-auth".to_string(),
            similarity: 0.72,
            file_similarity: 0.9,
            keyword_similarity: 0.45,
            entries: vec![blocked],
        }];

        let text = format_insights(&similar, None);
        assert!(text.contains("**order-auth** (72% similar)"));
        assert!(text.contains("Blocked 1 time(s)"));
    }

    #[test]
    fn feedback_round_trip_and_stats() {
        let dir = TempDir::new().unwrap();
        let log = FeedbackLog::at(dir.path().join("feedback.jsonl"));

        log.record("o1", "similar_features", Feedback::Helpful, json!({}))
            .unwrap();
        log.record("o1", "similar_features", Feedback::Wrong, json!({}))
            .unwrap();
        log.record("o2", "phase_warning", Feedback::NotHelpful, json!({}))
            .unwrap();

        let stats = log.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.counts.helpful, 1);
        assert_eq!(stats.counts.wrong, 1);
        assert_eq!(stats.by_type["similar_features"].helpful, 1);
        assert_eq!(stats.by_type["phase_warning"].not_helpful, 1);
    }

    #[test]
    fn invalid_feedback_string_rejected() {
        let err = "meh".parse::<Feedback>().unwrap_err();
        assert!(matches!(err, CookError::InvalidFeedback(_)));
    }

    #[test]
    fn missing_feedback_file_yields_empty_stats() {
        let dir = TempDir::new().unwrap();
        let log = FeedbackLog::at(dir.path().join("feedback.jsonl"));
        assert_eq!(log.stats().total, 0);
    }
}
