//! Pattern mining over audit history.
//!
//! Pure aggregation over `AuditEntry` slices so everything here is
//! testable without a log file. `generate_report` is the entry point the
//! CLI uses, reading through an `AuditLog` handle.

use crate::audit::{AuditEntry, AuditLog, Blocker, EventType};
use chrono::DateTime;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Recurring blockers
// ---------------------------------------------------------------------------

const MAX_BLOCKER_EXAMPLES: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct RecurringBlocker {
    #[serde(rename = "type")]
    pub blocker_type: String,
    pub severity: String,
    pub count: usize,
    pub orders: Vec<String>,
    pub examples: Vec<String>,
}

/// Blockers grouped by type and severity, kept only when they hit at
/// least `min_orders` distinct orders. Sorted by raw count, descending.
pub fn find_recurring_blockers(entries: &[AuditEntry], min_orders: usize) -> Vec<RecurringBlocker> {
    let mut groups: Vec<RecurringBlocker> = Vec::new();

    for entry in entries {
        if entry.event_type != EventType::Blocker {
            continue;
        }
        for blocker in entry.blockers.iter().flatten() {
            let group = match groups
                .iter_mut()
                .find(|g| g.blocker_type == blocker.blocker_type && g.severity == blocker.severity)
            {
                Some(g) => g,
                None => {
                    groups.push(RecurringBlocker {
                        blocker_type: blocker.blocker_type.clone(),
                        severity: blocker.severity.clone(),
                        count: 0,
                        orders: Vec::new(),
                        examples: Vec::new(),
                    });
                    groups.last_mut().unwrap()
                }
            };
            group.count += 1;
            if !group.orders.contains(&entry.order_id) {
                group.orders.push(entry.order_id.clone());
            }
            if group.examples.len() < MAX_BLOCKER_EXAMPLES {
                group.examples.push(blocker.description.clone());
            }
        }
    }

    groups.retain(|g| g.orders.len() >= min_orders);
    groups.sort_by(|a, b| b.count.cmp(&a.count));
    groups
}

// ---------------------------------------------------------------------------
// Escalation patterns
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct EscalationPattern {
    pub from_chef: String,
    pub to_chef: String,
    pub count: usize,
    pub reasons: BTreeMap<String, usize>,
    pub conditions: BTreeMap<String, usize>,
}

/// Escalations grouped by (from, to) pair, most frequent first.
pub fn find_escalation_patterns(entries: &[AuditEntry]) -> Vec<EscalationPattern> {
    let mut patterns: Vec<EscalationPattern> = Vec::new();

    for entry in entries {
        if entry.event_type != EventType::Escalation {
            continue;
        }
        let Some(esc) = &entry.escalation else {
            continue;
        };
        let pattern = match patterns
            .iter_mut()
            .find(|p| p.from_chef == esc.from_chef && p.to_chef == esc.to_chef)
        {
            Some(p) => p,
            None => {
                patterns.push(EscalationPattern {
                    from_chef: esc.from_chef.clone(),
                    to_chef: esc.to_chef.clone(),
                    count: 0,
                    reasons: BTreeMap::new(),
                    conditions: BTreeMap::new(),
                });
                patterns.last_mut().unwrap()
            }
        };
        pattern.count += 1;
        if !esc.reason.is_empty() {
            *pattern.reasons.entry(esc.reason.clone()).or_insert(0) += 1;
        }
        if let Some(condition) = &esc.condition {
            *pattern.conditions.entry(condition.clone()).or_insert(0) += 1;
        }
    }

    patterns.sort_by(|a, b| b.count.cmp(&a.count));
    patterns
}

// ---------------------------------------------------------------------------
// Phase statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PhaseStats {
    pub phase: String,
    pub total_count: usize,
    pub verdicts: BTreeMap<String, usize>,
    pub durations: Vec<f64>,
    pub avg_duration: f64,
    pub block_rate: f64,
}

fn parse_ts(timestamp: &str) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(timestamp).ok()
}

/// Per-phase completion stats. Duration comes from a matching
/// phase_start in the same order when one exists, falling back to the
/// entry's own duration_seconds.
pub fn find_phase_statistics(entries: &[AuditEntry]) -> Vec<PhaseStats> {
    let mut stats: Vec<PhaseStats> = Vec::new();
    let mut starts: BTreeMap<(String, String), DateTime<chrono::FixedOffset>> = BTreeMap::new();

    for entry in entries {
        match entry.event_type {
            EventType::PhaseStart => {
                if let (Some(phase), Some(ts)) = (&entry.phase, parse_ts(&entry.timestamp)) {
                    starts.insert((entry.order_id.clone(), phase.clone()), ts);
                }
            }
            EventType::PhaseComplete => {
                let Some(phase) = &entry.phase else { continue };
                let stat = match stats.iter_mut().find(|s| &s.phase == phase) {
                    Some(s) => s,
                    None => {
                        stats.push(PhaseStats {
                            phase: phase.clone(),
                            total_count: 0,
                            verdicts: BTreeMap::new(),
                            durations: Vec::new(),
                            avg_duration: 0.0,
                            block_rate: 0.0,
                        });
                        stats.last_mut().unwrap()
                    }
                };
                stat.total_count += 1;
                let verdict = entry.verdict.clone().unwrap_or_default();
                *stat.verdicts.entry(verdict).or_insert(0) += 1;

                let key = (entry.order_id.clone(), phase.clone());
                if let (Some(start), Some(end)) = (starts.get(&key), parse_ts(&entry.timestamp)) {
                    let duration = (end - *start).num_milliseconds() as f64 / 1000.0;
                    stat.durations.push(duration);
                } else if let Some(duration) = entry.duration_seconds {
                    stat.durations.push(duration);
                }
            }
            _ => {}
        }
    }

    for stat in &mut stats {
        if !stat.durations.is_empty() {
            stat.avg_duration = stat.durations.iter().sum::<f64>() / stat.durations.len() as f64;
        }
        let blocked = stat.verdicts.get("block").copied().unwrap_or(0);
        stat.block_rate = (blocked as f64 / stat.total_count as f64) * 100.0;
    }

    stats
}

// ---------------------------------------------------------------------------
// Prediction accuracy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct OrderAccuracy {
    pub order_id: String,
    pub predicted_count: usize,
    pub actual_blockers: usize,
    pub correctly_predicted: usize,
    pub accuracy: Option<f64>,
    pub unpredicted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallAccuracy {
    pub total_predictions: usize,
    pub correct_predictions: usize,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionAccuracy {
    pub orders: Vec<OrderAccuracy>,
    pub overall: OverallAccuracy,
}

fn risk_descriptions(entry: &AuditEntry) -> Vec<String> {
    let Some(Value::Array(risks)) = entry.extra.get("risks_identified") else {
        return Vec::new();
    };
    risks
        .iter()
        .filter_map(|r| r.get("description").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn order_ids_in(entries: &[AuditEntry]) -> Vec<String> {
    let mut ids = Vec::new();
    for entry in entries {
        if !ids.contains(&entry.order_id) {
            ids.push(entry.order_id.clone());
        }
    }
    ids
}

/// A predicted risk counts as materialized when its description contains
/// the type of an actual blocker, case-insensitively. Deliberately crude,
/// the point is a trend line not a score.
pub fn find_prediction_accuracy(entries: &[AuditEntry]) -> PredictionAccuracy {
    let mut orders = Vec::new();

    for order_id in order_ids_in(entries) {
        let order_entries: Vec<&AuditEntry> =
            entries.iter().filter(|e| e.order_id == order_id).collect();

        let predicted: Vec<String> = order_entries
            .iter()
            .flat_map(|e| risk_descriptions(e))
            .collect();
        let actual: Vec<&Blocker> = order_entries
            .iter()
            .filter(|e| e.event_type == EventType::Blocker)
            .flat_map(|e| e.blockers.iter().flatten())
            .collect();

        if predicted.is_empty() && actual.is_empty() {
            continue;
        }

        let materialized = actual
            .iter()
            .filter(|blocker| {
                predicted.iter().any(|risk| {
                    risk.to_lowercase()
                        .contains(&blocker.blocker_type.to_lowercase())
                })
            })
            .count();

        let accuracy = if predicted.is_empty() {
            None
        } else {
            Some((materialized as f64 / predicted.len() as f64) * 100.0)
        };

        orders.push(OrderAccuracy {
            order_id,
            predicted_count: predicted.len(),
            actual_blockers: actual.len(),
            correctly_predicted: materialized,
            accuracy,
            unpredicted: actual.len() - materialized,
        });
    }

    let total_predictions: usize = orders.iter().map(|o| o.predicted_count).sum();
    let correct_predictions: usize = orders.iter().map(|o| o.correctly_predicted).sum();
    let accuracy = if total_predictions > 0 {
        Some((correct_predictions as f64 / total_predictions as f64) * 100.0)
    } else {
        None
    };

    PredictionAccuracy {
        orders,
        overall: OverallAccuracy {
            total_predictions,
            correct_predictions,
            accuracy,
        },
    }
}

// ---------------------------------------------------------------------------
// Suggestions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "HIGH",
            Priority::Medium => "MEDIUM",
            Priority::Low => "LOW",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    #[serde(rename = "type")]
    pub suggestion_type: String,
    pub priority: Priority,
    pub message: String,
}

pub fn suggest_improvements(entries: &[AuditEntry]) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for blocker in find_recurring_blockers(entries, 2).iter().take(3) {
        if blocker.severity == "HIGH" {
            suggestions.push(Suggestion {
                suggestion_type: "recurring_blocker".to_string(),
                priority: Priority::High,
                message: format!(
                    "HIGH severity blocker \"{}\" occurred {} times across {} orders. \
                     Consider adding automated check.",
                    blocker.blocker_type,
                    blocker.count,
                    blocker.orders.len()
                ),
            });
        }
    }

    for pattern in find_escalation_patterns(entries).iter().take(3) {
        if pattern.count >= 3 {
            suggestions.push(Suggestion {
                suggestion_type: "escalation_pattern".to_string(),
                priority: Priority::Medium,
                message: format!(
                    "{} frequently escalates to {} ({} times). \
                     Consider adjusting thresholds or adding guidance.",
                    pattern.from_chef, pattern.to_chef, pattern.count
                ),
            });
        }
    }

    for stat in find_phase_statistics(entries) {
        if stat.block_rate > 30.0 {
            suggestions.push(Suggestion {
                suggestion_type: "high_block_rate".to_string(),
                priority: Priority::Medium,
                message: format!(
                    "Phase \"{}\" has {:.1}% block rate. Consider improving input quality.",
                    stat.phase, stat.block_rate
                ),
            });
        }
    }

    let accuracy = find_prediction_accuracy(entries);
    if let Some(overall) = accuracy.overall.accuracy {
        if overall < 30.0 {
            suggestions.push(Suggestion {
                suggestion_type: "low_prediction_accuracy".to_string(),
                priority: Priority::Low,
                message: format!(
                    "Pre-mortem prediction accuracy is {overall:.1}%. \
                     Consider improving risk identification."
                ),
            });
        }
    }

    suggestions.sort_by_key(|s| s.priority);
    suggestions
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DateRange {
    pub first: Option<String>,
    pub last: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub total_orders: usize,
    pub total_events: usize,
    pub date_range: DateRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatternReport {
    pub summary: ReportSummary,
    pub recurring_blockers: Vec<RecurringBlocker>,
    pub escalation_patterns: Vec<EscalationPattern>,
    pub phase_statistics: Vec<PhaseStats>,
    pub prediction_accuracy: PredictionAccuracy,
    pub suggestions: Vec<Suggestion>,
}

pub fn generate_report(log: &AuditLog) -> PatternReport {
    let entries = log.entries();
    analyze(&entries)
}

pub fn analyze(entries: &[AuditEntry]) -> PatternReport {
    PatternReport {
        summary: ReportSummary {
            total_orders: order_ids_in(entries).len(),
            total_events: entries.len(),
            date_range: DateRange {
                first: entries.first().map(|e| e.timestamp.clone()),
                last: entries.last().map(|e| e.timestamp.clone()),
            },
        },
        recurring_blockers: find_recurring_blockers(entries, 2),
        escalation_patterns: find_escalation_patterns(entries),
        phase_statistics: find_phase_statistics(entries),
        prediction_accuracy: find_prediction_accuracy(entries),
        suggestions: suggest_improvements(entries),
    }
}
