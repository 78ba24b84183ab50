//! Statistics and search over the artifact index.

use crate::index::{ArtifactIndex, IndexedArtifact};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Period {
    pub since: Option<String>,
    pub until: Option<String>,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HotFile {
    pub file: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockerReason {
    pub artifact: String,
    #[serde(rename = "type")]
    pub blocker_type: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockerStats {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub recent: Vec<BlockerReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PremortemStats {
    pub total: usize,
    pub artifacts_with_premortem: usize,
    pub avg_per_artifact: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionStats {
    pub total: usize,
    pub avg_per_artifact: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub period: Period,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_mode: BTreeMap<String, usize>,
    pub by_risk: BTreeMap<String, usize>,
    pub hot_files: Vec<HotFile>,
    pub blockers: BlockerStats,
    pub premortem: PremortemStats,
    pub decisions: DecisionStats,
}

const HOT_FILE_LIMIT: usize = 10;
const RECENT_BLOCKER_LIMIT: usize = 5;

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn period_label(since: Option<&str>) -> String {
    let Some(since) = since else {
        return "all time".to_string();
    };
    let Some(date) = parse_date(since) else {
        return format!("since {since}");
    };
    let days = (Utc::now().date_naive() - date).num_days();
    match days {
        ..=7 => "last 7 days".to_string(),
        8..=30 => "last 30 days".to_string(),
        31..=90 => "last 90 days".to_string(),
        _ => format!("since {since}"),
    }
}

fn count_by<'a>(
    artifacts: &[&'a IndexedArtifact],
    key: impl Fn(&'a IndexedArtifact) -> &'a str,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for artifact in artifacts {
        *counts.entry(key(artifact).to_string()).or_insert(0) += 1;
    }
    counts
}

/// Aggregate stats, optionally restricted to a date window on the
/// artifact's own date. Undated artifacts drop out when a filter is set.
pub fn calculate_stats(index: &ArtifactIndex, since: Option<&str>, until: Option<&str>) -> Stats {
    let since_date = since.and_then(parse_date);
    let until_date = until.and_then(parse_date);

    let artifacts: Vec<&IndexedArtifact> = index
        .artifacts
        .iter()
        .filter(|a| {
            if since_date.is_none() && until_date.is_none() {
                return true;
            }
            let Some(date) = a.date.as_deref().and_then(parse_date) else {
                return false;
            };
            since_date.map_or(true, |s| date >= s) && until_date.map_or(true, |u| date <= u)
        })
        .collect();

    let total = artifacts.len();

    let mut file_counts: Vec<(String, usize)> = Vec::new();
    for artifact in &artifacts {
        for file in &artifact.files_touched {
            match file_counts.iter_mut().find(|(f, _)| f == file) {
                Some((_, n)) => *n += 1,
                None => file_counts.push((file.clone(), 1)),
            }
        }
    }
    file_counts.sort_by(|a, b| b.1.cmp(&a.1));
    let hot_files = file_counts
        .into_iter()
        .take(HOT_FILE_LIMIT)
        .map(|(file, count)| HotFile { file, count })
        .collect();

    let mut blocker_types = BTreeMap::new();
    let mut blocker_reasons = Vec::new();
    for artifact in &artifacts {
        for blocker in &artifact.blockers {
            *blocker_types
                .entry(blocker.blocker_type.clone())
                .or_insert(0) += 1;
            if !blocker.reason.is_empty() {
                blocker_reasons.push(BlockerReason {
                    artifact: artifact.slug.clone(),
                    blocker_type: blocker.blocker_type.clone(),
                    reason: blocker.reason.clone(),
                });
            }
        }
    }

    let total_premortems: usize = artifacts.iter().map(|a| a.premortem.len()).sum();
    let artifacts_with_premortem = artifacts.iter().filter(|a| !a.premortem.is_empty()).count();
    let total_decisions: usize = artifacts.iter().map(|a| a.decisions.len()).sum();

    let avg = |n: usize| {
        if total > 0 {
            n as f64 / total as f64
        } else {
            0.0
        }
    };

    Stats {
        period: Period {
            since: since.map(str::to_string),
            until: until.map(str::to_string),
            label: period_label(since),
        },
        total,
        by_status: count_by(&artifacts, |a| &a.status),
        by_mode: count_by(&artifacts, |a| &a.mode),
        by_risk: count_by(&artifacts, |a| &a.risk_level),
        hot_files,
        blockers: BlockerStats {
            total: blocker_reasons.len(),
            by_type: blocker_types,
            recent: blocker_reasons
                .into_iter()
                .take(RECENT_BLOCKER_LIMIT)
                .collect(),
        },
        premortem: PremortemStats {
            total: total_premortems,
            artifacts_with_premortem,
            avg_per_artifact: avg(total_premortems),
        },
        decisions: DecisionStats {
            total: total_decisions,
            avg_per_artifact: avg(total_decisions),
        },
    }
}

/// Share of artifacts that reached a terminal good status.
pub fn completion_rate(stats: &Stats) -> u32 {
    let completed = ["well-done", "ready-for-merge", "plated"]
        .iter()
        .filter_map(|s| stats.by_status.get(*s))
        .sum::<usize>();
    rate(completed, stats.total)
}

pub fn block_rate(stats: &Stats) -> u32 {
    let blocked = ["blocked", "needs-more-cooking"]
        .iter()
        .filter_map(|s| stats.by_status.get(*s))
        .sum::<usize>();
    rate(blocked, stats.total)
}

fn rate(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}

// ---------------------------------------------------------------------------
// Search and timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit<'a> {
    pub artifact: &'a IndexedArtifact,
    pub score: u32,
    pub matches: Vec<String>,
}

/// Substring search across title, slug, files and decisions, weighted
/// toward titles.
pub fn search_artifacts<'a>(
    index: &'a ArtifactIndex,
    query: &str,
    limit: usize,
) -> Vec<SearchHit<'a>> {
    let query = query.to_lowercase();
    let mut results = Vec::new();

    for artifact in &index.artifacts {
        let mut score = 0;
        let mut matches = Vec::new();

        if artifact.title.to_lowercase().contains(&query) {
            score += 10;
            matches.push("title".to_string());
        }
        if artifact.slug.to_lowercase().contains(&query) {
            score += 5;
            matches.push("slug".to_string());
        }
        if let Some(file) = artifact
            .files_touched
            .iter()
            .find(|f| f.to_lowercase().contains(&query))
        {
            score += 2;
            matches.push(format!("file:{file}"));
        }
        if artifact
            .decisions
            .iter()
            .any(|d| d.decision.to_lowercase().contains(&query))
        {
            score += 3;
            matches.push("decision".to_string());
        }

        if score > 0 {
            results.push(SearchHit {
                artifact,
                score,
                matches,
            });
        }
    }

    results.sort_by(|a, b| b.score.cmp(&a.score));
    results.truncate(limit);
    results
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEvent {
    pub date: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub artifact: String,
    pub summary: String,
}

/// Creation and decision events across all artifacts, newest first.
pub fn timeline(index: &ArtifactIndex, limit: usize) -> Vec<TimelineEvent> {
    let mut events = Vec::new();

    for artifact in &index.artifacts {
        if let Some(date) = &artifact.date {
            events.push(TimelineEvent {
                date: date.clone(),
                event_type: "created".to_string(),
                artifact: artifact.slug.clone(),
                summary: artifact.title.clone(),
            });
        }
        for decision in &artifact.decisions {
            events.push(TimelineEvent {
                date: decision.date.clone(),
                event_type: "decision".to_string(),
                artifact: artifact.slug.clone(),
                summary: decision.decision.clone(),
            });
        }
    }

    events.sort_by(|a, b| b.date.cmp(&a.date));
    events.truncate(limit);
    events
}

// ---------------------------------------------------------------------------
// Console rendering
// ---------------------------------------------------------------------------

pub fn format_stats(stats: &Stats) -> String {
    let mut lines = vec![
        format!("Cook Analytics ({})", stats.period.label),
        "-".repeat(40),
        String::new(),
        format!("Total cooks: {}", stats.total),
    ];

    let well_done = stats.by_mode.get("well-done").copied().unwrap_or(0);
    let microwave = stats.by_mode.get("microwave").copied().unwrap_or(0);
    if well_done > 0 || microwave > 0 {
        lines.push(format!("  {well_done} well-done, {microwave} microwave"));
    }
    lines.push(String::new());

    lines.push("Status breakdown:".to_string());
    let order = [
        "well-done",
        "ready-for-merge",
        "plated",
        "cooking",
        "raw",
        "blocked",
        "needs-more-cooking",
    ];
    for status in order {
        if let Some(count) = stats.by_status.get(status) {
            lines.push(format!("  {status}: {count}"));
        }
    }
    lines.push(String::new());

    lines.push(format!("Completion rate: {}%", completion_rate(stats)));
    let blocked = block_rate(stats);
    if blocked > 0 {
        lines.push(format!("Block rate: {blocked}%"));
    }
    lines.push(String::new());

    if !stats.hot_files.is_empty() {
        lines.push("Hot files:".to_string());
        for hot in stats.hot_files.iter().take(5) {
            lines.push(format!("  {} ({} cooks)", hot.file, hot.count));
        }
        lines.push(String::new());
    }

    if stats.premortem.total > 0 {
        lines.push(format!(
            "Pre-mortem scenarios: {} total (avg {:.1}/artifact)",
            stats.premortem.total, stats.premortem.avg_per_artifact
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexStats, IndexedBlocker};

    fn artifact(slug: &str, date: &str, status: &str, files: &[&str]) -> IndexedArtifact {
        IndexedArtifact {
            path: format!("cook/{slug}.{date}.cook.md"),
            filename: format!("{slug}.{date}.cook.md"),
            slug: slug.to_string(),
            date: Some(date.to_string()),
            status: status.to_string(),
            mode: "well-done".to_string(),
            title: format!("Title for {slug}"),
            owner: None,
            files_touched: files.iter().map(|s| s.to_string()).collect(),
            risk_level: "low".to_string(),
            blockers: vec![],
            premortem: vec![],
            decisions: vec![],
            indexed_at: "2026-03-01T00:00:00Z".to_string(),
        }
    }

    fn index_of(artifacts: Vec<IndexedArtifact>) -> ArtifactIndex {
        ArtifactIndex {
            version: "1.0.0".to_string(),
            generated_at: "2026-03-01T00:00:00Z".to_string(),
            cook_dir: "cook".to_string(),
            artifacts,
            errors: vec![],
            stats: IndexStats::default(),
        }
    }

    #[test]
    fn stats_count_and_bucket() {
        let index = index_of(vec![
            artifact("a", "2026-01-01", "plated", &["src/x.ts"]),
            artifact("b", "2026-02-01", "blocked", &["src/x.ts", "src/y.ts"]),
        ]);
        let stats = calculate_stats(&index, None, None);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status["plated"], 1);
        assert_eq!(stats.hot_files[0].file, "src/x.ts");
        assert_eq!(stats.hot_files[0].count, 2);
        assert_eq!(completion_rate(&stats), 50);
        assert_eq!(block_rate(&stats), 50);
    }

    #[test]
    fn since_filter_drops_older_artifacts() {
        let index = index_of(vec![
            artifact("old", "2025-01-01", "plated", &[]),
            artifact("new", "2026-02-01", "cooking", &[]),
        ]);
        let stats = calculate_stats(&index, Some("2026-01-01"), None);
        assert_eq!(stats.total, 1);
        assert!(!stats.by_status.contains_key("plated"));
    }

    #[test]
    fn blocker_reasons_roll_up() {
        let mut a = artifact("a", "2026-01-01", "blocked", &[]);
        a.blockers.push(IndexedBlocker {
            blocker_type: "status".to_string(),
            reason: "waiting on keys".to_string(),
        });
        let stats = calculate_stats(&index_of(vec![a]), None, None);
        assert_eq!(stats.blockers.total, 1);
        assert_eq!(stats.blockers.by_type["status"], 1);
        assert_eq!(stats.blockers.recent[0].reason, "waiting on keys");
    }

    #[test]
    fn search_prefers_title_matches() {
        let mut by_file = artifact("payment-flow", "2026-01-01", "cooking", &["src/login.ts"]);
        by_file.title = "Payment processing".to_string();
        let mut by_title = artifact("other", "2026-01-02", "cooking", &[]);
        by_title.title = "Login rework".to_string();
        let index = index_of(vec![by_file, by_title]);

        let hits = search_artifacts(&index, "login", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].artifact.slug, "other");
        assert_eq!(hits[0].score, 10);
        assert_eq!(hits[1].score, 2);
    }

    #[test]
    fn timeline_is_newest_first() {
        let mut a = artifact("a", "2026-01-01", "plated", &[]);
        a.decisions.push(crate::index::Decision {
            date: "2026-01-05".to_string(),
            phase: None,
            decision: "Chose approach B".to_string(),
            rationale: "simpler".to_string(),
        });
        let b = artifact("b", "2026-02-01", "cooking", &[]);
        let events = timeline(&index_of(vec![a, b]), 10);

        assert_eq!(events[0].date, "2026-02-01");
        assert_eq!(events[1].date, "2026-01-05");
        assert_eq!(events[1].event_type, "decision");
    }

    #[test]
    fn empty_index_yields_zero_rates() {
        let stats = calculate_stats(&index_of(vec![]), None, None);
        assert_eq!(completion_rate(&stats), 0);
        assert_eq!(block_rate(&stats), 0);
    }
}
