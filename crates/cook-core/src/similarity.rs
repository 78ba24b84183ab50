//! Similarity scoring over the artifact index.
//!
//! One tokenizer serves every similarity surface in the crate, so a score
//! computed against the index and one computed against audit history agree
//! on what counts as a keyword.

use crate::error::Result;
use crate::index::{self, ArtifactIndex, IndexedArtifact};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// Tokenizer and Jaccard
// ---------------------------------------------------------------------------

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "should", "could", "may", "might", "must", "can", "that",
    "this",
];

/// Lowercase, strip punctuation, drop stop words and tokens of one or two
/// characters.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Intersection over union. Two empty sets score 0, not 1.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn to_set<I: IntoIterator<Item = String>>(items: I) -> BTreeSet<String> {
    items.into_iter().collect()
}

fn lower_set(items: &[String]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}

/// Jaccard over lowercased path sets. Empty on either side scores 0.
pub fn file_similarity(files_a: &[String], files_b: &[String]) -> f64 {
    if files_a.is_empty() || files_b.is_empty() {
        return 0.0;
    }
    jaccard(&lower_set(files_a), &lower_set(files_b))
}

/// Jaccard over tokenized text.
pub fn text_similarity(text_a: &str, text_b: &str) -> f64 {
    if text_a.is_empty() || text_b.is_empty() {
        return 0.0;
    }
    jaccard(&to_set(tokenize(text_a)), &to_set(tokenize(text_b)))
}

// ---------------------------------------------------------------------------
// Index-based artifact similarity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub files: u32,
    pub title: u32,
    pub keywords: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimilarArtifact {
    pub artifact: IndexedArtifact,
    /// Combined score as a rounded percentage.
    pub similarity: u32,
    pub scores: ScoreBreakdown,
    pub matching_files: Vec<String>,
    pub key_decision: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SimilarityQuery {
    pub description: String,
    pub files: Vec<String>,
    /// Slug of the artifact being cooked, excluded from results.
    pub exclude: Option<String>,
    pub limit: Option<usize>,
    pub min_similarity: Option<u32>,
}

const DEFAULT_LIMIT: usize = 3;
const DEFAULT_MIN_SIMILARITY: u32 = 20;

const FILE_WEIGHT: f64 = 0.5;
const TITLE_WEIGHT: f64 = 0.3;
const KEYWORD_WEIGHT: f64 = 0.2;

fn pct(score: f64) -> u32 {
    (score * 100.0).round() as u32
}

/// Rank indexed artifacts against a feature description and its expected
/// files. Weights: files 50%, title 30%, keywords 20%.
pub fn find_similar_artifacts(
    index: &ArtifactIndex,
    query: &SimilarityQuery,
) -> Vec<SimilarArtifact> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    let min_similarity = query.min_similarity.unwrap_or(DEFAULT_MIN_SIMILARITY);

    let keywords = to_set(tokenize(&query.description));
    let query_files = lower_set(&query.files);

    let mut results = Vec::new();

    for artifact in &index.artifacts {
        if query.exclude.as_deref() == Some(artifact.slug.as_str()) {
            continue;
        }

        let file_sim = if query_files.is_empty() {
            0.0
        } else {
            jaccard(&query_files, &lower_set(&artifact.files_touched))
        };
        let title_sim = text_similarity(&query.description, &artifact.title);
        let keyword_sim = if keywords.is_empty() {
            0.0
        } else {
            jaccard(&keywords, &to_set(tokenize(&artifact.title)))
        };

        let combined = file_sim * FILE_WEIGHT + title_sim * TITLE_WEIGHT + keyword_sim * KEYWORD_WEIGHT;
        let similarity = pct(combined);
        if similarity < min_similarity {
            continue;
        }

        let matching_files = query
            .files
            .iter()
            .filter(|f| {
                let f = f.to_lowercase();
                artifact.files_touched.iter().any(|af| {
                    let af = af.to_lowercase();
                    af.contains(&f) || f.contains(&af)
                })
            })
            .cloned()
            .collect();

        results.push(SimilarArtifact {
            similarity,
            scores: ScoreBreakdown {
                files: pct(file_sim),
                title: pct(title_sim),
                keywords: pct(keyword_sim),
            },
            matching_files,
            key_decision: extract_key_decision(artifact),
            artifact: artifact.clone(),
        });
    }

    results.sort_by(|a, b| b.similarity.cmp(&a.similarity));
    results.truncate(limit);
    results
}

const KEY_DECISION_LEN: usize = 60;

/// The decision most likely to be worth resurfacing: one that records a
/// choice, else the last non-boilerplate entry.
pub fn extract_key_decision(artifact: &IndexedArtifact) -> Option<String> {
    if artifact.decisions.is_empty() {
        return None;
    }

    for keyword in ["selected", "chose", "use", "decided", "approved"] {
        if let Some(decision) = artifact
            .decisions
            .iter()
            .find(|d| d.decision.to_lowercase().contains(keyword))
        {
            return Some(truncate(&decision.decision, KEY_DECISION_LEN));
        }
    }

    artifact
        .decisions
        .iter()
        .filter(|d| {
            let lower = d.decision.to_lowercase();
            !lower.contains("artifact created") && !lower.contains("complete")
        })
        .next_back()
        .map(|d| truncate(&d.decision, KEY_DECISION_LEN))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let head: String = s.chars().take(max - 3).collect();
    format!("{head}...")
}

/// Convenience wrapper that keeps the index fresh before querying.
pub fn find_similar_with_index(
    cook_dir: &Path,
    index_path: &Path,
    query: &SimilarityQuery,
) -> Result<Vec<SimilarArtifact>> {
    let index = index::ensure_index(cook_dir, index_path)?;
    Ok(find_similar_artifacts(&index, query))
}

pub fn format_similar_artifacts(results: &[SimilarArtifact]) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut lines = vec![String::new(), "Similar dishes found:".to_string()];

    for (i, result) in results.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({}% similar)",
            i + 1,
            result.artifact.filename,
            result.similarity
        ));
        lines.push(format!("   \"{}\"", truncate(&result.artifact.title, 58)));

        if !result.matching_files.is_empty() {
            lines.push(format!(
                "   Files: {}",
                truncate(&result.matching_files.join(", "), 50)
            ));
        } else if !result.artifact.files_touched.is_empty() {
            let shown: Vec<&str> = result
                .artifact
                .files_touched
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            lines.push(format!("   Files: {}", truncate(&shown.join(", "), 50)));
        }

        if let Some(decision) = &result.key_decision {
            lines.push(format!("   Key decision: {}", truncate(decision, 42)));
        }
    }

    lines.push("Consider reusing patterns from these artifacts.".to_string());
    lines.push(String::new());

    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Decision, IndexStats};

    fn artifact(slug: &str, title: &str, files: &[&str]) -> IndexedArtifact {
        IndexedArtifact {
            path: format!("cook/{slug}.2026-01-01.cook.md"),
            filename: format!("{slug}.2026-01-01.cook.md"),
            slug: slug.to_string(),
            date: Some("2026-01-01".to_string()),
            status: "plated".to_string(),
            mode: "well-done".to_string(),
            title: title.to_string(),
            owner: None,
            files_touched: files.iter().map(|s| s.to_string()).collect(),
            risk_level: "low".to_string(),
            blockers: vec![],
            premortem: vec![],
            decisions: vec![],
            indexed_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn index_of(artifacts: Vec<IndexedArtifact>) -> ArtifactIndex {
        ArtifactIndex {
            version: "1.0.0".to_string(),
            generated_at: "2026-01-01T00:00:00Z".to_string(),
            cook_dir: "cook".to_string(),
            artifacts,
            errors: vec![],
            stats: IndexStats::default(),
        }
    }

    #[test]
    fn tokenize_drops_stop_words_and_short_tokens() {
        let tokens = tokenize("Add the OAuth login to an API");
        assert_eq!(tokens, vec!["add", "oauth", "login", "api"]);
    }

    #[test]
    fn tokenize_strips_punctuation() {
        let tokens = tokenize("refresh-token rotation (v2)!");
        assert_eq!(tokens, vec!["refresh", "token", "rotation"]);
    }

    #[test]
    fn jaccard_identical_sets_is_one() {
        let a = to_set(vec!["x".to_string(), "y".to_string()]);
        assert!((jaccard(&a, &a) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_of_two_empty_sets_is_zero() {
        assert_eq!(jaccard(&BTreeSet::new(), &BTreeSet::new()), 0.0);
    }

    #[test]
    fn jaccard_is_symmetric() {
        let a = to_set(vec!["x".to_string(), "y".to_string()]);
        let b = to_set(vec!["y".to_string(), "z".to_string()]);
        assert_eq!(jaccard(&a, &b), jaccard(&b, &a));
        assert!((jaccard(&a, &b) - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn file_similarity_is_case_insensitive() {
        let a = vec!["src/Auth.ts".to_string()];
        let b = vec!["src/auth.ts".to_string()];
        assert_eq!(file_similarity(&a, &b), 1.0);
    }

    #[test]
    fn finds_similar_by_shared_files() {
        let index = index_of(vec![
            artifact("login-rework", "Rework login flow", &["src/auth.ts", "src/session.ts"]),
            artifact("billing", "Billing exports", &["src/billing.ts"]),
        ]);
        let results = find_similar_artifacts(
            &index,
            &SimilarityQuery {
                description: "improve login flow".to_string(),
                files: vec!["src/auth.ts".to_string(), "src/session.ts".to_string()],
                ..Default::default()
            },
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].artifact.slug, "login-rework");
        assert!(results[0].similarity >= 50);
        assert_eq!(results[0].matching_files.len(), 2);
    }

    #[test]
    fn exclude_removes_the_current_artifact() {
        let index = index_of(vec![artifact(
            "login-rework",
            "Rework login flow",
            &["src/auth.ts"],
        )]);
        let results = find_similar_artifacts(
            &index,
            &SimilarityQuery {
                description: "rework login flow".to_string(),
                exclude: Some("login-rework".to_string()),
                ..Default::default()
            },
        );
        assert!(results.is_empty());
    }

    #[test]
    fn below_threshold_results_are_dropped() {
        let index = index_of(vec![artifact("billing", "Billing exports", &["src/billing.ts"])]);
        let results = find_similar_artifacts(
            &index,
            &SimilarityQuery {
                description: "dark mode toggle".to_string(),
                files: vec!["src/theme.ts".to_string()],
                ..Default::default()
            },
        );
        assert!(results.is_empty());
    }

    #[test]
    fn key_decision_prefers_choice_verbs() {
        let mut a = artifact("x", "X", &[]);
        a.decisions = vec![
            Decision {
                date: "2026-01-01".to_string(),
                phase: None,
                decision: "Artifact created".to_string(),
                rationale: String::new(),
            },
            Decision {
                date: "2026-01-02".to_string(),
                phase: None,
                decision: "Chose cursor pagination over offsets".to_string(),
                rationale: "stable under writes".to_string(),
            },
        ];
        assert_eq!(
            extract_key_decision(&a).unwrap(),
            "Chose cursor pagination over offsets"
        );
    }

    #[test]
    fn key_decision_skips_boilerplate() {
        let mut a = artifact("x", "X", &[]);
        a.decisions = vec![Decision {
            date: "2026-01-01".to_string(),
            phase: None,
            decision: "Artifact created".to_string(),
            rationale: String::new(),
        }];
        assert!(extract_key_decision(&a).is_none());
    }

    #[test]
    fn format_is_none_for_empty_results() {
        assert!(format_similar_artifacts(&[]).is_none());
    }
}
