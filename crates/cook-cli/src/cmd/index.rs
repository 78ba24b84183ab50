use crate::output::{print_json, print_table};
use clap::Subcommand;
use cook_core::analytics::{calculate_stats, format_stats, search_artifacts, timeline};
use cook_core::index::{build_index, ensure_index, is_stale, load_index, save_index};
use cook_core::paths;
use cook_core::similarity::{find_similar_with_index, format_similar_artifacts, SimilarityQuery};
use std::path::Path;

#[derive(Subcommand)]
pub enum IndexSubcommand {
    /// Rebuild the artifact index from the cook directory
    Build,
    /// Show the indexed artifacts
    Show,
    /// Check whether the index is older than the artifacts
    Stale,
    /// Aggregate stats over the indexed artifacts
    Stats {
        /// Only count artifacts dated on or after (YYYY-MM-DD)
        #[arg(long)]
        since: Option<String>,
        /// Only count artifacts dated on or before (YYYY-MM-DD)
        #[arg(long)]
        until: Option<String>,
    },
    /// Search titles, slugs, files, and decisions
    Search {
        query: String,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Creation and decision events, newest first
    Timeline {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Find past artifacts similar to a description and file set
    Similar {
        description: String,
        /// Files the new work will touch (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
        /// Slug to exclude from results
        #[arg(long)]
        exclude: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
        /// Minimum similarity percentage
        #[arg(long)]
        min_similarity: Option<u32>,
    },
}

pub fn run(root: &Path, subcmd: IndexSubcommand, json: bool) -> anyhow::Result<()> {
    let cook_dir = paths::cook_dir(root);
    let index_path = paths::index_path(root);

    match subcmd {
        IndexSubcommand::Build => {
            let index = build_index(&cook_dir);
            save_index(&index, &index_path)?;
            if json {
                print_json(&index.stats)?;
            } else {
                println!(
                    "Indexed {} artifact(s), {} error(s) -> {}",
                    index.artifacts.len(),
                    index.errors.len(),
                    index_path.display()
                );
            }
            Ok(())
        }
        IndexSubcommand::Show => {
            let index = ensure_index(&cook_dir, &index_path)?;
            if json {
                print_json(&index)?;
            } else {
                let rows = index
                    .artifacts
                    .iter()
                    .map(|a| {
                        vec![
                            a.slug.clone(),
                            a.date.clone().unwrap_or_default(),
                            a.status.clone(),
                            a.mode.clone(),
                            a.risk_level.clone(),
                        ]
                    })
                    .collect();
                print_table(&["SLUG", "DATE", "STATUS", "MODE", "RISK"], rows);
            }
            Ok(())
        }
        IndexSubcommand::Stale => {
            let stale = match load_index(&index_path) {
                Ok(index) => is_stale(&index, &cook_dir),
                Err(_) => true,
            };
            if json {
                print_json(&serde_json::json!({ "stale": stale }))?;
            } else {
                println!("{}", if stale { "stale" } else { "fresh" });
            }
            if stale {
                std::process::exit(1);
            }
            Ok(())
        }
        IndexSubcommand::Stats { since, until } => {
            let index = ensure_index(&cook_dir, &index_path)?;
            let stats = calculate_stats(&index, since.as_deref(), until.as_deref());
            if json {
                print_json(&stats)?;
            } else {
                println!("{}", format_stats(&stats));
            }
            Ok(())
        }
        IndexSubcommand::Search { query, limit } => {
            let index = ensure_index(&cook_dir, &index_path)?;
            let hits = search_artifacts(&index, &query, limit);
            if json {
                print_json(&hits)?;
            } else if hits.is_empty() {
                println!("No artifacts match '{query}'");
            } else {
                let rows = hits
                    .iter()
                    .map(|h| {
                        vec![
                            h.artifact.slug.clone(),
                            h.score.to_string(),
                            h.matches.join(", "),
                        ]
                    })
                    .collect();
                print_table(&["SLUG", "SCORE", "MATCHED"], rows);
            }
            Ok(())
        }
        IndexSubcommand::Timeline { limit } => {
            let index = ensure_index(&cook_dir, &index_path)?;
            let events = timeline(&index, limit);
            if json {
                print_json(&events)?;
            } else {
                let rows = events
                    .iter()
                    .map(|e| {
                        vec![
                            e.date.clone(),
                            e.event_type.clone(),
                            e.artifact.clone(),
                            e.summary.clone(),
                        ]
                    })
                    .collect();
                print_table(&["DATE", "TYPE", "ARTIFACT", "SUMMARY"], rows);
            }
            Ok(())
        }
        IndexSubcommand::Similar {
            description,
            files,
            exclude,
            limit,
            min_similarity,
        } => {
            let query = SimilarityQuery {
                description,
                files,
                exclude,
                limit,
                min_similarity,
            };
            let results = find_similar_with_index(&cook_dir, &index_path, &query)?;
            if json {
                print_json(&results)?;
            } else {
                match format_similar_artifacts(&results) {
                    Some(text) => println!("{text}"),
                    None => println!("No similar past artifacts found"),
                }
            }
            Ok(())
        }
    }
}
