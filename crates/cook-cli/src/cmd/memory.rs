use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use cook_core::audit::AuditLog;
use cook_core::memory::{
    format_insights, insights_for_phase, query_similar, Feedback, FeatureContext, FeedbackLog,
};
use cook_core::paths;
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;

#[derive(Subcommand)]
pub enum MemorySubcommand {
    /// Find past orders similar to a feature description and file set
    Query {
        description: String,
        /// Files the new work will touch (repeatable)
        #[arg(long = "file")]
        files: Vec<String>,
    },
    /// Historical insights for a phase of a new feature
    Insights {
        phase: String,
        description: String,
        #[arg(long = "file")]
        files: Vec<String>,
    },
    /// Record whether an insight helped (helpful, not_helpful, wrong)
    Feedback {
        order_id: String,
        insight_type: String,
        feedback: String,
        /// Free-form JSON context
        #[arg(long, default_value = "{}")]
        context: String,
    },
    /// Aggregate feedback counts
    FeedbackStats,
}

pub fn run(root: &Path, subcmd: MemorySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        MemorySubcommand::Query { description, files } => {
            let log = AuditLog::at(paths::audit_path(root));
            let feature = FeatureContext { description, files };
            let similar = query_similar(&log, &feature);
            if json {
                print_json(&similar)?;
            } else if similar.is_empty() {
                println!("No similar past orders found");
            } else {
                println!("{}", format_insights(&similar, None));
            }
            Ok(())
        }
        MemorySubcommand::Insights {
            phase,
            description,
            files,
        } => {
            let log = AuditLog::at(paths::audit_path(root));
            let entries = log.entries();
            let feature = FeatureContext { description, files };
            let similar = query_similar(&log, &feature);
            let insights = insights_for_phase(&entries, &phase, &feature);
            if json {
                print_json(&insights)?;
            } else {
                println!("{}", format_insights(&similar, Some(&insights)));
            }
            Ok(())
        }
        MemorySubcommand::Feedback {
            order_id,
            insight_type,
            feedback,
            context,
        } => {
            let feedback = Feedback::from_str(&feedback)?;
            let context: Value =
                serde_json::from_str(&context).context("--context must be valid JSON")?;
            let log = FeedbackLog::at(paths::feedback_path(root));
            let entry = log.record(&order_id, &insight_type, feedback, context)?;
            if json {
                print_json(&entry)?;
            } else {
                println!("Recorded {} feedback for {}", entry.feedback, entry.order_id);
            }
            Ok(())
        }
        MemorySubcommand::FeedbackStats => {
            let log = FeedbackLog::at(paths::feedback_path(root));
            let stats = log.stats();
            if json {
                print_json(&stats)?;
            } else {
                println!(
                    "{} feedback entries: {} helpful, {} not helpful, {} wrong",
                    stats.total, stats.counts.helpful, stats.counts.not_helpful, stats.counts.wrong
                );
            }
            Ok(())
        }
    }
}
