use crate::output::{print_json, print_table};
use clap::Subcommand;
use cook_core::audit::AuditLog;
use cook_core::paths;
use cook_core::patterns::{
    analyze, find_escalation_patterns, find_phase_statistics, find_prediction_accuracy,
    find_recurring_blockers, suggest_improvements,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum PatternsSubcommand {
    /// Blockers seen across multiple orders
    Blockers {
        /// Minimum distinct orders a blocker must appear in
        #[arg(long, default_value = "2")]
        min_orders: usize,
    },
    /// Escalation pairs and their reasons
    Escalations,
    /// Per-phase verdicts, durations, and block rates
    Phases,
    /// How often pre-mortem risks actually materialized
    Accuracy,
    /// Threshold-based improvement suggestions
    Suggest,
    /// Everything at once
    Report,
}

pub fn run(root: &Path, subcmd: PatternsSubcommand, json: bool) -> anyhow::Result<()> {
    let log = AuditLog::at(paths::audit_path(root));
    let entries = log.entries();

    match subcmd {
        PatternsSubcommand::Blockers { min_orders } => {
            let blockers = find_recurring_blockers(&entries, min_orders);
            if json {
                print_json(&blockers)?;
            } else if blockers.is_empty() {
                println!("No recurring blockers");
            } else {
                let rows = blockers
                    .iter()
                    .map(|b| {
                        vec![
                            b.blocker_type.clone(),
                            b.severity.clone(),
                            b.count.to_string(),
                            b.orders.len().to_string(),
                        ]
                    })
                    .collect();
                print_table(&["TYPE", "SEVERITY", "COUNT", "ORDERS"], rows);
            }
        }
        PatternsSubcommand::Escalations => {
            let escalations = find_escalation_patterns(&entries);
            if json {
                print_json(&escalations)?;
            } else if escalations.is_empty() {
                println!("No escalations logged");
            } else {
                let rows = escalations
                    .iter()
                    .map(|e| {
                        let top_reason = e
                            .reasons
                            .iter()
                            .max_by_key(|(_, n)| **n)
                            .map(|(r, _)| r.clone())
                            .unwrap_or_default();
                        vec![
                            e.from_chef.clone(),
                            e.to_chef.clone(),
                            e.count.to_string(),
                            top_reason,
                        ]
                    })
                    .collect();
                print_table(&["FROM", "TO", "COUNT", "TOP REASON"], rows);
            }
        }
        PatternsSubcommand::Phases => {
            let phases = find_phase_statistics(&entries);
            if json {
                print_json(&phases)?;
            } else if phases.is_empty() {
                println!("No phase completions logged");
            } else {
                let rows = phases
                    .iter()
                    .map(|p| {
                        vec![
                            p.phase.clone(),
                            p.total_count.to_string(),
                            format!("{:.0}s", p.avg_duration),
                            format!("{:.0}%", p.block_rate),
                        ]
                    })
                    .collect();
                print_table(&["PHASE", "RUNS", "AVG DURATION", "BLOCK RATE"], rows);
            }
        }
        PatternsSubcommand::Accuracy => {
            let accuracy = find_prediction_accuracy(&entries);
            if json {
                print_json(&accuracy)?;
            } else {
                match accuracy.overall.accuracy {
                    Some(pct) => println!(
                        "Pre-mortem accuracy: {pct:.0}% ({}/{} predictions materialized)",
                        accuracy.overall.correct_predictions, accuracy.overall.total_predictions
                    ),
                    None => println!("No pre-mortem predictions logged"),
                }
            }
        }
        PatternsSubcommand::Suggest => {
            let suggestions = suggest_improvements(&entries);
            if json {
                print_json(&suggestions)?;
            } else if suggestions.is_empty() {
                println!("Nothing to suggest");
            } else {
                for s in &suggestions {
                    println!("[{}] {}", s.priority, s.message);
                }
            }
        }
        PatternsSubcommand::Report => {
            let report = analyze(&entries);
            if json {
                print_json(&report)?;
            } else {
                println!(
                    "{} event(s) across {} order(s)",
                    report.summary.total_events, report.summary.total_orders
                );
                println!(
                    "Recurring blockers: {}, escalation pairs: {}, phases: {}",
                    report.recurring_blockers.len(),
                    report.escalation_patterns.len(),
                    report.phase_statistics.len()
                );
                for s in &report.suggestions {
                    println!("[{}] {}", s.priority, s.message);
                }
            }
        }
    }
    Ok(())
}
