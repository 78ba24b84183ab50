use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use cook_core::audit::{AuditEntry, AuditLog};
use cook_core::paths;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Subcommand)]
pub enum AuditSubcommand {
    /// List known order ids
    List,
    /// Show all events for one order
    Show { order_id: String },
    /// Append an event to the audit log
    Log {
        #[command(subcommand)]
        event: LogEvent,
    },
}

#[derive(Subcommand)]
pub enum LogEvent {
    /// A chef picked up a phase
    PhaseStart {
        order_id: String,
        phase: String,
        #[arg(long, default_value = "unknown")]
        chef: String,
    },
    /// A chef finished a phase with a verdict
    PhaseComplete {
        order_id: String,
        phase: String,
        #[arg(long, default_value = "unknown")]
        chef: String,
        #[arg(long, default_value = "pass")]
        verdict: String,
        /// Extra fields as a JSON object, spread into the entry
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Work moved to a more senior chef
    Escalation {
        order_id: String,
        from_chef: String,
        to_chef: String,
        #[arg(long, default_value = "unspecified")]
        reason: String,
        #[arg(long)]
        condition: Option<String>,
    },
    /// Something is in the way
    Blocker {
        order_id: String,
        phase: String,
        #[arg(long = "type", default_value = "unknown")]
        blocker_type: String,
        description: String,
        #[arg(long, default_value = "medium")]
        severity: String,
    },
    /// Context passed between chefs
    Handoff {
        order_id: String,
        from_chef: String,
        to_chef: String,
        #[arg(long, default_value = "complete")]
        status: String,
        #[arg(long = "missing")]
        missing_fields: Vec<String>,
    },
    /// An artifact failed validation
    ValidationFailure {
        order_id: String,
        phase: String,
        #[arg(long, default_value = "unknown")]
        chef: String,
        /// Failure details as a JSON value
        #[arg(long, default_value = "{}")]
        details: String,
    },
    /// A human stepped in
    HumanIntervention {
        order_id: String,
        phase: String,
        reason: String,
        #[arg(long)]
        resolution: Option<String>,
    },
    /// The order is done
    CookComplete {
        order_id: String,
        #[arg(long, default_value = "complete")]
        status: String,
        #[arg(long, default_value = "0")]
        duration_seconds: f64,
        /// Summary as a JSON value
        #[arg(long, default_value = "{}")]
        summary: String,
    },
}

pub fn run(root: &Path, subcmd: AuditSubcommand, json: bool) -> anyhow::Result<()> {
    let log = AuditLog::at(paths::audit_path(root));

    match subcmd {
        AuditSubcommand::List => {
            let ids = log.order_ids();
            if json {
                print_json(&ids)?;
            } else if ids.is_empty() {
                println!("No orders logged yet");
            } else {
                for id in ids {
                    println!("{id}");
                }
            }
            Ok(())
        }
        AuditSubcommand::Show { order_id } => {
            let entries = log.order_entries(&order_id);
            if json {
                print_json(&entries)?;
            } else if entries.is_empty() {
                println!("No events for order '{order_id}'");
            } else {
                let rows = entries.iter().map(entry_row).collect();
                print_table(&["TIMESTAMP", "EVENT", "PHASE", "DETAIL"], rows);
            }
            Ok(())
        }
        AuditSubcommand::Log { event } => {
            let entry = append_event(&log, event)?;
            if json {
                print_json(&entry)?;
            } else {
                println!("Logged {} for {}", entry.event_type, entry.order_id);
            }
            Ok(())
        }
    }
}

fn append_event(log: &AuditLog, event: LogEvent) -> anyhow::Result<AuditEntry> {
    let entry = match event {
        LogEvent::PhaseStart {
            order_id,
            phase,
            chef,
        } => log.phase_start(&order_id, &phase, &chef)?,
        LogEvent::PhaseComplete {
            order_id,
            phase,
            chef,
            verdict,
            metadata,
        } => {
            let extra: BTreeMap<String, Value> = match metadata {
                Some(raw) => {
                    serde_json::from_str(&raw).context("--metadata must be a JSON object")?
                }
                None => BTreeMap::new(),
            };
            log.phase_complete(&order_id, &phase, &chef, &verdict, extra)?
        }
        LogEvent::Escalation {
            order_id,
            from_chef,
            to_chef,
            reason,
            condition,
        } => log.escalation(&order_id, &from_chef, &to_chef, &reason, condition.as_deref())?,
        LogEvent::Blocker {
            order_id,
            phase,
            blocker_type,
            description,
            severity,
        } => log.blocker(&order_id, &phase, &blocker_type, &description, &severity)?,
        LogEvent::Handoff {
            order_id,
            from_chef,
            to_chef,
            status,
            missing_fields,
        } => log.handoff(&order_id, &from_chef, &to_chef, &status, missing_fields)?,
        LogEvent::ValidationFailure {
            order_id,
            phase,
            chef,
            details,
        } => {
            let details: Value =
                serde_json::from_str(&details).context("--details must be valid JSON")?;
            log.validation_failure(&order_id, &phase, &chef, details)?
        }
        LogEvent::HumanIntervention {
            order_id,
            phase,
            reason,
            resolution,
        } => log.human_intervention(&order_id, &phase, &reason, resolution.as_deref())?,
        LogEvent::CookComplete {
            order_id,
            status,
            duration_seconds,
            summary,
        } => {
            let summary: Value =
                serde_json::from_str(&summary).context("--summary must be valid JSON")?;
            log.cook_complete(&order_id, &status, duration_seconds, summary)?
        }
    };
    Ok(entry)
}

fn entry_row(entry: &AuditEntry) -> Vec<String> {
    let detail = if let Some(esc) = &entry.escalation {
        format!("{} -> {}: {}", esc.from_chef, esc.to_chef, esc.reason)
    } else if let Some(blockers) = &entry.blockers {
        blockers
            .iter()
            .map(|b| format!("[{}] {}", b.severity, b.description))
            .collect::<Vec<_>>()
            .join("; ")
    } else if let Some(h) = &entry.handoff {
        format!("{} -> {} ({})", h.from_chef, h.to_chef, h.validation_status)
    } else {
        entry.verdict.clone().unwrap_or_default()
    };
    vec![
        entry.timestamp.clone(),
        entry.event_type.to_string(),
        entry.phase.clone().unwrap_or_default(),
        detail,
    ]
}
