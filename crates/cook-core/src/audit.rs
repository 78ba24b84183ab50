//! Append-only audit log, one JSON object per line.
//!
//! Every significant event during a cook lands here so the pattern miner
//! can learn across orders. Writes go through a single appender; readers
//! tolerate and skip malformed lines so one bad write never poisons the
//! whole history.

use crate::context::RunContext;
use crate::error::Result;
use crate::io;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Entry schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PhaseStart,
    PhaseComplete,
    Escalation,
    Blocker,
    Handoff,
    ValidationFailure,
    HumanIntervention,
    CookComplete,
    /// Forward compatibility: event types from newer writers still parse.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::PhaseStart => "phase_start",
            EventType::PhaseComplete => "phase_complete",
            EventType::Escalation => "escalation",
            EventType::Blocker => "blocker",
            EventType::Handoff => "handoff",
            EventType::ValidationFailure => "validation_failure",
            EventType::HumanIntervention => "human_intervention",
            EventType::CookComplete => "cook_complete",
            EventType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub from_chef: String,
    pub to_chef: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    #[serde(rename = "type")]
    pub blocker_type: String,
    pub description: String,
    pub severity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub from_chef: String,
    pub to_chef: String,
    pub validation_status: String,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

/// One audit log line. Only `timestamp`, `order_id` and `event_type` are
/// always present; the rest depends on the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub order_id: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chef_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<Escalation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockers: Option<Vec<Blocker>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<Handoff>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Free-form fields spread into phase_complete entries.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AuditEntry {
    fn base(order_id: &str, event_type: EventType) -> Self {
        AuditEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            order_id: order_id.to_string(),
            event_type,
            phase: None,
            chef_id: None,
            verdict: None,
            escalated: None,
            escalation: None,
            blockers: None,
            handoff: None,
            duration_seconds: None,
            metadata: None,
            extra: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Log handle
// ---------------------------------------------------------------------------

/// Handle on one audit file. Cheap to construct, holds no open file.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(ctx: &RunContext) -> Self {
        AuditLog {
            path: ctx.audit_path(),
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        AuditLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        io::append_line(&self.path, &line)?;
        tracing::debug!(
            order_id = %entry.order_id,
            event = ?entry.event_type,
            "audit entry recorded"
        );
        Ok(())
    }

    // -- writers ------------------------------------------------------------

    pub fn phase_start(&self, order_id: &str, phase: &str, chef_id: &str) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::PhaseStart);
        entry.phase = Some(phase.to_string());
        entry.chef_id = Some(chef_id.to_string());
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn phase_complete(
        &self,
        order_id: &str,
        phase: &str,
        chef_id: &str,
        verdict: &str,
        metadata: BTreeMap<String, Value>,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::PhaseComplete);
        entry.phase = Some(phase.to_string());
        entry.chef_id = Some(chef_id.to_string());
        entry.verdict = Some(verdict.to_string());
        entry.extra = metadata;
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn escalation(
        &self,
        order_id: &str,
        from_chef: &str,
        to_chef: &str,
        reason: &str,
        condition: Option<&str>,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::Escalation);
        entry.escalated = Some(true);
        entry.escalation = Some(Escalation {
            from_chef: from_chef.to_string(),
            to_chef: to_chef.to_string(),
            reason: reason.to_string(),
            condition: condition.map(str::to_string),
        });
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn blocker(
        &self,
        order_id: &str,
        phase: &str,
        blocker_type: &str,
        description: &str,
        severity: &str,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::Blocker);
        entry.phase = Some(phase.to_string());
        entry.blockers = Some(vec![Blocker {
            blocker_type: blocker_type.to_string(),
            description: description.to_string(),
            severity: severity.to_string(),
        }]);
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn handoff(
        &self,
        order_id: &str,
        from_chef: &str,
        to_chef: &str,
        validation_status: &str,
        missing_fields: Vec<String>,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::Handoff);
        entry.handoff = Some(Handoff {
            from_chef: from_chef.to_string(),
            to_chef: to_chef.to_string(),
            validation_status: validation_status.to_string(),
            missing_fields,
        });
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn validation_failure(
        &self,
        order_id: &str,
        phase: &str,
        chef_id: &str,
        details: Value,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::ValidationFailure);
        entry.phase = Some(phase.to_string());
        entry.chef_id = Some(chef_id.to_string());
        entry.metadata = Some(details);
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn human_intervention(
        &self,
        order_id: &str,
        phase: &str,
        reason: &str,
        resolution: Option<&str>,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::HumanIntervention);
        entry.phase = Some(phase.to_string());
        entry.metadata = Some(serde_json::json!({
            "reason": reason,
            "resolution": resolution,
        }));
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn cook_complete(
        &self,
        order_id: &str,
        final_status: &str,
        duration_seconds: f64,
        summary: Value,
    ) -> Result<AuditEntry> {
        let mut entry = AuditEntry::base(order_id, EventType::CookComplete);
        entry.verdict = Some(final_status.to_string());
        entry.duration_seconds = Some(duration_seconds);
        entry.metadata = Some(summary);
        self.append(&entry)?;
        Ok(entry)
    }

    // -- readers ------------------------------------------------------------

    /// All entries in file order. A missing file is an empty history;
    /// malformed lines are skipped with a warning.
    pub fn entries(&self) -> Vec<AuditEntry> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        let mut entries = Vec::new();
        for (i, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    tracing::warn!(line = i + 1, %err, "skipping malformed audit line");
                }
            }
        }
        entries
    }

    pub fn order_entries(&self, order_id: &str) -> Vec<AuditEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.order_id == order_id)
            .collect()
    }

    /// Unique order ids in first-seen order.
    pub fn order_ids(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in self.entries() {
            if !seen.contains(&entry.order_id) {
                seen.push(entry.order_id);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_in(dir: &TempDir) -> AuditLog {
        AuditLog::at(dir.path().join("audit.jsonl"))
    }

    #[test]
    fn round_trips_phase_events() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);

        log.phase_start("order-1", "prep", "sous").unwrap();
        let mut meta = BTreeMap::new();
        meta.insert("coverage".to_string(), serde_json::json!("3/3"));
        log.phase_complete("order-1", "prep", "sous", "READY", meta)
            .unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event_type, EventType::PhaseStart);
        assert_eq!(entries[1].verdict.as_deref(), Some("READY"));
        assert_eq!(entries[1].extra["coverage"], serde_json::json!("3/3"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.phase_start("order-1", "prep", "sous").unwrap();
        std::fs::OpenOptions::new()
            .append(true)
            .open(log.path())
            .and_then(|mut f| {
                use std::io::Write;
                writeln!(f, "{{not json")
            })
            .unwrap();
        log.blocker("order-1", "review", "missing_tests", "no tests", "HIGH")
            .unwrap();

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].event_type, EventType::Blocker);
    }

    #[test]
    fn groups_by_order_and_lists_ids_in_first_seen_order() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.phase_start("b-order", "prep", "sous").unwrap();
        log.phase_start("a-order", "prep", "sous").unwrap();
        log.cook_complete("b-order", "plated", 120.0, serde_json::json!({}))
            .unwrap();

        assert_eq!(log.order_ids(), vec!["b-order", "a-order"]);
        assert_eq!(log.order_entries("b-order").len(), 2);
        assert_eq!(log.order_entries("missing").len(), 0);
    }

    #[test]
    fn escalation_carries_from_to_and_reason() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        log.escalation("o1", "line-cook", "head-chef", "3 failed attempts", None)
            .unwrap();

        let entries = log.entries();
        let esc = entries[0].escalation.as_ref().unwrap();
        assert_eq!(esc.from_chef, "line-cook");
        assert_eq!(esc.to_chef, "head-chef");
        assert_eq!(entries[0].escalated, Some(true));
    }

    #[test]
    fn unknown_event_type_still_parses() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        std::fs::write(
            log.path(),
            "{\"timestamp\":\"2026-01-01T00:00:00Z\",\"order_id\":\"o1\",\"event_type\":\"telemetry_v2\"}\n",
        )
        .unwrap();
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, EventType::Unknown);
    }

    #[test]
    fn missing_file_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let log = log_in(&dir);
        assert!(log.entries().is_empty());
        assert!(log.order_ids().is_empty());
    }
}
