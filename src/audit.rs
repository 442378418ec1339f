//! Audit trail
//!
//! One immutable entry per candidate edit, appended in arrival order.
//! The order is part of the contract: every report walks the entries as
//! the planner proposed them, never risk-sorted. The recorder is owned by
//! the single sequential pipeline loop; nothing else writes to it.

use crate::executor::ExecutionResult;
use crate::gate::Decision;
use crate::plan::CandidateEdit;
use crate::report::RunResult;
use crate::risk::RiskAssessment;
use crate::task::Task;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

/// The full record for one candidate edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub edit: CandidateEdit,
    /// Absent when path validation failed and evaluation was skipped.
    pub assessment: Option<RiskAssessment>,
    pub decision: Decision,
    /// Absent only if the run aborted before this edit reached execution.
    pub execution: Option<ExecutionResult>,
    /// Human-readable path rejection detail, when that is why it rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_error: Option<String>,
}

/// Append-only list of audit entries.
#[derive(Debug, Default)]
pub struct AuditRecorder {
    entries: Vec<AuditEntry>,
}

impl AuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one entry. Entries are never rewritten once recorded.
    pub fn record(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<AuditEntry> {
        self.entries
    }
}

/// Write the audit trail JSON document for one finished run.
///
/// Exported even for zero-edit runs, so CI always has the artifact.
pub fn export_trail(task: &Task, run: &RunResult, path: &Path) -> Result<()> {
    let now = Utc::now();
    let duration = (now - task.started_at).num_milliseconds() as f64 / 1000.0;

    let executed = run
        .entries
        .iter()
        .filter(|e| {
            e.execution
                .as_ref()
                .map(|x| x.status == crate::executor::ExecutionStatus::Applied)
                .unwrap_or(false)
        })
        .count();

    let document = json!({
        "audit_metadata": {
            "export_version": "1.0",
            "tool_version": format!("safegate {}", env!("CARGO_PKG_VERSION")),
            "compliance_mode": task.modes.compliance_mode,
            "export_timestamp": now.to_rfc3339(),
        },
        "task": {
            "task_description": task.description,
            "requested_at": task.started_at.to_rfc3339(),
            "requested_by": task.requested_by,
            "working_directory": task.root.display().to_string(),
        },
        "changes": run.entries,
        "summary": {
            "total_changes_planned": run.entries.len(),
            "changes_approved": run.approved_count(),
            "changes_rejected": run.rejected_count(),
            "changes_executed": executed,
            "max_risk_level_seen": run.max_risk_level_seen,
            "policy_violations": run.policy_deny_count(),
            "duration_seconds": duration,
        },
    });

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let content = serde_json::to_string_pretty(&document)?;
    std::fs::write(path, content + "\n")
        .with_context(|| format!("failed to write audit trail to {}", path.display()))?;
    Ok(())
}
