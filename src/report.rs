//! Run aggregation and reporting
//!
//! [`RunAggregator`] folds the audit entries of one finished run into a
//! [`RunResult`]; every artifact (console summary, CI markdown, scorecard,
//! policy report, machine report) renders from that single value, so the
//! numbers can never disagree between outputs.

use crate::audit::AuditEntry;
use crate::executor::ExecutionStatus;
use crate::gate::{DecisionOutcome, ReasonCode};
use crate::risk::RiskLevel;
use crate::task::Task;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeSet;

/// Everything reportable about one finished run.
#[derive(Debug)]
pub struct RunResult {
    pub entries: Vec<AuditEntry>,
    /// Highest risk level over edits that were actually evaluated.
    /// `None` when no edit produced an assessment.
    pub max_risk_level_seen: Option<RiskLevel>,
    /// The configured fail-on-risk threshold was met or exceeded.
    pub risk_policy_failed: bool,
    pub overall_success: bool,
}

impl RunResult {
    pub fn approved_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.decision.outcome == DecisionOutcome::Approved)
            .count()
    }

    pub fn rejected_count(&self) -> usize {
        self.entries.len() - self.approved_count()
    }

    pub fn applied_count(&self) -> usize {
        self.with_execution_status(ExecutionStatus::Applied)
    }

    pub fn execution_failure_count(&self) -> usize {
        self.with_execution_status(ExecutionStatus::Failed)
    }

    pub fn policy_deny_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.decision.reason == ReasonCode::PolicyDeny)
            .count()
    }

    fn with_execution_status(&self, status: ExecutionStatus) -> usize {
        self.entries
            .iter()
            .filter(|e| e.execution.as_ref().map(|x| x.status) == Some(status))
            .count()
    }

    /// Rule ids of policy DENY rules that rejected at least one edit.
    pub fn blocking_rule_ids(&self) -> Vec<String> {
        let ids: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|e| e.decision.reason == ReasonCode::PolicyDeny)
            .filter_map(|e| e.assessment.as_ref())
            .filter_map(|a| a.policy.as_ref())
            .filter_map(|p| p.rule_id.clone())
            .collect();
        ids.into_iter().collect()
    }

    /// Unique scanner reason ids seen across all assessments.
    pub fn scanner_reason_ids(&self) -> Vec<String> {
        let ids: BTreeSet<String> = self
            .entries
            .iter()
            .filter_map(|e| e.assessment.as_ref())
            .filter_map(|a| a.scanner.as_ref())
            .flat_map(|s| s.reason_ids.iter().cloned())
            .collect();
        ids.into_iter().collect()
    }

    /// At least one edit was rejected only because no human was available
    /// to approve it.
    pub fn requires_approval(&self) -> bool {
        self.entries.iter().any(|e| {
            matches!(
                e.decision.reason,
                ReasonCode::RiskAboveNoninteractiveThreshold
                    | ReasonCode::ComplianceModeRequiresExplicitApproval
            )
        })
    }

    fn count_reason(&self, reason: ReasonCode) -> usize {
        self.entries
            .iter()
            .filter(|e| e.decision.reason == reason)
            .count()
    }
}

/// Folds recorded entries into the run's single source of truth.
pub struct RunAggregator;

impl RunAggregator {
    pub fn aggregate(task: &Task, entries: Vec<AuditEntry>) -> RunResult {
        // Path-unsafe edits carry no assessment and contribute no level.
        let max_risk_level_seen = entries
            .iter()
            .filter_map(|e| e.assessment.as_ref())
            .map(|a| a.risk_level)
            .max();

        let risk_policy_failed = match (task.fail_on_risk, max_risk_level_seen) {
            (Some(threshold), Some(max)) => max >= threshold,
            _ => false,
        };

        let execution_failed = entries.iter().any(|e| {
            e.decision.outcome == DecisionOutcome::Approved
                && e.execution.as_ref().map(|x| x.status) == Some(ExecutionStatus::Failed)
        });

        RunResult {
            entries,
            max_risk_level_seen,
            risk_policy_failed,
            overall_success: !risk_policy_failed && !execution_failed,
        }
    }
}

fn recommended_next_actions(task: &Task, run: &RunResult) -> Vec<String> {
    let mut actions = Vec::new();

    let blocking = run.blocking_rule_ids();
    if !blocking.is_empty() {
        actions.push(format!(
            "Review blocking policy rules ({}) and adjust task scope or policy.",
            blocking.join(", ")
        ));
    }
    if run.risk_policy_failed {
        if let Some(threshold) = task.fail_on_risk {
            actions.push(format!(
                "Reduce change risk or adjust --fail-on-risk (currently {}).",
                threshold.as_str()
            ));
        }
    }
    if run.requires_approval() {
        actions.push(
            "Re-run interactively for manual approvals or use a more permissive policy."
                .to_string(),
        );
    }
    let scanner = run.scanner_reason_ids();
    if !scanner.is_empty() {
        actions.push(format!(
            "Investigate scanner findings before merge ({}).",
            scanner.join(", ")
        ));
    }
    if actions.is_empty() {
        actions.push("No blocking findings. Safe to continue with normal review.".to_string());
    }
    actions
}

fn max_risk_label(run: &RunResult) -> String {
    run.max_risk_level_seen
        .map(|l| l.as_str().to_uppercase())
        .unwrap_or_else(|| "NONE".to_string())
}

/// Console summary printed at the end of every run.
pub fn render_summary(task: &Task, run: &RunResult) -> String {
    let mut lines = Vec::new();
    lines.push(String::new());
    lines.push("Run summary".to_string());
    lines.push(format!("  Task: {}", task.description));
    if task.modes.dry_run {
        lines.push("  Mode: dry run (no files were changed)".to_string());
    }
    lines.push(format!(
        "  Planned {} | approved {} | rejected {} | applied {}",
        run.entries.len(),
        run.approved_count(),
        run.rejected_count(),
        run.applied_count()
    ));
    lines.push(format!("  Max risk seen: {}", max_risk_label(run)));

    for entry in &run.entries {
        let marker = match entry.decision.outcome {
            DecisionOutcome::Approved => "+",
            DecisionOutcome::Rejected => "-",
        };
        let level = entry
            .assessment
            .as_ref()
            .map(|a| a.risk_level.as_str().to_uppercase())
            .unwrap_or_else(|| "-".to_string());
        let mut line = format!(
            "  {} {} {} [{}] {}",
            marker,
            entry.edit.action.as_str(),
            entry.edit.path,
            level,
            entry.decision.reason.as_str()
        );
        // Rejected CRITICAL edits get called out loudly.
        if entry.decision.outcome == DecisionOutcome::Rejected
            && entry.assessment.as_ref().map(|a| a.risk_level) == Some(RiskLevel::Critical)
        {
            line.push_str("  !! CRITICAL");
        }
        if let Some(detail) = &entry.path_error {
            line.push_str(&format!(" ({})", detail));
        }
        if let Some(execution) = &entry.execution {
            if execution.status == ExecutionStatus::Failed {
                if let Some(error) = &execution.error {
                    line.push_str(&format!(" [execution failed: {}]", error));
                }
            }
        }
        lines.push(line);
    }

    if run.risk_policy_failed {
        if let Some(threshold) = task.fail_on_risk {
            lines.push(format!(
                "  FAIL: max risk {} meets --fail-on-risk {}",
                max_risk_label(run),
                threshold.as_str()
            ));
        }
    }
    lines.push(format!(
        "  Result: {}",
        if run.overall_success { "OK" } else { "FAILED" }
    ));
    lines.join("\n")
}

/// Markdown block for CI logs or PR comments.
pub fn render_ci_summary(task: &Task, run: &RunResult) -> String {
    let status = if run.risk_policy_failed { "FAIL" } else { "PASS" };
    let blocking = run.blocking_rule_ids();
    let scanner = run.scanner_reason_ids();

    let format_codes = |ids: &[String]| -> String {
        if ids.is_empty() {
            "none".to_string()
        } else {
            ids.iter()
                .map(|id| format!("`{}`", id))
                .collect::<Vec<_>>()
                .join(", ")
        }
    };

    let mut lines = vec![
        "### Change Gate CI Summary".to_string(),
        format!("- Result: {}", status),
        format!("- Planned changes: {}", run.entries.len()),
        format!("- Applied changes: {}", run.applied_count()),
        format!("- Skipped/rejected changes: {}", run.rejected_count()),
        format!("- Max risk seen: {}", max_risk_label(run)),
        format!("- Blocking policy rules: {}", format_codes(&blocking)),
        format!("- Scanner reason IDs: {}", format_codes(&scanner)),
        "- Recommended next actions:".to_string(),
    ];
    for action in recommended_next_actions(task, run) {
        lines.push(format!("  - {}", action));
    }
    lines.join("\n")
}

/// Markdown scorecard for release or PR artifacts.
pub fn render_scorecard(task: &Task, run: &RunResult) -> String {
    let status = if run.risk_policy_failed { "FAIL" } else { "PASS" };
    let scanner = run.scanner_reason_ids();

    let mut lines = vec![
        "### Change Gate Safety Scorecard".to_string(),
        format!("- Generated at (UTC): {}", Utc::now().to_rfc3339()),
        format!("- Result: {}", status),
        format!("- Policy source: `{}`", task.policy_label),
        format!("- Max risk seen: {}", max_risk_label(run)),
        String::new(),
        "| Metric | Value |".to_string(),
        "| --- | --- |".to_string(),
        format!("| Planned changes | {} |", run.entries.len()),
        format!("| Applied changes | {} |", run.applied_count()),
        format!("| Skipped/rejected changes | {} |", run.rejected_count()),
        format!(
            "| Blocked by policy deny | {} |",
            run.count_reason(ReasonCode::PolicyDeny)
        ),
        format!(
            "| Blocked (approval required) | {} |",
            run.count_reason(ReasonCode::RiskAboveNoninteractiveThreshold)
                + run.count_reason(ReasonCode::ComplianceModeRequiresExplicitApproval)
        ),
        format!(
            "| Unsafe paths rejected | {} |",
            run.count_reason(ReasonCode::PathUnsafe)
        ),
        format!(
            "| Dry-run skips | {} |",
            run.entries
                .iter()
                .filter(|e| e.execution.as_ref().map(|x| x.status)
                    == Some(ExecutionStatus::SkippedDryRun))
                .count()
        ),
        format!("| Scanner reason IDs (unique) | {} |", scanner.len()),
    ];

    let mut risk_counts = [0usize; RiskLevel::ALL.len()];
    for entry in &run.entries {
        if let Some(assessment) = &entry.assessment {
            risk_counts[assessment.risk_level as usize] += 1;
        }
    }
    if risk_counts.iter().any(|&c| c > 0) {
        lines.push(String::new());
        lines.push("| Risk level | Count |".to_string());
        lines.push("| --- | --- |".to_string());
        for level in RiskLevel::ALL {
            lines.push(format!(
                "| {} | {} |",
                level.as_str().to_uppercase(),
                risk_counts[level as usize]
            ));
        }
    }

    lines.push(String::new());
    if scanner.is_empty() {
        lines.push("- Scanner reason IDs: none".to_string());
    } else {
        lines.push(format!(
            "- Scanner reason IDs: {}",
            scanner
                .iter()
                .map(|id| format!("`{}`", id))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    lines.push("- Recommended next actions:".to_string());
    for action in recommended_next_actions(task, run) {
        lines.push(format!("  - {}", action));
    }
    lines.join("\n")
}

/// Per-edit governance event as embedded in the policy report.
fn governance_events(run: &RunResult) -> Vec<Value> {
    run.entries
        .iter()
        .map(|entry| {
            let assessment = entry.assessment.as_ref();
            json!({
                "path": entry.edit.path,
                "action": entry.edit.action.as_str(),
                "risk_level": assessment.map(|a| a.risk_level.as_str()),
                "policy_decision": assessment
                    .and_then(|a| a.policy.as_ref())
                    .map(|p| p.outcome.as_str()),
                "matched_rule_id": assessment
                    .and_then(|a| a.policy.as_ref())
                    .and_then(|p| p.rule_id.as_deref()),
                "scanner_severity": assessment
                    .and_then(|a| a.scanner.as_ref())
                    .map(|s| s.severity.as_str()),
                "scanner_reason_ids": assessment
                    .and_then(|a| a.scanner.as_ref())
                    .map(|s| s.reason_ids.clone())
                    .unwrap_or_default(),
                "outcome": entry.decision.reason.as_str(),
            })
        })
        .collect()
}

/// Machine-readable policy and scanner report for CI artifacts.
pub fn render_policy_report(task: &Task, run: &RunResult) -> Value {
    json!({
        "status": if run.risk_policy_failed { "failed" } else { "passed" },
        "policy_source": task.policy_label,
        "fail_on_risk": task.fail_on_risk.map(|l| l.as_str()),
        "max_risk_level_seen": run.max_risk_level_seen.map(|l| l.as_str()),
        "risk_policy_failed": run.risk_policy_failed,
        "blocking_rule_ids": run.blocking_rule_ids(),
        "recommended_next_actions": recommended_next_actions(task, run),
        "events": governance_events(run),
    })
}

/// Compact machine output for adapters and workers.
pub fn render_machine_report(task: &Task, run: &RunResult) -> Value {
    let run_status = if run.requires_approval() {
        "requires_approval"
    } else if run.risk_policy_failed {
        "blocked"
    } else if run.overall_success {
        "passed"
    } else {
        "failed"
    };

    let change_refs = |outcome: DecisionOutcome| -> Vec<Value> {
        run.entries
            .iter()
            .filter(|e| e.decision.outcome == outcome)
            .map(|e| json!({"action": e.edit.action.as_str(), "path": e.edit.path}))
            .collect()
    };

    json!({
        "schema_version": "1",
        "run_status": run_status,
        "success": run.overall_success,
        "summary": {
            "planned_changes": run.entries.len(),
            "applied_changes": run.applied_count(),
            "rejected_changes": run.rejected_count(),
            "max_risk_level_seen": run.max_risk_level_seen.map(|l| l.as_str()),
        },
        "applied_changes": change_refs(DecisionOutcome::Approved),
        "rejected_changes": change_refs(DecisionOutcome::Rejected),
        "policy_report": render_policy_report(task, run),
    })
}
