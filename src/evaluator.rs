//! Risk evaluation
//!
//! [`RiskEvaluator`] is the seam to the risk-analysis collaborator: given a
//! candidate edit it returns a [`RiskAssessment`]. The bundled
//! [`LocalEvaluator`] assesses offline from heuristics, the loaded policy,
//! and the content scanner, so the binary works with no external service.
//!
//! Evaluator failures are values, not panics: the gate turns an
//! [`EvaluationError`] into a rejection for that one edit.

use crate::diff;
use crate::plan::{CandidateEdit, EditAction};
use crate::risk::{RiskAssessment, RiskLevel};
use crate::scan;
use crate::task::Task;
use std::fmt;
use std::path::Path;

/// The evaluator could not produce an assessment for this edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationError {
    pub detail: String,
}

impl EvaluationError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evaluation failed: {}", self.detail)
    }
}

/// Assessment collaborator. Called once per edit, in planner order; this
/// is a per-edit suspension point when the implementation is remote.
pub trait RiskEvaluator {
    fn assess(
        &self,
        edit: &CandidateEdit,
        resolved: &Path,
    ) -> Result<RiskAssessment, EvaluationError>;
}

/// Path fragments that raise the stakes of an otherwise ordinary edit.
const SENSITIVE_FRAGMENTS: &[(&str, &str)] = &[
    (".github/workflows", "changes CI workflow definitions"),
    ("dockerfile", "changes container build"),
    ("migration", "touches a database migration"),
    ("schema", "touches a schema definition"),
    ("deploy", "touches deployment configuration"),
    ("cargo.toml", "changes build manifest"),
    ("package.json", "changes build manifest"),
];

/// Offline heuristic evaluator: action kind sets the baseline, sensitive
/// paths and scanner findings raise it, and the task's policy produces the
/// verdict.
pub struct LocalEvaluator<'a> {
    task: &'a Task,
}

impl<'a> LocalEvaluator<'a> {
    pub fn new(task: &'a Task) -> Self {
        Self { task }
    }
}

impl RiskEvaluator for LocalEvaluator<'_> {
    fn assess(
        &self,
        edit: &CandidateEdit,
        resolved: &Path,
    ) -> Result<RiskAssessment, EvaluationError> {
        let mut factors = Vec::new();

        let mut level = match edit.action {
            EditAction::Delete => {
                factors.push("deletes an existing file".to_string());
                RiskLevel::High
            }
            EditAction::Modify => {
                factors.push("modifies an existing file".to_string());
                RiskLevel::Medium
            }
            EditAction::Create => RiskLevel::Low,
        };

        let lower = edit.path.to_ascii_lowercase();
        for (fragment, why) in SENSITIVE_FRAGMENTS {
            if lower.contains(fragment) {
                factors.push((*why).to_string());
                level = bump(level);
                break;
            }
        }

        if edit.action == EditAction::Modify && !resolved.exists() {
            factors.push("target file does not exist yet".to_string());
        }

        let scanner = scan::scan_edit(
            edit.content.as_deref().unwrap_or(""),
            &edit.rationale,
        );
        if let Some(report) = &scanner {
            factors.push(format!(
                "scanner findings: {}",
                report.reason_ids.join(", ")
            ));
            if report.severity == crate::risk::ScanSeverity::High {
                level = level.max(RiskLevel::High);
            }
        }

        let diff_text = build_diff(edit, resolved)?;
        let policy = Some(self.task.policy.evaluate(&edit.path, level));

        Ok(RiskAssessment {
            risk_level: level,
            risk_factors: factors,
            diff: diff_text,
            policy,
            scanner,
        })
    }
}

fn bump(level: RiskLevel) -> RiskLevel {
    match level {
        RiskLevel::Low => RiskLevel::Medium,
        RiskLevel::Medium => RiskLevel::High,
        RiskLevel::High | RiskLevel::Critical => RiskLevel::Critical,
    }
}

fn build_diff(edit: &CandidateEdit, resolved: &Path) -> Result<String, EvaluationError> {
    match edit.action {
        EditAction::Create => Ok(diff::render_new_file(
            edit.content.as_deref().unwrap_or(""),
        )),
        EditAction::Modify => {
            let old = match std::fs::read_to_string(resolved) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(EvaluationError::new(e.to_string())),
            };
            Ok(diff::render_plain(
                &old,
                edit.content.as_deref().unwrap_or(""),
            ))
        }
        EditAction::Delete => match std::fs::read_to_string(resolved) {
            Ok(old) => Ok(diff::render_plain(&old, "")),
            Err(_) => Ok(String::new()),
        },
    }
}
