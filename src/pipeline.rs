//! The pipeline
//!
//! One strictly sequential pass over the planner's edits: path check,
//! risk assessment, decision, execution, audit record. Edit N+1 is not
//! looked at until edit N has its audit entry. Nothing here is retried
//! and nothing is reordered; fairness and reproducibility come from the
//! planner's order being the only order.

use crate::audit::{AuditEntry, AuditRecorder};
use crate::evaluator::RiskEvaluator;
use crate::executor::{self, ExecutionResult};
use crate::gate::{ApprovalGate, ApprovalProvider};
use crate::pathsafe;
use crate::plan::Planner;
use crate::report::{RunAggregator, RunResult};
use crate::task::Task;
use anyhow::Result;

/// Run the full pipeline for one task.
///
/// Fatal errors (planner failure, unreadable plan) abort before any edit
/// is processed. Per-edit failures never abort; they become rejections or
/// recorded execution failures and the loop moves on.
pub fn run(
    task: &Task,
    planner: &dyn Planner,
    evaluator: &dyn RiskEvaluator,
    provider: &mut dyn ApprovalProvider,
) -> Result<RunResult> {
    let edits = planner.plan(task)?;
    let gate = ApprovalGate::new(task.modes);
    let mut recorder = AuditRecorder::new();

    for edit in edits {
        let resolved = match pathsafe::resolve_safe(&task.root, &edit.path) {
            Ok(path) => path,
            Err(reason) => {
                // Evaluation is skipped entirely for unsafe paths.
                recorder.record(AuditEntry {
                    decision: gate.reject_path_unsafe(),
                    assessment: None,
                    execution: Some(ExecutionResult::skipped_not_approved()),
                    path_error: Some(reason.to_string()),
                    edit,
                });
                continue;
            }
        };

        let assessment = evaluator.assess(&edit, &resolved);
        let decision = gate.decide(&edit, assessment.as_ref(), provider);

        let execution = if decision.approved() {
            executor::execute(&edit, &resolved, task.modes.dry_run)
        } else {
            ExecutionResult::skipped_not_approved()
        };

        recorder.record(AuditEntry {
            edit,
            assessment: assessment.ok(),
            decision,
            execution: Some(execution),
            path_error: None,
        });
    }

    Ok(RunAggregator::aggregate(task, recorder.into_entries()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvaluationError, LocalEvaluator};
    use crate::executor::ExecutionStatus;
    use crate::gate::{DecisionOutcome, ReasonCode, ScriptedApprovals};
    use crate::plan::{CandidateEdit, EditAction};
    use crate::risk::RiskAssessment;
    use crate::task::{Modes, PolicySource};
    use std::cell::Cell;
    use std::path::Path;
    use tempfile::TempDir;
    use uuid::Uuid;

    struct FixedPlanner(Vec<CandidateEdit>);

    impl Planner for FixedPlanner {
        fn plan(&self, _task: &Task) -> Result<Vec<CandidateEdit>> {
            Ok(self.0.clone())
        }
    }

    struct CountingEvaluator<'a> {
        inner: LocalEvaluator<'a>,
        calls: Cell<usize>,
    }

    impl RiskEvaluator for CountingEvaluator<'_> {
        fn assess(
            &self,
            edit: &CandidateEdit,
            resolved: &Path,
        ) -> Result<RiskAssessment, EvaluationError> {
            self.calls.set(self.calls.get() + 1);
            self.inner.assess(edit, resolved)
        }
    }

    struct FailingEvaluator;

    impl RiskEvaluator for FailingEvaluator {
        fn assess(
            &self,
            _edit: &CandidateEdit,
            _resolved: &Path,
        ) -> Result<RiskAssessment, EvaluationError> {
            Err(EvaluationError::new("backend unreachable"))
        }
    }

    fn edit(action: EditAction, path: &str, content: Option<&str>) -> CandidateEdit {
        CandidateEdit {
            id: Uuid::new_v4(),
            action,
            path: path.to_string(),
            content: content.map(String::from),
            rationale: format!("{} {}", action.as_str(), path),
        }
    }

    fn task(dir: &TempDir, modes: Modes) -> Task {
        Task::new(
            "pipeline test".to_string(),
            dir.path(),
            modes,
            None,
            PolicySource::Builtin,
        )
        .unwrap()
    }

    #[test]
    fn test_mixed_run_non_interactive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.rs"), "fn gone() {}\n").unwrap();
        let t = task(
            &dir,
            Modes {
                non_interactive: true,
                ..Default::default()
            },
        );

        let planner = FixedPlanner(vec![
            edit(EditAction::Create, "src/new.rs", Some("fn f() {}\n")),
            edit(EditAction::Create, ".env", Some("KEY=v\n")),
            edit(EditAction::Delete, "old.rs", None),
        ]);
        let evaluator = LocalEvaluator::new(&t);
        let mut provider = ScriptedApprovals::unreachable();

        let run = run(&t, &planner, &evaluator, &mut provider).unwrap();

        assert_eq!(run.entries.len(), 3);
        // Low-risk create passes the threshold and lands on disk.
        assert_eq!(run.entries[0].decision.outcome, DecisionOutcome::Approved);
        assert!(dir.path().join("src/new.rs").exists());
        // Builtin policy denies the secret target.
        assert_eq!(run.entries[1].decision.reason, ReasonCode::PolicyDeny);
        assert!(!dir.path().join(".env").exists());
        // High-risk delete is above the non-interactive threshold.
        assert_eq!(
            run.entries[2].decision.reason,
            ReasonCode::RiskAboveNoninteractiveThreshold
        );
        assert!(dir.path().join("old.rs").exists());

        assert_eq!(run.applied_count(), 1);
        assert!(run.overall_success);
        assert_eq!(provider.calls, 0);
    }

    #[test]
    fn test_dry_run_mutates_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.rs"), "original\n").unwrap();
        let t = task(
            &dir,
            Modes {
                dry_run: true,
                non_interactive: true,
                ..Default::default()
            },
        );

        let planner = FixedPlanner(vec![
            edit(EditAction::Create, "fresh.rs", Some("x\n")),
            edit(EditAction::Modify, "keep.rs", Some("changed\n")),
        ]);
        let evaluator = LocalEvaluator::new(&t);
        let mut provider = ScriptedApprovals::unreachable();

        let run = run(&t, &planner, &evaluator, &mut provider).unwrap();

        // Both approved, neither executed.
        assert_eq!(run.approved_count(), 2);
        for entry in &run.entries {
            assert_eq!(
                entry.execution.as_ref().unwrap().status,
                ExecutionStatus::SkippedDryRun
            );
        }
        assert!(!dir.path().join("fresh.rs").exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("keep.rs")).unwrap(),
            "original\n"
        );
        assert_eq!(run.applied_count(), 0);
    }

    #[test]
    fn test_unsafe_path_skips_evaluation() {
        let dir = TempDir::new().unwrap();
        let t = task(
            &dir,
            Modes {
                non_interactive: true,
                ..Default::default()
            },
        );

        let planner = FixedPlanner(vec![
            edit(EditAction::Create, "../../etc/passwd", Some("x")),
            edit(EditAction::Create, "ok.txt", Some("fine\n")),
        ]);
        let evaluator = CountingEvaluator {
            inner: LocalEvaluator::new(&t),
            calls: Cell::new(0),
        };
        let mut provider = ScriptedApprovals::unreachable();

        let run = run(&t, &planner, &evaluator, &mut provider).unwrap();

        assert_eq!(run.entries[0].decision.reason, ReasonCode::PathUnsafe);
        assert!(run.entries[0].assessment.is_none());
        assert!(run.entries[0].path_error.is_some());
        // Only the safe edit reached the evaluator; the run continued.
        assert_eq!(evaluator.calls.get(), 1);
        assert_eq!(run.entries[1].decision.outcome, DecisionOutcome::Approved);
        // The unassessed rejection contributes no risk level.
        assert_eq!(run.max_risk_level_seen.unwrap().as_str(), "low");
    }

    #[test]
    fn test_evaluator_error_rejects_that_edit_only() {
        let dir = TempDir::new().unwrap();
        let t = task(
            &dir,
            Modes {
                non_interactive: true,
                ..Default::default()
            },
        );

        let planner = FixedPlanner(vec![
            edit(EditAction::Create, "a.txt", Some("a")),
            edit(EditAction::Create, "b.txt", Some("b")),
        ]);
        let mut provider = ScriptedApprovals::unreachable();

        let run = run(&t, &planner, &FailingEvaluator, &mut provider).unwrap();

        assert_eq!(run.entries.len(), 2);
        for entry in &run.entries {
            assert_eq!(entry.decision.reason, ReasonCode::EvaluationError);
            assert_eq!(
                entry.execution.as_ref().unwrap().status,
                ExecutionStatus::SkippedNotApproved
            );
        }
        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(run.max_risk_level_seen, None);
    }

    struct CriticalEvaluator;

    impl RiskEvaluator for CriticalEvaluator {
        fn assess(
            &self,
            _edit: &CandidateEdit,
            _resolved: &Path,
        ) -> Result<RiskAssessment, EvaluationError> {
            Ok(RiskAssessment {
                risk_level: crate::risk::RiskLevel::Critical,
                risk_factors: vec!["scripted".to_string()],
                diff: String::new(),
                policy: None,
                scanner: None,
            })
        }
    }

    #[test]
    fn test_critical_edit_with_fail_on_risk_fails_run() {
        let dir = TempDir::new().unwrap();
        let t = Task::new(
            "critical".to_string(),
            dir.path(),
            Modes {
                non_interactive: true,
                ..Default::default()
            },
            Some(crate::risk::RiskLevel::High),
            PolicySource::Builtin,
        )
        .unwrap();

        let planner = FixedPlanner(vec![edit(EditAction::Create, "x.rs", Some("x"))]);
        let mut provider = ScriptedApprovals::unreachable();

        let run = run(&t, &planner, &CriticalEvaluator, &mut provider).unwrap();

        assert_eq!(
            run.entries[0].decision.reason,
            ReasonCode::RiskAboveNoninteractiveThreshold
        );
        assert!(run.risk_policy_failed);
        assert!(!run.overall_success);
    }

    #[test]
    fn test_low_and_medium_both_applied() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "old\n").unwrap();
        let t = task(
            &dir,
            Modes {
                non_interactive: true,
                ..Default::default()
            },
        );

        let planner = FixedPlanner(vec![
            edit(EditAction::Create, "new.rs", Some("fresh\n")),
            edit(EditAction::Modify, "lib.rs", Some("updated\n")),
        ]);
        let evaluator = LocalEvaluator::new(&t);
        let mut provider = ScriptedApprovals::unreachable();

        let run = run(&t, &planner, &evaluator, &mut provider).unwrap();

        assert_eq!(run.applied_count(), 2);
        assert!(run.overall_success);
        assert_eq!(run.max_risk_level_seen.unwrap().as_str(), "medium");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("lib.rs")).unwrap(),
            "updated\n"
        );
    }

    #[test]
    fn test_interactive_decline_keeps_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("precious.rs"), "keep\n").unwrap();
        let t = task(&dir, Modes::default());

        let planner = FixedPlanner(vec![edit(EditAction::Delete, "precious.rs", None)]);
        let evaluator = LocalEvaluator::new(&t);
        let mut provider = ScriptedApprovals::new(vec![false]);

        let run = run(&t, &planner, &evaluator, &mut provider).unwrap();

        assert_eq!(
            run.entries[0].decision.reason,
            ReasonCode::InteractiveDeclined
        );
        assert!(dir.path().join("precious.rs").exists());
        assert_eq!(provider.calls, 1);
    }

    #[test]
    fn test_compliance_explicit_yes_executes() {
        let dir = TempDir::new().unwrap();
        let t = task(
            &dir,
            Modes {
                compliance_mode: true,
                ..Default::default()
            },
        );

        let planner = FixedPlanner(vec![edit(
            EditAction::Create,
            "approved.txt",
            Some("ok\n"),
        )]);
        let evaluator = LocalEvaluator::new(&t);
        let mut provider = ScriptedApprovals::new(vec![true]);

        let run = run(&t, &planner, &evaluator, &mut provider).unwrap();

        assert_eq!(
            run.entries[0].decision.reason,
            ReasonCode::ComplianceExplicitApproval
        );
        assert!(dir.path().join("approved.txt").exists());
    }
}
