//! Approval gate
//!
//! The decision state machine. Each candidate edit moves through
//! path-check, risk-assessment, and decision, and comes out with exactly
//! one [`Decision`]. Policy DENY beats everything except an unsafe path;
//! compliance mode disables every automatic approval; non-interactive
//! mode never waits on a human.

use crate::evaluator::EvaluationError;
use crate::plan::CandidateEdit;
use crate::risk::{PolicyOutcome, RiskAssessment, RiskLevel};
use crate::task::Modes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Final verdict for one candidate edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    Approved,
    Rejected,
}

/// Why the gate decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    // Rejections
    PathUnsafe,
    PolicyDeny,
    EvaluationError,
    ComplianceModeRequiresExplicitApproval,
    RiskAboveNoninteractiveThreshold,
    InteractiveDeclined,
    ApprovalProviderError,
    // Approvals
    PolicyAllow,
    AutoApproveLow,
    WithinNoninteractiveThreshold,
    InteractiveApproved,
    ComplianceExplicitApproval,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::PathUnsafe => "path_unsafe",
            ReasonCode::PolicyDeny => "policy_deny",
            ReasonCode::EvaluationError => "evaluation_error",
            ReasonCode::ComplianceModeRequiresExplicitApproval => {
                "compliance_mode_requires_explicit_approval"
            }
            ReasonCode::RiskAboveNoninteractiveThreshold => "risk_above_noninteractive_threshold",
            ReasonCode::InteractiveDeclined => "interactive_declined",
            ReasonCode::ApprovalProviderError => "approval_provider_error",
            ReasonCode::PolicyAllow => "policy_allow",
            ReasonCode::AutoApproveLow => "auto_approve_low",
            ReasonCode::WithinNoninteractiveThreshold => "within_noninteractive_threshold",
            ReasonCode::InteractiveApproved => "interactive_approved",
            ReasonCode::ComplianceExplicitApproval => "compliance_explicit_approval",
        }
    }
}

/// Which mode produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMode {
    Interactive,
    NonInteractive,
    Compliance,
}

/// Exactly one per candidate edit, immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: DecisionOutcome,
    pub reason: ReasonCode,
    pub mode: DecisionMode,
    pub decided_at: DateTime<Utc>,
}

impl Decision {
    pub fn approved(&self) -> bool {
        self.outcome == DecisionOutcome::Approved
    }
}

/// Supplies the human answer at the interactive suspension point.
///
/// Any error (EOF, timeout, cancellation) must resolve to a rejection;
/// the gate fails closed rather than leave an edit undecided.
pub trait ApprovalProvider {
    fn confirm(&mut self, edit: &CandidateEdit, assessment: &RiskAssessment)
        -> anyhow::Result<bool>;
}

/// The decision state machine for one run's mode configuration.
pub struct ApprovalGate {
    modes: Modes,
}

impl ApprovalGate {
    pub fn new(modes: Modes) -> Self {
        Self { modes }
    }

    fn mode(&self) -> DecisionMode {
        if self.modes.compliance_mode {
            DecisionMode::Compliance
        } else if self.modes.non_interactive {
            DecisionMode::NonInteractive
        } else {
            DecisionMode::Interactive
        }
    }

    fn make(&self, outcome: DecisionOutcome, reason: ReasonCode) -> Decision {
        Decision {
            outcome,
            reason,
            mode: self.mode(),
            decided_at: Utc::now(),
        }
    }

    /// Path validation failed: automatic rejection, risk evaluation skipped.
    pub fn reject_path_unsafe(&self) -> Decision {
        self.make(DecisionOutcome::Rejected, ReasonCode::PathUnsafe)
    }

    /// Decide an edit whose path passed validation.
    pub fn decide(
        &self,
        edit: &CandidateEdit,
        assessment: Result<&RiskAssessment, &EvaluationError>,
        provider: &mut dyn ApprovalProvider,
    ) -> Decision {
        let assessment = match assessment {
            Ok(a) => a,
            Err(_) => return self.make(DecisionOutcome::Rejected, ReasonCode::EvaluationError),
        };

        let policy_outcome = assessment.policy.as_ref().map(|p| p.outcome);

        // Policy DENY wins over every mode and flag.
        if policy_outcome == Some(PolicyOutcome::Deny) {
            return self.make(DecisionOutcome::Rejected, ReasonCode::PolicyDeny);
        }

        // Compliance mode: nothing is approved without an explicit yes.
        if self.modes.compliance_mode {
            if self.modes.non_interactive {
                return self.make(
                    DecisionOutcome::Rejected,
                    ReasonCode::ComplianceModeRequiresExplicitApproval,
                );
            }
            return match provider.confirm(edit, assessment) {
                Ok(true) => self.make(
                    DecisionOutcome::Approved,
                    ReasonCode::ComplianceExplicitApproval,
                ),
                Ok(false) | Err(_) => self.make(
                    DecisionOutcome::Rejected,
                    ReasonCode::ComplianceModeRequiresExplicitApproval,
                ),
            };
        }

        if policy_outcome == Some(PolicyOutcome::Allow) {
            return self.make(DecisionOutcome::Approved, ReasonCode::PolicyAllow);
        }

        // Policy absent or REQUIRE_APPROVAL: fall through to the mode rules.
        if self.modes.non_interactive {
            return if assessment.risk_level <= RiskLevel::Medium {
                self.make(
                    DecisionOutcome::Approved,
                    ReasonCode::WithinNoninteractiveThreshold,
                )
            } else {
                self.make(
                    DecisionOutcome::Rejected,
                    ReasonCode::RiskAboveNoninteractiveThreshold,
                )
            };
        }

        // A policy verdict of REQUIRE_APPROVAL is authoritative over the
        // auto-approve flag; the shortcut only applies with no verdict.
        if self.modes.auto_approve_low
            && assessment.risk_level == RiskLevel::Low
            && policy_outcome.is_none()
        {
            return self.make(DecisionOutcome::Approved, ReasonCode::AutoApproveLow);
        }

        match provider.confirm(edit, assessment) {
            Ok(true) => self.make(DecisionOutcome::Approved, ReasonCode::InteractiveApproved),
            Ok(false) => self.make(DecisionOutcome::Rejected, ReasonCode::InteractiveDeclined),
            Err(_) => self.make(DecisionOutcome::Rejected, ReasonCode::ApprovalProviderError),
        }
    }
}

/// Prompts on the terminal: shows the assessment, asks `Apply this change?`.
/// Default answer is yes only for LOW risk.
pub struct ConsoleApprovalProvider;

impl ApprovalProvider for ConsoleApprovalProvider {
    fn confirm(
        &mut self,
        edit: &CandidateEdit,
        assessment: &RiskAssessment,
    ) -> anyhow::Result<bool> {
        println!();
        println!(
            "  {} {} — {} risk [{}]",
            edit.action.as_str().to_uppercase(),
            edit.path,
            assessment.risk_level.as_str().to_uppercase(),
            assessment.risk_level.marker()
        );
        if let Some(policy) = &assessment.policy {
            match &policy.rule_id {
                Some(rule) => println!("  Policy: {} (rule: {})", policy.outcome.as_str(), rule),
                None => println!("  Policy: {}", policy.outcome.as_str()),
            }
        }
        for factor in &assessment.risk_factors {
            println!("    - {}", factor);
        }
        if let Some(scanner) = &assessment.scanner {
            println!(
                "  Scanner: {} ({})",
                scanner.severity.as_str(),
                scanner.reason_ids.join(", ")
            );
        }
        if !assessment.diff.is_empty() {
            println!();
            for line in assessment.diff.lines() {
                println!("  {}", line);
            }
        }
        if assessment.risk_level == RiskLevel::Critical {
            println!();
            println!("  !! CRITICAL RISK - review carefully before approving !!");
        }

        let default_yes = assessment.risk_level == RiskLevel::Low;
        print!(
            "  Apply this change? [{}] ",
            if default_yes { "Y/n" } else { "y/N" }
        );
        std::io::stdout().flush()?;

        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        let answer = answer.trim().to_ascii_lowercase();

        Ok(match answer.as_str() {
            "" => default_yes,
            "y" | "yes" => true,
            _ => false,
        })
    }
}

/// Scripted provider for tests and headless harnesses: answers from a
/// fixed queue, errors when the queue runs dry.
pub struct ScriptedApprovals {
    answers: Vec<bool>,
    pub calls: usize,
}

impl ScriptedApprovals {
    pub fn new(answers: Vec<bool>) -> Self {
        Self { answers, calls: 0 }
    }

    /// A provider that must never be consulted.
    pub fn unreachable() -> Self {
        Self::new(Vec::new())
    }
}

impl ApprovalProvider for ScriptedApprovals {
    fn confirm(
        &mut self,
        _edit: &CandidateEdit,
        _assessment: &RiskAssessment,
    ) -> anyhow::Result<bool> {
        if self.calls >= self.answers.len() {
            anyhow::bail!("approval provider exhausted");
        }
        let answer = self.answers[self.calls];
        self.calls += 1;
        Ok(answer)
    }
}
