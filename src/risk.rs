//! Risk and policy data model
//!
//! Shared vocabulary between the evaluator, the approval gate, and the
//! reporting layer: ordered risk levels, policy verdicts, and scanner
//! findings attached to a single candidate edit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered risk severity for a candidate edit.
///
/// The derived `Ord` follows declaration order: LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Parse a user- or evaluator-supplied level string.
    ///
    /// Unrecognized input maps to `Critical`: an unknown risk level must
    /// never be treated as safe.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "medium" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    /// Strict variant for configuration input (`--fail-on-risk`).
    ///
    /// Unlike [`RiskLevel::parse`], an unknown string is the caller's
    /// error to surface: a mistyped threshold must never silently become
    /// the laxest one.
    pub fn from_flag(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Marker shown next to the level in console output.
    pub fn marker(&self) -> &'static str {
        match self {
            RiskLevel::Low => "·",
            RiskLevel::Medium => "○",
            RiskLevel::High => "●",
            RiskLevel::Critical => "!!",
        }
    }

    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Medium,
        RiskLevel::High,
        RiskLevel::Critical,
    ];
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Categorical verdict from the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    Allow,
    Deny,
    RequireApproval,
}

impl PolicyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyOutcome::Allow => "allow",
            PolicyOutcome::Deny => "deny",
            PolicyOutcome::RequireApproval => "require_approval",
        }
    }
}

/// A policy verdict plus the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub outcome: PolicyOutcome,
    /// Identifier of the matched rule, when a specific rule decided.
    pub rule_id: Option<String>,
}

/// Severity of a content-scanner finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSeverity {
    Low,
    Medium,
    High,
}

impl ScanSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanSeverity::Low => "low",
            ScanSeverity::Medium => "medium",
            ScanSeverity::High => "high",
        }
    }
}

/// Aggregated scanner findings for one candidate edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Highest severity among the findings.
    pub severity: ScanSeverity,
    /// Stable reason identifiers, sorted and deduplicated.
    pub reason_ids: Vec<String>,
}

/// Everything the evaluator learned about one candidate edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    /// Plain-text diff preview shown to interactive approvers.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diff: String,
    /// Absent when no policy is configured.
    pub policy: Option<PolicyVerdict>,
    /// Absent when the scanner found nothing.
    pub scanner: Option<ScanReport>,
}
