//! Policy-as-code engine
//!
//! Rule-based verdicts over candidate edits. A policy comes from one of
//! three sources: a file in the working directory (JSON or TOML), a named
//! bundled preset, or the builtin default. Rules are matched in priority
//! order; the first match wins.

use crate::risk::{PolicyOutcome, PolicyVerdict, RiskLevel};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Substrings the builtin policy refuses to touch.
const SECRET_TARGETS: &[&str] = &[
    ".env",
    ".ssh",
    "id_rsa",
    "credentials",
    "secrets",
    "password",
    ".pem",
    "api_key",
    "secret_key",
    "access_key",
];

/// One policy rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    pub id: String,
    pub decision: PolicyOutcome,
    /// Lower priority values match first.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Case-insensitive substrings matched against the proposed path.
    /// Empty means "any path".
    #[serde(default)]
    pub target_contains: Vec<String>,
    /// When set, the rule only matches edits at or below this risk level.
    #[serde(default)]
    pub max_risk_level: Option<RiskLevel>,
}

fn default_priority() -> i32 {
    100
}

impl PolicyRule {
    fn matches(&self, path: &str, risk: RiskLevel) -> bool {
        if let Some(max) = self.max_risk_level {
            if risk > max {
                return false;
            }
        }
        if self.target_contains.is_empty() {
            return true;
        }
        let haystack = path.to_ascii_lowercase();
        self.target_contains
            .iter()
            .any(|needle| haystack.contains(&needle.to_ascii_lowercase()))
    }
}

/// A loaded rule set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub version: String,
    pub rules: Vec<PolicyRule>,
}

impl PolicyConfig {
    /// Build a config with rules ordered by priority, lowest first.
    /// Every loader goes through here so `evaluate` can walk in order.
    pub fn from_rules(version: impl Into<String>, mut rules: Vec<PolicyRule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self {
            version: version.into(),
            rules,
        }
    }

    /// Evaluate the policy for one edit. No matching rule means the edit
    /// needs approval through the mode rules.
    pub fn evaluate(&self, path: &str, risk: RiskLevel) -> PolicyVerdict {
        for rule in &self.rules {
            if rule.matches(path, risk) {
                return PolicyVerdict {
                    outcome: rule.decision,
                    rule_id: Some(rule.id.clone()),
                };
            }
        }
        PolicyVerdict {
            outcome: PolicyOutcome::RequireApproval,
            rule_id: None,
        }
    }
}

/// The builtin default: deny secret/key targets outright; allow low and
/// medium risk. Compliance mode omits the allow rule so nothing is
/// approved without an explicit record.
pub fn builtin(compliance_mode: bool) -> PolicyConfig {
    let mut rules = vec![PolicyRule {
        id: "builtin:deny-secrets-and-keys".to_string(),
        decision: PolicyOutcome::Deny,
        priority: 0,
        target_contains: SECRET_TARGETS.iter().map(|s| s.to_string()).collect(),
        max_risk_level: None,
    }];

    if !compliance_mode {
        rules.push(PolicyRule {
            id: "builtin:allow-low-and-medium-risk".to_string(),
            decision: PolicyOutcome::Allow,
            priority: 100,
            target_contains: Vec::new(),
            max_risk_level: Some(RiskLevel::Medium),
        });
    }

    PolicyConfig::from_rules("safegate-builtin-1", rules)
}

/// A bundled preset: id, display name, one-line description.
pub struct PresetInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const PRESETS: &[PresetInfo] = &[
    PresetInfo {
        id: "startup",
        name: "Startup",
        description: "Move fast: deny secrets, allow everything up to high risk.",
    },
    PresetInfo {
        id: "fintech",
        name: "Fintech",
        description: "Regulated: deny secrets and money-handling paths, allow low risk only.",
    },
    PresetInfo {
        id: "games",
        name: "Games",
        description: "Deny secrets, allow low and medium risk.",
    },
];

/// Load a bundled preset by id.
pub fn load_preset(id: &str) -> Result<PolicyConfig> {
    let deny_secrets = PolicyRule {
        id: format!("preset:{}:deny-secrets", id),
        decision: PolicyOutcome::Deny,
        priority: 0,
        target_contains: SECRET_TARGETS.iter().map(|s| s.to_string()).collect(),
        max_risk_level: None,
    };

    let rules = match id {
        "startup" => vec![
            deny_secrets,
            PolicyRule {
                id: "preset:startup:allow-up-to-high".to_string(),
                decision: PolicyOutcome::Allow,
                priority: 100,
                target_contains: Vec::new(),
                max_risk_level: Some(RiskLevel::High),
            },
        ],
        "fintech" => vec![
            deny_secrets,
            PolicyRule {
                id: "preset:fintech:deny-money-paths".to_string(),
                decision: PolicyOutcome::Deny,
                priority: 10,
                target_contains: vec![
                    "billing".to_string(),
                    "payment".to_string(),
                    "ledger".to_string(),
                    "payout".to_string(),
                ],
                max_risk_level: None,
            },
            PolicyRule {
                id: "preset:fintech:allow-low".to_string(),
                decision: PolicyOutcome::Allow,
                priority: 100,
                target_contains: Vec::new(),
                max_risk_level: Some(RiskLevel::Low),
            },
        ],
        "games" => vec![
            deny_secrets,
            PolicyRule {
                id: "preset:games:allow-low-and-medium".to_string(),
                decision: PolicyOutcome::Allow,
                priority: 100,
                target_contains: Vec::new(),
                max_risk_level: Some(RiskLevel::Medium),
            },
        ],
        other => bail!(
            "unknown policy preset '{}' (use --list-policy-presets to see valid ids)",
            other
        ),
    };

    Ok(PolicyConfig::from_rules(
        format!("safegate-preset-{}", id),
        rules,
    ))
}

/// Load a policy file. TOML when the extension says so, JSON otherwise.
pub fn load_from_file(path: &Path) -> Result<PolicyConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read policy file {}", path.display()))?;

    let config: PolicyConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("invalid TOML policy file {}", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON policy file {}", path.display()))?,
    };

    if config.rules.is_empty() {
        bail!("policy file {} contains no rules", path.display());
    }
    Ok(PolicyConfig::from_rules(config.version, config.rules))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_denies_secret_targets() {
        let policy = builtin(false);
        let verdict = policy.evaluate(".env", RiskLevel::Low);
        assert_eq!(verdict.outcome, PolicyOutcome::Deny);
        assert_eq!(
            verdict.rule_id.as_deref(),
            Some("builtin:deny-secrets-and-keys")
        );
        // Deny outranks the allow rule even at low risk.
        let verdict = policy.evaluate("config/secrets.yaml", RiskLevel::Low);
        assert_eq!(verdict.outcome, PolicyOutcome::Deny);
    }

    #[test]
    fn test_builtin_allows_low_and_medium() {
        let policy = builtin(false);
        assert_eq!(
            policy.evaluate("src/lib.rs", RiskLevel::Low).outcome,
            PolicyOutcome::Allow
        );
        assert_eq!(
            policy.evaluate("src/lib.rs", RiskLevel::Medium).outcome,
            PolicyOutcome::Allow
        );
        assert_eq!(
            policy.evaluate("src/lib.rs", RiskLevel::High).outcome,
            PolicyOutcome::RequireApproval
        );
    }

    #[test]
    fn test_compliance_builtin_never_allows() {
        let policy = builtin(true);
        assert_eq!(
            policy.evaluate("src/lib.rs", RiskLevel::Low).outcome,
            PolicyOutcome::RequireApproval
        );
        assert_eq!(
            policy.evaluate(".env", RiskLevel::Low).outcome,
            PolicyOutcome::Deny
        );
    }

    #[test]
    fn test_priority_order_wins() {
        // Declared out of priority order; from_rules sorts once.
        let policy = PolicyConfig::from_rules(
            "t",
            vec![
                PolicyRule {
                    id: "allow-all".to_string(),
                    decision: PolicyOutcome::Allow,
                    priority: 100,
                    target_contains: Vec::new(),
                    max_risk_level: None,
                },
                PolicyRule {
                    id: "deny-docs".to_string(),
                    decision: PolicyOutcome::Deny,
                    priority: 1,
                    target_contains: vec!["docs/".to_string()],
                    max_risk_level: None,
                },
            ],
        );
        assert_eq!(policy.rules[0].id, "deny-docs");
        assert_eq!(
            policy.evaluate("docs/readme.md", RiskLevel::Low).outcome,
            PolicyOutcome::Deny
        );
        assert_eq!(
            policy.evaluate("src/a.rs", RiskLevel::Critical).outcome,
            PolicyOutcome::Allow
        );
    }

    #[test]
    fn test_presets_load() {
        for preset in PRESETS {
            assert!(load_preset(preset.id).is_ok());
        }
        assert!(load_preset("nope").is_err());
    }

    #[test]
    fn test_fintech_denies_money_paths() {
        let policy = load_preset("fintech").unwrap();
        assert_eq!(
            policy.evaluate("src/billing/charge.rs", RiskLevel::Low).outcome,
            PolicyOutcome::Deny
        );
        assert_eq!(
            policy.evaluate("src/util.rs", RiskLevel::Low).outcome,
            PolicyOutcome::Allow
        );
        assert_eq!(
            policy.evaluate("src/util.rs", RiskLevel::Medium).outcome,
            PolicyOutcome::RequireApproval
        );
    }

    #[test]
    fn test_load_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(
            &path,
            r#"{
                "version": "team-1",
                "rules": [
                    {"id": "deny-infra", "decision": "deny", "priority": 0,
                     "target_contains": ["terraform/"]}
                ]
            }"#,
        )
        .unwrap();
        let policy = load_from_file(&path).unwrap();
        assert_eq!(policy.version, "team-1");
        assert_eq!(
            policy.evaluate("terraform/main.tf", RiskLevel::Low).outcome,
            PolicyOutcome::Deny
        );
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(
            &path,
            "version = \"team-2\"\n\n[[rules]]\nid = \"allow-docs\"\ndecision = \"allow\"\ntarget_contains = [\"docs/\"]\n",
        )
        .unwrap();
        let policy = load_from_file(&path).unwrap();
        assert_eq!(
            policy.evaluate("docs/guide.md", RiskLevel::Low).outcome,
            PolicyOutcome::Allow
        );
    }
}
