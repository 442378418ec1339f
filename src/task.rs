//! Run configuration
//!
//! A [`Task`] is the single context object for one invocation: what was
//! asked, where the working-directory root is, which modes are active, and
//! the loaded policy. Built and validated once before any edit is touched;
//! immutable afterwards. Bad configuration fails here, not mid-run.

use crate::policy::{self, PolicyConfig};
use crate::risk::RiskLevel;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Where the active policy came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File(PathBuf),
    Preset(String),
}

/// Mode flags for one run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Modes {
    /// Preview everything, execute nothing.
    pub dry_run: bool,
    /// Never wait on a human; decide from thresholds and policy alone.
    pub non_interactive: bool,
    /// Skip the prompt for LOW-risk edits (ignored in compliance mode).
    pub auto_approve_low: bool,
    /// Strictest mode: no automatic approval path of any kind.
    pub compliance_mode: bool,
}

/// Immutable context for one pipeline run.
#[derive(Debug, Clone)]
pub struct Task {
    pub description: String,
    /// Canonicalized working-directory root.
    pub root: PathBuf,
    pub modes: Modes,
    /// Run fails when `max_risk_level_seen` meets or exceeds this.
    pub fail_on_risk: Option<RiskLevel>,
    pub policy: PolicyConfig,
    /// Display label for the policy source ("builtin", "file:…", "preset:…").
    pub policy_label: String,
    pub started_at: DateTime<Utc>,
    pub requested_by: String,
}

impl Task {
    pub fn new(
        description: String,
        root: &Path,
        mut modes: Modes,
        fail_on_risk: Option<RiskLevel>,
        policy_source: PolicySource,
    ) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("working directory {} is not accessible", root.display()))?;

        // Compliance mode overrides every automatic approval path.
        if modes.compliance_mode {
            modes.auto_approve_low = false;
        }

        let (policy, policy_label) = load_policy(&root, &policy_source, modes.compliance_mode)?;

        Ok(Task {
            description,
            root,
            modes,
            fail_on_risk,
            policy,
            policy_label,
            started_at: Utc::now(),
            requested_by: current_user(),
        })
    }
}

fn load_policy(
    root: &Path,
    source: &PolicySource,
    compliance_mode: bool,
) -> Result<(PolicyConfig, String)> {
    match source {
        PolicySource::Builtin => Ok((policy::builtin(compliance_mode), "builtin".to_string())),
        PolicySource::Preset(id) => {
            let config = policy::load_preset(id)?;
            Ok((config, format!("preset:{}", id)))
        }
        PolicySource::File(path) => {
            let resolved = confine_policy_path(root, path)?;
            let config = policy::load_from_file(&resolved)?;
            let rel = resolved
                .strip_prefix(root)
                .unwrap_or(&resolved)
                .to_string_lossy()
                .replace('\\', "/");
            Ok((config, format!("file:{}", rel)))
        }
    }
}

/// A policy file must live inside the working directory; the gate must not
/// become an arbitrary file reader.
fn confine_policy_path(root: &Path, raw: &Path) -> Result<PathBuf> {
    let resolved = if raw.is_absolute() {
        raw.canonicalize()
            .with_context(|| format!("policy file {} not found", raw.display()))?
    } else {
        match crate::pathsafe::resolve_safe(root, &raw.to_string_lossy()) {
            Ok(p) => p,
            Err(reason) => bail!(
                "unsafe policy path {} ({})",
                raw.display(),
                reason
            ),
        }
    };
    if !resolved.starts_with(root) {
        bail!(
            "policy file {} is outside the working directory",
            raw.display()
        );
    }
    Ok(resolved)
}

/// Resolve the task description from the positional argument or a file.
///
/// Exactly one source must yield a non-empty description; anything else
/// is a configuration error.
pub fn description_from(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    let description = match (inline, file) {
        (Some(_), Some(_)) => bail!("pass a task string or --file, not both"),
        (Some(text), None) => text.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read task file {}", path.display()))?
            .trim()
            .to_string(),
        (None, None) => String::new(),
    };
    if description.is_empty() {
        bail!("no task provided; pass a description or --file <path>");
    }
    Ok(description)
}

/// Non-interactive unless a human is plausibly on the other end: the flag,
/// a CI environment, or non-terminal stdio all force it on.
pub fn infer_non_interactive(flag: bool, ci_env: bool, stdin_tty: bool, stdout_tty: bool) -> bool {
    flag || ci_env || !stdin_tty || !stdout_tty
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
