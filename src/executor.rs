//! Edit execution
//!
//! Applies approved edits to the filesystem, one at a time, in planner
//! order. Failures are isolated: one bad edit is recorded and the run
//! moves on. There is no cross-edit rollback. Dry-run never touches the
//! filesystem regardless of the decision.

use crate::plan::{CandidateEdit, EditAction};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// How executing one edit went (or why it never ran).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Applied,
    Failed,
    SkippedDryRun,
    SkippedNotApproved,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Applied => "applied",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::SkippedDryRun => "skipped_dry_run",
            ExecutionStatus::SkippedNotApproved => "skipped_not_approved",
        }
    }
}

/// At most one per candidate edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn applied() -> Self {
        Self {
            status: ExecutionStatus::Applied,
            error: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            error: Some(detail.into()),
        }
    }

    pub fn skipped_dry_run() -> Self {
        Self {
            status: ExecutionStatus::SkippedDryRun,
            error: None,
        }
    }

    pub fn skipped_not_approved() -> Self {
        Self {
            status: ExecutionStatus::SkippedNotApproved,
            error: None,
        }
    }
}

/// Execute one approved edit at its resolved path.
///
/// Never panics and never propagates: every failure comes back as a
/// recorded [`ExecutionResult`].
pub fn execute(edit: &CandidateEdit, resolved: &Path, dry_run: bool) -> ExecutionResult {
    if dry_run {
        return ExecutionResult::skipped_dry_run();
    }

    match edit.action {
        EditAction::Create | EditAction::Modify => {
            if let Some(parent) = resolved.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    return ExecutionResult::failed(format!(
                        "failed to create parent directory: {}",
                        e
                    ));
                }
            }
            match fs::write(resolved, edit.content.as_deref().unwrap_or("")) {
                Ok(()) => ExecutionResult::applied(),
                Err(e) => ExecutionResult::failed(format!("failed to write file: {}", e)),
            }
        }
        EditAction::Delete => {
            if !resolved.exists() {
                // The target changed between assessment and execution.
                return ExecutionResult::failed("target does not exist");
            }
            match fs::remove_file(resolved) {
                Ok(()) => ExecutionResult::applied(),
                Err(e) => ExecutionResult::failed(format!("failed to delete file: {}", e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn edit(action: EditAction, path: &str, content: Option<&str>) -> CandidateEdit {
        CandidateEdit {
            id: Uuid::new_v4(),
            action,
            path: path.to_string(),
            content: content.map(String::from),
            rationale: String::new(),
        }
    }

    #[test]
    fn test_create_writes_file_and_parents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("deep/nested/file.txt");
        let e = edit(EditAction::Create, "deep/nested/file.txt", Some("hello"));

        let result = execute(&e, &target, false);
        assert_eq!(result.status, ExecutionStatus::Applied);
        assert_eq!(fs::read_to_string(&target).unwrap(), "hello");
    }

    #[test]
    fn test_modify_overwrites() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("file.txt");
        fs::write(&target, "old").unwrap();

        let e = edit(EditAction::Modify, "file.txt", Some("new"));
        let result = execute(&e, &target, false);
        assert_eq!(result.status, ExecutionStatus::Applied);
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn test_delete_removes_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("doomed.txt");
        fs::write(&target, "x").unwrap();

        let e = edit(EditAction::Delete, "doomed.txt", None);
        let result = execute(&e, &target, false);
        assert_eq!(result.status, ExecutionStatus::Applied);
        assert!(!target.exists());
    }

    #[test]
    fn test_delete_missing_target_is_recorded_failure() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("never-existed.txt");

        let e = edit(EditAction::Delete, "never-existed.txt", None);
        let result = execute(&e, &target, false);
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("target does not exist"));
    }

    #[test]
    fn test_dry_run_never_touches_filesystem() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("file.txt");
        fs::write(&target, "keep me").unwrap();

        let create = edit(EditAction::Create, "other.txt", Some("x"));
        assert_eq!(
            execute(&create, &dir.path().join("other.txt"), true).status,
            ExecutionStatus::SkippedDryRun
        );
        assert!(!dir.path().join("other.txt").exists());

        let delete = edit(EditAction::Delete, "file.txt", None);
        assert_eq!(
            execute(&delete, &target, true).status,
            ExecutionStatus::SkippedDryRun
        );
        assert_eq!(fs::read_to_string(&target).unwrap(), "keep me");
    }
}
