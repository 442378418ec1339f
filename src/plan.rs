//! Candidate edits and planners
//!
//! A planner turns a task into an ordered list of proposed file edits.
//! Two planners ship with the binary: a JSON plan-file reader (the shape
//! an external planning service emits) and a git diff gate that treats
//! the current worktree changes as the proposal. Planner output is
//! untrusted either way; the pipeline re-validates every path.

use crate::task::Task;
use anyhow::{Context, Result};
use git2::{Repository, Status};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Bytes of file content a planner will read per file.
const MAX_CONTENT_BYTES: usize = 200_000;

/// What a candidate edit wants to do. Closed set; the executor handles
/// every variant exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Create,
    Modify,
    Delete,
}

impl EditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditAction::Create => "create",
            EditAction::Modify => "modify",
            EditAction::Delete => "delete",
        }
    }
}

/// A single proposed file mutation, exactly as the planner proposed it.
/// The path is unvalidated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEdit {
    pub id: Uuid,
    pub action: EditAction,
    pub path: String,
    /// Full proposed file content for create/modify; absent for delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Why the planner wants this edit.
    pub rationale: String,
}

/// Produces the ordered candidate edits for a task.
///
/// This is a suspension point: the call may block (network, subprocess).
/// It happens exactly once, before any edit is processed.
pub trait Planner {
    fn plan(&self, task: &Task) -> Result<Vec<CandidateEdit>>;
}

// ---------------------------------------------------------------------------
// Plan-file planner
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlanDocument {
    #[serde(default)]
    #[allow(dead_code)]
    summary: String,
    changes: Vec<PlanChange>,
}

#[derive(Debug, Deserialize)]
struct PlanChange {
    action: EditAction,
    path: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    content: Option<String>,
}

/// Reads candidate edits from a JSON plan document.
pub struct PlanFilePlanner {
    path: std::path::PathBuf,
}

impl PlanFilePlanner {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Planner for PlanFilePlanner {
    fn plan(&self, _task: &Task) -> Result<Vec<CandidateEdit>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read plan file {}", self.path.display()))?;
        let doc: PlanDocument = serde_json::from_str(&content)
            .with_context(|| format!("invalid plan file {}", self.path.display()))?;

        Ok(doc
            .changes
            .into_iter()
            .map(|change| CandidateEdit {
                id: Uuid::new_v4(),
                action: change.action,
                rationale: if change.description.is_empty() {
                    format!("{} {}", change.action.as_str(), change.path)
                } else {
                    change.description
                },
                path: change.path,
                content: change.content,
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Git diff-gate planner
// ---------------------------------------------------------------------------

/// Derives candidate edits from the git worktree: staged and unstaged
/// changes plus untracked files, in status order. Lets CI review a branch
/// without any planning service.
pub struct GitDiffPlanner;

impl Planner for GitDiffPlanner {
    fn plan(&self, task: &Task) -> Result<Vec<CandidateEdit>> {
        let repo = Repository::open(&task.root)
            .with_context(|| format!("{} is not a git repository", task.root.display()))?;

        let mut options = git2::StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let statuses = repo
            .statuses(Some(&mut options))
            .context("failed to read git status")?;

        let mut edits = Vec::new();
        for entry in statuses.iter() {
            let Some(path) = entry.path() else { continue };
            let status = entry.status();

            let action = if status.intersects(Status::WT_NEW | Status::INDEX_NEW) {
                EditAction::Create
            } else if status.intersects(Status::WT_MODIFIED | Status::INDEX_MODIFIED) {
                EditAction::Modify
            } else if status.intersects(Status::WT_DELETED | Status::INDEX_DELETED) {
                EditAction::Delete
            } else {
                continue;
            };

            let content = match action {
                EditAction::Delete => None,
                _ => Some(read_capped(&task.root.join(path))),
            };

            edits.push(CandidateEdit {
                id: Uuid::new_v4(),
                action,
                rationale: format!("{} {} (worktree change)", action.as_str(), path),
                path: path.to_string(),
                content,
            });
        }
        Ok(edits)
    }
}

/// Best-effort content read: lossy on invalid UTF-8, capped, empty on error.
fn read_capped(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mut text = String::from_utf8_lossy(&bytes).into_owned();
            if text.len() > MAX_CONTENT_BYTES {
                let mut cut = MAX_CONTENT_BYTES;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            text
        }
        Err(_) => String::new(),
    }
}
