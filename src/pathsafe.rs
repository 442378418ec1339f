//! Path safety validation
//!
//! Resolves agent-proposed paths against the working-directory root and
//! rejects anything that could escape it. Planner output is untrusted:
//! every path goes through here before risk assessment, no matter what
//! the planner claims about it.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Why a proposed path was refused.
///
/// A `PathUnsafe` result rejects one edit; it is never a run-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathUnsafe {
    Empty,
    NullByte,
    HomeReference,
    Absolute,
    WindowsDrive,
    UncPath,
    ParentTraversal,
    /// The symlink-resolved location falls outside the root.
    OutsideRoot,
    /// Filesystem lookups during resolution failed.
    Unresolvable(String),
}

impl PathUnsafe {
    pub fn as_str(&self) -> &'static str {
        match self {
            PathUnsafe::Empty => "empty path",
            PathUnsafe::NullByte => "embedded null byte",
            PathUnsafe::HomeReference => "home-directory reference",
            PathUnsafe::Absolute => "absolute path",
            PathUnsafe::WindowsDrive => "windows drive path",
            PathUnsafe::UncPath => "UNC path",
            PathUnsafe::ParentTraversal => "parent-directory traversal",
            PathUnsafe::OutsideRoot => "resolves outside the working directory",
            PathUnsafe::Unresolvable(_) => "could not resolve path",
        }
    }
}

impl fmt::Display for PathUnsafe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathUnsafe::Unresolvable(detail) => write!(f, "could not resolve path: {}", detail),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Resolve `raw` safely under `root`.
///
/// Returns the canonical target path, or the reason it was refused.
/// Symlinks are resolved before the containment check: a relative path
/// whose existing ancestors link outside the root is unsafe even though
/// it looks contained.
pub fn resolve_safe(root: &Path, raw: &str) -> Result<PathBuf, PathUnsafe> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == "./" {
        return Err(PathUnsafe::Empty);
    }
    if trimmed.contains('\0') {
        return Err(PathUnsafe::NullByte);
    }
    if trimmed.starts_with('~') {
        return Err(PathUnsafe::HomeReference);
    }
    // Windows forms are rejected on every platform; a plan produced on one
    // OS may be replayed on another.
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(PathUnsafe::WindowsDrive);
    }
    if trimmed.starts_with("\\\\") {
        return Err(PathUnsafe::UncPath);
    }

    let candidate = Path::new(trimmed);
    if candidate.is_absolute() {
        return Err(PathUnsafe::Absolute);
    }
    for component in candidate.components() {
        match component {
            Component::ParentDir => return Err(PathUnsafe::ParentTraversal),
            Component::Prefix(_) | Component::RootDir => return Err(PathUnsafe::Absolute),
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    let base = root
        .canonicalize()
        .map_err(|e| PathUnsafe::Unresolvable(e.to_string()))?;
    let joined = base.join(candidate);
    let resolved = resolve_existing_prefix(&joined)?;

    if resolved.starts_with(&base) {
        Ok(resolved)
    } else {
        Err(PathUnsafe::OutsideRoot)
    }
}

/// Canonicalize the deepest existing ancestor of `path`, then re-append the
/// not-yet-existing remainder. The target of a `create` does not exist yet,
/// but its ancestors (and any symlinks among them) do.
fn resolve_existing_prefix(path: &Path) -> Result<PathBuf, PathUnsafe> {
    let mut existing = path.to_path_buf();
    let mut remainder: Vec<std::ffi::OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(canonical) => {
                let mut out = canonical;
                for part in remainder.iter().rev() {
                    out.push(part);
                }
                return Ok(out);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                match (existing.file_name(), existing.parent()) {
                    (Some(name), Some(parent)) => {
                        remainder.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => return Err(PathUnsafe::Unresolvable("no existing ancestor".to_string())),
                }
            }
            Err(e) => return Err(PathUnsafe::Unresolvable(e.to_string())),
        }
    }
}
