//! Plain-text diff rendering
//!
//! Builds the preview shown to interactive approvers and embedded in the
//! audit trail. Deliberately simple: trims the common prefix/suffix and
//! shows the changed middle as removed/added lines.

/// Maximum characters of diff text carried per edit.
const MAX_DIFF_CHARS: usize = 4000;

/// Render a plain diff between the current and proposed content.
///
/// Returns an empty string when nothing changed.
pub fn render_plain(old: &str, new: &str) -> String {
    if old == new {
        return String::new();
    }

    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    // Common prefix
    let mut start = 0;
    while start < old_lines.len() && start < new_lines.len() && old_lines[start] == new_lines[start]
    {
        start += 1;
    }

    // Common suffix, not overlapping the prefix
    let mut old_end = old_lines.len();
    let mut new_end = new_lines.len();
    while old_end > start && new_end > start && old_lines[old_end - 1] == new_lines[new_end - 1] {
        old_end -= 1;
        new_end -= 1;
    }

    let mut out = String::new();
    if start > 0 {
        out.push_str(&format!("@@ {} unchanged line(s) @@\n", start));
    }
    for line in &old_lines[start..old_end] {
        out.push_str("- ");
        out.push_str(line);
        out.push('\n');
    }
    for line in &new_lines[start..new_end] {
        out.push_str("+ ");
        out.push_str(line);
        out.push('\n');
    }
    let trailing = old_lines.len() - old_end;
    if trailing > 0 {
        out.push_str(&format!("@@ {} unchanged line(s) @@\n", trailing));
    }

    truncate(&out, MAX_DIFF_CHARS)
}

/// Render the preview for a brand-new file.
pub fn render_new_file(content: &str) -> String {
    let mut out = String::new();
    for line in content.lines() {
        out.push_str("+ ");
        out.push_str(line);
        out.push('\n');
    }
    truncate(&out, MAX_DIFF_CHARS)
}

/// Truncate on a char boundary, appending a marker when cut.
pub fn truncate(s: &str, max: usize) -> String {
    let trimmed = s.trim_end();
    if trimmed.chars().count() <= max {
        trimmed.to_string()
    } else {
        let snippet: String = trimmed.chars().take(max).collect();
        format!("{}\n… (truncated)", snippet)
    }
}
