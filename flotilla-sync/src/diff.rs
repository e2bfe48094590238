//! Unified diff rendering between a template file and an instance file.

use similar::TextDiff;

/// Lines of unchanged context around each hunk.
pub const CONTEXT_RADIUS: usize = 3;

/// One rendered patch for one file of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub path: String,
    pub patch: String,
}

/// Render `old` → `new` as a unified diff, or `None` when they are identical.
pub fn render_patch(old_name: &str, new_name: &str, old: &str, new: &str) -> Option<String> {
    if old == new {
        return None;
    }
    let old_header = format!("{old_name}\tTemplate");
    let new_header = format!("{new_name}\tInstance");
    let patch = TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .header(&old_header, &new_header)
        .to_string();
    Some(patch)
}
