//! Shared guardrails for query payload bounds.

pub const MAX_SCOPE_LENGTH: usize = 512;
pub const MAX_SNIPPET_LINES: usize = 5000;
pub const MIN_SNIPPET_LINES: usize = 1;

pub fn clamp_int(value: usize, minimum: usize, maximum: usize) -> usize {
    value.max(minimum).min(maximum)
}

/// Snippet line budget, kept within `[MIN_SNIPPET_LINES, MAX_SNIPPET_LINES]`.
pub fn clamp_snippet_lines(value: usize) -> usize {
    clamp_int(value, MIN_SNIPPET_LINES, MAX_SNIPPET_LINES)
}

/// Trimmed scope token, cut to [`MAX_SCOPE_LENGTH`] characters.
pub fn truncate_scope(scope: &str) -> String {
    let stripped = scope.trim();
    if stripped.chars().count() <= MAX_SCOPE_LENGTH {
        stripped.to_string()
    } else {
        stripped.chars().take(MAX_SCOPE_LENGTH).collect()
    }
}
