//! Textual application of recommendations.

/// Replace the first occurrence of `original` in `content` with `proposed`.
///
/// Returns `None` when `original` does not occur. First-occurrence semantics
/// are deliberate but fragile when the same snippet appears multiple times;
/// callers consume occurrences in recommendation order.
pub fn replace_first(content: &str, original: &str, proposed: &str) -> Option<String> {
    let index = content.find(original)?;
    let mut result = String::with_capacity(content.len() - original.len() + proposed.len());
    result.push_str(&content[..index]);
    result.push_str(proposed);
    result.push_str(&content[index + original.len()..]);
    Some(result)
}
