//! Front-matter splitting.
//!
//! A header is a `---` fenced region at start-of-file. Splitting is purely
//! textual; parsing the extracted region is the caller's concern so that a
//! syntactically broken header can still be reported as a finding.

/// Split content into an optional raw header region and the body.
///
/// Returns `(header, body)` where `header` is the text between the opening
/// and closing `---` fences (exclusive), or `None` when the file has no
/// front-matter. Without a closing fence the whole content is body.
pub fn split(content: &str) -> (Option<&str>, &str) {
    let Some(rest) = content.strip_prefix("---") else {
        return (None, content);
    };

    // The opening fence must be a full line.
    let rest = match rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) {
        Some(rest) => rest,
        None => return (None, content),
    };

    for (idx, _) in rest.match_indices("---") {
        let at_line_start = idx == 0 || rest.as_bytes()[idx - 1] == b'\n';
        if !at_line_start {
            continue;
        }
        let after = &rest[idx + 3..];
        let body = after
            .strip_prefix("\r\n")
            .or_else(|| after.strip_prefix('\n'))
            .unwrap_or(after);
        let header = rest[..idx].trim_end_matches(['\r', '\n']);
        return (Some(header), body.trim_start_matches(['\r', '\n']));
    }

    (None, content)
}
