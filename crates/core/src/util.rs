/// Characters that change how GitHub renders a comment.
const MARKDOWN_SPECIAL: &[char] =
    &['\\', '`', '*', '_', '{', '}', '[', ']', '<', '>', '#', '|', '~', '!'];

/// Keeps `@name` from becoming a mention.
const ZERO_WIDTH_SPACE: char = '\u{200B}';

/// Escape markdown control characters so untrusted text renders literally.
/// Letters, digits, whitespace and newlines pass through unchanged. `@` is
/// followed by a zero-width space so output never mentions users or teams.
pub fn escape_markdown(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
        if c == '@' {
            out.push(ZERO_WIDTH_SPACE);
        }
    }
    out
}

/// Truncate to at most `max` characters, marking the cut.
pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => format!("{}\n\n(output truncated)", &value[..idx]),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("hi\n"), "hi\n");
        assert_eq!(escape_markdown("a*b*"), "a\\*b\\*");
        assert_eq!(escape_markdown("```rm -rf```"), "\\`\\`\\`rm -rf\\`\\`\\`");
        assert_eq!(escape_markdown("<img src=x>"), "\\<img src=x\\>");
        assert_eq!(escape_markdown("[x](http://e)"), "\\[x\\](http://e)");
    }

    #[test]
    fn test_escape_mentions() {
        assert_eq!(escape_markdown("@octocat"), "@\u{200B}octocat");
        assert_eq!(escape_markdown("cc @org/team"), "cc @\u{200B}org/team");
        assert!(!escape_markdown("ping @here and @someone").contains("@h"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exact", 5), "exact");
        assert_eq!(truncate_chars("ééééé", 2), "éé\n\n(output truncated)");
    }
}
