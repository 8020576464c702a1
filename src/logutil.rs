//! Log helpers for user-supplied text (display names, idempotency keys, grant reasons).
//! Keeps every economy log entry on a single, bounded line.

use std::fmt::Write;

const NAME_PREVIEW: usize = 48;
const KEY_PREVIEW: usize = 24;

/// Escape control characters and cap the length at `max_chars`.
pub fn one_line(s: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(s.len().min(max_chars) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= max_chars {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\u{{{:04x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

pub fn name(s: &str) -> String {
    one_line(s, NAME_PREVIEW)
}

/// Idempotency keys are often long event ids; the prefix is enough to correlate.
pub fn key(s: &str) -> String {
    one_line(s, KEY_PREVIEW)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_characters_are_escaped() {
        assert_eq!(name("vex\nadmin\t\u{7}"), "vex\\nadmin\\t\\u{0007}");
    }

    #[test]
    fn literal_backslash_n_differs_from_a_newline() {
        assert_eq!(name("a\\nb"), "a\\\\nb");
        assert_ne!(name("a\\nb"), name("a\nb"));
    }

    #[test]
    fn long_keys_are_truncated() {
        let long = "evt-".repeat(20);
        let shown = key(&long);
        assert_eq!(shown.chars().count(), KEY_PREVIEW + 1);
        assert!(shown.ends_with('…'));
    }
}
