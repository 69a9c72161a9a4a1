// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Wildcard patterns: `*` matches any sequence, `?` matches one character,
//! `\` makes the next character literal.

enum PatternChar {
    Any,
    One,
    Literal(char),
}

fn compile(pattern: &str) -> Vec<PatternChar> {
    let mut compiled = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        compiled.push(match c {
            '*' => PatternChar::Any,
            '?' => PatternChar::One,

            // NOTE: A trailing lone escape stands for itself
            '\\' => PatternChar::Literal(chars.next().unwrap_or('\\')),

            c => PatternChar::Literal(c),
        });
    }

    compiled
}

fn char_eq(a: char, b: char, case_sensitive: bool) -> bool {
    a == b || (!case_sensitive && a.to_lowercase().eq(b.to_lowercase()))
}

/// Compares two strings ignoring case.
#[must_use]
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// Matches `text` against a wildcard pattern.
#[must_use]
pub fn wildcard_match(text: &str, pattern: &str, case_sensitive: bool) -> bool {
    let pattern = compile(pattern);

    let mut t = 0;
    let mut p = 0;

    // Position of the last `*` and the text offset it currently covers up to
    let mut backtrack: Option<(usize, usize)> = None;

    while let Some(c) = text.get(t..).and_then(|rest| rest.chars().next()) {
        match pattern.get(p) {
            Some(PatternChar::Any) => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some(PatternChar::One) => {
                t += c.len_utf8();
                p += 1;
                continue;
            }
            Some(PatternChar::Literal(expected)) if char_eq(*expected, c, case_sensitive) => {
                t += c.len_utf8();
                p += 1;
                continue;
            }
            _ => {}
        }

        let Some((star_p, star_t)) = backtrack else {
            return false;
        };

        // Let the last `*` swallow one more character
        let skipped = text
            .get(star_t..)
            .and_then(|rest| rest.chars().next())
            .map_or(1, char::len_utf8);

        p = star_p + 1;
        t = star_t + skipped;
        backtrack = Some((star_p, t));
    }

    pattern
        .get(p..)
        .unwrap_or_default()
        .iter()
        .all(|c| matches!(c, PatternChar::Any))
}

/// Appends `s` to `out` with wildcard characters escaped.
pub fn escape_wildcards(s: &str, out: &mut String) {
    for c in s.chars() {
        if matches!(c, '*' | '?' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Returns `true` if the pattern contains an unescaped `*` or `?`.
#[must_use]
pub fn has_wildcards(pattern: &str) -> bool {
    compile(pattern)
        .iter()
        .any(|c| matches!(c, PatternChar::Any | PatternChar::One))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn wildcard_basics() {
        assert!(wildcard_match("", "", true));
        assert!(wildcard_match("", "*", true));
        assert!(wildcard_match("abc", "abc", true));
        assert!(!wildcard_match("abc", "ab", true));
        assert!(wildcard_match("abc", "a*", true));
        assert!(wildcard_match("abc", "*c", true));
        assert!(wildcard_match("abc", "a?c", true));
        assert!(!wildcard_match("ac", "a?c", true));
        assert!(wildcard_match("code=42\n", "*code=42*", true));
        assert!(!wildcard_match("code=7\n", "*code=42*", true));
    }

    #[test]
    fn wildcard_backtracking() {
        assert!(wildcard_match("aaab", "*a*b", true));
        assert!(wildcard_match("mississippi", "*sip*", true));
        assert!(wildcard_match("abcabd", "*abd", true));
        assert!(!wildcard_match("abcabc", "*abd", true));
    }

    #[test]
    fn wildcard_escapes() {
        assert!(wildcard_match("a*b", "a\\*b", true));
        assert!(!wildcard_match("axb", "a\\*b", true));
        assert!(wildcard_match("a?", "a\\?", true));
        assert!(wildcard_match("C:\\dir", "C:\\\\*", true));

        let mut escaped = String::new();
        escape_wildcards("1*2?3\\", &mut escaped);
        assert_eq!("1\\*2\\?3\\\\", escaped);
        assert!(wildcard_match("1*2?3\\", &escaped, true));
        assert!(!has_wildcards(&escaped));
        assert!(has_wildcards("a\\*b*"));
    }

    #[test]
    fn wildcard_case() {
        assert!(!wildcard_match("ERROR", "*error*", true));
        assert!(wildcard_match("ERROR", "*error*", false));
        assert!(wildcard_match("Grüße", "GRÜ?E", false));
        assert!(eq_ignore_case("Straße", "STRAßE"));
    }
}
