//! Shell-style wildcard matching for step ids and instance environments.
//!
//! Patterns support `*` (any run of characters) and `?` (any single
//! character) and match case-insensitively. Multiple alternatives can be
//! given as a comma-separated list, e.g. `deployPackage/*,enable*`.

use regex::RegexBuilder;

/// Check whether `value` matches the shell-style wildcard `pattern`.
pub fn wildcard_match(value: &str, pattern: &str) -> bool {
    pattern
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .any(|p| single_match(value, p))
}

fn single_match(value: &str, pattern: &str) -> bool {
    let mut translated = String::with_capacity(pattern.len() + 8);
    translated.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            other => translated.push_str(&regex::escape(&other.to_string())),
        }
    }
    translated.push('$');

    match RegexBuilder::new(&translated)
        .case_insensitive(true)
        .build()
    {
        Ok(re) => re.is_match(value),
        // A pattern that fails to compile matches nothing.
        Err(_) => false,
    }
}
