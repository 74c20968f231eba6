//! Glob matching for coordinate fields.
//!
//! Patterns support `*` (any run of characters), `?` (any single character)
//! and `\` to escape the next character. Everything else, brackets included,
//! is literal. Patterns are translated to [`glob::Pattern`] syntax, where
//! metacharacters are escaped by wrapping them in brackets. Runs of `*`
//! collapse to one, since `glob` reserves `**` for whole path components.

use glob::Pattern;
use tracing::warn;

/// Returns true if `pattern` contains an unescaped `*` or `?`.
pub fn has_wildcards(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '*' | '?' => return true,
            _ => {}
        }
    }
    false
}

/// Remove escapes from a wildcard-free pattern.
pub fn unescape(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next().unwrap_or('\\')),
            other => out.push(other),
        }
    }
    out
}

fn to_glob_syntax(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars();
    let mut after_star = false;
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped) => push_literal(&mut out, escaped),
                None => push_literal(&mut out, '\\'),
            },
            '*' if after_star => continue,
            '*' | '?' => out.push(c),
            other => push_literal(&mut out, other),
        }
        after_star = c == '*';
    }
    out
}

fn push_literal(out: &mut String, c: char) {
    match c {
        '*' | '?' | '[' | ']' => {
            out.push('[');
            out.push(c);
            out.push(']');
        }
        other => out.push(other),
    }
}

/// Match `value` against a glob `pattern`.
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    if !has_wildcards(pattern) {
        return unescape(pattern) == value;
    }
    let translated = to_glob_syntax(pattern);
    match Pattern::new(&translated) {
        Ok(compiled) => compiled.matches(value),
        Err(e) => {
            warn!(pattern, translated = %translated, error = %e, "Rejected glob pattern");
            false
        }
    }
}
