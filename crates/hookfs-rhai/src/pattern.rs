//! Glob patterns for `matchindirectory` handlers.
//!
//! `*` matches any run of characters, `?` any single character, `[...]` a
//! character class with ranges, and a backslash quotes the next character.

use glob::{Pattern, PatternError};

/// Compile a glob pattern, turning backslash quotes into one-character
/// classes.
pub fn compile(pattern: &str) -> Result<Pattern, PatternError> {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(quoted @ ('*' | '?' | '[' | ']')) => {
                out.push('[');
                out.push(quoted);
                out.push(']');
            }
            Some(quoted) => out.push(quoted),
            None => out.push('\\'),
        }
    }
    Pattern::new(&out)
}

/// Returns true if `name` matches `pattern`.
pub fn glob_match(pattern: &str, name: &str) -> Result<bool, PatternError> {
    Ok(compile(pattern)?.matches(name))
}
