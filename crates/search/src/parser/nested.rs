//! Scanning helpers for `nested(...)` calls.
//!
//! All three expression grammars wrap scoped fields in `nested(<path>, ...)`.
//! These helpers find the matching close parenthesis of a call and split its
//! argument list at depth 0, ignoring parentheses and commas inside double
//! quotes.

/// Returns `true` if `s` contains a `nested(` or `nested (` call anywhere.
pub(crate) fn contains_nested(s: &str) -> bool {
    s.contains("nested(") || s.contains("nested (")
}

/// Returns the text after `nested(` / `nested (` if `s` starts with a call.
fn strip_nested_open(s: &str) -> Option<&str> {
    let rest = s.strip_prefix("nested")?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    rest.strip_prefix('(')
}

/// Returns `true` if `s` (ignoring leading whitespace) starts with a call.
pub(crate) fn starts_with_nested(s: &str) -> bool {
    strip_nested_open(s.trim_start()).is_some()
}

/// Splits a leading `nested(...)` call into its argument text and whatever
/// follows the matching close parenthesis.
///
/// Returns `None` if `s` does not start with a call or the call is not closed.
pub(crate) fn nested_call(s: &str) -> Option<(&str, &str)> {
    let inner = strip_nested_open(s.trim_start())?;
    let close = matching_close(inner)?;
    Some((&inner[..close], &inner[close + 1..]))
}

/// Returns the byte offset of the `)` that closes an already-open parenthesis.
fn matching_close(s: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_quote = false;
    let mut prev = '\0';
    for (i, c) in s.char_indices() {
        if c == '"' && prev != '\\' {
            in_quote = !in_quote;
        } else if !in_quote {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        prev = c;
    }
    None
}

/// Splits `s` on `sep` occurrences at parenthesis depth 0, outside quotes.
///
/// Pieces are trimmed. At most `limit` pieces are produced; the last one
/// receives the remainder unsplit.
pub(crate) fn split_top_level(s: &str, sep: char, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut in_quote = false;
    let mut prev = '\0';
    let mut start = 0;

    for (i, c) in s.char_indices() {
        if pieces.len() + 1 == limit {
            break;
        }
        if c == '"' && prev != '\\' {
            in_quote = !in_quote;
        } else if !in_quote {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ if c == sep && depth == 0 => {
                    pieces.push(s[start..i].trim());
                    start = i + c.len_utf8();
                }
                _ => {}
            }
        }
        prev = c;
    }
    pieces.push(s[start..].trim());
    pieces
}
