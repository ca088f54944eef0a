//! Joining argv tokens into a single `sh -c` command line.

use std::borrow::Cow;

const SPECIAL: &[char] = &[
    ',', '"', '\'', '\\', '=', '$', '`', ';', '&', '|', '<', '>', '(', ')', '*', '?', '[', ']',
    '{', '}', '#', '~', '!',
];

fn needs_quoting(token: &str) -> bool {
    token.is_empty() || token.chars().any(|c| c.is_whitespace() || SPECIAL.contains(&c))
}

/// True when the whole token is one double- or single-quoted word.
pub fn is_fully_quoted(token: &str) -> bool {
    let mut chars = token.chars();
    match chars.next() {
        Some('\'') => {
            let rest = &token[1..];
            !rest.is_empty() && rest.ends_with('\'') && !rest[..rest.len() - 1].contains('\'')
        }
        Some('"') => {
            let mut escaped = false;
            let mut closed_at = None;
            for (i, c) in token.char_indices().skip(1) {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    closed_at = Some(i);
                    break;
                }
            }
            closed_at == Some(token.len() - 1)
        }
        _ => false,
    }
}

pub fn quote_arg(token: &str) -> Cow<'_, str> {
    if is_fully_quoted(token) || !needs_quoting(token) {
        return Cow::Borrowed(token);
    }

    Cow::Owned(wrap(token))
}

/// For values that come from a client rather than from this crate. An
/// already quoted token would otherwise reach the shell verbatim, with any
/// `$(...)` inside it expanded; it is wrapped once more so the command
/// receives the text exactly as sent.
pub fn quote_literal(token: &str) -> Cow<'_, str> {
    if is_fully_quoted(token) {
        Cow::Owned(wrap(token))
    } else {
        Cow::Borrowed(token)
    }
}

fn wrap(token: &str) -> String {
    let mut quoted = String::with_capacity(token.len() + 2);
    quoted.push('"');
    for c in token.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

pub fn join_command<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| quote_arg(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
