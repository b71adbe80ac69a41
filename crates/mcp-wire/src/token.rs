//! The MCP line tokenizer (§4.2): a deterministic state machine that turns
//! one CRLF-stripped text line into a [`Token`].

use crate::value::Value;

/// A fully parsed `#$#...` header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// `package` or `package-message`, exactly as it appeared on the wire.
    pub tag: String,
    /// The auth field, compared against the session's auth key by the caller.
    pub auth: String,
    /// Arguments in wire order. A multi-line placeholder (`key*: ""`)
    /// appears here as `(key, Value::Multi(vec![]))`, ready to be filled
    /// in by subsequent [`Continuation`]s.
    pub arguments: Vec<(String, Value)>,
    /// The `_data-tag` value, if the header carried one.
    pub data_tag: Option<String>,
}

/// A `#$#* data-tag key: value` continuation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub data_tag: String,
    pub key: String,
    /// Raw, unescaped value (continuation values are never quoted — §4.2,
    /// §9 open question (b)).
    pub value: String,
}

/// A `#$#: data-tag` terminator line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Terminator {
    pub data_tag: String,
}

/// The result of tokenizing one line. Malformed input is a value, not an
/// error: callers (the session's `process`) are required to route it to
/// the `unrecognized` channel rather than abort (§7 "Recovery policy").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Header(Header),
    Continuation(Continuation),
    Terminator(Terminator),
    Malformed { reason: String, raw: String },
}

/// Named states of the header-argument parser (§4.2 "Tokenizer contract").
/// `ExpectColon` is entered for the single character right after a key's
/// `:` and immediately forwards into `ExpectValueStart`, consuming at most
/// one following space — it exists as its own state purely so every
/// transition in the grammar has a named place to live, matching the
/// one-state-machine mandate in §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectKey,
    ExpectColon,
    ExpectValueStart,
    InQuotedValue,
    InEscape,
    InBareValue,
}

/// Tokenizes one MCP line. `line` must already have its `#$#` prefix
/// confirmed present and its trailing CRLF stripped (§4.2 "Tokenizer
/// contract").
#[must_use]
pub fn tokenize(line: &str) -> Token {
    let Some(body) = line.strip_prefix("#$#") else {
        return Token::Malformed {
            reason: "line does not start with #$#".to_string(),
            raw: line.to_string(),
        };
    };

    if let Some(rest) = body.strip_prefix("* ") {
        return parse_continuation(rest, line);
    }
    if let Some(rest) = body.strip_prefix(": ") {
        return parse_terminator(rest, line);
    }
    parse_header(body, line)
}

fn parse_continuation(rest: &str, raw: &str) -> Token {
    let Some((data_tag, after_tag)) = rest.split_once(' ') else {
        return malformed("continuation line missing key/value", raw);
    };
    if data_tag.is_empty() {
        return malformed("continuation line has empty data-tag", raw);
    }
    let Some((key, value_part)) = after_tag.split_once(':') else {
        return malformed("continuation line missing ':' after key", raw);
    };
    if key.is_empty() {
        return malformed("continuation line has empty key", raw);
    }
    let value = value_part.strip_prefix(' ').unwrap_or(value_part);
    Token::Continuation(Continuation {
        data_tag: data_tag.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_terminator(rest: &str, raw: &str) -> Token {
    if rest.is_empty() {
        return malformed("terminator line has empty data-tag", raw);
    }
    Token::Terminator(Terminator {
        data_tag: rest.to_string(),
    })
}

fn parse_header(body: &str, raw: &str) -> Token {
    let Some((tag, after_tag)) = body.split_once(' ') else {
        return malformed("header missing auth field", raw);
    };
    if tag.is_empty() {
        return malformed("header has empty tag", raw);
    }
    let (auth, rest) = match after_tag.split_once(' ') {
        Some((auth, rest)) => (auth, rest),
        None => (after_tag, ""),
    };
    if auth.is_empty() {
        return malformed("header has empty auth field", raw);
    }

    match parse_arguments(rest) {
        Ok((arguments, data_tag)) => Token::Header(Header {
            tag: tag.to_string(),
            auth: auth.to_string(),
            arguments,
            data_tag,
        }),
        Err(reason) => malformed(&reason, raw),
    }
}

fn parse_arguments(s: &str) -> Result<(Vec<(String, Value)>, Option<String>), String> {
    let mut state = State::ExpectKey;
    let mut key = String::new();
    let mut value = String::new();
    let mut arguments = Vec::new();
    let mut data_tag = None;

    let chars: Vec<char> = s.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match state {
            State::ExpectKey => {
                if c == ' ' {
                    i += 1;
                } else if c == ':' {
                    state = State::ExpectColon;
                    i += 1;
                } else {
                    key.push(c);
                    i += 1;
                }
            }
            State::ExpectColon => {
                if c == ' ' {
                    i += 1;
                }
                state = State::ExpectValueStart;
            }
            State::ExpectValueStart => {
                if c == ' ' {
                    i += 1;
                } else if c == '"' {
                    state = State::InQuotedValue;
                    i += 1;
                } else if key == "_data-tag" {
                    state = State::InBareValue;
                    value.push(c);
                    i += 1;
                } else {
                    return Err(format!("expected quoted value for key `{key}`"));
                }
            }
            State::InQuotedValue => match c {
                '\\' => {
                    state = State::InEscape;
                    i += 1;
                }
                '"' => {
                    commit(&mut key, &mut value, &mut arguments, &mut data_tag)?;
                    state = State::ExpectKey;
                    i += 1;
                }
                other => {
                    value.push(other);
                    i += 1;
                }
            },
            State::InEscape => {
                value.push(c);
                state = State::InQuotedValue;
                i += 1;
            }
            State::InBareValue => {
                if c == ' ' {
                    commit(&mut key, &mut value, &mut arguments, &mut data_tag)?;
                    state = State::ExpectKey;
                    i += 1;
                } else {
                    value.push(c);
                    i += 1;
                }
            }
        }
    }

    match state {
        State::ExpectKey if key.is_empty() => {}
        State::InBareValue => commit(&mut key, &mut value, &mut arguments, &mut data_tag)?,
        State::ExpectKey => return Err("argument missing ':'".to_string()),
        State::ExpectColon | State::ExpectValueStart => {
            return Err("argument has key but no value".to_string());
        }
        State::InQuotedValue | State::InEscape => {
            return Err("unterminated quoted value".to_string());
        }
    }

    Ok((arguments, data_tag))
}

fn commit(
    key: &mut String,
    value: &mut String,
    arguments: &mut Vec<(String, Value)>,
    data_tag: &mut Option<String>,
) -> Result<(), String> {
    if key == "_data-tag" {
        *data_tag = Some(std::mem::take(value));
    } else if let Some(real_key) = key.strip_suffix('*') {
        if !value.is_empty() {
            return Err(format!(
                "multi-line placeholder `{real_key}*` must have an empty value"
            ));
        }
        arguments.push((real_key.to_string(), Value::Multi(Vec::new())));
    } else {
        // `value` is already decoded: InQuotedValue/InEscape resolve escapes
        // character-by-character as they scan, so unescaping again here
        // would misinterpret a literal backslash left over from decoding.
        arguments.push((key.clone(), Value::Single(std::mem::take(value))));
    }
    key.clear();
    value.clear();
    Ok(())
}

fn malformed(reason: &str, raw: &str) -> Token {
    Token::Malformed {
        reason: reason.to_string(),
        raw: raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_with_no_arguments() {
        match tokenize("#$#mcp-negotiate-end 12345") {
            Token::Header(h) => {
                assert_eq!(h.tag, "mcp-negotiate-end");
                assert_eq!(h.auth, "12345");
                assert!(h.arguments.is_empty());
                assert_eq!(h.data_tag, None);
            }
            other => panic!("expected Header, got {other:?}"),
        }
    }

    #[test]
    fn header_with_single_and_escaped_arguments() {
        let line = "#$#org-example-ping 12345 topic: \"dbref\" note: \"say \\\"hi\\\"\"";
        match tokenize(line) {
            Token::Header(h) => {
                assert_eq!(
                    h.arguments,
                    vec![
                        ("topic".to_string(), Value::Single("dbref".to_string())),
                        (
                            "note".to_string(),
                            Value::Single(r#"say "hi""#.to_string())
                        ),
                    ]
                );
            }
            other => panic!("expected Header, got {other:?}"),
        }
    }

    #[test]
    fn header_with_multiline_placeholder_and_data_tag() {
        match tokenize(r#"#$#org-fuzzball-help-entry A text*: "" _data-tag: "0T1""#) {
            Token::Header(h) => {
                assert_eq!(h.tag, "org-fuzzball-help-entry");
                assert_eq!(h.data_tag, Some("0T1".to_string()));
                assert_eq!(
                    h.arguments,
                    vec![("text".to_string(), Value::Multi(Vec::new()))]
                );
            }
            other => panic!("expected Header, got {other:?}"),
        }
    }

    #[test]
    fn bare_unquoted_data_tag_terminated_by_whitespace() {
        match tokenize(r#"#$#org-example-ping 12345 _data-tag: T1 topic: "x""#) {
            Token::Header(h) => {
                assert_eq!(h.data_tag, Some("T1".to_string()));
                assert_eq!(
                    h.arguments,
                    vec![("topic".to_string(), Value::Single("x".to_string()))]
                );
            }
            other => panic!("expected Header, got {other:?}"),
        }
    }

    #[test]
    fn extra_spaces_between_colon_and_value_are_accepted() {
        match tokenize(r#"#$#org-example-ping 12345 topic:   "dbref""#) {
            Token::Header(h) => {
                assert_eq!(
                    h.arguments,
                    vec![("topic".to_string(), Value::Single("dbref".to_string()))]
                );
            }
            other => panic!("expected Header, got {other:?}"),
        }
    }

    #[test]
    fn missing_colon_is_malformed() {
        match tokenize(r#"#$#org-example-ping 12345 topic "dbref""#) {
            Token::Malformed { .. } => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn continuation_strips_single_leading_space() {
        match tokenize("#$#* T1 text:  two spaces kept after the first") {
            Token::Continuation(c) => {
                assert_eq!(c.data_tag, "T1");
                assert_eq!(c.key, "text");
                assert_eq!(c.value, " two spaces kept after the first");
            }
            other => panic!("expected Continuation, got {other:?}"),
        }
    }

    #[test]
    fn continuation_value_is_never_unescaped() {
        match tokenize(r#"#$#* T1 text: a literal \" and \\"#) {
            Token::Continuation(c) => {
                assert_eq!(c.value, r#"a literal \" and \\"#);
            }
            other => panic!("expected Continuation, got {other:?}"),
        }
    }

    #[test]
    fn terminator_line() {
        match tokenize("#$#: T1") {
            Token::Terminator(t) => assert_eq!(t.data_tag, "T1"),
            other => panic!("expected Terminator, got {other:?}"),
        }
    }

    #[test]
    fn non_mcp_line_is_malformed_not_panicking() {
        match tokenize("just some chat text") {
            Token::Malformed { .. } => {}
            other => panic!("expected Malformed, got {other:?}"),
        }
    }
}
