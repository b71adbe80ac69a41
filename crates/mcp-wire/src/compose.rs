//! The MCP composer (§4.2 "Composer contract"): serializes an [`Outbound`]
//! call back into the wire grammar.

use std::fmt;

use crate::escape::escape;
use crate::value::Value;

/// One outbound call, in the shape the session hands to the composer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub package: String,
    pub message: Option<String>,
    pub auth: String,
    /// Arguments in caller-supplied insertion order (§4.2 "Key ordering").
    pub arguments: Vec<(String, Value)>,
    /// Required iff any argument is list-valued; see [`compose`].
    pub data_tag: Option<String>,
}

/// Error returned by [`compose`] when the call is internally inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    /// At least one argument is list-valued but no `data_tag` was supplied.
    MissingDataTag,
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeError::MissingDataTag => {
                write!(f, "call has list-valued arguments but no data_tag")
            }
        }
    }
}

impl std::error::Error for ComposeError {}

/// Serializes `call` into one or more CRLF-terminated wire lines,
/// concatenated into a single string ready to hand to a transport's
/// `write`.
///
/// If any argument is list-valued, `call.data_tag` must be `Some`: the
/// header gets a `key*: ""` placeholder and an `_data-tag` field, and a
/// `#$#* data-tag key: value` continuation line is appended per list
/// element in order, followed by a `#$#: data-tag` terminator.
/// Continuation values are emitted verbatim — never quoted or escaped
/// (§4.2, §9 open question (b)).
pub fn compose(call: &Outbound) -> Result<String, ComposeError> {
    let has_list = call.arguments.iter().any(|(_, v)| v.is_multi());
    if has_list && call.data_tag.is_none() {
        return Err(ComposeError::MissingDataTag);
    }

    let tag = match &call.message {
        Some(message) => format!("{}-{}", call.package, message),
        None => call.package.clone(),
    };

    let mut out = format!("#$#{tag} {}", call.auth);
    for (key, value) in &call.arguments {
        match value {
            Value::Single(s) => {
                out.push(' ');
                out.push_str(key);
                out.push_str(": \"");
                out.push_str(&escape(s));
                out.push('"');
            }
            Value::Multi(_) => {
                out.push(' ');
                out.push_str(key);
                out.push_str("*: \"\"");
            }
        }
    }
    if has_list {
        let data_tag = call.data_tag.as_ref().expect("checked above");
        out.push_str(" _data-tag: \"");
        out.push_str(&escape(data_tag));
        out.push('"');
    }
    out.push_str("\r\n");

    if has_list {
        let data_tag = call.data_tag.as_ref().expect("checked above");
        for (key, value) in &call.arguments {
            if let Value::Multi(lines) = value {
                for line in lines {
                    out.push_str("#$#* ");
                    out.push_str(data_tag);
                    out.push(' ');
                    out.push_str(key);
                    out.push_str(": ");
                    out.push_str(line);
                    out.push_str("\r\n");
                }
            }
        }
        out.push_str("#$#: ");
        out.push_str(data_tag);
        out.push_str("\r\n");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Token, tokenize};
    use pretty_assertions::assert_eq;

    #[test]
    fn single_string_call_round_trip() {
        let call = Outbound {
            package: "org-example".to_string(),
            message: Some("ping".to_string()),
            auth: "12345".to_string(),
            arguments: vec![("topic".to_string(), Value::Single("dbref".to_string()))],
            data_tag: None,
        };
        let line = compose(&call).unwrap();
        assert_eq!(line, "#$#org-example-ping 12345 topic: \"dbref\"\r\n");
    }

    #[test]
    fn empty_argument_set_has_no_trailing_space() {
        let call = Outbound {
            package: "mcp-negotiate".to_string(),
            message: Some("end".to_string()),
            auth: "A".to_string(),
            arguments: vec![],
            data_tag: None,
        };
        assert_eq!(compose(&call).unwrap(), "#$#mcp-negotiate-end A\r\n");
    }

    #[test]
    fn list_value_without_data_tag_is_an_error() {
        let call = Outbound {
            package: "org-fuzzball-help".to_string(),
            message: Some("entry".to_string()),
            auth: "A".to_string(),
            arguments: vec![(
                "text".to_string(),
                Value::Multi(vec!["line one".to_string()]),
            )],
            data_tag: None,
        };
        assert_eq!(compose(&call), Err(ComposeError::MissingDataTag));
    }

    #[test]
    fn multiline_call_emits_header_continuations_and_terminator() {
        let call = Outbound {
            package: "org-fuzzball-help".to_string(),
            message: Some("entry".to_string()),
            auth: "A".to_string(),
            arguments: vec![(
                "text".to_string(),
                Value::Multi(vec![
                    "line one".to_string(),
                    "line two".to_string(),
                    "line three".to_string(),
                ]),
            )],
            data_tag: Some("T1".to_string()),
        };
        let out = compose(&call).unwrap();
        let mut lines = out.split("\r\n").filter(|l| !l.is_empty());
        assert_eq!(
            lines.next().unwrap(),
            "#$#org-fuzzball-help-entry A text*: \"\" _data-tag: \"T1\""
        );
        assert_eq!(lines.next().unwrap(), "#$#* T1 text: line one");
        assert_eq!(lines.next().unwrap(), "#$#* T1 text: line two");
        assert_eq!(lines.next().unwrap(), "#$#* T1 text: line three");
        assert_eq!(lines.next().unwrap(), "#$#: T1");
        assert!(lines.next().is_none());
    }

    #[test]
    fn composer_tokenizer_duality_for_string_only_calls() {
        let call = Outbound {
            package: "org-example".to_string(),
            message: None,
            auth: "A1".to_string(),
            arguments: vec![
                ("a".to_string(), Value::Single("plain".to_string())),
                (
                    "b".to_string(),
                    Value::Single("has \"quotes\" and \\backslash".to_string()),
                ),
            ],
            data_tag: None,
        };
        let composed = compose(&call).unwrap();
        let line = composed.trim_end_matches("\r\n");
        match tokenize(line) {
            Token::Header(h) => {
                assert_eq!(h.tag, call.package);
                assert_eq!(h.auth, call.auth);
                assert_eq!(h.arguments, call.arguments);
            }
            other => panic!("expected Header, got {other:?}"),
        }
    }
}
