//! Line grammar tokenizer and composer for MUD Client Protocol (MCP) 2.1.
//!
//! This crate is the leaf of the workspace (§2 of the design): it knows
//! nothing about sockets, sessions, or negotiated package sets. It only
//! turns one CRLF-stripped text line into a [`Token`], and turns one
//! [`Outbound`] call into one or more CRLF-terminated wire lines.
//!
//! ```
//! use mcp_wire::{Outbound, Value, compose, tokenize, Token};
//!
//! let call = Outbound {
//!     package: "org-example".into(),
//!     message: Some("ping".into()),
//!     auth: "12345".into(),
//!     arguments: vec![("topic".into(), Value::Single("dbref".into()))],
//!     data_tag: None,
//! };
//! let line = compose(&call).unwrap();
//! assert_eq!(line, "#$#org-example-ping 12345 topic: \"dbref\"\r\n");
//!
//! match tokenize(line.trim_end_matches("\r\n")) {
//!     Token::Header(h) => assert_eq!(h.tag, "org-example-ping"),
//!     _ => unreachable!(),
//! }
//! ```

mod compose;
mod escape;
mod token;
mod value;

pub use compose::{ComposeError, Outbound, compose};
pub use escape::{escape, unescape};
pub use token::{Continuation, Header, Terminator, Token, tokenize};
pub use value::Value;

/// Compares two data tags per §3's zero-insensitive rule: the server may
/// prepend zero or more `'0'` characters to the tag it echoes back, so
/// equality must be checked after stripping leading zeros from both sides
/// rather than with raw string equality.
#[must_use]
pub fn data_tags_match(sent: &str, echoed: &str) -> bool {
    sent.trim_start_matches('0') == echoed.trim_start_matches('0')
}
