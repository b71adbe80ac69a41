/// A single MCP argument value: either a plain string, or an ordered list
/// of strings reassembled from `#$#*` continuation lines (§3 "Outbound
/// call" / "Inbound message").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A single-line, quoted-and-escaped value.
    Single(String),
    /// A multi-line value; empty until continuation lines are appended.
    Multi(Vec<String>),
}

impl Value {
    /// Returns `true` for the list-valued variant — the composer checks
    /// this to decide whether a `_data-tag` is required (§4.2).
    #[must_use]
    pub fn is_multi(&self) -> bool {
        matches!(self, Value::Multi(_))
    }
}
