//! In-flight multi-line message reassembly (§4.3 `process`, step 3).

use mcp_wire::Value;

/// One fully parsed inbound message, ready to be appended to
/// `results[package]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message: Option<String>,
    pub parameters: Vec<(String, Value)>,
}

/// Anchors exactly one multi-line reassembly in progress at a time (§3
/// invariant: "At most one inbound multi-line reassembly is in progress
/// per connection at a time" — interleaved data-tags from distinct calls
/// are explicitly not supported, §9).
#[derive(Debug, Clone)]
pub struct Reassembling {
    pub package: String,
    pub message: Option<String>,
    pub parameters: Vec<(String, Value)>,
    pub data_tag: String,
}

impl Reassembling {
    /// Appends `value` to the list under `key`, iff `key` is a known
    /// placeholder of this header (§4.3 step 4). Returns `false` if the
    /// key is unknown, so the caller routes the continuation to
    /// `unrecognized` instead.
    #[must_use]
    pub fn append(&mut self, key: &str, value: String) -> bool {
        for (k, v) in &mut self.parameters {
            if k == key {
                if let Value::Multi(values) = v {
                    values.push(value);
                    return true;
                }
                return false;
            }
        }
        false
    }

    /// Consumes this reassembly into its finished [`InboundMessage`]
    /// (§4.3 step 5, on `Terminator`).
    #[must_use]
    pub fn finish(self) -> (String, InboundMessage) {
        (
            self.package,
            InboundMessage {
                message: self.message,
                parameters: self.parameters,
            },
        )
    }
}
