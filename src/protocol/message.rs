//! Wire encoding of protocol messages
//!
//! One message is one line:
//!
//! ```text
//! @@<TestRunner-{"type":"Info","name":"testStarted","attributes":{"name":"testAdd",...}}-TestRunner>
//! ```
//!
//! Attribute values are entity-escaped before JSON encoding so that no value
//! can contain `@`, `<` or `>`, and JSON takes care of quotes and newlines.
//! A free-form value (stack trace, test name) therefore can never open or
//! close a frame, nor break the line.

use anyhow::{Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::vocabulary::EventKind;

pub const FRAME_START: &str = "@@<TestRunner-";
pub const FRAME_END: &str = "-TestRunner>";

/// Value of the frame's `type` field; every event is sent as `Info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MessageType {
    #[default]
    Info,
}

/// One protocol message: an event name plus ordered attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage {
    pub kind: MessageType,
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl TestMessage {
    pub fn new(event: EventKind) -> Self {
        Self {
            kind: MessageType::Info,
            name: event.as_str().to_string(),
            attributes: Vec::new(),
        }
    }

    /// Append an attribute, keeping insertion order
    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.push((key.to_string(), value.into()));
        self
    }

    /// First value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The event kind, if the name belongs to the vocabulary
    pub fn event(&self) -> Option<EventKind> {
        self.name.parse().ok()
    }
}

/// Escape the characters that could be mistaken for framing
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '@' => out.push_str("&#x40;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Inverse of [`escape_value`]
pub fn unescape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(idx) = rest.find('&') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx..];

        let entity = [("&amp;", '&'), ("&#x40;", '@'), ("&lt;", '<'), ("&gt;", '>')]
            .iter()
            .find(|(entity, _)| rest.starts_with(entity));

        match entity {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

struct EscapedAttributes<'a>(&'a [(String, String)]);

impl Serialize for EscapedAttributes<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, &escape_value(value))?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    #[serde(rename = "type")]
    kind: MessageType,
    name: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    attributes: EscapedAttributes<'a>,
}

fn is_empty(attributes: &EscapedAttributes<'_>) -> bool {
    attributes.0.is_empty()
}

#[derive(Default)]
struct OrderedAttributes(Vec<(String, String)>);

impl<'de> Deserialize<'de> for OrderedAttributes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = OrderedAttributes;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of string attributes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut attributes = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    attributes.push((key, unescape_value(&value)));
                }
                Ok(OrderedAttributes(attributes))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(OrderedAttributes::default())
            }
        }

        deserializer.deserialize_any(OrderedVisitor)
    }
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type", default)]
    kind: MessageType,
    name: String,
    #[serde(default)]
    attributes: OrderedAttributes,
}

/// Encode a message as one frame, without the trailing newline
pub fn encode(message: &TestMessage) -> Result<String> {
    let wire = WireMessage {
        kind: message.kind,
        name: &message.name,
        attributes: EscapedAttributes(&message.attributes),
    };
    let json = serde_json::to_string(&wire)
        .with_context(|| format!("Failed to encode '{}' message", message.name))?;

    Ok(format!("{}{}{}", FRAME_START, json, FRAME_END))
}

/// Decode one frame produced by [`encode`]
pub fn decode(line: &str) -> Result<TestMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    let json = line
        .strip_prefix(FRAME_START)
        .and_then(|rest| rest.strip_suffix(FRAME_END))
        .ok_or_else(|| anyhow::anyhow!("Not a test runner frame: {}", line))?;

    let raw: RawMessage = serde_json::from_str(json).context("Malformed test runner frame")?;

    Ok(TestMessage {
        kind: raw.kind,
        name: raw.name,
        attributes: raw.attributes.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::vocabulary::{DETAILS, NAME};

    #[test]
    fn test_encode_without_attributes() {
        let line = encode(&TestMessage::new(EventKind::ReporterAttached)).unwrap();
        assert_eq!(
            line,
            r#"@@<TestRunner-{"type":"Info","name":"testReporterAttached"}-TestRunner>"#
        );
        assert!(decode(&line).unwrap().attributes.is_empty());
    }

    #[test]
    fn test_attributes_keep_insertion_order() {
        let message = TestMessage::new(EventKind::TestFinished)
            .attr("name", "testAdd")
            .attr("duration", "12");
        let line = encode(&message).unwrap();
        assert!(line.contains(r#""attributes":{"name":"testAdd","duration":"12"}"#));
        assert_eq!(decode(&line).unwrap(), message);
    }

    #[test]
    fn test_hostile_value_cannot_break_framing() {
        let trace = "boom\n@@<TestRunner-{\"name\":\"testStarted\"}-TestRunner>\r\nat Calc.java:3 & \"quoted\" \\ <T>";
        let message = TestMessage::new(EventKind::TestFailed)
            .attr(NAME, "weird -TestRunner> name")
            .attr(DETAILS, trace);
        let line = encode(&message).unwrap();

        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
        assert_eq!(line.matches(FRAME_START).count(), 1);
        assert_eq!(line.matches(FRAME_END).count(), 1);
        assert!(line.ends_with(FRAME_END));

        let decoded = decode(&line).unwrap();
        assert_eq!(decoded.get(DETAILS), Some(trace));
        assert_eq!(decoded.get(NAME), Some("weird -TestRunner> name"));
    }

    #[test]
    fn test_escape_round_trip() {
        for value in ["", "&", "&amp;", "&#x40;", "a@b", "<<>>", "&lt;&gt", "plain", "ü@\n&"] {
            assert_eq!(unescape_value(&escape_value(value)), value);
        }
        assert_eq!(escape_value("a@b"), "a&#x40;b");
    }

    #[test]
    fn test_decode_rejects_foreign_text() {
        assert!(decode("Picked up JAVA_TOOL_OPTIONS").is_err());
        assert!(decode("@@<TestRunner-{not json}-TestRunner>").is_err());
    }
}
