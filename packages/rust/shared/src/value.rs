//! The runtime value produced by every pipeline operation.

use std::fmt;

use encoding_rs::{Encoding, UTF_8};

/// Charset used when none is configured or a configured label is unknown.
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Result of executing one operation.
///
/// Values are immutable once produced; consumers take ownership or clone.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No result.
    #[default]
    Empty,
    /// Textual result.
    Text(String),
    /// Raw bytes (archive contents, binary HTTP bodies, file reads).
    Binary(Vec<u8>),
    /// Ordered collection of results.
    List(Vec<Value>),
}

impl Value {
    /// Whether the value carries no content at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.is_empty(),
            Self::Binary(b) => b.is_empty(),
            Self::List(items) => items.is_empty(),
        }
    }

    /// Render as text. Binary is decoded as lossy UTF-8; list items are concatenated.
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Text(s) => s.clone(),
            Self::Binary(b) => String::from_utf8_lossy(b).into_owned(),
            Self::List(items) => items.iter().map(Value::to_text).collect(),
        }
    }

    /// Render as text, joining list items with `delimiter`.
    pub fn to_text_joined(&self, delimiter: &str) -> String {
        match self {
            Self::List(items) => items
                .iter()
                .map(Value::to_text)
                .collect::<Vec<_>>()
                .join(delimiter),
            other => other.to_text(),
        }
    }

    /// Encode as bytes using the named charset.
    ///
    /// Unknown charset labels fall back to UTF-8. Binary values are returned as-is.
    pub fn to_binary(&self, charset: &str) -> Vec<u8> {
        match self {
            Self::Empty => Vec::new(),
            Self::Text(s) => {
                let (bytes, _, _) = encoding_for(charset).encode(s);
                bytes.into_owned()
            }
            Self::Binary(b) => b.clone(),
            Self::List(items) => items.iter().flat_map(|v| v.to_binary(charset)).collect(),
        }
    }

    /// Interpret as a boolean flag (`true`, `yes`, `on`, `1`, case-insensitive).
    pub fn to_bool(&self) -> bool {
        is_truthy(&self.to_text())
    }

    /// Flatten into list items: lists yield their items, empty yields nothing.
    pub fn into_items(self) -> Vec<Value> {
        match self {
            Self::Empty => Vec::new(),
            Self::List(items) => items,
            other => vec![other],
        }
    }

    /// Decode bytes into a text value using the named charset.
    pub fn decode(bytes: &[u8], charset: &str) -> Self {
        let (text, _, _) = encoding_for(charset).decode(bytes);
        Self::Text(text.into_owned())
    }

    /// JSON rendering used by the CLI; binary becomes an array of byte values.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Empty => serde_json::Value::Null,
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Binary(b) => serde_json::Value::from(b.clone()),
            Self::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

/// Parse a boolean attribute value the way every operation does.
pub fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

fn encoding_for(charset: &str) -> &'static Encoding {
    Encoding::for_label(charset.trim().as_bytes()).unwrap_or_else(|| {
        tracing::warn!(charset, "unknown charset, falling back to {DEFAULT_CHARSET}");
        UTF_8
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}
