//! Definition layer: loading documents, the element contract, and resolution
//! of markup into an immutable tree of bound operation definitions.

mod element;
mod node;
mod registry;
mod resolver;
mod source;

use std::fmt;

pub(crate) use element::common_suggestions;
pub use element::{ElementInfo, SlotSpec};
pub use node::{BodyPart, DefinitionNode, DefinitionTree};
pub use registry::{
    ElementRegistry, PluginCatalog, PluginConstructor, PluginReport, parse_plugin_reference,
};
pub use resolver::DefinitionResolver;
pub use source::{
    ConfigSource, FileConfigSource, StringConfigSource, UrlConfigSource, read_document,
    source_for,
};

/// Namespace of the built-in operations. Elements without a namespace live here.
pub const DEFAULT_NAMESPACE: &str = "http://web-harvest.sourceforge.net/schema/1.0/config";

/// Qualified element name: namespace URI plus local name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    pub namespace: String,
    pub local: String,
}

impl QName {
    /// Qualified name in `namespace`; an empty namespace means the default one.
    pub fn new(namespace: &str, local: impl Into<String>) -> Self {
        let namespace = if namespace.trim().is_empty() {
            DEFAULT_NAMESPACE
        } else {
            namespace.trim()
        };
        Self {
            namespace: namespace.to_string(),
            local: local.into(),
        }
    }

    /// Qualified name in the default namespace.
    pub fn builtin(local: impl Into<String>) -> Self {
        Self::new(DEFAULT_NAMESPACE, local)
    }

    pub fn is_builtin(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_builtin() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// 1-based position of an element in its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_namespace_means_default() {
        assert_eq!(QName::new("", "var"), QName::builtin("var"));
        assert_eq!(QName::builtin("var").to_string(), "var");
    }

    #[test]
    fn foreign_names_use_clark_notation() {
        assert_eq!(QName::new("urn:x", "foo").to_string(), "{urn:x}foo");
    }
}
