//! Resolution of definition markup into a [`DefinitionTree`].

use std::sync::Arc;

use harvest_shared::{HarvestError, Result};
use roxmltree::{Document, Node};
use tracing::{debug, instrument};

use super::element::ElementInfo;
use super::node::{DefinitionNode, DefinitionTree};
use super::registry::ElementRegistry;
use super::source::{ConfigSource, read_document};
use super::{Location, QName};
use crate::runtime::SlotBody;

/// Parses documents and binds every element to its operation.
#[derive(Clone)]
pub struct DefinitionResolver {
    registry: Arc<ElementRegistry>,
}

/// Enclosing element, used to recognise its slots.
struct Parent<'a> {
    namespace: &'a str,
    info: &'a ElementInfo,
}

impl DefinitionResolver {
    pub fn new(registry: Arc<ElementRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ElementRegistry> {
        &self.registry
    }

    /// Read and resolve the document behind `source`.
    #[instrument(skip_all, fields(source = %source.identity()))]
    pub async fn resolve_source(&self, source: &dyn ConfigSource) -> Result<DefinitionTree> {
        let text = read_document(source).await?;
        self.resolve(&text, &source.identity())
    }

    /// Resolve document `text`; `identity` names it in diagnostics.
    pub fn resolve(&self, text: &str, identity: &str) -> Result<DefinitionTree> {
        let doc = Document::parse(text).map_err(|e| {
            let pos = e.pos();
            HarvestError::definition_at(
                format!("malformed document: {e}"),
                format!("{identity}:{}:{}", pos.row, pos.col),
            )
        })?;

        let root = self.resolve_element(&doc, doc.root_element(), None, identity)?;
        let tree = DefinitionTree::new(root, identity);
        debug!(nodes = tree.node_count(), "definition resolved");
        Ok(tree)
    }

    fn resolve_element(
        &self,
        doc: &Document<'_>,
        element: Node<'_, '_>,
        parent: Option<&Parent<'_>>,
        identity: &str,
    ) -> Result<DefinitionNode> {
        let tag = element.tag_name();
        let name = QName::new(tag.namespace().unwrap_or(""), tag.name());
        let pos = doc.text_pos_at(element.range().start);
        let location = Location {
            line: pos.row,
            column: pos.col,
        };
        let at = format!("{identity}:{}:{}", location.line, location.column);

        let slot_spec = parent
            .filter(|p| p.namespace == name.namespace)
            .and_then(|p| p.info.slot(&name.local));

        let mut node = match slot_spec {
            Some(slot) => {
                DefinitionNode::new(name.clone(), Arc::new(SlotBody::new(slot))).into_slot()
            }
            None => {
                let operation = self.registry.lookup(&name).ok_or_else(|| {
                    HarvestError::UnknownOperation {
                        name: name.to_string(),
                        location: Some(at.clone()),
                    }
                })?;
                DefinitionNode::new(name.clone(), operation.clone())
            }
        }
        .with_location(location);

        let info = *node.info();

        for attribute in element.attributes() {
            // Foreign-namespace attributes (xsi:…) are not part of any contract.
            if attribute.namespace().is_some() {
                continue;
            }
            if !info.is_valid_attribute(attribute.name()) {
                return Err(HarvestError::definition_at(
                    format!(
                        "attribute '{}' is not valid for element <{name}>",
                        attribute.name()
                    ),
                    at,
                ));
            }
            node = node.with_attribute(attribute.name(), attribute.value());
        }

        for required in info.required_attributes {
            if node.attribute(required).is_none() {
                return Err(HarvestError::definition_at(
                    format!("element <{name}> is missing required attribute '{required}'"),
                    at,
                ));
            }
        }

        let this = Parent {
            namespace: &name.namespace,
            info: &info,
        };
        for child in element.children() {
            if child.is_element() {
                node = node.with_child(self.resolve_element(doc, child, Some(&this), identity)?);
            } else if let Some(text) = child.text().filter(|_| child.is_text()) {
                if !text.trim().is_empty() {
                    node = node.with_text(text);
                }
            }
        }

        for slot in info.slots {
            let count = node.slots(slot.name).count();
            if slot.required && count == 0 {
                return Err(HarvestError::definition_at(
                    format!("element <{name}> is missing required <{}>", slot.name),
                    at,
                ));
            }
            if !slot.repeatable && count > 1 {
                return Err(HarvestError::definition_at(
                    format!("element <{name}> allows only one <{}>", slot.name),
                    at,
                ));
            }
        }

        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::BodyPart;
    use harvest_shared::ErrorKind;

    fn resolver() -> DefinitionResolver {
        DefinitionResolver::new(Arc::new(ElementRegistry::with_builtins()))
    }

    const DOC: &str = r#"<?xml version="1.0"?>
<config charset="UTF-8">
    <var-def name="numbers">
        <regexp>
            <regexp-pattern>\d+</regexp-pattern>
            <regexp-source>a12b34</regexp-source>
        </regexp>
    </var-def>
    <text>done</text>
</config>"#;

    #[test]
    fn node_count_matches_element_count() {
        let tree = resolver().resolve(DOC, "<string>").unwrap();
        // config, var-def, regexp, regexp-pattern, regexp-source, text
        assert_eq!(tree.node_count(), 6);
        assert_eq!(tree.source(), "<string>");

        let regexp = tree
            .root()
            .children()
            .next()
            .and_then(|v| v.children().next())
            .unwrap();
        assert_eq!(regexp.name().local, "regexp");
        assert!(regexp.slot("regexp-pattern").unwrap().is_slot());
        assert!(regexp.slot("regexp-result").is_none());
    }

    #[test]
    fn resolving_twice_yields_equal_trees() {
        let a = resolver().resolve(DOC, "doc").unwrap();
        let b = resolver().resolve(DOC, "doc").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn whitespace_only_text_is_dropped() {
        let tree = resolver()
            .resolve("<config>\n  <text> a b </text>\n</config>", "doc")
            .unwrap();
        let text = tree.root().children().next().unwrap();
        assert_eq!(tree.root().body().len(), 1);
        assert_eq!(text.body(), &[BodyPart::Text(" a b ".into())]);
    }

    #[test]
    fn unknown_element_reports_name_and_location() {
        let err = resolver()
            .resolve("<config>\n  <frobnicate/>\n</config>", "site.xml")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Definition);
        match err {
            HarvestError::UnknownOperation { name, location } => {
                assert_eq!(name, "frobnicate");
                assert_eq!(location.as_deref(), Some("site.xml:2:3"));
            }
            other => panic!("expected unknown operation, got {other:?}"),
        }
    }

    #[test]
    fn foreign_namespace_elements_need_registration() {
        let err = resolver()
            .resolve(r#"<config xmlns:a="urn:x"><a:zip/></config>"#, "doc")
            .unwrap_err();
        assert!(err.to_string().contains("unknown operation {urn:x}zip"));
    }

    #[test]
    fn invalid_attribute_is_rejected() {
        let err = resolver()
            .resolve(r#"<config><var nmae="x"/></config>"#, "doc")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Definition);
        assert!(err.to_string().contains("'nmae'"));
    }

    #[test]
    fn missing_required_slot_is_rejected() {
        let err = resolver()
            .resolve(
                "<config><regexp><regexp-pattern>a</regexp-pattern></regexp></config>",
                "doc",
            )
            .unwrap_err();
        assert!(err.to_string().contains("<regexp-source>"));
    }

    #[test]
    fn slot_names_outside_their_parent_are_unknown() {
        let err = resolver()
            .resolve("<config><regexp-pattern>a</regexp-pattern></config>", "doc")
            .unwrap_err();
        assert!(matches!(err, HarvestError::UnknownOperation { .. }));
    }

    #[test]
    fn malformed_markup_is_a_definition_error() {
        let err = resolver().resolve("<config><var>", "doc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Definition);
        assert!(err.to_string().contains("malformed document"));
    }
}
