//! Element registry: qualified element names bound to operations.
//!
//! Built-ins are inserted by [`ElementRegistry::with_builtins`]. Plugins are
//! looked up by type identifier in a [`PluginCatalog`] and inserted under a
//! namespace. A pair binds to exactly one operation; re-binding fails.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use harvest_shared::{HarvestError, Result};
use tracing::{debug, warn};

use super::element::ElementInfo;
use super::{DEFAULT_NAMESPACE, QName};
use crate::plugins;
use crate::processors;
use crate::runtime::Operation;

// ---------------------------------------------------------------------------
// Plugin catalog
// ---------------------------------------------------------------------------

/// Constructor for a plugin operation.
pub type PluginConstructor = fn() -> Arc<dyn Operation>;

/// Plugin implementations that can be registered by type identifier.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    constructors: HashMap<String, PluginConstructor>,
}

impl PluginCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the plugins shipped with Harvest.
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.add(plugins::ZIP_PLUGIN, plugins::zip_operation);
        catalog.add(plugins::ZIP_ENTRY_PLUGIN, plugins::zip_entry_operation);
        catalog
    }

    /// Make `type_id` loadable.
    pub fn add(&mut self, type_id: impl Into<String>, constructor: PluginConstructor) {
        self.constructors.insert(type_id.into(), constructor);
    }

    /// Instantiate the plugin registered under `type_id`.
    pub fn load(&self, type_id: &str) -> Result<Arc<dyn Operation>> {
        self.constructors
            .get(type_id.trim())
            .map(|constructor| constructor())
            .ok_or_else(|| HarvestError::plugin(type_id, "cannot load: unknown plugin type"))
    }

    /// Known type identifiers, sorted.
    pub fn type_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

/// Split `type-id[:namespace-uri]`. The namespace may itself contain colons.
pub fn parse_plugin_reference(reference: &str) -> (&str, &str) {
    match reference.trim().split_once(':') {
        Some((type_id, namespace)) => (type_id.trim(), namespace.trim()),
        None => (reference.trim(), ""),
    }
}

/// Outcome of registering a list of plugins.
#[derive(Debug, Default)]
pub struct PluginReport {
    /// Element names that were bound.
    pub registered: Vec<QName>,
    /// References that failed, with the reason.
    pub failures: Vec<(String, HarvestError)>,
}

impl PluginReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps `(namespace, local-name)` to the operation executing that element.
///
/// Built before runs, then shared read-only behind an `Arc`.
#[derive(Clone, Default)]
pub struct ElementRegistry {
    operations: HashMap<QName, Arc<dyn Operation>>,
}

impl ElementRegistry {
    /// A registry with nothing bound.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry with every built-in operation plus the archive plugins,
    /// all in the default namespace.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        let archive = [plugins::zip_operation(), plugins::zip_entry_operation()];
        for operation in processors::builtins().into_iter().chain(archive) {
            let name = QName::builtin(operation.info().name);
            registry.operations.insert(name, operation);
        }
        registry
    }

    /// Bind `operation` under its element name in `namespace`.
    ///
    /// Fails without modifying the registry if the name is already bound.
    pub fn register(&mut self, namespace: &str, operation: Arc<dyn Operation>) -> Result<QName> {
        let name = QName::new(namespace, operation.info().name);
        if self.operations.contains_key(&name) {
            return Err(HarvestError::plugin(
                name.to_string(),
                "element already registered in this namespace",
            ));
        }
        debug!(element = %name, "registered element");
        self.operations.insert(name.clone(), operation);
        Ok(name)
    }

    /// Load `type_id` from `catalog` and bind it in `namespace`
    /// (empty means the default namespace).
    pub fn register_plugin(
        &mut self,
        catalog: &PluginCatalog,
        type_id: &str,
        namespace: &str,
    ) -> Result<QName> {
        let operation = catalog.load(type_id)?;
        self.register(namespace, operation)
            .map_err(|e| match e {
                HarvestError::Plugin { message, .. } => HarvestError::plugin(type_id, message),
                other => other,
            })
    }

    /// Register every `type-id[:namespace]` reference. Failures are logged
    /// and skipped; the rest still register.
    pub fn register_plugins<S: AsRef<str>>(
        &mut self,
        catalog: &PluginCatalog,
        references: &[S],
    ) -> PluginReport {
        let mut report = PluginReport::default();
        for reference in references {
            let reference = reference.as_ref();
            let (type_id, namespace) = parse_plugin_reference(reference);
            match self.register_plugin(catalog, type_id, namespace) {
                Ok(name) => report.registered.push(name),
                Err(e) => {
                    warn!(plugin = reference, error = %e, "skipping plugin");
                    report.failures.push((reference.to_string(), e));
                }
            }
        }
        report
    }

    pub fn lookup(&self, name: &QName) -> Option<&Arc<dyn Operation>> {
        self.operations.get(name)
    }

    pub fn contains(&self, name: &QName) -> bool {
        self.operations.contains_key(name)
    }

    /// Every bound element with its contract, ordered by namespace then name.
    pub fn elements(&self) -> Vec<(QName, ElementInfo)> {
        let sorted: BTreeMap<&QName, &Arc<dyn Operation>> = self.operations.iter().collect();
        sorted
            .into_iter()
            .map(|(name, op)| (name.clone(), *op.info()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Namespaces with at least one element, default namespace first.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<&str> = self
            .operations
            .keys()
            .map(|q| q.namespace.as_str())
            .collect();
        namespaces.sort_unstable_by_key(|ns| (*ns != DEFAULT_NAMESPACE, *ns));
        namespaces.dedup();
        namespaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_shared::ErrorKind;

    #[test]
    fn builtins_include_core_and_archive_elements() {
        let registry = ElementRegistry::with_builtins();
        for name in ["config", "var-def", "regexp", "loop", "http", "zip", "zip-entry"] {
            assert!(registry.contains(&QName::builtin(name)), "missing {name}");
        }
        assert_eq!(registry.namespaces(), vec![DEFAULT_NAMESPACE]);
    }

    #[test]
    fn plugin_reference_keeps_colons_in_namespace() {
        assert_eq!(
            parse_plugin_reference("com.example.Foo:urn:x"),
            ("com.example.Foo", "urn:x")
        );
        assert_eq!(parse_plugin_reference("com.example.Foo"), ("com.example.Foo", ""));
    }

    #[test]
    fn unknown_plugin_is_reported_and_registry_unchanged() {
        let mut registry = ElementRegistry::with_builtins();
        let before = registry.len();

        let report =
            registry.register_plugins(&PluginCatalog::with_defaults(), &["com.example.Foo:urn:x"]);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].1.kind(), ErrorKind::Plugin);
        assert!(report.failures[0].1.to_string().contains("cannot load"));
        assert_eq!(registry.len(), before);
    }

    #[test]
    fn conflicting_registration_fails_loud() {
        let mut registry = ElementRegistry::with_builtins();
        let catalog = PluginCatalog::with_defaults();

        let err = registry
            .register_plugin(&catalog, plugins::ZIP_PLUGIN, "")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Plugin);

        let name = registry
            .register_plugin(&catalog, plugins::ZIP_PLUGIN, "urn:archive")
            .unwrap();
        assert_eq!(name, QName::new("urn:archive", "zip"));
    }

    #[test]
    fn later_references_register_after_a_failure() {
        let mut registry = ElementRegistry::empty();
        let report = registry.register_plugins(
            &PluginCatalog::with_defaults(),
            &[
                "nope.Missing:urn:a".to_string(),
                format!("{}:urn:b", plugins::ZIP_ENTRY_PLUGIN),
            ],
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.registered, vec![QName::new("urn:b", "zip-entry")]);
    }

    #[test]
    fn elements_listing_is_sorted() {
        let registry = ElementRegistry::with_builtins();
        let names: Vec<String> = registry
            .elements()
            .into_iter()
            .map(|(q, _)| q.local)
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
