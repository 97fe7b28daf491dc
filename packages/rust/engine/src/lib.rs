//! Declarative pipeline engine for Harvest.
//!
//! A definition document is loaded from a [`ConfigSource`], resolved by a
//! [`DefinitionResolver`] against an [`ElementRegistry`] into an immutable
//! [`DefinitionTree`], and executed by a [`Scraper`]. Each element is bound to
//! an [`Operation`]; operations share one [`RunContext`] per run.

pub mod definition;
pub mod plugins;
pub mod processors;
pub mod runtime;

#[cfg(test)]
mod test_support;

pub use definition::{
    ConfigSource, DEFAULT_NAMESPACE, DefinitionNode, DefinitionResolver, DefinitionTree,
    ElementInfo, ElementRegistry, FileConfigSource, Location, PluginCatalog, PluginReport, QName,
    SlotSpec, StringConfigSource, UrlConfigSource, source_for,
};
pub use runtime::{CancelToken, Operation, RunContext, RunOutcome, ScopeStats, Scraper};
