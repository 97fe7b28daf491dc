//! Helpers shared by the unit tests.

use std::path::Path;
use std::sync::Arc;

use harvest_scripting::Bindings;
use harvest_shared::{Result, ScraperConfiguration, Value};

use crate::definition::{DefinitionResolver, DefinitionTree, ElementRegistry};
use crate::runtime::Scraper;

/// Resolve `doc` against the built-in registry; panics on definition errors.
pub(crate) fn resolve(doc: &str) -> DefinitionTree {
    DefinitionResolver::new(Arc::new(ElementRegistry::with_builtins()))
        .resolve(doc, "<string>")
        .expect("test document should resolve")
}

/// Run `doc` with default configuration.
pub(crate) async fn run(doc: &str) -> Result<Value> {
    execute(doc, ScraperConfiguration::default()).await
}

/// Run `doc` with `workdir` as the working directory.
pub(crate) async fn run_in(doc: &str, workdir: &Path) -> Result<Value> {
    execute(doc, ScraperConfiguration::default().with_workdir(workdir)).await
}

async fn execute(doc: &str, config: ScraperConfiguration) -> Result<Value> {
    let scraper = Scraper::new(Arc::new(resolve(doc)), config);
    let outcome = scraper.execute(&Bindings::new()).await?;
    assert!(outcome.scope_stats.is_balanced(), "unbalanced scopes");
    Ok(outcome.value)
}
