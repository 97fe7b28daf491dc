//! Runs a resolved definition tree.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use harvest_scripting::{Bindings, ScriptProviders};
use harvest_shared::{Result, ScraperConfiguration, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::context::build_http_client;
use super::{CancelToken, RunContext, ScopeStats};
use crate::definition::DefinitionTree;

/// Result of one completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Value of the root element.
    pub value: Value,
    /// Variables left in the outermost scope.
    pub variables: Bindings,
    /// Scope push/pop counts.
    pub scope_stats: ScopeStats,
    pub run_id: Uuid,
    pub elapsed: Duration,
}

/// Executes one [`DefinitionTree`]. Each [`Scraper::execute`] call is an
/// independent run with its own context and script cache.
pub struct Scraper {
    tree: Arc<DefinitionTree>,
    config: Arc<ScraperConfiguration>,
    providers: Arc<ScriptProviders>,
    cancel: Mutex<CancelToken>,
}

impl Scraper {
    /// Scraper using the built-in script providers.
    ///
    /// `charset` and `scriptlang` on the root `config` element override
    /// `config` for this scraper's runs.
    pub fn new(tree: Arc<DefinitionTree>, config: ScraperConfiguration) -> Self {
        Self::with_providers(tree, config, Arc::new(ScriptProviders::with_defaults()))
    }

    pub fn with_providers(
        tree: Arc<DefinitionTree>,
        config: ScraperConfiguration,
        providers: Arc<ScriptProviders>,
    ) -> Self {
        let config = apply_root_overrides(&tree, config);
        Self {
            tree,
            config: Arc::new(config),
            providers,
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    pub fn tree(&self) -> &DefinitionTree {
        &self.tree
    }

    pub fn config(&self) -> &ScraperConfiguration {
        &self.config
    }

    /// Token shared by the runs started until the next [`Self::stop`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel the runs in flight. Runs started afterwards get a fresh token.
    pub fn stop(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *cancel).cancel();
    }

    /// A fresh run context with `variables` bound in its outermost scope.
    pub fn context(&self, variables: &Bindings) -> Result<RunContext> {
        let http = build_http_client(&self.config.http)?;
        let mut ctx = RunContext::new(
            self.config.clone(),
            self.providers.clone(),
            http,
            self.cancel_token(),
        );
        for (name, value) in variables {
            ctx.define(name.clone(), value.clone());
        }
        Ok(ctx)
    }

    /// Run the tree from its root.
    #[instrument(skip_all, fields(source = %self.tree.source()))]
    pub async fn execute(&self, variables: &Bindings) -> Result<RunOutcome> {
        let start = Instant::now();
        let mut ctx = self.context(variables)?;
        let run_id = ctx.run_id();

        info!(%run_id, nodes = self.tree.node_count(), "starting run");

        let result = ctx.execute(self.tree.root()).await;
        let scope_stats = ctx.scope_stats();
        if !scope_stats.is_balanced() {
            warn!(?scope_stats, "unbalanced scopes after run");
        }

        let value = result?;
        let elapsed = start.elapsed();
        info!(%run_id, elapsed_ms = elapsed.as_millis() as u64, "run finished");

        Ok(RunOutcome {
            value,
            variables: ctx.root_variables(),
            scope_stats,
            run_id,
            elapsed,
        })
    }
}

fn apply_root_overrides(tree: &DefinitionTree, mut config: ScraperConfiguration) -> ScraperConfiguration {
    let root = tree.root();
    if root.name().is_builtin() && root.name().local == "config" {
        if let Some(charset) = root.attribute("charset").filter(|c| !c.trim().is_empty()) {
            config = config.with_charset(charset.trim());
        }
        if let Some(language) = root.attribute("scriptlang").filter(|l| !l.trim().is_empty()) {
            config = config.with_script_language(language);
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{DefinitionResolver, ElementRegistry};

    fn tree(doc: &str) -> Arc<DefinitionTree> {
        let resolver = DefinitionResolver::new(Arc::new(ElementRegistry::with_builtins()));
        Arc::new(resolver.resolve(doc, "<string>").unwrap())
    }

    #[test]
    fn root_config_overrides_defaults() {
        let scraper = Scraper::new(
            tree(r#"<config charset="ISO-8859-1" scriptlang="RHAI"/>"#),
            ScraperConfiguration::default().with_script_language("other"),
        );
        assert_eq!(scraper.config().charset, "ISO-8859-1");
        assert_eq!(scraper.config().script_language, "rhai");
    }

    #[tokio::test]
    async fn launcher_variables_are_visible() {
        let scraper = Scraper::new(
            tree(r#"<config><var name="greeting"/></config>"#),
            ScraperConfiguration::default(),
        );
        let mut vars = Bindings::new();
        vars.insert("greeting".into(), Value::from("hi"));

        let outcome = scraper.execute(&vars).await.unwrap();
        assert_eq!(outcome.value, Value::from("hi"));
        assert_eq!(outcome.variables["greeting"], Value::from("hi"));
        assert!(outcome.scope_stats.is_balanced());
    }

    #[tokio::test]
    async fn stop_cancels_current_runs_only() {
        let scraper = Scraper::new(
            tree("<config><text>done</text></config>"),
            ScraperConfiguration::default(),
        );
        let mut running = scraper.context(&Bindings::new()).unwrap();
        scraper.stop();

        let err = running.execute(scraper.tree().root()).await.unwrap_err();
        assert!(matches!(err, harvest_shared::HarvestError::Interrupted));

        let outcome = scraper.execute(&Bindings::new()).await.unwrap();
        assert_eq!(outcome.value, Value::from("done"));
        assert!(!scraper.cancel_token().is_cancelled());
    }
}
