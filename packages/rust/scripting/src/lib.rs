//! Scripting-engine abstraction for Harvest.
//!
//! Operations never talk to a scripting runtime directly. They describe a
//! [`ScriptSource`] and ask a per-run [`ScriptEngineFactory`] for a
//! [`ScriptEngine`]; the factory resolves the language (explicit tag, else the
//! run default), builds one evaluator per language on first use and reuses it
//! afterwards.
//!
//! Evaluators come from [`EvaluatorProvider`]s collected in a
//! [`ScriptProviders`] set. [`RhaiProvider`] is always available.

mod rhai_engine;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use harvest_shared::{HarvestError, Result, Value};
use tracing::debug;

pub use rhai_engine::RhaiProvider;

/// Owned variable table, e.g. a run's initial or final variables.
pub type Bindings = BTreeMap<String, Value>;

/// Variables visible to one evaluation, borrowed from the scope chain.
pub type Visible<'a> = BTreeMap<&'a str, &'a Value>;

/// Polled while a script runs. Returning `true` stops it with `Interrupted`.
pub type InterruptCheck = Arc<dyn Fn() -> bool + Send + Sync>;

/// Borrowed view of an owned table.
pub fn visible(bindings: &Bindings) -> Visible<'_> {
    bindings.iter().map(|(k, v)| (k.as_str(), v)).collect()
}

// ---------------------------------------------------------------------------
// Language + source
// ---------------------------------------------------------------------------

/// Normalised (trimmed, lower-case) scripting language tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptingLanguage(String);

impl ScriptingLanguage {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptingLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A script body plus the language it declares, if any.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub body: String,
    pub language: Option<ScriptingLanguage>,
}

impl ScriptSource {
    /// Script in the run's default language.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            language: None,
        }
    }

    /// Script with an explicit language tag. Blank tags count as absent.
    pub fn with_language(body: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            body: body.into(),
            language: language
                .filter(|l| !l.trim().is_empty())
                .map(ScriptingLanguage::new),
        }
    }
}

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// One scripting runtime instance.
///
/// Implementations need not be thread-safe; [`ScriptEngine`] serialises access.
pub trait Evaluator: Send {
    /// Evaluate `script` with `bindings` visible as variables.
    fn eval(&mut self, script: &str, bindings: &Visible<'_>) -> Result<Value>;
}

/// Constructs evaluators for one language.
pub trait EvaluatorProvider: Send + Sync {
    /// Language tag this provider serves.
    fn language(&self) -> &str;

    /// Build a fresh evaluator that stops once `interrupt` returns `true`.
    fn create(&self, interrupt: InterruptCheck) -> Result<Box<dyn Evaluator>>;
}

/// The set of evaluator providers available to runs, keyed by language.
#[derive(Clone, Default)]
pub struct ScriptProviders {
    providers: HashMap<ScriptingLanguage, Arc<dyn EvaluatorProvider>>,
}

impl ScriptProviders {
    /// An empty provider set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Providers compiled into Harvest (currently Rhai).
    pub fn with_defaults() -> Self {
        let mut providers = Self::empty();
        providers.register(Arc::new(RhaiProvider::default()));
        providers
    }

    /// Add or replace the provider for its language.
    pub fn register(&mut self, provider: Arc<dyn EvaluatorProvider>) {
        let language = ScriptingLanguage::new(provider.language());
        self.providers.insert(language, provider);
    }

    pub fn get(&self, language: &ScriptingLanguage) -> Option<&Arc<dyn EvaluatorProvider>> {
        self.providers.get(language)
    }

    /// Registered language tags, sorted.
    pub fn languages(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.providers.keys().map(|l| l.0.clone()).collect();
        tags.sort();
        tags
    }
}

impl fmt::Debug for ScriptProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptProviders")
            .field("languages", &self.languages())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Engine handle + factory
// ---------------------------------------------------------------------------

/// Shared handle to a cached evaluator. Cloning shares the same instance.
#[derive(Clone)]
pub struct ScriptEngine {
    language: ScriptingLanguage,
    evaluator: Arc<Mutex<Box<dyn Evaluator>>>,
}

impl ScriptEngine {
    pub fn language(&self) -> &ScriptingLanguage {
        &self.language
    }

    /// Evaluate a script. Concurrent callers for the same language take turns.
    pub fn evaluate(&self, script: &str, bindings: &Visible<'_>) -> Result<Value> {
        let mut evaluator = self
            .evaluator
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        evaluator.eval(script, bindings)
    }

    /// Whether two handles share one evaluator instance.
    pub fn same_instance(&self, other: &ScriptEngine) -> bool {
        Arc::ptr_eq(&self.evaluator, &other.evaluator)
    }
}

impl fmt::Debug for ScriptEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptEngine")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

/// Per-run evaluator cache.
pub struct ScriptEngineFactory {
    default_language: ScriptingLanguage,
    providers: Arc<ScriptProviders>,
    interrupt: InterruptCheck,
    cache: Mutex<HashMap<ScriptingLanguage, ScriptEngine>>,
}

impl ScriptEngineFactory {
    pub fn new(providers: Arc<ScriptProviders>, default_language: &str) -> Self {
        Self {
            default_language: ScriptingLanguage::new(default_language),
            providers,
            interrupt: Arc::new(|| false),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluators built from now on poll `interrupt` while scripts run.
    pub fn with_interrupt(mut self, interrupt: InterruptCheck) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn default_language(&self) -> &ScriptingLanguage {
        &self.default_language
    }

    /// Language a script would run in: its own tag, else the run default.
    pub fn resolve_language(&self, source: &ScriptSource) -> ScriptingLanguage {
        source
            .language
            .clone()
            .unwrap_or_else(|| self.default_language.clone())
    }

    /// Get (building on first use) the evaluator for `source`'s language.
    ///
    /// Fails with a configuration error when no provider serves the language.
    /// Failed lookups are never cached.
    pub fn get_engine(&self, source: &ScriptSource) -> Result<ScriptEngine> {
        let language = self.resolve_language(source);

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = cache.get(&language) {
            return Ok(engine.clone());
        }

        let provider = self.providers.get(&language).ok_or_else(|| {
            HarvestError::configuration(format!(
                "no script engine found for name: '{language}'; possibly missing provider"
            ))
        })?;

        debug!(%language, "creating script engine");
        let engine = ScriptEngine {
            language: language.clone(),
            evaluator: Arc::new(Mutex::new(provider.create(self.interrupt.clone())?)),
        };
        cache.insert(language, engine.clone());
        Ok(engine)
    }

    /// Convenience: resolve the engine and evaluate the source body.
    pub fn evaluate(&self, source: &ScriptSource, bindings: &Visible<'_>) -> Result<Value> {
        self.get_engine(source)?.evaluate(&source.body, bindings)
    }

    /// Languages with a cached evaluator, sorted.
    pub fn cached_languages(&self) -> Vec<String> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tags: Vec<String> = cache.keys().map(|l| l.0.clone()).collect();
        tags.sort();
        tags
    }
}
