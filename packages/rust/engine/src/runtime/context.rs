//! Per-run mutable state: variable scopes, the operation stack, and
//! resources that outer operations lend to nested ones.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;

use harvest_scripting::{Bindings, ScriptEngineFactory, ScriptProviders, ScriptSource, Visible};
use harvest_shared::{HarvestError, HttpConfig, Result, ScraperConfiguration, Value, is_truthy};
use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

use super::CancelToken;
use super::expression::{Segment, has_expressions, split_template};
use crate::definition::{BodyPart, DefinitionNode, Location, QName};

/// Boxed `Send` future, needed where execution recurses.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An operation currently executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub name: QName,
    pub location: Location,
}

/// Scope push/pop counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeStats {
    pub pushes: usize,
    pub pops: usize,
}

impl ScopeStats {
    pub fn is_balanced(&self) -> bool {
        self.pushes == self.pops
    }
}

/// A resource lent by the frame at `depth`.
struct Lent {
    depth: usize,
    resource: Box<dyn Any + Send>,
}

/// Build the HTTP client a run uses.
pub(crate) fn build_http_client(http: &HttpConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(http.user_agent.as_str())
        .timeout(http.timeout());

    if let Some(proxy_url) = http.proxy_url() {
        let mut proxy = reqwest::Proxy::all(&proxy_url)
            .map_err(|e| HarvestError::configuration(format!("invalid proxy {proxy_url}: {e}")))?;
        if let Some(user) = http.proxy_user.as_deref() {
            proxy = proxy.basic_auth(user, &http.proxy_password().unwrap_or_default());
        }
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| HarvestError::Network(format!("failed to build HTTP client: {e}")))
}

/// Dynamic scope context of one run.
pub struct RunContext {
    run_id: Uuid,
    config: Arc<ScraperConfiguration>,
    scripts: ScriptEngineFactory,
    http: Client,
    cancel: CancelToken,
    scopes: Vec<HashMap<String, Value>>,
    frames: Vec<Frame>,
    lent: Vec<Lent>,
    stats: ScopeStats,
}

impl RunContext {
    pub fn new(
        config: Arc<ScraperConfiguration>,
        providers: Arc<ScriptProviders>,
        http: Client,
        cancel: CancelToken,
    ) -> Self {
        let interrupt = {
            let cancel = cancel.clone();
            Arc::new(move || cancel.is_cancelled())
        };
        let scripts =
            ScriptEngineFactory::new(providers, &config.script_language).with_interrupt(interrupt);
        Self {
            run_id: Uuid::now_v7(),
            config,
            scripts,
            http,
            cancel,
            scopes: vec![HashMap::new()],
            frames: Vec::new(),
            lent: Vec::new(),
            stats: ScopeStats::default(),
        }
    }

    /// Context with the built-in script providers and a client built from `config`.
    pub fn with_config(config: ScraperConfiguration) -> Result<Self> {
        let http = build_http_client(&config.http)?;
        Ok(Self::new(
            Arc::new(config),
            Arc::new(ScriptProviders::with_defaults()),
            http,
            CancelToken::new(),
        ))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &ScraperConfiguration {
        &self.config
    }

    pub fn http_client(&self) -> &Client {
        &self.http
    }

    pub fn scripts(&self) -> &ScriptEngineFactory {
        &self.scripts
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn check_cancelled(&self) -> Result<()> {
        self.cancel.check()
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Execute one node: check cancellation and required attributes, push a
    /// frame, run the operation, then pop the frame and everything it owned.
    pub fn execute<'a>(&'a mut self, node: &'a DefinitionNode) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.framed(node, false))
    }

    /// Execute a slot node under its own frame, collecting its body as
    /// [`Self::execute_body_list`] does.
    pub fn execute_list<'a>(&'a mut self, node: &'a DefinitionNode) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.framed(node, true))
    }

    async fn framed(&mut self, node: &DefinitionNode, as_list: bool) -> Result<Value> {
        self.cancel.check()?;

        let operation = node.operation().clone();
        if let Some(missing) = operation
            .info()
            .required_attributes
            .iter()
            .find(|a| node.attribute(a).is_none())
        {
            return Err(HarvestError::definition_at(
                format!(
                    "element <{}> is missing required attribute '{missing}'",
                    node.name()
                ),
                node.location().to_string(),
            ));
        }

        let scope_depth = self.scopes.len();
        self.frames.push(Frame {
            name: node.name().clone(),
            location: node.location(),
        });
        debug!(element = %node.name(), depth = self.frames.len(), "executing");

        let result = if as_list && node.is_slot() {
            self.execute_body_list(node).await
        } else {
            operation.run(node, self).await
        };
        self.unwind(scope_depth);

        result.map_err(|e| e.in_operation(node.name().to_string(), node.location().to_string()))
    }

    /// Execute body parts in order; the last non-empty value wins.
    /// Literal text counts as a value.
    pub async fn execute_body(&mut self, node: &DefinitionNode) -> Result<Value> {
        let mut last = Value::Empty;
        for part in node.body() {
            let value = match part {
                BodyPart::Text(text) => Value::Text(text.clone()),
                BodyPart::Element(child) => self.execute(child).await?,
            };
            if !value.is_empty() {
                last = value;
            }
        }
        Ok(last)
    }

    /// Execute body parts and collect every non-empty value into a list.
    /// List values are flattened one level.
    pub async fn execute_body_list(&mut self, node: &DefinitionNode) -> Result<Value> {
        let mut items = Vec::new();
        for part in node.body() {
            let value = match part {
                BodyPart::Text(text) => Value::Text(text.clone()),
                BodyPart::Element(child) => self.execute(child).await?,
            };
            match value {
                Value::List(inner) => items.extend(inner.into_iter().filter(|v| !v.is_empty())),
                v if v.is_empty() => {}
                v => items.push(v),
            }
        }
        Ok(Value::List(items))
    }

    fn unwind(&mut self, scope_depth: usize) {
        let depth = self.frames.len();
        while self.lent.last().is_some_and(|l| l.depth >= depth) {
            self.lent.pop();
        }
        self.frames.pop();
        while self.scopes.len() > scope_depth.max(1) {
            self.scopes.pop();
            self.stats.pops += 1;
        }
    }

    // -----------------------------------------------------------------------
    // Operation stack + enclosing resources
    // -----------------------------------------------------------------------

    /// Operations currently executing, outermost first.
    pub fn operation_stack(&self) -> &[Frame] {
        &self.frames
    }

    /// Nearest enclosing (not current) operation with the given local name.
    pub fn find_enclosing(&self, local: &str) -> Option<&Frame> {
        let outer = self.frames.len().saturating_sub(1);
        self.frames[..outer].iter().rev().find(|f| f.name.local == local)
    }

    /// Lend `resource` to operations nested in the current one. It is
    /// dropped when the current operation finishes, unless withdrawn first.
    pub fn provide<T: Any + Send>(&mut self, resource: T) {
        self.lent.push(Lent {
            depth: self.frames.len(),
            resource: Box::new(resource),
        });
    }

    /// Take back a resource the current operation provided.
    pub fn withdraw<T: Any + Send>(&mut self) -> Option<T> {
        let depth = self.frames.len();
        let index = self
            .lent
            .iter()
            .rposition(|l| l.depth == depth && l.resource.is::<T>())?;
        self.lent.remove(index).resource.downcast::<T>().ok().map(|b| *b)
    }

    /// Innermost resource of type `T` lent by this or an enclosing operation.
    pub fn enclosing_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.lent
            .iter_mut()
            .rev()
            .find_map(|l| l.resource.downcast_mut::<T>())
    }

    pub fn has_enclosing<T: Any + Send>(&self) -> bool {
        self.lent.iter().any(|l| l.resource.is::<T>())
    }

    /// Like [`Self::enclosing_mut`], failing with a domain error naming the
    /// operation `user` needs around it.
    pub fn require_enclosing<T: Any + Send>(&mut self, user: &str, enclosing: &str) -> Result<&mut T> {
        self.enclosing_mut::<T>()
            .ok_or_else(|| HarvestError::domain(format!("cannot use {user} outside of {enclosing}")))
    }

    // -----------------------------------------------------------------------
    // Variable scopes
    // -----------------------------------------------------------------------

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
        self.stats.pushes += 1;
    }

    /// Pop the innermost scope. The run's outermost scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
            self.stats.pops += 1;
        }
    }

    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn scope_stats(&self) -> ScopeStats {
        self.stats
    }

    /// Bind `name` in the innermost scope.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Rebind the innermost existing binding of `name`, else define it
    /// in the innermost scope.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.scopes.iter_mut().rev().find_map(|s| s.get_mut(name)) {
            Some(slot) => *slot = value,
            None => self.define(name, value),
        }
    }

    /// Value bound to `name`, searching innermost to outermost.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }

    /// Whether `name` is bound in the innermost scope.
    pub fn is_defined_locally(&self, name: &str) -> bool {
        self.scopes.last().is_some_and(|s| s.contains_key(name))
    }

    /// Every visible binding, inner scopes shadowing outer ones.
    pub fn bindings(&self) -> Visible<'_> {
        let mut bindings = Visible::new();
        for scope in &self.scopes {
            for (name, value) in scope {
                bindings.insert(name.as_str(), value);
            }
        }
        bindings
    }

    /// Bindings of the outermost scope.
    pub fn root_variables(&self) -> Bindings {
        self.scopes
            .first()
            .map(|s| s.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Scripts + attributes
    // -----------------------------------------------------------------------

    /// Evaluate `body` in `language` (else the run default) over the visible bindings.
    pub fn evaluate_script(&self, body: &str, language: Option<&str>) -> Result<Value> {
        let source = ScriptSource::with_language(body, language);
        self.scripts.evaluate(&source, &self.bindings())
    }

    /// Replace every `${…}` in `text` with the text of its evaluated value.
    pub fn evaluate_template(&self, text: &str, language: Option<&str>) -> Result<String> {
        if !has_expressions(text) {
            return Ok(text.to_string());
        }
        let mut out = String::with_capacity(text.len());
        for segment in split_template(text)? {
            match segment {
                Segment::Literal(literal) => out.push_str(&literal),
                Segment::Expression(expr) => {
                    out.push_str(&self.evaluate_script(expr, language)?.to_text())
                }
            }
        }
        Ok(out)
    }

    /// Attribute value with expressions evaluated in the default language.
    pub fn evaluate_attribute(&self, node: &DefinitionNode, name: &str) -> Result<Option<String>> {
        node.attribute(name)
            .map(|raw| self.evaluate_template(raw, None))
            .transpose()
    }

    /// Evaluated attribute that must be present and non-blank.
    pub fn required_attribute(&self, node: &DefinitionNode, name: &str) -> Result<String> {
        let value = self.evaluate_attribute(node, name)?.ok_or_else(|| {
            HarvestError::definition_at(
                format!("element <{}> is missing required attribute '{name}'", node.name()),
                node.location().to_string(),
            )
        })?;
        if value.trim().is_empty() {
            return Err(HarvestError::domain(format!(
                "attribute '{name}' of <{}> must not be empty",
                node.name()
            )));
        }
        Ok(value)
    }

    /// Boolean attribute; absent or blank means `default`.
    pub fn bool_attribute(&self, node: &DefinitionNode, name: &str, default: bool) -> Result<bool> {
        Ok(match self.evaluate_attribute(node, name)? {
            Some(v) if !v.trim().is_empty() => is_truthy(&v),
            _ => default,
        })
    }

    /// Attribute parsed as `T`; absent or blank means `None`.
    pub fn parsed_attribute<T: FromStr>(&self, node: &DefinitionNode, name: &str) -> Result<Option<T>> {
        match self.evaluate_attribute(node, name)? {
            Some(v) if !v.trim().is_empty() => v.trim().parse().map(Some).map_err(|_| {
                HarvestError::domain(format!(
                    "attribute '{name}' of <{}> has invalid value '{}'",
                    node.name(),
                    v.trim()
                ))
            }),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_shared::ErrorKind;

    fn context() -> RunContext {
        RunContext::with_config(ScraperConfiguration::default()).unwrap()
    }

    #[test]
    fn lookup_walks_outward_and_inner_shadows() {
        let mut ctx = context();
        ctx.define("a", Value::from("outer"));
        ctx.push_scope();
        ctx.define("a", Value::from("inner"));
        ctx.define("b", Value::from("only-inner"));
        assert_eq!(ctx.lookup("a"), Some(&Value::from("inner")));
        assert_eq!(ctx.bindings()["a"], &Value::from("inner"));

        ctx.pop_scope();
        assert_eq!(ctx.lookup("a"), Some(&Value::from("outer")));
        assert!(ctx.lookup("b").is_none());
        assert!(ctx.scope_stats().is_balanced());
    }

    #[test]
    fn set_rebinds_existing_binding() {
        let mut ctx = context();
        ctx.define("count", Value::from("1"));
        ctx.push_scope();
        ctx.set("count", Value::from("2"));
        ctx.set("fresh", Value::from("x"));
        ctx.pop_scope();
        assert_eq!(ctx.lookup("count"), Some(&Value::from("2")));
        assert!(ctx.lookup("fresh").is_none());
    }

    #[test]
    fn outermost_scope_is_never_popped() {
        let mut ctx = context();
        ctx.pop_scope();
        assert_eq!(ctx.scope_depth(), 1);
        assert_eq!(ctx.scope_stats(), ScopeStats::default());
    }

    #[test]
    fn resources_are_found_outward_and_withdrawn() {
        let mut ctx = context();
        assert!(ctx.enclosing_mut::<Vec<u8>>().is_none());
        ctx.provide(vec![1u8]);
        ctx.enclosing_mut::<Vec<u8>>().unwrap().push(2);
        assert!(ctx.has_enclosing::<Vec<u8>>());
        assert!(!ctx.has_enclosing::<String>());
        assert_eq!(ctx.withdraw::<Vec<u8>>(), Some(vec![1, 2]));
        assert!(ctx.withdraw::<Vec<u8>>().is_none());

        let err = ctx.require_enclosing::<Vec<u8>>("zip-entry", "zip").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert_eq!(err.to_string(), "cannot use zip-entry outside of zip");
    }

    #[test]
    fn templates_evaluate_against_bindings() {
        let mut ctx = context();
        ctx.define("page", Value::from("3"));
        assert_eq!(
            ctx.evaluate_template("p-${ page.parse_int() + 1 }.html", None).unwrap(),
            "p-4.html"
        );
        assert_eq!(ctx.evaluate_template("plain", None).unwrap(), "plain");
    }

    #[test]
    fn unknown_language_is_a_configuration_error() {
        let ctx = context();
        let err = ctx.evaluate_template("${ 1 }", Some("lua")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
