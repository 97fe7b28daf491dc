//! Rhai-backed evaluator.

use harvest_shared::{HarvestError, Result, Value};
use rhai::{Array, Blob, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Scope};

use crate::{Evaluator, EvaluatorProvider, InterruptCheck, Visible};

/// Upper bound on Rhai operations per evaluation; stops runaway scripts.
const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;

/// Map holding the bindings whose names Rhai cannot use as variables.
const VARS_MAP: &str = "vars";

/// Builds [`rhai::Engine`] evaluators for the `rhai` language tag.
#[derive(Debug, Clone)]
pub struct RhaiProvider {
    max_operations: u64,
}

impl RhaiProvider {
    /// `max_operations` of `0` means unlimited.
    pub fn new(max_operations: u64) -> Self {
        Self { max_operations }
    }
}

impl Default for RhaiProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OPERATIONS)
    }
}

impl EvaluatorProvider for RhaiProvider {
    fn language(&self) -> &str {
        "rhai"
    }

    fn create(&self, interrupt: InterruptCheck) -> Result<Box<dyn Evaluator>> {
        let mut engine = Engine::new();
        engine.set_max_operations(self.max_operations);
        engine.on_progress(move |_| interrupt().then_some(Dynamic::UNIT));
        Ok(Box::new(RhaiEvaluator {
            engine,
            declared: Vec::new(),
        }))
    }
}

/// Each evaluation gets a fresh scope built from the visible bindings.
/// Variables a script declares with `let` are kept and offered to later
/// evaluations in the same run, below the bindings.
struct RhaiEvaluator {
    engine: Engine,
    declared: Vec<(String, Dynamic)>,
}

impl RhaiEvaluator {
    fn scope_for(&self, bindings: &Visible<'_>) -> Scope<'static> {
        let mut scope = Scope::new();
        for (name, value) in &self.declared {
            scope.push_dynamic(name.as_str(), value.clone());
        }

        let mut others = Map::new();
        for (name, value) in bindings {
            // Names such as `http.status` or `_1` are only reachable through `vars`.
            if is_identifier(name) {
                scope.push_dynamic(*name, to_dynamic(value));
            } else {
                others.insert((*name).into(), to_dynamic(value));
            }
        }
        scope.push_dynamic(VARS_MAP, Dynamic::from_map(others));
        scope
    }

    /// Copy back declared variables (`0..declared`) and adopt the ones the
    /// script added after the bindings (`base..`).
    fn keep_declarations(&mut self, scope: &Scope<'_>, declared: usize, base: usize) {
        for (slot, (_, _, value)) in self.declared.iter_mut().zip(scope.iter().take(declared)) {
            slot.1 = value;
        }
        for (name, _, value) in scope.iter().skip(base) {
            match self.declared.iter_mut().find(|(n, _)| n.as_str() == name) {
                Some(slot) => slot.1 = value,
                None => self.declared.push((name.to_string(), value)),
            }
        }
    }
}

impl Evaluator for RhaiEvaluator {
    fn eval(&mut self, script: &str, bindings: &Visible<'_>) -> Result<Value> {
        let declared = self.declared.len();
        let mut scope = self.scope_for(bindings);
        let base = scope.len();

        let result = self
            .engine
            .eval_with_scope::<Dynamic>(&mut scope, script)
            .map_err(into_error)?;

        self.keep_declarations(&scope, declared, base);
        Ok(from_dynamic(result))
    }
}

fn into_error(err: Box<EvalAltResult>) -> HarvestError {
    match *err {
        EvalAltResult::ErrorTerminated(..) => HarvestError::Interrupted,
        other => HarvestError::script("rhai", other.to_string()),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.chars().any(|c| c.is_ascii_alphabetic())
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Empty => Dynamic::UNIT,
        Value::Text(s) => Dynamic::from(s.clone()),
        Value::Binary(b) => Dynamic::from_blob(b.clone()),
        Value::List(items) => Dynamic::from_array(items.iter().map(to_dynamic).collect()),
    }
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        Value::Empty
    } else if value.is_array() {
        Value::List(value.cast::<Array>().into_iter().map(from_dynamic).collect())
    } else if value.is_blob() {
        Value::Binary(value.cast::<Blob>())
    } else if value.is_string() {
        Value::Text(value.cast::<ImmutableString>().to_string())
    } else {
        Value::Text(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bindings;
    use harvest_shared::ErrorKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn evaluator() -> Box<dyn Evaluator> {
        RhaiProvider::default().create(Arc::new(|| false)).unwrap()
    }

    fn bindings(pairs: &[(&str, Value)]) -> Bindings {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn eval(script: &str, pairs: &[(&str, Value)]) -> Result<Value> {
        evaluator().eval(script, &crate::visible(&bindings(pairs)))
    }

    #[test]
    fn evaluates_arithmetic_as_text() {
        assert_eq!(eval("40 + 2", &[]).unwrap(), Value::from("42"));
    }

    #[test]
    fn bindings_are_visible() {
        let v = eval(r#"name + "!""#, &[("name", Value::from("harvest"))]).unwrap();
        assert_eq!(v, Value::from("harvest!"));
    }

    #[test]
    fn lists_round_trip_through_arrays() {
        let v = eval(
            "items.len()",
            &[("items", Value::from(vec![Value::from("a"), Value::from("b")]))],
        )
        .unwrap();
        assert_eq!(v, Value::from("2"));

        let v = eval(r#"["x", ()]"#, &[]).unwrap();
        assert_eq!(v, Value::from(vec![Value::from("x"), Value::Empty]));
    }

    #[test]
    fn other_names_are_reachable_through_vars() {
        let v = eval(r#"vars["_1"] + vars["http.status"]"#, &[
            ("_1", Value::from("a")),
            ("http.status", Value::from("200")),
        ])
        .unwrap();
        assert_eq!(v, Value::from("a200"));
    }

    #[test]
    fn bindings_do_not_outlive_their_evaluation() {
        let mut evaluator = evaluator();
        let first = bindings(&[("it", Value::from("a")), ("_1", Value::from("g"))]);
        assert_eq!(
            evaluator.eval("it", &crate::visible(&first)).unwrap(),
            Value::from("a")
        );

        let err = evaluator.eval("it", &Visible::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Script);
        let v = evaluator.eval("vars.len()", &Visible::new()).unwrap();
        assert_eq!(v, Value::from("0"));
    }

    #[test]
    fn script_variables_persist_between_evaluations() {
        let mut evaluator = evaluator();
        evaluator.eval("let total = 40;", &Visible::new()).unwrap();
        evaluator.eval("total += 1;", &Visible::new()).unwrap();
        let v = evaluator.eval("total + 1", &Visible::new()).unwrap();
        assert_eq!(v, Value::from("42"));
    }

    #[test]
    fn bindings_shadow_script_variables() {
        let mut evaluator = evaluator();
        evaluator.eval("let page = 1;", &Visible::new()).unwrap();
        let live = bindings(&[("page", Value::from("7"))]);
        assert_eq!(
            evaluator.eval("page", &crate::visible(&live)).unwrap(),
            Value::from("7")
        );
        assert_eq!(
            evaluator.eval("page", &Visible::new()).unwrap(),
            Value::from("1")
        );
    }

    #[test]
    fn syntax_errors_become_script_errors() {
        let err = eval("let = ;", &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Script);
    }

    #[test]
    fn runaway_scripts_are_stopped() {
        let mut evaluator = RhaiProvider::new(1_000).create(Arc::new(|| false)).unwrap();
        let err = evaluator.eval("loop {}", &Visible::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Script);
    }

    #[test]
    fn interrupt_stops_a_running_script() {
        let flag = Arc::new(AtomicBool::new(false));
        let check = {
            let flag = flag.clone();
            Arc::new(move || flag.load(Ordering::SeqCst))
        };
        let mut evaluator = RhaiProvider::new(0).create(check).unwrap();
        assert_eq!(
            evaluator.eval("1 + 1", &Visible::new()).unwrap(),
            Value::from("2")
        );

        flag.store(true, Ordering::SeqCst);
        let err = evaluator.eval("loop {}", &Visible::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
    }
}
