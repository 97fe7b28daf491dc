//! Control flow: `loop`, `while`, `case`, `sleep`.

use std::time::Duration;

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result, Value, is_truthy};
use tracing::debug;

use crate::definition::{DefinitionNode, ElementInfo, SlotSpec};
use crate::runtime::{Operation, RunContext};

/// Collect a per-iteration value, flattening lists one level.
fn collect(results: &mut Vec<Value>, value: Value) {
    match value {
        Value::List(items) => results.extend(items.into_iter().filter(|v| !v.is_empty())),
        v if v.is_empty() => {}
        v => results.push(v),
    }
}

// ---------------------------------------------------------------------------
// loop
// ---------------------------------------------------------------------------

/// `<loop>`: runs `body` once per item of `list`, each in a fresh scope.
pub struct LoopOp;

impl LoopOp {
    const INFO: ElementInfo = ElementInfo {
        name: "loop",
        valid_attributes: &["item", "index", "maxloops", "empty"],
        required_attributes: &[],
        slots: &[SlotSpec::required("list"), SlotSpec::required("body")],
    };
}

#[async_trait]
impl Operation for LoopOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let (Some(list_def), Some(body_def)) = (node.slot("list"), node.slot("body")) else {
            return Err(HarvestError::definition_at(
                "element <loop> needs <list> and <body>",
                node.location().to_string(),
            ));
        };

        let item_name = ctx.evaluate_attribute(node, "item")?;
        let index_name = ctx.evaluate_attribute(node, "index")?;
        let max_loops = ctx.parsed_attribute::<usize>(node, "maxloops")?;
        let discard = ctx.bool_attribute(node, "empty", false)?;

        let items = ctx.execute_list(list_def).await?.into_items();
        let limit = max_loops.unwrap_or(items.len());
        debug!(items = items.len(), limit, "looping");

        let mut results = Vec::new();
        for (i, item) in items.into_iter().take(limit).enumerate() {
            ctx.check_cancelled()?;
            ctx.push_scope();
            if let Some(name) = item_name.as_deref().filter(|n| !n.trim().is_empty()) {
                ctx.define(name.trim(), item);
            }
            if let Some(name) = index_name.as_deref().filter(|n| !n.trim().is_empty()) {
                ctx.define(name.trim(), Value::Text((i + 1).to_string()));
            }
            let value = ctx.execute(body_def).await;
            ctx.pop_scope();
            if !discard {
                collect(&mut results, value?);
            } else {
                value?;
            }
        }

        Ok(if discard {
            Value::Empty
        } else {
            Value::List(results)
        })
    }
}

// ---------------------------------------------------------------------------
// while
// ---------------------------------------------------------------------------

/// `<while>`: repeats its body while `condition` evaluates true.
pub struct WhileOp;

impl WhileOp {
    const INFO: ElementInfo = ElementInfo {
        name: "while",
        valid_attributes: &["index", "maxloops", "empty"],
        required_attributes: &["condition"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for WhileOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let index_name = ctx.evaluate_attribute(node, "index")?;
        let max_loops = ctx.parsed_attribute::<usize>(node, "maxloops")?;
        let discard = ctx.bool_attribute(node, "empty", false)?;

        let mut results = Vec::new();
        let mut iteration = 0usize;
        while max_loops.is_none_or(|max| iteration < max) {
            ctx.check_cancelled()?;
            iteration += 1;

            ctx.push_scope();
            if let Some(name) = index_name.as_deref().filter(|n| !n.trim().is_empty()) {
                ctx.define(name.trim(), Value::Text(iteration.to_string()));
            }
            let proceed = match ctx.evaluate_attribute(node, "condition") {
                Ok(condition) => condition.is_some_and(|c| is_truthy(&c)),
                Err(e) => {
                    ctx.pop_scope();
                    return Err(e);
                }
            };
            if !proceed {
                ctx.pop_scope();
                break;
            }
            let value = ctx.execute_body(node).await;
            ctx.pop_scope();
            let value = value?;
            if !discard {
                collect(&mut results, value);
            }
        }

        Ok(if discard {
            Value::Empty
        } else {
            Value::List(results)
        })
    }
}

// ---------------------------------------------------------------------------
// case
// ---------------------------------------------------------------------------

/// `<case>`: body of the first `<if>` whose condition holds, else `<else>`.
pub struct CaseOp;

impl CaseOp {
    const INFO: ElementInfo = ElementInfo {
        name: "case",
        valid_attributes: &[],
        required_attributes: &[],
        slots: &[
            SlotSpec {
                name: "if",
                required: true,
                repeatable: true,
                valid_attributes: &[],
                required_attributes: &["condition"],
            },
            SlotSpec::optional("else"),
        ],
    };
}

#[async_trait]
impl Operation for CaseOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        for branch in node.slots("if") {
            let condition = ctx.evaluate_attribute(branch, "condition")?;
            if condition.is_some_and(|c| is_truthy(&c)) {
                return ctx.execute(branch).await;
            }
        }
        match node.slot("else") {
            Some(otherwise) => ctx.execute(otherwise).await,
            None => Ok(Value::Empty),
        }
    }
}

// ---------------------------------------------------------------------------
// sleep
// ---------------------------------------------------------------------------

/// `<sleep>`: pauses for `time` milliseconds; cancellation cuts it short.
pub struct SleepOp;

impl SleepOp {
    const INFO: ElementInfo = ElementInfo {
        name: "sleep",
        valid_attributes: &[],
        required_attributes: &["time"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for SleepOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let millis = ctx
            .parsed_attribute::<u64>(node, "time")?
            .ok_or_else(|| HarvestError::domain("attribute 'time' of <sleep> must not be empty"))?;
        let cancel = ctx.cancel_token();

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => Ok(Value::Empty),
            _ = cancel.cancelled() => Err(HarvestError::Interrupted),
        }
    }
}
