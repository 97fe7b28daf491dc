//! The contract every executable element implements.

use async_trait::async_trait;
use harvest_shared::{Result, Value};

use super::RunContext;
use crate::definition::{DefinitionNode, ElementInfo, SlotSpec};

/// An executable element.
///
/// One instance serves every node bound to its element name, across runs;
/// per-run state belongs in the [`RunContext`].
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Element contract checked at resolution and before each run.
    fn info(&self) -> &ElementInfo;

    /// Candidate values for `attribute`, for editors and tooling.
    fn attribute_value_suggestions(&self, attribute: &str) -> Option<Vec<String>> {
        crate::definition::common_suggestions(attribute)
    }

    /// Execute `node` (bound to this operation) and produce its value.
    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value>;
}

/// Operation behind every slot node: executes the slot's body.
pub(crate) struct SlotBody {
    info: ElementInfo,
}

impl SlotBody {
    pub(crate) fn new(slot: &SlotSpec) -> Self {
        Self {
            info: slot.element_info(),
        }
    }
}

#[async_trait]
impl Operation for SlotBody {
    fn info(&self) -> &ElementInfo {
        &self.info
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        ctx.execute_body(node).await
    }
}
