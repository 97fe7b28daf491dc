//! Structural and variable operations.

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result, Value};
use tracing::debug;

use crate::definition::{DefinitionNode, ElementInfo};
use crate::runtime::{Operation, RunContext};

/// `<config>`: document root. Runs its body, yields the last value.
pub struct ConfigOp;

impl ConfigOp {
    const INFO: ElementInfo = ElementInfo {
        name: "config",
        valid_attributes: &["charset", "scriptlang"],
        required_attributes: &[],
        slots: &[],
    };
}

#[async_trait]
impl Operation for ConfigOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    fn attribute_value_suggestions(&self, attribute: &str) -> Option<Vec<String>> {
        match attribute {
            "scriptlang" => Some(vec!["rhai".into()]),
            other => crate::definition::common_suggestions(other),
        }
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        ctx.execute_body(node).await
    }
}

/// `<empty>`: runs its body for side effects only.
pub struct EmptyOp;

impl EmptyOp {
    const INFO: ElementInfo = ElementInfo::named("empty");
}

#[async_trait]
impl Operation for EmptyOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        ctx.execute_body(node).await?;
        Ok(Value::Empty)
    }
}

/// `<text>`: body values rendered as one text, joined by `delimiter`.
pub struct TextOp;

impl TextOp {
    const INFO: ElementInfo = ElementInfo {
        name: "text",
        valid_attributes: &["delimiter"],
        required_attributes: &[],
        slots: &[],
    };
}

#[async_trait]
impl Operation for TextOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let delimiter = ctx.evaluate_attribute(node, "delimiter")?.unwrap_or_default();
        let body = ctx.execute_body_list(node).await?;
        Ok(Value::Text(body.to_text_joined(&delimiter)))
    }
}

/// `<list>`: collects body values into a list.
pub struct ListOp;

impl ListOp {
    const INFO: ElementInfo = ElementInfo::named("list");
}

#[async_trait]
impl Operation for ListOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        ctx.execute_body_list(node).await
    }
}

/// `<var-def>`: binds the body value in the innermost scope.
pub struct VarDefOp;

impl VarDefOp {
    const INFO: ElementInfo = ElementInfo {
        name: "var-def",
        valid_attributes: &["overwrite"],
        required_attributes: &["name"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for VarDefOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let name = ctx.required_attribute(node, "name")?;
        let overwrite = ctx.bool_attribute(node, "overwrite", true)?;

        if !overwrite && ctx.lookup(&name).is_some() {
            debug!(%name, "keeping existing binding");
            return Ok(Value::Empty);
        }

        let value = ctx.execute_body(node).await?;
        ctx.define(name, value);
        Ok(Value::Empty)
    }
}

/// `<var>`: value bound to `name`.
pub struct VarOp;

impl VarOp {
    const INFO: ElementInfo = ElementInfo {
        name: "var",
        valid_attributes: &[],
        required_attributes: &["name"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for VarOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let name = ctx.required_attribute(node, "name")?;
        ctx.lookup(&name)
            .cloned()
            .ok_or_else(|| HarvestError::domain(format!("variable '{name}' is not defined")))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::run;
    use harvest_shared::{ErrorKind, Value};

    #[tokio::test]
    async fn config_yields_last_non_empty_value() {
        let value = run("<config><text>a</text><empty><text>b</text></empty></config>")
            .await
            .unwrap();
        assert_eq!(value, Value::from("a"));
    }

    #[tokio::test]
    async fn text_joins_body_values() {
        let doc = r#"<config>
            <var-def name="x"><list><text>1</text><text>2</text></list></var-def>
            <text delimiter=", "><var name="x"/><text>3</text></text>
        </config>"#;
        assert_eq!(run(doc).await.unwrap(), Value::from("1, 2, 3"));
    }

    #[tokio::test]
    async fn var_def_respects_overwrite() {
        let doc = r#"<config>
            <var-def name="a">first</var-def>
            <var-def name="a" overwrite="no">second</var-def>
            <var name="a"/>
        </config>"#;
        assert_eq!(run(doc).await.unwrap(), Value::from("first"));
    }

    #[tokio::test]
    async fn attribute_expressions_see_variables() {
        let doc = r#"<config>
            <var-def name="n">7</var-def>
            <var-def name="label-${n}">seven</var-def>
            <var name="label-7"/>
        </config>"#;
        assert_eq!(run(doc).await.unwrap(), Value::from("seven"));
    }

    #[tokio::test]
    async fn unbound_variable_is_a_domain_error() {
        let err = run(r#"<config><var name="missing"/></config>"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
        assert!(err.to_string().contains("<var> at line 1"));
    }
}
