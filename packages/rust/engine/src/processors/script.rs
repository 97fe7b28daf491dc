//! `<script>` and `<template>`: operations delegating to the scripting layer.

use async_trait::async_trait;
use harvest_shared::{Result, Value};

use crate::definition::{DefinitionNode, ElementInfo};
use crate::runtime::{Operation, RunContext};

/// Languages offered to tooling for `language` attributes.
const LANGUAGES: &[&str] = &["rhai"];

fn suggestions(attribute: &str) -> Option<Vec<String>> {
    match attribute {
        "language" => Some(LANGUAGES.iter().map(|l| l.to_string()).collect()),
        other => crate::definition::common_suggestions(other),
    }
}

/// `<script>`: evaluates its body as a script; `return` names an expression
/// evaluated afterwards to produce the result.
pub struct ScriptOp;

impl ScriptOp {
    const INFO: ElementInfo = ElementInfo {
        name: "script",
        valid_attributes: &["language", "return"],
        required_attributes: &[],
        slots: &[],
    };
}

#[async_trait]
impl Operation for ScriptOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    fn attribute_value_suggestions(&self, attribute: &str) -> Option<Vec<String>> {
        suggestions(attribute)
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let language = ctx.evaluate_attribute(node, "language")?;
        let body = ctx.execute_body(node).await?.to_text();

        let value = ctx.evaluate_script(&body, language.as_deref())?;
        match node.attribute("return").filter(|r| !r.trim().is_empty()) {
            Some(expression) => ctx.evaluate_script(expression, language.as_deref()),
            None => Ok(value),
        }
    }
}

/// `<template>`: body text with every `${…}` replaced by its value.
pub struct TemplateOp;

impl TemplateOp {
    const INFO: ElementInfo = ElementInfo {
        name: "template",
        valid_attributes: &["language"],
        required_attributes: &[],
        slots: &[],
    };
}

#[async_trait]
impl Operation for TemplateOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    fn attribute_value_suggestions(&self, attribute: &str) -> Option<Vec<String>> {
        suggestions(attribute)
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let language = ctx.evaluate_attribute(node, "language")?;
        let body = ctx.execute_body_list(node).await?.to_text();
        Ok(Value::Text(ctx.evaluate_template(&body, language.as_deref())?))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::run;
    use harvest_shared::{ErrorKind, Value};

    #[tokio::test]
    async fn script_return_sees_script_variables() {
        let doc = r#"<script return="total * 2">let total = 10 + 11;</script>"#;
        assert_eq!(run(doc).await.unwrap(), Value::from("42"));
    }

    #[tokio::test]
    async fn script_reads_context_variables() {
        let doc = r#"<config>
            <var-def name="who">world</var-def>
            <script>"hello " + who</script>
        </config>"#;
        assert_eq!(run(doc).await.unwrap(), Value::from("hello world"));
    }

    #[tokio::test]
    async fn template_mixes_text_and_elements() {
        let doc = r#"<config>
            <var-def name="n">2</var-def>
            <template>n=<var name="n"/>, next=${ n.parse_int() + 1 }</template>
        </config>"#;
        assert_eq!(run(doc).await.unwrap(), Value::from("n=2, next=3"));
    }

    #[tokio::test]
    async fn unknown_language_is_reported() {
        let err = run(r#"<script language="lua">print(1)</script>"#)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("no script engine found for name: 'lua'"));
    }
}
