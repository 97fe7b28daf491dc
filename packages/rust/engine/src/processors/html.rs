//! `<css-select>`: extracts HTML fragments with CSS selectors.

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result, Value};
use scraper::{Html, Selector};

use crate::definition::{DefinitionNode, ElementInfo};
use crate::runtime::{Operation, RunContext};

/// What each selected element contributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    /// The element's outer HTML.
    Html,
    /// The element's inner HTML.
    Inner,
    /// The element's text content.
    Text,
}

/// Apply `selector` to one HTML document or fragment.
fn select(html: &str, selector: &Selector, output: Output) -> Vec<Value> {
    let document = Html::parse_document(html);
    document
        .select(selector)
        .map(|el| match output {
            Output::Html => el.html(),
            Output::Inner => el.inner_html(),
            Output::Text => el.text().collect::<String>(),
        })
        .filter(|s| !s.is_empty())
        .map(Value::Text)
        .collect()
}

pub struct CssSelectOp;

impl CssSelectOp {
    const INFO: ElementInfo = ElementInfo {
        name: "css-select",
        valid_attributes: &["output"],
        required_attributes: &["selector"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for CssSelectOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    fn attribute_value_suggestions(&self, attribute: &str) -> Option<Vec<String>> {
        match attribute {
            "output" => Some(vec!["html".into(), "inner".into(), "text".into()]),
            other => crate::definition::common_suggestions(other),
        }
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let raw_selector = ctx.required_attribute(node, "selector")?;
        let output = match ctx
            .evaluate_attribute(node, "output")?
            .map(|o| o.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("html") => Output::Html,
            Some("inner") => Output::Inner,
            Some("text") => Output::Text,
            Some(other) => {
                return Err(HarvestError::domain(format!("unsupported css-select output '{other}'")));
            }
        };

        let sources = ctx.execute_body_list(node).await?.into_items();

        let selector = Selector::parse(&raw_selector).map_err(|e| {
            HarvestError::domain(format!("invalid CSS selector '{raw_selector}': {e}"))
        })?;

        Ok(Value::List(
            sources
                .iter()
                .flat_map(|source| select(&source.to_text(), &selector, output))
                .collect(),
        ))
    }
}
