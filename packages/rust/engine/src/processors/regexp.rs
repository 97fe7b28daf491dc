//! `<regexp>`: regular-expression matching and replacement.

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result, Value};
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::definition::{DefinitionNode, ElementInfo, SlotSpec};
use crate::runtime::{Operation, RunContext};

const PATTERN: &str = "regexp-pattern";
const SOURCE: &str = "regexp-source";
const RESULT: &str = "regexp-result";

/// Typed view over a `<regexp>` node's sub-definitions.
#[derive(Debug, Clone, Copy)]
pub struct RegexpDef<'a> {
    node: &'a DefinitionNode,
}

impl<'a> RegexpDef<'a> {
    pub fn new(node: &'a DefinitionNode) -> Self {
        Self { node }
    }

    pub fn pattern_def(&self) -> Option<&'a DefinitionNode> {
        self.node.slot(PATTERN)
    }

    pub fn source_def(&self) -> Option<&'a DefinitionNode> {
        self.node.slot(SOURCE)
    }

    pub fn result_def(&self) -> Option<&'a DefinitionNode> {
        self.node.slot(RESULT)
    }

    /// Pattern, source, and (when present) result definitions, in that order.
    pub fn operation_defs(&self) -> Vec<&'a DefinitionNode> {
        [self.pattern_def(), self.source_def(), self.result_def()]
            .into_iter()
            .flatten()
            .collect()
    }

    fn required(&self, slot: &str) -> Result<&'a DefinitionNode> {
        self.node.slot(slot).ok_or_else(|| {
            HarvestError::definition_at(
                format!("element <regexp> is missing required <{slot}>"),
                self.node.location().to_string(),
            )
        })
    }
}

/// Matching flags read from the `flag-*` attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegexpFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_all: bool,
    pub unicode_case: bool,
    pub canon_eq: bool,
}

impl RegexpFlags {
    /// Compile `pattern`. Case folding is always Unicode-aware, and
    /// canonical-equivalence matching is not supported.
    pub fn compile(&self, pattern: &str) -> Result<Regex> {
        if self.canon_eq {
            debug!("flag-canoneq has no effect");
        }
        RegexBuilder::new(pattern)
            .case_insensitive(self.case_insensitive)
            .multi_line(self.multi_line)
            .dot_matches_new_line(self.dot_all)
            .build()
            .map_err(|e| {
                HarvestError::domain(format!("invalid regular expression '{pattern}': {e}"))
            })
    }
}

pub struct RegexpOp;

impl RegexpOp {
    const INFO: ElementInfo = ElementInfo {
        name: "regexp",
        valid_attributes: &[
            "max",
            "replace",
            "flag-caseinsensitive",
            "flag-multiline",
            "flag-dotall",
            "flag-unicodecase",
            "flag-canoneq",
        ],
        required_attributes: &[],
        slots: &[
            SlotSpec::required(PATTERN),
            SlotSpec::required(SOURCE),
            SlotSpec::optional(RESULT),
        ],
    };

    fn flags(ctx: &RunContext, node: &DefinitionNode) -> Result<RegexpFlags> {
        Ok(RegexpFlags {
            case_insensitive: ctx.bool_attribute(node, "flag-caseinsensitive", false)?,
            multi_line: ctx.bool_attribute(node, "flag-multiline", false)?,
            dot_all: ctx.bool_attribute(node, "flag-dotall", false)?,
            unicode_case: ctx.bool_attribute(node, "flag-unicodecase", false)?,
            canon_eq: ctx.bool_attribute(node, "flag-canoneq", false)?,
        })
    }
}

/// One match: byte span plus capture groups (`_0` is the whole match).
struct Found {
    start: usize,
    end: usize,
    groups: Vec<Value>,
}

fn find_all(regex: &Regex, text: &str, limit: usize) -> Vec<Found> {
    regex
        .captures_iter(text)
        .take(limit)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            Some(Found {
                start: whole.start(),
                end: whole.end(),
                groups: caps
                    .iter()
                    .map(|g| g.map_or(Value::Empty, |m| Value::from(m.as_str())))
                    .collect(),
            })
        })
        .collect()
}

/// Value of the result definition with the match groups bound, or the
/// whole match when there is no result definition.
async fn match_value(
    ctx: &mut RunContext,
    result_def: Option<&DefinitionNode>,
    found: Found,
) -> Result<Value> {
    let Some(result_def) = result_def else {
        return Ok(found.groups.into_iter().next().unwrap_or_default());
    };
    ctx.push_scope();
    for (i, group) in found.groups.into_iter().enumerate() {
        ctx.define(format!("_{i}"), group);
    }
    let value = ctx.execute(result_def).await;
    ctx.pop_scope();
    value
}

#[async_trait]
impl Operation for RegexpOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let def = RegexpDef::new(node);
        let flags = Self::flags(ctx, node)?;
        let max = ctx.parsed_attribute::<usize>(node, "max")?;
        let replace = ctx.bool_attribute(node, "replace", false)?;

        let pattern = ctx.execute(def.required(PATTERN)?).await?.to_text();
        let regex = flags.compile(pattern.trim())?;
        let sources = ctx.execute_list(def.required(SOURCE)?).await?.into_items();
        let result_def = def.result_def();

        let mut remaining = max.unwrap_or(usize::MAX);

        if replace {
            let single = sources.len() == 1;
            let mut replaced = Vec::with_capacity(sources.len());
            for source in sources {
                let text = source.to_text();
                let found = find_all(&regex, &text, remaining);
                remaining -= found.len();

                let mut out = String::with_capacity(text.len());
                let mut last = 0;
                for f in found {
                    ctx.check_cancelled()?;
                    out.push_str(&text[last..f.start]);
                    last = f.end;
                    let replacement = match result_def {
                        Some(_) => match_value(ctx, result_def, f).await?.to_text(),
                        None => String::new(),
                    };
                    out.push_str(&replacement);
                }
                out.push_str(&text[last..]);
                replaced.push(Value::Text(out));
            }
            return Ok(if single {
                replaced.pop().unwrap_or_default()
            } else {
                Value::List(replaced)
            });
        }

        let mut results = Vec::new();
        for source in sources {
            if remaining == 0 {
                break;
            }
            let text = source.to_text();
            let found = find_all(&regex, &text, remaining);
            remaining -= found.len();
            for f in found {
                ctx.check_cancelled()?;
                let value = match_value(ctx, result_def, f).await?;
                if !value.is_empty() {
                    results.push(value);
                }
            }
        }
        Ok(Value::List(results))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{resolve, run};
    use harvest_shared::ErrorKind;

    #[tokio::test]
    async fn digits_without_max() {
        let doc = r#"<regexp>
            <regexp-pattern>\d+</regexp-pattern>
            <regexp-source>a12b34</regexp-source>
        </regexp>"#;
        assert_eq!(
            run(doc).await.unwrap(),
            Value::from(vec![Value::from("12"), Value::from("34")])
        );
    }

    #[tokio::test]
    async fn max_counts_across_sources() {
        let doc = r#"<regexp max="3">
            <regexp-pattern>\w</regexp-pattern>
            <regexp-source><text>ab</text><text>cd</text></regexp-source>
        </regexp>"#;
        assert_eq!(
            run(doc).await.unwrap(),
            Value::from(vec![Value::from("a"), Value::from("b"), Value::from("c")])
        );
    }

    #[tokio::test]
    async fn result_sees_groups() {
        let doc = r#"<regexp>
            <regexp-pattern>(\w+)=(\d+)</regexp-pattern>
            <regexp-source>a=1;b=2</regexp-source>
            <regexp-result><text delimiter=":"><var name="_2"/><var name="_1"/></text></regexp-result>
        </regexp>"#;
        assert_eq!(
            run(doc).await.unwrap(),
            Value::from(vec![Value::from("1:a"), Value::from("2:b")])
        );
    }

    #[tokio::test]
    async fn replace_mode_rewrites_single_source() {
        let doc = r#"<regexp replace="yes" flag-caseinsensitive="yes">
            <regexp-pattern>CAT</regexp-pattern>
            <regexp-source>cat and Cat</regexp-source>
            <regexp-result>dog</regexp-result>
        </regexp>"#;
        assert_eq!(run(doc).await.unwrap(), Value::from("dog and dog"));
    }

    #[tokio::test]
    async fn bad_pattern_is_a_domain_error() {
        let doc = r#"<regexp>
            <regexp-pattern>(</regexp-pattern>
            <regexp-source>x</regexp-source>
        </regexp>"#;
        let err = run(doc).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Domain);
    }

    #[test]
    fn operation_defs_omit_absent_result() {
        let tree = resolve(
            r#"<regexp><regexp-pattern>a</regexp-pattern><regexp-source>a</regexp-source></regexp>"#,
        );
        let def = RegexpDef::new(tree.root());
        let names: Vec<&str> = def
            .operation_defs()
            .iter()
            .map(|n| n.name().local.as_str())
            .collect();
        assert_eq!(names, vec!["regexp-pattern", "regexp-source"]);
        assert!(def.result_def().is_none());
    }

    #[test]
    fn flags_map_onto_regex_builder() {
        let flags = RegexpFlags {
            dot_all: true,
            multi_line: true,
            ..Default::default()
        };
        let regex = flags.compile("^a.b$").unwrap();
        assert!(regex.is_match("x\na\nb"));
    }
}
