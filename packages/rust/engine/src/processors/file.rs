//! `<file>`: reads or writes files under the working directory.

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::definition::{DefinitionNode, ElementInfo};
use crate::runtime::{Operation, RunContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Read,
    Write,
    Append,
}

pub struct FileOp;

impl FileOp {
    const INFO: ElementInfo = ElementInfo {
        name: "file",
        valid_attributes: &["action", "type", "charset"],
        required_attributes: &["path"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for FileOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    fn attribute_value_suggestions(&self, attribute: &str) -> Option<Vec<String>> {
        let values: &[&str] = match attribute {
            "action" => &["read", "write", "append"],
            "type" => &["text", "binary"],
            other => return crate::definition::common_suggestions(other),
        };
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let raw_path = ctx.required_attribute(node, "path")?;
        let path = ctx.config().resolve_path(raw_path.trim());
        let action = match ctx
            .evaluate_attribute(node, "action")?
            .map(|a| a.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("read") => Action::Read,
            Some("write") => Action::Write,
            Some("append") => Action::Append,
            Some(other) => {
                return Err(HarvestError::domain(format!("unsupported file action '{other}'")));
            }
        };
        let binary = ctx
            .evaluate_attribute(node, "type")?
            .is_some_and(|t| t.trim().eq_ignore_ascii_case("binary"));
        let charset = ctx
            .evaluate_attribute(node, "charset")?
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| ctx.config().charset.clone());
        let display_path = path.display().to_string();

        debug!(path = %display_path, ?action, "file operation");

        if action == Action::Read {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| HarvestError::io(&display_path, e))?;
            return Ok(if binary {
                Value::Binary(bytes)
            } else {
                Value::decode(&bytes, &charset)
            });
        }

        let value = ctx.execute_body(node).await?;
        let bytes = value.to_binary(&charset);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HarvestError::io(parent.display().to_string(), e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(action == Action::Append)
            .truncate(action == Action::Write)
            .open(&path)
            .await
            .map_err(|e| HarvestError::io(&display_path, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| HarvestError::io(&display_path, e))?;
        file.flush().await.map_err(|e| HarvestError::io(&display_path, e))?;

        Ok(value)
    }
}
