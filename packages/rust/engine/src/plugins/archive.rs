//! `<zip>` and `<zip-entry>`: build an archive from nested values.

use std::io::{Cursor, Write};

use async_trait::async_trait;
use harvest_shared::{HarvestError, Result, Value};
use tracing::debug;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::definition::{DefinitionNode, ElementInfo};
use crate::runtime::{Operation, RunContext};

/// Open archive writer lent by `<zip>` to its nested entries.
pub struct ZipSink {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    entries: usize,
}

impl ZipSink {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            entries: 0,
        }
    }

    /// Append one deflated entry.
    pub fn add(&mut self, name: &str, content: &[u8]) -> Result<()> {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        self.writer
            .start_file(name, options)
            .map_err(|e| HarvestError::domain(format!("cannot start zip entry '{name}': {e}")))?;
        self.writer
            .write_all(content)
            .map_err(|e| HarvestError::io(name, e))?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Close the archive and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.writer
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| HarvestError::domain(format!("cannot finish zip archive: {e}")))
    }
}

impl Default for ZipSink {
    fn default() -> Self {
        Self::new()
    }
}

/// `<zip>`: yields the archive bytes; `output` also writes them to a file.
pub struct ZipOp;

impl ZipOp {
    const INFO: ElementInfo = ElementInfo {
        name: "zip",
        valid_attributes: &["output"],
        required_attributes: &[],
        slots: &[],
    };
}

#[async_trait]
impl Operation for ZipOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        let output = ctx
            .evaluate_attribute(node, "output")?
            .filter(|o| !o.trim().is_empty());

        ctx.provide(ZipSink::new());
        ctx.execute_body(node).await?;
        let sink = ctx
            .withdraw::<ZipSink>()
            .ok_or_else(|| HarvestError::domain("zip archive writer is no longer available"))?;

        let entries = sink.entries();
        let bytes = sink.finish()?;
        debug!(entries, size = bytes.len(), "zip archive finished");

        if let Some(output) = output {
            let path = ctx.config().resolve_path(output.trim());
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| HarvestError::io(parent.display().to_string(), e))?;
            }
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| HarvestError::io(path.display().to_string(), e))?;
        }

        Ok(Value::Binary(bytes))
    }
}

/// `<zip-entry>`: writes its body value as one entry of the enclosing archive.
pub struct ZipEntryOp;

impl ZipEntryOp {
    const INFO: ElementInfo = ElementInfo {
        name: "zip-entry",
        valid_attributes: &["charset"],
        required_attributes: &["name"],
        slots: &[],
    };
}

#[async_trait]
impl Operation for ZipEntryOp {
    fn info(&self) -> &ElementInfo {
        &Self::INFO
    }

    async fn run(&self, node: &DefinitionNode, ctx: &mut RunContext) -> Result<Value> {
        if !ctx.has_enclosing::<ZipSink>() {
            return Err(HarvestError::domain("cannot use zip-entry outside of zip"));
        }
        let name = ctx.required_attribute(node, "name")?;
        let charset = ctx
            .evaluate_attribute(node, "charset")?
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| ctx.config().charset.clone());

        let content = ctx.execute_body(node).await?.to_binary(&charset);
        ctx.require_enclosing::<ZipSink>("zip-entry", "zip")?
            .add(&name, &content)?;
        Ok(Value::Empty)
    }
}
