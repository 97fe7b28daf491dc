//! Operations shipped as plugins, loadable by type identifier.

mod archive;

use std::sync::Arc;

use crate::runtime::Operation;

pub use archive::{ZipEntryOp, ZipOp, ZipSink};

/// Type identifier of the `zip` plugin.
pub const ZIP_PLUGIN: &str = "harvest.plugins.ZipPlugin";

/// Type identifier of the `zip-entry` plugin.
pub const ZIP_ENTRY_PLUGIN: &str = "harvest.plugins.ZipEntryPlugin";

pub fn zip_operation() -> Arc<dyn Operation> {
    Arc::new(ZipOp)
}

pub fn zip_entry_operation() -> Arc<dyn Operation> {
    Arc::new(ZipEntryOp)
}
