//! Built-in operations of the default namespace.

mod basic;
mod file;
mod flow;
mod html;
mod http;
mod regexp;
mod script;

use std::sync::Arc;

use crate::runtime::Operation;

pub use basic::{ConfigOp, EmptyOp, ListOp, TextOp, VarDefOp, VarOp};
pub use file::FileOp;
pub use flow::{CaseOp, LoopOp, SleepOp, WhileOp};
pub use html::CssSelectOp;
pub use http::{HttpHeaderOp, HttpOp, HttpParamOp, HttpRequest};
pub use regexp::{RegexpDef, RegexpFlags, RegexpOp};
pub use script::{ScriptOp, TemplateOp};

/// One instance of every built-in operation.
pub fn builtins() -> Vec<Arc<dyn Operation>> {
    vec![
        Arc::new(ConfigOp),
        Arc::new(EmptyOp),
        Arc::new(TextOp),
        Arc::new(ListOp),
        Arc::new(VarDefOp),
        Arc::new(VarOp),
        Arc::new(RegexpOp),
        Arc::new(TemplateOp),
        Arc::new(ScriptOp),
        Arc::new(LoopOp),
        Arc::new(WhileOp),
        Arc::new(CaseOp),
        Arc::new(SleepOp),
        Arc::new(HttpOp),
        Arc::new(HttpHeaderOp),
        Arc::new(HttpParamOp),
        Arc::new(FileOp),
        Arc::new(CssSelectOp),
    ]
}
