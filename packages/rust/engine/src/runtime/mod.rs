//! Execution engine: the operation contract, the per-run context, and the
//! scraper that drives a run.

mod cancel;
mod context;
mod expression;
mod operation;
mod scraper;

pub use cancel::CancelToken;
pub use context::{BoxFuture, Frame, RunContext, ScopeStats};
pub use expression::{Segment, split_template};
pub use operation::Operation;
pub(crate) use operation::SlotBody;
pub use scraper::{RunOutcome, Scraper};
