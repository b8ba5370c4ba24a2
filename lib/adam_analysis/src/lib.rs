//! This crate provides the abstract interpreter of the `ADAM` project: an
//! abstract machine over Dalvik code (addresses, alias sets, stores, frames
//! and state differences) and a method analyzer computing memoized method
//! summaries.

pub mod addr;
pub mod alloctab;
pub mod builtins;
pub mod config;
pub mod context;
pub mod diff;
pub mod errors;
pub mod frame;
pub mod method;
pub mod prim;
mod semantics;
pub mod store;
pub mod summary;
pub mod tags;
pub mod value;

pub use crate::addr::Addr;
pub use crate::config::AnalyzerConfig;
pub use crate::diff::Diff;
pub use crate::frame::Frame;
pub use crate::method::{Analyzer, AnalyzerStats, MethodState};
pub use crate::value::{AliasSet, Object, Value};

use crate::errors::AnalysisResult;
use adam_code::{MethodUid, Program};

/// Computes the summary of `method` as an entry point, with a fresh analyzer.
pub fn summarize(
    program: &Program,
    method: MethodUid,
    config: AnalyzerConfig,
) -> AnalysisResult<Diff> {
    Analyzer::new(program, config).analyze_entry(method)
}
