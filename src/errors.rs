//! Global error handling.
//!
//! Each sub-crate of the project defines its own type error.
//! Their types can be unified, for example in a main function,
//! when winding results at the top-level.
//!
//! ```rust
//! use adam::prelude::*;
//!
//! fn main() -> AdamResult<()> { // can return an AdamError
//!    let _program = Program::from_json(r#"{ "classes": [] }"#)?; // can return a CodeError
//!    Ok(())
//! }
//! ```

use adam_analysis::errors::AnalysisError;
use adam_code::errors::CodeError;
use std::io;
use thiserror::Error;

/// An alias for result that can be an [`AdamError`].
pub type AdamResult<T> = Result<T, AdamError>;

/// The main error type for error winding at the top-level.
/// It mainly consists of transparent wrapper over error types that
/// are defined in dependencies.
#[derive(Debug, Error)]
pub enum AdamError {
    /// Custom error for reporting bad command line arguments usage.
    #[error("bad arguments: {0}")]
    BadArguments(String),

    /// Error that can be returned from [I/O operations](std::io).
    #[error(transparent)]
    IO(#[from] io::Error),

    /// Error that can be returned from regex compilation.
    #[error(transparent)]
    Regex(#[from] regex::Error),

    /// Error that can be returned when printing JSON reports.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error that can be returned from [`adam_code`] functions.
    #[error(transparent)]
    Code(#[from] CodeError),

    /// Error that can be returned from [`adam_analysis`] functions.
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}
