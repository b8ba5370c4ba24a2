//! Analysis errors definition.

use crate::addr::Addr;
use adam_code::errors::CodeError;
use thiserror::Error;

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The address class does not fit the requested access.
    #[error("invalid address {addr}: {reason}")]
    InvalidAddress { addr: Addr, reason: &'static str },

    /// An allocation table key is already bound to another address.
    #[error("allocation conflict: {key} is bound to {bound}, cannot bind it to {requested}")]
    AllocationConflict {
        key: Addr,
        bound: Addr,
        requested: Addr,
    },

    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    #[error("malformed instruction: {0}")]
    MalformedInstruction(String),

    /// The iteration cap has been hit.
    #[error("no convergence after {0} iterations")]
    NonConvergence(usize),

    #[error("invalid argument: {0}")]
    ArgumentError(String),

    #[error("code error: {0}")]
    Code(#[from] CodeError),
}
