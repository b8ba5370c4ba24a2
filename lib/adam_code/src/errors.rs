//! Program model errors definition.

use crate::registers::Reg;
use thiserror::Error;

pub type CodeResult<T> = Result<T, CodeError>;

#[derive(Debug, Error)]
pub enum CodeError {
    #[error("I/O error: {0}")]
    IO(#[from] std::io::Error),

    /// The program description could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A class was declared twice in the same program.
    #[error("class '{0}' is defined more than once")]
    DuplicateClass(String),

    #[error("class not found: {0}")]
    ClassNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// An edge refers to a block label that does not exist in its method.
    #[error("unknown block label '{label}' in method {method}")]
    BadBlockLabel { method: String, label: String },

    /// Two blocks of a method share the same label.
    #[error("block label '{label}' is defined more than once in method {method}")]
    DuplicateBlockLabel { method: String, label: String },

    /// An instruction uses a register outside of its method register file.
    #[error("register {reg} used in method {method} of {registers} registers")]
    BadRegister {
        method: String,
        reg: Reg,
        registers: u16,
    },

    /// A method declares more parameter registers than registers.
    #[error("method {method} declares {ins} parameter registers out of {registers}")]
    BadParameterCount {
        method: String,
        ins: u16,
        registers: u16,
    },

    /// A method has a code section without any block.
    #[error("method {0} has an empty code section")]
    MissingEntryBlock(String),

    #[error("unknown access flag '{0}'")]
    BadAccessFlag(String),

    #[error("the method has no implementation")]
    NoCode,
}
