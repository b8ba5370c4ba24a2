//! This crate provides the program model consumed by the abstract
//! interpreter of the `ADAM` project: classes, methods, fields, decoded
//! instructions and block graphs, together with a loader for their JSON
//! description.

pub mod code;
pub mod errors;
pub mod instrs;
mod loader;
pub mod names;
pub mod program;
pub mod registers;
mod uids;

pub use code::{Block, Branch, Code};
pub use instrs::{FieldRef, Instr, InvokeKind, LabeledInstr, MethodRef};
pub use names::{Interner, Name};
pub use program::{AccessFlags, Class, Field, Method, Program};
pub use registers::{InstrId, Reg};
pub use uids::{ClassUid, FieldUid, MethodUid};
