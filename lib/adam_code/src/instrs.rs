//! Decoded instructions.
//!
//! Instructions are already decoded: register operands are [`Reg`] values and
//! symbolic operands (classes, fields, methods) are [`Name`]s. Control flow
//! is not carried by the instructions themselves but by the edges of the
//! block graph (see [`crate::code`]).

use crate::names::Name;
use crate::registers::{InstrId, Reg};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub class: Name,
    pub name: Name,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}->{}", self.class, self.name)
    }
}

/// Symbolic reference to a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: Name,
    pub name: Name,
    pub proto: Name,
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}->{}{}", self.class, self.name, self.proto)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvokeKind {
    Virtual,
    Super,
    Direct,
    Static,
    Interface,
}

impl fmt::Display for InvokeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Virtual => write!(f, "virtual"),
            Self::Super => write!(f, "super"),
            Self::Direct => write!(f, "direct"),
            Self::Static => write!(f, "static"),
            Self::Interface => write!(f, "interface"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnOp {
    Neg,
    Not,
    Convert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Ushr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Comp {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// Right-hand side of binary operations and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operand {
    Reg(Reg),
    Lit(i64),
    Zero,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Reg(r) => write!(f, "{r}"),
            Self::Lit(v) => write!(f, "#{v}"),
            Self::Zero => write!(f, "#0"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum Instr {
    Nop,
    Move {
        dst: Reg,
        src: Reg,
    },
    MoveResult {
        dst: Reg,
    },
    MoveException {
        dst: Reg,
    },
    Return {
        #[serde(default)]
        reg: Option<Reg>,
    },
    /// Numeric constant; `0` doubles as the null reference.
    Const {
        dst: Reg,
        value: i64,
    },
    ConstString {
        dst: Reg,
        value: String,
    },
    NewInstance {
        dst: Reg,
        class: Name,
    },
    NewArray {
        dst: Reg,
        size: Reg,
        class: Name,
    },
    CheckCast {
        reg: Reg,
        class: Name,
    },
    InstanceOf {
        dst: Reg,
        src: Reg,
        class: Name,
    },
    ArrayLength {
        dst: Reg,
        array: Reg,
    },
    #[serde(rename = "iget")]
    IGet {
        dst: Reg,
        obj: Reg,
        field: FieldRef,
    },
    #[serde(rename = "iput")]
    IPut {
        src: Reg,
        obj: Reg,
        field: FieldRef,
    },
    #[serde(rename = "sget")]
    SGet {
        dst: Reg,
        field: FieldRef,
    },
    #[serde(rename = "sput")]
    SPut {
        src: Reg,
        field: FieldRef,
    },
    #[serde(rename = "aget")]
    AGet {
        dst: Reg,
        array: Reg,
        index: Reg,
    },
    #[serde(rename = "aput")]
    APut {
        src: Reg,
        array: Reg,
        index: Reg,
    },
    Invoke {
        kind: InvokeKind,
        method: MethodRef,
        #[serde(default)]
        args: Vec<Reg>,
    },
    Unop {
        kind: UnOp,
        dst: Reg,
        src: Reg,
    },
    Binop {
        kind: BinOp,
        dst: Reg,
        lhs: Reg,
        rhs: Operand,
    },
    Cmp {
        dst: Reg,
        lhs: Reg,
        rhs: Reg,
    },
    If {
        comp: Comp,
        lhs: Reg,
        rhs: Operand,
    },
    Goto,
    Switch {
        reg: Reg,
    },
    Throw {
        reg: Reg,
    },
    Monitor {
        reg: Reg,
    },
}

impl Instr {
    /// Returns `true` if control never falls through this instruction
    /// to the next one of the method.
    #[must_use]
    pub const fn is_exit(&self) -> bool {
        matches!(self, Self::Return { .. } | Self::Throw { .. })
    }

    #[must_use]
    pub const fn can_throw(&self) -> bool {
        matches!(
            self,
            Self::NewInstance { .. }
                | Self::NewArray { .. }
                | Self::CheckCast { .. }
                | Self::ArrayLength { .. }
                | Self::IGet { .. }
                | Self::IPut { .. }
                | Self::SGet { .. }
                | Self::SPut { .. }
                | Self::AGet { .. }
                | Self::APut { .. }
                | Self::Invoke { .. }
                | Self::Binop {
                    kind: BinOp::Div | BinOp::Rem,
                    ..
                }
                | Self::Throw { .. }
                | Self::Monitor { .. }
        )
    }

    /// Registers read or written by the instruction.
    #[must_use]
    pub fn registers(&self) -> Vec<Reg> {
        let operand = |rhs: &Operand| match rhs {
            Operand::Reg(r) => Some(*r),
            Operand::Lit(_) | Operand::Zero => None,
        };
        match self {
            Self::Nop | Self::Goto => Vec::new(),
            Self::Return { reg } => reg.iter().copied().collect(),
            Self::MoveResult { dst }
            | Self::MoveException { dst }
            | Self::Const { dst, .. }
            | Self::ConstString { dst, .. }
            | Self::NewInstance { dst, .. }
            | Self::SGet { dst, .. } => vec![*dst],
            Self::CheckCast { reg, .. }
            | Self::Switch { reg }
            | Self::Throw { reg }
            | Self::Monitor { reg } => vec![*reg],
            Self::SPut { src, .. } => vec![*src],
            Self::Move { dst, src }
            | Self::InstanceOf { dst, src, .. }
            | Self::Unop { dst, src, .. } => vec![*dst, *src],
            Self::NewArray { dst, size, .. } => vec![*dst, *size],
            Self::ArrayLength { dst, array } => vec![*dst, *array],
            Self::IGet { dst, obj, .. } => vec![*dst, *obj],
            Self::IPut { src, obj, .. } => vec![*src, *obj],
            Self::AGet { dst, array, index } => vec![*dst, *array, *index],
            Self::APut { src, array, index } => vec![*src, *array, *index],
            Self::Invoke { args, .. } => args.clone(),
            Self::Binop { dst, lhs, rhs, .. } => {
                let mut regs = vec![*dst, *lhs];
                regs.extend(operand(rhs));
                regs
            }
            Self::Cmp { dst, lhs, rhs } => vec![*dst, *lhs, *rhs],
            Self::If { lhs, rhs, .. } => {
                let mut regs = vec![*lhs];
                regs.extend(operand(rhs));
                regs
            }
        }
    }

    /// Applies `f` to every symbolic name held by the instruction.
    pub fn for_each_name_mut<F: FnMut(&mut Name)>(&mut self, mut f: F) {
        match self {
            Self::NewInstance { class, .. }
            | Self::NewArray { class, .. }
            | Self::CheckCast { class, .. }
            | Self::InstanceOf { class, .. } => f(class),
            Self::IGet { field, .. }
            | Self::IPut { field, .. }
            | Self::SGet { field, .. }
            | Self::SPut { field, .. } => {
                f(&mut field.class);
                f(&mut field.name);
            }
            Self::Invoke { method, .. } => {
                f(&mut method.class);
                f(&mut method.name);
                f(&mut method.proto);
            }
            _ => (),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Nop => write!(f, "nop"),
            Self::Move { dst, src } => write!(f, "move {dst}, {src}"),
            Self::MoveResult { dst } => write!(f, "move-result {dst}"),
            Self::MoveException { dst } => write!(f, "move-exception {dst}"),
            Self::Return { reg: Some(reg) } => write!(f, "return {reg}"),
            Self::Return { reg: None } => write!(f, "return-void"),
            Self::Const { dst, value } => write!(f, "const {dst}, #{value}"),
            Self::ConstString { dst, value } => write!(f, "const-string {dst}, {value:?}"),
            Self::NewInstance { dst, class } => write!(f, "new-instance {dst}, {class}"),
            Self::NewArray { dst, size, class } => write!(f, "new-array {dst}, {size}, {class}"),
            Self::CheckCast { reg, class } => write!(f, "check-cast {reg}, {class}"),
            Self::InstanceOf { dst, src, class } => {
                write!(f, "instance-of {dst}, {src}, {class}")
            }
            Self::ArrayLength { dst, array } => write!(f, "array-length {dst}, {array}"),
            Self::IGet { dst, obj, field } => write!(f, "iget {dst}, {obj}, {field}"),
            Self::IPut { src, obj, field } => write!(f, "iput {src}, {obj}, {field}"),
            Self::SGet { dst, field } => write!(f, "sget {dst}, {field}"),
            Self::SPut { src, field } => write!(f, "sput {src}, {field}"),
            Self::AGet { dst, array, index } => write!(f, "aget {dst}, {array}, {index}"),
            Self::APut { src, array, index } => write!(f, "aput {src}, {array}, {index}"),
            Self::Invoke { kind, method, args } => {
                write!(f, "invoke-{kind} {{")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, "}}, {method}")
            }
            Self::Unop { kind, dst, src } => write!(f, "{} {dst}, {src}", mnemonic(kind)),
            Self::Binop {
                kind,
                dst,
                lhs,
                rhs,
            } => write!(f, "{} {dst}, {lhs}, {rhs}", mnemonic(kind)),
            Self::Cmp { dst, lhs, rhs } => write!(f, "cmp {dst}, {lhs}, {rhs}"),
            Self::If { comp, lhs, rhs } => write!(f, "if-{} {lhs}, {rhs}", mnemonic(comp)),
            Self::Goto => write!(f, "goto"),
            Self::Switch { reg } => write!(f, "switch {reg}"),
            Self::Throw { reg } => write!(f, "throw {reg}"),
            Self::Monitor { reg } => write!(f, "monitor {reg}"),
        }
    }
}

fn mnemonic<T: fmt::Debug>(op: &T) -> String {
    format!("{op:?}").to_lowercase()
}

/// An instruction together with its program-wide identifier.
#[derive(Debug, Clone)]
pub struct LabeledInstr {
    id: InstrId,
    instr: Instr,
}

impl LabeledInstr {
    #[must_use]
    pub const fn new(id: InstrId, instr: Instr) -> Self {
        Self { id, instr }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> InstrId {
        self.id
    }

    #[inline]
    #[must_use]
    pub const fn instr(&self) -> &Instr {
        &self.instr
    }

    pub(crate) fn instr_mut(&mut self) -> &mut Instr {
        &mut self.instr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_invoke() {
        let instr: Instr = serde_json::from_str(
            r#"{"op": "invoke", "kind": "static", "args": [1, 2],
                "method": {"class": "LA;", "name": "f", "proto": "(II)V"}}"#,
        )
        .unwrap();
        assert_eq!(instr.to_string(), "invoke-static {v1, v2}, LA;->f(II)V");
        assert!(instr.can_throw());
    }

    #[test]
    fn decode_return_void() {
        let instr: Instr = serde_json::from_str(r#"{"op": "return"}"#).unwrap();
        assert_eq!(instr, Instr::Return { reg: None });
        assert!(instr.is_exit());
    }

    #[test]
    fn decode_binop_literal() {
        let instr: Instr = serde_json::from_str(
            r#"{"op": "binop", "kind": "add", "dst": 0, "lhs": 0, "rhs": {"lit": 1}}"#,
        )
        .unwrap();
        assert_eq!(instr.to_string(), "add v0, v0, #1");
        assert!(!instr.can_throw());
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let res: Result<Instr, _> = serde_json::from_str(r#"{"op": "fill-array-data"}"#);
        assert!(res.is_err());
    }
}
