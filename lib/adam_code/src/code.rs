//! Method bodies as block graphs.

use crate::instrs::{Instr, LabeledInstr};
use crate::names::Name;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Write;

#[derive(Debug)]
pub struct Block {
    label: String,
    instrs: Vec<LabeledInstr>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        if self.instrs.is_empty() {
            write!(f, "<END>")?;
            return Ok(());
        }
        for linstr in &self.instrs {
            writeln!(f, "{:5}: {}", linstr.id(), linstr.instr())?;
        }
        Ok(())
    }
}

impl Block {
    pub(crate) fn new(label: String, instrs: Vec<LabeledInstr>) -> Self {
        Self { label, instrs }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn instructions(&self) -> impl Iterator<Item = &LabeledInstr> {
        self.instrs.iter()
    }

    pub(crate) fn instructions_mut(&mut self) -> impl Iterator<Item = &mut LabeledInstr> {
        self.instrs.iter_mut()
    }

    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&Instr> {
        self.instrs.last().map(LabeledInstr::instr)
    }

    /// Returns `true` if the block leaves the method.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.last().map_or(false, Instr::is_exit)
    }

    #[must_use]
    pub fn ends_with_throw(&self) -> bool {
        matches!(self.last(), Some(Instr::Throw { .. }))
    }

    #[must_use]
    pub fn can_throw(&self) -> bool {
        self.instrs.iter().any(|linstr| linstr.instr().can_throw())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Branch {
    #[serde(rename = "seq")]
    Sequence,
    Jmp,
    IfTrue,
    IfFalse,
    Switch { value: i32 },
    SwitchDefault,
    Catch { class: Name },
    CatchAll,
}

impl Branch {
    #[inline]
    #[must_use]
    pub const fn is_exceptional(&self) -> bool {
        matches!(self, Self::Catch { .. } | Self::CatchAll)
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::IfTrue => write!(f, "<true>"),
            Self::IfFalse => write!(f, "<false>"),
            Self::Switch { value } => write!(f, "<switch {value}>"),
            Self::SwitchDefault => write!(f, "<switch _>"),
            Self::Jmp => write!(f, "<jmp>"),
            Self::Sequence => write!(f, "<seq>"),
            Self::Catch { class } => write!(f, "<catch {class}>"),
            Self::CatchAll => write!(f, "<catch *>"),
        }
    }
}

/// The code of a method: register file shape and block graph.
#[derive(Debug)]
pub struct Code {
    registers_size: u16,
    ins_size: u16,
    inner: DiGraph<Block, Branch>,
    entry: NodeIndex,
}

impl Code {
    pub(crate) fn new(
        registers_size: u16,
        ins_size: u16,
        inner: DiGraph<Block, Branch>,
        entry: NodeIndex,
    ) -> Self {
        Self {
            registers_size,
            ins_size,
            inner,
            entry,
        }
    }

    /// Number of registers used by the method, arguments included.
    #[inline]
    #[must_use]
    pub const fn registers_size(&self) -> u16 {
        self.registers_size
    }

    /// Number of registers holding the arguments (the last ones).
    #[inline]
    #[must_use]
    pub const fn ins_size(&self) -> u16 {
        self.ins_size
    }

    #[inline]
    #[must_use]
    pub const fn entry(&self) -> NodeIndex {
        self.entry
    }

    #[inline]
    #[must_use]
    pub const fn graph(&self) -> &DiGraph<Block, Branch> {
        &self.inner
    }

    #[inline]
    #[must_use]
    pub fn block(&self, id: NodeIndex) -> &Block {
        &self.inner[id]
    }

    pub fn iter_blocks(&self) -> impl Iterator<Item = &Block> {
        self.inner.node_indices().map(move |id| &self.inner[id])
    }

    pub(crate) fn iter_blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.inner.node_weights_mut()
    }

    pub fn iter_instructions(&self) -> impl Iterator<Item = &LabeledInstr> {
        self.iter_blocks().flat_map(Block::instructions)
    }

    pub fn successors(&self, id: NodeIndex) -> impl Iterator<Item = (NodeIndex, &Branch)> {
        self.inner
            .edges_directed(id, Direction::Outgoing)
            .map(|edge| (edge.target(), edge.weight()))
    }

    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut res = String::new();
        res.push_str("digraph {\n");
        res.push_str("  splines=ortho;\n");
        res.push_str("  nodesep=2;\n");
        write!(
            res,
            "{}",
            Dot::with_attr_getters(
                &self.inner,
                &[Config::GraphContentOnly, Config::EdgeNoLabel],
                &|_, edge| {
                    let color = match edge.weight() {
                        Branch::IfTrue => "green",
                        Branch::IfFalse => "red",
                        Branch::Switch { .. } | Branch::SwitchDefault => "purple",
                        Branch::Jmp => "blue",
                        Branch::Catch { .. } | Branch::CatchAll => "orchid",
                        Branch::Sequence => "black",
                    };
                    format!("color={},xlabel=\"{}\"", color, edge.weight())
                },
                &|_, (_, block)| if block.can_throw() {
                    String::from("shape=box,color=blue")
                } else {
                    String::from("shape=box,color=black")
                }
            )
        )
        .expect("writing to a String cannot fail");
        res.push('}');
        res
    }
}
