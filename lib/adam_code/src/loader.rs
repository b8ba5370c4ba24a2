//! Program loading from its JSON description.
//!
//! The loader consumes an already decoded program: every method comes with
//! its register file shape and its block graph. A minimal description looks
//! like:
//!
//! ```json
//! { "classes": [ {
//!     "name": "LMain;", "super": "Ljava/lang/Object;",
//!     "methods": [ {
//!         "name": "run", "proto": "()V", "access": ["public", "static"],
//!         "code": { "registers": 1, "ins": 0, "blocks": [
//!             { "label": "entry", "instrs": [ { "op": "return" } ] }
//!         ] }
//!     } ]
//! } ] }
//! ```
//!
//! The first block of a method is its entry block. Names are interned in the
//! program's registry once the whole description is loaded.

use crate::code::{Block, Branch, Code};
use crate::errors::{CodeError, CodeResult};
use crate::instrs::{Instr, LabeledInstr};
use crate::names::Name;
use crate::program::{AccessFlags, Class, Field, Method, Program};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct RawProgram {
    classes: Vec<RawClass>,
}

#[derive(Debug, Deserialize)]
struct RawClass {
    name: Name,
    #[serde(rename = "super", default)]
    superclass: Option<Name>,
    #[serde(default)]
    interfaces: Vec<Name>,
    #[serde(default)]
    access: Vec<String>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    methods: Vec<RawMethod>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: Name,
    #[serde(default)]
    access: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawMethod {
    name: Name,
    proto: Name,
    #[serde(default)]
    access: Vec<String>,
    #[serde(default)]
    code: Option<RawCode>,
}

#[derive(Debug, Deserialize)]
struct RawCode {
    registers: u16,
    #[serde(default)]
    ins: u16,
    blocks: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    label: String,
    #[serde(default)]
    instrs: Vec<Instr>,
    #[serde(default)]
    edges: Vec<RawEdge>,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    to: String,
    #[serde(flatten)]
    branch: Branch,
}

fn parse_flags(access: &[String]) -> CodeResult<AccessFlags> {
    access
        .iter()
        .try_fold(AccessFlags::empty(), |acc, name| {
            Ok(acc | AccessFlags::parse(name)?)
        })
}

impl Program {
    /// Loads a program from its JSON description.
    pub fn from_json(input: &str) -> CodeResult<Self> {
        let raw: RawProgram = serde_json::from_str(input)?;
        let mut program = Self::new();
        for raw_class in raw.classes {
            program.load_class(raw_class)?;
        }
        program.intern_all();
        log::debug!(
            "program loaded: {} classes, {} methods, {} fields, {} instructions",
            program.nb_classes(),
            program.nb_methods(),
            program.nb_fields(),
            program.nb_instructions()
        );
        Ok(program)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> CodeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    fn load_class(&mut self, raw: RawClass) -> CodeResult<()> {
        let uid = self.counters_mut().new_class_uid();
        let class = Class::new(
            uid,
            raw.name.clone(),
            raw.superclass,
            raw.interfaces,
            parse_flags(&raw.access)?,
        );
        self.register_class(class)?;

        for raw_field in raw.fields {
            let uid = self.counters_mut().new_field_uid();
            let field = Field::new(
                uid,
                raw.name.clone(),
                raw_field.name,
                parse_flags(&raw_field.access)?,
            );
            self.register_field(&raw.name, field)?;
        }

        for raw_method in raw.methods {
            let descriptor = format!("{}->{}{}", raw.name, raw_method.name, raw_method.proto);
            let code = raw_method
                .code
                .map(|raw_code| self.load_code(&descriptor, raw_code))
                .transpose()?;
            let uid = self.counters_mut().new_method_uid();
            let method = Method::new(
                uid,
                raw.name.clone(),
                raw_method.name,
                raw_method.proto,
                parse_flags(&raw_method.access)?,
                code,
            );
            self.register_method(&raw.name, method)?;
        }

        Ok(())
    }

    fn load_code(&mut self, descriptor: &str, raw: RawCode) -> CodeResult<Code> {
        let mut graph = DiGraph::new();
        let mut labels: BTreeMap<String, NodeIndex> = BTreeMap::new();
        let mut pending_edges = Vec::new();

        if raw.ins > raw.registers {
            return Err(CodeError::BadParameterCount {
                method: descriptor.to_string(),
                ins: raw.ins,
                registers: raw.registers,
            });
        }
        for raw_block in raw.blocks {
            if labels.contains_key(&raw_block.label) {
                return Err(CodeError::DuplicateBlockLabel {
                    method: descriptor.to_string(),
                    label: raw_block.label,
                });
            }
            let out_of_range = raw_block
                .instrs
                .iter()
                .flat_map(Instr::registers)
                .find(|reg| reg.value() >= raw.registers);
            if let Some(reg) = out_of_range {
                return Err(CodeError::BadRegister {
                    method: descriptor.to_string(),
                    reg,
                    registers: raw.registers,
                });
            }
            let instrs = raw_block
                .instrs
                .into_iter()
                .map(|instr| LabeledInstr::new(self.counters_mut().new_instr_id(), instr))
                .collect();
            let id = graph.add_node(Block::new(raw_block.label.clone(), instrs));
            labels.insert(raw_block.label, id);
            pending_edges.push((id, raw_block.edges));
        }

        let entry = pending_edges
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| CodeError::MissingEntryBlock(descriptor.to_string()))?;

        for (from, edges) in pending_edges {
            for edge in edges {
                let to = labels
                    .get(&edge.to)
                    .ok_or_else(|| CodeError::BadBlockLabel {
                        method: descriptor.to_string(),
                        label: edge.to.clone(),
                    })?;
                graph.add_edge(from, *to, edge.branch);
            }
        }

        Ok(Code::new(raw.registers, raw.ins, graph, entry))
    }

    /// Makes every name of the program point into the program's interner.
    fn intern_all(&mut self) {
        let mut names: Vec<Name> = Vec::new();
        for class in self.iter_classes() {
            names.push(class.name().clone());
        }
        for name in &mut names {
            self.interner_mut().reintern(name);
        }

        let mut interner = std::mem::take(self.interner_mut());
        for method in self.iter_methods_mut() {
            if let Some(code) = method.code_mut() {
                for block in code.iter_blocks_mut() {
                    for linstr in block.instructions_mut() {
                        linstr
                            .instr_mut()
                            .for_each_name_mut(|name| interner.reintern(name));
                    }
                }
            }
        }
        *self.interner_mut() = interner;
    }
}
