//! The method analyzer.
//!
//! Methods are analyzed per calling context. Each `(method, context)` pair
//! owns a slot of the summary arena, holding its [`MethodState`]:
//!
//!  - `Pending`: known but not analyzed, or analyzed with a result that
//!    depended on an enclosing analysis still in progress;
//!  - `InProgress`: on the analysis stack, with a provisional summary
//!    returned to recursive calls;
//!  - `Converged`: the summary is final and cached;
//!  - `Failed`: the method cannot be analyzed, calls have an unknown effect.
//!
//! A method body is analyzed by a worklist iteration over its block graph in
//! reverse postorder. Recursive calls get the provisional summary of the
//! method; the analysis is then run again with the obtained summary as the
//! new provisional one, until it stabilizes.

use crate::addr::{Addr, RESULT_REG};
use crate::alloctab::AllocTable;
use crate::builtins::{Builtins, Finding};
use crate::config::AnalyzerConfig;
use crate::context::CallContext;
use crate::diff::Diff;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::frame::Frame;
use crate::summary;
use crate::tags::TagRegistry;
use crate::value::{AliasSet, Value};
use adam_code::errors::CodeError;
use adam_code::{Block, Method, MethodUid, Program};
use fixedbitset::FixedBitSet;
use petgraph::graph::NodeIndex;
use petgraph::visit::DfsPostOrder;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Index of a `(method, context)` slot in the summary arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SummaryId(usize);

#[derive(Debug, Clone)]
pub enum MethodState {
    Pending,
    InProgress { provisional: Diff },
    Converged(Diff),
    Failed(String),
}

impl MethodState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress { .. } => "in progress",
            Self::Converged(_) => "converged",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Debug)]
struct Slot {
    method: MethodUid,
    context: CallContext,
    state: MethodState,
    /// Set when a recursive call read the provisional summary.
    reentered: bool,
}

/// Counters of an analyzer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyzerStats {
    /// Summary requests, entry points included.
    pub requests: usize,
    /// Method body analyses, recursion rounds included.
    pub analyses: usize,
    pub cache_hits: usize,
    pub failures: usize,
    /// Locations widened after hitting the block visit cap.
    pub widenings: usize,
    /// Iteration caps hit (block visits, recursion rounds, call depth).
    pub non_convergences: usize,
    /// Calls to methods with neither code nor model.
    pub unresolved: usize,
    /// Calls reading a provisional summary.
    pub recursions: usize,
}

impl fmt::Display for AnalyzerStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "requests:         {}", self.requests)?;
        writeln!(f, "analyses:         {}", self.analyses)?;
        writeln!(f, "cache hits:       {}", self.cache_hits)?;
        writeln!(f, "failures:         {}", self.failures)?;
        writeln!(f, "widenings:        {}", self.widenings)?;
        writeln!(f, "non convergences: {}", self.non_convergences)?;
        writeln!(f, "unresolved calls: {}", self.unresolved)?;
        write!(f, "recursive calls:  {}", self.recursions)
    }
}

/// State of the analysis of one method body.
pub(crate) struct MethodRun {
    pub(crate) descriptor: String,
    pub(crate) table: AllocTable,
}

pub struct Analyzer<'p> {
    pub(crate) program: &'p Program,
    pub(crate) builtins: Builtins,
    tags: TagRegistry,
    pub(crate) config: AnalyzerConfig,
    index: HashMap<(MethodUid, CallContext), SummaryId>,
    arena: Vec<Slot>,
    stack: Vec<SummaryId>,
    /// Lowest stack position a result under computation depends on.
    floor: usize,
    pub(crate) findings: Vec<Finding>,
    pub(crate) stats: AnalyzerStats,
}

impl<'p> Analyzer<'p> {
    #[must_use]
    pub fn new(program: &'p Program, config: AnalyzerConfig) -> Self {
        Self::with_builtins(program, config, Builtins::default())
    }

    #[must_use]
    pub fn with_builtins(program: &'p Program, config: AnalyzerConfig, builtins: Builtins) -> Self {
        Self {
            program,
            builtins,
            tags: TagRegistry::new(),
            config,
            index: HashMap::new(),
            arena: Vec::new(),
            stack: Vec::new(),
            floor: usize::MAX,
            findings: Vec::new(),
            stats: AnalyzerStats::default(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &AnalyzerStats {
        &self.stats
    }

    #[inline]
    #[must_use]
    pub const fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    #[inline]
    pub fn tags_mut(&mut self) -> &mut TagRegistry {
        &mut self.tags
    }

    #[inline]
    #[must_use]
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Iterates over the summary slots.
    pub fn summaries(&self) -> impl Iterator<Item = (SummaryId, MethodUid, &MethodState)> {
        self.arena
            .iter()
            .enumerate()
            .map(|(i, slot)| (SummaryId(i), slot.method, &slot.state))
    }

    #[must_use]
    pub fn state(&self, id: SummaryId) -> Option<&MethodState> {
        self.arena.get(id.0).map(|slot| &slot.state)
    }

    /// Analyzes `uid` as an entry point, with unknown arguments.
    pub fn analyze_entry(&mut self, uid: MethodUid) -> AnalysisResult<Diff> {
        let program = self.program;
        let method = &program[uid];
        let code = method.code().ok_or(AnalysisError::Code(CodeError::NoCode))?;
        log::info!("analyzing entry point {}", method.descriptor());
        let ctx = CallContext::unknown(code.ins_size());
        self.analyze_call(uid, ctx)
    }

    /// Returns the summary of `uid` in `ctx`, analyzing the method if
    /// needed. The method must have code.
    ///
    /// Failures are not propagated: the summary of a method that cannot be
    /// analyzed is the unknown effect.
    pub fn analyze_call(&mut self, uid: MethodUid, ctx: CallContext) -> AnalysisResult<Diff> {
        self.stats.requests += 1;
        let id = self.slot_for(uid, ctx);

        match &self.arena[id.0].state {
            MethodState::Converged(diff) => {
                self.stats.cache_hits += 1;
                log::debug!("summary of {} found in cache", self.program[uid].descriptor());
                return Ok(diff.clone());
            }
            MethodState::InProgress { provisional } => {
                let provisional = provisional.clone();
                self.stats.recursions += 1;
                if let Some(pos) = self.stack.iter().position(|s| *s == id) {
                    self.floor = self.floor.min(pos);
                }
                self.arena[id.0].reentered = true;
                log::debug!(
                    "recursive call to {}, provisional summary used",
                    self.program[uid].descriptor()
                );
                return Ok(provisional);
            }
            MethodState::Failed(_) => {
                return Ok(Diff::unknown_effect(&self.arena[id.0].context.tags()))
            }
            MethodState::Pending => (),
        }
        let ctx = self.arena[id.0].context.clone();

        if self.stack.len() >= self.config.max_call_depth {
            self.stats.non_convergences += 1;
            log::warn!(
                "call depth {} reached, {} has an unknown effect",
                self.stack.len(),
                self.program[uid].descriptor()
            );
            return Ok(Diff::unknown_effect(&ctx.tags()));
        }

        let depth = self.stack.len();
        self.stack.push(id);
        let outer_floor = std::mem::replace(&mut self.floor, usize::MAX);
        let outcome = self.analyze_rounds(id, uid, &ctx);
        self.stack.pop();
        let dependent = self.floor < depth;
        self.floor = if dependent {
            outer_floor.min(self.floor)
        } else {
            outer_floor
        };

        match outcome {
            Ok(diff) => {
                self.arena[id.0].state = if dependent {
                    MethodState::Pending
                } else {
                    MethodState::Converged(diff.clone())
                };
                Ok(diff)
            }
            Err(err) => {
                self.stats.failures += 1;
                log::warn!("analysis of {} failed: {err}", self.program[uid].descriptor());
                self.arena[id.0].state = MethodState::Failed(err.to_string());
                Ok(Diff::unknown_effect(&ctx.tags()))
            }
        }
    }

    /// Returns the slot of `uid` in `ctx`.
    ///
    /// A recursive call in a context unseen so far is looked up in the
    /// widened context instead, so that contexts cannot grow along a
    /// recursion. An enclosing analysis of the method in a context covering
    /// the widened one is reused.
    fn slot_for(&mut self, uid: MethodUid, ctx: CallContext) -> SummaryId {
        let mut key = (uid, ctx);
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        if self.stack.iter().any(|id| self.arena[id.0].method == uid) {
            key.1 = key.1.widened();
            let covering = self.stack.iter().rev().copied().find(|id| {
                let slot = &self.arena[id.0];
                slot.method == uid && slot.context.covers(&key.1)
            });
            if let Some(id) = covering.or_else(|| self.index.get(&key).copied()) {
                log::debug!(
                    "recursive call to {} in a widened context",
                    self.program[uid].descriptor()
                );
                return id;
            }
        }
        let id = SummaryId(self.arena.len());
        self.arena.push(Slot {
            method: uid,
            context: key.1.clone(),
            state: MethodState::Pending,
            reentered: false,
        });
        self.index.insert(key, id);
        id
    }

    /// Analyzes the body of `uid` until its summary is stable with respect
    /// to its own recursive calls.
    fn analyze_rounds(
        &mut self,
        id: SummaryId,
        uid: MethodUid,
        ctx: &CallContext,
    ) -> AnalysisResult<Diff> {
        let program = self.program;
        let method = &program[uid];
        let mut provisional = Diff::new();
        let mut round = 0;
        loop {
            self.arena[id.0].state = MethodState::InProgress {
                provisional: provisional.clone(),
            };
            self.arena[id.0].reentered = false;
            let mut diff = self.run_method(method, ctx)?;
            if !self.arena[id.0].reentered || diff == provisional {
                return Ok(diff);
            }
            round += 1;
            if round >= self.config.max_recursion_rounds {
                self.stats.non_convergences += 1;
                log::warn!(
                    "{}: {}",
                    method.descriptor(),
                    AnalysisError::NonConvergence(round)
                );
                diff.record_merge(
                    Addr::Register(RESULT_REG),
                    Value::Set(AliasSet::unknown().with_tags(&ctx.tags())),
                );
                return Ok(diff);
            }
            log::debug!("{}: recursion round {round}", method.descriptor());
            provisional = diff;
        }
    }

    /// Runs the fixpoint over the block graph of `method` in `ctx`, returns
    /// the summary of the method.
    fn run_method(&mut self, method: &'p Method, ctx: &CallContext) -> AnalysisResult<Diff> {
        self.stats.analyses += 1;
        let code = method.code().ok_or(AnalysisError::Code(CodeError::NoCode))?;
        let graph = code.graph();
        let cap = self.config.set_cap;
        let descriptor = method.descriptor();
        log::info!("analyzing {descriptor}");

        let initial = ctx.initial_frame(code, cap)?;
        let mut run = MethodRun {
            descriptor,
            table: AllocTable::new(ctx.base()),
        };

        let nb_blocks = graph.node_count();
        let mut inputs: Vec<Option<Frame>> = vec![None; nb_blocks];
        let mut visits = vec![0usize; nb_blocks];
        let mut outputs: Vec<Option<Frame>> = vec![None; nb_blocks];
        inputs[code.entry().index()] = Some(initial.fork());

        // For forward analyses, the best order is reverse postorder: the
        // postorder is pushed back and popped from the back.
        let mut worklist: VecDeque<NodeIndex> = VecDeque::new();
        let mut queued = FixedBitSet::with_capacity(nb_blocks);
        let mut postorder = DfsPostOrder::new(graph, code.entry());
        while let Some(id) = postorder.next(graph) {
            worklist.push_back(id);
            queued.insert(id.index());
        }

        while let Some(id) = worklist.pop_back() {
            queued.set(id.index(), false);
            let input = match &inputs[id.index()] {
                Some(input) => input.fork(),
                // not reached yet
                None => continue,
            };
            visits[id.index()] += 1;
            let block = code.block(id);
            log::debug!("    ---- block {} (visit {})", block.label(), visits[id.index()]);

            let mut frame = input.fork();
            for linstr in block.instructions() {
                log::trace!("transfer {}: {}", linstr.id(), linstr.instr());
                self.transfer(&mut run, &mut frame, linstr)?;
            }
            let journal = frame.take_journal();
            log::trace!("    {} mutations", journal.len());

            let mut has_successor = false;
            for (succ, branch) in code.successors(id) {
                has_successor = true;
                let out = if branch.is_exceptional() {
                    self.catch_state(&input, &frame, block)?
                } else {
                    frame.fork()
                };
                if self.propagate(&mut inputs, &visits, succ, out, &run.descriptor)?
                    && !queued.contains(succ.index())
                {
                    queued.insert(succ.index());
                    worklist.push_front(succ);
                }
            }

            if block.is_exit() || !has_successor {
                outputs[id.index()] = Some(frame);
            }
        }

        // the last output of a block is the largest one
        let mut exit: Option<Frame> = None;
        for output in outputs.into_iter().flatten() {
            exit = match exit {
                Some(mut exit) => {
                    exit.join(&output)?;
                    Some(exit)
                }
                None => Some(output),
            };
        }
        let exit = match exit {
            Some(exit) => exit,
            None => {
                log::debug!("{}: no exit reached", run.descriptor);
                let mut exit = initial.fork();
                exit.set_result(AliasSet::empty());
                exit
            }
        };
        log::debug!("    -- EXIT STATE:");
        for line in exit.to_string().lines() {
            log::debug!("      {line}");
        }
        summary::export(&initial, &exit, &run.table)
    }

    /// Frame flowing along an exception edge: any state of the block may
    /// throw, and the exception may come from anywhere unless the block only
    /// throws through its last instruction.
    fn catch_state(
        &self,
        input: &Frame,
        output: &Frame,
        block: &Block,
    ) -> AnalysisResult<Frame> {
        let cap = self.config.set_cap;
        let mut state = input.fork();
        state.join(output)?;
        let throwing = block
            .instructions()
            .filter(|linstr| linstr.instr().can_throw())
            .count();
        let exception = if block.ends_with_throw() && throwing == 1 {
            output.exception().clone()
        } else {
            output.exception().join(&AliasSet::unknown(), cap)
        };
        state.set_exception(exception);
        state.take_journal();
        Ok(state)
    }

    /// Joins `out` into the input of `succ`, widening it when the block has
    /// been visited too many times. Returns `true` if the input changed.
    fn propagate(
        &mut self,
        inputs: &mut [Option<Frame>],
        visits: &[usize],
        succ: NodeIndex,
        out: Frame,
        descriptor: &str,
    ) -> AnalysisResult<bool> {
        let current = match &mut inputs[succ.index()] {
            Some(current) => current,
            slot @ None => {
                *slot = Some(out);
                return Ok(true);
            }
        };
        if visits[succ.index()] < self.config.max_block_visits {
            let changed = current.join(&out)?;
            current.take_journal();
            return Ok(changed);
        }
        let old = current.clone();
        if !current.join(&out)? {
            return Ok(false);
        }
        current.take_journal();
        let widened = current.widen_changed(&old);
        self.stats.widenings += widened;
        self.stats.non_convergences += 1;
        log::warn!(
            "{descriptor}: {}, {widened} locations widened",
            AnalysisError::NonConvergence(visits[succ.index()])
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addr::EXCEPTION_REG;
    use crate::diff::Action;
    use test_log::test;

    const PROGRAM: &str = r#"{ "classes": [
        { "name": "LClassX;", "super": "Ljava/lang/Object;", "fields": [ {"name": "f"} ] },
        { "name": "LMain;", "super": "Ljava/lang/Object;", "methods": [
            { "name": "make", "proto": "()LClassX;", "access": ["public", "static"],
              "code": { "registers": 2, "ins": 0, "blocks": [
                { "label": "entry", "instrs": [
                    {"op": "const", "dst": 0, "value": 0},
                    {"op": "new-instance", "dst": 1, "class": "LClassX;"},
                    {"op": "return", "reg": 1} ] } ] } },
            { "name": "run", "proto": "()LClassX;", "access": ["public", "static"],
              "code": { "registers": 2, "ins": 0, "blocks": [
                { "label": "entry", "instrs": [
                    {"op": "invoke", "kind": "static", "args": [],
                     "method": {"class": "LMain;", "name": "make", "proto": "()LClassX;"}},
                    {"op": "move-result", "dst": 0},
                    {"op": "invoke", "kind": "static", "args": [],
                     "method": {"class": "LMain;", "name": "make", "proto": "()LClassX;"}},
                    {"op": "move-result", "dst": 1},
                    {"op": "return", "reg": 1} ] } ] } },
            { "name": "loop", "proto": "()LClassX;", "access": ["public", "static"],
              "code": { "registers": 2, "ins": 0, "blocks": [
                { "label": "entry", "instrs": [ {"op": "const", "dst": 0, "value": 0} ],
                  "edges": [ {"to": "head", "kind": "seq"} ] },
                { "label": "head", "instrs": [
                    {"op": "new-instance", "dst": 1, "class": "LClassX;"},
                    {"op": "iput", "src": 0, "obj": 1, "field": {"class": "LClassX;", "name": "f"}},
                    {"op": "move", "dst": 0, "src": 1},
                    {"op": "if", "comp": "eq", "lhs": 1, "rhs": "zero"} ],
                  "edges": [ {"to": "head", "kind": "if-true"}, {"to": "exit", "kind": "if-false"} ] },
                { "label": "exit", "instrs": [ {"op": "return", "reg": 0} ] } ] } },
            { "name": "build", "proto": "(I)LClassX;", "access": ["public", "static"],
              "code": { "registers": 3, "ins": 1, "blocks": [
                { "label": "entry", "instrs": [
                    {"op": "new-instance", "dst": 0, "class": "LClassX;"},
                    {"op": "if", "comp": "eq", "lhs": 2, "rhs": "zero"} ],
                  "edges": [ {"to": "ret", "kind": "if-true"}, {"to": "rec", "kind": "if-false"} ] },
                { "label": "rec", "instrs": [
                    {"op": "invoke", "kind": "static", "args": [2],
                     "method": {"class": "LMain;", "name": "build", "proto": "(I)LClassX;"}},
                    {"op": "move-result", "dst": 1},
                    {"op": "iput", "src": 1, "obj": 0, "field": {"class": "LClassX;", "name": "f"}} ],
                  "edges": [ {"to": "ret", "kind": "jmp"} ] },
                { "label": "ret", "instrs": [ {"op": "return", "reg": 0} ] } ] } },
            { "name": "takes", "proto": "(I)V", "access": ["public", "static"],
              "code": { "registers": 1, "ins": 1, "blocks": [
                { "label": "entry", "instrs": [ {"op": "return"} ] } ] } },
            { "name": "broken", "proto": "()I", "access": ["public", "static"],
              "code": { "registers": 1, "ins": 0, "blocks": [
                { "label": "entry", "instrs": [
                    {"op": "invoke", "kind": "static", "args": [],
                     "method": {"class": "LMain;", "name": "takes", "proto": "(I)V"}},
                    {"op": "const", "dst": 0, "value": 3},
                    {"op": "return", "reg": 0} ] } ] } }
        ] }
    ] }"#;

    fn uid(program: &Program, descriptor: &str) -> MethodUid {
        program.find_method_by_descriptor(descriptor).unwrap().uid()
    }

    fn result_set(diff: &Diff) -> AliasSet {
        diff.entries()
            .filter(|entry| entry.addr == Addr::Register(RESULT_REG))
            .last()
            .and_then(|entry| entry.value.as_set())
            .cloned()
            .unwrap()
    }

    #[test]
    fn allocation_is_exported_relocated() {
        let program = Program::from_json(PROGRAM).unwrap();
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        let summary = analyzer.analyze_entry(uid(&program, "LMain;->make()LClassX;")).unwrap();

        let result = result_set(&summary);
        let relocated = result.as_single().unwrap();
        assert!(matches!(relocated, Addr::Relocated(_)));
        assert_eq!(summary.sites().count(), 2);
        let object = summary
            .entries()
            .find(|entry| entry.addr == relocated)
            .unwrap();
        assert_eq!(object.action, Action::Substitute);
        assert_eq!(object.value.as_object().unwrap().class().as_str(), "LClassX;");
        assert!(summary
            .entries()
            .any(|entry| entry.addr == Addr::Register(EXCEPTION_REG)));

        // resolved in an empty caller, the object is a fresh store object
        let mut caller = Frame::new(1, analyzer.config().set_cap);
        let mut table = AllocTable::new(0);
        let resolved = summary::resolve(&summary, &caller, &mut table, adam_code::InstrId::new(100), 1)
            .unwrap();
        caller.apply_in_place(&resolved).unwrap();
        let obj = caller.result().as_single().unwrap();
        assert!(matches!(obj, Addr::Object(_)));
        assert!(caller.field_get(caller.result(), "f").unwrap().contains(Addr::Null));
    }

    #[test]
    fn summaries_are_cached() {
        let program = Program::from_json(PROGRAM).unwrap();
        let make = uid(&program, "LMain;->make()LClassX;");
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        let first = analyzer.analyze_entry(make).unwrap();
        let second = analyzer.analyze_entry(make).unwrap();
        assert_eq!(first, second);
        assert_eq!(analyzer.stats().requests, 2);
        assert_eq!(analyzer.stats().analyses, 1);
        assert_eq!(analyzer.stats().cache_hits, 1);
        assert!(matches!(
            analyzer.summaries().next(),
            Some((_, m, MethodState::Converged(_))) if m == make
        ));
    }

    #[test]
    fn calls_share_the_callee_summary() {
        let program = Program::from_json(PROGRAM).unwrap();
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        let summary = analyzer.analyze_entry(uid(&program, "LMain;->run()LClassX;")).unwrap();
        assert_eq!(analyzer.stats().requests, 3);
        assert_eq!(analyzer.stats().analyses, 2);
        assert_eq!(analyzer.stats().cache_hits, 1);
        assert_eq!(result_set(&summary).nb_addrs(), 1);
        // only the second object and its field escape
        assert_eq!(summary.sites().count(), 2);
    }

    #[test]
    fn allocation_in_a_loop_terminates() {
        let program = Program::from_json(PROGRAM).unwrap();
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        let summary = analyzer.analyze_entry(uid(&program, "LMain;->loop()LClassX;")).unwrap();
        let result = result_set(&summary);
        assert_eq!(result.nb_addrs(), 1);
        let object = summary
            .entries()
            .find(|entry| Some(entry.addr) == result.as_single())
            .and_then(|entry| entry.value.as_object())
            .unwrap();
        assert!(object.is_summary());
        assert_eq!(analyzer.stats().failures, 0);
    }

    #[test]
    fn loop_over_an_unknown_argument_terminates() {
        let program = Program::from_json(NODES).unwrap();
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        let summary = analyzer.analyze_entry(uid(&program, "LMain;->spin(LNode;)LNode;")).unwrap();
        assert_eq!(result_set(&summary).nb_addrs(), 1);
        assert_eq!(analyzer.stats().non_convergences, 0);
        assert_eq!(analyzer.stats().widenings, 0);
        assert_eq!(analyzer.stats().failures, 0);
    }

    #[test]
    fn block_visit_cap_widens_inputs() {
        let program = Program::from_json(PROGRAM).unwrap();
        let config = AnalyzerConfig {
            max_block_visits: 1,
            ..AnalyzerConfig::default()
        };
        let mut analyzer = Analyzer::new(&program, config);
        let summary = analyzer.analyze_entry(uid(&program, "LMain;->loop()LClassX;")).unwrap();
        assert!(analyzer.stats().widenings > 0);
        assert!(analyzer.stats().non_convergences > 0);
        assert_eq!(analyzer.stats().failures, 0);
        assert_eq!(result_set(&summary).nb_addrs(), 1);
    }

    #[test]
    fn growing_recursion_reuses_the_enclosing_summary() {
        let program = Program::from_json(NODES).unwrap();
        let grow = uid(&program, "LMain;->grow(LNode;)V");
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        analyzer.analyze_entry(grow).unwrap();
        assert!(analyzer.stats().recursions >= 1);
        assert!(analyzer.stats().analyses < analyzer.config().max_recursion_rounds);
        assert_eq!(analyzer.stats().non_convergences, 0);
        assert_eq!(analyzer.stats().failures, 0);
        assert_eq!(analyzer.summaries().count(), 1);
        assert!(matches!(
            analyzer.summaries().next(),
            Some((_, m, MethodState::Converged(_))) if m == grow
        ));
    }

    #[test]
    fn recursion_converges() {
        let program = Program::from_json(PROGRAM).unwrap();
        let build = uid(&program, "LMain;->build(I)LClassX;");
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        let summary = analyzer.analyze_entry(build).unwrap();
        assert_eq!(result_set(&summary).nb_addrs(), 1);
        assert!(analyzer.stats().recursions >= 1);
        assert!(analyzer.stats().analyses >= 2);
        assert_eq!(analyzer.stats().failures, 0);
        assert!(analyzer
            .summaries()
            .any(|(_, m, state)| m == build && matches!(state, MethodState::Converged(_))));
    }

    #[test]
    fn failures_are_contained() {
        let program = Program::from_json(PROGRAM).unwrap();
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        let summary = analyzer.analyze_entry(uid(&program, "LMain;->broken()I")).unwrap();
        assert_eq!(analyzer.stats().failures, 1);
        assert_eq!(result_set(&summary).prim(), crate::prim::Prim::POS);
        assert!(analyzer
            .summaries()
            .any(|(_, _, state)| matches!(state, MethodState::Failed(_))));
    }

    #[test]
    fn entry_without_code_is_rejected() {
        let program = Program::from_json(
            r#"{ "classes": [ { "name": "LA;", "methods": [
                { "name": "f", "proto": "()V", "access": ["native"] } ] } ] }"#,
        )
        .unwrap();
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        assert!(analyzer.analyze_entry(uid(&program, "LA;->f()V")).is_err());
    }

    #[test]
    fn file_content_leak_is_found() {
        let program = Program::from_json(LEAK).unwrap();
        let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
        analyzer.analyze_entry(uid(&program, "LMain;->leak()V")).unwrap();
        let findings = analyzer.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].method, "LMain;->leak()V");
        assert!(findings[0].sink.ends_with("->execute"));
        assert!(findings[0].tags.contains(crate::tags::Tag::FILE_NAME));
    }

    const NODES: &str = r#"{ "classes": [
        { "name": "LNode;", "super": "Ljava/lang/Object;", "fields": [ {"name": "next"} ] },
        { "name": "LMain;", "super": "Ljava/lang/Object;", "methods": [
            { "name": "spin", "proto": "(LNode;)LNode;", "access": ["public", "static"],
              "code": { "registers": 3, "ins": 1, "blocks": [
                { "label": "entry", "instrs": [ {"op": "move", "dst": 0, "src": 2} ],
                  "edges": [ {"to": "head", "kind": "seq"} ] },
                { "label": "head", "instrs": [
                    {"op": "new-instance", "dst": 1, "class": "LNode;"},
                    {"op": "move", "dst": 0, "src": 1},
                    {"op": "if", "comp": "eq", "lhs": 1, "rhs": "zero"} ],
                  "edges": [ {"to": "head", "kind": "if-true"}, {"to": "exit", "kind": "if-false"} ] },
                { "label": "exit", "instrs": [ {"op": "return", "reg": 0} ] } ] } },
            { "name": "grow", "proto": "(LNode;)V", "access": ["public", "static"],
              "code": { "registers": 2, "ins": 1, "blocks": [
                { "label": "entry", "instrs": [
                    {"op": "new-instance", "dst": 0, "class": "LNode;"},
                    {"op": "iput", "src": 1, "obj": 0, "field": {"class": "LNode;", "name": "next"}},
                    {"op": "invoke", "kind": "static", "args": [0],
                     "method": {"class": "LMain;", "name": "grow", "proto": "(LNode;)V"}},
                    {"op": "return"} ] } ] } }
        ] }
    ] }"#;

    const LEAK: &str = r#"{ "classes": [
        { "name": "LMain;", "super": "Ljava/lang/Object;", "methods": [
            { "name": "leak", "proto": "()V", "access": ["public", "static"],
              "code": { "registers": 6, "ins": 0, "blocks": [
                { "label": "entry", "instrs": [
                    {"op": "new-instance", "dst": 0, "class": "Ljava/io/FileReader;"},
                    {"op": "const-string", "dst": 1, "value": "/sdcard/secret.txt"},
                    {"op": "invoke", "kind": "direct", "args": [0, 1],
                     "method": {"class": "Ljava/io/FileReader;", "name": "<init>",
                                "proto": "(Ljava/lang/String;)V"}},
                    {"op": "new-instance", "dst": 2, "class": "Ljava/io/BufferedReader;"},
                    {"op": "invoke", "kind": "direct", "args": [2, 0],
                     "method": {"class": "Ljava/io/BufferedReader;", "name": "<init>",
                                "proto": "(Ljava/io/Reader;)V"}},
                    {"op": "invoke", "kind": "virtual", "args": [2],
                     "method": {"class": "Ljava/io/BufferedReader;", "name": "readLine",
                                "proto": "()Ljava/lang/String;"}},
                    {"op": "move-result", "dst": 3},
                    {"op": "new-instance", "dst": 4,
                     "class": "Lorg/apache/http/client/methods/HttpGet;"},
                    {"op": "invoke", "kind": "direct", "args": [4, 3],
                     "method": {"class": "Lorg/apache/http/client/methods/HttpGet;",
                                "name": "<init>", "proto": "(Ljava/lang/String;)V"}},
                    {"op": "new-instance", "dst": 5,
                     "class": "Lorg/apache/http/impl/client/DefaultHttpClient;"},
                    {"op": "invoke", "kind": "direct", "args": [5],
                     "method": {"class": "Lorg/apache/http/impl/client/DefaultHttpClient;",
                                "name": "<init>", "proto": "()V"}},
                    {"op": "invoke", "kind": "interface", "args": [5, 4],
                     "method": {"class": "Lorg/apache/http/client/HttpClient;", "name": "execute",
                                "proto": "(Lorg/apache/http/client/methods/HttpUriRequest;)Lorg/apache/http/HttpResponse;"}},
                    {"op": "return"} ] } ] } }
        ] }
    ] }"#;
}
