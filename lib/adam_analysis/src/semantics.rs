//! Abstract semantics of the instructions.

use crate::addr::Addr;
use crate::alloctab::AllocKey;
use crate::builtins::BuiltinEnv;
use crate::context::CallContext;
use crate::diff::Diff;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::frame::Frame;
use crate::method::{Analyzer, MethodRun};
use crate::prim::Prim;
use crate::summary;
use crate::value::{AliasSet, Value};
use adam_code::instrs::Operand;
use adam_code::{FieldRef, Instr, InstrId, InvokeKind, LabeledInstr, Method, MethodRef, Name, Reg};
use std::collections::BTreeSet;

/// Field holding the elements of an array.
const ELEMENTS: &str = "$elements";
/// Field holding the characters of a string.
const CONTENT: &str = "$content";
const STRING: &str = "Ljava/lang/String;";

/// Possible callee of an invocation.
#[derive(Debug, Clone)]
enum Target<'p> {
    /// A method of the program, with code.
    Method(&'p Method),
    /// A modeled library class.
    Builtin(Name),
    Unknown,
}

impl PartialEq for Target<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Method(m1), Self::Method(m2)) => m1.uid() == m2.uid(),
            (Self::Builtin(c1), Self::Builtin(c2)) => c1 == c2,
            (Self::Unknown, Self::Unknown) => true,
            _ => false,
        }
    }
}

fn operand(frame: &Frame, op: Operand) -> AnalysisResult<AliasSet> {
    match op {
        Operand::Reg(reg) => frame.read(reg),
        Operand::Lit(v) => Ok(AliasSet::from_prim(Prim::from_const(v))),
        Operand::Zero => Ok(AliasSet::from_prim(Prim::from_const(0))),
    }
}

/// Primitive result of an operation on `inputs`, tagged with their tags.
fn derived(prim: Prim, inputs: &[&AliasSet]) -> AliasSet {
    let mut res = AliasSet::from_prim(prim);
    for input in inputs {
        res.add_tags(input.tags());
    }
    res
}

impl<'p> Analyzer<'p> {
    pub(crate) fn transfer(
        &mut self,
        run: &mut MethodRun,
        frame: &mut Frame,
        linstr: &'p LabeledInstr,
    ) -> AnalysisResult<()> {
        let site = linstr.id();
        match linstr.instr() {
            Instr::Nop
            | Instr::Goto
            | Instr::If { .. }
            | Instr::Switch { .. }
            | Instr::Monitor { .. }
            | Instr::CheckCast { .. } => (),

            Instr::Move { dst, src } => {
                let value = frame.read(*src)?;
                frame.write(*dst, value)?;
            }
            Instr::MoveResult { dst } => {
                let value = frame.result().clone();
                frame.write(*dst, value)?;
            }
            Instr::MoveException { dst } => {
                let value = frame.exception().clone();
                frame.write(*dst, value)?;
            }
            Instr::Return { reg } => {
                let value = match reg {
                    Some(reg) => frame.read(*reg)?,
                    None => AliasSet::empty(),
                };
                frame.set_result(value);
                frame.set_exception(AliasSet::empty());
            }
            Instr::Throw { reg } => {
                let value = frame.read(*reg)?;
                frame.set_exception(value);
                frame.set_result(AliasSet::empty());
            }

            Instr::Const { dst, value: 0 } => frame.write(*dst, AliasSet::zeroed())?,
            Instr::Const { dst, value } => {
                frame.write(*dst, AliasSet::from_prim(Prim::from_const(*value)))?;
            }
            Instr::ConstString { dst, .. } => {
                let obj = AliasSet::singleton(self.allocate(run, frame, site, &Name::new(STRING))?);
                frame.field_put(
                    &mut run.table,
                    site,
                    &obj,
                    &Name::new(CONTENT),
                    &AliasSet::from_prim(Prim::any()),
                )?;
                frame.write(*dst, obj)?;
            }
            Instr::NewInstance { dst, class } => {
                let obj = self.allocate(run, frame, site, class)?;
                frame.write(*dst, AliasSet::singleton(obj))?;
            }
            Instr::NewArray { dst, class, .. } => {
                let obj = frame.store_new_object(
                    &mut run.table,
                    &AllocKey::new(site),
                    class,
                    &[Name::new(ELEMENTS)],
                )?;
                frame.write(*dst, AliasSet::singleton(obj))?;
            }
            Instr::InstanceOf { dst, src, .. } => {
                let src = frame.read(*src)?;
                let prim = Prim::from_const(0) | Prim::from_const(1);
                frame.write(*dst, derived(prim, &[&src]))?;
            }
            Instr::ArrayLength { dst, array } => {
                let array = frame.read(*array)?;
                frame.write(*dst, derived(Prim::ZERO | Prim::POS, &[&array]))?;
            }

            Instr::IGet { dst, obj, field } => {
                let obj = frame.read(*obj)?;
                let value = frame.field_get(&obj, &field.name)?;
                frame.write(*dst, value)?;
            }
            Instr::IPut { src, obj, field } => {
                let obj = frame.read(*obj)?;
                let value = frame.read(*src)?;
                frame.field_put(&mut run.table, site, &obj, &field.name, &value)?;
            }
            Instr::SGet { dst, field } => {
                let value = match self.static_cell(field) {
                    Some(cell) => frame.register_load(cell)?,
                    None => {
                        self.stats.unresolved += 1;
                        log::debug!("{}: unresolved static field {field}", run.descriptor);
                        AliasSet::unknown()
                    }
                };
                frame.write(*dst, value)?;
            }
            Instr::SPut { src, field } => {
                let value = frame.read(*src)?;
                match self.static_cell(field) {
                    Some(cell) => frame.register_store(cell, value)?,
                    None => {
                        self.stats.unresolved += 1;
                        log::debug!("{}: write to unresolved {field} dropped", run.descriptor);
                    }
                }
            }
            Instr::AGet { dst, array, .. } => {
                let array = frame.read(*array)?;
                let value = frame.field_get(&array, ELEMENTS)?;
                frame.write(*dst, value)?;
            }
            Instr::APut { src, array, .. } => {
                // the index is not tracked: all the writes are weak
                let array = frame.read(*array)?;
                let value = frame.read(*src)?;
                let old = frame.field_get(&array, ELEMENTS)?;
                let new = old.join(&value, frame.cap());
                frame.field_put(&mut run.table, site, &array, &Name::new(ELEMENTS), &new)?;
            }

            Instr::Unop { kind, dst, src } => {
                let src = frame.read(*src)?;
                frame.write(*dst, derived(src.prim().unop(*kind), &[&src]))?;
            }
            Instr::Binop { kind, dst, lhs, rhs } => {
                let lhs = frame.read(*lhs)?;
                let rhs = operand(frame, *rhs)?;
                let prim = lhs.prim().binop(*kind, rhs.prim());
                frame.write(*dst, derived(prim, &[&lhs, &rhs]))?;
            }
            Instr::Cmp { dst, lhs, rhs } => {
                let lhs = frame.read(*lhs)?;
                let rhs = frame.read(*rhs)?;
                let prim = lhs.prim().compare(rhs.prim());
                frame.write(*dst, derived(prim, &[&lhs, &rhs]))?;
            }

            Instr::Invoke { kind, method, args } => {
                self.invoke(run, frame, site, *kind, method, args)?;
            }
        }
        Ok(())
    }

    /// Allocates an object of `class` at `site`. Its fields are the
    /// instance fields of the program class and the fields of the first
    /// modeled ancestor.
    fn allocate(
        &self,
        run: &mut MethodRun,
        frame: &mut Frame,
        site: InstrId,
        class: &Name,
    ) -> AnalysisResult<Addr> {
        let program = self.program;
        let mut layout = program.instance_layout(class);
        if let Some(modeled) = program
            .superclass_chain(class)
            .find(|cname| self.builtins.provides(cname))
        {
            layout.extend(self.builtins.layout(modeled));
        }
        frame.store_new_object(&mut run.table, &AllocKey::new(site), class, &layout)
    }

    fn static_cell(&self, field: &FieldRef) -> Option<Addr> {
        self.program
            .resolve_field(&field.class, &field.name)
            .filter(|field| field.is_static())
            .map(|field| Addr::static_field(field.uid().idx()))
    }

    /// Resolves `class->name proto`: the first definition with code along the
    /// superclass chain, or the first modeled ancestor.
    fn resolve_target(&self, class: &Name, mref: &MethodRef) -> Target<'p> {
        let program = self.program;
        for cname in program.superclass_chain(class) {
            if let Some(method) = program
                .get_class(cname)
                .and_then(|c| c.get_method(&mref.name, &mref.proto, program))
            {
                if method.code().is_some() {
                    return Target::Method(method);
                }
            }
            if self.builtins.provides(cname) {
                return Target::Builtin(cname.clone());
            }
        }
        Target::Unknown
    }

    /// Possible callees of a call. Virtual calls are dispatched on the
    /// classes of the receiver objects, unknown receivers fall back to the
    /// declared class.
    fn targets(
        &self,
        frame: &Frame,
        kind: InvokeKind,
        mref: &MethodRef,
        args: &[AliasSet],
    ) -> AnalysisResult<Vec<Target<'p>>> {
        let receiver = match (kind, args.first()) {
            (InvokeKind::Virtual | InvokeKind::Interface, Some(receiver)) => receiver,
            _ => return Ok(vec![self.resolve_target(&mref.class, mref)]),
        };
        let mut classes = BTreeSet::new();
        for obj in receiver.objects() {
            if let Some(Value::Object(object)) = frame.store_get(obj)? {
                classes.insert(object.class().clone());
            }
        }
        if classes.is_empty() || receiver.contains(Addr::OBJECT_TOP) {
            classes.insert(mref.class.clone());
        }

        let mut targets = Vec::new();
        for class in &classes {
            let target = self.resolve_target(class, mref);
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    fn invoke(
        &mut self,
        run: &mut MethodRun,
        frame: &mut Frame,
        site: InstrId,
        kind: InvokeKind,
        mref: &MethodRef,
        args: &[Reg],
    ) -> AnalysisResult<()> {
        let values = args
            .iter()
            .map(|reg| frame.read(*reg))
            .collect::<AnalysisResult<Vec<_>>>()?;
        frame.set_result(AliasSet::empty());
        frame.set_exception(AliasSet::empty());

        let targets = self.targets(frame, kind, mref, &values)?;
        if let [target] = targets.as_slice() {
            return self.call(run, frame, site, mref, target, &values);
        }

        log::debug!("{site}: {} possible targets for {mref}", targets.len());
        let mut joined: Option<Frame> = None;
        for target in &targets {
            let mut fork = frame.fork();
            self.call(run, &mut fork, site, mref, target, &values)?;
            joined = match joined {
                Some(mut joined) => {
                    joined.join(&fork)?;
                    Some(joined)
                }
                None => Some(fork),
            };
        }
        if let Some(joined) = joined {
            *frame = joined;
        }
        Ok(())
    }

    fn call(
        &mut self,
        run: &mut MethodRun,
        frame: &mut Frame,
        site: InstrId,
        mref: &MethodRef,
        target: &Target<'p>,
        values: &[AliasSet],
    ) -> AnalysisResult<()> {
        match target {
            Target::Method(method) => {
                log::debug!("{site}: call to {}", method.descriptor());
                let ctx = CallContext::build(frame, values.to_vec());
                let summary = self.analyze_call(method.uid(), ctx)?;
                let resolved = summary::resolve(
                    &summary,
                    frame,
                    &mut run.table,
                    site,
                    self.config.context_depth,
                )?;
                frame.apply_in_place(&resolved)
            }
            Target::Builtin(class) => {
                let model = self.builtins.get(class).ok_or_else(|| {
                    AnalysisError::UnresolvedSymbol(format!("no model for {class}"))
                })?;
                let handled = {
                    let mut env = BuiltinEnv {
                        frame: &mut *frame,
                        table: &mut run.table,
                        builtins: &self.builtins,
                        findings: &mut self.findings,
                        caller: &run.descriptor,
                        site,
                        args: values,
                    };
                    model.invoke(&mut env, class, &mref.name, &mref.proto)?
                };
                if handled {
                    log::trace!("{site}: {mref} modeled by {class}");
                    Ok(())
                } else {
                    self.unknown_call(run, frame, site, mref, values)
                }
            }
            Target::Unknown => self.unknown_call(run, frame, site, mref, values),
        }
    }

    /// Applies the effect of a call to an unknown method: the result is
    /// unknown and carries every tag the callee can see.
    fn unknown_call(
        &mut self,
        run: &MethodRun,
        frame: &mut Frame,
        site: InstrId,
        mref: &MethodRef,
        values: &[AliasSet],
    ) -> AnalysisResult<()> {
        self.stats.unresolved += 1;
        log::debug!("{} {site}: unknown call to {mref}", run.descriptor);
        let tags = frame.reachable_tags(values);
        frame.apply_in_place(&Diff::unknown_effect(&tags))
    }
}
