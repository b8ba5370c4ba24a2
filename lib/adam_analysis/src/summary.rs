//! Method summaries: export from a callee, resolution into a caller.
//!
//! A summary is a [`Diff`] over the caller-visible state: result and
//! exception registers, static field cells and the heap of the calling
//! context. Objects allocated during the analysis of the callee are exported
//! under relocated addresses, the diff carrying the allocation key of each of
//! them. Resolving the summary in a caller interns these keys, extended with
//! the call site, in the caller allocation table.

use crate::addr::{Addr, EXCEPTION_REG, RESULT_REG};
use crate::alloctab::AllocTable;
use crate::diff::{Action, Diff};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::frame::Frame;
use crate::value::{AliasSet, Value};
use adam_code::InstrId;
use std::collections::{BTreeMap, BTreeSet};

/// Builds the summary of a method analysis, from its `initial` and `exit`
/// frames and the allocation `table` of the analysis.
pub fn export(initial: &Frame, exit: &Frame, table: &AllocTable) -> AnalysisResult<Diff> {
    let cap = exit.cap();
    let store = exit.store();
    let mut diff = Diff::new();
    let mut sites = BTreeSet::new();

    let mut relocate = |addr: Addr| -> AnalysisResult<Addr> {
        if !table.is_fresh(addr) {
            return Ok(addr);
        }
        match table.query(store, addr) {
            Some(Addr::Relocated(r)) => {
                sites.insert(r);
                Ok(Addr::Relocated(r))
            }
            _ => Err(AnalysisError::InvalidAddress {
                addr,
                reason: "fresh object unknown to the allocation table",
            }),
        }
    };

    let mut roots = Vec::new();
    for (reg, set) in [(RESULT_REG, exit.result()), (EXCEPTION_REG, exit.exception())] {
        roots.extend(set.addrs());
        diff.record_substitute(
            Addr::Register(reg),
            Value::Set(set.map_addrs(&mut relocate, cap)?),
        );
    }
    let before: BTreeMap<u32, &AliasSet> = initial.statics().collect();
    for (idx, set) in exit.statics() {
        if before.get(&idx) != Some(&set) {
            roots.extend(set.addrs());
            diff.record_substitute(
                Addr::static_field(idx as usize),
                Value::Set(set.map_addrs(&mut relocate, cap)?),
            );
        }
    }
    for (addr, value) in store.iter() {
        if table.is_fresh(addr) {
            continue;
        }
        if initial.store_get(addr)? != Some(value) {
            roots.extend(value.referenced());
            diff.record_substitute(addr, value.map_addrs(&mut relocate, cap)?);
        }
    }
    for addr in exit.reachable(roots) {
        if !table.is_fresh(addr) {
            continue;
        }
        if let Some(value) = store.get(addr)? {
            let local = relocate(addr)?;
            diff.record_substitute(local, value.map_addrs(&mut relocate, cap)?);
        }
    }

    for r in sites {
        let key = table.key_of(r).ok_or(AnalysisError::InvalidAddress {
            addr: Addr::Relocated(r),
            reason: "relocated address without allocation key",
        })?;
        diff.record_site(r, key.clone());
    }
    Ok(diff)
}

/// Translates a summary into the address space of `caller`.
///
/// Allocation keys are extended with `call_site` and bounded to `depth`
/// call sites. Objects that already live in the caller store, or that two
/// relocated addresses of the summary designate, become summary objects and
/// are joined instead of replaced.
pub fn resolve(
    summary: &Diff,
    caller: &Frame,
    table: &mut AllocTable,
    call_site: InstrId,
    depth: usize,
) -> AnalysisResult<Diff> {
    let cap = caller.cap();
    let mut mapping = BTreeMap::new();
    let mut res = Diff::new();
    for (r, key) in summary.sites() {
        let (_, obj) = table.allocate(caller.store(), key.called_from(call_site, depth))?;
        mapping.insert(r, obj);
    }

    let translate = |addr: Addr| -> AnalysisResult<Addr> {
        match addr {
            Addr::Relocated(Addr::TOP_INDEX) => Ok(Addr::OBJECT_TOP),
            Addr::Relocated(r) => mapping.get(&r).copied().ok_or(AnalysisError::InvalidAddress {
                addr,
                reason: "relocated address without allocation key",
            }),
            _ => Ok(addr),
        }
    };

    let mut targeted = BTreeSet::new();
    for entry in summary.entries() {
        let value = entry.value.map_addrs(translate, cap)?;
        match entry.addr {
            Addr::Relocated(_) => {
                let addr = translate(entry.addr)?;
                let shared = caller.store_get(addr)?.is_some() || !targeted.insert(addr);
                match value {
                    Value::Object(mut object) if shared => {
                        object.mark_summary();
                        res.record_merge(addr, Value::Object(object));
                    }
                    value if shared => res.record_merge(addr, value),
                    value => res.record_substitute(addr, value),
                }
            }
            addr => match entry.action {
                Action::Substitute => res.record_substitute(addr, value),
                Action::Merge => res.record_merge(addr, value),
            },
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloctab::AllocKey;
    use crate::context::CallContext;
    use adam_code::{Name, Reg};

    const CAP: usize = 8;

    /// Analysis of a callee allocating one `LFoo;` and returning it.
    fn callee_summary() -> Diff {
        let ctx = CallContext::unknown(0);
        let initial = Frame::new(1, CAP);
        let mut exit = initial.fork();
        let mut table = AllocTable::new(ctx.base());
        let obj = exit
            .store_new_object(
                &mut table,
                &AllocKey::new(InstrId::new(10)),
                &Name::new("LFoo;"),
                &[Name::new("bar")],
            )
            .unwrap();
        exit.write(Reg::from(0), AliasSet::singleton(obj)).unwrap();
        exit.set_result(AliasSet::singleton(obj));
        export(&initial, &exit, &table).unwrap()
    }

    #[test]
    fn fresh_objects_are_relocated() {
        let summary = callee_summary();
        assert_eq!(summary.sites().count(), 2);
        let reduced = summary.reduced(CAP).unwrap();
        let (_, result) = &reduced[&Addr::Register(RESULT_REG)];
        let target = result.as_set().unwrap().as_single().unwrap();
        assert!(matches!(target, Addr::Relocated(_)));
        let (action, object) = &reduced[&target];
        assert_eq!(*action, Action::Substitute);
        assert_eq!(object.as_object().unwrap().class().as_str(), "LFoo;");
        // general registers are not part of the summary
        assert!(!reduced.contains_key(&Addr::general(0)));
    }

    #[test]
    fn resolution_is_stable() {
        let summary = callee_summary();
        let mut caller = Frame::new(2, CAP);
        let mut table = AllocTable::new(0);
        let site = InstrId::new(20);

        let first = resolve(&summary, &caller, &mut table, site, 1).unwrap();
        caller.apply_in_place(&first).unwrap();
        let obj = caller.result().as_single().unwrap();
        let object = caller.store_get(obj).unwrap().unwrap().as_object().unwrap();
        assert!(!object.is_summary());

        // same call site again: same address, now a summary object
        let second = resolve(&summary, &caller, &mut table, site, 1).unwrap();
        caller.apply_in_place(&second).unwrap();
        assert_eq!(caller.result().as_single(), Some(obj));
        let object = caller.store_get(obj).unwrap().unwrap().as_object().unwrap();
        assert!(object.is_summary());

        // another call site: another object
        let third = resolve(&summary, &caller, &mut table, InstrId::new(21), 1).unwrap();
        caller.apply_in_place(&third).unwrap();
        assert_ne!(caller.result().as_single(), Some(obj));
    }
}
