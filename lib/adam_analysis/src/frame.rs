//! Activation frames.
//!
//! A frame gathers the registers of one method activation (result and
//! exception registers, Dalvik registers, static field cells) and the store
//! it currently sees. Every mutation goes through the frame and is recorded
//! in its journal, a [`Diff`] that can be inspected or taken at any time.

use crate::addr::{Addr, EXCEPTION_REG, RESULT_REG, STATIC_BASE};
use crate::alloctab::{AllocKey, AllocTable};
use crate::diff::{Action, Diff};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::store::Store;
use crate::tags::TagSet;
use crate::value::{AliasSet, Object, Value};
use adam_code::{InstrId, Name, Reg};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Frame {
    regs: Vec<AliasSet>,
    statics: BTreeMap<u32, AliasSet>,
    store: Store,
    journal: Diff,
    cap: usize,
}

impl Frame {
    /// Creates a frame with `registers_size` Dalvik registers over a new
    /// empty store.
    #[must_use]
    pub fn new(registers_size: u16, cap: usize) -> Self {
        Self::with_store(registers_size, Store::empty(), cap)
    }

    #[must_use]
    pub fn with_store(registers_size: u16, store: Store, cap: usize) -> Self {
        Self {
            regs: vec![AliasSet::empty(); registers_size as usize + 2],
            statics: BTreeMap::new(),
            store,
            journal: Diff::new(),
            cap,
        }
    }

    #[inline]
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }

    /// Number of Dalvik registers.
    #[inline]
    #[must_use]
    pub fn registers_size(&self) -> u16 {
        (self.regs.len() - 2) as u16
    }

    #[inline]
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    #[inline]
    #[must_use]
    pub const fn journal(&self) -> &Diff {
        &self.journal
    }

    /// Returns the mutations recorded so far and starts a new journal.
    pub fn take_journal(&mut self) -> Diff {
        std::mem::take(&mut self.journal)
    }

    /// Static field cells known by the frame, by field index.
    pub fn statics(&self) -> impl Iterator<Item = (u32, &AliasSet)> {
        self.statics.iter().map(|(idx, set)| (*idx, set))
    }

    fn reg_index(&self, addr: Addr) -> AnalysisResult<usize> {
        match addr {
            Addr::Register(i) if i < STATIC_BASE && (i as usize) < self.regs.len() => {
                Ok(i as usize)
            }
            _ => Err(AnalysisError::InvalidAddress {
                addr,
                reason: "no such register in the frame",
            }),
        }
    }

    /// Reads a register cell, or an alias set held in the store.
    ///
    /// Static field cells that the frame never saw hold an unknown value.
    pub fn register_load(&self, addr: Addr) -> AnalysisResult<AliasSet> {
        match addr {
            Addr::Register(i) if i >= STATIC_BASE => Ok(self
                .statics
                .get(&(i - STATIC_BASE))
                .cloned()
                .unwrap_or_else(AliasSet::unknown)),
            Addr::Register(_) => Ok(self.regs[self.reg_index(addr)?].clone()),
            Addr::Object(_) => match self.store.get(addr)? {
                Some(Value::Set(set)) => Ok(set.clone()),
                Some(Value::Object(_)) => Err(AnalysisError::InvalidAddress {
                    addr,
                    reason: "slot holds an object, not an alias set",
                }),
                None => Ok(AliasSet::empty()),
            },
            Addr::Relocated(_) | Addr::Null => Err(AnalysisError::InvalidAddress {
                addr,
                reason: "cannot be loaded from a frame",
            }),
        }
    }

    fn cell_mut(&mut self, addr: Addr) -> AnalysisResult<&mut AliasSet> {
        match addr {
            Addr::Register(i) if i >= STATIC_BASE => Ok(self
                .statics
                .entry(i - STATIC_BASE)
                .or_insert_with(AliasSet::unknown)),
            _ => {
                let idx = self.reg_index(addr)?;
                Ok(&mut self.regs[idx])
            }
        }
    }

    pub fn register_store(&mut self, addr: Addr, set: AliasSet) -> AnalysisResult<()> {
        *self.cell_mut(addr)? = set.clone();
        self.journal.record_substitute(addr, Value::Set(set));
        Ok(())
    }

    /// Joins `set` into a register cell, returns `true` if the cell changed.
    pub fn register_merge(&mut self, addr: Addr, set: &AliasSet) -> AnalysisResult<bool> {
        let cap = self.cap;
        let changed = self.cell_mut(addr)?.join_with(set, cap);
        self.journal.record_merge(addr, Value::Set(set.clone()));
        Ok(changed)
    }

    pub fn read(&self, reg: Reg) -> AnalysisResult<AliasSet> {
        self.register_load(Addr::general(reg.value()))
    }

    pub fn write(&mut self, reg: Reg, set: AliasSet) -> AnalysisResult<()> {
        self.register_store(Addr::general(reg.value()), set)
    }

    #[inline]
    #[must_use]
    pub fn result(&self) -> &AliasSet {
        &self.regs[RESULT_REG as usize]
    }

    #[inline]
    #[must_use]
    pub fn exception(&self) -> &AliasSet {
        &self.regs[EXCEPTION_REG as usize]
    }

    pub fn set_result(&mut self, set: AliasSet) {
        self.regs[RESULT_REG as usize] = set.clone();
        self.journal
            .record_substitute(Addr::Register(RESULT_REG), Value::Set(set));
    }

    pub fn set_exception(&mut self, set: AliasSet) {
        self.regs[EXCEPTION_REG as usize] = set.clone();
        self.journal
            .record_substitute(Addr::Register(EXCEPTION_REG), Value::Set(set));
    }

    pub fn store_get(&self, addr: Addr) -> AnalysisResult<Option<&Value>> {
        self.store.get(addr)
    }

    pub fn store_put(&mut self, addr: Addr, value: Value) -> AnalysisResult<()> {
        self.store.put(addr, value.clone())?;
        self.journal.record_substitute(addr, value);
        Ok(())
    }

    /// Joins `value` into a store slot, returns `true` if the slot changed.
    pub fn store_merge(&mut self, addr: Addr, value: &Value) -> AnalysisResult<bool> {
        let changed = self.store.merge_into(addr, value, self.cap)?;
        self.journal.record_merge(addr, value.clone());
        Ok(changed)
    }

    /// Allocates the object of `key`, of class `class` with fields `layout`.
    ///
    /// The same key always yields the same address. Allocating again an
    /// object that already lives in the store turns it into a summary object
    /// and joins fresh field values into its slots.
    pub fn store_new_object(
        &mut self,
        table: &mut AllocTable,
        key: &AllocKey,
        class: &Name,
        layout: &[Name],
    ) -> AnalysisResult<Addr> {
        let (_, obj) = table.allocate(&self.store, key.clone())?;
        let current = self.store.get(obj)?.cloned();
        let mut object = match current {
            Some(Value::Object(mut existing)) => {
                if existing.mark_summary() {
                    log::trace!("{obj} ({class}) allocated again, now a summary");
                }
                for (_, slot) in existing.fields() {
                    self.store_merge(slot, &Value::Set(AliasSet::zeroed()))?;
                }
                existing
            }
            Some(Value::Set(_)) => {
                return Err(AnalysisError::InvalidAddress {
                    addr: obj,
                    reason: "allocation slot already holds an alias set",
                })
            }
            None => Object::new(class.clone(), BTreeMap::new()),
        };
        for name in layout {
            if object.field(name).is_none() {
                let (_, slot) = table.allocate(&self.store, key.with_field(name.clone()))?;
                self.store_put(slot, Value::Set(AliasSet::zeroed()))?;
                object.set_field(name.clone(), slot);
            }
        }
        self.store_put(obj, Value::Object(object))?;
        Ok(obj)
    }

    /// Joins the values of `field` in every object of `set`.
    ///
    /// Unknown objects give an unknown value carrying the tags of `set`,
    /// `null` is skipped.
    pub fn field_get(&self, set: &AliasSet, field: &str) -> AnalysisResult<AliasSet> {
        let unknown = AliasSet::unknown().with_tags(set.tags());
        let mut res = AliasSet::empty();
        for addr in set.addrs() {
            match addr {
                Addr::Null => (),
                Addr::Object(_) if addr.is_top() => {
                    res.join_with(&unknown, self.cap);
                }
                Addr::Object(_) => {
                    let slot = self
                        .store
                        .get(addr)?
                        .and_then(Value::as_object)
                        .and_then(|obj| obj.field(field));
                    match slot {
                        Some(slot) => {
                            let value = self.register_load(slot)?;
                            res.join_with(&value, self.cap);
                        }
                        None => {
                            log::trace!("{addr} has no field {field}");
                            res.join_with(&unknown, self.cap);
                        }
                    }
                }
                Addr::Register(_) | Addr::Relocated(_) => {
                    return Err(AnalysisError::InvalidAddress {
                        addr,
                        reason: "alias sets only hold objects and null",
                    })
                }
            }
        }
        Ok(res)
    }

    /// Writes `value` in `field` of every object of `set`.
    ///
    /// The update is strong when `set` designates a single object that is
    /// not a summary, weak otherwise. A field missing from an object gets a
    /// new slot, keyed by the object allocation key when the object was
    /// allocated through `table`, by `site` otherwise. Writes through
    /// unknown objects are dropped.
    pub fn field_put(
        &mut self,
        table: &mut AllocTable,
        site: InstrId,
        set: &AliasSet,
        field: &Name,
        value: &AliasSet,
    ) -> AnalysisResult<()> {
        let single = set.as_single();
        for addr in set.objects() {
            let object = match self.store.get(addr)? {
                Some(Value::Object(object)) => object.clone(),
                _ => {
                    return Err(AnalysisError::InvalidAddress {
                        addr,
                        reason: "field access on a slot that is not an object",
                    })
                }
            };
            let strong = single == Some(addr) && !object.is_summary();
            match object.field(field) {
                Some(slot) if strong => self.store_put(slot, Value::Set(value.clone()))?,
                Some(slot) => {
                    self.store_merge(slot, &Value::Set(value.clone()))?;
                }
                None => {
                    let key = match table.query(&self.store, addr) {
                        Some(Addr::Relocated(r)) => table.key_of(r).cloned(),
                        _ => None,
                    }
                    .unwrap_or_else(|| AllocKey::new(site))
                    .with_field(field.clone());
                    let (_, slot) = table.allocate(&self.store, key)?;
                    let initial = if strong {
                        value.clone()
                    } else {
                        AliasSet::zeroed().join(value, self.cap)
                    };
                    self.store_put(slot, Value::Set(initial))?;
                    let mut object = object;
                    object.set_field(field.clone(), slot);
                    self.store_put(addr, Value::Object(object))?;
                }
            }
        }
        if set.contains(Addr::OBJECT_TOP) {
            log::trace!("write to {field} of an unknown object dropped");
        }
        Ok(())
    }

    /// Store addresses reachable from `roots`, field slots included.
    #[must_use]
    pub fn reachable<I: IntoIterator<Item = Addr>>(&self, roots: I) -> BTreeSet<Addr> {
        let mut seen = BTreeSet::new();
        let mut todo: Vec<Addr> = roots.into_iter().collect();
        while let Some(addr) = todo.pop() {
            if !matches!(addr, Addr::Object(_)) || addr.is_top() || !seen.insert(addr) {
                continue;
            }
            if let Ok(Some(value)) = self.store.get(addr) {
                todo.extend(value.referenced());
            }
        }
        seen
    }

    /// Union of the tags carried by `sets` and by everything reachable from
    /// them.
    #[must_use]
    pub fn reachable_tags(&self, sets: &[AliasSet]) -> TagSet {
        let mut tags = TagSet::new();
        for set in sets {
            tags.union_with(set.tags());
        }
        let roots = sets.iter().flat_map(AliasSet::addrs);
        for addr in self.reachable(roots) {
            if let Ok(Some(Value::Set(set))) = self.store.get(addr) {
                tags.union_with(set.tags());
            }
        }
        tags
    }

    /// Logical copy of the frame, sharing the store until the first write.
    #[inline]
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Pointwise join of `other` into `self`, returns `true` if `self`
    /// changed.
    pub fn join(&mut self, other: &Self) -> AnalysisResult<bool> {
        if self.regs.len() != other.regs.len() {
            return Err(AnalysisError::ArgumentError(format!(
                "cannot join frames of {} and {} registers",
                self.registers_size(),
                other.registers_size()
            )));
        }
        let mut changed = false;
        for (i, (mine, theirs)) in self.regs.iter_mut().zip(&other.regs).enumerate() {
            if mine.join_with(theirs, self.cap) {
                changed = true;
                self.journal
                    .record_merge(Addr::Register(i as u32), Value::Set(theirs.clone()));
            }
        }

        // a cell missing on one side is unknown on this side
        let keys: BTreeSet<u32> = self
            .statics
            .keys()
            .chain(other.statics.keys())
            .copied()
            .collect();
        for idx in keys {
            let theirs = other
                .statics
                .get(&idx)
                .cloned()
                .unwrap_or_else(AliasSet::unknown);
            let mine = self.statics.entry(idx).or_insert_with(AliasSet::unknown);
            if mine.join_with(&theirs, self.cap) {
                changed = true;
                self.journal
                    .record_merge(Addr::Register(STATIC_BASE + idx), Value::Set(theirs));
            }
        }

        changed |= self.store.join_with(&other.store, self.cap)?;
        Ok(changed)
    }

    /// Widens every register, cell and store alias set that differs from
    /// `old`. Returns the number of widened locations.
    pub fn widen_changed(&mut self, old: &Self) -> usize {
        let mut count = 0;
        for (i, set) in self.regs.iter_mut().enumerate() {
            if old.regs.get(i) != Some(&*set) {
                *set = set.widened();
                count += 1;
            }
        }
        for (idx, set) in &mut self.statics {
            if old.statics.get(idx) != Some(&*set) {
                *set = set.widened();
                count += 1;
            }
        }
        let changed: Vec<(Addr, AliasSet)> = self
            .store
            .iter()
            .filter_map(|(addr, value)| {
                let set = value.as_set()?;
                match old.store.get(addr) {
                    Ok(Some(Value::Set(prev))) if prev == set => None,
                    _ => Some((addr, set.widened())),
                }
            })
            .collect();
        for (addr, set) in changed {
            // the address comes from the store itself
            if self.store.put(addr, Value::Set(set)).is_ok() {
                count += 1;
            }
        }
        count
    }

    /// Returns the frame obtained by applying `diff` to `self`.
    pub fn apply(&self, diff: &Diff) -> AnalysisResult<Self> {
        let mut res = self.fork();
        res.apply_in_place(diff)?;
        Ok(res)
    }

    pub fn apply_in_place(&mut self, diff: &Diff) -> AnalysisResult<()> {
        for entry in diff.entries() {
            match (entry.addr, entry.action, &entry.value) {
                (Addr::Register(_), Action::Substitute, Value::Set(set)) => {
                    self.register_store(entry.addr, set.clone())?;
                }
                (Addr::Register(_), Action::Merge, Value::Set(set)) => {
                    self.register_merge(entry.addr, set)?;
                }
                (Addr::Register(_), _, Value::Object(_)) => {
                    return Err(AnalysisError::InvalidAddress {
                        addr: entry.addr,
                        reason: "registers only hold alias sets",
                    })
                }
                (Addr::Object(_), Action::Substitute, value) => {
                    self.store_put(entry.addr, value.clone())?;
                }
                (Addr::Object(_), Action::Merge, value) => {
                    self.store_merge(entry.addr, value)?;
                }
                (Addr::Relocated(_) | Addr::Null, _, _) => {
                    return Err(AnalysisError::InvalidAddress {
                        addr: entry.addr,
                        reason: "diff entries must be resolved before application",
                    })
                }
            }
        }
        Ok(())
    }
}

/// Frames are equal when their registers, cells and stores are; journals
/// are not compared.
impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.regs == other.regs && self.statics == other.statics && self.store == other.store
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "  result = {}", self.result())?;
        writeln!(f, "  exception = {}", self.exception())?;
        for (i, set) in self.regs.iter().enumerate().skip(2) {
            if !set.is_empty() {
                writeln!(f, "  v{} = {set}", i - 2)?;
            }
        }
        for (idx, set) in &self.statics {
            writeln!(f, "  static:{idx} = {set}")?;
        }
        write!(f, "{}", self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::Tag;

    const CAP: usize = 8;

    fn layout() -> Vec<Name> {
        vec![Name::new("next"), Name::new("value")]
    }

    #[test]
    fn allocation_identity() {
        let mut frame = Frame::new(2, CAP);
        let mut table = AllocTable::new(frame.store().high_water());
        let key = AllocKey::new(InstrId::new(3));
        let class = Name::new("LNode;");
        let a1 = frame.store_new_object(&mut table, &key, &class, &layout()).unwrap();
        let a2 = frame.store_new_object(&mut table, &key, &class, &layout()).unwrap();
        assert_eq!(a1, a2);

        let object = frame.store_get(a1).unwrap().unwrap().as_object().unwrap();
        assert!(object.is_summary());
        assert_eq!(object.class(), &class);
        let slot = object.field("next").unwrap();
        assert_eq!(frame.register_load(slot).unwrap(), AliasSet::zeroed());

        let other = AllocKey::new(InstrId::new(4));
        let a3 = frame.store_new_object(&mut table, &other, &class, &[]).unwrap();
        assert_ne!(a1, a3);
        let fresh = frame.store_get(a3).unwrap().unwrap().as_object().unwrap();
        assert!(!fresh.is_summary());
    }

    #[test]
    fn strong_and_weak_updates() {
        let mut frame = Frame::new(2, CAP);
        let mut table = AllocTable::new(0);
        let class = Name::new("LNode;");
        let next = Name::new("next");
        let o1 = frame
            .store_new_object(&mut table, &AllocKey::new(InstrId::new(1)), &class, &layout())
            .unwrap();
        let o2 = frame
            .store_new_object(&mut table, &AllocKey::new(InstrId::new(2)), &class, &layout())
            .unwrap();
        let site = InstrId::new(9);

        // single non-summary target: strong update
        let target = AliasSet::singleton(o1);
        frame
            .field_put(&mut table, site, &target, &next, &AliasSet::singleton(o2))
            .unwrap();
        assert_eq!(frame.field_get(&target, "next").unwrap(), AliasSet::singleton(o2));

        // two targets: weak update keeps the previous values
        let both = AliasSet::singleton(o1).join(&AliasSet::singleton(o2), CAP);
        frame
            .field_put(&mut table, site, &both, &next, &AliasSet::null())
            .unwrap();
        let value = frame.field_get(&target, "next").unwrap();
        assert!(value.contains(o2));
        assert!(value.contains(Addr::Null));

        // missing field gets a slot
        let extra = Name::new("extra");
        frame
            .field_put(&mut table, site, &target, &extra, &AliasSet::singleton(o2))
            .unwrap();
        assert_eq!(frame.field_get(&target, "extra").unwrap(), AliasSet::singleton(o2));
    }

    #[test]
    fn unknown_objects_propagate_tags() {
        let frame = Frame::new(1, CAP);
        let tainted = AliasSet::unknown().with_tags(&TagSet::single(Tag::FILE_CONTENT));
        let value = frame.field_get(&tainted, "f").unwrap();
        assert!(value.contains(Addr::OBJECT_TOP));
        assert!(value.tags().contains(Tag::FILE_CONTENT));
        assert!(frame.field_get(&AliasSet::null(), "f").unwrap().is_empty());
    }

    #[test]
    fn fork_isolation() {
        let mut base = Frame::new(2, CAP);
        base.write(Reg::from(0), AliasSet::null()).unwrap();
        let mut f1 = base.fork();
        let f2 = base.fork();
        f1.write(Reg::from(0), AliasSet::singleton(Addr::Object(3))).unwrap();
        f1.store_put(Addr::Object(3), Value::Set(AliasSet::null())).unwrap();
        assert_eq!(f2.read(Reg::from(0)).unwrap(), AliasSet::null());
        assert!(f2.store_get(Addr::Object(3)).unwrap().is_none());
        assert_eq!(base, f2);
        assert_ne!(f1, f2);
    }

    #[test]
    fn join_and_widen() {
        let mut a = Frame::new(1, CAP);
        a.write(Reg::from(0), AliasSet::singleton(Addr::Object(1))).unwrap();
        let mut b = a.fork();
        b.write(Reg::from(0), AliasSet::singleton(Addr::Object(2))).unwrap();
        b.register_store(Addr::static_field(4), AliasSet::null()).unwrap();

        let old = a.clone();
        assert!(a.join(&b).unwrap());
        assert!(!a.join(&b).unwrap());
        let v0 = a.read(Reg::from(0)).unwrap();
        assert!(v0.contains(Addr::Object(1)) && v0.contains(Addr::Object(2)));
        // the cell was unknown in `a`
        assert!(a
            .register_load(Addr::static_field(4))
            .unwrap()
            .contains(Addr::OBJECT_TOP));

        assert_eq!(a.widen_changed(&old), 2);
        assert_eq!(
            a.read(Reg::from(0)).unwrap(),
            AliasSet::singleton(Addr::OBJECT_TOP)
        );
    }

    #[test]
    fn mutations_are_journaled() {
        let mut frame = Frame::new(1, CAP);
        frame.write(Reg::from(0), AliasSet::null()).unwrap();
        frame
            .store_put(Addr::Object(0), Value::Set(AliasSet::null()))
            .unwrap();
        frame.set_result(AliasSet::singleton(Addr::Object(0)));
        let journal = frame.take_journal();
        assert_eq!(journal.len(), 3);
        assert!(frame.journal().is_empty());

        let replayed = Frame::new(1, CAP).apply(&journal).unwrap();
        assert_eq!(replayed, frame);
    }

    #[test]
    fn reachable_tags_follow_fields() {
        let mut frame = Frame::new(1, CAP);
        let mut table = AllocTable::new(0);
        let obj = frame
            .store_new_object(
                &mut table,
                &AllocKey::new(InstrId::new(0)),
                &Name::new("LBox;"),
                &[Name::new("value")],
            )
            .unwrap();
        let content = AliasSet::from_prim(crate::prim::Prim::POS)
            .with_tags(&TagSet::single(Tag::FILE_CONTENT));
        frame
            .field_put(
                &mut table,
                InstrId::new(1),
                &AliasSet::singleton(obj),
                &Name::new("value"),
                &content,
            )
            .unwrap();
        let tags = frame.reachable_tags(&[AliasSet::singleton(obj)]);
        assert!(tags.contains(Tag::FILE_CONTENT));
        assert!(frame.reachable_tags(&[AliasSet::null()]).is_empty());
    }
}
