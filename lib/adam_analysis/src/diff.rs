//! State differences.
//!
//! A [`Diff`] is an ordered log of writes to frame registers and store slots.
//! Each entry either substitutes the previous value or merges (joins) into
//! it. Diffs are the unit of method summaries: a method's effect is the diff
//! between its entry and exit frames, replayed by callers through
//! [`crate::frame::Frame::apply`].
//!
//! Composition follows the order of application: a later substitution
//! overrides anything before it, a later merge accumulates into whatever came
//! before.

use crate::addr::{Addr, RESULT_REG};
use crate::alloctab::AllocKey;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::store::Store;
use crate::tags::TagSet;
use crate::value::{AliasSet, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Substitute,
    Merge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub addr: Addr,
    pub action: Action,
    pub value: Value,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let op = match self.action {
            Action::Substitute => ":=",
            Action::Merge => "|=",
        };
        write!(f, "{} {op} {}", self.addr, self.value)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Diff {
    entries: Vec<Entry>,
    /// Allocation keys of the relocated addresses mentioned by the entries.
    sites: BTreeMap<u32, AllocKey>,
}

/// Effect of a diff on a single address.
pub type Reduced = BTreeMap<Addr, (Action, Value)>;

impl Diff {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Summary of a method whose effect is unknown: the result may be any
    /// value, carrying `tags`.
    #[must_use]
    pub fn unknown_effect(tags: &TagSet) -> Self {
        let mut diff = Self::new();
        diff.record_substitute(
            Addr::Register(RESULT_REG),
            Value::Set(AliasSet::unknown().with_tags(tags)),
        );
        diff
    }

    pub fn record_substitute(&mut self, addr: Addr, value: Value) {
        self.entries.push(Entry {
            addr,
            action: Action::Substitute,
            value,
        });
    }

    pub fn record_merge(&mut self, addr: Addr, value: Value) {
        self.entries.push(Entry {
            addr,
            action: Action::Merge,
            value,
        });
    }

    pub fn record_site(&mut self, relocated: u32, key: AllocKey) {
        self.sites.insert(relocated, key);
    }

    #[inline]
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    #[inline]
    pub fn sites(&self) -> impl Iterator<Item = (u32, &AllocKey)> {
        self.sites.iter().map(|(id, key)| (*id, key))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.sites.clear();
    }

    /// Net effect of the diff, one action per address.
    pub fn reduced(&self, cap: usize) -> AnalysisResult<Reduced> {
        let mut res = Reduced::new();
        for entry in &self.entries {
            fold_entry(&mut res, entry.addr, entry.action, &entry.value, cap)?;
        }
        Ok(res)
    }

    /// Builds the diff equivalent to applying `first`, then `second`.
    pub fn compose(first: &Self, second: &Self, cap: usize) -> AnalysisResult<Self> {
        let mut reduced = first.reduced(cap)?;
        for (addr, (action, value)) in second.reduced(cap)? {
            fold_entry(&mut reduced, addr, action, &value, cap)?;
        }
        let mut res = Self::from_reduced(reduced);
        res.sites = first.sites.clone();
        res.sites
            .extend(second.sites.iter().map(|(id, key)| (*id, key.clone())));
        Ok(res)
    }

    fn from_reduced(reduced: Reduced) -> Self {
        Self {
            entries: reduced
                .into_iter()
                .map(|(addr, (action, value))| Entry {
                    addr,
                    action,
                    value,
                })
                .collect(),
            sites: BTreeMap::new(),
        }
    }

    /// Extensional equality: both diffs have the same effect on any state.
    pub fn equivalent(&self, other: &Self, cap: usize) -> AnalysisResult<bool> {
        Ok(self.reduced(cap)? == other.reduced(cap)?)
    }

    /// Applies the store entries of the diff, register entries are ignored.
    pub fn apply_to_store(&self, store: &Store, cap: usize) -> AnalysisResult<Store> {
        let mut res = store.fork();
        for entry in &self.entries {
            match entry.addr {
                Addr::Register(_) => (),
                Addr::Object(_) => match entry.action {
                    Action::Substitute => res.put(entry.addr, entry.value.clone())?,
                    Action::Merge => {
                        res.merge_into(entry.addr, &entry.value, cap)?;
                    }
                },
                Addr::Relocated(_) | Addr::Null => {
                    return Err(AnalysisError::InvalidAddress {
                        addr: entry.addr,
                        reason: "diff entries must be resolved before application",
                    })
                }
            }
        }
        Ok(res)
    }
}

fn fold_entry(
    reduced: &mut Reduced,
    addr: Addr,
    action: Action,
    value: &Value,
    cap: usize,
) -> AnalysisResult<()> {
    match (action, reduced.get_mut(&addr)) {
        (Action::Merge, Some((_, prev))) => {
            prev.join_with(value, cap)?;
        }
        (Action::Merge, None) | (Action::Substitute, _) => {
            reduced.insert(addr, (action, value.clone()));
        }
    }
    Ok(())
}

/// Diffs are equal when they have the same effect. Values are compared
/// without widening.
impl PartialEq for Diff {
    fn eq(&self, other: &Self) -> bool {
        self.equivalent(other, usize::MAX).unwrap_or(false)
    }
}

impl fmt::Display for Diff {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "  {entry}")?;
        }
        for (id, key) in &self.sites {
            writeln!(f, "  reloc:{id} = {key}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::prim::Prim;
    use crate::value::Object;
    use adam_code::Name;
    use std::collections::BTreeMap;

    const CAP: usize = 8;

    fn set(addrs: &[Addr]) -> Value {
        let mut res = AliasSet::empty();
        for addr in addrs {
            res.join_with(&AliasSet::singleton(*addr), CAP);
        }
        Value::Set(res)
    }

    fn base_frame() -> Frame {
        let mut frame = Frame::new(2, CAP);
        frame
            .register_store(Addr::general(0), AliasSet::singleton(Addr::Object(0)))
            .unwrap();
        frame
            .store_put(
                Addr::Object(0),
                Value::Object(Object::new(
                    Name::new("LA;"),
                    BTreeMap::from([(Name::new("f"), Addr::Object(1))]),
                )),
            )
            .unwrap();
        frame.store_put(Addr::Object(1), set(&[Addr::Null])).unwrap();
        frame
    }

    fn diffs() -> Vec<Diff> {
        let mut d1 = Diff::new();
        d1.record_substitute(Addr::general(0), set(&[Addr::Object(1)]));
        d1.record_merge(Addr::Object(1), set(&[Addr::Object(2)]));

        let mut d2 = Diff::new();
        d2.record_merge(Addr::general(0), set(&[Addr::Null]));
        d2.record_substitute(Addr::Object(1), set(&[Addr::Object(3)]));
        d2.record_merge(Addr::Object(1), set(&[Addr::Object(4)]));

        let mut d3 = Diff::new();
        d3.record_merge(Addr::general(1), Value::Set(AliasSet::from_prim(Prim::POS)));
        d3.record_merge(Addr::Object(5), set(&[Addr::Null]));
        d3.record_substitute(Addr::Register(RESULT_REG), set(&[Addr::Object(0)]));

        vec![Diff::new(), d1, d2, d3]
    }

    #[test]
    fn composition_law() {
        let frame = base_frame();
        for d1 in &diffs() {
            for d2 in &diffs() {
                let sequential = frame.apply(d1).unwrap().apply(d2).unwrap();
                let composed = frame.apply(&Diff::compose(d1, d2, CAP).unwrap()).unwrap();
                assert_eq!(sequential, composed, "{d1}\n{d2}");
            }
        }
    }

    #[test]
    fn later_substitute_wins() {
        let mut d1 = Diff::new();
        d1.record_substitute(Addr::Object(1), set(&[Addr::Object(2)]));
        let mut d2 = Diff::new();
        d2.record_substitute(Addr::Object(1), set(&[Addr::Object(3)]));
        let composed = Diff::compose(&d1, &d2, CAP).unwrap();
        let reduced = composed.reduced(CAP).unwrap();
        assert_eq!(
            reduced.get(&Addr::Object(1)),
            Some(&(Action::Substitute, set(&[Addr::Object(3)])))
        );
    }

    #[test]
    fn merge_accumulates() {
        let mut d1 = Diff::new();
        d1.record_substitute(Addr::Object(1), set(&[Addr::Object(2)]));
        let mut d2 = Diff::new();
        d2.record_merge(Addr::Object(1), set(&[Addr::Object(3)]));
        d2.record_merge(Addr::Object(7), set(&[Addr::Null]));
        let reduced = Diff::compose(&d1, &d2, CAP).unwrap().reduced(CAP).unwrap();
        assert_eq!(
            reduced.get(&Addr::Object(1)),
            Some(&(Action::Substitute, set(&[Addr::Object(2), Addr::Object(3)])))
        );
        assert_eq!(
            reduced.get(&Addr::Object(7)),
            Some(&(Action::Merge, set(&[Addr::Null])))
        );
    }

    #[test]
    fn equality_is_extensional() {
        let mut a = Diff::new();
        a.record_substitute(Addr::Object(1), set(&[Addr::Object(2)]));
        a.record_substitute(Addr::Object(1), set(&[Addr::Object(3)]));
        let mut b = Diff::new();
        b.record_substitute(Addr::Object(1), set(&[Addr::Object(3)]));
        assert_eq!(a, b);
        assert_ne!(a.len(), b.len());
        b.record_merge(Addr::Object(2), set(&[Addr::Null]));
        assert_ne!(a, b);
    }

    #[test]
    fn application_is_functional() {
        let store = Store::empty();
        let mut diff = Diff::new();
        diff.record_substitute(Addr::Object(0), set(&[Addr::Null]));
        let updated = diff.apply_to_store(&store, CAP).unwrap();
        assert!(store.get(Addr::Object(0)).unwrap().is_none());
        assert!(updated.get(Addr::Object(0)).unwrap().is_some());

        let mut bad = Diff::new();
        bad.record_merge(Addr::Relocated(0), set(&[Addr::Null]));
        assert!(bad.apply_to_store(&store, CAP).is_err());
    }
}
