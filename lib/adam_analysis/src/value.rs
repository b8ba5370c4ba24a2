//! The abstract value domain.
//!
//! A store slot holds either an [`AliasSet`], the set of addresses a
//! reference may point to (enriched with an abstract primitive and a set of
//! taint tags), or an [`Object`], the mapping from field names to the store
//! slots holding the field values.

use crate::addr::{Addr, AddrSpace};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::prim::Prim;
use crate::tags::TagSet;
use adam_code::Name;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AliasSet {
    addrs: BTreeSet<Addr>,
    prim: Prim,
    tags: TagSet,
}

impl AliasSet {
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn singleton(addr: Addr) -> Self {
        Self {
            addrs: BTreeSet::from([addr]),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn null() -> Self {
        Self::singleton(Addr::Null)
    }

    #[must_use]
    pub fn from_prim(prim: Prim) -> Self {
        Self {
            prim,
            ..Self::default()
        }
    }

    /// Value of a freshly allocated field: null, zero or false.
    #[must_use]
    pub fn zeroed() -> Self {
        Self {
            addrs: BTreeSet::from([Addr::Null]),
            prim: Prim::ZERO | Prim::FALSE,
            tags: TagSet::new(),
        }
    }

    /// Any value: any object, null or any primitive.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            addrs: BTreeSet::from([Addr::Null, Addr::OBJECT_TOP]),
            prim: Prim::any(),
            tags: TagSet::new(),
        }
    }

    #[must_use]
    pub fn with_tags(mut self, tags: &TagSet) -> Self {
        self.tags.union_with(tags);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty() && self.prim.is_empty() && self.tags.is_empty()
    }

    #[inline]
    pub fn addrs(&self) -> impl Iterator<Item = Addr> + '_ {
        self.addrs.iter().copied()
    }

    /// Addresses of the set that can be dereferenced in a store.
    pub fn objects(&self) -> impl Iterator<Item = Addr> + '_ {
        self.addrs()
            .filter(|addr| matches!(addr, Addr::Object(_)) && !addr.is_top())
    }

    #[inline]
    #[must_use]
    pub fn nb_addrs(&self) -> usize {
        self.addrs.len()
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: Addr) -> bool {
        self.addrs.contains(&addr)
    }

    /// Returns the only address of the set, if any.
    #[must_use]
    pub fn as_single(&self) -> Option<Addr> {
        if self.addrs.len() == 1 {
            self.addrs.iter().next().copied()
        } else {
            None
        }
    }

    #[inline]
    #[must_use]
    pub const fn prim(&self) -> Prim {
        self.prim
    }

    #[inline]
    #[must_use]
    pub const fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn add_tags(&mut self, tags: &TagSet) -> bool {
        self.tags.union_with(tags)
    }

    /// Rewrites every address of the set through `f`.
    pub fn map_addrs<F: FnMut(Addr) -> AnalysisResult<Addr>>(
        &self,
        mut f: F,
        cap: usize,
    ) -> AnalysisResult<Self> {
        let mut res = Self {
            addrs: BTreeSet::new(),
            prim: self.prim,
            tags: self.tags.clone(),
        };
        for addr in &self.addrs {
            res.addrs.insert(f(*addr)?);
        }
        res.normalize(cap);
        Ok(res)
    }

    /// Joins `other` into `self`, returns `true` if `self` changed.
    pub fn join_with(&mut self, other: &Self, cap: usize) -> bool {
        let prim = self.prim;
        let mut grown = false;
        for addr in &other.addrs {
            if !self.absorbs(*addr) {
                grown |= self.addrs.insert(*addr);
            }
        }
        if grown {
            self.normalize(cap);
        }
        self.prim |= other.prim;
        let tagged = self.tags.union_with(&other.tags);
        grown || tagged || prim != self.prim
    }

    /// Order of the domain: every address of `self` is in `other` or
    /// covered by its unknown address, and so are the primitive and tags.
    #[must_use]
    pub fn leq(&self, other: &Self) -> bool {
        other.prim.contains(self.prim)
            && self.tags.is_subset(&other.tags)
            && self
                .addrs
                .iter()
                .all(|addr| other.addrs.contains(addr) || other.absorbs(*addr))
    }

    /// `true` if `addr` is covered by the unknown address of its space.
    fn absorbs(&self, addr: Addr) -> bool {
        match Addr::top_of(addr.space()) {
            Some(top) => top != addr && self.addrs.contains(&top),
            None => false,
        }
    }

    #[must_use]
    pub fn join(&self, other: &Self, cap: usize) -> Self {
        let mut res = self.clone();
        res.join_with(other, cap);
        res
    }

    /// Keeps at most `cap` addresses per space, the unknown address of a
    /// space absorbing all the other addresses of this space.
    pub fn normalize(&mut self, cap: usize) {
        for space in [AddrSpace::Object, AddrSpace::Relocated] {
            let Some(top) = Addr::top_of(space) else { continue };
            let count = self.addrs.iter().filter(|a| a.space() == space).count();
            if self.addrs.contains(&top) || count > cap {
                self.addrs.retain(|a| a.space() != space);
                self.addrs.insert(top);
            }
        }
    }

    /// Collapses the addresses of the set to the unknown address of their
    /// space.
    #[must_use]
    pub fn widened(&self) -> Self {
        let mut res = self.clone();
        res.normalize(0);
        res
    }
}

impl fmt::Display for AliasSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, addr) in self.addrs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{addr}")?;
        }
        if !self.prim.is_empty() {
            if !self.addrs.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.prim)?;
        }
        write!(f, "}}")?;
        if !self.tags.is_empty() {
            write!(f, "{}", self.tags)?;
        }
        Ok(())
    }
}

/// An abstract object.
///
/// Objects are identified by their address, which is derived from their
/// allocation site and context: two objects are never compared by walking
/// their fields, which keeps equality finite on cyclic heaps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Object {
    class: Name,
    fields: BTreeMap<Name, Addr>,
    /// Set when the address stands for several concrete objects.
    summary: bool,
}

impl Object {
    #[must_use]
    pub fn new(class: Name, fields: BTreeMap<Name, Addr>) -> Self {
        Self {
            class,
            fields,
            summary: false,
        }
    }

    #[inline]
    #[must_use]
    pub const fn class(&self) -> &Name {
        &self.class
    }

    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Addr> {
        self.fields.get(name).copied()
    }

    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = (&Name, Addr)> {
        self.fields.iter().map(|(name, addr)| (name, *addr))
    }

    pub fn set_field(&mut self, name: Name, slot: Addr) {
        self.fields.insert(name, slot);
    }

    #[inline]
    #[must_use]
    pub const fn is_summary(&self) -> bool {
        self.summary
    }

    pub fn mark_summary(&mut self) -> bool {
        !std::mem::replace(&mut self.summary, true)
    }

    pub fn map_addrs<F: FnMut(Addr) -> AnalysisResult<Addr>>(
        &self,
        mut f: F,
    ) -> AnalysisResult<Self> {
        let mut fields = BTreeMap::new();
        for (name, addr) in &self.fields {
            fields.insert(name.clone(), f(*addr)?);
        }
        Ok(Self {
            class: self.class.clone(),
            fields,
            summary: self.summary,
        })
    }

    /// Joins `other` into `self`, returns `true` if `self` changed.
    ///
    /// Both objects are expected to come from the same allocation key, hence
    /// to share their class and field slots. Fields only known by `other` are
    /// added.
    pub fn join_with(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (name, addr) in &other.fields {
            if !self.fields.contains_key(name) {
                self.fields.insert(name.clone(), *addr);
                changed = true;
            }
        }
        if other.summary && !self.summary {
            self.summary = true;
            changed = true;
        }
        changed
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.class)?;
        if self.summary {
            write!(f, "*")?;
        }
        write!(f, " {{")?;
        for (i, (name, addr)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {addr}")?;
        }
        write!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Set(AliasSet),
    Object(Object),
}

impl Value {
    #[must_use]
    pub const fn as_set(&self) -> Option<&AliasSet> {
        match self {
            Self::Set(set) => Some(set),
            Self::Object(_) => None,
        }
    }

    #[must_use]
    pub const fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(obj) => Some(obj),
            Self::Set(_) => None,
        }
    }

    /// Joins `other` into `self`, returns `true` if `self` changed.
    pub fn join_with(&mut self, other: &Self, cap: usize) -> AnalysisResult<bool> {
        match (self, other) {
            (Self::Set(a), Self::Set(b)) => Ok(a.join_with(b, cap)),
            (Self::Object(a), Self::Object(b)) => Ok(a.join_with(b)),
            (a, b) => Err(AnalysisError::ArgumentError(format!(
                "cannot join {a} with {b}"
            ))),
        }
    }

    pub fn join(&self, other: &Self, cap: usize) -> AnalysisResult<Self> {
        let mut res = self.clone();
        res.join_with(other, cap)?;
        Ok(res)
    }

    pub fn map_addrs<F: FnMut(Addr) -> AnalysisResult<Addr>>(
        &self,
        f: F,
        cap: usize,
    ) -> AnalysisResult<Self> {
        Ok(match self {
            Self::Set(set) => Self::Set(set.map_addrs(f, cap)?),
            Self::Object(obj) => Self::Object(obj.map_addrs(f)?),
        })
    }

    /// Addresses directly referenced by the value.
    pub fn referenced(&self) -> Box<dyn Iterator<Item = Addr> + '_> {
        match self {
            Self::Set(set) => Box::new(set.addrs()),
            Self::Object(obj) => Box::new(obj.fields.values().copied()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Set(set) => write!(f, "{set}"),
            Self::Object(obj) => write!(f, "{obj}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::Tag;

    const CAP: usize = 4;

    fn set(addrs: &[Addr]) -> AliasSet {
        let mut res = AliasSet::empty();
        for addr in addrs {
            res.join_with(&AliasSet::singleton(*addr), CAP);
        }
        res
    }

    fn samples() -> Vec<AliasSet> {
        vec![
            AliasSet::empty(),
            AliasSet::null(),
            set(&[Addr::Object(1), Addr::Object(2)]),
            set(&[Addr::Object(2), Addr::Object(3), Addr::Relocated(0)]),
            set(&[Addr::Object(4), Addr::Object(5), Addr::Object(6)]),
            AliasSet::unknown(),
            AliasSet::from_prim(Prim::POS).with_tags(&TagSet::single(Tag::FILE_NAME)),
            AliasSet::zeroed().with_tags(&TagSet::single(Tag::FILE_CONTENT)),
        ]
    }

    #[test]
    fn join_is_commutative() {
        for a in &samples() {
            for b in &samples() {
                assert_eq!(a.join(b, CAP), b.join(a, CAP));
            }
        }
    }

    #[test]
    fn join_is_associative() {
        for a in &samples() {
            for b in &samples() {
                for c in &samples() {
                    assert_eq!(
                        a.join(b, CAP).join(c, CAP),
                        a.join(&b.join(c, CAP), CAP),
                        "{a} {b} {c}"
                    );
                }
            }
        }
    }

    #[test]
    fn join_is_idempotent() {
        for a in &samples() {
            assert_eq!(a.join(a, CAP), *a);
            let mut b = a.clone();
            assert!(!b.join_with(a, CAP));
        }
    }

    #[test]
    fn join_widens_over_cap() {
        let big = set(&[
            Addr::Object(1),
            Addr::Object(2),
            Addr::Object(3),
            Addr::Object(4),
            Addr::Object(5),
        ]);
        assert_eq!(big.nb_addrs(), 1);
        assert!(big.contains(Addr::OBJECT_TOP));

        let small = set(&[Addr::Object(1), Addr::Null]);
        let joined = small.join(&AliasSet::unknown(), CAP);
        assert!(!joined.contains(Addr::Object(1)));
        assert!(joined.contains(Addr::OBJECT_TOP));
        assert!(joined.contains(Addr::Null));
    }

    #[test]
    fn unknown_absorbs_objects() {
        let mut any = AliasSet::unknown();
        assert!(!any.join_with(&AliasSet::singleton(Addr::Object(3)), CAP));
        assert_eq!(any, AliasSet::unknown());

        let mut top = set(&[Addr::OBJECT_TOP]);
        assert!(!top.join_with(&set(&[Addr::Object(1), Addr::Object(2)]), CAP));
        assert!(top.join_with(&AliasSet::null(), CAP));
        assert!(top.join_with(&AliasSet::from_prim(Prim::POS), CAP));
    }

    #[test]
    fn order_agrees_with_join() {
        for a in &samples() {
            for b in &samples() {
                let joined = a.join(b, CAP);
                assert!(a.leq(&joined), "{a} <= {joined}");
                assert!(b.leq(&joined), "{b} <= {joined}");
                assert_eq!(a.leq(b), a.join(b, CAP) == *b, "{a} <= {b}");
            }
        }
        assert!(set(&[Addr::Object(7)]).leq(&AliasSet::unknown()));
        assert!(!AliasSet::unknown().leq(&set(&[Addr::Object(7)])));
    }

    #[test]
    fn tags_are_unioned() {
        let a = AliasSet::null().with_tags(&TagSet::single(Tag::FILE_NAME));
        let b = AliasSet::singleton(Addr::Object(0))
            .with_tags(&TagSet::single(Tag::FILE_CONTENT));
        let joined = a.join(&b, CAP);
        assert!(joined.tags().contains(Tag::FILE_NAME));
        assert!(joined.tags().contains(Tag::FILE_CONTENT));
    }

    #[test]
    fn widened_keeps_tags_and_null() {
        let a = set(&[Addr::Object(1), Addr::Relocated(3), Addr::Null])
            .with_tags(&TagSet::single(Tag::FILE_NAME));
        let w = a.widened();
        assert_eq!(w.nb_addrs(), 3);
        assert!(w.contains(Addr::RELOCATED_TOP));
        assert!(w.tags().contains(Tag::FILE_NAME));
    }

    #[test]
    fn set_and_object_do_not_join() {
        let mut a = Value::Set(AliasSet::null());
        let b = Value::Object(Object::new(Name::new("LA;"), BTreeMap::new()));
        assert!(a.join_with(&b, CAP).is_err());
    }
}
