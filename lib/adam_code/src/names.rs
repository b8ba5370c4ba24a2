//! Interned identifiers.
//!
//! Class descriptors, method names, prototypes and field names are all
//! represented by a [`Name`]. Names obtained from the same [`Interner`] share
//! their allocation, so that equality checks between interned names are a
//! pointer comparison. Names built outside of an interner still compare
//! correctly, only slower.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::rc::Rc;

#[derive(Clone)]
pub struct Name(Rc<str>);

impl Name {
    /// Builds a name that is not registered in any interner.
    #[must_use]
    pub fn new(s: &str) -> Self {
        Self(Rc::from(s))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if both names share the same allocation.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for Name {}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.ptr_eq(other) {
            Ordering::Equal
        } else {
            self.0.cmp(&other.0)
        }
    }
}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self(Rc::from(s)))
    }
}

/// The names registry.
///
/// An interner is an owned value: the loader creates one per program and
/// every component that needs to mint names receives it explicitly.
#[derive(Debug, Default)]
pub struct Interner {
    pool: HashSet<Rc<str>>,
}

impl Interner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Name {
        if let Some(rc) = self.pool.get(s) {
            return Name(rc.clone());
        }
        let rc: Rc<str> = Rc::from(s);
        self.pool.insert(rc.clone());
        Name(rc)
    }

    /// Replaces `name` by its interned counterpart.
    pub fn reintern(&mut self, name: &mut Name) {
        if let Some(rc) = self.pool.get(name.as_str()) {
            if !Rc::ptr_eq(rc, &name.0) {
                name.0 = rc.clone();
            }
        } else {
            self.pool.insert(name.0.clone());
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_names_share_storage() {
        let mut interner = Interner::new();
        let a = interner.intern("Ljava/lang/String;");
        let b = interner.intern("Ljava/lang/String;");
        assert!(a.ptr_eq(&b));
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn foreign_names_compare_by_content() {
        let mut interner = Interner::new();
        let a = interner.intern("next");
        let mut b = Name::new("next");
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        interner.reintern(&mut b);
        assert!(a.ptr_eq(&b));
    }
}
