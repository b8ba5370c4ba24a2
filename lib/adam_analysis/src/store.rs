//! The abstract store.
//!
//! The store maps object addresses to values. It is split into fixed-size
//! blocks shared between forks: forking a store is a reference count
//! increment, and the first write to a block after a fork copies this block
//! only.

use crate::addr::Addr;
use crate::errors::AnalysisResult;
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

const BLOCK_SIZE: usize = 64;

type Slot = Option<Rc<Value>>;
type StoreBlock = Vec<Slot>;

/// Identifies a store lineage: a store and all the stores forked from it.
///
/// Tokens compare by identity of a shared anchor, which a token keeps
/// alive: a live token is never confused with another lineage.
#[derive(Debug, Clone, Default)]
pub struct StoreToken(Rc<()>);

impl PartialEq for StoreToken {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for StoreToken {}

impl Hash for StoreToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).hash(state);
    }
}

#[derive(Clone)]
pub struct Store {
    token: StoreToken,
    blocks: Rc<Vec<Rc<StoreBlock>>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::empty()
    }
}

fn split(index: u32) -> (usize, usize) {
    let index = index as usize;
    (index / BLOCK_SIZE, index % BLOCK_SIZE)
}

impl Store {
    /// Creates an empty store starting a new lineage.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            token: StoreToken::default(),
            blocks: Rc::new(Vec::new()),
        }
    }

    #[inline]
    #[must_use]
    pub fn token(&self) -> StoreToken {
        self.token.clone()
    }

    /// Logical copy of the store.
    #[inline]
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Returns `true` if both stores share all their blocks.
    #[must_use]
    pub fn shares_with(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.blocks, &other.blocks)
    }

    /// One past the largest index that may hold a value.
    #[must_use]
    pub fn high_water(&self) -> u32 {
        for (b, block) in self.blocks.iter().enumerate().rev() {
            if let Some(pos) = block.iter().rposition(Option::is_some) {
                return (b * BLOCK_SIZE + pos + 1) as u32;
            }
        }
        0
    }

    pub fn get(&self, addr: Addr) -> AnalysisResult<Option<&Value>> {
        let (b, i) = split(addr.object_index()?);
        Ok(self
            .blocks
            .get(b)
            .and_then(|block| block[i].as_deref()))
    }

    fn slot_mut(&mut self, addr: Addr) -> AnalysisResult<&mut Slot> {
        let (b, i) = split(addr.object_index()?);
        let blocks = Rc::make_mut(&mut self.blocks);
        if blocks.len() <= b {
            blocks.resize_with(b + 1, || Rc::new(vec![None; BLOCK_SIZE]));
        }
        Ok(&mut Rc::make_mut(&mut blocks[b])[i])
    }

    /// Replaces the value at `addr`.
    pub fn put(&mut self, addr: Addr, value: Value) -> AnalysisResult<()> {
        *self.slot_mut(addr)? = Some(Rc::new(value));
        Ok(())
    }

    /// Joins `value` into the value at `addr`, returns `true` if the store
    /// changed.
    pub fn merge_into(&mut self, addr: Addr, value: &Value, cap: usize) -> AnalysisResult<bool> {
        if let Some(current) = self.get(addr)? {
            let mut joined = current.clone();
            if !joined.join_with(value, cap)? {
                return Ok(false);
            }
            self.put(addr, joined)?;
        } else {
            self.put(addr, value.clone())?;
        }
        Ok(true)
    }

    /// Pointwise join of `other` into `self`, returns `true` if `self`
    /// changed.
    pub fn join_with(&mut self, other: &Self, cap: usize) -> AnalysisResult<bool> {
        if self.shares_with(other) {
            return Ok(false);
        }
        let mut changed = false;
        for (b, block) in other.blocks.iter().enumerate() {
            if self
                .blocks
                .get(b)
                .map_or(false, |mine| Rc::ptr_eq(mine, block))
            {
                continue;
            }
            for (i, slot) in block.iter().enumerate() {
                if let Some(value) = slot {
                    let addr = Addr::Object((b * BLOCK_SIZE + i) as u32);
                    changed |= self.merge_into(addr, value, cap)?;
                }
            }
        }
        Ok(changed)
    }

    /// Iterates over the filled slots, in address order.
    pub fn iter(&self) -> impl Iterator<Item = (Addr, &Value)> {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block.iter().enumerate().filter_map(move |(i, slot)| {
                slot.as_deref()
                    .map(|value| (Addr::Object((b * BLOCK_SIZE + i) as u32), value))
            })
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// Stores are equal when they map the same addresses to the same values.
impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        if self.shares_with(other) {
            return true;
        }
        let nb_blocks = self.blocks.len().max(other.blocks.len());
        (0..nb_blocks).all(|b| match (self.blocks.get(b), other.blocks.get(b)) {
            (Some(x), Some(y)) => Rc::ptr_eq(x, y) || x == y,
            (Some(x), None) | (None, Some(x)) => x.iter().all(Option::is_none),
            (None, None) => true,
        })
    }
}

impl Eq for Store {}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (addr, value) in self.iter() {
            writeln!(f, "  {addr} -> {value}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::AliasSet;

    const CAP: usize = 8;

    fn set(addr: Addr) -> Value {
        Value::Set(AliasSet::singleton(addr))
    }

    #[test]
    fn get_after_put() {
        let mut store = Store::empty();
        assert_eq!(store.get(Addr::Object(130)).unwrap(), None);
        store.put(Addr::Object(130), set(Addr::Null)).unwrap();
        assert_eq!(store.get(Addr::Object(130)).unwrap(), Some(&set(Addr::Null)));
        assert_eq!(store.high_water(), 131);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn fork_isolation() {
        let mut base = Store::empty();
        base.put(Addr::Object(1), set(Addr::Null)).unwrap();
        let mut s1 = base.fork();
        let s2 = base.fork();
        assert_eq!(s1.token(), s2.token());
        assert_ne!(s1.token(), Store::empty().token());

        s1.put(Addr::Object(1), set(Addr::Object(2))).unwrap();
        s1.put(Addr::Object(200), set(Addr::Null)).unwrap();

        assert_eq!(s2.get(Addr::Object(1)).unwrap(), Some(&set(Addr::Null)));
        assert_eq!(s2.get(Addr::Object(200)).unwrap(), None);
        assert_eq!(base.get(Addr::Object(1)).unwrap(), Some(&set(Addr::Null)));
        assert_ne!(s1, s2);
        assert_eq!(base, s2);
    }

    #[test]
    fn wrong_address_space() {
        let mut store = Store::empty();
        assert!(store.get(Addr::Relocated(0)).is_err());
        assert!(store.get(Addr::Register(0)).is_err());
        assert!(store.put(Addr::Null, set(Addr::Null)).is_err());
        assert!(store.put(Addr::OBJECT_TOP, set(Addr::Null)).is_err());
    }

    #[test]
    fn merge_and_join() {
        let mut a = Store::empty();
        a.put(Addr::Object(0), set(Addr::Object(5))).unwrap();
        let mut b = a.fork();
        assert!(!a.join_with(&b, CAP).unwrap());

        assert!(b.merge_into(Addr::Object(0), &set(Addr::Null), CAP).unwrap());
        assert!(!b.merge_into(Addr::Object(0), &set(Addr::Null), CAP).unwrap());
        b.put(Addr::Object(70), set(Addr::Null)).unwrap();

        assert!(a.join_with(&b, CAP).unwrap());
        let joined = a.get(Addr::Object(0)).unwrap().unwrap().as_set().unwrap();
        assert!(joined.contains(Addr::Object(5)));
        assert!(joined.contains(Addr::Null));
        assert!(a.get(Addr::Object(70)).unwrap().is_some());
        assert!(!a.join_with(&b, CAP).unwrap());
    }

    #[test]
    fn equality_is_extensional() {
        let mut a = Store::empty();
        let mut b = Store::empty();
        a.put(Addr::Object(3), set(Addr::Null)).unwrap();
        b.put(Addr::Object(3), set(Addr::Null)).unwrap();
        assert_eq!(a, b);
        b.put(Addr::Object(100), set(Addr::Null)).unwrap();
        assert_ne!(a, b);
    }
}
