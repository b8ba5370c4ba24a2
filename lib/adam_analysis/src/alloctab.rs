//! Allocation and relocation table.
//!
//! While a method is analyzed in isolation, every object it allocates is
//! identified by an [`AllocKey`]: the allocating instruction, the field slot
//! if any, and the last call sites leading to the allocation. The table
//! interns keys into relocated addresses and binds each relocated address to
//! a store address of the analyzed lineage.
//!
//! Both directions of the binding are kept in two maps that [`AllocTable::insert`]
//! keeps synchronized: a relocated address is bound to at most one object
//! and an object to at most one relocated address.

use crate::addr::Addr;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::store::{Store, StoreToken};
use adam_code::{InstrId, Name};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AllocKey {
    pub site: InstrId,
    pub field: Option<Name>,
    pub context: Vec<InstrId>,
}

impl AllocKey {
    #[must_use]
    pub const fn new(site: InstrId) -> Self {
        Self {
            site,
            field: None,
            context: Vec::new(),
        }
    }

    /// Key of the slot holding `field` in the object allocated with `self`.
    #[must_use]
    pub fn with_field(&self, field: Name) -> Self {
        Self {
            site: self.site,
            field: Some(field),
            context: self.context.clone(),
        }
    }

    /// Key of the same allocation seen from the caller, through `call_site`.
    #[must_use]
    pub fn called_from(&self, call_site: InstrId, depth: usize) -> Self {
        let mut context = Vec::with_capacity(depth);
        context.push(call_site);
        context.extend(self.context.iter().copied());
        context.truncate(depth);
        Self {
            site: self.site,
            field: self.field.clone(),
            context,
        }
    }
}

impl fmt::Display for AllocKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.site)?;
        if let Some(field) = &self.field {
            write!(f, ".{field}")?;
        }
        for site in &self.context {
            write!(f, " <- {site}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct AllocTable {
    base: u32,
    keys: Vec<AllocKey>,
    ids: HashMap<AllocKey, u32>,
    to_object: HashMap<(StoreToken, u32), u32>,
    to_relocated: HashMap<(StoreToken, u32), u32>,
}

impl AllocTable {
    /// Creates a table whose fresh objects are numbered from `base`.
    #[must_use]
    pub fn new(base: u32) -> Self {
        Self {
            base,
            keys: Vec::new(),
            ids: HashMap::new(),
            to_object: HashMap::new(),
            to_relocated: HashMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Number of bound pairs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.to_object.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_object.is_empty()
    }

    /// Returns `true` if `addr` is an object allocated through this table.
    #[must_use]
    pub fn is_fresh(&self, addr: Addr) -> bool {
        matches!(addr, Addr::Object(i) if i >= self.base && !addr.is_top())
    }

    #[must_use]
    pub fn key_of(&self, relocated: u32) -> Option<&AllocKey> {
        self.keys.get(relocated as usize)
    }

    /// Binds a relocated address and an object address, in either order.
    ///
    /// Inserting an existing pair again is accepted; binding an address
    /// that is already bound to another one is an
    /// [`AnalysisError::AllocationConflict`].
    pub fn insert(&mut self, store: &Store, local: Addr, global: Addr) -> AnalysisResult<()> {
        let (reloc, obj) = match (local, global) {
            (Addr::Relocated(r), Addr::Object(o)) | (Addr::Object(o), Addr::Relocated(r))
                if r != Addr::TOP_INDEX && o != Addr::TOP_INDEX =>
            {
                (r, o)
            }
            _ => {
                return Err(AnalysisError::ArgumentError(format!(
                    "cannot bind {local} to {global}"
                )))
            }
        };
        let token = store.token();

        if let Some(bound) = self.to_object.get(&(token.clone(), reloc)) {
            if *bound != obj {
                return Err(AnalysisError::AllocationConflict {
                    key: Addr::Relocated(reloc),
                    bound: Addr::Object(*bound),
                    requested: Addr::Object(obj),
                });
            }
        }
        if let Some(bound) = self.to_relocated.get(&(token.clone(), obj)) {
            if *bound != reloc {
                return Err(AnalysisError::AllocationConflict {
                    key: Addr::Object(obj),
                    bound: Addr::Relocated(*bound),
                    requested: Addr::Relocated(reloc),
                });
            }
        }

        self.to_object.insert((token.clone(), reloc), obj);
        self.to_relocated.insert((token, obj), reloc);
        Ok(())
    }

    /// Translates an address through the table, in either direction.
    #[must_use]
    pub fn query(&self, store: &Store, addr: Addr) -> Option<Addr> {
        let token = store.token();
        match addr {
            Addr::Relocated(r) => self.to_object.get(&(token, r)).map(|o| Addr::Object(*o)),
            Addr::Object(o) => self
                .to_relocated
                .get(&(token, o))
                .map(|r| Addr::Relocated(*r)),
            Addr::Null | Addr::Register(_) => None,
        }
    }

    /// Returns the relocated address of `key`, minting it if needed.
    pub fn relocated(&mut self, key: AllocKey) -> AnalysisResult<Addr> {
        self.intern(key).map(Addr::Relocated)
    }

    fn intern(&mut self, key: AllocKey) -> AnalysisResult<u32> {
        if let Some(id) = self.ids.get(&key) {
            return Ok(*id);
        }
        let id = self.keys.len() as u32;
        if id > Addr::MAX_INDEX.saturating_sub(self.base) {
            return Err(AnalysisError::ArgumentError(
                "allocation table is full".to_string(),
            ));
        }
        log::trace!("allocation key {key} interned as reloc:{id}");
        self.keys.push(key.clone());
        self.ids.insert(key, id);
        Ok(id)
    }

    /// Allocates the object of `key` in the lineage of `store`.
    ///
    /// The same key always gives the same pair of addresses.
    pub fn allocate(&mut self, store: &Store, key: AllocKey) -> AnalysisResult<(Addr, Addr)> {
        let id = self.intern(key)?;
        let reloc = Addr::Relocated(id);
        if let Some(obj) = self.query(store, reloc) {
            return Ok((reloc, obj));
        }
        let obj = Addr::Object(self.base + id);
        self.insert(store, reloc, obj)?;
        Ok((reloc, obj))
    }
}
