//! Calling contexts.
//!
//! A method summary is keyed by the method and by the part of the caller
//! state the callee can observe: the argument values, the static field
//! cells and the heap reachable from both. Two calls seeing equal contexts
//! get the same summary.

use crate::addr::Addr;
use crate::errors::{AnalysisError, AnalysisResult};
use crate::frame::Frame;
use crate::store::Store;
use crate::tags::TagSet;
use crate::value::{AliasSet, Value};
use adam_code::Code;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallContext {
    args: Vec<AliasSet>,
    statics: BTreeMap<u32, AliasSet>,
    heap: BTreeMap<u32, Value>,
}

impl CallContext {
    /// Context of a call from `frame` with arguments `args`.
    #[must_use]
    pub fn build(frame: &Frame, args: Vec<AliasSet>) -> Self {
        let statics: BTreeMap<u32, AliasSet> =
            frame.statics().map(|(idx, set)| (idx, set.clone())).collect();
        let roots = args
            .iter()
            .chain(statics.values())
            .flat_map(AliasSet::addrs)
            .collect::<Vec<_>>();
        let mut heap = BTreeMap::new();
        for addr in frame.reachable(roots) {
            if let (Addr::Object(idx), Ok(Some(value))) = (addr, frame.store_get(addr)) {
                heap.insert(idx, value.clone());
            }
        }
        Self {
            args,
            statics,
            heap,
        }
    }

    /// Context of an entry point: `nb_args` unknown arguments.
    #[must_use]
    pub fn unknown(nb_args: u16) -> Self {
        Self {
            args: vec![AliasSet::unknown(); nb_args as usize],
            statics: BTreeMap::new(),
            heap: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn args(&self) -> impl Iterator<Item = &AliasSet> {
        self.args.iter()
    }

    /// First store index that the context heap does not use.
    #[must_use]
    pub fn base(&self) -> u32 {
        self.heap.keys().next_back().map_or(0, |idx| idx + 1)
    }

    /// Union of all the tags visible from the context.
    #[must_use]
    pub fn tags(&self) -> TagSet {
        let mut tags = TagSet::new();
        for set in self.args.iter().chain(self.statics.values()) {
            tags.union_with(set.tags());
        }
        for value in self.heap.values() {
            if let Value::Set(set) = value {
                tags.union_with(set.tags());
            }
        }
        tags
    }

    /// The context without its heap: object addresses collapse to the
    /// unknown object, which carries every tag the context could see.
    #[must_use]
    pub fn widened(&self) -> Self {
        let tags = self.tags();
        let widen = |set: &AliasSet| set.widened().with_tags(&tags);
        Self {
            args: self.args.iter().map(widen).collect(),
            statics: self
                .statics
                .iter()
                .map(|(idx, set)| (*idx, widen(set)))
                .collect(),
            heap: BTreeMap::new(),
        }
    }

    /// `true` if a summary computed in `self` also holds for a call in
    /// `other`. Only heap-free contexts cover other contexts, since a
    /// summary refers to the objects of its context heap by address.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.heap.is_empty()
            && self.args.len() == other.args.len()
            && other.args.iter().zip(&self.args).all(|(theirs, mine)| theirs.leq(mine))
            && self.statics.iter().all(|(idx, mine)| match other.statics.get(idx) {
                Some(theirs) => theirs.leq(mine),
                None => AliasSet::unknown().leq(mine),
            })
    }

    /// Builds the entry frame of `code` in this context: arguments are
    /// placed in the last registers, the store holds the context heap.
    pub fn initial_frame(&self, code: &Code, cap: usize) -> AnalysisResult<Frame> {
        let registers_size = code.registers_size();
        let ins_size = code.ins_size();
        if ins_size > registers_size || self.args.len() != ins_size as usize {
            return Err(AnalysisError::MalformedInstruction(format!(
                "{} arguments given to a method of {ins_size} parameters and {registers_size} registers",
                self.args.len()
            )));
        }

        let mut store = Store::empty();
        for (idx, value) in &self.heap {
            store.put(Addr::Object(*idx), value.clone())?;
        }
        let mut frame = Frame::with_store(registers_size, store, cap);
        let first = registers_size - ins_size;
        for (i, arg) in self.args.iter().enumerate() {
            frame.register_store(Addr::general(first + i as u16), arg.clone())?;
        }
        for (idx, set) in &self.statics {
            frame.register_store(Addr::static_field(*idx as usize), set.clone())?;
        }
        frame.take_journal();
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloctab::{AllocKey, AllocTable};
    use crate::tags::Tag;
    use adam_code::{InstrId, Name, Reg};

    const CAP: usize = 8;

    #[test]
    fn context_captures_reachable_heap() {
        let mut frame = Frame::new(3, CAP);
        let mut table = AllocTable::new(0);
        let class = Name::new("LBox;");
        let layout = [Name::new("value")];
        let a = frame
            .store_new_object(&mut table, &AllocKey::new(InstrId::new(0)), &class, &layout)
            .unwrap();
        let b = frame
            .store_new_object(&mut table, &AllocKey::new(InstrId::new(1)), &class, &layout)
            .unwrap();
        let tainted = AliasSet::null().with_tags(&TagSet::single(Tag::FILE_NAME));
        frame
            .field_put(
                &mut table,
                InstrId::new(2),
                &AliasSet::singleton(a),
                &Name::new("value"),
                &tainted,
            )
            .unwrap();
        frame.write(Reg::from(0), AliasSet::singleton(b)).unwrap();

        let ctx = CallContext::build(&frame, vec![AliasSet::singleton(a)]);
        // `a` and its field slot only
        assert_eq!(ctx.heap.len(), 2);
        assert!(ctx.heap.contains_key(&0));
        assert!(!ctx.heap.contains_key(&b.object_index().unwrap()));
        assert!(ctx.tags().contains(Tag::FILE_NAME));
        assert_eq!(ctx.base(), 2);

        let same = CallContext::build(&frame, vec![AliasSet::singleton(a)]);
        assert_eq!(ctx, same);
        let other = CallContext::build(&frame, vec![AliasSet::singleton(b)]);
        assert_ne!(ctx, other);
    }

    #[test]
    fn widened_context_forgets_the_heap() {
        let mut frame = Frame::new(2, CAP);
        let mut table = AllocTable::new(0);
        let class = Name::new("LBox;");
        let layout = [Name::new("value")];
        let a = frame
            .store_new_object(&mut table, &AllocKey::new(InstrId::new(0)), &class, &layout)
            .unwrap();
        let tainted = AliasSet::null().with_tags(&TagSet::single(Tag::FILE_CONTENT));
        frame
            .field_put(
                &mut table,
                InstrId::new(1),
                &AliasSet::singleton(a),
                &Name::new("value"),
                &tainted,
            )
            .unwrap();

        let ctx = CallContext::build(&frame, vec![AliasSet::singleton(a)]);
        let widened = ctx.widened();
        assert_eq!(widened.base(), 0);
        let arg = widened.args().next().unwrap();
        assert!(arg.contains(Addr::OBJECT_TOP));
        assert!(!arg.contains(a));
        assert!(arg.tags().contains(Tag::FILE_CONTENT));

        assert!(!ctx.covers(&widened));
        assert!(widened.covers(&widened));
        // an untainted summary does not hold for tainted arguments
        assert!(!CallContext::unknown(1).covers(&widened));
        assert!(!widened.covers(&CallContext::unknown(1)));
        let clean = CallContext::build(&frame, vec![AliasSet::null()]).widened();
        assert!(CallContext::unknown(1).covers(&clean));
        assert!(!CallContext::unknown(2).covers(&widened));
    }

    #[test]
    fn unknown_context_is_empty() {
        let ctx = CallContext::unknown(2);
        assert_eq!(ctx.args().count(), 2);
        assert_eq!(ctx.base(), 0);
        assert!(ctx.tags().is_empty());
    }
}
