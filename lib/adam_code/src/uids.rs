use serde::Serialize;
use std::fmt;
use std::num::NonZeroUsize;

/// Unique id to identify a class in the program
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize)]
pub struct ClassUid(NonZeroUsize);

/// Unique id to identify a method in the program
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize)]
pub struct MethodUid(NonZeroUsize);

impl MethodUid {
    pub(crate) fn idx(self) -> usize {
        self.0.get() - 1
    }
}

impl fmt::Display for MethodUid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

/// Unique id to identify a field in the program
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash, Serialize)]
pub struct FieldUid(NonZeroUsize);

impl FieldUid {
    /// Dense index of the field, starting at 0.
    #[must_use]
    pub fn idx(self) -> usize {
        self.0.get() - 1
    }
}

#[derive(Debug, Default)]
pub struct ProgramCounters {
    nb_classes: usize,
    nb_methods: usize,
    nb_fields: usize,
    nb_instrs: u32,
}

impl ProgramCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn new_class_uid(&mut self) -> ClassUid {
        self.nb_classes += 1;
        ClassUid(NonZeroUsize::new(self.nb_classes).expect("just incremented, cannot be 0"))
    }

    pub(crate) fn new_method_uid(&mut self) -> MethodUid {
        self.nb_methods += 1;
        MethodUid(NonZeroUsize::new(self.nb_methods).expect("just incremented, cannot be 0"))
    }

    pub(crate) fn new_field_uid(&mut self) -> FieldUid {
        self.nb_fields += 1;
        FieldUid(NonZeroUsize::new(self.nb_fields).expect("just incremented, cannot be 0"))
    }

    pub(crate) fn new_instr_id(&mut self) -> crate::InstrId {
        let id = crate::InstrId::new(self.nb_instrs);
        self.nb_instrs += 1;
        id
    }

    pub(crate) fn nb_instrs(&self) -> u32 {
        self.nb_instrs
    }
}
