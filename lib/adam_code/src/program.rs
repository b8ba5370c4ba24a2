//! Classes, methods and fields of a loaded program.

use crate::code::Code;
use crate::errors::{CodeError, CodeResult};
use crate::names::{Interner, Name};
use crate::uids::{ClassUid, FieldUid, MethodUid, ProgramCounters};
use bitflags::bitflags;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::ops;

bitflags! {
    pub struct AccessFlags: u32 {
        const ACC_PUBLIC       = 0x00001;
        const ACC_PRIVATE      = 0x00002;
        const ACC_PROTECTED    = 0x00004;
        const ACC_STATIC       = 0x00008;
        const ACC_FINAL        = 0x00010;
        const ACC_SYNCHRONIZED = 0x00020;
        const ACC_VOLATILE     = 0x00040;
        const ACC_NATIVE       = 0x00100;
        const ACC_INTERFACE    = 0x00200;
        const ACC_ABSTRACT     = 0x00400;
        const ACC_SYNTHETIC    = 0x01000;
        const ACC_CONSTRUCTOR  = 0x10000;
    }
}

impl AccessFlags {
    pub(crate) fn parse(name: &str) -> CodeResult<Self> {
        Ok(match name {
            "public" => Self::ACC_PUBLIC,
            "private" => Self::ACC_PRIVATE,
            "protected" => Self::ACC_PROTECTED,
            "static" => Self::ACC_STATIC,
            "final" => Self::ACC_FINAL,
            "synchronized" => Self::ACC_SYNCHRONIZED,
            "volatile" => Self::ACC_VOLATILE,
            "native" => Self::ACC_NATIVE,
            "interface" => Self::ACC_INTERFACE,
            "abstract" => Self::ACC_ABSTRACT,
            "synthetic" => Self::ACC_SYNTHETIC,
            "constructor" => Self::ACC_CONSTRUCTOR,
            _ => return Err(CodeError::BadAccessFlag(name.to_string())),
        })
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (flag, name) in [
            (Self::ACC_PUBLIC, "public"),
            (Self::ACC_PRIVATE, "private"),
            (Self::ACC_PROTECTED, "protected"),
            (Self::ACC_STATIC, "static"),
            (Self::ACC_FINAL, "final"),
            (Self::ACC_SYNCHRONIZED, "synchronized"),
            (Self::ACC_NATIVE, "native"),
            (Self::ACC_ABSTRACT, "abstract"),
        ] {
            if self.contains(flag) {
                write!(f, "{name} ")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Field {
    uid: FieldUid,
    class: Name,
    name: Name,
    flags: AccessFlags,
}

impl Field {
    pub(crate) fn new(uid: FieldUid, class: Name, name: Name, flags: AccessFlags) -> Self {
        Self {
            uid,
            class,
            name,
            flags,
        }
    }

    #[inline]
    #[must_use]
    pub const fn uid(&self) -> FieldUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub const fn class(&self) -> &Name {
        &self.class
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.flags.contains(AccessFlags::ACC_STATIC)
    }
}

/// A method definition, with or without code.
#[derive(Debug)]
pub struct Method {
    uid: MethodUid,
    class: Name,
    name: Name,
    proto: Name,
    flags: AccessFlags,
    code: Option<Code>,
}

impl Method {
    pub(crate) fn new(
        uid: MethodUid,
        class: Name,
        name: Name,
        proto: Name,
        flags: AccessFlags,
        code: Option<Code>,
    ) -> Self {
        Self {
            uid,
            class,
            name,
            proto,
            flags,
            code,
        }
    }

    #[inline]
    #[must_use]
    pub const fn uid(&self) -> MethodUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub const fn class(&self) -> &Name {
        &self.class
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn proto(&self) -> &Name {
        &self.proto
    }

    #[must_use]
    pub fn descriptor(&self) -> String {
        format!("{}->{}{}", self.class, self.name, self.proto)
    }

    #[inline]
    #[must_use]
    pub const fn code(&self) -> Option<&Code> {
        self.code.as_ref()
    }

    pub(crate) fn code_mut(&mut self) -> Option<&mut Code> {
        self.code.as_mut()
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> AccessFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.flags.contains(AccessFlags::ACC_STATIC)
    }

    #[inline]
    #[must_use]
    pub const fn is_native(&self) -> bool {
        self.flags.contains(AccessFlags::ACC_NATIVE)
    }

    #[inline]
    #[must_use]
    pub const fn is_abstract(&self) -> bool {
        self.flags.contains(AccessFlags::ACC_ABSTRACT)
    }

    #[inline]
    #[must_use]
    pub const fn is_constructor(&self) -> bool {
        self.flags.contains(AccessFlags::ACC_CONSTRUCTOR)
    }
}

#[derive(Debug)]
pub struct Class {
    uid: ClassUid,
    name: Name,
    superclass: Option<Name>,
    interfaces: Vec<Name>,
    flags: AccessFlags,
    methods: Vec<MethodUid>,
    fields: Vec<FieldUid>,
}

impl Class {
    pub(crate) fn new(
        uid: ClassUid,
        name: Name,
        superclass: Option<Name>,
        interfaces: Vec<Name>,
        flags: AccessFlags,
    ) -> Self {
        Self {
            uid,
            name,
            superclass,
            interfaces,
            flags,
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub const fn uid(&self) -> ClassUid {
        self.uid
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &Name {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn superclass(&self) -> Option<&Name> {
        self.superclass.as_ref()
    }

    #[inline]
    pub fn interfaces(&self) -> impl Iterator<Item = &Name> {
        self.interfaces.iter()
    }

    #[inline]
    #[must_use]
    pub const fn is_interface(&self) -> bool {
        self.flags.contains(AccessFlags::ACC_INTERFACE)
    }

    pub(crate) fn add_method(&mut self, uid: MethodUid) {
        self.methods.push(uid);
    }

    pub(crate) fn add_field(&mut self, uid: FieldUid) {
        self.fields.push(uid);
    }

    pub fn iter_methods<'a>(&'a self, program: &'a Program) -> impl Iterator<Item = &'a Method> {
        self.methods.iter().map(move |uid| &program[*uid])
    }

    pub fn iter_fields<'a>(&'a self, program: &'a Program) -> impl Iterator<Item = &'a Field> {
        self.fields.iter().map(move |uid| &program[*uid])
    }

    pub fn find_methods<'a>(
        &'a self,
        pattern: &'a Regex,
        program: &'a Program,
    ) -> impl Iterator<Item = &'a Method> {
        self.iter_methods(program)
            .filter(|method| pattern.is_match(method.name()))
    }

    #[must_use]
    pub fn get_method<'a>(
        &self,
        name: &str,
        proto: &str,
        program: &'a Program,
    ) -> Option<&'a Method> {
        self.methods
            .iter()
            .map(|uid| &program[*uid])
            .find(|method| method.name().as_str() == name && method.proto().as_str() == proto)
    }

    #[must_use]
    pub fn get_field<'a>(&self, name: &str, program: &'a Program) -> Option<&'a Field> {
        self.fields
            .iter()
            .map(|uid| &program[*uid])
            .find(|field| field.name().as_str() == name)
    }
}

/// The whole program: classes indexed by descriptor, plus dense method and
/// field tables.
#[derive(Debug)]
pub struct Program {
    counters: ProgramCounters,
    interner: Interner,
    classes: BTreeMap<Name, Class>,
    methods: Vec<Method>,
    fields: Vec<Field>,
}

impl ops::Index<MethodUid> for Program {
    type Output = Method;

    fn index(&self, uid: MethodUid) -> &Self::Output {
        &self.methods[uid.idx()]
    }
}

impl ops::Index<FieldUid> for Program {
    type Output = Field;

    fn index(&self, uid: FieldUid) -> &Self::Output {
        &self.fields[uid.idx()]
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Program {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: ProgramCounters::new(),
            interner: Interner::new(),
            classes: BTreeMap::new(),
            methods: Vec::new(),
            fields: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn counters_mut(&mut self) -> &mut ProgramCounters {
        &mut self.counters
    }

    #[inline]
    pub(crate) fn interner_mut(&mut self) -> &mut Interner {
        &mut self.interner
    }

    pub(crate) fn register_class(&mut self, class: Class) -> CodeResult<()> {
        if self.classes.contains_key(class.name()) {
            return Err(CodeError::DuplicateClass(class.name().to_string()));
        }
        log::trace!("class {} registered", class.name());
        self.classes.insert(class.name().clone(), class);
        Ok(())
    }

    pub(crate) fn register_method(&mut self, class: &Name, method: Method) -> CodeResult<()> {
        let uid = method.uid();
        debug_assert_eq!(uid.idx(), self.methods.len());
        self.classes
            .get_mut(class)
            .ok_or_else(|| CodeError::ClassNotFound(class.to_string()))?
            .add_method(uid);
        log::trace!("method {} registered", method.descriptor());
        self.methods.push(method);
        Ok(())
    }

    pub(crate) fn register_field(&mut self, class: &Name, field: Field) -> CodeResult<()> {
        let uid = field.uid();
        debug_assert_eq!(uid.idx(), self.fields.len());
        self.classes
            .get_mut(class)
            .ok_or_else(|| CodeError::ClassNotFound(class.to_string()))?
            .add_field(uid);
        self.fields.push(field);
        Ok(())
    }

    pub(crate) fn iter_methods_mut(&mut self) -> impl Iterator<Item = &mut Method> {
        self.methods.iter_mut()
    }

    #[inline]
    #[must_use]
    pub fn nb_classes(&self) -> usize {
        self.classes.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_methods(&self) -> usize {
        self.methods.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_fields(&self) -> usize {
        self.fields.len()
    }

    #[inline]
    #[must_use]
    pub fn nb_instructions(&self) -> u32 {
        self.counters.nb_instrs()
    }

    #[inline]
    pub fn iter_classes(&self) -> impl Iterator<Item = &Class> {
        self.classes.values()
    }

    #[inline]
    pub fn iter_methods(&self) -> impl Iterator<Item = &Method> {
        self.methods.iter()
    }

    #[must_use]
    pub fn get_class(&self, name: &str) -> Option<&Class> {
        self.classes.get(name)
    }

    pub fn find_classes<'a, 'p>(
        &'a self,
        pattern: &'p Regex,
    ) -> impl Iterator<Item = &'a Class> + use<'a, 'p> {
        self.classes
            .values()
            .filter(|class| pattern.is_match(class.name()))
    }

    /// Finds a method given its full descriptor, e.g. `LMain;->run()V`.
    pub fn find_method_by_descriptor(&self, descriptor: &str) -> CodeResult<&Method> {
        let (class_name, rest) = descriptor
            .split_once("->")
            .ok_or_else(|| CodeError::MethodNotFound(descriptor.to_string()))?;
        let (name, proto) = rest
            .find('(')
            .map(|pos| rest.split_at(pos))
            .ok_or_else(|| CodeError::MethodNotFound(descriptor.to_string()))?;
        self.get_class(class_name)
            .ok_or_else(|| CodeError::ClassNotFound(class_name.to_string()))?
            .get_method(name, proto, self)
            .ok_or_else(|| CodeError::MethodNotFound(descriptor.to_string()))
    }

    /// Iterates over `class` and its known ancestors, from `class` upward.
    ///
    /// The last yielded name may be a class that is not defined in the
    /// program (a system class for instance).
    pub fn superclass_chain<'a>(&'a self, class: &'a Name) -> impl Iterator<Item = &'a Name> {
        let mut current = Some(class);
        let mut steps = 0;
        std::iter::from_fn(move || {
            let name = current.take()?;
            steps += 1;
            // a malformed program may contain inheritance cycles
            if steps <= self.classes.len() + 1 {
                current = self.get_class(name).and_then(Class::superclass);
            }
            Some(name)
        })
    }

    /// Resolves a method reference by walking the superclass chain starting
    /// at `class`.
    #[must_use]
    pub fn resolve_method(&self, class: &Name, name: &str, proto: &str) -> Option<&Method> {
        self.superclass_chain(class).find_map(|cname| {
            self.get_class(cname)
                .and_then(|c| c.get_method(name, proto, self))
        })
    }

    #[must_use]
    pub fn resolve_field(&self, class: &Name, name: &str) -> Option<&Field> {
        self.superclass_chain(class)
            .find_map(|cname| self.get_class(cname).and_then(|c| c.get_field(name, self)))
    }

    /// Instance fields of `class`, ancestors' fields first.
    #[must_use]
    pub fn instance_layout(&self, class: &Name) -> Vec<Name> {
        let chain: Vec<&Name> = self.superclass_chain(class).collect();
        chain
            .iter()
            .rev()
            .filter_map(|cname| self.get_class(cname))
            .flat_map(|c| c.iter_fields(self))
            .filter(|field| !field.is_static())
            .map(|field| field.name().clone())
            .collect()
    }

    /// Returns the first ancestor of `class` that is not defined in the
    /// program.
    #[must_use]
    pub fn first_external_ancestor<'a>(&'a self, class: &'a Name) -> Option<&'a Name> {
        self.superclass_chain(class)
            .find(|cname| self.get_class(cname).is_none())
    }

    pub fn intern(&mut self, s: &str) -> Name {
        self.interner.intern(s)
    }
}
