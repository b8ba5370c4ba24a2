//! Models of library classes.
//!
//! Classes that the analyzed program uses without defining them (the Java
//! and Android libraries) may be given a hand-written model. A model only
//! sees the caller state through a [`BuiltinEnv`], which exposes the same
//! frame and allocation table operations as the instruction semantics.

mod http;
mod java_io;
mod java_lang;

use crate::addr::Addr;
use crate::alloctab::{AllocKey, AllocTable};
use crate::errors::{AnalysisError, AnalysisResult};
use crate::frame::Frame;
use crate::prim::Prim;
use crate::tags::{Tag, TagSet};
use crate::value::AliasSet;
use adam_code::{InstrId, Name};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

pub use http::Http;
pub use java_io::JavaIo;
pub use java_lang::JavaLang;

/// A model for one or several library classes.
pub trait BuiltinClass {
    /// Names of the modeled classes, e.g. `Ljava/lang/String;`.
    fn provides(&self) -> &[&'static str];

    /// Fields of the objects of `class`, allocated with the object.
    fn layout(&self, class: &str) -> Vec<Name>;

    /// Executes `class->name proto` in `env`.
    ///
    /// Returns `false` if the method is not modeled, in which case the
    /// call has an unknown effect.
    fn invoke(
        &self,
        env: &mut BuiltinEnv,
        class: &str,
        name: &str,
        proto: &str,
    ) -> AnalysisResult<bool>;
}

/// Report of tagged data reaching a modeled sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Descriptor of the method containing the call.
    pub method: String,
    pub site: InstrId,
    pub sink: String,
    pub tags: TagSet,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}: data tagged {} reaches {}",
            self.method, self.site, self.tags, self.sink
        )
    }
}

/// The caller state given to a model.
pub struct BuiltinEnv<'a> {
    pub frame: &'a mut Frame,
    pub table: &'a mut AllocTable,
    pub builtins: &'a Builtins,
    pub findings: &'a mut Vec<Finding>,
    /// Descriptor of the calling method.
    pub caller: &'a str,
    pub site: InstrId,
    pub args: &'a [AliasSet],
}

impl<'a> BuiltinEnv<'a> {
    pub fn arg(&self, i: usize) -> AnalysisResult<&AliasSet> {
        self.args.get(i).ok_or_else(|| {
            AnalysisError::MalformedInstruction(format!(
                "{} {}: missing argument {i}",
                self.caller, self.site
            ))
        })
    }

    /// Tags carried by the arguments from `from` on, and by the data
    /// reachable from them.
    #[must_use]
    pub fn args_tags(&self, from: usize) -> TagSet {
        self.frame
            .reachable_tags(self.args.get(from..).unwrap_or_default())
    }

    /// Allocates an object of a modeled class for this call site.
    pub fn new_object(&mut self, class: &str) -> AnalysisResult<Addr> {
        let layout = self.builtins.layout(class);
        self.frame.store_new_object(
            self.table,
            &AllocKey::new(self.site),
            &Name::new(class),
            &layout,
        )
    }

    pub fn get_field(&self, set: &AliasSet, field: &str) -> AnalysisResult<AliasSet> {
        self.frame.field_get(set, field)
    }

    pub fn put_field(&mut self, set: &AliasSet, field: &str, value: &AliasSet) -> AnalysisResult<()> {
        self.frame
            .field_put(self.table, self.site, set, &Name::new(field), value)
    }

    pub fn set_result(&mut self, set: AliasSet) {
        self.frame.set_result(set);
    }

    /// Returns a new object of `class` whose `content` field holds any value
    /// tagged with `tags`.
    pub fn new_with_content(
        &mut self,
        class: &str,
        content: &str,
        tags: &TagSet,
    ) -> AnalysisResult<AliasSet> {
        let obj = AliasSet::singleton(self.new_object(class)?);
        self.put_field(&obj, content, &AliasSet::from_prim(Prim::any()).with_tags(tags))?;
        Ok(obj)
    }

    /// Records a finding if `tags` contains `tag`.
    pub fn report_if(&mut self, tag: Tag, tags: TagSet, sink: &str) {
        if !tags.contains(tag) {
            return;
        }
        let finding = Finding {
            method: self.caller.to_string(),
            site: self.site,
            sink: sink.to_string(),
            tags,
        };
        if !self.findings.contains(&finding) {
            log::warn!("{finding}");
            self.findings.push(finding);
        }
    }
}

/// Registry of the available models.
pub struct Builtins {
    models: Vec<Box<dyn BuiltinClass>>,
    index: HashMap<&'static str, usize>,
}

impl Default for Builtins {
    fn default() -> Self {
        let mut builtins = Self::empty();
        builtins.register(Box::new(JavaLang));
        builtins.register(Box::new(JavaIo));
        builtins.register(Box::new(Http));
        builtins
    }
}

impl Builtins {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            models: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds a model, overriding the previous models of the same classes.
    pub fn register(&mut self, model: Box<dyn BuiltinClass>) {
        let idx = self.models.len();
        for class in model.provides() {
            self.index.insert(*class, idx);
        }
        self.models.push(model);
    }

    #[must_use]
    pub fn provides(&self, class: &str) -> bool {
        self.index.contains_key(class)
    }

    #[must_use]
    pub fn get(&self, class: &str) -> Option<&dyn BuiltinClass> {
        self.index.get(class).map(|idx| self.models[*idx].as_ref())
    }

    #[must_use]
    pub fn layout(&self, class: &str) -> Vec<Name> {
        self.get(class)
            .map(|model| model.layout(class))
            .unwrap_or_default()
    }

    /// Number of modeled classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl fmt::Debug for Builtins {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut classes: Vec<_> = self.index.keys().collect();
        classes.sort();
        f.debug_struct("Builtins").field("classes", &classes).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    const CAP: usize = 8;

    struct Harness {
        frame: Frame,
        table: AllocTable,
        builtins: Builtins,
        findings: Vec<Finding>,
        next_site: u32,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                frame: Frame::new(4, CAP),
                table: AllocTable::new(0),
                builtins: Builtins::default(),
                findings: Vec::new(),
                next_site: 0,
            }
        }

        /// Invokes a modeled method and returns the result register.
        fn call(&mut self, class: &str, name: &str, proto: &str, args: &[AliasSet]) -> AliasSet {
            let site = InstrId::new(self.next_site);
            self.next_site += 1;
            let builtins = &self.builtins;
            let model = builtins.get(class).unwrap();
            let mut env = BuiltinEnv {
                frame: &mut self.frame,
                table: &mut self.table,
                builtins,
                findings: &mut self.findings,
                caller: "LTest;->run()V",
                site,
                args,
            };
            env.set_result(AliasSet::empty());
            assert!(model.invoke(&mut env, class, name, proto).unwrap(), "{class}->{name}");
            self.frame.result().clone()
        }

        fn new_object(&mut self, class: &str) -> AliasSet {
            let site = InstrId::new(self.next_site);
            self.next_site += 1;
            let layout = self.builtins.layout(class);
            let addr = self
                .frame
                .store_new_object(&mut self.table, &AllocKey::new(site), &Name::new(class), &layout)
                .unwrap();
            AliasSet::singleton(addr)
        }
    }

    #[test]
    fn registry() {
        let builtins = Builtins::default();
        assert!(builtins.provides("Ljava/lang/String;"));
        assert!(builtins.provides("Ljava/io/BufferedReader;"));
        assert!(builtins.provides("Lorg/apache/http/impl/client/DefaultHttpClient;"));
        assert!(!builtins.provides("LMain;"));
        assert_eq!(builtins.layout("Ljava/lang/String;"), vec![Name::new("$content")]);
        assert!(builtins.layout("LMain;").is_empty());
    }

    #[test]
    fn file_content_reaches_network() {
        let mut h = Harness::new();
        let name = h.call("Ljava/lang/String;", "valueOf", "(I)Ljava/lang/String;", &[
            AliasSet::from_prim(Prim::POS),
        ]);

        let file = h.new_object("Ljava/io/FileReader;");
        h.call("Ljava/io/FileReader;", "<init>", "(Ljava/lang/String;)V", &[file.clone(), name]);
        let reader = h.new_object("Ljava/io/BufferedReader;");
        h.call(
            "Ljava/io/BufferedReader;",
            "<init>",
            "(Ljava/io/Reader;)V",
            &[reader.clone(), file],
        );
        let line = h.call("Ljava/io/BufferedReader;", "readLine", "()Ljava/lang/String;", &[reader]);
        let tags = h.frame.reachable_tags(&[line.clone()]);
        assert!(tags.contains(Tag::FILE_CONTENT));
        assert!(tags.contains(Tag::FILE_NAME));

        let request = h.new_object("Lorg/apache/http/client/methods/HttpGet;");
        h.call(
            "Lorg/apache/http/client/methods/HttpGet;",
            "<init>",
            "(Ljava/lang/String;)V",
            &[request.clone(), line],
        );
        let client = h.new_object("Lorg/apache/http/impl/client/DefaultHttpClient;");
        h.call(
            "Lorg/apache/http/impl/client/DefaultHttpClient;",
            "<init>",
            "()V",
            &[client.clone()],
        );
        assert!(h.findings.is_empty());
        h.call(
            "Lorg/apache/http/impl/client/DefaultHttpClient;",
            "execute",
            "(Lorg/apache/http/client/methods/HttpUriRequest;)Lorg/apache/http/HttpResponse;",
            &[client, request],
        );
        assert_eq!(h.findings.len(), 1);
        assert!(h.findings[0].sink.contains("execute"));
    }

    #[test]
    fn clean_data_is_not_reported() {
        let mut h = Harness::new();
        let uri = h.call("Ljava/lang/String;", "valueOf", "(I)Ljava/lang/String;", &[
            AliasSet::from_prim(Prim::POS),
        ]);
        let request = h.new_object("Lorg/apache/http/client/methods/HttpGet;");
        h.call(
            "Lorg/apache/http/client/methods/HttpGet;",
            "<init>",
            "(Ljava/lang/String;)V",
            &[request.clone(), uri],
        );
        let client = h.new_object("Lorg/apache/http/impl/client/DefaultHttpClient;");
        h.call(
            "Lorg/apache/http/impl/client/DefaultHttpClient;",
            "execute",
            "(Lorg/apache/http/client/methods/HttpUriRequest;)Lorg/apache/http/HttpResponse;",
            &[client, request],
        );
        assert!(h.findings.is_empty());
    }

    #[test]
    fn string_builder_accumulates_tags() {
        let mut h = Harness::new();
        let sb = h.new_object("Ljava/lang/StringBuilder;");
        h.call("Ljava/lang/StringBuilder;", "<init>", "()V", &[sb.clone()]);
        let tainted = AliasSet::from_prim(Prim::POS)
            .with_tags(&TagSet::single(Tag::FILE_CONTENT));
        let same = h.call(
            "Ljava/lang/StringBuilder;",
            "append",
            "(I)Ljava/lang/StringBuilder;",
            &[sb.clone(), tainted],
        );
        assert_eq!(same, sb);
        let s = h.call("Ljava/lang/StringBuilder;", "toString", "()Ljava/lang/String;", &[sb]);
        let Some(addr) = s.as_single() else { panic!("one string expected") };
        let string = h.frame.store_get(addr).unwrap().unwrap();
        assert!(matches!(string, Value::Object(o) if o.class().as_str() == "Ljava/lang/String;"));
        assert!(h.frame.reachable_tags(&[s]).contains(Tag::FILE_CONTENT));
    }
}
