//! # `ADAM`
//!
//! `adam` is the main crate of the `ADAM` abstract interpretation project
//! for Dalvik bytecode. The project is subdivided into two crates, `adam`
//! acts as entry point by reexporting important structs and functions from
//! them, mostly within the `adam::prelude` namespace.
//!
//! ## Library basics
//!
//! Programs are loaded from their JSON description, then their methods are
//! summarized by an [`Analyzer`](adam_analysis::Analyzer):
//!
//! ```rust
//! use adam::prelude::*;
//!
//! let program = Program::from_json(r#"{ "classes": [ {
//!     "name": "LMain;", "super": "Ljava/lang/Object;",
//!     "methods": [ {
//!         "name": "run", "proto": "()I", "access": ["public", "static"],
//!         "code": { "registers": 1, "ins": 0, "blocks": [
//!             { "label": "entry", "instrs": [
//!                 { "op": "const", "dst": 0, "value": 7 },
//!                 { "op": "return", "reg": 0 } ] }
//!         ] }
//!     } ]
//! } ] }"#)?;
//! let method = program.find_method_by_descriptor("LMain;->run()I")?;
//! let mut analyzer = Analyzer::new(&program, AnalyzerConfig::default());
//! let summary = analyzer.analyze_entry(method.uid())?;
//! println!("{summary}");
//! # Ok::<(), AdamError>(())
//! ```
//!
//! ## Sub-crates
//!
//!  - [`adam_code`] contains the program model (classes, methods, decoded
//!    instructions, block graphs) and its loader,
//!  - [`adam_analysis`] contains the abstract machine and the method
//!    analyzer.

mod errors;

pub mod adam_analyze;
pub mod adam_disas;
pub mod cli;

pub use adam_analysis as analysis;
pub use adam_code as code;

/// Reexport module of commonly used structures and functions from `ADAM`
/// project sub-crates:
///
/// ```rust
/// use adam::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{AdamError, AdamResult};

    pub use adam_analysis::builtins::{Builtins, Finding};
    pub use adam_analysis::{AliasSet, Analyzer, AnalyzerConfig, AnalyzerStats, Diff};

    pub use adam_code::{Class, Method, Program};

    use clap::ArgMatches;
    use regex::Regex;

    pub fn init_logger(args: &ArgMatches) {
        let env = env_logger::Env::new()
            .filter_or("ADAM_LOG", "info")
            .write_style("ADAM_LOG_STYLE");

        let mut builder = env_logger::Builder::from_env(env);
        if args.get_flag("verbose") {
            builder.filter_level(log::LevelFilter::Trace);
        } else if args.get_flag("debug") {
            builder.filter_level(log::LevelFilter::Debug);
        }
        if args.get_flag("ecslog") {
            builder.format(ecs_logger::format);
        }
        builder.init();
    }

    /// Opens the program given by the `input` argument.
    pub fn open_input(args: &ArgMatches) -> AdamResult<Program> {
        let input_fname = args
            .get_one::<String>("input")
            .ok_or_else(|| AdamError::BadArguments("--input needed".to_string()))?;
        Ok(Program::open(input_fname)?)
    }

    /// Methods with code selected by the `filter-class` and `filter-method`
    /// arguments.
    pub fn selected_methods<'a>(
        program: &'a Program,
        args: &ArgMatches,
    ) -> AdamResult<Vec<(&'a Class, &'a Method)>> {
        let class_pattern = args
            .get_one::<String>("filter-class")
            .map(|r| Regex::new(r))
            .transpose()?;
        let method_pattern = args
            .get_one::<String>("filter-method")
            .map(|r| Regex::new(r))
            .transpose()?;
        let classes: Vec<&Class> = match &class_pattern {
            Some(pattern) => program.find_classes(pattern).collect(),
            None => program.iter_classes().collect(),
        };
        let selected = classes
            .into_iter()
            .flat_map(|class| class.iter_methods(program).map(move |method| (class, method)))
            .filter(|(_, method)| {
                method_pattern
                    .as_ref()
                    .map_or(true, |r| r.is_match(method.name()))
            })
            .filter(|(_, method)| method.code().is_some())
            .collect();
        Ok(selected)
    }
}
