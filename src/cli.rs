//! Main `ADAM` binary command line arguments options.
//!
//! This module declares a function to build `clap` command line arguments
//! parser, so that it can be used from other places than the main binary,
//! such as from bash completion file generator.

use adam_analysis::AnalyzerConfig;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use clap_complete::Shell;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn arg_debug() -> Arg {
    Arg::new("debug")
        .short('d')
        .long("debug")
        .action(ArgAction::SetTrue)
        .help("Activate debug mode")
}

fn arg_verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Activate verbose mode")
}

fn arg_ecslog() -> Arg {
    Arg::new("ecslog")
        .short('e')
        .long("ecslog")
        .action(ArgAction::SetTrue)
        .help("Output logs in ECS format")
}

fn arg_input() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .action(ArgAction::Set)
        .required(true)
        .help("Input program (JSON description)")
}

fn arg_output(help: &str) -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .action(ArgAction::Set)
        .help(help.to_string())
}

fn arg_filter_class() -> Arg {
    Arg::new("filter-class")
        .long("filter-class")
        .action(ArgAction::Set)
        .help("Class(es) regex filter")
}

fn arg_filter_method() -> Arg {
    Arg::new("filter-method")
        .long("filter-method")
        .action(ArgAction::Set)
        .help("Method(s) regex filter")
}

fn arg_tunable(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::Set)
        .value_parser(value_parser!(usize))
        .help(help)
}

#[must_use]
pub fn adam() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(DESCRIPTION)
        .subcommand(analyze())
        .subcommand(disas())
        .subcommand(
            Command::new("gen-completions")
                .about("Generates completions file")
                .arg(
                    Arg::new("shell")
                        .short('s')
                        .long("shell")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(Shell))
                        .required(true)
                        .help("Shell type for completion generation"),
                ),
        )
}

#[must_use]
pub fn analyze() -> Command {
    Command::new("analyze")
        .bin_name("adam-analyze")
        .version(VERSION)
        .author(AUTHORS)
        .about("Computes method summaries and reports file content leaks")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_filter_class())
        .arg(arg_filter_method())
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .action(ArgAction::SetTrue)
                .help("Print summaries and findings as JSON"),
        )
        .arg(arg_tunable(
            "set-cap",
            "Number of addresses of one space kept in an alias set",
        ))
        .arg(arg_tunable(
            "max-block-visits",
            "Visits of a block before its input is widened",
        ))
        .arg(arg_tunable(
            "max-recursion-rounds",
            "Rounds spent iterating a recursive summary",
        ))
        .arg(arg_tunable(
            "max-call-depth",
            "Depth of nested method analyses",
        ))
        .arg(arg_tunable(
            "context-depth",
            "Call sites kept in allocation keys",
        ))
}

#[must_use]
pub fn disas() -> Command {
    Command::new("disas")
        .bin_name("adam-disas")
        .version(VERSION)
        .author(AUTHORS)
        .about("Prints the decoded instructions of a program")
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_output("Dot output directory"))
        .arg(arg_filter_class())
        .arg(arg_filter_method())
}

/// Builds the analyzer configuration, default values being overridden by
/// the tunables given on the command line.
#[must_use]
pub fn analyzer_config(args: &ArgMatches) -> AnalyzerConfig {
    let mut config = AnalyzerConfig::default();
    for (name, field) in [
        ("set-cap", &mut config.set_cap),
        ("max-block-visits", &mut config.max_block_visits),
        ("max-recursion-rounds", &mut config.max_recursion_rounds),
        ("max-call-depth", &mut config.max_call_depth),
        ("context-depth", &mut config.context_depth),
    ] {
        if let Some(value) = args.get_one::<usize>(name) {
            *field = *value;
        }
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_well_formed() {
        adam().debug_assert();
    }

    #[test]
    fn tunables_override_defaults() {
        let args = analyze()
            .try_get_matches_from(["adam-analyze", "-i", "p.json", "--set-cap", "4"])
            .unwrap();
        let config = analyzer_config(&args);
        assert_eq!(config.set_cap, 4);
        assert_eq!(
            config.max_block_visits,
            AnalyzerConfig::default().max_block_visits
        );
    }
}
