use adam::prelude::*;
use adam::{adam_analyze, adam_disas, cli};
use clap::ArgMatches;
use clap_complete::{generate, Shell};
use std::io;

fn main() -> AdamResult<()> {
    let args = cli::adam().get_matches();

    match &args.subcommand() {
        Some(("analyze", cmd_args)) => adam_analyze::run(cmd_args),
        Some(("disas", cmd_args)) => adam_disas::run(cmd_args),
        Some(("gen-completions", sub_args)) => subcommand_gen_completions(sub_args),
        Some((subcommand, _)) => Err(AdamError::BadArguments(format!(
            "unknown subcommand '{subcommand}'"
        ))),
        None => Err(AdamError::BadArguments("missing subcommand".to_string())),
    }
}

fn subcommand_gen_completions(sub_args: &ArgMatches) -> AdamResult<()> {
    let generator = *sub_args
        .get_one::<Shell>("shell")
        .ok_or_else(|| AdamError::BadArguments("--shell needed".to_string()))?;
    let mut cmd = cli::adam();
    let cmd_name = cmd.get_name().to_string();
    generate(generator, &mut cmd, cmd_name, &mut io::stdout());
    Ok(())
}
