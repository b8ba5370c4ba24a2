use crate::cli;
use crate::prelude::*;
use clap::ArgMatches;
use nu_ansi_term::Color;
use serde::Serialize;

#[derive(Serialize)]
struct MethodReport<'a> {
    method: String,
    summary: &'a Diff,
}

#[derive(Serialize)]
struct Report<'a> {
    summaries: Vec<MethodReport<'a>>,
    findings: &'a [Finding],
    stats: &'a AnalyzerStats,
}

pub fn run(args: &ArgMatches) -> AdamResult<()> {
    init_logger(args);

    let program = open_input(args)?;
    let config = cli::analyzer_config(args);
    log::debug!("analyzer configuration: {config:?}");
    let entries = selected_methods(&program, args)?;
    if entries.is_empty() {
        log::warn!("no method selected");
    }

    let mut analyzer = Analyzer::new(&program, config);
    let mut summaries = Vec::new();
    for (_, method) in entries {
        let summary = analyzer.analyze_entry(method.uid())?;
        summaries.push((method.descriptor(), summary));
    }

    if args.get_flag("json") {
        let report = Report {
            summaries: summaries
                .iter()
                .map(|(method, summary)| MethodReport {
                    method: method.clone(),
                    summary,
                })
                .collect(),
            findings: analyzer.findings(),
            stats: analyzer.stats(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (method, summary) in &summaries {
        println!("[*] {method}");
        for line in summary.to_string().lines() {
            println!("    {line}");
        }
    }
    if analyzer.findings().is_empty() {
        println!("{}", Color::Green.paint("no leak found"));
    }
    for finding in analyzer.findings() {
        let tags = analyzer.tags().describe(&finding.tags);
        println!(
            "{}",
            Color::Red.paint(&format!(
                "[!] {} {}: {tags} reaches {}",
                finding.method, finding.site, finding.sink
            ))
        );
    }
    log::info!("analysis statistics:\n{}", analyzer.stats());

    Ok(())
}
