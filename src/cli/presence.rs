use std::path::PathBuf;
use std::time::Duration;

use action_locator::{PresenceReport, PresenceRule};
use anyhow::{bail, Result};
use clap::Args;
use soulheal_core_types::Target;

use super::context::CliContext;
use super::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct PresenceArgs {
    /// Target references; repeat the flag for several targets
    #[arg(short, long = "target", required = true)]
    pub targets: Vec<String>,

    /// Whether any or all targets must be present
    #[arg(long, default_value = "any")]
    pub rule: PresenceRule,

    /// Total time budget, e.g. 500ms or 2s
    #[arg(long, default_value = "2s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,

    /// Screen image for static-frame sources
    #[arg(long, value_name = "PNG")]
    pub screen: Option<PathBuf>,
}

pub async fn cmd_presence(args: PresenceArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let targets = args
        .targets
        .iter()
        .map(|raw| Target::new(raw.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    let manager = ctx.manager(args.screen).await?;
    let report = manager.assert_presence(&targets, args.timeout, args.rule).await?;

    output.emit(&report, print_human)?;

    if !report.present {
        bail!(
            "presence assertion failed ({:?}): missing {}",
            args.rule,
            report.missing.join(", ")
        );
    }
    Ok(())
}

fn print_human(report: &PresenceReport) {
    println!("Present: {}", report.present);
    if !report.techniques.is_empty() {
        let techniques: Vec<&str> = report.techniques.iter().map(|t| t.name()).collect();
        println!("Techniques: {}", techniques.join(", "));
    }
    if !report.matched.is_empty() {
        println!("Matched: {}", report.matched.join(", "));
    }
    if !report.missing.is_empty() {
        println!("Missing: {}", report.missing.join(", "));
    }
    println!("Elapsed: {}ms", report.elapsed.as_millis());
}
