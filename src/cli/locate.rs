use std::path::PathBuf;

use action_locator::{Attempt, LocateResult, LocatorError, ResolveRequest};
use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;
use soulheal_core_types::AreaOfInterest;

use super::context::CliContext;
use super::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct LocateArgs {
    /// Target reference: structural path, text label or template file name
    #[arg(short, long)]
    pub target: String,

    /// Screen image for static-frame sources
    #[arg(long, value_name = "PNG")]
    pub screen: Option<PathBuf>,

    /// Pick the n-th duplicate match (0-based)
    #[arg(long, default_value_t = 0)]
    pub index: usize,

    /// Area of interest as x,y,w,h percentages of the screen
    #[arg(long, default_value = "0,0,100,100")]
    pub aoi: AreaOfInterest,

    /// Print every candidate instead of the first
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct LocateReport {
    pub target: String,
    pub located: Vec<LocateResult>,
    pub attempts: Vec<Attempt>,
}

pub async fn cmd_locate(args: LocateArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let request = ResolveRequest::new(&args.target)?
        .with_index(args.index)
        .with_aoi(args.aoi);

    let report = if args.all {
        let manager = ctx.manager(args.screen.clone()).await?;
        let (located, attempts) = manager.resolve(request).await?.collect_all().await;
        LocateReport {
            target: args.target.clone(),
            located,
            attempts,
        }
    } else {
        let healer = ctx.healer(args.screen.clone()).await?;
        match healer.act(request, |located| async move { Ok::<_, LocatorError>(located) }).await {
            Ok(healed) => LocateReport {
                target: args.target.clone(),
                located: vec![healed.value],
                attempts: healed.attempts,
            },
            Err(LocatorError::NoLocationFound { target, attempts }) => LocateReport {
                target,
                located: Vec::new(),
                attempts,
            },
            Err(err) => return Err(err.into()),
        }
    };

    output.emit(&report, print_human)?;

    if report.located.is_empty() {
        return Err(anyhow!(
            "Element not found: '{}' after {} attempt(s)",
            report.target,
            report.attempts.len()
        ));
    }
    Ok(())
}

fn print_human(report: &LocateReport) {
    println!("Target: {}", report.target);
    if report.located.is_empty() {
        println!("Located: none");
    }
    for (idx, located) in report.located.iter().enumerate() {
        println!("Located[{}]: {} via {}", idx, located.value, located.technique);
    }
    print_attempts(&report.attempts);
}

pub(crate) fn print_attempts(attempts: &[Attempt]) {
    if attempts.is_empty() {
        return;
    }
    println!();
    println!("Attempts:");
    for attempt in attempts {
        let detail = match &attempt.outcome {
            action_locator::AttemptOutcome::Failed { reason }
            | action_locator::AttemptOutcome::Skipped { reason } => format!(" ({})", reason),
            _ => String::new(),
        };
        println!(
            "- {:<24} {:<9} {:>5}ms{}",
            attempt.technique.name(),
            attempt.outcome.label(),
            attempt.duration.as_millis(),
            detail
        );
    }
}
