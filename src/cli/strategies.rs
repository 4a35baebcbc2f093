use std::path::PathBuf;

use action_locator::{PlanEntry, StrategySpec, Technique};
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use soulheal_core_types::{Classification, Target};

use super::context::CliContext;
use super::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct StrategiesArgs {
    /// Target reference to plan for
    #[arg(short, long)]
    pub target: String,

    /// Screen image for static-frame sources
    #[arg(long, value_name = "PNG")]
    pub screen: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct PlanRow {
    pub priority: u8,
    pub technique: Technique,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StrategiesReport {
    pub target: String,
    pub classification: Classification,
    pub plan: Vec<PlanRow>,
}

pub async fn cmd_strategies(args: StrategiesArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let target = Target::new(args.target.as_str())?;
    let manager = ctx.manager(args.screen).await?;

    let plan = manager.plan_for(&target).iter().map(plan_row).collect();
    let report = StrategiesReport {
        target: target.raw().to_string(),
        classification: target.classification(),
        plan,
    };

    output.emit(&report, |report| {
        println!("Target: {} ({})", report.target, report.classification);
        if report.plan.is_empty() {
            println!("No techniques apply to this target");
        }
        for row in &report.plan {
            match &row.reason {
                None => println!("  {}. {:<24} active", row.priority, row.technique.name()),
                Some(reason) => println!(
                    "  {}. {:<24} skipped: {}",
                    row.priority,
                    row.technique.name(),
                    reason
                ),
            }
        }
    })
}

fn plan_row(entry: &PlanEntry) -> PlanRow {
    PlanRow {
        priority: StrategySpec::of(entry.technique()).priority,
        technique: entry.technique(),
        active: entry.is_active(),
        reason: entry.skip_reason().map(str::to_string),
    }
}
