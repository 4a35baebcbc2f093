use super::env::CliArgs;
use super::info::cmd_info;
use super::locate::cmd_locate;
use super::plan::cmd_plan;
use super::presence::cmd_presence;
use super::strategies::cmd_strategies;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    let output = cli.output.clone();
    match cli.command.clone() {
        Commands::Locate(args) => cmd_locate(args, ctx, output).await,
        Commands::Strategies(args) => cmd_strategies(args, ctx, output).await,
        Commands::Presence(args) => cmd_presence(args, ctx, output).await,
        Commands::Plan(args) => cmd_plan(args, output),
        Commands::Info => cmd_info(ctx, output),
    }
}
