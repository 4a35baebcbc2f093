use clap::Subcommand;

use super::locate::LocateArgs;
use super::plan::PlanArgs;
use super::presence::PresenceArgs;
use super::strategies::StrategiesArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Resolve a target and print the located candidate with its attempt trace
    Locate(LocateArgs),

    /// Show the ordered strategy plan for a target
    Strategies(StrategiesArgs),

    /// Assert that one or more targets are present on screen
    Presence(PresenceArgs),

    /// Expand parameter fallback lists into their combinations
    Plan(PlanArgs),

    /// Show version, build and backend information
    Info,
}
