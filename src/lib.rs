//! SoulHeal CLI library
//!
//! Configuration model, backend table and command implementations for the
//! `soulheal` binary.

pub mod backends;
pub mod cli;
pub mod config;

pub use backends::{BackendContext, BackendTable};
pub use config::{BackendConfig, SoulHealConfig, TraceConfig};
