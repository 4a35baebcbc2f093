use std::path::PathBuf;

use action_locator::{Technique, STRATEGY_SPECS};
use anyhow::Result;
use serde::Serialize;

use super::context::CliContext;
use super::output::OutputFormat;
use crate::config::BackendConfig;

#[derive(Debug, Serialize)]
pub struct InfoReport {
    pub version: &'static str,
    pub build_date: &'static str,
    pub git_commit: &'static str,
    pub git_branch: &'static str,
    pub config_path: PathBuf,
    pub sources: Vec<BackendConfig>,
    pub text_detectors: Vec<BackendConfig>,
    pub template_matchers: Vec<BackendConfig>,
    pub available: AvailableBackends,
    pub techniques: Vec<TechniqueInfo>,
}

#[derive(Debug, Serialize)]
pub struct AvailableBackends {
    pub sources: Vec<&'static str>,
    pub text_detectors: Vec<&'static str>,
    pub template_matchers: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct TechniqueInfo {
    pub priority: u8,
    pub technique: Technique,
    pub disabled: bool,
}

pub fn cmd_info(ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let config = ctx.config();
    let table = ctx.backend_table();

    let report = InfoReport {
        version: env!("CARGO_PKG_VERSION"),
        build_date: option_env!("BUILD_DATE").unwrap_or("unknown"),
        git_commit: option_env!("GIT_HASH").unwrap_or("unknown"),
        git_branch: option_env!("GIT_BRANCH").unwrap_or("unknown"),
        config_path: ctx.config_path().to_path_buf(),
        sources: config.sources.clone(),
        text_detectors: config.text_detectors.clone(),
        template_matchers: config.template_matchers.clone(),
        available: AvailableBackends {
            sources: table.source_ids().collect(),
            text_detectors: table.detector_ids().collect(),
            template_matchers: table.matcher_ids().collect(),
        },
        techniques: STRATEGY_SPECS
            .iter()
            .map(|spec| TechniqueInfo {
                priority: spec.priority,
                technique: spec.technique,
                disabled: config.disabled_techniques.contains(&spec.technique),
            })
            .collect(),
    };

    output.emit(&report, print_human)
}

fn print_human(report: &InfoReport) {
    println!("SoulHeal System Information");
    println!("===========================");
    println!("Version: {}", report.version);
    println!("Build Date: {}", report.build_date);
    println!("Git Commit: {}", report.git_commit);
    println!("Git Branch: {}", report.git_branch);
    println!("Config: {}", report.config_path.display());
    println!();

    println!("Configured backends (fallback order):");
    print_group("Element sources", &report.sources);
    print_group("Text detectors", &report.text_detectors);
    print_group("Template matchers", &report.template_matchers);
    println!();

    println!("Available backends:");
    println!("- Element sources: {}", list(&report.available.sources));
    println!("- Text detectors: {}", list(&report.available.text_detectors));
    println!("- Template matchers: {}", list(&report.available.template_matchers));
    println!();

    println!("Techniques:");
    for info in &report.techniques {
        let state = if info.disabled { "disabled" } else { "enabled" };
        println!("  {}. {:<24} {}", info.priority, info.technique.name(), state);
    }
}

fn print_group(label: &str, entries: &[BackendConfig]) {
    if entries.is_empty() {
        println!("- {}: none", label);
        return;
    }
    let names: Vec<&str> = entries.iter().map(|e| e.backend.as_str()).collect();
    println!("- {}: {}", label, names.join(" -> "));
}

fn list(ids: &[&str]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}
