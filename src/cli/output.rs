use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print `value` as JSON/YAML, or run `human` for the human format
    pub fn emit<T: Serialize>(&self, value: &T, human: impl FnOnce(&T)) -> Result<()> {
        match self {
            OutputFormat::Human => human(value),
            OutputFormat::Json => {
                let rendered = serde_json::to_string_pretty(value).context("Failed to render JSON")?;
                println!("{}", rendered);
            }
            OutputFormat::Yaml => {
                let rendered = serde_yaml::to_string(value).context("Failed to render YAML")?;
                print!("{}", rendered);
            }
        }
        Ok(())
    }
}
