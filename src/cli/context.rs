use std::path::{Path, PathBuf};
use std::sync::Arc;

use action_locator::{ExecutionTracer, JsonLinesSink, SelfHealer, StrategyManager};
use anyhow::{Context, Result};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::backends::{BackendContext, BackendTable};
use crate::config::SoulHealConfig;

pub struct CliContext {
    config: Arc<SoulHealConfig>,
    config_path: PathBuf,
    table: BackendTable,
    manager: OnceCell<Arc<StrategyManager>>,
}

impl CliContext {
    pub fn new(config: SoulHealConfig, config_path: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            table: BackendTable::builtin(),
            manager: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &SoulHealConfig {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn backend_table(&self) -> &BackendTable {
        &self.table
    }

    pub fn tracer(&self) -> Result<ExecutionTracer> {
        let trace = &self.config.trace;
        if !trace.enabled {
            return Ok(ExecutionTracer::disabled());
        }

        let tracer = ExecutionTracer::default();
        match &trace.file {
            Some(path) => {
                let sink = JsonLinesSink::open(path)
                    .with_context(|| format!("Failed to open trace file {}", path.display()))?;
                Ok(tracer.with_sink(Arc::new(sink)))
            }
            None => Ok(tracer),
        }
    }

    /// Session manager, built on first use
    pub async fn manager(&self, screen: Option<PathBuf>) -> Result<Arc<StrategyManager>> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let ctx = BackendContext::from_config(&self.config).with_screen(screen);
                let backends = self.table.build_session(&self.config, &ctx)?;
                let manager = StrategyManager::new(backends, self.tracer()?);
                debug!(session = %manager.session(), "strategy manager created");
                Ok::<_, anyhow::Error>(Arc::new(manager))
            })
            .await?;
        Ok(Arc::clone(manager))
    }

    pub async fn healer(&self, screen: Option<PathBuf>) -> Result<SelfHealer> {
        Ok(SelfHealer::new(self.manager(screen).await?))
    }
}
