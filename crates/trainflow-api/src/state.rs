//! Application state wiring the engine together.
//!
//! AppState holds the concrete engine used by both CLI commands and REST
//! handlers. The executor is generic over repository/store/runner traits;
//! AppState pins it to the SQLite, local-filesystem and configured-runner
//! implementations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use trainflow_core::event::bus::EventBus;
use trainflow_core::workflow::definition::discover_workflows;
use trainflow_core::workflow::executor::{DagExecutor, ExecutorOptions};
use trainflow_core::workflow::trigger::TriggerRegistry;
use trainflow_infra::artifact::local::LocalArtifactStore;
use trainflow_infra::config::{load_config, resolve_data_dir, webhook_secret};
use trainflow_infra::runner::ConfiguredRunner;
use trainflow_infra::sqlite::pool::DatabasePool;
use trainflow_infra::sqlite::run::SqliteRunRepository;
use trainflow_types::config::{RunnerKind, TrainflowConfig};

/// The executor pinned to the infra implementations.
pub type Engine = DagExecutor<SqliteRunRepository, LocalArtifactStore, ConfiguredRunner>;

const EVENT_BUS_CAPACITY: usize = 256;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: Arc<TrainflowConfig>,
    pub executor: Arc<Engine>,
    pub store: Arc<LocalArtifactStore>,
    pub runs: SqliteRunRepository,
    /// Workflows eligible for push triggers.
    pub triggers: Arc<TriggerRegistry>,
    /// HMAC key for `/webhooks/push`; `None` accepts unsigned pushes.
    pub webhook_secret: Option<Arc<[u8]>>,
}

impl AppState {
    /// Resolve the data directory, load config, open the database and wire
    /// the executor. `runner` overrides the configured runner kind.
    pub async fn init(runner: Option<RunnerKind>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;
        let pool = DatabasePool::open_in(&data_dir)
            .await
            .context("failed to open run database")?;

        let state = Self::from_parts(data_dir, config, pool, runner);

        let recovered = state.executor.checkpoint().recover_interrupted().await?;
        if !recovered.is_empty() {
            tracing::warn!(count = recovered.len(), "marked interrupted runs as failed");
        }
        Ok(state)
    }

    /// Wire the engine from an already-open database.
    pub fn from_parts(
        data_dir: PathBuf,
        config: TrainflowConfig,
        pool: DatabasePool,
        runner: Option<RunnerKind>,
    ) -> Self {
        let runs = SqliteRunRepository::new(pool);
        let store = Arc::new(LocalArtifactStore::new(data_dir.join("artifacts")));
        let runner_kind = runner.unwrap_or(config.runner);
        let runner = Arc::new(ConfiguredRunner::new(runner_kind, &config, &data_dir));
        tracing::debug!(runner = ?runner_kind, data_dir = %data_dir.display(), "wiring engine");

        let executor = DagExecutor::new(
            runs.clone(),
            Arc::clone(&store),
            runner,
            EventBus::new(EVENT_BUS_CAPACITY),
            ExecutorOptions::from(&config),
        );

        Self {
            webhook_secret: webhook_secret(&config).map(Arc::from),
            data_dir,
            config: Arc::new(config),
            executor: Arc::new(executor),
            store,
            runs,
            triggers: Arc::new(TriggerRegistry::new()),
        }
    }

    /// Directory scanned for workflow files: `workflows_dir` from config,
    /// else `{data_dir}/workflows`.
    pub fn workflows_dir(&self) -> PathBuf {
        self.config
            .workflows_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("workflows"))
    }

    /// Register every valid workflow under `dir` for push triggers.
    /// Returns the number registered.
    pub fn load_triggers(&self, dir: &Path) -> anyhow::Result<usize> {
        let found = discover_workflows(dir)
            .with_context(|| format!("failed to scan {}", dir.display()))?;
        for (path, def) in found {
            tracing::info!(workflow = %def.name, path = %path.display(), "registered workflow");
            if self.triggers.register(def).is_some() {
                tracing::warn!(path = %path.display(), "workflow name already registered; replaced");
            }
        }
        Ok(self.triggers.len())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// State backed by a temp directory and the local runner.
    pub(crate) async fn test_state(dir: &Path) -> AppState {
        let pool = DatabasePool::open_in(dir).await.unwrap();
        AppState::from_parts(dir.to_path_buf(), TrainflowConfig::default(), pool, Some(RunnerKind::Local))
    }

    #[tokio::test]
    async fn workflows_dir_defaults_under_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        assert_eq!(state.workflows_dir(), dir.path().join("workflows"));
        assert_eq!(state.store.root(), dir.path().join("artifacts"));
    }

    #[tokio::test]
    async fn load_triggers_registers_valid_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        let wf_dir = dir.path().join("workflows");
        std::fs::create_dir_all(&wf_dir).unwrap();
        std::fs::write(
            wf_dir.join("prepare.yaml"),
            include_str!("../../../workflows/stylegan2-prepare-data.yaml"),
        )
        .unwrap();
        std::fs::write(wf_dir.join("broken.yaml"), "jobs: [").unwrap();

        assert_eq!(state.load_triggers(&wf_dir).unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_workflows_dir_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;
        assert_eq!(state.load_triggers(&dir.path().join("nope")).unwrap(), 0);
    }
}
