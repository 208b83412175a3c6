//! Multi-language sandbox facade: owns one [`LanguagePool`] per sandboxed
//! language, runs the startup orphan sweep, and drives the background TTL
//! monitor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::pool::{LanguagePool, PoolConfig, PoolError, SandboxHandle};
use super::{Sandbox, SandboxError, SandboxProvider};
use crate::submission::Language;

/// Per-language pool tuning, keyed by language for config loading.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct SandboxPoolConfig {
    pub language: Language,
    #[serde(flatten)]
    pub pool: PoolConfig,
}

/// Errors surfaced by the manager beyond per-pool [`PoolError`]s.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("no sandbox pool configured for language {0}")]
    NoPoolForLanguage(Language),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Owns every language's pool plus the background monitor task.
///
/// Constructed as an explicit dependency (not a process-wide singleton) so
/// the pipeline, tests, and any binary embedding this crate can each hold
/// their own instance wired to their own provider.
pub struct SandboxManager {
    pools: HashMap<Language, Arc<LanguagePool>>,
    monitor_interval: Duration,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl SandboxManager {
    /// Builds one pool per entry in `configs`, using `provider` for all of
    /// them. Does not start containers or the monitor task yet — call
    /// [`Self::start`] after construction.
    pub fn new(configs: Vec<SandboxPoolConfig>, provider: Arc<dyn SandboxProvider>) -> Self {
        let pools = configs
            .into_iter()
            .map(|c| {
                (
                    c.language,
                    Arc::new(LanguagePool::new(c.language, c.pool, provider.clone())),
                )
            })
            .collect();
        Self {
            pools,
            monitor_interval: Duration::from_secs(1),
            monitor_task: Mutex::new(None),
        }
    }

    /// Sweeps orphaned containers left over from a prior process, then
    /// replenishes every pool to its floor, then spawns the background
    /// monitor loop. Call once at process startup.
    pub async fn start(self: &Arc<Self>, provider: &dyn SandboxProvider) {
        match provider.sweep_orphans().await {
            Ok(n) if n > 0 => tracing::info!(count = n, "swept orphaned sandbox containers"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to sweep orphaned sandbox containers"),
        }

        for pool in self.pools.values() {
            pool.replenish().await;
        }

        let manager = self.clone();
        let interval = self.monitor_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for pool in manager.pools.values() {
                    pool.monitor().await;
                }
            }
        });
        *self.monitor_task.lock().await = Some(handle);
    }

    pub fn pool(&self, language: Language) -> Option<&Arc<LanguagePool>> {
        self.pools.get(&language)
    }

    pub async fn get_sandbox(&self, language: Language) -> Result<Arc<dyn Sandbox>, ManagerError> {
        let pool = self
            .pools
            .get(&language)
            .ok_or(ManagerError::NoPoolForLanguage(language))?;
        Ok(pool.acquire().await?)
    }

    pub async fn get_sandbox_handle(&self, language: Language) -> Result<SandboxHandle, ManagerError> {
        let pool = self
            .pools
            .get(&language)
            .ok_or(ManagerError::NoPoolForLanguage(language))?;
        Ok(pool.acquire_tracked().await?)
    }

    pub async fn release_sandbox(&self, language: Language, sandbox: Arc<dyn Sandbox>) {
        if let Some(pool) = self.pools.get(&language) {
            pool.release(sandbox).await;
        }
    }

    /// Stops the monitor task and destroys every container across every
    /// pool. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.monitor_task.lock().await.take() {
            handle.abort();
        }
        for pool in self.pools.values() {
            pool.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::pool::testing::FakeSandboxProvider;
    use super::*;

    fn configs() -> Vec<SandboxPoolConfig> {
        vec![
            SandboxPoolConfig {
                language: Language::Python,
                pool: PoolConfig { pool_size: 1, scale_limit: 2, ..Default::default() },
            },
            SandboxPoolConfig {
                language: Language::Java,
                pool: PoolConfig { pool_size: 1, scale_limit: 2, ..Default::default() },
            },
        ]
    }

    #[tokio::test]
    async fn routes_acquire_release_by_language() {
        let provider: Arc<dyn SandboxProvider> = Arc::new(FakeSandboxProvider::default());
        let manager = Arc::new(SandboxManager::new(configs(), provider.clone()));
        manager.start(provider.as_ref()).await;

        let py = manager.get_sandbox(Language::Python).await.unwrap();
        assert_eq!(py.language(), Language::Python);
        manager.release_sandbox(Language::Python, py).await;

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn unconfigured_language_errors() {
        let provider: Arc<dyn SandboxProvider> = Arc::new(FakeSandboxProvider::default());
        let manager = SandboxManager::new(configs(), provider);
        let err = manager.get_sandbox(Language::Cpp).await.unwrap_err();
        assert!(matches!(err, ManagerError::NoPoolForLanguage(Language::Cpp)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let provider: Arc<dyn SandboxProvider> = Arc::new(FakeSandboxProvider::default());
        let manager = Arc::new(SandboxManager::new(configs(), provider.clone()));
        manager.start(provider.as_ref()).await;
        manager.shutdown().await;
        manager.shutdown().await;
    }
}
