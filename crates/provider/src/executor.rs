//! Executor that shells out to the node's command-line client.

use crate::{discovery, response, NodeClient};
use async_trait::async_trait;
use bitlens_core::{BitlensResult, ConfigStore, ErrorKind, NodeConfig, QueryError, QueryRequest, QueryResult};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

/// Runs one query per process invocation, with timeout and retry.
///
/// ```ignore
/// let store = Arc::new(ConfigStore::new(NodeConfig::default())?);
/// let exec = CliExecutor::new(store);
/// let count = exec.execute(&queries::get_block_count()).await?;
/// ```
pub struct CliExecutor {
    store: Arc<ConfigStore>,
    /// Path that last answered `-version`; guards discovery and probing.
    verified: tokio::sync::Mutex<Option<PathBuf>>,
}

impl CliExecutor {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            store,
            verified: tokio::sync::Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// The executable to run. A configured path must answer `-version`
    /// once before use; without one, discovery runs on first use and its
    /// result is recorded in the store. A changed path is checked again.
    pub async fn executable(&self) -> BitlensResult<PathBuf> {
        // One resolution at a time; late arrivals reuse the verified path.
        let mut verified = self.verified.lock().await;
        let cfg = self.store.get();
        match &cfg.executable_path {
            Some(path) if verified.as_deref() == Some(path.as_path()) => Ok(path.clone()),
            Some(path) => {
                if !discovery::probe(path, cfg.timeout).await {
                    return Err(QueryError::new(
                        ErrorKind::ExecutableNotFound,
                        format!("{} did not answer -version", path.display()),
                    ));
                }
                tracing::debug!(path = %path.display(), "configured executable verified");
                *verified = Some(path.clone());
                Ok(path.clone())
            }
            None => {
                let path = discovery::discover(cfg.timeout).await?;
                self.store.record_resolved_executable(path.clone());
                *verified = Some(path.clone());
                Ok(path)
            }
        }
    }

    async fn invoke_once(&self, path: &Path, cfg: &NodeConfig, request: &QueryRequest) -> QueryResult {
        let child = tokio::process::Command::new(path)
            .args(cfg.base_args())
            .arg(request.method())
            .args(request.cli_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(path, e))?;

        match tokio::time::timeout(cfg.timeout, child.wait_with_output()).await {
            Err(_) => Err(QueryError::new(
                ErrorKind::Timeout,
                format!("no answer within {} ms", cfg.timeout.as_millis()),
            )),
            Ok(Err(e)) => Err(QueryError::internal(format!(
                "failed to collect output of {}: {e}",
                path.display()
            ))),
            Ok(Ok(output)) => response::interpret(
                output.status.success(),
                output.status.code(),
                &output.stdout,
                &output.stderr,
            ),
        }
    }
}

fn spawn_error(path: &Path, e: std::io::Error) -> QueryError {
    match e.kind() {
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => QueryError::new(
            ErrorKind::ExecutableNotFound,
            format!("cannot run {}: {e}", path.display()),
        ),
        _ => QueryError::internal(format!("failed to spawn {}: {e}", path.display())),
    }
}

#[async_trait]
impl NodeClient for CliExecutor {
    async fn execute(&self, request: &QueryRequest) -> QueryResult {
        let path = self.executable().await.map_err(|e| request.annotate(e))?;
        let cfg = self.store.get();

        let mut attempt = 0u32;
        loop {
            tracing::debug!(method = request.method(), attempt, "invoking node client");
            match self.invoke_once(&path, &cfg, request).await {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_transient() && attempt < cfg.retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        method = request.method(),
                        attempt,
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(cfg.retry.backoff).await;
                }
                Err(e) => {
                    tracing::debug!(method = request.method(), error = %e, "query failed");
                    return Err(request.annotate(e));
                }
            }
        }
    }
}
