//! Node connection configuration and its process-wide store.
//!
//! Readers take lock-free snapshots; writers validate a whole candidate
//! config and publish it with a single atomic swap, so nobody ever observes
//! a half-applied update.

use crate::error::{BitlensResult, QueryError};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Command-line flag selecting this network; mainnet needs none.
    pub fn flag(&self) -> Option<&'static str> {
        match self {
            Network::Mainnet => None,
            Network::Testnet => Some("-testnet"),
            Network::Regtest => Some("-regtest"),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        })
    }
}

impl FromStr for Network {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(QueryError::invalid_config(format!(
                "unknown network '{other}' (expected mainnet, testnet or regtest)"
            ))),
        }
    }
}

/// Fixed-backoff retry bounds for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Resolved executor parameters.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// `None` means auto-discover on first use.
    pub executable_path: Option<PathBuf>,
    pub network: Network,
    pub timeout: Duration,
    pub extra_args: Vec<String>,
    pub datadir: Option<PathBuf>,
    pub conf: Option<PathBuf>,
    pub rpc_user: Option<String>,
    #[serde(skip_serializing)]
    pub rpc_password: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            network: Network::default(),
            timeout: DEFAULT_TIMEOUT,
            extra_args: Vec::new(),
            datadir: None,
            conf: None,
            rpc_user: None,
            rpc_password: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("executable_path", &self.executable_path)
            .field("network", &self.network)
            .field("timeout", &self.timeout)
            .field("extra_args", &self.extra_args)
            .field("datadir", &self.datadir)
            .field("conf", &self.conf)
            .field("rpc_user", &self.rpc_user)
            .field("rpc_password", &self.rpc_password.as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .finish()
    }
}

impl NodeConfig {
    /// Flags placed before the method name on every invocation.
    pub fn base_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(flag) = self.network.flag() {
            args.push(flag.to_string());
        }
        if let Some(dir) = &self.datadir {
            args.push(format!("-datadir={}", dir.display()));
        }
        if let Some(conf) = &self.conf {
            args.push(format!("-conf={}", conf.display()));
        }
        if let Some(user) = &self.rpc_user {
            args.push(format!("-rpcuser={user}"));
        }
        if let Some(pass) = &self.rpc_password {
            args.push(format!("-rpcpassword={pass}"));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    /// Semantic checks. Collects every problem instead of stopping at the first.
    pub fn validate(&self) -> BitlensResult<()> {
        let mut problems = Vec::new();

        if let Some(path) = &self.executable_path {
            if let Err(p) = check_executable(path) {
                problems.push(p);
            }
        }
        if self.timeout.is_zero() {
            problems.push("timeout must be positive".to_string());
        }
        if self.retry.backoff > MAX_BACKOFF {
            problems.push(format!(
                "retry backoff {:?} exceeds {:?}",
                self.retry.backoff, MAX_BACKOFF
            ));
        }
        if let Some(dir) = &self.datadir {
            if !dir.is_dir() {
                problems.push(format!("datadir {} is not a directory", dir.display()));
            }
        }
        if let Some(conf) = &self.conf {
            if !conf.is_file() {
                problems.push(format!("conf {} is not a file", conf.display()));
            }
        }
        for arg in &self.extra_args {
            if !arg.starts_with('-') {
                problems.push(format!("extra argument '{arg}' must be a flag"));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(QueryError::invalid_config(problems.join("; ")))
        }
    }
}

fn check_executable(path: &Path) -> Result<(), String> {
    let meta = std::fs::metadata(path)
        .map_err(|e| format!("executable {} is not accessible: {e}", path.display()))?;
    if !meta.is_file() {
        return Err(format!("executable {} is not a file", path.display()));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(format!("{} is not executable", path.display()));
        }
    }
    Ok(())
}

/// A set of field changes. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub executable_path: Option<PathBuf>,
    /// Drop the configured path and fall back to discovery.
    #[serde(default)]
    pub clear_executable_path: bool,
    pub network: Option<String>,
    pub timeout: Option<Duration>,
    pub extra_args: Option<Vec<String>>,
    pub datadir: Option<PathBuf>,
    pub conf: Option<PathBuf>,
    pub rpc_user: Option<String>,
    pub rpc_password: Option<String>,
    pub max_retries: Option<u32>,
    pub retry_backoff: Option<Duration>,
}

impl ConfigUpdate {
    fn apply_to(self, base: &NodeConfig) -> BitlensResult<NodeConfig> {
        let mut next = base.clone();
        if self.clear_executable_path {
            next.executable_path = None;
        }
        if let Some(path) = self.executable_path {
            next.executable_path = Some(path);
        }
        if let Some(network) = self.network {
            next.network = network.parse()?;
        }
        if let Some(timeout) = self.timeout {
            next.timeout = timeout;
        }
        if let Some(extra) = self.extra_args {
            next.extra_args = extra;
        }
        if let Some(dir) = self.datadir {
            next.datadir = Some(dir);
        }
        if let Some(conf) = self.conf {
            next.conf = Some(conf);
        }
        if let Some(user) = self.rpc_user {
            next.rpc_user = Some(user);
        }
        if let Some(pass) = self.rpc_password {
            next.rpc_password = Some(pass);
        }
        if let Some(n) = self.max_retries {
            next.retry.max_retries = n;
        }
        if let Some(backoff) = self.retry_backoff {
            next.retry.backoff = backoff;
        }
        Ok(next)
    }
}

/// Process-wide holder of the current [`NodeConfig`].
///
/// ```ignore
/// let store = ConfigStore::new(NodeConfig::default())?;
/// let cfg = store.update(ConfigUpdate { network: Some("regtest".into()), ..Default::default() })?;
/// ```
pub struct ConfigStore {
    current: ArcSwap<NodeConfig>,
    writer: Mutex<()>,
}

impl ConfigStore {
    pub fn new(initial: NodeConfig) -> BitlensResult<Self> {
        initial.validate()?;
        Ok(Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
        })
    }

    /// Current immutable snapshot.
    pub fn get(&self) -> Arc<NodeConfig> {
        self.current.load_full()
    }

    /// Validates the merged config and swaps it in, or rejects the whole update.
    pub fn update(&self, changes: ConfigUpdate) -> BitlensResult<Arc<NodeConfig>> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let base = self.current.load();
        let next = changes.apply_to(&base)?;
        next.validate()?;

        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        tracing::info!(network = %next.network, timeout_ms = next.timeout.as_millis() as u64, "config updated");
        Ok(next)
    }

    /// Records the outcome of executable discovery.
    pub fn record_resolved_executable(&self, path: PathBuf) -> Arc<NodeConfig> {
        let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = NodeConfig::clone(&self.current.load());
        next.executable_path = Some(path);
        let next = Arc::new(next);
        self.current.store(Arc::clone(&next));
        next
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(NodeConfig::default()),
            writer: Mutex::new(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn network_parsing() {
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        assert_eq!("Main".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("signet".parse::<Network>().unwrap_err().kind, ErrorKind::InvalidConfig);
    }

    #[test]
    fn base_args_order() {
        let cfg = NodeConfig {
            network: Network::Testnet,
            datadir: Some("/data".into()),
            rpc_user: Some("alice".into()),
            rpc_password: Some("secret".into()),
            extra_args: vec!["-rpcport=18332".into()],
            ..Default::default()
        };
        assert_eq!(
            cfg.base_args(),
            vec![
                "-testnet",
                "-datadir=/data",
                "-rpcuser=alice",
                "-rpcpassword=secret",
                "-rpcport=18332"
            ]
        );
        assert!(NodeConfig::default().base_args().is_empty());
    }

    #[test]
    fn debug_redacts_password() {
        let cfg = NodeConfig {
            rpc_password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }

    #[test]
    fn zero_timeout_leaves_config_untouched() {
        let store = ConfigStore::default();
        store
            .update(ConfigUpdate {
                network: Some("regtest".into()),
                ..Default::default()
            })
            .unwrap();
        let before = store.get();

        let err = store
            .update(ConfigUpdate {
                network: Some("testnet".into()),
                timeout: Some(Duration::ZERO),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        assert_eq!(*store.get(), *before);
        assert_eq!(store.get().network, Network::Regtest);
    }

    #[test]
    fn bad_network_rejects_whole_update() {
        let store = ConfigStore::default();
        let err = store
            .update(ConfigUpdate {
                timeout: Some(Duration::from_secs(5)),
                network: Some("moonnet".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        assert_eq!(store.get().timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn missing_executable_rejected() {
        let store = ConfigStore::default();
        let err = store
            .update(ConfigUpdate {
                executable_path: Some("/definitely/not/here/bitcoin-cli".into()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        assert!(store.get().executable_path.is_none());
    }

    #[test]
    fn reports_every_problem() {
        let cfg = NodeConfig {
            timeout: Duration::ZERO,
            extra_args: vec!["positional".into()],
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.message.contains("timeout"));
        assert!(err.message.contains("positional"));
    }

    #[test]
    fn valid_update_applies_all_fields() {
        let store = ConfigStore::default();
        let cfg = store
            .update(ConfigUpdate {
                timeout: Some(Duration::from_secs(3)),
                max_retries: Some(0),
                extra_args: Some(vec!["-named".into()]),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert_eq!(cfg.retry.max_retries, 0);
        assert_eq!(store.get().extra_args, vec!["-named".to_string()]);
    }

    #[test]
    fn resolved_executable_recorded() {
        let store = ConfigStore::default();
        store.record_resolved_executable("/usr/bin/bitcoin-cli".into());
        assert_eq!(
            store.get().executable_path.as_deref(),
            Some(Path::new("/usr/bin/bitcoin-cli"))
        );
    }
}
