//! Locating the node's command-line client.

use bitlens_core::{BitlensResult, ErrorKind, QueryError};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

#[cfg(windows)]
pub const EXECUTABLE_NAME: &str = "bitcoin-cli.exe";
#[cfg(not(windows))]
pub const EXECUTABLE_NAME: &str = "bitcoin-cli";

#[cfg(not(windows))]
const CONVENTIONAL_DIRS: &[&str] = &[
    "/usr/local/bin",
    "/usr/bin",
    "/opt/bitcoin/bin",
    "/snap/bin",
    "/opt/homebrew/bin",
    "/Applications/Bitcoin-Qt.app/Contents/MacOS",
];
#[cfg(windows)]
const CONVENTIONAL_DIRS: &[&str] = &[
    r"C:\Program Files\Bitcoin\daemon",
    r"C:\Program Files (x86)\Bitcoin\daemon",
];

/// Relative to `$HOME`.
const HOME_DIRS: &[&str] = &["bitcoin/bin", ".local/bin"];

/// Candidate locations in search order: `PATH` first, then install defaults.
pub fn candidates() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    dirs.extend(CONVENTIONAL_DIRS.iter().map(PathBuf::from));
    if let Some(home) = std::env::var_os("HOME") {
        let home = PathBuf::from(home);
        dirs.extend(HOME_DIRS.iter().map(|rel| home.join(rel)));
    }

    let mut out: Vec<PathBuf> = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let candidate = dir.join(EXECUTABLE_NAME);
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// Finds the first candidate that exists and answers the liveness probe.
pub async fn discover(timeout: Duration) -> BitlensResult<PathBuf> {
    discover_in(candidates(), timeout).await
}

pub async fn discover_in(
    candidates: impl IntoIterator<Item = PathBuf>,
    timeout: Duration,
) -> BitlensResult<PathBuf> {
    let mut tried = 0usize;
    for candidate in candidates {
        if !candidate.is_file() {
            continue;
        }
        tried += 1;
        if probe(&candidate, timeout).await {
            tracing::info!(path = %candidate.display(), "resolved node client");
            return Ok(candidate);
        }
        tracing::debug!(path = %candidate.display(), "candidate failed liveness probe");
    }
    Err(QueryError::new(
        ErrorKind::ExecutableNotFound,
        format!(
            "no responsive {EXECUTABLE_NAME} found ({tried} candidates probed); \
             set BITCOIN_CLI_PATH to its location"
        ),
    ))
}

/// `true` if `<path> -version` exits successfully within `timeout`.
pub async fn probe(path: &Path, timeout: Duration) -> bool {
    let child = tokio::process::Command::new(path)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let Ok(mut child) = child else {
        return false;
    };
    matches!(
        tokio::time::timeout(timeout, child.wait()).await,
        Ok(Ok(status)) if status.success()
    )
}
