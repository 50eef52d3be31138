//! Per-block lookups: header samples, detailed block info, range search and
//! the connection check.

use crate::fields::{f64_field, i64_field, require, str_field, u64_field, Object};
use bitlens_core::types::is_hex_hash;
use bitlens_core::{BitlensResult, BlockSample, NodeConfig, QueryError};
use bitlens_provider::{fan_out, queries, NodeClient};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Blocks either side of the tip searched when no range is given.
pub const DEFAULT_SEARCH_DEPTH: u64 = 10;
/// Most blocks one search will scan.
pub const MAX_SEARCH_BLOCKS: u64 = 101;

/// A height whose lookup failed inside a multi-block operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeightFailure {
    pub height: u64,
    pub error: QueryError,
}

impl HeightFailure {
    pub fn new(height: u64, error: QueryError) -> Self {
        Self { height, error }
    }
}

/// Height → hash → header, checking the header reports the requested height.
pub async fn fetch_block_sample(client: &dyn NodeClient, height: u64) -> BitlensResult<BlockSample> {
    let hash = queries::block_hash(client, height).await?;
    let req = queries::get_block_header(&hash);
    let payload = client.execute(&req).await?;
    let header = payload.expect_object("block header").map_err(|e| req.annotate(e))?;
    sample_from_header(height, hash, header).map_err(|e| req.annotate(e))
}

fn sample_from_header(height: u64, hash: String, header: &Object) -> BitlensResult<BlockSample> {
    const WHAT: &str = "block header";
    let reported = require(u64_field(header, "height"), WHAT, "height")?;
    if reported != height {
        return Err(QueryError::protocol(format!(
            "header for {hash} reports height {reported}, requested {height}"
        )));
    }
    Ok(BlockSample {
        height,
        hash,
        timestamp: require(i64_field(header, "time"), WHAT, "time")?,
        difficulty: require(f64_field(header, "difficulty"), WHAT, "difficulty")?,
        n_tx: require(u64_field(header, "nTx"), WHAT, "nTx")?,
    })
}

/// Resolves a block identifier (decimal height or 64-hex hash) to a hash.
pub async fn resolve_block_id(client: &dyn NodeClient, id: &str) -> BitlensResult<String> {
    let id = id.trim();
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        let height = id
            .parse::<u64>()
            .map_err(|_| QueryError::invalid_input(format!("block height {id} out of range")))?;
        return queries::block_hash(client, height).await;
    }
    if is_hex_hash(id) {
        return Ok(id.to_ascii_lowercase());
    }
    Err(QueryError::invalid_input(
        "expected a block height or a 64-hex block hash",
    ))
}

// ---------------------------------------------------------------------------
// Detailed block info
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BlockDetails {
    pub height: u64,
    pub hash: String,
    pub confirmations: Option<i64>,
    pub time: i64,
    pub median_time: Option<i64>,
    pub difficulty: f64,
    pub size: Option<u64>,
    pub stripped_size: Option<u64>,
    pub weight: Option<u64>,
    pub n_tx: u64,
    pub version_hex: Option<String>,
    pub merkle_root: Option<String>,
    pub previous_block_hash: Option<String>,
    /// Absent at the tip.
    pub next_block_hash: Option<String>,
    /// `getblockstats` output; absent when the node could not produce it.
    pub stats: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats_error: Option<QueryError>,
}

/// `getblock <hash> 1` merged with `getblockstats`.
pub async fn detailed_block_info(client: &dyn NodeClient, id: &str) -> BitlensResult<BlockDetails> {
    let hash = resolve_block_id(client, id).await?;
    let req = queries::get_block(&hash, 1);
    let payload = client.execute(&req).await?;
    let block = payload.expect_object("block").map_err(|e| req.annotate(e))?;

    const WHAT: &str = "block";
    let height = require(u64_field(block, "height"), WHAT, "height").map_err(|e| req.annotate(e))?;
    let n_tx = u64_field(block, "nTx")
        .or_else(|| block.get("tx").and_then(Value::as_array).map(|t| t.len() as u64))
        .unwrap_or(0);

    let (stats, stats_error) = match client.execute(&queries::get_block_stats(&hash)).await {
        Ok(p) => (Some(p.into_value()), None),
        Err(e) => {
            tracing::debug!(%hash, error = %e, "block stats unavailable");
            (None, Some(e))
        }
    };

    Ok(BlockDetails {
        height,
        time: require(i64_field(block, "time"), WHAT, "time").map_err(|e| req.annotate(e))?,
        confirmations: i64_field(block, "confirmations"),
        median_time: i64_field(block, "mediantime"),
        difficulty: f64_field(block, "difficulty").unwrap_or_default(),
        size: u64_field(block, "size"),
        stripped_size: u64_field(block, "strippedsize"),
        weight: u64_field(block, "weight"),
        n_tx,
        version_hex: str_field(block, "versionHex").map(str::to_string),
        merkle_root: str_field(block, "merkleroot").map(str::to_string),
        previous_block_hash: str_field(block, "previousblockhash").map(str::to_string),
        next_block_hash: str_field(block, "nextblockhash").map(str::to_string),
        stats,
        stats_error,
        hash,
    })
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Bounds for [`search_blocks`]. Heights are inclusive; `None` means open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockFilter {
    pub start_height: Option<u64>,
    pub end_height: Option<u64>,
    pub min_time: Option<i64>,
    pub max_time: Option<i64>,
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
    pub min_tx_count: Option<u64>,
    pub max_tx_count: Option<u64>,
}

impl BlockFilter {
    fn matches(&self, b: &BlockBrief) -> bool {
        fn within<T: PartialOrd>(v: T, lo: Option<T>, hi: Option<T>) -> bool {
            lo.map_or(true, |lo| v >= lo) && hi.map_or(true, |hi| v <= hi)
        }
        within(b.time, self.min_time, self.max_time)
            && within(b.size, self.min_size, self.max_size)
            && within(b.n_tx, self.min_tx_count, self.max_tx_count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockBrief {
    pub height: u64,
    pub hash: String,
    pub time: i64,
    pub size: u64,
    pub weight: Option<u64>,
    pub n_tx: u64,
    pub difficulty: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockSearch {
    /// Start actually scanned; above `requested_start` when `truncated`.
    pub start_height: u64,
    pub requested_start: u64,
    /// The range exceeded the scan limit and was cut to its newest blocks.
    pub truncated: bool,
    pub end_height: u64,
    pub scanned: usize,
    pub matches: Vec<BlockBrief>,
    pub failures: Vec<HeightFailure>,
}

/// Scans an inclusive height range and keeps blocks passing `filter`.
pub async fn search_blocks(
    client: Arc<dyn NodeClient>,
    filter: &BlockFilter,
    concurrency: usize,
) -> BitlensResult<BlockSearch> {
    let tip = queries::block_count(&*client).await?;
    let end = filter.end_height.unwrap_or(tip).min(tip);
    let start = filter
        .start_height
        .unwrap_or_else(|| end.saturating_sub(DEFAULT_SEARCH_DEPTH));
    if start > end {
        return Err(QueryError::invalid_input(format!(
            "search range {start}..={end} is empty at tip {tip}"
        )));
    }
    let requested_start = start;
    let start = start.max(end.saturating_sub(MAX_SEARCH_BLOCKS - 1));
    let truncated = start > requested_start;
    if truncated {
        tracing::warn!(
            requested_start,
            start,
            end,
            limit = MAX_SEARCH_BLOCKS,
            "search range cut to its newest blocks"
        );
    }

    let results = fan_out(start..=end, concurrency, |h| {
        let client = Arc::clone(&client);
        async move { fetch_brief(&*client, h).await }
    })
    .await;

    let scanned = results.len();
    let mut matches = Vec::new();
    let mut failures = Vec::new();
    for (height, result) in results {
        match result {
            Ok(brief) if filter.matches(&brief) => matches.push(brief),
            Ok(_) => {}
            Err(e) => failures.push(HeightFailure::new(height, e)),
        }
    }

    Ok(BlockSearch {
        start_height: start,
        requested_start,
        truncated,
        end_height: end,
        scanned,
        matches,
        failures,
    })
}

async fn fetch_brief(client: &dyn NodeClient, height: u64) -> BitlensResult<BlockBrief> {
    let hash = queries::block_hash(client, height).await?;
    let req = queries::get_block(&hash, 1);
    let payload = client.execute(&req).await?;
    let block = payload.expect_object("block").map_err(|e| req.annotate(e))?;
    let brief = || -> BitlensResult<BlockBrief> {
        const WHAT: &str = "block";
        Ok(BlockBrief {
            height: require(u64_field(block, "height"), WHAT, "height")?,
            time: require(i64_field(block, "time"), WHAT, "time")?,
            size: require(u64_field(block, "size"), WHAT, "size")?,
            weight: u64_field(block, "weight"),
            n_tx: require(u64_field(block, "nTx"), WHAT, "nTx")?,
            difficulty: f64_field(block, "difficulty").unwrap_or_default(),
            hash: hash.clone(),
        })
    };
    brief().map_err(|e| req.annotate(e))
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub executable_path: Option<String>,
    pub network: String,
    pub connected: bool,
    pub chain: Option<String>,
    pub blocks: Option<u64>,
    pub headers: Option<u64>,
    pub verification_progress: Option<f64>,
    pub version: Option<i64>,
    pub subversion: Option<String>,
    pub protocol_version: Option<i64>,
    pub connections: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryError>,
}

/// Whether the node answers, plus the identifying facts it reports.
pub async fn connection_info(client: &dyn NodeClient, config: &NodeConfig) -> ConnectionInfo {
    let mut info = ConnectionInfo {
        executable_path: config
            .executable_path
            .as_ref()
            .map(|p| p.display().to_string()),
        network: config.network.to_string(),
        connected: false,
        chain: None,
        blocks: None,
        headers: None,
        verification_progress: None,
        version: None,
        subversion: None,
        protocol_version: None,
        connections: None,
        error: None,
    };

    let chain = match client.execute(&queries::get_blockchain_info()).await {
        Ok(p) => p,
        Err(e) => {
            info.error = Some(e);
            return info;
        }
    };
    if let Some(obj) = chain.as_object() {
        info.chain = str_field(obj, "chain").map(str::to_string);
        info.blocks = u64_field(obj, "blocks");
        info.headers = u64_field(obj, "headers");
        info.verification_progress = f64_field(obj, "verificationprogress");
    }

    match client.execute(&queries::get_network_info()).await {
        Ok(p) => {
            if let Some(obj) = p.as_object() {
                info.version = i64_field(obj, "version");
                info.subversion = str_field(obj, "subversion").map(str::to_string);
                info.protocol_version = i64_field(obj, "protocolversion");
                info.connections = u64_field(obj, "connections");
            }
            info.connected = true;
        }
        Err(e) => info.error = Some(e),
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn header(height: u64) -> Object {
        json!({ "height": height, "time": 1_231_006_505, "difficulty": 1.0, "nTx": 1 })
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn header_height_must_round_trip() {
        let s = sample_from_header(5, "ab".repeat(32), &header(5)).unwrap();
        assert_eq!(s.height, 5);
        assert_eq!(s.n_tx, 1);
        let err = sample_from_header(5, "ab".repeat(32), &header(6)).unwrap_err();
        assert_eq!(err.kind, bitlens_core::ErrorKind::ProtocolError);
    }

    #[test]
    fn filter_bounds_inclusive() {
        let b = BlockBrief {
            height: 1,
            hash: String::new(),
            time: 100,
            size: 1_000,
            weight: None,
            n_tx: 10,
            difficulty: 1.0,
        };
        let f = BlockFilter {
            min_tx_count: Some(10),
            max_size: Some(1_000),
            ..Default::default()
        };
        assert!(f.matches(&b));
        let f = BlockFilter {
            min_time: Some(101),
            ..Default::default()
        };
        assert!(!f.matches(&b));
    }
}
