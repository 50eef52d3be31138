//! Multi-section reports. Every section is fetched independently and
//! recorded as [`Section::Ok`] or [`Section::Failed`]; the report itself
//! never fails.

use crate::blocks::{detailed_block_info, BlockDetails};
use crate::engine::{
    bucketize, AnalyticsEngine, BlockTimeDistribution, BucketCount, DifficultyHistory,
    EngineConfig, FeeHistory, HashrateEstimate,
};
use crate::fields::{f64_field, i64_field, nested_f64, str_field, u64_field, Object};
use bitlens_core::{BitlensResult, HeightRange, QueryError, Window};
use bitlens_provider::{queries, NodeClient};
use serde::Serialize;
use serde_json::Value;

/// Mempool fee-rate buckets in sat/vB; the last is open.
const MEMPOOL_FEE_BUCKETS: &[(f64, &str)] = &[
    (1.0, "0-1"),
    (2.0, "1-2"),
    (5.0, "2-5"),
    (10.0, "5-10"),
    (20.0, "10-20"),
    (50.0, "20-50"),
    (100.0, "50-100"),
    (f64::INFINITY, "100+"),
];

const ESTIMATE_MODE: &str = "CONSERVATIVE";
const ANALYSIS_FEE_TARGETS: [u32; 3] = [1, 6, 24];
const STATUS_FEE_TARGETS: [u32; 3] = [2, 6, 24];

/// Outcome of one report section.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    Ok(T),
    Failed(QueryError),
}

impl<T> Section<T> {
    pub fn ok(&self) -> Option<&T> {
        match self {
            Section::Ok(v) => Some(v),
            Section::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&QueryError> {
        match self {
            Section::Ok(_) => None,
            Section::Failed(e) => Some(e),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Section::Ok(_))
    }
}

impl<T> From<BitlensResult<T>> for Section<T> {
    fn from(result: BitlensResult<T>) -> Self {
        match result {
            Ok(v) => Section::Ok(v),
            Err(e) => Section::Failed(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Node state sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ChainState {
    pub chain: String,
    pub blocks: u64,
    pub headers: Option<u64>,
    pub best_block_hash: Option<String>,
    pub difficulty: Option<f64>,
    pub median_time: Option<i64>,
    pub verification_progress: Option<f64>,
    pub initial_block_download: Option<bool>,
    pub size_on_disk: Option<u64>,
    pub pruned: Option<bool>,
}

pub async fn chain_state(client: &dyn NodeClient) -> BitlensResult<ChainState> {
    let req = queries::get_blockchain_info();
    let payload = client.execute(&req).await?;
    let obj = payload.expect_object("blockchain info").map_err(|e| req.annotate(e))?;
    Ok(ChainState {
        chain: str_field(obj, "chain").unwrap_or_default().to_string(),
        blocks: u64_field(obj, "blocks")
            .ok_or_else(|| req.annotate(QueryError::protocol("blockchain info has no block count")))?,
        headers: u64_field(obj, "headers"),
        best_block_hash: str_field(obj, "bestblockhash").map(str::to_string),
        difficulty: f64_field(obj, "difficulty"),
        median_time: i64_field(obj, "mediantime"),
        verification_progress: f64_field(obj, "verificationprogress"),
        initial_block_download: obj.get("initialblockdownload").and_then(Value::as_bool),
        size_on_disk: u64_field(obj, "size_on_disk"),
        pruned: obj.get("pruned").and_then(Value::as_bool),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkState {
    pub version: Option<i64>,
    pub subversion: Option<String>,
    pub protocol_version: Option<i64>,
    pub connections: Option<u64>,
    pub connections_in: Option<u64>,
    pub connections_out: Option<u64>,
    pub relay_fee: Option<f64>,
    pub network_active: Option<bool>,
}

pub async fn network_state(client: &dyn NodeClient) -> BitlensResult<NetworkState> {
    let req = queries::get_network_info();
    let payload = client.execute(&req).await?;
    let obj = payload.expect_object("network info").map_err(|e| req.annotate(e))?;
    Ok(NetworkState {
        version: i64_field(obj, "version"),
        subversion: str_field(obj, "subversion").map(str::to_string),
        protocol_version: i64_field(obj, "protocolversion"),
        connections: u64_field(obj, "connections"),
        connections_in: u64_field(obj, "connections_in"),
        connections_out: u64_field(obj, "connections_out"),
        relay_fee: f64_field(obj, "relayfee"),
        network_active: obj.get("networkactive").and_then(Value::as_bool),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct MempoolState {
    pub size: u64,
    pub bytes: u64,
    pub usage: Option<u64>,
    pub max_mempool: Option<u64>,
    /// BTC/kvB.
    pub min_fee: Option<f64>,
    pub min_relay_fee: Option<f64>,
}

pub async fn mempool_state(client: &dyn NodeClient) -> BitlensResult<MempoolState> {
    let req = queries::get_mempool_info();
    let payload = client.execute(&req).await?;
    let obj = payload.expect_object("mempool info").map_err(|e| req.annotate(e))?;
    Ok(MempoolState {
        size: u64_field(obj, "size").unwrap_or_default(),
        bytes: u64_field(obj, "bytes").unwrap_or_default(),
        usage: u64_field(obj, "usage"),
        max_mempool: u64_field(obj, "maxmempool"),
        min_fee: f64_field(obj, "mempoolminfee"),
        min_relay_fee: f64_field(obj, "minrelaytxfee"),
    })
}

/// One `estimatesmartfee` answer.
#[derive(Debug, Clone, Serialize)]
pub struct FeeEstimate {
    pub target_blocks: u32,
    /// BTC/kvB as reported.
    pub fee_rate: Option<f64>,
    pub sat_per_vbyte: Option<f64>,
    pub blocks: Option<u64>,
    /// Estimator notes, e.g. "Insufficient data or no feerate found".
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<QueryError>,
}

async fn fee_estimate(client: &dyn NodeClient, target: u32) -> FeeEstimate {
    let mut estimate = FeeEstimate {
        target_blocks: target,
        fee_rate: None,
        sat_per_vbyte: None,
        blocks: None,
        notes: Vec::new(),
        error: None,
    };
    match client.execute(&queries::estimate_smart_fee(target, ESTIMATE_MODE)).await {
        Ok(payload) => {
            if let Some(obj) = payload.as_object() {
                estimate.fee_rate = f64_field(obj, "feerate");
                estimate.sat_per_vbyte = estimate.fee_rate.map(|r| r * 1e5);
                estimate.blocks = u64_field(obj, "blocks");
                estimate.notes = obj
                    .get("errors")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default();
            }
        }
        Err(e) => estimate.error = Some(e),
    }
    estimate
}

async fn fee_estimates(client: &dyn NodeClient, targets: [u32; 3]) -> Vec<FeeEstimate> {
    let [a, b, c] = targets;
    let (a, b, c) = tokio::join!(
        fee_estimate(client, a),
        fee_estimate(client, b),
        fee_estimate(client, c)
    );
    vec![a, b, c]
}

#[derive(Debug, Clone, Serialize)]
pub struct MempoolAnalysis {
    #[serde(flatten)]
    pub state: MempoolState,
    pub fee_distribution: Section<Vec<BucketCount>>,
    pub fee_estimates: Vec<FeeEstimate>,
}

/// Mempool totals, fee-rate histogram of every entry and smart-fee estimates.
pub async fn mempool_analysis(client: &dyn NodeClient) -> BitlensResult<MempoolAnalysis> {
    let (state, distribution, estimates) = tokio::join!(
        mempool_state(client),
        mempool_fee_distribution(client),
        fee_estimates(client, ANALYSIS_FEE_TARGETS)
    );
    Ok(MempoolAnalysis {
        state: state?,
        fee_distribution: distribution.into(),
        fee_estimates: estimates,
    })
}

async fn mempool_fee_distribution(client: &dyn NodeClient) -> BitlensResult<Vec<BucketCount>> {
    let req = queries::get_raw_mempool(true);
    let payload = client.execute(&req).await?;
    let entries = payload.expect_object("verbose mempool").map_err(|e| req.annotate(e))?;
    let rates = entries.values().filter_map(Value::as_object).filter_map(entry_fee_rate);
    Ok(bucketize(rates, MEMPOOL_FEE_BUCKETS))
}

/// sat/vB of a verbose mempool entry.
fn entry_fee_rate(entry: &Object) -> Option<f64> {
    let fee_btc = nested_f64(entry, "fees", "base").or_else(|| f64_field(entry, "fee"))?;
    let vsize = u64_field(entry, "vsize").filter(|v| *v > 0)?;
    Some(fee_btc * 1e8 / vsize as f64)
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BlockchainStatus {
    pub chain: Section<ChainState>,
    pub network: Section<NetworkState>,
    pub mempool: Section<MempoolState>,
    pub fee_estimates: Vec<FeeEstimate>,
    pub failed_sections: Vec<&'static str>,
}

/// Chain, network, mempool and fee estimates in one report.
pub async fn blockchain_status(client: &dyn NodeClient) -> BlockchainStatus {
    let (chain, network, mempool, fee_estimates) = tokio::join!(
        chain_state(client),
        network_state(client),
        mempool_state(client),
        fee_estimates(client, STATUS_FEE_TARGETS)
    );
    let mut status = BlockchainStatus {
        chain: chain.into(),
        network: network.into(),
        mempool: mempool.into(),
        fee_estimates,
        failed_sections: Vec::new(),
    };
    for (name, ok) in [
        ("chain", status.chain.is_ok()),
        ("network", status.network.is_ok()),
        ("mempool", status.mempool.is_ok()),
    ] {
        if !ok {
            status.failed_sections.push(name);
        }
    }
    status
}

#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveAnalysis {
    pub range: Section<HeightRange>,
    pub chain: Section<ChainState>,
    pub network: Section<NetworkState>,
    pub latest_block: Section<BlockDetails>,
    pub mempool: Section<MempoolAnalysis>,
    pub difficulty: Section<DifficultyHistory>,
    pub fees: Section<FeeHistory>,
    pub hashrate: Section<HashrateEstimate>,
    pub block_times: Section<BlockTimeDistribution>,
    pub failed_sections: Vec<&'static str>,
}

impl ComprehensiveAnalysis {
    fn collect_failures(&mut self) {
        let sections = [
            ("range", self.range.is_ok()),
            ("chain", self.chain.is_ok()),
            ("network", self.network.is_ok()),
            ("latest_block", self.latest_block.is_ok()),
            ("mempool", self.mempool.is_ok()),
            ("difficulty", self.difficulty.is_ok()),
            ("fees", self.fees.is_ok()),
            ("hashrate", self.hashrate.is_ok()),
            ("block_times", self.block_times.is_ok()),
        ];
        self.failed_sections = sections
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(name, _)| name)
            .collect();
    }
}

/// Every statistic over `window` plus node state, each independently fallible.
pub async fn comprehensive_analysis(
    engine: &AnalyticsEngine,
    window: Window,
) -> ComprehensiveAnalysis {
    let client = &**engine.client();

    // The four window statistics run side by side; split the budget.
    let share = EngineConfig {
        concurrency: (engine.config().concurrency / 4).max(1),
        ..*engine.config()
    };
    let stats_engine = engine.with_config(share);

    let window_stats = async {
        match stats_engine.resolve(window).await {
            Ok(range) => {
                let (difficulty, fees, hashrate, block_times) = tokio::join!(
                    stats_engine.difficulty_history_in(range, None),
                    stats_engine.fee_history_in(range),
                    stats_engine.hashrate_estimate_in(range),
                    stats_engine.block_time_distribution_in(range)
                );
                (
                    Section::Ok(range),
                    Section::from(difficulty),
                    Section::Ok(fees),
                    Section::from(hashrate),
                    Section::from(block_times),
                )
            }
            Err(e) => (
                Section::Failed(e.clone()),
                Section::Failed(e.clone()),
                Section::Failed(e.clone()),
                Section::Failed(e.clone()),
                Section::Failed(e),
            ),
        }
    };

    let latest_block = async {
        let tip = queries::block_count(client).await?;
        detailed_block_info(client, &tip.to_string()).await
    };

    let (window_sections, chain, network, latest_block, mempool) = tokio::join!(
        window_stats,
        chain_state(client),
        network_state(client),
        latest_block,
        mempool_analysis(client)
    );

    let (range, difficulty, fees, hashrate, block_times) = window_sections;
    let mut report = ComprehensiveAnalysis {
        range,
        chain: chain.into(),
        network: network.into(),
        latest_block: latest_block.into(),
        mempool: mempool.into(),
        difficulty,
        fees,
        hashrate,
        block_times,
        failed_sections: Vec::new(),
    };
    report.collect_failures();
    if !report.failed_sections.is_empty() {
        tracing::warn!(failed = ?report.failed_sections, "comprehensive analysis incomplete");
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mempool_entry_rate_uses_base_fee_and_vsize() {
        let e = json!({ "vsize": 141, "fees": { "base": 0.00000282, "modified": 0.00000282 } });
        let rate = entry_fee_rate(e.as_object().unwrap()).unwrap();
        assert!((rate - 2.0).abs() < 1e-9);
        let e = json!({ "vsize": 0, "fees": { "base": 0.0001 } });
        assert!(entry_fee_rate(e.as_object().unwrap()).is_none());
    }

    #[test]
    fn section_serializes_tagged() {
        let ok: Section<u32> = Section::Ok(7);
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({ "status": "ok", "data": 7 }));
        let failed: Section<u32> = Err(QueryError::unavailable("pruned")).into();
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["data"]["kind"], "data_unavailable");
    }
}
