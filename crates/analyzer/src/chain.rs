//! Chain-wide node answers: tips, transaction throughput, current
//! difficulty and UTXO set totals.

use crate::fields::{f64_field, i64_field, require, str_field, u64_field};
use bitlens_core::types::is_hex_hash;
use bitlens_core::{BitlensResult, QueryError};
use bitlens_provider::{queries, NodeClient};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainTip {
    pub height: u64,
    pub hash: String,
    /// Zero for the active tip.
    pub branch_len: u64,
    /// `active`, `valid-fork`, `valid-headers`, `headers-only` or `invalid`.
    pub status: String,
}

impl ChainTip {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// Every known tip, active chain first, then forks by descending height.
pub async fn chain_tips(client: &dyn NodeClient) -> BitlensResult<Vec<ChainTip>> {
    let req = queries::get_chain_tips();
    let payload = client.execute(&req).await?;
    let entries = payload
        .as_array()
        .ok_or_else(|| req.annotate(QueryError::protocol("chain tips is not a list")))?;

    let mut tips = entries
        .iter()
        .map(|entry| {
            const WHAT: &str = "chain tip";
            let obj = entry
                .as_object()
                .ok_or_else(|| QueryError::protocol("chain tip is not an object"))?;
            Ok(ChainTip {
                height: require(u64_field(obj, "height"), WHAT, "height")?,
                hash: require(str_field(obj, "hash"), WHAT, "hash")?.to_string(),
                branch_len: u64_field(obj, "branchlen").unwrap_or_default(),
                status: str_field(obj, "status").unwrap_or("unknown").to_string(),
            })
        })
        .collect::<BitlensResult<Vec<_>>>()
        .map_err(|e| req.annotate(e))?;

    tips.sort_by(|a, b| b.is_active().cmp(&a.is_active()).then(b.height.cmp(&a.height)));
    Ok(tips)
}

#[derive(Debug, Clone, Serialize)]
pub struct ChainTxStats {
    pub time: Option<i64>,
    /// Transactions in the chain up to the window's final block.
    pub tx_count: u64,
    pub final_block_hash: Option<String>,
    pub final_block_height: Option<u64>,
    pub window_block_count: Option<u64>,
    /// Absent when the window is a single block.
    pub window_tx_count: Option<u64>,
    pub window_interval: Option<i64>,
    /// Transactions per second over the window.
    pub tx_rate: Option<f64>,
}

/// Transaction throughput over the `nblocks` ending at `block_hash`, or the
/// node's default window ending at the tip.
pub async fn chain_tx_stats(
    client: &dyn NodeClient,
    nblocks: Option<u64>,
    block_hash: Option<&str>,
) -> BitlensResult<ChainTxStats> {
    if let Some(hash) = block_hash {
        if nblocks.is_none() {
            return Err(QueryError::invalid_input(
                "a final block hash needs a block count",
            ));
        }
        if !is_hex_hash(hash) {
            return Err(QueryError::invalid_input(format!(
                "{hash} is not a 64-hex block hash"
            )));
        }
    }
    if nblocks == Some(0) {
        return Err(QueryError::invalid_input("block count must be positive"));
    }

    let req = queries::get_chain_tx_stats(nblocks, block_hash);
    let payload = client.execute(&req).await?;
    let obj = payload.expect_object("chain tx stats").map_err(|e| req.annotate(e))?;
    Ok(ChainTxStats {
        time: i64_field(obj, "time"),
        tx_count: require(u64_field(obj, "txcount"), "chain tx stats", "txcount")
            .map_err(|e| req.annotate(e))?,
        final_block_hash: str_field(obj, "window_final_block_hash").map(str::to_string),
        final_block_height: u64_field(obj, "window_final_block_height"),
        window_block_count: u64_field(obj, "window_block_count"),
        window_tx_count: u64_field(obj, "window_tx_count"),
        window_interval: i64_field(obj, "window_interval"),
        tx_rate: f64_field(obj, "txrate"),
    })
}

/// Proof-of-work difficulty of the tip.
pub async fn current_difficulty(client: &dyn NodeClient) -> BitlensResult<f64> {
    let req = queries::get_difficulty();
    let payload = client.execute(&req).await?;
    payload
        .as_f64()
        .filter(|d| d.is_finite() && *d > 0.0)
        .ok_or_else(|| req.annotate(QueryError::protocol("difficulty is not a positive number")))
}

#[derive(Debug, Clone, Serialize)]
pub struct UtxoSetInfo {
    pub height: u64,
    pub best_block: String,
    pub txouts: u64,
    pub transactions: Option<u64>,
    pub bogosize: Option<u64>,
    /// BTC as reported.
    pub total_amount: f64,
    pub disk_size: Option<u64>,
    /// `hash_serialized_3`, `hash_serialized_2` or `muhash`, whichever the node reports.
    pub set_hash: Option<String>,
}

/// Totals over the unspent output set. Slow on large chains.
pub async fn utxo_set_info(client: &dyn NodeClient) -> BitlensResult<UtxoSetInfo> {
    const WHAT: &str = "utxo set info";

    let req = queries::get_tx_out_set_info();
    let payload = client.execute(&req).await?;
    let obj = payload.expect_object(WHAT).map_err(|e| req.annotate(e))?;
    let info = || -> BitlensResult<UtxoSetInfo> {
        Ok(UtxoSetInfo {
            height: require(u64_field(obj, "height"), WHAT, "height")?,
            best_block: require(str_field(obj, "bestblock"), WHAT, "bestblock")?.to_string(),
            txouts: require(u64_field(obj, "txouts"), WHAT, "txouts")?,
            transactions: u64_field(obj, "transactions"),
            bogosize: u64_field(obj, "bogosize"),
            total_amount: require(f64_field(obj, "total_amount"), WHAT, "total_amount")?,
            disk_size: u64_field(obj, "disk_size"),
            set_hash: ["hash_serialized_3", "hash_serialized_2", "muhash"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::to_string),
        })
    };
    info().map_err(|e| req.annotate(e))
}
