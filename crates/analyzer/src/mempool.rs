//! Single-transaction mempool lookups and in-mempool ancestry.

use crate::fields::{btc_to_sats, i64_field, nested_f64, require, u64_field, Object};
use bitlens_core::types::is_hex_hash;
use bitlens_core::{BitlensResult, QueryError, QueryRequest};
use bitlens_provider::{queries, NodeClient};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MempoolEntry {
    pub txid: String,
    pub vsize: u64,
    pub weight: Option<u64>,
    /// Entry time, unix seconds.
    pub time: Option<i64>,
    /// Tip height when the transaction entered the mempool.
    pub height: Option<u64>,
    pub fee_sats: Option<u64>,
    /// Fee after `prioritisetransaction` adjustments.
    pub modified_fee_sats: Option<u64>,
    pub fee_rate_sat_per_vbyte: Option<f64>,
    pub ancestor_count: Option<u64>,
    pub ancestor_size: Option<u64>,
    pub descendant_count: Option<u64>,
    pub descendant_size: Option<u64>,
    /// Unconfirmed parents.
    pub depends: Vec<String>,
    pub spent_by: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replaceable: Option<bool>,
}

impl MempoolEntry {
    fn from_object(txid: &str, obj: &Object) -> BitlensResult<Self> {
        let vsize = require(u64_field(obj, "vsize"), "mempool entry", "vsize")?;
        let fee_sats = nested_f64(obj, "fees", "base")
            .or_else(|| obj.get("fee").and_then(Value::as_f64))
            .and_then(btc_to_sats);
        Ok(MempoolEntry {
            txid: txid.to_string(),
            vsize,
            weight: u64_field(obj, "weight"),
            time: i64_field(obj, "time"),
            height: u64_field(obj, "height"),
            fee_sats,
            modified_fee_sats: nested_f64(obj, "fees", "modified").and_then(btc_to_sats),
            fee_rate_sat_per_vbyte: fee_sats
                .filter(|_| vsize > 0)
                .map(|fee| fee as f64 / vsize as f64),
            ancestor_count: u64_field(obj, "ancestorcount"),
            ancestor_size: u64_field(obj, "ancestorsize"),
            descendant_count: u64_field(obj, "descendantcount"),
            descendant_size: u64_field(obj, "descendantsize"),
            depends: txid_list(obj, "depends"),
            spent_by: txid_list(obj, "spentby"),
            replaceable: obj.get("bip125-replaceable").and_then(Value::as_bool),
        })
    }
}

fn txid_list(obj: &Object, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn checked_txid(txid: &str) -> BitlensResult<String> {
    let txid = txid.trim();
    if !is_hex_hash(txid) {
        return Err(QueryError::invalid_input(format!(
            "{txid} is not a 64-hex transaction id"
        )));
    }
    Ok(txid.to_ascii_lowercase())
}

/// The mempool entry of `txid`; a confirmed or unknown transaction is a node error.
pub async fn mempool_entry(client: &dyn NodeClient, txid: &str) -> BitlensResult<MempoolEntry> {
    let txid = checked_txid(txid)?;
    let req = queries::get_mempool_entry(&txid);
    let payload = client.execute(&req).await.map_err(|e| req.annotate(e))?;
    let obj = payload.expect_object("mempool entry").map_err(|e| req.annotate(e))?;
    MempoolEntry::from_object(&txid, obj).map_err(|e| req.annotate(e))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Ancestors,
    Descendants,
}

/// In-mempool ancestors or descendants of one transaction, excluding itself.
#[derive(Debug, Clone, Serialize)]
pub struct MempoolFamily {
    pub txid: String,
    pub relation: Relation,
    pub count: usize,
    pub total_vsize: u64,
    pub total_fee_sats: u64,
    /// Sorted by txid.
    pub entries: Vec<MempoolEntry>,
}

pub async fn mempool_ancestors(client: &dyn NodeClient, txid: &str) -> BitlensResult<MempoolFamily> {
    let txid = checked_txid(txid)?;
    family(client, queries::get_mempool_ancestors(&txid), txid, Relation::Ancestors).await
}

pub async fn mempool_descendants(client: &dyn NodeClient, txid: &str) -> BitlensResult<MempoolFamily> {
    let txid = checked_txid(txid)?;
    family(client, queries::get_mempool_descendants(&txid), txid, Relation::Descendants).await
}

async fn family(
    client: &dyn NodeClient,
    req: QueryRequest,
    txid: String,
    relation: Relation,
) -> BitlensResult<MempoolFamily> {
    let payload = client.execute(&req).await.map_err(|e| req.annotate(e))?;
    let map = payload.expect_object("verbose mempool relatives").map_err(|e| req.annotate(e))?;

    let mut entries = map
        .iter()
        .map(|(id, entry)| {
            let obj = entry
                .as_object()
                .ok_or_else(|| QueryError::protocol(format!("mempool entry {id} is not an object")))?;
            MempoolEntry::from_object(id, obj)
        })
        .collect::<BitlensResult<Vec<_>>>()
        .map_err(|e| req.annotate(e))?;
    entries.sort_by(|a, b| a.txid.cmp(&b.txid));

    tracing::debug!(txid = %txid, ?relation, count = entries.len(), "mempool family");
    Ok(MempoolFamily {
        count: entries.len(),
        total_vsize: entries.iter().map(|e| e.vsize).sum(),
        total_fee_sats: entries.iter().filter_map(|e| e.fee_sats).sum(),
        txid,
        relation,
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_fields_and_rate() {
        let obj = json!({
            "vsize": 141, "weight": 561, "time": 1_700_000_000, "height": 820_000,
            "fees": { "base": 0.00002820, "modified": 0.00002820 },
            "depends": ["aa"], "spentby": [], "bip125-replaceable": true
        });
        let e = MempoolEntry::from_object("ff", obj.as_object().unwrap()).unwrap();
        assert_eq!(e.fee_sats, Some(2_820));
        assert_eq!(e.fee_rate_sat_per_vbyte, Some(20.0));
        assert_eq!(e.depends, vec!["aa"]);
        assert_eq!(e.replaceable, Some(true));
    }

    #[test]
    fn txid_is_validated_before_any_call() {
        assert_eq!(checked_txid(&"AB".repeat(32)).unwrap(), "ab".repeat(32));
        assert!(checked_txid("abc").is_err());
    }
}
