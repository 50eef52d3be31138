//! Typed constructors for the read-only node methods bitlens uses.
//!
//! Only queries live here: nothing that touches a wallet or broadcasts.

use crate::NodeClient;
use bitlens_core::types::is_hex_hash;
use bitlens_core::{BitlensResult, Payload, QueryError, QueryRequest};

/// Every method the constructors below issue. Wallet, mining and
/// broadcast methods are absent even where they share a `get` prefix.
pub const READ_ONLY_METHODS: &[&str] = &[
    "getblockchaininfo",
    "getnetworkinfo",
    "getblockcount",
    "getblockhash",
    "getblock",
    "getblockheader",
    "getblockstats",
    "getchaintips",
    "getchaintxstats",
    "getdifficulty",
    "getmempoolinfo",
    "getrawmempool",
    "getmempoolentry",
    "getmempoolancestors",
    "getmempooldescendants",
    "gettxout",
    "gettxoutsetinfo",
    "getrawtransaction",
    "decoderawtransaction",
    "estimatesmartfee",
];

pub fn is_read_only(method: &str) -> bool {
    READ_ONLY_METHODS.contains(&method)
}

pub fn get_blockchain_info() -> QueryRequest {
    QueryRequest::new("getblockchaininfo")
}

pub fn get_network_info() -> QueryRequest {
    QueryRequest::new("getnetworkinfo")
}

pub fn get_block_count() -> QueryRequest {
    QueryRequest::new("getblockcount")
}

pub fn get_block_hash(height: u64) -> QueryRequest {
    QueryRequest::new("getblockhash").arg(height)
}

/// Verbosity 0 = hex, 1 = header + txids, 2 = full transactions.
pub fn get_block(hash: &str, verbosity: u8) -> QueryRequest {
    QueryRequest::new("getblock")
        .arg(hash)
        .arg(i64::from(verbosity))
}

pub fn get_block_header(hash: &str) -> QueryRequest {
    QueryRequest::new("getblockheader").arg(hash).arg(true)
}

pub fn get_block_stats(hash_or_height: &str) -> QueryRequest {
    match hash_or_height.parse::<u64>() {
        Ok(height) => QueryRequest::new("getblockstats").arg(height),
        Err(_) => QueryRequest::new("getblockstats").arg(hash_or_height),
    }
}

pub fn get_chain_tips() -> QueryRequest {
    QueryRequest::new("getchaintips")
}

pub fn get_chain_tx_stats(nblocks: Option<u64>, block_hash: Option<&str>) -> QueryRequest {
    let mut req = QueryRequest::new("getchaintxstats");
    if let Some(n) = nblocks {
        req = req.arg(n);
        if let Some(hash) = block_hash {
            req = req.arg(hash);
        }
    }
    req
}

pub fn get_difficulty() -> QueryRequest {
    QueryRequest::new("getdifficulty")
}

pub fn get_mempool_info() -> QueryRequest {
    QueryRequest::new("getmempoolinfo")
}

pub fn get_raw_mempool(verbose: bool) -> QueryRequest {
    QueryRequest::new("getrawmempool").arg(verbose)
}

pub fn get_mempool_entry(txid: &str) -> QueryRequest {
    QueryRequest::new("getmempoolentry").arg(txid)
}

pub fn get_mempool_ancestors(txid: &str) -> QueryRequest {
    QueryRequest::new("getmempoolancestors").arg(txid).arg(true)
}

pub fn get_mempool_descendants(txid: &str) -> QueryRequest {
    QueryRequest::new("getmempooldescendants").arg(txid).arg(true)
}

pub fn get_tx_out(txid: &str, n: u32, include_mempool: bool) -> QueryRequest {
    QueryRequest::new("gettxout")
        .arg(txid)
        .arg(n)
        .arg(include_mempool)
}

pub fn get_tx_out_set_info() -> QueryRequest {
    QueryRequest::new("gettxoutsetinfo")
}

/// Verbosity 0 = hex, 1 = decoded, 2 = decoded with prevouts.
pub fn get_raw_transaction(txid: &str, verbosity: u8, block_hash: Option<&str>) -> QueryRequest {
    let req = QueryRequest::new("getrawtransaction")
        .arg(txid)
        .arg(i64::from(verbosity));
    match block_hash {
        Some(hash) => req.arg(hash),
        None => req,
    }
}

pub fn decode_raw_transaction(hex: &str) -> QueryRequest {
    QueryRequest::new("decoderawtransaction").arg(hex)
}

pub fn estimate_smart_fee(conf_target: u32, mode: &str) -> QueryRequest {
    QueryRequest::new("estimatesmartfee")
        .arg(conf_target)
        .arg(mode)
}

// ---------------------------------------------------------------------------
// Decoded helpers
// ---------------------------------------------------------------------------

/// Current tip height.
pub async fn block_count(client: &dyn NodeClient) -> BitlensResult<u64> {
    let req = get_block_count();
    let payload = client.execute(&req).await?;
    payload
        .as_u64()
        .ok_or_else(|| req.annotate(QueryError::protocol("block count is not an integer")))
}

/// Hash of the block at `height`.
pub async fn block_hash(client: &dyn NodeClient, height: u64) -> BitlensResult<String> {
    let req = get_block_hash(height);
    let payload = client.execute(&req).await?;
    expect_hash(&req, &payload)
}

fn expect_hash(req: &QueryRequest, payload: &Payload) -> BitlensResult<String> {
    match payload.as_str() {
        Some(hash) if is_hex_hash(hash) => Ok(hash.to_ascii_lowercase()),
        _ => Err(req.annotate(QueryError::protocol(format!(
            "expected a 64-hex block hash, got {payload:?}"
        )))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitlens_core::Param;

    #[test]
    fn block_request_shape() {
        let req = get_block("00ff", 2);
        assert_eq!(req.method(), "getblock");
        assert_eq!(req.args(), &[Param::Str("00ff".into()), Param::Int(2)]);
        assert_eq!(req.cli_args(), vec!["00ff", "2"]);
    }

    #[test]
    fn block_stats_accepts_height_or_hash() {
        assert_eq!(get_block_stats("100").args(), &[Param::Int(100)]);
        assert_eq!(get_block_stats("abcd").args(), &[Param::Str("abcd".into())]);
    }

    #[test]
    fn chain_tx_stats_hash_requires_count() {
        assert!(get_chain_tx_stats(None, Some("ab")).args().is_empty());
        assert_eq!(get_chain_tx_stats(Some(30), Some("ab")).args().len(), 2);
    }

    #[test]
    fn wallet_methods_are_not_read_only() {
        for method in ["getnewaddress", "getrawchangeaddress", "getbalance", "getwalletinfo", "sendrawtransaction", "stop"] {
            assert!(!is_read_only(method), "{method}");
        }
        assert!(is_read_only("getblockcount"));
        assert!(!is_read_only("GETBLOCKCOUNT"));
    }

    #[test]
    fn constructors_stay_inside_allowlist() {
        let issued = [
            get_blockchain_info(),
            get_network_info(),
            get_block_count(),
            get_block_hash(1),
            get_block("aa", 1),
            get_block_header("aa"),
            get_block_stats("1"),
            get_chain_tips(),
            get_chain_tx_stats(None, None),
            get_difficulty(),
            get_mempool_info(),
            get_raw_mempool(true),
            get_mempool_entry("aa"),
            get_mempool_ancestors("aa"),
            get_mempool_descendants("aa"),
            get_tx_out("aa", 0, true),
            get_tx_out_set_info(),
            get_raw_transaction("aa", 1, None),
            decode_raw_transaction("00"),
            estimate_smart_fee(6, "CONSERVATIVE"),
        ];
        for req in &issued {
            assert!(is_read_only(req.method()), "{}", req.method());
        }
        assert_eq!(issued.len(), READ_ONLY_METHODS.len());
    }

    #[test]
    fn tx_out_flags() {
        assert_eq!(get_tx_out("aa", 1, true).cli_args(), vec!["aa", "1", "true"]);
    }

    #[test]
    fn hash_scalar_validated() {
        let req = get_block_hash(0);
        let good = Payload::from_value(serde_json::json!(
            "000000000019D6689C085AE165831E934FF763AE46A2A6C172B3F1B60A8CE26F"
        ));
        assert_eq!(
            expect_hash(&req, &good).unwrap(),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
        let bad = Payload::from_value(serde_json::json!(12));
        let err = expect_hash(&req, &bad).unwrap_err();
        assert_eq!(err.method.as_deref(), Some("getblockhash"));
    }
}
