//! Scripted in-memory node: a synthetic chain answering the subset of node
//! methods the analyzer uses, with a per-method invocation counter.
#![allow(dead_code)]

use async_trait::async_trait;
use bitlens_core::{ErrorKind, Payload, QueryError, QueryRequest, QueryResult};
use bitlens_provider::NodeClient;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const GENESIS_TIME: i64 = 1_296_688_602;

pub fn block_hash_for(height: u64) -> String {
    format!("{:016x}{:048x}", 0xb10c_u64, height)
}

pub fn txid_for(seed: u64) -> String {
    format!("{:016x}{:048x}", 0x7a_u64, seed)
}

fn node_error(code: i64, text: &str) -> QueryError {
    QueryError::new(
        ErrorKind::NodeError,
        format!("error code: {code}\nerror message:\n{text}"),
    )
    .with_code(Some(code))
}

pub struct FakeBlock {
    pub hash: String,
    pub time: i64,
    pub difficulty: f64,
    pub txs: Vec<Value>,
}

pub struct FakeChain {
    blocks: Vec<FakeBlock>,
    heights: HashMap<String, u64>,
    transactions: HashMap<String, Value>,
    unavailable_blocks: HashSet<u64>,
    failing_methods: HashSet<&'static str>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl FakeChain {
    /// `len` blocks, `spacing` seconds apart, constant difficulty 1.
    ///
    /// Every block holds a coinbase plus two spends paying 10 and 20 sat/vB,
    /// both with `fee` fields and with their previous transactions known.
    pub fn linear(len: u64, spacing: i64) -> Self {
        let times: Vec<i64> = (0..len).map(|h| GENESIS_TIME + h as i64 * spacing).collect();
        Self::with_times(&times)
    }

    pub fn with_times(times: &[i64]) -> Self {
        let mut chain = FakeChain {
            blocks: Vec::with_capacity(times.len()),
            heights: HashMap::new(),
            transactions: HashMap::new(),
            unavailable_blocks: HashSet::new(),
            failing_methods: HashSet::new(),
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        };
        for (h, time) in times.iter().enumerate() {
            let h = h as u64;
            let hash = block_hash_for(h);
            let txs = vec![
                coinbase(h),
                chain.spend(h * 10 + 1, 51_000, 50_000, 100),
                chain.spend(h * 10 + 2, 54_000, 50_000, 200),
            ];
            for tx in &txs {
                if let Some(id) = tx["txid"].as_str() {
                    chain.transactions.insert(id.to_string(), tx.clone());
                }
            }
            chain.heights.insert(hash.clone(), h);
            chain.blocks.push(FakeBlock {
                hash,
                time: *time,
                difficulty: 1.0,
                txs,
            });
        }
        chain
    }

    /// A spend of one previous output worth `in_sats`, paying `out_sats`.
    fn spend(&mut self, seed: u64, in_sats: u64, out_sats: u64, vsize: u64) -> Value {
        let prev = txid_for(1_000_000 + seed);
        self.transactions.insert(
            prev.clone(),
            json!({
                "txid": prev,
                "size": 200, "vsize": 150,
                "vin": [{ "coinbase": "00" }],
                "vout": [{ "n": 0, "value": sats_to_btc(in_sats), "scriptPubKey": { "type": "witness_v0_keyhash" } }]
            }),
        );
        json!({
            "txid": txid_for(seed),
            "size": vsize + 40,
            "vsize": vsize,
            "weight": vsize * 4,
            "fee": sats_to_btc(in_sats - out_sats),
            "vin": [{ "txid": prev, "vout": 0 }],
            "vout": [{ "n": 0, "value": sats_to_btc(out_sats), "scriptPubKey": { "type": "witness_v1_taproot", "address": "bcrt1p..." } }]
        })
    }

    /// Drops `fee` fields, as nodes without undo data report blocks.
    pub fn without_fee_fields(mut self) -> Self {
        for block in &mut self.blocks {
            for tx in &mut block.txs {
                if let Some(obj) = tx.as_object_mut() {
                    obj.remove("fee");
                }
            }
        }
        self
    }

    /// Forgets every previous transaction, so no input can be resolved.
    pub fn without_history(mut self) -> Self {
        let in_blocks: HashSet<String> = self
            .blocks
            .iter()
            .flat_map(|b| b.txs.iter())
            .filter_map(|tx| tx["txid"].as_str().map(str::to_string))
            .collect();
        self.transactions.retain(|id, _| in_blocks.contains(id));
        self
    }

    /// Appends `count` spends paying 5 sat/vB to the block at `height`.
    pub fn with_extra_spends(mut self, height: u64, count: u64) -> Self {
        for i in 0..count {
            let tx = self.spend(500_000 + height * 100 + i, 51_000, 50_000, 200);
            self.push_tx(height, tx);
        }
        self
    }

    /// Appends a spend whose previous transaction the node does not know.
    pub fn with_orphan_spend(mut self, height: u64) -> Self {
        let tx = self.spend(600_000 + height, 51_000, 50_000, 100);
        if let Some(prev) = tx["vin"][0]["txid"].as_str() {
            self.transactions.remove(prev);
        }
        self.push_tx(height, tx);
        self
    }

    fn push_tx(&mut self, height: u64, tx: Value) {
        self.insert_transaction(tx.clone());
        if let Some(block) = self.blocks.get_mut(height as usize) {
            block.txs.push(tx);
        }
    }

    pub fn unavailable_block(mut self, height: u64) -> Self {
        self.unavailable_blocks.insert(height);
        self
    }

    pub fn failing(mut self, method: &'static str) -> Self {
        self.failing_methods.insert(method);
        self
    }

    pub fn insert_transaction(&mut self, tx: Value) {
        if let Some(id) = tx["txid"].as_str() {
            self.transactions.insert(id.to_string(), tx.clone());
        }
    }

    pub fn tip(&self) -> u64 {
        self.blocks.len().saturating_sub(1) as u64
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(method).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    fn block(&self, hash: &str) -> Result<(u64, &FakeBlock), QueryError> {
        self.heights
            .get(hash)
            .and_then(|h| self.blocks.get(*h as usize).map(|b| (*h, b)))
            .ok_or_else(|| node_error(-5, "Block not found"))
    }

    /// The three `getrawmempool` entries; 90_002 spends an output of 90_001.
    fn mempool_entry(&self, txid: &str) -> Result<Value, QueryError> {
        let (vsize, base, depends, spent_by) = if txid == txid_for(90_001) {
            (100, 0.00001, vec![], vec![txid_for(90_002)])
        } else if txid == txid_for(90_002) {
            (200, 0.000006, vec![txid_for(90_001)], vec![])
        } else if txid == txid_for(90_003) {
            (100, 0.00015, vec![], vec![])
        } else {
            return Err(node_error(-5, "Transaction not in mempool"));
        };
        Ok(json!({
            "vsize": vsize, "weight": vsize * 4, "time": GENESIS_TIME, "height": self.tip(),
            "fees": { "base": base, "modified": base },
            "depends": depends, "spentby": spent_by, "bip125-replaceable": false,
        }))
    }

    fn answer(&self, method: &str, args: &[String]) -> Result<Value, QueryError> {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        match method {
            "getblockcount" => Ok(json!(self.tip())),
            "getblockhash" => {
                let h: u64 = arg(0).parse().map_err(|_| node_error(-1, "JSON value is not an integer as expected"))?;
                self.blocks
                    .get(h as usize)
                    .map(|b| json!(b.hash))
                    .ok_or_else(|| node_error(-8, "Block height out of range"))
            }
            "getblockheader" => {
                let (h, b) = self.block(arg(0))?;
                Ok(json!({
                    "hash": b.hash, "height": h, "time": b.time, "mediantime": b.time,
                    "difficulty": b.difficulty, "nTx": b.txs.len(),
                    "confirmations": self.tip() - h + 1,
                }))
            }
            "getblock" => {
                let (h, b) = self.block(arg(0))?;
                if self.unavailable_blocks.contains(&h) {
                    return Err(QueryError::new(
                        ErrorKind::DataUnavailable,
                        "error code: -1\nerror message:\nBlock not available (pruned data)",
                    ));
                }
                let txs: Vec<Value> = if arg(1) == "2" {
                    b.txs.clone()
                } else {
                    b.txs.iter().map(|tx| tx["txid"].clone()).collect()
                };
                let mut block = json!({
                    "hash": b.hash, "height": h, "time": b.time, "mediantime": b.time,
                    "difficulty": b.difficulty, "nTx": b.txs.len(),
                    "size": 1_000 + 250 * b.txs.len(), "strippedsize": 900, "weight": 4_000,
                    "confirmations": self.tip() - h + 1,
                    "merkleroot": txid_for(h), "versionHex": "20000000",
                    "tx": txs,
                });
                if h > 0 {
                    block["previousblockhash"] = json!(block_hash_for(h - 1));
                }
                if h < self.tip() {
                    block["nextblockhash"] = json!(block_hash_for(h + 1));
                }
                Ok(block)
            }
            "getblockstats" => Ok(json!({ "avgfeerate": 15, "txs": 3, "height": arg(0) })),
            "getblockchaininfo" => Ok(json!({
                "chain": "regtest", "blocks": self.tip(), "headers": self.tip(),
                "bestblockhash": block_hash_for(self.tip()), "difficulty": 1.0,
                "mediantime": GENESIS_TIME, "verificationprogress": 1.0,
                "initialblockdownload": false, "size_on_disk": 9_000, "pruned": false
            })),
            "getnetworkinfo" => Ok(json!({
                "version": 270000, "subversion": "/Satoshi:27.0.0/", "protocolversion": 70016,
                "connections": 8, "connections_in": 0, "connections_out": 8,
                "relayfee": 0.00001, "networkactive": true
            })),
            "getmempoolinfo" => Ok(json!({
                "size": 3, "bytes": 600, "usage": 2_000, "maxmempool": 300_000_000,
                "mempoolminfee": 0.00001, "minrelaytxfee": 0.00001
            })),
            "getrawmempool" => Ok(json!({
                txid_for(90_001): { "vsize": 100, "fees": { "base": 0.00001 } },
                txid_for(90_002): { "vsize": 200, "fees": { "base": 0.000006 } },
                txid_for(90_003): { "vsize": 100, "fees": { "base": 0.00015 } },
            })),
            "getmempoolentry" => self.mempool_entry(arg(0)),
            "getmempoolancestors" | "getmempooldescendants" => {
                self.mempool_entry(arg(0))?;
                let (parent, child) = (txid_for(90_001), txid_for(90_002));
                let related = match method {
                    "getmempoolancestors" if arg(0) == child => Some(parent),
                    "getmempooldescendants" if arg(0) == parent => Some(child),
                    _ => None,
                };
                let mut family = serde_json::Map::new();
                if let Some(id) = related {
                    let entry = self.mempool_entry(&id)?;
                    family.insert(id, entry);
                }
                Ok(Value::Object(family))
            }
            "getchaintips" => Ok(json!([
                { "height": self.tip() - 1, "hash": txid_for(77), "branchlen": 1, "status": "valid-fork" },
                { "height": self.tip(), "hash": block_hash_for(self.tip()), "branchlen": 0, "status": "active" },
            ])),
            "getchaintxstats" => {
                let window = arg(0).parse::<u64>().unwrap_or(30).min(self.tip());
                let end = if arg(1).is_empty() { self.tip() } else { self.block(arg(1))?.0 };
                let blocks = window.min(end);
                let tx_per_block = 3;
                let interval = self.blocks[end as usize].time - self.blocks[(end - blocks) as usize].time;
                Ok(json!({
                    "time": self.blocks[end as usize].time,
                    "txcount": (end + 1) * tx_per_block,
                    "window_final_block_hash": block_hash_for(end),
                    "window_final_block_height": end,
                    "window_block_count": blocks,
                    "window_tx_count": blocks * tx_per_block,
                    "window_interval": interval,
                    "txrate": (blocks * tx_per_block) as f64 / interval as f64,
                }))
            }
            "getdifficulty" => Ok(json!(self.blocks.last().map_or(1.0, |b| b.difficulty))),
            "gettxoutsetinfo" => Ok(json!({
                "height": self.tip(), "bestblock": block_hash_for(self.tip()),
                "txouts": (self.tip() + 1) * 3, "transactions": (self.tip() + 1) * 3,
                "bogosize": 1_000, "hash_serialized_3": txid_for(99), "disk_size": 4_096,
                "total_amount": 50.0 * (self.tip() + 1) as f64,
            })),
            "estimatesmartfee" => Ok(json!({ "feerate": 0.0002, "blocks": arg(0).parse::<u64>().unwrap_or(0) })),
            "getrawtransaction" => self.transactions.get(arg(0)).cloned().ok_or_else(|| {
                QueryError::new(
                    ErrorKind::DataUnavailable,
                    "error code: -5\nerror message:\nNo such mempool or blockchain transaction. Use gettransaction for wallet transactions.",
                )
                .with_code(Some(-5))
            }),
            "decoderawtransaction" => self
                .transactions
                .values()
                .find(|tx| tx["hex"].as_str() == Some(arg(0)))
                .cloned()
                .ok_or_else(|| node_error(-22, "TX decode failed")),
            "gettxout" => Ok(Value::Null),
            _ => Err(node_error(-32601, "Method not found")),
        }
    }
}

#[async_trait]
impl NodeClient for FakeChain {
    async fn execute(&self, request: &QueryRequest) -> QueryResult {
        self.total.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(request.method().to_string()).or_insert(0) += 1;
        }
        // Yield so fan-out actually interleaves.
        tokio::task::yield_now().await;

        if self.failing_methods.contains(request.method()) {
            return Err(node_error(-1, "injected failure"));
        }
        self.answer(request.method(), &request.cli_args())
            .map(Payload::from_value)
    }
}

fn coinbase(height: u64) -> Value {
    json!({
        "txid": txid_for(height * 10),
        "size": 120, "vsize": 120,
        "vin": [{ "coinbase": format!("03{height:06x}") }],
        "vout": [{ "n": 0, "value": 50.0, "scriptPubKey": { "type": "witness_v0_keyhash" } }]
    })
}

pub fn sats_to_btc(sats: u64) -> f64 {
    sats as f64 / 1e8
}
