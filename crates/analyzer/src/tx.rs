//! Transaction decoding into [`TransactionSummary`].
//!
//! Fee computation needs the value of every spent output. Each is resolved
//! from the embedded `prevout` when the node supplies one, otherwise through
//! `getrawtransaction <prev> 1` and finally `gettxout`. One unresolved input
//! makes the fee absent; it is never estimated.

use crate::fields::{
    btc_to_sats, object_field, require, script_address, str_field, u64_field, Object,
};
use crate::script;
use bitlens_core::types::is_hex_hash;
use bitlens_core::{
    BitlensResult, InputSummary, OutputSummary, Payload, QueryError, SizeClass,
    TransactionSummary,
};
use bitlens_provider::fanout::DEFAULT_CONCURRENCY;
use bitlens_provider::{fan_out, queries, NodeClient};
use serde_json::Value;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shortest raw transaction hex accepted (10 bytes).
const MIN_RAW_HEX_LEN: usize = 20;

/// What a caller handed to [`TransactionAnalyzer::analyze`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxInput<'a> {
    Txid(&'a str),
    Raw(&'a str),
}

/// Tells a transaction id apart from raw transaction hex.
pub fn classify_input(input: &str) -> BitlensResult<TxInput<'_>> {
    let s = input.trim();
    if is_hex_hash(s) {
        return Ok(TxInput::Txid(s));
    }
    if s.len() >= MIN_RAW_HEX_LEN && s.len() % 2 == 0 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Ok(TxInput::Raw(s));
    }
    Err(QueryError::invalid_input(
        "expected a 64-hex transaction id or raw transaction hex",
    ))
}

#[derive(Debug, Clone)]
struct ResolvedPrevout {
    value_sats: u64,
    address: Option<String>,
}

pub struct TransactionAnalyzer {
    client: Arc<dyn NodeClient>,
    concurrency: usize,
}

impl TransactionAnalyzer {
    pub fn new(client: Arc<dyn NodeClient>) -> Self {
        Self {
            client,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Caps simultaneous previous-output lookups for one transaction.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Summarizes a transaction given by txid or raw hex.
    pub async fn analyze(&self, input: &str) -> BitlensResult<TransactionSummary> {
        let req = match classify_input(input)? {
            TxInput::Txid(txid) => {
                queries::get_raw_transaction(&txid.to_ascii_lowercase(), 2, None)
            }
            TxInput::Raw(hex) => queries::decode_raw_transaction(hex),
        };
        let payload = self.client.execute(&req).await?;
        let tx = payload
            .expect_object("decoded transaction")
            .map_err(|e| req.annotate(e))?;
        self.summarize_decoded(tx).await
    }

    /// Summarizes an already decoded transaction object (e.g. from `getblock <hash> 2`).
    pub async fn summarize_decoded(&self, tx: &Object) -> BitlensResult<TransactionSummary> {
        const WHAT: &str = "decoded transaction";

        let txid = require(str_field(tx, "txid"), WHAT, "txid")?.to_string();
        let size_bytes = require(u64_field(tx, "size"), WHAT, "size")?;
        let virtual_size_bytes = u64_field(tx, "vsize").unwrap_or(size_bytes);
        let vin = require(tx.get("vin").and_then(Value::as_array), WHAT, "vin")?;
        let vout = require(tx.get("vout").and_then(Value::as_array), WHAT, "vout")?;

        let outputs = vout
            .iter()
            .enumerate()
            .map(|(i, o)| parse_output(i, o))
            .collect::<BitlensResult<SmallVec<[OutputSummary; 4]>>>()?;

        let mut is_coinbase = false;
        let mut inputs: SmallVec<[InputSummary; 4]> = SmallVec::with_capacity(vin.len());
        let mut pending: Vec<(usize, String, u32)> = Vec::new();

        for (i, raw) in vin.iter().enumerate() {
            let input = raw
                .as_object()
                .ok_or_else(|| QueryError::protocol(format!("input {i} is not an object")))?;

            if input.contains_key("coinbase") {
                is_coinbase = true;
                inputs.push(InputSummary {
                    prev_txid: None,
                    prev_vout: None,
                    value_sats: None,
                    address: None,
                    unresolved: Some("coinbase input has no previous output".into()),
                });
                continue;
            }

            let prev_txid = require(str_field(input, "txid"), "transaction input", "txid")?;
            let prev_vout = require(u64_field(input, "vout"), "transaction input", "vout")?;
            let prev_vout = u32::try_from(prev_vout)
                .map_err(|_| QueryError::protocol(format!("input {i} output index out of range")))?;

            let embedded = object_field(input, "prevout").and_then(|p| {
                let value_sats = p.get("value").and_then(Value::as_f64).and_then(btc_to_sats)?;
                let address = object_field(p, "scriptPubKey").and_then(script_address);
                Some(ResolvedPrevout { value_sats, address })
            });

            if embedded.is_none() {
                pending.push((i, prev_txid.to_string(), prev_vout));
            }
            inputs.push(InputSummary {
                prev_txid: Some(prev_txid.to_string()),
                prev_vout: Some(prev_vout),
                value_sats: embedded.as_ref().map(|p| p.value_sats),
                address: embedded.and_then(|p| p.address),
                unresolved: None,
            });
        }

        if !pending.is_empty() {
            self.resolve_pending(&mut inputs, pending).await;
        }

        let total_output_sats: u64 = outputs.iter().map(|o| o.value_sats).sum();
        let total_input_sats: Option<u64> = if is_coinbase {
            None
        } else {
            inputs.iter().map(|i| i.value_sats).sum()
        };

        let fee_sats = match total_input_sats {
            Some(total_in) if total_in >= total_output_sats => Some(total_in - total_output_sats),
            Some(total_in) => {
                tracing::warn!(
                    %txid,
                    total_in,
                    total_out = total_output_sats,
                    "inputs below outputs, fee reported as absent"
                );
                None
            }
            None => None,
        };
        let fee_rate_sat_per_vbyte = fee_sats
            .filter(|_| virtual_size_bytes > 0)
            .map(|fee| fee as f64 / virtual_size_bytes as f64);

        let mut output_script_types = BTreeMap::new();
        for o in &outputs {
            *output_script_types.entry(o.script_class).or_insert(0) += 1;
        }

        Ok(TransactionSummary {
            txid,
            size_bytes,
            virtual_size_bytes,
            weight: u64_field(tx, "weight"),
            size_class: SizeClass::from_vsize(virtual_size_bytes),
            fee_sats,
            fee_rate_sat_per_vbyte,
            input_count: inputs.len(),
            output_count: outputs.len(),
            output_script_types,
            total_input_sats,
            total_output_sats,
            is_coinbase,
            confirmations: u64_field(tx, "confirmations"),
            block_hash: str_field(tx, "blockhash").map(str::to_string),
            inputs,
            outputs,
        })
    }

    async fn resolve_pending(
        &self,
        inputs: &mut SmallVec<[InputSummary; 4]>,
        pending: Vec<(usize, String, u32)>,
    ) {
        let targets: Arc<Vec<(String, u32)>> = Arc::new(
            pending
                .iter()
                .map(|(_, txid, n)| (txid.clone(), *n))
                .collect(),
        );
        let client = Arc::clone(&self.client);

        let resolved = fan_out(0..targets.len() as u64, self.concurrency, |k| {
            let client = Arc::clone(&client);
            let targets = Arc::clone(&targets);
            async move {
                let Some((txid, n)) = targets.get(k as usize) else {
                    return Err(QueryError::internal("prevout lookup index out of range"));
                };
                resolve_prevout(&*client, txid, *n).await
            }
        })
        .await;

        for (k, result) in resolved {
            let Some((input_index, _, _)) = pending.get(k as usize) else {
                continue;
            };
            let Some(input) = inputs.get_mut(*input_index) else {
                continue;
            };
            match result {
                Ok(prev) => {
                    input.value_sats = Some(prev.value_sats);
                    input.address = prev.address;
                }
                Err(e) => {
                    tracing::debug!(input = input_index, error = %e, "previous output unresolved");
                    input.unresolved = Some(e.to_string());
                }
            }
        }
    }
}

fn parse_output(index: usize, raw: &Value) -> BitlensResult<OutputSummary> {
    let out = raw
        .as_object()
        .ok_or_else(|| QueryError::protocol(format!("output {index} is not an object")))?;
    let value_sats = out
        .get("value")
        .and_then(Value::as_f64)
        .and_then(btc_to_sats)
        .ok_or_else(|| QueryError::protocol(format!("output {index} has no valid value")))?;
    let n = u64_field(out, "n")
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(index as u32);

    let script = object_field(out, "scriptPubKey");
    let script_type = script
        .and_then(|s| str_field(s, "type"))
        .unwrap_or("nonstandard")
        .to_string();

    Ok(OutputSummary {
        n,
        value_sats,
        script_class: script::classify(&script_type),
        script_type,
        address: script.and_then(script_address),
    })
}

/// Looks up the value of output `n` of `txid`.
async fn resolve_prevout(
    client: &dyn NodeClient,
    txid: &str,
    n: u32,
) -> BitlensResult<ResolvedPrevout> {
    let tx_lookup = match client.execute(&queries::get_raw_transaction(txid, 1, None)).await {
        Ok(payload) => match output_of(&payload, n) {
            Some(found) => return Ok(found),
            None => QueryError::protocol(format!("transaction {txid} has no output {n}")),
        },
        Err(e) => e,
    };

    let req = queries::get_tx_out(txid, n, true);
    let utxo = client.execute(&req).await?;
    if utxo.is_null() {
        return Err(QueryError::unavailable(format!(
            "previous output {txid}:{n} not found ({})",
            tx_lookup.message
        )));
    }
    let obj = utxo.expect_object("gettxout").map_err(|e| req.annotate(e))?;
    let value_sats = obj
        .get("value")
        .and_then(Value::as_f64)
        .and_then(btc_to_sats)
        .ok_or_else(|| req.annotate(QueryError::protocol("gettxout value missing")))?;
    Ok(ResolvedPrevout {
        value_sats,
        address: object_field(obj, "scriptPubKey").and_then(script_address),
    })
}

fn output_of(payload: &Payload, n: u32) -> Option<ResolvedPrevout> {
    let outputs = payload.get("vout")?.as_array()?;
    let out = outputs
        .iter()
        .filter_map(Value::as_object)
        .find(|o| u64_field(o, "n") == Some(u64::from(n)))?;
    Some(ResolvedPrevout {
        value_sats: out.get("value").and_then(Value::as_f64).and_then(btc_to_sats)?,
        address: object_field(out, "scriptPubKey").and_then(script_address),
    })
}
