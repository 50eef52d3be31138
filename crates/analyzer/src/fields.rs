//! Field extraction from decoded node JSON.

use bitlens_core::{BitlensResult, QueryError};
use serde_json::{Map, Value};

pub(crate) type Object = Map<String, Value>;

pub(crate) fn u64_field(obj: &Object, key: &str) -> Option<u64> {
    obj.get(key).and_then(Value::as_u64)
}

pub(crate) fn i64_field(obj: &Object, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_i64)
}

pub(crate) fn f64_field(obj: &Object, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}

pub(crate) fn str_field<'a>(obj: &'a Object, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

pub(crate) fn object_field<'a>(obj: &'a Object, key: &str) -> Option<&'a Object> {
    obj.get(key).and_then(Value::as_object)
}

/// Reads a nested numeric field such as `fees.base`.
pub(crate) fn nested_f64(obj: &Object, outer: &str, inner: &str) -> Option<f64> {
    object_field(obj, outer).and_then(|o| f64_field(o, inner))
}

pub(crate) fn require<T>(value: Option<T>, what: &str, key: &str) -> BitlensResult<T> {
    value.ok_or_else(|| QueryError::protocol(format!("{what} is missing field `{key}`")))
}

/// BTC amount to satoshis, rounding to the nearest unit. Negative or
/// non-finite amounts are rejected.
pub(crate) fn btc_to_sats(btc: f64) -> Option<u64> {
    if !btc.is_finite() || btc < 0.0 {
        return None;
    }
    Some((btc * 1e8).round() as u64)
}

/// `scriptPubKey.address`, or the first entry of the legacy `addresses` list.
pub(crate) fn script_address(script: &Object) -> Option<String> {
    if let Some(addr) = str_field(script, "address") {
        return Some(addr.to_string());
    }
    script
        .get("addresses")
        .and_then(Value::as_array)
        .and_then(|a| a.first())
        .and_then(Value::as_str)
        .map(str::to_string)
}
