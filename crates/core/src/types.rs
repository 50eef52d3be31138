//! Domain types for the bitlens node analytics layer.

use crate::error::{BitlensResult, QueryError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A positional argument to a node query.
///
/// Floats are deliberately absent so requests stay hashable cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Str(s) => f.write_str(s),
            Param::Int(n) => write!(f, "{n}"),
            Param::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Str(s.to_string())
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Str(s)
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Int(n)
    }
}

impl From<u64> for Param {
    fn from(n: u64) -> Self {
        Param::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<u32> for Param {
    fn from(n: u32) -> Self {
        Param::Int(i64::from(n))
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Bool(b)
    }
}

/// One logical node call: method name plus ordered arguments.
///
/// Immutable once built; doubles as the response cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRequest {
    method: String,
    args: Vec<Param>,
}

impl QueryRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, param: impl Into<Param>) -> Self {
        self.args.push(param.into());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[Param] {
        &self.args
    }

    /// Arguments as they appear on the command line.
    pub fn cli_args(&self) -> Vec<String> {
        self.args.iter().map(ToString::to_string).collect()
    }

    /// Attaches this request as context to an error.
    pub fn annotate(&self, err: QueryError) -> QueryError {
        if err.method.is_some() {
            return err;
        }
        err.with_call(&self.method, self.cli_args())
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.method)?;
        for a in &self.args {
            write!(f, " {a}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// The three output shapes a node query can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    /// Bare number, string, bool or null.
    Scalar(Value),
}

impl Payload {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(m) => Payload::Object(m),
            Value::Array(a) => Payload::Array(a),
            other => Payload::Scalar(other),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Payload::Object(m) => Value::Object(m),
            Payload::Array(a) => Value::Array(a),
            Payload::Scalar(v) => v,
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Payload::Object(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Payload::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Payload::Scalar(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Payload::Scalar(v) => v.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Payload::Scalar(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Payload::Scalar(Value::Null))
    }

    /// Field lookup on object payloads.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|m| m.get(key))
    }

    pub fn expect_object(&self, what: &str) -> BitlensResult<&Map<String, Value>> {
        self.as_object()
            .ok_or_else(|| QueryError::protocol(format!("expected JSON object for {what}")))
    }
}

/// Outcome of one node call. Never partially populated.
pub type QueryResult = Result<Payload, QueryError>;

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Header-level facts about one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSample {
    pub height: u64,
    pub hash: String,
    pub timestamp: i64,
    pub difficulty: f64,
    pub n_tx: u64,
}

/// `true` for a 64-character hex string (block hash or txid).
pub fn is_hex_hash(s: &str) -> bool {
    s.len() == 64 && hex::decode(s).is_ok()
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Output script classification vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptClass {
    P2pk,
    P2pkh,
    P2sh,
    Multisig,
    P2wpkh,
    P2wsh,
    P2tr,
    NullData,
    Other,
}

/// Coarse size bucket by virtual size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeClass {
    Small,
    Medium,
    Large,
    Huge,
}

impl SizeClass {
    pub fn from_vsize(vsize: u64) -> Self {
        match vsize {
            0..=249 => SizeClass::Small,
            250..=999 => SizeClass::Medium,
            1000..=9999 => SizeClass::Large,
            _ => SizeClass::Huge,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSummary {
    /// `None` for coinbase inputs.
    pub prev_txid: Option<String>,
    pub prev_vout: Option<u32>,
    pub value_sats: Option<u64>,
    pub address: Option<String>,
    /// Why the previous output could not be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unresolved: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub n: u32,
    pub value_sats: u64,
    pub script_class: ScriptClass,
    /// Type string as reported by the node.
    pub script_type: String,
    pub address: Option<String>,
}

/// Structured view of a single transaction.
///
/// `fee_sats` is absent whenever any input's previous output could not be
/// resolved; it is never estimated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub txid: String,
    pub size_bytes: u64,
    pub virtual_size_bytes: u64,
    pub weight: Option<u64>,
    pub size_class: SizeClass,
    pub fee_sats: Option<u64>,
    pub fee_rate_sat_per_vbyte: Option<f64>,
    pub input_count: usize,
    pub output_count: usize,
    pub output_script_types: BTreeMap<ScriptClass, usize>,
    pub total_input_sats: Option<u64>,
    pub total_output_sats: u64,
    pub is_coinbase: bool,
    pub confirmations: Option<u64>,
    pub block_hash: Option<String>,
    pub inputs: SmallVec<[InputSummary; 4]>,
    pub outputs: SmallVec<[OutputSummary; 4]>,
}

// ---------------------------------------------------------------------------
// Windows and series
// ---------------------------------------------------------------------------

/// Caller-specified span of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Window {
    /// Half-open height range `[start, end)`.
    Range { start: u64, end: u64 },
    /// The `count` most recent blocks, ending at the tip.
    Recent { count: u64 },
}

impl Window {
    /// Resolves against the current tip height. Ranges are clamped to the tip.
    pub fn resolve(self, tip: u64) -> BitlensResult<HeightRange> {
        let limit = tip.saturating_add(1);
        let range = match self {
            Window::Range { start, end } => HeightRange {
                start,
                end: end.min(limit),
            },
            Window::Recent { count } => HeightRange {
                start: limit.saturating_sub(count),
                end: limit,
            },
        };
        if range.is_empty() {
            return Err(QueryError::invalid_input(format!(
                "window {self:?} is empty at tip {tip}"
            )));
        }
        Ok(range)
    }
}

/// Resolved half-open height range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightRange {
    pub start: u64,
    pub end: u64,
}

impl HeightRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.end - 1)
    }

    pub fn contains(&self, height: u64) -> bool {
        height >= self.start && height < self.end
    }

    /// The trailing `n` heights of this range.
    pub fn tail(&self, n: u64) -> HeightRange {
        HeightRange {
            start: self.end.saturating_sub(n).max(self.start),
            end: self.end,
        }
    }

    pub fn heights(&self) -> std::ops::Range<u64> {
        self.start..self.end
    }
}

/// One keyed point of a [`HistoricalSeries`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint<T> {
    pub key: u64,
    pub value: T,
}

/// Points ordered by strictly increasing key (height or timestamp).
///
/// Gaps are legal; duplicates are not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HistoricalSeries<T> {
    points: Vec<SeriesPoint<T>>,
}

impl<T> HistoricalSeries<T> {
    /// Builds a series from points in any order (e.g. completion order).
    ///
    /// Sorting is stable; for duplicate keys the first occurrence wins.
    pub fn from_unordered(points: impl IntoIterator<Item = (u64, T)>) -> Self {
        let mut points: Vec<SeriesPoint<T>> = points
            .into_iter()
            .map(|(key, value)| SeriesPoint { key, value })
            .collect();
        points.sort_by_key(|p| p.key);
        points.dedup_by_key(|p| p.key);
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[SeriesPoint<T>] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeriesPoint<T>> {
        self.points.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        self.points.iter().map(|p| p.key)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.points.iter().map(|p| &p.value)
    }

    pub fn first(&self) -> Option<&SeriesPoint<T>> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint<T>> {
        self.points.last()
    }
}

impl<T> Default for HistoricalSeries<T> {
    fn default() -> Self {
        Self { points: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_equality_includes_args() {
        let a = QueryRequest::new("getblockhash").arg(5u64);
        let b = QueryRequest::new("getblockhash").arg(5u64);
        let c = QueryRequest::new("getblockhash").arg(6u64);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.cli_args(), vec!["5".to_string()]);
        assert_eq!(a.to_string(), "getblockhash 5");
    }

    #[test]
    fn annotate_keeps_existing_context() {
        let req = QueryRequest::new("getblock").arg("ff");
        let e = req.annotate(QueryError::protocol("bad"));
        assert_eq!(e.method.as_deref(), Some("getblock"));
        let other = QueryRequest::new("getblockhash").annotate(e.clone());
        assert_eq!(other, e);
    }

    #[test]
    fn payload_shapes() {
        assert!(matches!(Payload::from_value(json!({"a": 1})), Payload::Object(_)));
        assert!(matches!(Payload::from_value(json!([1, 2])), Payload::Array(_)));
        assert_eq!(Payload::from_value(json!(840000)).as_u64(), Some(840000));
        assert_eq!(Payload::from_value(json!("ab")).as_str(), Some("ab"));
        assert!(Payload::Scalar(Value::Null).is_null());
    }

    #[test]
    fn hex_hash_detection() {
        let h = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
        assert!(is_hex_hash(h));
        assert!(!is_hex_hash(&h[1..]));
        assert!(!is_hex_hash(&h.replace('0', "g")));
    }

    #[test]
    fn size_classes() {
        assert_eq!(SizeClass::from_vsize(141), SizeClass::Small);
        assert_eq!(SizeClass::from_vsize(250), SizeClass::Medium);
        assert_eq!(SizeClass::from_vsize(5_000), SizeClass::Large);
        assert_eq!(SizeClass::from_vsize(100_000), SizeClass::Huge);
    }

    #[test]
    fn recent_window_resolves_to_tip() {
        let r = Window::Recent { count: 10 }.resolve(100).unwrap();
        assert_eq!(r, HeightRange::new(91, 101));
        assert_eq!(r.len(), 10);
        assert_eq!(r.last(), Some(100));
    }

    #[test]
    fn recent_window_larger_than_chain() {
        let r = Window::Recent { count: 500 }.resolve(9).unwrap();
        assert_eq!(r, HeightRange::new(0, 10));
    }

    #[test]
    fn range_clamped_to_tip() {
        let r = Window::Range { start: 0, end: 2016 }.resolve(99).unwrap();
        assert_eq!(r, HeightRange::new(0, 100));
    }

    #[test]
    fn empty_window_rejected() {
        let err = Window::Range { start: 50, end: 50 }.resolve(100).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::InvalidInput);
        assert!(Window::Recent { count: 0 }.resolve(100).is_err());
        assert!(Window::Range { start: 200, end: 300 }.resolve(100).is_err());
    }

    #[test]
    fn tail_stays_inside_range() {
        let r = HeightRange::new(10, 20);
        assert_eq!(r.tail(3), HeightRange::new(17, 20));
        assert_eq!(r.tail(100), r);
    }

    #[test]
    fn series_sorted_and_deduped() {
        let s = HistoricalSeries::from_unordered(vec![(5, "e"), (1, "a"), (3, "c"), (1, "dup")]);
        assert_eq!(s.keys().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(s.first().unwrap().value, "a");
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn script_class_as_map_key() {
        let mut m = BTreeMap::new();
        m.insert(ScriptClass::P2wpkh, 2usize);
        m.insert(ScriptClass::NullData, 1usize);
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v, json!({"p2wpkh": 2, "null_data": 1}));
    }
}
