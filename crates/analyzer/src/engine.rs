//! Longitudinal chain statistics over a block window.
//!
//! Every operation resolves its window against the current tip, picks the
//! heights it needs, fetches them through [`fan_out`] and reduces the
//! results. Per-block failures are kept alongside the data; one bad block
//! never aborts a series.

use crate::blocks::{fetch_block_sample, HeightFailure};
use crate::fields::{btc_to_sats, f64_field, u64_field, Object};
use crate::stats::{self, FeeRateStats, Summary};
use crate::tx::TransactionAnalyzer;
use bitlens_core::{
    BitlensResult, BlockSample, HeightRange, HistoricalSeries, QueryError, Window,
};
use bitlens_provider::fanout::DEFAULT_CONCURRENCY;
use bitlens_provider::{fan_out, queries, NodeClient};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Protocol target spacing between blocks.
pub const TARGET_BLOCK_SECONDS: f64 = 600.0;
/// Blocks per difficulty adjustment period.
pub const DIFFICULTY_EPOCH: u64 = 2016;

const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Simultaneous node invocations per operation.
    pub concurrency: usize,
    /// Upper bound on sampled heights for strided operations.
    pub max_samples: usize,
    /// Transactions examined per block for fee statistics.
    pub fee_tx_cap: usize,
    /// Dense window cap for block-interval analysis.
    pub max_interval_blocks: u64,
    pub difficulty_stride: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_samples: 64,
            fee_tx_cap: 100,
            max_interval_blocks: 1000,
            difficulty_stride: DIFFICULTY_EPOCH,
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// `range.start` plus every multiple of `stride` inside the range.
fn aligned_count(range: HeightRange, stride: u64) -> u64 {
    if range.is_empty() {
        return 0;
    }
    1 + (range.end - 1) / stride - range.start / stride
}

/// Heights to sample from `range`: its start, then every multiple of the
/// effective stride. The stride is widened (in multiples of `stride`) until
/// at most `max_samples` heights remain.
pub fn sample_heights(range: HeightRange, stride: u64, max_samples: usize) -> Vec<u64> {
    if range.is_empty() {
        return Vec::new();
    }
    let stride = stride.max(1);
    let max = (max_samples.max(1)) as u64;

    let mut effective = stride * aligned_count(range, stride).div_ceil(max);
    while aligned_count(range, effective) > max {
        effective += stride;
    }

    let mut heights = vec![range.start];
    let mut h = (range.start / effective + 1) * effective;
    while h < range.end {
        heights.push(h);
        h += effective;
    }
    heights
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyPoint {
    pub hash: String,
    pub timestamp: i64,
    pub difficulty: f64,
    /// Change against the previous sampled point.
    pub change: Option<f64>,
    pub change_pct: Option<f64>,
    pub seconds_since_previous: Option<i64>,
    /// Mean spacing since the previous point, minus the 600 s target, in percent.
    pub target_deviation_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DifficultyHistory {
    pub range: HeightRange,
    pub stride: u64,
    pub series: HistoricalSeries<DifficultyPoint>,
    pub total_change_pct: Option<f64>,
    pub failures: Vec<HeightFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoDataReason {
    NoEligibleTransactions,
    FetchFailed(QueryError),
}

/// One sampled block of a fee history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeePoint {
    /// `skipped` counts inspected transactions that yielded no fee rate.
    Data { stats: FeeRateStats, skipped: usize },
    NoData { reason: NoDataReason },
}

impl FeePoint {
    pub fn stats(&self) -> Option<&FeeRateStats> {
        match self {
            FeePoint::Data { stats, .. } => Some(stats),
            FeePoint::NoData { .. } => None,
        }
    }
}

/// Window-level view over the data points of a fee history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeeSummary {
    pub data_points: usize,
    pub no_data_points: usize,
    pub total_transactions: usize,
    pub skipped_transactions: usize,
    pub avg_mean: Option<f64>,
    pub avg_median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p25_mean: Option<f64>,
    pub p75_mean: Option<f64>,
}

impl FeeSummary {
    fn from_points<'a>(points: impl Iterator<Item = &'a FeePoint>) -> Self {
        let mut summary = FeeSummary::default();
        let mut means = Vec::new();
        let mut medians = Vec::new();
        for p in points {
            let FeePoint::Data { stats: s, skipped } = p else {
                summary.no_data_points += 1;
                continue;
            };
            summary.data_points += 1;
            summary.skipped_transactions += skipped;
            summary.total_transactions += s.tx_count;
            summary.min = Some(summary.min.map_or(s.min, |m| m.min(s.min)));
            summary.max = Some(summary.max.map_or(s.max, |m| m.max(s.max)));
            means.push(s.mean);
            medians.push(s.median);
        }
        let sorted_means = stats::sorted(&means);
        summary.avg_mean = stats::mean(&means);
        summary.avg_median = stats::mean(&medians);
        summary.p25_mean = stats::percentile(&sorted_means, 25.0);
        summary.p75_mean = stats::percentile(&sorted_means, 75.0);
        summary
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeHistory {
    pub range: HeightRange,
    pub sample_count: usize,
    pub series: HistoricalSeries<FeePoint>,
    pub summary: FeeSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Under a day of blocks is low; under a week is medium.
    pub fn from_sample_size(blocks: u64) -> Self {
        match blocks {
            0..=143 => Confidence::Low,
            144..=1007 => Confidence::Medium,
            _ => Confidence::High,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HashrateEstimate {
    pub hashes_per_second: f64,
    pub terahashes_per_second: f64,
    pub petahashes_per_second: f64,
    pub exahashes_per_second: f64,
    pub mean_difficulty: f64,
    /// Blocks spanned by the first and last usable samples.
    pub sample_size: u64,
    pub confidence: Confidence,
    pub samples_used: usize,
    pub first_height: u64,
    pub last_height: u64,
    pub time_span_seconds: i64,
    pub seconds_per_block: f64,
    pub target_seconds_per_block: f64,
    pub failures: Vec<HeightFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockInterval {
    pub seconds: i64,
    /// The block is not later than its parent.
    pub non_positive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnusualInterval {
    pub height: u64,
    pub seconds: i64,
    pub sigma: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockTimeDistribution {
    pub range: HeightRange,
    /// The heights actually fetched; the tail of `range`.
    pub analyzed: HeightRange,
    pub truncated: bool,
    /// Keyed by the later block of each pair.
    pub series: HistoricalSeries<BlockInterval>,
    pub statistics: Option<Summary>,
    pub buckets: Vec<BucketCount>,
    pub non_positive: usize,
    pub unusual: Vec<UnusualInterval>,
    pub failures: Vec<HeightFailure>,
}

/// Upper bounds in minutes; the last bucket is open.
const INTERVAL_BUCKETS: &[(f64, &str)] = &[
    (1.0, "0-1"),
    (2.0, "1-2"),
    (5.0, "2-5"),
    (10.0, "5-10"),
    (15.0, "10-15"),
    (30.0, "15-30"),
    (60.0, "30-60"),
    (f64::INFINITY, "60+"),
];

pub(crate) fn bucketize(
    values: impl Iterator<Item = f64>,
    bounds: &[(f64, &'static str)],
) -> Vec<BucketCount> {
    let mut buckets: Vec<BucketCount> = bounds
        .iter()
        .map(|&(_, label)| BucketCount { label, count: 0 })
        .collect();
    for v in values {
        if let Some(i) = bounds.iter().position(|(upper, _)| v < *upper) {
            buckets[i].count += 1;
        }
    }
    buckets
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct AnalyticsEngine {
    client: Arc<dyn NodeClient>,
    analyzer: Arc<TransactionAnalyzer>,
    config: EngineConfig,
}

impl AnalyticsEngine {
    pub fn new(client: Arc<dyn NodeClient>, config: EngineConfig) -> Self {
        // Fee fallback runs inside the per-block fan-out; keep its own
        // lookups sequential so the total stays near `concurrency`.
        let analyzer = TransactionAnalyzer::new(Arc::clone(&client)).with_concurrency(1);
        Self {
            client,
            analyzer: Arc::new(analyzer),
            config,
        }
    }

    pub fn client(&self) -> &Arc<dyn NodeClient> {
        &self.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Same client and analyzer, different knobs.
    pub fn with_config(&self, config: EngineConfig) -> Self {
        Self {
            client: Arc::clone(&self.client),
            analyzer: Arc::clone(&self.analyzer),
            config,
        }
    }

    /// Resolves `window` against the current tip.
    pub async fn resolve(&self, window: Window) -> BitlensResult<HeightRange> {
        let tip = queries::block_count(&*self.client).await?;
        window.resolve(tip)
    }

    async fn fetch_samples(&self, heights: Vec<u64>) -> (Vec<BlockSample>, Vec<HeightFailure>) {
        let client = Arc::clone(&self.client);
        let results = fan_out(heights, self.config.concurrency, |h| {
            let client = Arc::clone(&client);
            async move { fetch_block_sample(&*client, h).await }
        })
        .await;

        let mut samples = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (height, result) in results {
            match result {
                Ok(s) => samples.push(s),
                Err(e) => failures.push(HeightFailure::new(height, e)),
            }
        }
        (samples, failures)
    }

    // -- difficulty ----------------------------------------------------------

    /// Difficulty at stride-sampled heights. `stride` defaults to the epoch length.
    pub async fn difficulty_history(
        &self,
        window: Window,
        stride: Option<u64>,
    ) -> BitlensResult<DifficultyHistory> {
        let range = self.resolve(window).await?;
        self.difficulty_history_in(range, stride).await
    }

    pub(crate) async fn difficulty_history_in(
        &self,
        range: HeightRange,
        stride: Option<u64>,
    ) -> BitlensResult<DifficultyHistory> {
        let stride = stride.unwrap_or(self.config.difficulty_stride).max(1);
        let heights = sample_heights(range, stride, self.config.max_samples);
        let (samples, failures) = self.fetch_samples(heights).await;
        if samples.is_empty() {
            return Err(first_failure(failures, range));
        }

        let mut points = Vec::with_capacity(samples.len());
        let mut prev: Option<&BlockSample> = None;
        for s in &samples {
            let mut point = DifficultyPoint {
                hash: s.hash.clone(),
                timestamp: s.timestamp,
                difficulty: s.difficulty,
                change: None,
                change_pct: None,
                seconds_since_previous: None,
                target_deviation_pct: None,
            };
            if let Some(p) = prev {
                point.change = Some(s.difficulty - p.difficulty);
                point.change_pct = (p.difficulty > 0.0)
                    .then(|| (s.difficulty - p.difficulty) / p.difficulty * 100.0);
                let elapsed = s.timestamp - p.timestamp;
                point.seconds_since_previous = Some(elapsed);
                let blocks = s.height - p.height;
                point.target_deviation_pct = (blocks > 0).then(|| {
                    let per_block = elapsed as f64 / blocks as f64;
                    (per_block - TARGET_BLOCK_SECONDS) / TARGET_BLOCK_SECONDS * 100.0
                });
            }
            points.push((s.height, point));
            prev = Some(s);
        }

        let total_change_pct = match (samples.first(), samples.last()) {
            (Some(a), Some(b)) if samples.len() > 1 && a.difficulty > 0.0 => {
                Some((b.difficulty - a.difficulty) / a.difficulty * 100.0)
            }
            _ => None,
        };

        tracing::info!(
            start = range.start,
            end = range.end,
            points = points.len(),
            failed = failures.len(),
            "difficulty history"
        );
        Ok(DifficultyHistory {
            range,
            stride,
            series: HistoricalSeries::from_unordered(points),
            total_change_pct,
            failures,
        })
    }

    // -- fees ----------------------------------------------------------------

    /// Per-block fee-rate statistics. One point per sampled height, always.
    pub async fn fee_history(&self, window: Window) -> BitlensResult<FeeHistory> {
        let range = self.resolve(window).await?;
        Ok(self.fee_history_in(range).await)
    }

    pub(crate) async fn fee_history_in(&self, range: HeightRange) -> FeeHistory {
        let heights = sample_heights(range, 1, self.config.max_samples);
        let sample_count = heights.len();
        let client = Arc::clone(&self.client);
        let analyzer = Arc::clone(&self.analyzer);
        let cap = self.config.fee_tx_cap;

        let results = fan_out(heights, self.config.concurrency, |h| {
            let client = Arc::clone(&client);
            let analyzer = Arc::clone(&analyzer);
            async move { fee_point(&*client, &analyzer, h, cap).await }
        })
        .await;

        let points = results.into_iter().map(|(h, result)| {
            let point = result.unwrap_or_else(|e| {
                tracing::debug!(height = h, error = %e, "fee sample failed");
                FeePoint::NoData {
                    reason: NoDataReason::FetchFailed(e),
                }
            });
            (h, point)
        });
        let series = HistoricalSeries::from_unordered(points);
        let summary = FeeSummary::from_points(series.values());

        tracing::info!(
            start = range.start,
            end = range.end,
            points = series.len(),
            no_data = summary.no_data_points,
            "fee history"
        );
        FeeHistory {
            range,
            sample_count,
            series,
            summary,
        }
    }

    // -- hashrate ------------------------------------------------------------

    /// Network hashrate implied by difficulty and observed block spacing.
    pub async fn hashrate_estimate(&self, window: Window) -> BitlensResult<HashrateEstimate> {
        let range = self.resolve(window).await?;
        self.hashrate_estimate_in(range).await
    }

    pub(crate) async fn hashrate_estimate_in(
        &self,
        range: HeightRange,
    ) -> BitlensResult<HashrateEstimate> {
        let mut heights = sample_heights(range, 1, self.config.max_samples);
        if let Some(last) = range.last() {
            if heights.last() != Some(&last) {
                heights.push(last);
            }
        }
        let (samples, failures) = self.fetch_samples(heights).await;

        let (first, last) = match (samples.first(), samples.last()) {
            (Some(a), Some(b)) if b.height > a.height => (a, b),
            _ if samples.is_empty() => return Err(first_failure(failures, range)),
            _ => {
                return Err(QueryError::unavailable(format!(
                    "heights {}..{} give fewer than two usable samples",
                    range.start, range.end
                )))
            }
        };

        let time_span_seconds = last.timestamp - first.timestamp;
        if time_span_seconds <= 0 {
            return Err(QueryError::unavailable(format!(
                "timestamps between heights {} and {} do not advance",
                first.height, last.height
            )));
        }

        let sample_size = last.height - first.height;
        let seconds_per_block = time_span_seconds as f64 / sample_size as f64;
        let difficulties: Vec<f64> = samples.iter().map(|s| s.difficulty).collect();
        let mean_difficulty = stats::mean(&difficulties).unwrap_or_default();
        let hashes_per_second = mean_difficulty * TWO_POW_32 / seconds_per_block;

        tracing::info!(
            sample_size,
            samples = samples.len(),
            failed = failures.len(),
            "hashrate estimate"
        );
        Ok(HashrateEstimate {
            hashes_per_second,
            terahashes_per_second: hashes_per_second / 1e12,
            petahashes_per_second: hashes_per_second / 1e15,
            exahashes_per_second: hashes_per_second / 1e18,
            mean_difficulty,
            sample_size,
            confidence: Confidence::from_sample_size(sample_size),
            samples_used: samples.len(),
            first_height: first.height,
            last_height: last.height,
            time_span_seconds,
            seconds_per_block,
            target_seconds_per_block: TARGET_BLOCK_SECONDS,
            failures,
        })
    }

    // -- block times ---------------------------------------------------------

    /// Timestamp deltas between consecutive blocks, densely sampled.
    pub async fn block_time_distribution(
        &self,
        window: Window,
    ) -> BitlensResult<BlockTimeDistribution> {
        let range = self.resolve(window).await?;
        self.block_time_distribution_in(range).await
    }

    pub(crate) async fn block_time_distribution_in(
        &self,
        range: HeightRange,
    ) -> BitlensResult<BlockTimeDistribution> {
        let analyzed = range.tail(self.config.max_interval_blocks.max(1));
        let truncated = analyzed.len() < range.len();
        let (samples, failures) = self.fetch_samples(analyzed.heights().collect()).await;
        if samples.is_empty() {
            return Err(first_failure(failures, range));
        }

        let intervals: Vec<(u64, BlockInterval)> = samples
            .windows(2)
            .filter(|pair| pair[1].height == pair[0].height + 1)
            .map(|pair| {
                let seconds = pair[1].timestamp - pair[0].timestamp;
                (
                    pair[1].height,
                    BlockInterval {
                        seconds,
                        non_positive: seconds <= 0,
                    },
                )
            })
            .collect();

        let seconds: Vec<f64> = intervals.iter().map(|(_, i)| i.seconds as f64).collect();
        let statistics = Summary::from_values(&seconds);
        let buckets = bucketize(seconds.iter().map(|s| s / 60.0), INTERVAL_BUCKETS);
        let non_positive = intervals.iter().filter(|(_, i)| i.non_positive).count();

        let unusual = match &statistics {
            Some(s) if s.std_dev > 0.0 => {
                let threshold = s.mean + 2.0 * s.std_dev;
                intervals
                    .iter()
                    .filter(|(_, i)| i.seconds as f64 > threshold)
                    .map(|(h, i)| UnusualInterval {
                        height: *h,
                        seconds: i.seconds,
                        sigma: (i.seconds as f64 - s.mean) / s.std_dev,
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        if non_positive > 0 {
            tracing::warn!(non_positive, "blocks timestamped at or before their parent");
        }
        tracing::info!(
            start = analyzed.start,
            end = analyzed.end,
            intervals = intervals.len(),
            failed = failures.len(),
            "block time distribution"
        );
        Ok(BlockTimeDistribution {
            range,
            analyzed,
            truncated,
            series: HistoricalSeries::from_unordered(intervals),
            statistics,
            buckets,
            non_positive,
            unusual,
            failures,
        })
    }
}

fn first_failure(failures: Vec<HeightFailure>, range: HeightRange) -> QueryError {
    failures.into_iter().next().map_or_else(
        || {
            QueryError::unavailable(format!(
                "no blocks fetched for heights {}..{}",
                range.start, range.end
            ))
        },
        |f| f.error,
    )
}

/// Fee statistics for the block at `height`.
async fn fee_point(
    client: &dyn NodeClient,
    analyzer: &TransactionAnalyzer,
    height: u64,
    cap: usize,
) -> BitlensResult<FeePoint> {
    let hash = queries::block_hash(client, height).await?;
    let req = queries::get_block(&hash, 2);
    let payload = client.execute(&req).await?;
    let txs = payload
        .get("tx")
        .and_then(Value::as_array)
        .ok_or_else(|| req.annotate(QueryError::protocol("block has no transaction list")))?;

    let non_coinbase = txs
        .iter()
        .filter_map(Value::as_object)
        .filter(|tx| !is_coinbase(tx));

    let mut rates = Vec::new();
    let mut skipped = 0usize;
    if txs.iter().filter_map(Value::as_object).any(|tx| tx.contains_key("fee")) {
        for tx in non_coinbase {
            if rates.len() >= cap {
                break;
            }
            match embedded_fee_rate(tx) {
                Some(rate) => rates.push(rate),
                None => skipped += 1,
            }
        }
    } else {
        for tx in non_coinbase.take(cap) {
            match analyzer.summarize_decoded(tx).await {
                Ok(summary) => match summary.fee_rate_sat_per_vbyte {
                    Some(rate) => rates.push(rate),
                    None => skipped += 1,
                },
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(height, error = %e, "transaction skipped");
                }
            }
        }
    }
    if skipped > 0 {
        tracing::debug!(height, skipped, "transactions without a fee rate");
    }

    Ok(match FeeRateStats::from_rates(&rates) {
        Some(stats) => FeePoint::Data { stats, skipped },
        None => FeePoint::NoData {
            reason: NoDataReason::NoEligibleTransactions,
        },
    })
}

fn is_coinbase(tx: &Object) -> bool {
    tx.get("vin")
        .and_then(Value::as_array)
        .and_then(|vin| vin.first())
        .and_then(Value::as_object)
        .is_some_and(|input| input.contains_key("coinbase"))
}

/// sat/vB from the `fee` field `getblock <hash> 2` attaches to each transaction.
fn embedded_fee_rate(tx: &Object) -> Option<f64> {
    let fee = btc_to_sats(f64_field(tx, "fee")?)?;
    let vsize = u64_field(tx, "vsize").filter(|v| *v > 0)?;
    Some(fee as f64 / vsize as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn genesis_epoch_samples_once() {
        assert_eq!(sample_heights(HeightRange::new(0, 2016), 2016, 64), vec![0]);
        assert_eq!(
            sample_heights(HeightRange::new(0, 4033), 2016, 64),
            vec![0, 2016, 4032]
        );
    }

    #[test]
    fn unaligned_start_is_kept() {
        assert_eq!(
            sample_heights(HeightRange::new(100, 5000), 2016, 64),
            vec![100, 2016, 4032]
        );
    }

    #[test]
    fn dense_sampling_when_window_fits() {
        let h = sample_heights(HeightRange::new(10, 20), 1, 64);
        assert_eq!(h, (10..20).collect::<Vec<_>>());
    }

    #[test]
    fn stride_widens_to_bound_samples() {
        for (start, end, max) in [(0, 800_000, 64), (17, 1_000, 10), (5, 9, 2), (0, 100, 1)] {
            let h = sample_heights(HeightRange::new(start, end), 1, max);
            assert!(h.len() <= max, "{start}..{end} max {max}: {}", h.len());
            assert_eq!(h[0], start);
            assert!(h.windows(2).all(|w| w[0] < w[1]));
            assert!(h.iter().all(|x| *x < end));
        }
    }

    #[test]
    fn empty_range_has_no_samples() {
        assert!(sample_heights(HeightRange::new(5, 5), 1, 64).is_empty());
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(Confidence::from_sample_size(143), Confidence::Low);
        assert_eq!(Confidence::from_sample_size(144), Confidence::Medium);
        assert_eq!(Confidence::from_sample_size(1008), Confidence::High);
    }

    #[test]
    fn interval_buckets() {
        let b = bucketize([-0.5, 0.0, 0.9, 1.0, 9.99, 75.0].into_iter(), INTERVAL_BUCKETS);
        let count = |label: &str| b.iter().find(|x| x.label == label).map(|x| x.count);
        assert_eq!(count("0-1"), Some(3));
        assert_eq!(count("1-2"), Some(1));
        assert_eq!(count("5-10"), Some(1));
        assert_eq!(count("60+"), Some(1));
        assert_eq!(b.iter().map(|x| x.count).sum::<usize>(), 6);
    }

    #[test]
    fn fee_summary_skips_no_data() {
        let points = [
            FeePoint::Data {
                stats: FeeRateStats::from_rates(&[1.0, 3.0]).unwrap(),
                skipped: 2,
            },
            FeePoint::NoData {
                reason: NoDataReason::NoEligibleTransactions,
            },
            FeePoint::Data {
                stats: FeeRateStats::from_rates(&[10.0]).unwrap(),
                skipped: 0,
            },
        ];
        let s = FeeSummary::from_points(points.iter());
        assert_eq!(s.data_points, 2);
        assert_eq!(s.no_data_points, 1);
        assert_eq!(s.total_transactions, 3);
        assert_eq!(s.skipped_transactions, 2);
        assert_eq!(s.min, Some(1.0));
        assert_eq!(s.max, Some(10.0));
        assert_eq!(s.avg_mean, Some(6.0));
    }

    #[test]
    fn embedded_fee_rate_needs_vsize() {
        let tx = json!({ "fee": 0.00001, "vsize": 100 });
        assert_eq!(embedded_fee_rate(tx.as_object().unwrap()), Some(10.0));
        let tx = json!({ "fee": 0.00001, "vsize": 0 });
        assert_eq!(embedded_fee_rate(tx.as_object().unwrap()), None);
    }

    #[test]
    fn fee_point_serializes_with_status() {
        let p = FeePoint::NoData {
            reason: NoDataReason::NoEligibleTransactions,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["status"], "no_data");
        assert_eq!(v["reason"], "no_eligible_transactions");
    }
}
