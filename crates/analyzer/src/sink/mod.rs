//! Flat, sink-ready rows for the series the engine produces.
//!
//! Row schemas:
//! - [`DifficultyRow`]: one per sampled height
//! - [`FeeRow`]: one per sampled block, `no_data` rows included
//! - [`IntervalRow`]: one per consecutive block pair
//! - [`SummaryRow`]: one per report, carrying the report as JSON
//!
//! Backend: [`json_stream::JsonStreamSink`] writes newline-delimited JSON
//! to any `Write` impl.

pub mod json_stream;

use crate::engine::{BlockTimeDistribution, DifficultyHistory, FeeHistory, FeePoint, NoDataReason};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

// ---------------------------------------------------------------------------
// Serializable row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DifficultyRow {
    pub height: u64,
    pub hash: String,
    pub timestamp: i64,
    pub difficulty: f64,
    pub change_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeeRow {
    pub height: u64,
    pub has_data: bool,
    pub tx_count: usize,
    pub skipped: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// Why a block has no data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IntervalRow {
    pub height: u64,
    pub seconds: i64,
    pub non_positive: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow<T: Serialize> {
    pub kind: &'static str,
    /// Unix seconds.
    pub created_at: u64,
    pub data: T,
}

impl<T: Serialize> SummaryRow<T> {
    pub fn new(kind: &'static str, data: T) -> Self {
        Self {
            kind,
            created_at: unix_now(),
            data,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

// ---------------------------------------------------------------------------
// Builders: series → rows
// ---------------------------------------------------------------------------

impl DifficultyHistory {
    pub fn to_rows(&self) -> Vec<DifficultyRow> {
        self.series
            .iter()
            .map(|p| DifficultyRow {
                height: p.key,
                hash: p.value.hash.clone(),
                timestamp: p.value.timestamp,
                difficulty: p.value.difficulty,
                change_pct: p.value.change_pct,
            })
            .collect()
    }
}

impl FeeHistory {
    pub fn to_rows(&self) -> Vec<FeeRow> {
        self.series
            .iter()
            .map(|p| match &p.value {
                FeePoint::Data { stats, skipped } => FeeRow {
                    height: p.key,
                    has_data: true,
                    tx_count: stats.tx_count,
                    skipped: *skipped,
                    min: Some(stats.min),
                    max: Some(stats.max),
                    mean: Some(stats.mean),
                    median: Some(stats.median),
                    reason: None,
                },
                FeePoint::NoData { reason } => FeeRow {
                    height: p.key,
                    has_data: false,
                    tx_count: 0,
                    skipped: 0,
                    min: None,
                    max: None,
                    mean: None,
                    median: None,
                    reason: Some(match reason {
                        NoDataReason::NoEligibleTransactions => "no eligible transactions".into(),
                        NoDataReason::FetchFailed(e) => e.to_string(),
                    }),
                },
            })
            .collect()
    }
}

impl BlockTimeDistribution {
    pub fn to_rows(&self) -> Vec<IntervalRow> {
        self.series
            .iter()
            .map(|p| IntervalRow {
                height: p.key,
                seconds: p.value.seconds,
                non_positive: p.value.non_positive,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FeeSummary;
    use crate::stats::FeeRateStats;
    use bitlens_core::{HeightRange, HistoricalSeries, QueryError};

    #[test]
    fn fee_rows_keep_no_data_blocks() {
        let series = HistoricalSeries::from_unordered([
            (
                11,
                FeePoint::NoData {
                    reason: NoDataReason::FetchFailed(QueryError::unavailable("pruned")),
                },
            ),
            (
                10,
                FeePoint::Data {
                    stats: FeeRateStats::from_rates(&[2.0, 4.0]).unwrap(),
                    skipped: 1,
                },
            ),
        ]);
        let history = FeeHistory {
            range: HeightRange::new(10, 12),
            sample_count: 2,
            summary: FeeSummary::default(),
            series,
        };

        let rows = history.to_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].height, 10);
        assert!(rows[0].has_data);
        assert_eq!(rows[0].median, Some(2.0));
        assert_eq!(rows[0].skipped, 1);
        assert!(!rows[1].has_data);
        assert!(rows[1].reason.as_deref().is_some_and(|r| r.contains("pruned")));
    }

    #[test]
    fn summary_row_is_stamped() {
        let row = SummaryRow::new("fee_history", 1u8);
        assert!(row.created_at > 1_600_000_000);
        assert_eq!(row.kind, "fee_history");
    }
}
