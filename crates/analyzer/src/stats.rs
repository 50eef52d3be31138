//! Order statistics shared by fee and block-interval analysis.
//!
//! Percentiles use the nearest-rank method over the sorted sample:
//! `P(p) = x[max(1, ceil(p/100 * n)) - 1]`. The median is `P(50)`, which
//! is the lower median for even `n`. Standard deviation is the population
//! form.

use serde::Serialize;

/// Sorts a copy of `values` ascending. NaNs sort last.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(f64::total_cmp);
    v
}

/// Nearest-rank percentile of an already sorted slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (p.clamp(0.0, 100.0) * n as f64 / 100.0).ceil() as usize;
    Some(sorted[rank.clamp(1, n) - 1])
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Min/max/mean/median over one block's fee rates (sat/vB).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeRateStats {
    pub tx_count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl FeeRateStats {
    pub fn from_rates(rates: &[f64]) -> Option<Self> {
        let s = sorted(rates);
        Some(Self {
            tx_count: s.len(),
            min: *s.first()?,
            max: *s.last()?,
            mean: mean(&s)?,
            median: percentile(&s, 50.0)?,
        })
    }
}

/// Descriptive statistics over an arbitrary sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub p10: f64,
    pub p25: f64,
    pub p75: f64,
    pub p90: f64,
}

impl Summary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let s = sorted(values);
        Some(Self {
            count: s.len(),
            mean: mean(&s)?,
            median: percentile(&s, 50.0)?,
            min: *s.first()?,
            max: *s.last()?,
            std_dev: std_dev(&s)?,
            p10: percentile(&s, 10.0)?,
            p25: percentile(&s, 25.0)?,
            p75: percentile(&s, 75.0)?,
            p90: percentile(&s, 90.0)?,
        })
    }
}
