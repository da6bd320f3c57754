//! Statistical reference computations: control limits, Pareto curves,
//! Pearson correlation, and ratio rankings.

use serde::{Deserialize, Serialize};

/// Mean +/- 3 sigma reference band for a monitoring chart.
///
/// Variance is the population variance (mean of squared deviations); sample
/// variance buys nothing for monitoring-style control charts. The lower
/// limit is floored at zero since every monitored measure is a count or rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlLimits {
    pub mean: f64,
    pub upper: f64,
    pub lower: f64,
}

pub fn control_limits(values: &[f64]) -> ControlLimits {
    if values.is_empty() {
        return ControlLimits::default();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let stdev = variance.sqrt();
    ControlLimits {
        mean,
        upper: mean + 3.0 * stdev,
        lower: (mean - 3.0 * stdev).max(0.0),
    }
}

/// Ranked-by-magnitude labels with a cumulative-share overlay.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParetoCurve {
    pub labels: Vec<String>,
    pub counts: Vec<f64>,
    /// Running share of the grand total, in percent.
    pub cumulative_percent: Vec<f64>,
}

/// Sort (label, count) pairs descending by count and compute the running
/// cumulative share. A zero grand total yields 0% everywhere.
pub fn pareto(pairs: &[(String, f64)]) -> ParetoCurve {
    let mut sorted: Vec<(String, f64)> = pairs.to_vec();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let total: f64 = sorted.iter().map(|(_, c)| c).sum();

    let mut curve = ParetoCurve::default();
    let mut running = 0.0;
    for (label, count) in sorted {
        running += count;
        let percent = if total > 0.0 {
            running / total * 100.0
        } else {
            0.0
        };
        curve.labels.push(label);
        curve.counts.push(count);
        curve.cumulative_percent.push(percent);
    }
    curve
}

/// Pearson's r between two sequences, truncated to the shorter length when
/// they differ. Returns 0 for fewer than two points or a zero denominator.
pub fn correlation(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let xs = &xs[..n];
    let ys = &ys[..n];
    let count = n as f64;
    let mean_x = xs.iter().sum::<f64>() / count;
    let mean_y = ys.iter().sum::<f64>() / count;
    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    covariance / denominator
}

/// One entry of a ratio ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioEntry {
    pub label: String,
    pub numerator: f64,
    pub denominator: f64,
    pub ratio: f64,
}

/// Labels whose denominator falls below this many samples produce noisy
/// ratios and are excluded by default.
pub const DEFAULT_MIN_DENOMINATOR: f64 = 2.0;

/// Compute numerator/denominator per label, drop labels whose denominator is
/// below `min_denominator`, sort descending by ratio, and keep the top `n`
/// (all when `n` is 0). A zero denominator evaluates to ratio 0, never NaN.
pub fn ratio_ranking(
    entries: &[(String, f64, f64)],
    min_denominator: f64,
    top_n: usize,
) -> Vec<RatioEntry> {
    let mut ranked: Vec<RatioEntry> = entries
        .iter()
        .filter(|(_, _, den)| *den >= min_denominator)
        .map(|(label, num, den)| RatioEntry {
            label: label.clone(),
            numerator: *num,
            denominator: *den,
            ratio: safe_ratio(*num, *den),
        })
        .collect();
    ranked.sort_by(|a, b| b.ratio.total_cmp(&a.ratio).then_with(|| a.label.cmp(&b.label)));
    if top_n > 0 {
        ranked.truncate(top_n);
    }
    ranked
}

/// Division that resolves a zero denominator to 0 so every computed rate is
/// total-order-safe for sorting and charting.
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}
