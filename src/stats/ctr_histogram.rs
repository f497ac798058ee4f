//! Distribution of hourly CTR values, recorded in basis points.
//! Feeds the histogram panel and the quantiles in the run report.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// CTR 1.0 == 10_000 basis points.
const BASIS_POINTS: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Inclusive lower edge, as a CTR.
    pub lower: f64,
    /// Exclusive upper edge, as a CTR.
    pub upper: f64,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DistributionSummary {
    pub count: u64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub bins: Vec<HistogramBin>,
}

/// Quantiles and bins come from the histogram; `min`, `max` and `mean` are
/// tracked exactly since the histogram rounds large values.
pub struct CtrHistogram {
    inner: hdrhistogram::Histogram<u64>,
    min: Option<f64>,
    max: Option<f64>,
    sum: f64,
}

impl CtrHistogram {
    /// Tracks 0 to 10_000 bp at 3 significant figures.
    pub fn new() -> Result<Self> {
        let inner = hdrhistogram::Histogram::new_with_bounds(1, BASIS_POINTS as u64, 3)?;
        Ok(Self {
            inner,
            min: None,
            max: None,
            sum: 0.0,
        })
    }

    /// Histogram of every defined value in `ctr`.
    pub fn from_series(ctr: &[Option<f64>]) -> Result<Self> {
        let mut h = Self::new()?;
        for v in ctr.iter().flatten() {
            h.record(*v);
        }
        Ok(h)
    }

    #[inline]
    fn bp(ctr: f64) -> u64 {
        (ctr.clamp(0.0, 1.0) * BASIS_POINTS).round() as u64
    }

    #[inline]
    fn ctr(bp: u64) -> f64 {
        bp as f64 / BASIS_POINTS
    }

    pub fn record(&mut self, ctr: f64) {
        self.inner.saturating_record(Self::bp(ctr));
        self.min = Some(self.min.map_or(ctr, |m| m.min(ctr)));
        self.max = Some(self.max.map_or(ctr, |m| m.max(ctr)));
        self.sum += ctr;
    }

    pub fn len(&self) -> u64 {
        self.inner.len()
    }

    /// Return (p50, p95, p99). None if no samples.
    pub fn percentiles(&self) -> (Option<f64>, Option<f64>, Option<f64>) {
        if self.len() == 0 {
            return (None, None, None);
        }
        let q = |quantile: f64| Some(Self::ctr(self.inner.value_at_quantile(quantile)));
        (q(0.5), q(0.95), q(0.99))
    }

    /// Equal-width bins from 0 up to the largest recorded value.
    pub fn bins(&self, count: u64) -> Vec<HistogramBin> {
        if self.len() == 0 || count == 0 {
            return Vec::new();
        }
        let step = ((self.inner.max() + 1) as f64 / count as f64).ceil().max(1.0) as u64;
        self.inner
            .iter_linear(step)
            .enumerate()
            .map(|(i, v)| HistogramBin {
                lower: Self::ctr(i as u64 * step),
                upper: Self::ctr((i as u64 + 1) * step),
                count: v.count_since_last_iteration(),
            })
            .collect()
    }

    pub fn summary(&self, bins: u64) -> DistributionSummary {
        let (p50, p95, p99) = self.percentiles();
        let count = self.len();
        DistributionSummary {
            count,
            min: self.min,
            max: self.max,
            mean: (count > 0).then(|| self.sum / count as f64),
            p50,
            p95,
            p99,
            bins: self.bins(bins),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_quantiles() {
        let h = CtrHistogram::from_series(&[None, None]).unwrap();
        assert_eq!(h.len(), 0);
        assert_eq!(h.percentiles(), (None, None, None));
        assert_eq!(h.summary(10), DistributionSummary::default());
    }

    #[test]
    fn records_defined_values_only() {
        let ctr = [Some(0.0), Some(0.05), None, Some(0.05), Some(0.1), Some(0.2)];
        let h = CtrHistogram::from_series(&ctr).unwrap();
        assert_eq!(h.len(), 5);

        let (p50, p95, p99) = h.percentiles();
        assert_eq!(p50, Some(0.05));
        assert!(p95 <= p99);
        assert!(p99.unwrap() <= 0.2);
    }

    #[test]
    fn bins_cover_every_sample() {
        let ctr: Vec<Option<f64>> = (0..200).map(|i| Some(f64::from(i % 37) / 250.0)).collect();
        let summary = CtrHistogram::from_series(&ctr).unwrap().summary(10);

        assert_eq!(summary.count, 200);
        assert_eq!(summary.bins.iter().map(|b| b.count).sum::<u64>(), 200);
        assert_eq!(summary.bins[0].lower, 0.0);
        for pair in summary.bins.windows(2) {
            assert_eq!(pair[0].upper, pair[1].lower);
        }
        assert_eq!(summary.min, Some(0.0));
        assert_eq!(summary.max, Some(0.144));
    }

    #[test]
    fn extremes_and_mean_are_exact_above_the_coarse_range() {
        let summary = CtrHistogram::from_series(&[Some(0.5), None, Some(0.2345)])
            .unwrap()
            .summary(10);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.max, Some(0.5));
        assert_eq!(summary.min, Some(0.2345));
        assert!((summary.mean.unwrap() - 0.367_25).abs() < 1e-12);
    }
}
