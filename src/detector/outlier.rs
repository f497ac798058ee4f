use tracing::info;

use crate::error::{AppError, Result};
use crate::types::{Dispersion, OutlierSplit, SmoothedSeries};

/// Scale that makes the median absolute deviation estimate sigma for
/// normally distributed data.
const MAD_SCALE: f64 = 1.4826;

/// Sample standard deviation (n - 1) over the defined values.
/// `None` with fewer than two defined values.
pub fn std_dev(values: &[Option<f64>]) -> Option<f64> {
    let defined: Vec<f64> = values.iter().flatten().copied().collect();
    if defined.len() < 2 {
        return None;
    }
    let n = defined.len() as f64;
    let mean = defined.iter().sum::<f64>() / n;
    let sq_sum: f64 = defined.iter().map(|v| (v - mean).powi(2)).sum();
    Some((sq_sum / (n - 1.0)).sqrt())
}

/// Scaled median absolute deviation over the defined values.
pub fn mad(values: &[Option<f64>]) -> Option<f64> {
    let mut defined: Vec<f64> = values.iter().flatten().copied().collect();
    let center = median(&mut defined)?;
    let mut deviations: Vec<f64> = defined.iter().map(|v| (v - center).abs()).collect();
    median(&mut deviations).map(|m| m * MAD_SCALE)
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Splits `ctr` into flagged and unflagged hours. An hour is flagged when
/// both its CTR and its SMA are defined and they differ by more than
/// `threshold`.
pub fn split(
    ctr: &[Option<f64>],
    smoothed: &SmoothedSeries,
    threshold: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    ctr.iter()
        .enumerate()
        .map(|(t, raw)| {
            let avg = smoothed.values.get(t).copied().flatten();
            match (*raw, avg) {
                (Some(v), Some(a)) if (v - a).abs() > threshold => (Some(v), None),
                (raw, _) => (None, raw),
            }
        })
        .unzip()
}

/// Flags hours whose CTR strays from the smoothed baseline by more than
/// `multiplier × dispersion(CTR)`.
pub struct OutlierDetector {
    multiplier: f64,
    dispersion: Dispersion,
}

impl OutlierDetector {
    pub fn new(multiplier: f64, dispersion: Dispersion) -> Self {
        Self {
            multiplier,
            dispersion,
        }
    }

    /// Dispersion of the whole CTR series under the configured measure.
    pub fn dispersion(&self, ctr: &[Option<f64>]) -> Result<f64> {
        let value = match self.dispersion {
            Dispersion::StdDev => std_dev(ctr),
            Dispersion::Mad => mad(ctr),
        };
        value.ok_or_else(|| {
            AppError::EmptyDataset(format!(
                "not enough hours with impressions to compute {}",
                self.dispersion
            ))
        })
    }

    pub fn detect(&self, ctr: &[Option<f64>], smoothed: &SmoothedSeries) -> Result<OutlierSplit> {
        let dispersion = self.dispersion(ctr)?;
        let threshold = self.multiplier * dispersion;
        let (outliers, no_outliers) = split(ctr, smoothed, threshold);

        let result = OutlierSplit {
            dispersion,
            threshold,
            outliers,
            no_outliers,
        };
        info!(
            outliers = result.outlier_count(),
            threshold,
            dispersion,
            "[OUTLIER] {} of {} hours flagged | threshold {:.4} = {} × {} {:.4} | SMA{}",
            result.outlier_count(),
            ctr.len(),
            threshold,
            self.multiplier,
            self.dispersion,
            dispersion,
            smoothed.window,
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::window::sma;

    fn regression_ctr() -> Vec<Option<f64>> {
        // impressions 100 each, clicks [10, 10, 10, 50, 10]
        [10u32, 10, 10, 50, 10]
            .iter()
            .map(|&c| Some(f64::from(c) / 100.0))
            .collect()
    }

    #[test]
    fn std_dev_is_sample_and_skips_gaps() {
        let sd = std_dev(&regression_ctr()).unwrap();
        assert!((sd - 0.178_885_438_2).abs() < 1e-9);

        let mut gappy = regression_ctr();
        gappy.insert(2, None);
        assert_eq!(std_dev(&gappy), Some(sd));

        assert_eq!(std_dev(&[Some(0.1), None]), None);
    }

    #[test]
    fn mad_is_scaled_median_deviation() {
        let values = [Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(100.0), None];
        // median 3, deviations [2, 1, 0, 1, 97] -> median 1
        assert!((mad(&values).unwrap() - MAD_SCALE).abs() < 1e-12);
        assert_eq!(mad(&[None]), None);
    }

    #[test]
    fn regression_case_flags_nothing_at_default_multiplier() {
        let ctr = regression_ctr();
        let smoothed = sma(&ctr, 2);
        let result = OutlierDetector::new(1.5, Dispersion::StdDev)
            .detect(&ctr, &smoothed)
            .unwrap();

        assert!((result.threshold - 0.268_328_157_3).abs() < 1e-9);
        assert_eq!(result.outlier_count(), 0);
        assert_eq!(result.no_outliers, ctr);
    }

    #[test]
    fn lower_multiplier_flags_the_spike_and_its_echo() {
        let ctr = regression_ctr();
        let result = OutlierDetector::new(1.0, Dispersion::StdDev)
            .detect(&ctr, &sma(&ctr, 2))
            .unwrap();

        assert_eq!(result.outliers, vec![None, None, None, Some(0.5), Some(0.1)]);
        assert_eq!(result.no_outliers, vec![Some(0.1), Some(0.1), Some(0.1), None, None]);
        assert!(result.is_outlier(3));
        assert!(!result.is_outlier(0));
    }

    #[test]
    fn outputs_are_complementary_and_rebuild_ctr() {
        let ctr = vec![
            Some(0.10), Some(0.12), None, Some(0.45), Some(0.11), Some(0.02),
            None, None, Some(0.13), Some(0.60), Some(0.12), Some(0.10),
        ];
        let result = OutlierDetector::new(0.5, Dispersion::StdDev)
            .detect(&ctr, &sma(&ctr, 2))
            .unwrap();

        assert!(result.outlier_count() > 0);
        for (t, raw) in ctr.iter().enumerate() {
            match raw {
                None => {
                    assert_eq!(result.outliers[t], None);
                    assert_eq!(result.no_outliers[t], None);
                }
                Some(v) => {
                    let both = [result.outliers[t], result.no_outliers[t]];
                    assert_eq!(both.iter().flatten().count(), 1);
                    assert_eq!(both.iter().flatten().next(), Some(v));
                }
            }
        }
    }

    #[test]
    fn undefined_baseline_never_flags() {
        let ctr = regression_ctr();
        let result = OutlierDetector::new(0.0, Dispersion::StdDev)
            .detect(&ctr, &sma(&ctr, 10))
            .unwrap();
        assert_eq!(result.outlier_count(), 0);
        assert_eq!(result.no_outliers, ctr);
    }

    #[test]
    fn too_few_values_is_empty_dataset() {
        let ctr = vec![Some(0.1), None, None];
        let err = OutlierDetector::new(1.5, Dispersion::StdDev)
            .detect(&ctr, &sma(&ctr, 2))
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyDataset(_)));
    }
}
