use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::types::{SmoothedSeries, WindowChoice, WindowScore};

/// Trailing simple moving average. Position `t` is defined only when the
/// `window` values ending at `t` are all defined.
pub fn sma(ctr: &[Option<f64>], window: usize) -> SmoothedSeries {
    let mut values = vec![None; ctr.len()];
    if window > 0 && window <= ctr.len() {
        for (i, w) in ctr.windows(window).enumerate() {
            values[i + window - 1] = w
                .iter()
                .copied()
                .sum::<Option<f64>>()
                .map(|sum| sum / window as f64);
        }
    }
    SmoothedSeries { window, values }
}

/// Sum of absolute differences between the smoothed and raw series over
/// the positions where both are defined.
pub fn sad(ctr: &[Option<f64>], smoothed: &SmoothedSeries) -> WindowScore {
    let mut total = 0.0;
    let mut defined_points = 0;
    for (raw, avg) in ctr.iter().zip(&smoothed.values) {
        if let (Some(raw), Some(avg)) = (raw, avg) {
            total += (avg - raw).abs();
            defined_points += 1;
        }
    }
    WindowScore {
        window: smoothed.window,
        sad: (defined_points > 0).then_some(total),
        defined_points,
    }
}

/// Smallest window after which the SAD curve stops moving: the first `w`
/// with `|SAD(w+1) - SAD(w)| < epsilon * |SAD(first) - SAD(last)|`.
/// Falls back to the first window for a flat curve and to the last one
/// when the curve never flattens. `None` if no score is defined.
pub fn elbow(scores: &[WindowScore], epsilon: f64) -> Option<usize> {
    let defined: Vec<(usize, f64)> = scores
        .iter()
        .filter_map(|s| s.sad.map(|v| (s.window, v)))
        .collect();
    let (first, last) = (defined.first()?, defined.last()?);

    let span = (first.1 - last.1).abs();
    if span == 0.0 {
        return Some(first.0);
    }
    defined
        .windows(2)
        .find(|pair| (pair[1].1 - pair[0].1).abs() < epsilon * span)
        .map(|pair| pair[0].0)
        .or(Some(last.0))
}

/// Outcome of scoring every candidate window and committing to one.
#[derive(Debug, Clone)]
pub struct WindowSelection {
    pub scores: Vec<WindowScore>,
    pub window: usize,
    pub choice: WindowChoice,
    pub smoothed: SmoothedSeries,
}

pub struct WindowSelector {
    window_min: usize,
    window_max: usize,
    epsilon: f64,
}

impl WindowSelector {
    pub fn new(window_min: usize, window_max: usize, epsilon: f64) -> Self {
        Self {
            window_min,
            window_max,
            epsilon,
        }
    }

    /// SAD score for every candidate window, ordered by window size.
    /// Windows longer than the series are listed without smoothing it.
    pub fn score(&self, ctr: &[Option<f64>]) -> Vec<WindowScore> {
        (self.window_min..=self.window_max)
            .map(|w| {
                if w <= ctr.len() {
                    sad(ctr, &sma(ctr, w))
                } else {
                    WindowScore {
                        window: w,
                        sad: None,
                        defined_points: 0,
                    }
                }
            })
            .collect()
    }

    /// Scores the candidates and picks the smoothing window, honouring a
    /// configured `fixed` window over the heuristic.
    pub fn select(&self, ctr: &[Option<f64>], fixed: Option<usize>) -> Result<WindowSelection> {
        let scores = self.score(ctr);
        for s in &scores {
            debug!(
                window = s.window,
                sad = ?s.sad,
                defined_points = s.defined_points,
                "[WINDOW] candidate scored"
            );
        }

        let elbow_window = elbow(&scores, self.epsilon).ok_or_else(|| {
            AppError::EmptyDataset(format!(
                "{} hours cannot fill the smallest candidate window of {}",
                ctr.len(),
                self.window_min
            ))
        })?;

        let (window, choice) = match fixed {
            Some(w) => (w, WindowChoice::Configured),
            None => (elbow_window, WindowChoice::Elbow),
        };
        if window > ctr.len() {
            warn!(
                window,
                hours = ctr.len(),
                "[WINDOW] window longer than the series; no hour will be smoothed"
            );
        }

        info!(
            window,
            elbow_window,
            choice = %choice,
            epsilon = self.epsilon,
            "[WINDOW] smoothing with SMA{window} ({choice}; elbow suggests SMA{elbow_window})"
        );

        Ok(WindowSelection {
            scores,
            window,
            choice,
            smoothed: sma(ctr, window),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::outlier::std_dev;

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    fn assert_close(a: Option<f64>, b: Option<f64>) {
        match (a, b) {
            (Some(a), Some(b)) => assert!((a - b).abs() < 1e-12, "{a} != {b}"),
            (None, None) => {}
            _ => panic!("{a:?} != {b:?}"),
        }
    }

    #[test]
    fn sma_is_trailing_and_leaves_warmup_undefined() {
        let ctr = defined(&[0.1, 0.1, 0.1, 0.5, 0.1]);
        let s = sma(&ctr, 2);
        let expected = [None, Some(0.1), Some(0.1), Some(0.3), Some(0.3)];
        assert_eq!(s.window, 2);
        for (got, want) in s.values.iter().zip(expected) {
            assert_close(*got, want);
        }
    }

    #[test]
    fn sma_window_touching_a_gap_is_undefined() {
        let ctr = vec![Some(0.2), Some(0.4), None, Some(0.6), Some(0.8), Some(1.0)];
        let s = sma(&ctr, 2);
        let expected = [None, Some(0.3), None, None, Some(0.7), Some(0.9)];
        for (got, want) in s.values.iter().zip(expected) {
            assert_close(*got, want);
        }
    }

    #[test]
    fn sma_longer_than_series_is_all_undefined() {
        let s = sma(&defined(&[0.1, 0.2]), 3);
        assert_eq!(s.values, vec![None, None]);
        assert_eq!(sma(&[], 2).values, Vec::<Option<f64>>::new());
    }

    #[test]
    fn sad_sums_defined_positions_only() {
        let ctr = defined(&[0.1, 0.1, 0.1, 0.5, 0.1]);
        let score = sad(&ctr, &sma(&ctr, 2));
        assert_eq!(score.defined_points, 4);
        assert_close(score.sad, Some(0.4));
    }

    #[test]
    fn exactly_min_window_hours_scores_one_point() {
        let ctr = defined(&[0.1, 0.3]);
        let scores = WindowSelector::new(2, 4, 0.05).score(&ctr);

        let windows: Vec<usize> = scores.iter().map(|s| s.window).collect();
        assert_eq!(windows, vec![2, 3, 4]);
        assert_eq!(scores[0].window, 2);
        assert_eq!(scores[0].defined_points, 1);
        assert_close(scores[0].sad, Some(0.1));
        for s in &scores[1..] {
            assert_eq!(s.sad, None);
            assert_eq!(s.defined_points, 0);
        }
    }

    #[test]
    fn sad_trends_upward_on_a_sine_wave() {
        let ctr: Vec<Option<f64>> = (0..24 * 20)
            .map(|t| Some(0.1 + 0.05 * (2.0 * std::f64::consts::PI * t as f64 / 24.0).sin()))
            .collect();
        let scores = WindowSelector::new(2, 11, 0.05).score(&ctr);
        assert_eq!(scores.len(), 10);
        for pair in scores.windows(2) {
            assert!(pair[1].sad.unwrap() > pair[0].sad.unwrap());
        }
    }

    #[test]
    fn smoothing_a_ramp_never_increases_spread() {
        let ctr: Vec<Option<f64>> = (0..50).map(|t| Some(0.01 * t as f64)).collect();
        let spreads: Vec<f64> = (1..=11)
            .map(|w| std_dev(&sma(&ctr, w).values).unwrap())
            .collect();
        for pair in spreads.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12);
        }
    }

    fn scores(sads: &[f64]) -> Vec<WindowScore> {
        sads.iter()
            .enumerate()
            .map(|(i, &v)| WindowScore {
                window: i + 2,
                sad: Some(v),
                defined_points: 10,
            })
            .collect()
    }

    #[test]
    fn elbow_picks_first_flat_step() {
        // span 10; steps 5, 3, 1.5, 0.3 -> first step below 0.5 starts at w=5
        let s = scores(&[20.0, 15.0, 12.0, 10.5, 10.2, 10.1, 10.0]);
        assert_eq!(elbow(&s, 0.05), Some(5));
        assert_eq!(elbow(&s, 0.2), Some(4));
    }

    #[test]
    fn elbow_handles_rising_curves() {
        let s = scores(&[1.0, 5.0, 8.0, 8.1, 8.2, 12.0]);
        assert_eq!(elbow(&s, 0.05), Some(4));
    }

    #[test]
    fn elbow_fallbacks() {
        assert_eq!(elbow(&scores(&[3.0, 3.0, 3.0]), 0.05), Some(2));
        assert_eq!(elbow(&scores(&[1.0, 2.0, 3.0, 4.0]), 0.05), Some(5));
        assert_eq!(elbow(&scores(&[7.0]), 0.05), Some(2));
        assert_eq!(elbow(&[], 0.05), None);
    }

    #[test]
    fn elbow_ignores_undefined_windows() {
        let mut s = scores(&[4.0, 2.0, 1.95]);
        s.push(WindowScore {
            window: 5,
            sad: None,
            defined_points: 0,
        });
        assert_eq!(elbow(&s, 0.05), Some(3));
    }

    #[test]
    fn select_uses_configured_window_but_keeps_scores() {
        let ctr = defined(&[0.1, 0.2, 0.3, 0.2, 0.1, 0.2, 0.3, 0.2, 0.1, 0.2]);
        let sel = WindowSelector::new(2, 4, 0.05).select(&ctr, Some(3)).unwrap();
        assert_eq!(sel.window, 3);
        assert_eq!(sel.choice, WindowChoice::Configured);
        assert_eq!(sel.scores.len(), 3);
        assert_eq!(sel.smoothed.window, 3);
        assert_eq!(sel.smoothed.values.len(), ctr.len());
    }

    #[test]
    fn select_finds_the_elbow_of_a_single_spike() {
        // SAD(w) = 2h(1 - 1/w): steps shrink as 2h / (w(w + 1)) and first
        // drop below 5% of the span between SMA7 and SMA8.
        let mut ctr = vec![Some(0.1); 30];
        ctr[12] = Some(0.9);
        let sel = WindowSelector::new(2, 11, 0.05).select(&ctr, None).unwrap();

        assert_eq!(sel.choice, WindowChoice::Elbow);
        assert_eq!(sel.window, 7);
        assert_eq!(sel.smoothed.window, 7);
        assert_close(sel.scores[0].sad, Some(0.8));
        assert_eq!(sel.scores.len(), 10);
    }

    #[test]
    fn select_falls_back_to_the_widest_window_on_a_noisy_series() {
        let ctr: Vec<Option<f64>> = (0..48u32)
            .map(|h| Some(f64::from(5 + (h * 7) % 23) / 100.0))
            .collect();
        let sel = WindowSelector::new(2, 11, 0.05).select(&ctr, None).unwrap();
        assert_eq!(sel.choice, WindowChoice::Elbow);
        assert_eq!(sel.window, 11);
    }

    #[test]
    fn select_without_enough_hours_is_empty_dataset() {
        let err = WindowSelector::new(2, 11, 0.05)
            .select(&defined(&[0.1]), None)
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyDataset(_)));
    }
}
