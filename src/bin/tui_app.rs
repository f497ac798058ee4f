use std::path::PathBuf;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Report types (mirror export/report.rs shapes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WindowScore {
    pub window: usize,
    pub sad: Option<f64>,
    #[allow(dead_code)]
    pub defined_points: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[allow(dead_code)]
pub struct DistributionSummary {
    pub count: u64,
    pub p50: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub bins: Vec<HistogramBin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportPoint {
    pub hour: String,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: Option<f64>,
    pub sma: Option<f64>,
    pub outlier: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct RunReport {
    pub input_path: String,
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub hours: usize,
    pub empty_hours: usize,
    pub window: usize,
    pub window_choice: String,
    pub scores: Vec<WindowScore>,
    pub dispersion_kind: String,
    pub dispersion: f64,
    pub multiplier: f64,
    pub threshold: f64,
    pub outlier_count: usize,
    pub ctr_distribution: DistributionSummary,
    pub points: Vec<ReportPoint>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loaded,
    Error(String),
    Loading,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: LoadStatus,
    pub report: Option<RunReport>,
    pub report_path: PathBuf,
    pub last_load: std::time::Instant,
}

impl AppState {
    pub fn new(report_path: PathBuf) -> Self {
        Self {
            status: LoadStatus::Loading,
            report: None,
            report_path,
            last_load: std::time::Instant::now(),
        }
    }

    /// Re-reads the report file. A failed read keeps the previous report.
    pub fn reload(&mut self) {
        let parsed = std::fs::read_to_string(&self.report_path)
            .map_err(|e| e.to_string())
            .and_then(|body| {
                serde_json::from_str::<RunReport>(&body).map_err(|e| format!("parse error: {e}"))
            });

        match parsed {
            Ok(report) => {
                self.report = Some(report);
                self.status = LoadStatus::Loaded;
                self.last_load = std::time::Instant::now();
            }
            Err(e) => self.status = LoadStatus::Error(e),
        }
    }

    /// Flagged hours, in time order.
    pub fn outliers(&self) -> Vec<&ReportPoint> {
        self.report
            .as_ref()
            .map(|r| r.points.iter().filter(|p| p.outlier).collect())
            .unwrap_or_default()
    }

    /// (hour offset, value) pairs for a chart dataset.
    pub fn ctr_points(&self) -> Vec<(f64, f64)> {
        self.series_points(|p| p.ctr)
    }

    pub fn sma_points(&self) -> Vec<(f64, f64)> {
        self.series_points(|p| p.sma)
    }

    pub fn outlier_points(&self) -> Vec<(f64, f64)> {
        self.series_points(|p| p.ctr.filter(|_| p.outlier))
    }

    fn series_points<F>(&self, value: F) -> Vec<(f64, f64)>
    where
        F: Fn(&ReportPoint) -> Option<f64>,
    {
        let Some(report) = &self.report else {
            return Vec::new();
        };
        report
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| value(p).map(|v| (i as f64, v)))
            .collect()
    }

    pub fn sad_points(&self) -> Vec<(f64, f64)> {
        self.report
            .as_ref()
            .map(|r| {
                r.scores
                    .iter()
                    .filter_map(|s| s.sad.map(|v| (s.window as f64, v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_ctr(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{:.2}%", v * 100.0),
        None => "—".to_string(),
    }
}

/// `2014-10-21T05:00:00` → `10-21 05h`.
pub fn format_hour(stamp: &str) -> String {
    match (stamp.get(5..10), stamp.get(11..13)) {
        (Some(day), Some(hour)) => format!("{day} {hour}h"),
        _ => stamp.to_string(),
    }
}

/// (min, max) of the y values, padded so a flat series still spans a band.
pub fn y_bounds(points: &[(f64, f64)]) -> [f64; 2] {
    let (lo, hi) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, y)| (lo.min(y), hi.max(y)));
    if !lo.is_finite() {
        return [0.0, 1.0];
    }
    let pad = ((hi - lo) * 0.05).max(1e-4);
    [lo - pad, hi + pad]
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_labels_are_compact() {
        assert_eq!(format_hour("2014-10-21T05:00:00"), "10-21 05h");
        assert_eq!(format_hour("bad"), "bad");
    }

    #[test]
    fn y_bounds_pad_flat_and_empty_series() {
        assert_eq!(y_bounds(&[]), [0.0, 1.0]);
        let [lo, hi] = y_bounds(&[(0.0, 0.2), (1.0, 0.2)]);
        assert!(lo < 0.2 && hi > 0.2);
    }

    #[test]
    fn missing_report_sets_error_status() {
        let mut app = AppState::new(PathBuf::from("/nonexistent/report.json"));
        app.reload();
        assert!(matches!(app.status, LoadStatus::Error(_)));
        assert!(app.report.is_none());
        assert!(app.ctr_points().is_empty());
    }
}
