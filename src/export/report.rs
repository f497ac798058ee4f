use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::batch::ExportBatch;
use crate::config::Config;
use crate::detector::WindowSelection;
use crate::error::Result;
use crate::loader::LoadedEvents;
use crate::stats::DistributionSummary;
use crate::types::{Dispersion, HourlySeries, OutlierSplit, OutputMode, WindowChoice, WindowScore};

/// One hour of the analysed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPoint {
    pub hour: NaiveDateTime,
    pub impressions: u64,
    pub clicks: u64,
    pub ctr: Option<f64>,
    pub sma: Option<f64>,
    pub outlier: bool,
}

/// Everything a run decided, written as JSON for the chart viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub input_path: String,
    pub rows_read: u64,
    pub rows_skipped: u64,
    pub events: usize,
    pub hours: usize,
    pub empty_hours: usize,
    pub window_min: usize,
    pub window_max: usize,
    pub elbow_epsilon: f64,
    pub window: usize,
    pub window_choice: WindowChoice,
    pub scores: Vec<WindowScore>,
    pub dispersion_kind: Dispersion,
    pub dispersion: f64,
    pub multiplier: f64,
    pub threshold: f64,
    pub outlier_count: usize,
    pub ctr_distribution: DistributionSummary,
    pub points: Vec<ReportPoint>,
}

impl RunReport {
    pub fn build(
        cfg: &Config,
        loaded: &LoadedEvents,
        series: &HourlySeries,
        selection: &WindowSelection,
        split: &OutlierSplit,
        ctr_distribution: DistributionSummary,
    ) -> Self {
        let points = series
            .buckets
            .iter()
            .enumerate()
            .map(|(t, b)| ReportPoint {
                hour: b.hour,
                impressions: b.impressions,
                clicks: b.clicks,
                ctr: b.ctr(),
                sma: selection.smoothed.values.get(t).copied().flatten(),
                outlier: split.is_outlier(t),
            })
            .collect();

        Self {
            input_path: cfg.input_path.display().to_string(),
            rows_read: loaded.rows_read,
            rows_skipped: loaded.rows_skipped,
            events: loaded.events.len(),
            hours: series.len(),
            empty_hours: series.gap_count(),
            window_min: cfg.window_min,
            window_max: cfg.window_max,
            elbow_epsilon: cfg.elbow_epsilon,
            window: selection.window,
            window_choice: selection.choice,
            scores: selection.scores.clone(),
            dispersion_kind: cfg.dispersion,
            dispersion: split.dispersion,
            multiplier: cfg.outlier_multiplier,
            threshold: split.threshold,
            outlier_count: split.outlier_count(),
            ctr_distribution,
            points,
        }
    }
}

/// Stages the pretty-printed report for `path`; the commit replaces any
/// earlier report.
pub fn stage_report(batch: &mut ExportBatch, path: &Path, report: &RunReport) -> Result<()> {
    let mut out = BufWriter::new(batch.open(path, OutputMode::Truncate)?);
    serde_json::to_writer_pretty(&mut out, report)?;
    out.write_all(b"\n")?;
    out.flush()?;

    info!("[EXPORT] report staged for {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::window::sma;
    use crate::types::HourlyBucket;
    use chrono::NaiveDate;
    use std::fs;

    #[test]
    fn report_round_trips_through_json_file() {
        let start = NaiveDate::from_ymd_opt(2014, 10, 21)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut series = HourlySeries {
            start,
            buckets: Vec::new(),
        };
        for (i, (imp, clk)) in [(10, 1), (0, 0), (10, 9)].into_iter().enumerate() {
            let hour = series.hour_at(i);
            series.buckets.push(HourlyBucket {
                hour,
                impressions: imp,
                clicks: clk,
            });
        }
        let ctr = series.ctr();
        let selection = WindowSelection {
            scores: vec![],
            window: 2,
            choice: WindowChoice::Configured,
            smoothed: sma(&ctr, 2),
        };
        let split = OutlierSplit {
            dispersion: 0.5,
            threshold: 0.75,
            outliers: vec![None, None, Some(0.9)],
            no_outliers: vec![Some(0.1), None, None],
        };
        let loaded = LoadedEvents {
            events: vec![],
            rows_read: 20,
            rows_skipped: 0,
        };
        let report = RunReport::build(
            &Config::default(),
            &loaded,
            &series,
            &selection,
            &split,
            DistributionSummary::default(),
        );

        assert_eq!(report.hours, 3);
        assert_eq!(report.empty_hours, 1);
        assert_eq!(report.outlier_count, 1);
        assert_eq!(report.points[1].ctr, None);
        assert!(report.points[2].outlier);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut batch = ExportBatch::new();
        stage_report(&mut batch, &path, &report).unwrap();
        batch.commit().unwrap();
        let back: RunReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, report);
    }
}
