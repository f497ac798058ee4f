use tracing::info;

use crate::aggregator::aggregate;
use crate::config::{Config, HISTOGRAM_BINS};
use crate::detector::{OutlierDetector, WindowSelector};
use crate::error::Result;
use crate::export::{stage_report, ExportBatch, RunReport, SeriesWriter};
use crate::loader::EventLoader;
use crate::stats::CtrHistogram;

/// Load → aggregate → select window → detect outliers → export.
/// Outputs are staged and moved into place together, so a failure at any
/// stage leaves every destination as it was.
pub fn run(cfg: &Config) -> Result<RunReport> {
    let loaded = EventLoader::new(cfg.click_policy).load(&cfg.input_path)?;
    let series = aggregate(&loaded.events)?;
    let ctr = series.ctr();

    let selection = WindowSelector::new(cfg.window_min, cfg.window_max, cfg.elbow_epsilon)
        .select(&ctr, cfg.chosen_window)?;
    let split = OutlierDetector::new(cfg.outlier_multiplier, cfg.dispersion)
        .detect(&ctr, &selection.smoothed)?;

    let histogram = CtrHistogram::from_series(&ctr)?;
    let distribution = histogram.summary(HISTOGRAM_BINS);
    info!(
        p50 = ?distribution.p50,
        p95 = ?distribution.p95,
        p99 = ?distribution.p99,
        "[STATS] CTR over {} hours with impressions",
        distribution.count,
    );

    let report = RunReport::build(cfg, &loaded, &series, &selection, &split, distribution);

    let writer = SeriesWriter::new(cfg.output_mode, cfg.export_gaps);
    let mut batch = ExportBatch::new();
    writer.stage(&mut batch, &cfg.outliers_path, &series, &split.outliers)?;
    writer.stage(&mut batch, &cfg.no_outliers_path, &series, &split.no_outliers)?;
    stage_report(&mut batch, &cfg.report_path, &report)?;
    batch.commit()?;

    Ok(report)
}
