use std::path::Path;

use tracing::info;

use super::batch::ExportBatch;
use crate::config::{EXPORT_DELIMITER, EXPORT_TIME_FORMAT};
use crate::error::Result;
use crate::types::{HourlySeries, OutputMode};

/// Writes a sparse hourly series as `<timestamp>;<value>` rows, no header.
pub struct SeriesWriter {
    mode: OutputMode,
    export_gaps: bool,
}

impl SeriesWriter {
    pub fn new(mode: OutputMode, export_gaps: bool) -> Self {
        Self { mode, export_gaps }
    }

    /// Stages the rows for `path` in `batch`. Returns the number of rows
    /// carrying a value.
    pub fn stage(
        &self,
        batch: &mut ExportBatch,
        path: &Path,
        series: &HourlySeries,
        values: &[Option<f64>],
    ) -> Result<usize> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(EXPORT_DELIMITER)
            .has_headers(false)
            .from_writer(batch.open(path, self.mode)?);

        let mut written = 0;
        for (offset, value) in values.iter().enumerate() {
            let stamp = series.hour_at(offset).format(EXPORT_TIME_FORMAT).to_string();
            match value {
                Some(v) => {
                    wtr.write_record([stamp, format_value(*v)])?;
                    written += 1;
                }
                None if self.export_gaps => wtr.write_record([stamp, String::new()])?,
                None => {}
            }
        }
        wtr.flush()?;

        info!(
            rows = written,
            mode = %self.mode,
            "[EXPORT] {} rows staged for {}",
            written,
            path.display()
        );
        Ok(written)
    }
}

/// Shortest round-trip spelling that keeps a decimal point (`1.0`, `0.125`),
/// with a signed two-digit exponent for tiny values (`5e-06`).
fn format_value(v: f64) -> String {
    let s = format!("{v:?}");
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s,
    }
}
