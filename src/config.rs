use std::path::PathBuf;

use crate::error::{AppError, Result};
use crate::types::{ClickPolicy, Dispersion, OutputMode};

pub const INPUT_PATH: &str = "./data/train.gz";
pub const OUTLIERS_PATH: &str = "./data/outliers.csv";
pub const NO_OUTLIERS_PATH: &str = "./data/no_outliers.csv";
pub const REPORT_PATH: &str = "./data/report.json";

/// Smallest and largest candidate SMA window (inclusive), in hours.
pub const WINDOW_MIN: usize = 2;
pub const WINDOW_MAX: usize = 11;

/// Upper bound for WINDOW_MAX and CHOSEN_WINDOW: four weeks of hours.
pub const WINDOW_LIMIT: usize = 24 * 28;

/// The SAD curve counts as flat once a step changes it by less than this
/// fraction of its total span.
pub const ELBOW_EPSILON: f64 = 0.05;

/// Outlier threshold = OUTLIER_MULTIPLIER × dispersion(CTR).
pub const OUTLIER_MULTIPLIER: f64 = 1.5;

/// Source encoding of the `hour` column.
pub const HOUR_FORMAT: &str = "%y%m%d%H";

/// Timestamp layout of the exported rows.
pub const EXPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const EXPORT_DELIMITER: u8 = b';';

/// Number of bins in the CTR histogram.
pub const HISTOGRAM_BINS: u64 = 10;

#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: PathBuf,
    pub outliers_path: PathBuf,
    pub no_outliers_path: PathBuf,
    pub report_path: PathBuf,
    pub log_level: String,
    /// Candidate window range, inclusive (WINDOW_MIN, WINDOW_MAX)
    pub window_min: usize,
    pub window_max: usize,
    /// Fixed smoothing window; skips the elbow heuristic when set (CHOSEN_WINDOW)
    pub chosen_window: Option<usize>,
    /// Flatness tolerance of the elbow heuristic (ELBOW_EPSILON)
    pub elbow_epsilon: f64,
    /// Threshold multiplier applied to the dispersion (OUTLIER_MULTIPLIER)
    pub outlier_multiplier: f64,
    /// stddev | mad (DISPERSION)
    pub dispersion: Dispersion,
    /// skip | reject rows with a bad click field (CLICK_POLICY)
    pub click_policy: ClickPolicy,
    /// append | truncate the delimited outputs (OUTPUT_MODE)
    pub output_mode: OutputMode,
    /// Also write empty-valued rows for hours outside each output (EXPORT_GAPS)
    pub export_gaps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from(INPUT_PATH),
            outliers_path: PathBuf::from(OUTLIERS_PATH),
            no_outliers_path: PathBuf::from(NO_OUTLIERS_PATH),
            report_path: PathBuf::from(REPORT_PATH),
            log_level: "info".to_string(),
            window_min: WINDOW_MIN,
            window_max: WINDOW_MAX,
            chosen_window: None,
            elbow_epsilon: ELBOW_EPSILON,
            outlier_multiplier: OUTLIER_MULTIPLIER,
            dispersion: Dispersion::StdDev,
            click_policy: ClickPolicy::Skip,
            output_mode: OutputMode::Append,
            export_gaps: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key → value source; unset keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let cfg = Self {
            input_path: lookup("INPUT_PATH").map_or(d.input_path, PathBuf::from),
            outliers_path: lookup("OUTLIERS_PATH").map_or(d.outliers_path, PathBuf::from),
            no_outliers_path: lookup("NO_OUTLIERS_PATH").map_or(d.no_outliers_path, PathBuf::from),
            report_path: lookup("REPORT_PATH").map_or(d.report_path, PathBuf::from),
            log_level: lookup("LOG_LEVEL").unwrap_or(d.log_level),
            window_min: parse_or(&lookup, "WINDOW_MIN", d.window_min)?,
            window_max: parse_or(&lookup, "WINDOW_MAX", d.window_max)?,
            chosen_window: match lookup("CHOSEN_WINDOW").filter(|v| !v.trim().is_empty()) {
                Some(v) => Some(parse_value("CHOSEN_WINDOW", &v)?),
                None => None,
            },
            elbow_epsilon: parse_or(&lookup, "ELBOW_EPSILON", d.elbow_epsilon)?,
            outlier_multiplier: parse_or(&lookup, "OUTLIER_MULTIPLIER", d.outlier_multiplier)?,
            dispersion: parse_or(&lookup, "DISPERSION", d.dispersion)?,
            click_policy: parse_or(&lookup, "CLICK_POLICY", d.click_policy)?,
            output_mode: parse_or(&lookup, "OUTPUT_MODE", d.output_mode)?,
            export_gaps: parse_or(&lookup, "EXPORT_GAPS", d.export_gaps)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_min < 1 {
            return Err(AppError::Config("WINDOW_MIN must be at least 1".to_string()));
        }
        if self.window_max < self.window_min {
            return Err(AppError::Config(format!(
                "WINDOW_MAX ({}) must not be below WINDOW_MIN ({})",
                self.window_max, self.window_min
            )));
        }
        if self.window_max > WINDOW_LIMIT {
            return Err(AppError::Config(format!(
                "WINDOW_MAX ({}) must not exceed {WINDOW_LIMIT} hours",
                self.window_max
            )));
        }
        match self.chosen_window {
            Some(0) => {
                return Err(AppError::Config("CHOSEN_WINDOW must be at least 1".to_string()));
            }
            Some(w) if w > WINDOW_LIMIT => {
                return Err(AppError::Config(format!(
                    "CHOSEN_WINDOW ({w}) must not exceed {WINDOW_LIMIT} hours"
                )));
            }
            _ => {}
        }
        if !(self.elbow_epsilon.is_finite() && self.elbow_epsilon > 0.0) {
            return Err(AppError::Config("ELBOW_EPSILON must be a positive number".to_string()));
        }
        if !(self.outlier_multiplier.is_finite() && self.outlier_multiplier >= 0.0) {
            return Err(AppError::Config(
                "OUTLIER_MULTIPLIER must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| AppError::Config(format!("{key}={raw:?}: {e}")))
}
