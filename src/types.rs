use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Raw events
// ---------------------------------------------------------------------------

/// One ad impression from the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Impression hour, truncated to the hour.
    pub hour: NaiveDateTime,
    pub click: bool,
}

// ---------------------------------------------------------------------------
// Hourly series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyBucket {
    pub hour: NaiveDateTime,
    pub impressions: u64,
    pub clicks: u64,
}

impl HourlyBucket {
    pub fn empty(hour: NaiveDateTime) -> Self {
        Self {
            hour,
            impressions: 0,
            clicks: 0,
        }
    }

    /// Click-through rate. `None` for an hour without impressions.
    pub fn ctr(&self) -> Option<f64> {
        if self.impressions == 0 {
            None
        } else {
            Some(self.clicks as f64 / self.impressions as f64)
        }
    }
}

/// Contiguous hourly buckets: `buckets[i]` covers `start + i hours`.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlySeries {
    pub start: NaiveDateTime,
    pub buckets: Vec<HourlyBucket>,
}

impl HourlySeries {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn hour_at(&self, offset: usize) -> NaiveDateTime {
        self.start + Duration::hours(offset as i64)
    }

    pub fn ctr(&self) -> Vec<Option<f64>> {
        self.buckets.iter().map(HourlyBucket::ctr).collect()
    }

    /// Number of hours with no impressions.
    pub fn gap_count(&self) -> usize {
        self.buckets.iter().filter(|b| b.impressions == 0).count()
    }
}

// ---------------------------------------------------------------------------
// Smoothing
// ---------------------------------------------------------------------------

/// Trailing simple moving average aligned with the hourly index.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedSeries {
    pub window: usize,
    pub values: Vec<Option<f64>>,
}

/// SAD score for one candidate window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowScore {
    pub window: usize,
    /// `None` when the window is longer than every run of defined CTR values.
    pub sad: Option<f64>,
    pub defined_points: usize,
}

/// How the smoothing window was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowChoice {
    /// Flattening point of the SAD curve.
    Elbow,
    /// Fixed by configuration.
    Configured,
}

impl std::fmt::Display for WindowChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowChoice::Elbow => write!(f, "elbow"),
            WindowChoice::Configured => write!(f, "configured"),
        }
    }
}

// ---------------------------------------------------------------------------
// Outliers
// ---------------------------------------------------------------------------

/// Dispersion measure the outlier threshold is scaled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dispersion {
    /// Sample standard deviation (n - 1).
    #[serde(rename = "stddev")]
    StdDev,
    /// Median absolute deviation scaled to be consistent with sigma.
    Mad,
}

impl std::fmt::Display for Dispersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Dispersion::StdDev => "stddev",
            Dispersion::Mad => "mad",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Dispersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stddev" | "std" => Ok(Dispersion::StdDev),
            "mad" => Ok(Dispersion::Mad),
            other => Err(format!("unknown dispersion '{other}' (expected stddev|mad)")),
        }
    }
}

/// Complementary sparse series produced by the outlier detector.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlierSplit {
    pub dispersion: f64,
    pub threshold: f64,
    /// `ctr(t)` where flagged, `None` elsewhere.
    pub outliers: Vec<Option<f64>>,
    /// `ctr(t)` where not flagged, `None` elsewhere.
    pub no_outliers: Vec<Option<f64>>,
}

impl OutlierSplit {
    pub fn outlier_count(&self) -> usize {
        self.outliers.iter().filter(|v| v.is_some()).count()
    }

    pub fn is_outlier(&self, offset: usize) -> bool {
        self.outliers.get(offset).is_some_and(Option::is_some)
    }
}

// ---------------------------------------------------------------------------
// Loader / exporter policies
// ---------------------------------------------------------------------------

/// What to do with a row whose `click` field is not boolean-coercible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickPolicy {
    Skip,
    Reject,
}

impl std::fmt::Display for ClickPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClickPolicy::Skip => write!(f, "skip"),
            ClickPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for ClickPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ClickPolicy::Skip),
            "reject" => Ok(ClickPolicy::Reject),
            other => Err(format!("unknown click policy '{other}' (expected skip|reject)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    Append,
    Truncate,
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Append => write!(f, "append"),
            OutputMode::Truncate => write!(f, "truncate"),
        }
    }
}

impl std::str::FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(OutputMode::Append),
            "truncate" => Ok(OutputMode::Truncate),
            other => Err(format!("unknown output mode '{other}' (expected append|truncate)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2014, 10, 21)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn empty_bucket_has_no_ctr() {
        assert_eq!(HourlyBucket::empty(hour(0)).ctr(), None);
    }

    #[test]
    fn bucket_ctr_is_click_ratio() {
        let b = HourlyBucket {
            hour: hour(3),
            impressions: 200,
            clicks: 50,
        };
        assert_eq!(b.ctr(), Some(0.25));
    }

    #[test]
    fn hour_at_offsets_from_start() {
        let series = HourlySeries {
            start: hour(22),
            buckets: vec![],
        };
        assert_eq!(series.hour_at(3), hour(1) + Duration::days(1));
    }

    #[test]
    fn policies_parse_case_insensitively() {
        assert_eq!("STDDEV".parse::<Dispersion>(), Ok(Dispersion::StdDev));
        assert_eq!(" mad ".parse::<Dispersion>(), Ok(Dispersion::Mad));
        assert_eq!("Reject".parse::<ClickPolicy>(), Ok(ClickPolicy::Reject));
        assert_eq!("truncate".parse::<OutputMode>(), Ok(OutputMode::Truncate));
        assert!("median".parse::<Dispersion>().is_err());
    }
}
