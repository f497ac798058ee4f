use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::config::HOUR_FORMAT;
use crate::error::{AppError, Result};
use crate::types::{ClickPolicy, Event};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Skipped rows beyond this many are only counted, not logged one by one.
const SKIP_LOG_LIMIT: u64 = 5;

/// Events read from the log plus row accounting.
#[derive(Debug, Clone, Default)]
pub struct LoadedEvents {
    pub events: Vec<Event>,
    pub rows_read: u64,
    pub rows_skipped: u64,
}

/// Reads the `hour` and `click` columns of an impression log.
pub struct EventLoader {
    click_policy: ClickPolicy,
}

impl EventLoader {
    pub fn new(click_policy: ClickPolicy) -> Self {
        Self { click_policy }
    }

    /// Opens `path`, transparently decompressing gzip input.
    pub fn load(&self, path: &Path) -> Result<LoadedEvents> {
        let file = File::open(path).map_err(|source| AppError::InputNotFound {
            path: path.display().to_string(),
            source,
        })?;
        let mut reader = BufReader::new(file);
        let gzipped = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        debug!(path = %path.display(), gzipped, "[LOAD] opening event log");

        let loaded = if gzipped {
            self.read(flate2::bufread::MultiGzDecoder::new(reader))?
        } else {
            self.read(reader)?
        };

        info!(
            rows_read = loaded.rows_read,
            rows_skipped = loaded.rows_skipped,
            events = loaded.events.len(),
            "[LOAD] {} events from {} ({} rows skipped)",
            loaded.events.len(),
            path.display(),
            loaded.rows_skipped,
        );
        Ok(loaded)
    }

    /// Parses delimited text with a header row naming `hour` and `click`.
    pub fn read<R: Read>(&self, source: R) -> Result<LoadedEvents> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = rdr.headers()?.clone();
        let hour_idx = column_index(&headers, "hour")?;
        let click_idx = column_index(&headers, "click")?;

        let mut loaded = LoadedEvents::default();
        let mut record = csv::StringRecord::new();

        while rdr.read_record(&mut record)? {
            loaded.rows_read += 1;
            let line = record
                .position()
                .map_or(loaded.rows_read + 1, |p| p.line());

            let raw_hour = record.get(hour_idx).unwrap_or_default();
            let hour = parse_hour(raw_hour)
                .map_err(|reason| AppError::MalformedInput { line, reason })?;

            let raw_click = record.get(click_idx).unwrap_or_default();
            match parse_click(raw_click) {
                Some(click) => loaded.events.push(Event { hour, click }),
                None => {
                    let reason = format!("click {raw_click:?} is not 0/1/true/false");
                    if self.click_policy == ClickPolicy::Reject {
                        return Err(AppError::MalformedInput { line, reason });
                    }
                    loaded.rows_skipped += 1;
                    if loaded.rows_skipped <= SKIP_LOG_LIMIT {
                        warn!(line, "[LOAD] skipping row: {reason}");
                    }
                }
            }
        }

        if loaded.rows_skipped > SKIP_LOG_LIMIT {
            warn!(
                "[LOAD] {} rows skipped for a malformed click field in total",
                loaded.rows_skipped
            );
        }
        Ok(loaded)
    }
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| AppError::MalformedInput {
            line: 1,
            reason: format!("missing required column '{name}'"),
        })
}

/// Parses a `YYMMDDHH` hour stamp. Two-digit years 69-99 map to the 1900s,
/// 00-68 to the 2000s.
pub fn parse_hour(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    let bad = || format!("hour {raw:?} is not a valid {HOUR_FORMAT} value");

    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let field = |i: usize| -> u32 {
        raw.as_bytes()[i..i + 2]
            .iter()
            .fold(0, |acc, b| acc * 10 + u32::from(b - b'0'))
    };
    let yy = field(0) as i32;
    let year = if yy >= 69 { 1900 + yy } else { 2000 + yy };

    NaiveDate::from_ymd_opt(year, field(2), field(4))
        .and_then(|d| d.and_hms_opt(field(6), 0, 0))
        .ok_or_else(bad)
}

/// Accepts 0/1, true/false (any case) and numeric spellings of 0 and 1.
pub fn parse_click(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "0" | "false" => Some(false),
        "1" | "true" => Some(true),
        other => match other.parse::<f64>() {
            Ok(v) if v == 0.0 => Some(false),
            Ok(v) if v == 1.0 => Some(true),
            _ => None,
        },
    }
}
