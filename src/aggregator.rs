use chrono::{NaiveDateTime, Timelike};
use tracing::info;

use crate::error::{AppError, Result};
use crate::types::{Event, HourlyBucket, HourlySeries};

/// Resamples events into one bucket per hour between the first and last
/// observed hour. Input order does not matter.
pub fn aggregate(events: &[Event]) -> Result<HourlySeries> {
    let (Some(first), Some(last)) = (
        events.iter().map(|e| truncate_to_hour(e.hour)).min(),
        events.iter().map(|e| truncate_to_hour(e.hour)).max(),
    ) else {
        return Err(AppError::EmptyDataset("no events to aggregate".to_string()));
    };

    let span = (last - first).num_hours() as usize + 1;
    let mut series = HourlySeries {
        start: first,
        buckets: Vec::with_capacity(span),
    };
    for offset in 0..span {
        let hour = series.hour_at(offset);
        series.buckets.push(HourlyBucket::empty(hour));
    }

    for event in events {
        let offset = (truncate_to_hour(event.hour) - first).num_hours() as usize;
        let bucket = &mut series.buckets[offset];
        bucket.impressions += 1;
        bucket.clicks += u64::from(event.click);
    }

    info!(
        hours = series.len(),
        empty_hours = series.gap_count(),
        "[AGG] {} hourly buckets from {} to {} ({} without impressions)",
        series.len(),
        first,
        last,
        series.gap_count(),
    );
    Ok(series)
}

fn truncate_to_hour(t: NaiveDateTime) -> NaiveDateTime {
    t.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}
