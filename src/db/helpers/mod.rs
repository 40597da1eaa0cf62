use chrono::{DateTime, Local, NaiveDate, NaiveTime, SecondsFormat, SubsecRound, TimeZone, Utc};

use crate::error::{TrackerError, TrackerResult};

/// Stored form of a timestamp. Fixed width UTC so lexical order matches time order.
pub fn to_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Drop sub-second precision so a value compares equal to what `to_timestamp` stores.
pub fn whole_seconds(value: DateTime<Utc>) -> DateTime<Utc> {
    value.trunc_subsecs(0)
}

pub fn parse_datetime(value: &str, field: &str) -> TrackerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| TrackerError::storage(format!("failed to parse {field} '{value}': {err}")))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> TrackerResult<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

/// Whole seconds between two instants; the only way `duration_seconds` is produced.
pub fn duration_seconds(start: &DateTime<Utc>, end: &DateTime<Utc>) -> i64 {
    (*end - *start).num_seconds()
}

fn local_midnight(date: NaiveDate) -> TrackerResult<DateTime<Utc>> {
    Local
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| TrackerError::Validation(format!("{date} has no local midnight")))
}

/// Half-open `[start, end)` covering `date` in local time, expressed in UTC.
pub fn day_window(date: NaiveDate) -> TrackerResult<(DateTime<Utc>, DateTime<Utc>)> {
    let next = date
        .succ_opt()
        .ok_or_else(|| TrackerError::Validation(format!("{date} is out of range")))?;
    Ok((local_midnight(date)?, local_midnight(next)?))
}
