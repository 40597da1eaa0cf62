use chrono::{DateTime, NaiveDate, SubsecRound, Utc};

use crate::error::{TrackerError, TrackerResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(value: &str) -> TrackerResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|err| TrackerError::parse("date", value, err))
}

/// RFC3339 timestamp in any offset, normalised to UTC whole seconds.
pub fn parse_timestamp(value: &str, field: &'static str) -> TrackerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
        .map_err(|err| TrackerError::parse(field, value, err))
}

/// Empty input means "no timestamp".
pub fn parse_optional_timestamp(
    value: &str,
    field: &'static str,
) -> TrackerResult<Option<DateTime<Utc>>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_timestamp(value, field).map(Some)
}
