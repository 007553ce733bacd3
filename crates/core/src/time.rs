use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{Result, TallyError};

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| TallyError::Parse(format!("invalid duration {input}: {e}")))
}

pub fn to_unix_nanos(ts: DateTime<Utc>) -> Result<i64> {
    ts.timestamp_nanos_opt().ok_or_else(|| {
        TallyError::InvalidArgument(format!("timestamp out of nanosecond range: {ts}"))
    })
}

pub fn from_unix_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
