use chrono::{DateTime, TimeZone, Utc};
use tally_core::model::MetricRecord;

pub fn base_ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// `cpu` with three tags, one numeric field and one text field.
pub fn cpu_record() -> MetricRecord {
    MetricRecord::new("cpu", base_ts())
        .unwrap()
        .with_tag("host", "a")
        .with_tag("region", "us")
        .with_tag("zone", "1")
        .with_field("usage", 42.0)
        .with_field("idle", "high")
}

/// `records` records named `series{i}`, each with `fields` float fields
/// named `f00`, `f01`, ...
pub fn numbered_records(records: usize, fields: usize) -> Vec<MetricRecord> {
    (0..records)
        .map(|i| {
            let mut record = MetricRecord::new(format!("series{i}"), base_ts())
                .unwrap()
                .with_tag("host", format!("srv{i}"));
            for j in 0..fields {
                record = record.with_field(format!("f{j:02}"), (i * fields + j) as f64);
            }
            record
        })
        .collect()
}
