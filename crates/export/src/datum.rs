use tally_core::model::{Datum, Dimension, MetricRecord};

use crate::coerce::coerce;
use crate::dimensions::select_dimensions;

/// Joins a record name and a field name into a metric name.
pub const NAME_SEPARATOR: &str = "_";

/// Builds one datum per numeric field of `record`, in ascending field order.
///
/// Fields that do not coerce to a number are skipped.
pub fn build_datums(record: &MetricRecord, max_dimensions: usize) -> Vec<Datum> {
    let mut dimensions: Option<Vec<Dimension>> = None;
    let mut out = Vec::with_capacity(record.fields().len());

    for (field, value) in record.fields() {
        let Some(value) = coerce(value) else {
            continue;
        };
        let dims = dimensions
            .get_or_insert_with(|| select_dimensions(record.tags(), max_dimensions))
            .clone();
        out.push(Datum {
            metric_name: format!("{}{NAME_SEPARATOR}{field}", record.name()),
            value,
            dimensions: dims,
            timestamp: record.timestamp(),
        });
    }
    out
}

/// Builds the datums of every record, preserving record order.
pub fn build_all_datums(records: &[MetricRecord], max_dimensions: usize) -> Vec<Datum> {
    records
        .iter()
        .flat_map(|r| build_datums(r, max_dimensions))
        .collect()
}
