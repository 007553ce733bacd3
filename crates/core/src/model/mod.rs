pub mod datum;
pub mod metric;

pub use datum::{Datum, Dimension};
pub use metric::{FieldValue, MetricRecord};
