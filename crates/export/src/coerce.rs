use tally_core::model::FieldValue;

/// Converts a field value into the numeric form accepted by export backends.
///
/// Returns `None` for kinds with no numeric meaning (text, null) and for
/// NaN or infinite floats. Callers drop such fields without reporting them.
pub fn coerce(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Int(v) => Some(*v as f64),
        FieldValue::UInt(v) => Some(*v as f64),
        FieldValue::Float(v) if v.is_finite() => Some(*v),
        FieldValue::Float(_) => None,
        FieldValue::Bool(true) => Some(1.0),
        FieldValue::Bool(false) => Some(0.0),
        FieldValue::Timestamp(ts) => Some(ts.timestamp() as f64),
        FieldValue::Text(_) | FieldValue::Null => None,
    }
}
