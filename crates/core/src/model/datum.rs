use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named contextual attribute attached to a datum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One exportable data point derived from a single record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datum {
    pub metric_name: String,
    pub value: f64,
    pub dimensions: Vec<Dimension>,
    pub timestamp: DateTime<Utc>,
}
