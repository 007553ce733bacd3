use std::collections::BTreeMap;

use tally_core::model::Dimension;

/// Tag that always leads the dimension list when present.
pub const HOST_TAG: &str = "host";

/// Backend-imposed cap used when none is configured.
pub const DEFAULT_MAX_DIMENSIONS: usize = 10;

/// Picks at most `max` dimensions from `tags`.
///
/// `host` goes first, the rest follow in ascending name order, and whatever
/// does not fit is dropped.
pub fn select_dimensions(tags: &BTreeMap<String, String>, max: usize) -> Vec<Dimension> {
    let mut out = Vec::with_capacity(tags.len().min(max));
    if max == 0 {
        return out;
    }

    if let Some(host) = tags.get(HOST_TAG) {
        out.push(Dimension::new(HOST_TAG, host.clone()));
    }

    // BTreeMap iterates in ascending key order.
    out.extend(
        tags.iter()
            .filter(|(name, _)| name.as_str() != HOST_TAG)
            .take(max - out.len())
            .map(|(name, value)| Dimension::new(name.clone(), value.clone())),
    );
    out
}
