//! The timestamp-marker attribute protocol.
//!
//! Every mutation this process sends to the backing store also writes a
//! reserved attribute, `last_changed::<server_id>`, holding the mutation's
//! timestamp. A later read finds the marker in the same response as the
//! data, which tells it exactly how stale that response is relative to this
//! process's own writes: the *baseline* the journal replay is filtered
//! against.
//!
//! Markers are namespaced by `server_id`, so two processes never overwrite
//! each other's baselines. That is also why a shared `server_id` between two
//! live processes is forbidden.

use sdb_item_types::{
    Attributes,
    PutSpec,
    Timestamp,
};

pub const MARKER_PREFIX: &str = "last_changed::";

/// This process's marker attribute name.
pub fn marker_attribute(server_id: &str) -> String {
    format!("{MARKER_PREFIX}{server_id}")
}

/// Whether `name` is in the reserved marker namespace (any process's).
pub fn is_marker_attribute(name: &str) -> bool {
    name.starts_with(MARKER_PREFIX)
}

/// The marker write bundled into every mutation: a single-value replace, so
/// an item carries exactly one baseline per process.
pub fn marker_put(timestamp: Timestamp) -> PutSpec {
    PutSpec::replace(timestamp.to_string())
}

/// Removes every marker attribute (ours and any other process's) from a
/// fetched item, and returns our baseline timestamp when present.
///
/// A marker can transiently hold two values if a retried mutation raced its
/// predecessor; the newest wins.
pub fn take_baseline(attributes: &mut Attributes, marker: &str) -> Option<Timestamp> {
    let mut baseline = None;
    let mut markers = Vec::new();
    for name in attributes.keys() {
        if is_marker_attribute(name) {
            markers.push(name.clone());
        }
    }
    for name in markers {
        let values = attributes.remove(&name).expect("key was just enumerated");
        if name == marker {
            baseline = values.iter().filter_map(|v| v.parse().ok()).max();
        }
    }
    baseline
}
