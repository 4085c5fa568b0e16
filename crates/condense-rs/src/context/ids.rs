//! Unique ids for summaries and truncation markers.
//!
//! Ids only need to be unique within one conversation log. A nanosecond
//! timestamp plus a process-wide counter covers that, including bursts of
//! calls within the same clock tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{ts:x}-{count:04x}")
}

/// Id for a new summary message (`condense_id`).
pub fn generate_condense_id() -> String {
    generate_id("cd")
}

/// Id for a new truncation marker (`truncation_id`).
pub fn generate_truncation_id() -> String {
    generate_id("tw")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = generate_condense_id();
        let b = generate_condense_id();
        assert_ne!(a, b);
        assert!(a.starts_with("cd-"));
    }

    #[test]
    fn prefixes_differ_by_kind() {
        assert!(generate_truncation_id().starts_with("tw-"));
    }
}
