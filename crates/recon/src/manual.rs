//! Carry human-maintained fields across runs.

use std::collections::BTreeMap;

use tracing::debug;

use crate::model::{ListingKey, ManualFields, SoldListingRecord};

/// Copy stored manual fields onto records by (order_id, transaction_id).
/// Returns how many records received stored values.
pub fn apply_manual_fields(
    records: &mut [SoldListingRecord],
    stored: &BTreeMap<ListingKey, ManualFields>,
) -> usize {
    let mut restored = 0;
    for record in records.iter_mut() {
        if let Some(manual) = stored.get(&record.key()) {
            record.manual = manual.clone();
            restored += 1;
        }
    }
    debug!(restored, stored = stored.len(), "applied stored manual fields");
    restored
}
