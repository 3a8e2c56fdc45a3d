use tracing::info;

use crate::aggregate::aggregate_transactions;
use crate::config::ReconConfig;
use crate::listing::reconcile_listings;
use crate::manual::apply_manual_fields;
use crate::merge::merge_listings;
use crate::model::{ReconInput, ReconMeta, ReconResult};
use crate::summary::compute_summary;

/// Run one full reconciliation over pre-loaded records.
///
/// Aggregates are rebuilt from scratch and listing financial fields are
/// recomputed every call. A malformed record never aborts the run.
pub fn run(config: &ReconConfig, input: &ReconInput) -> ReconResult {
    let aggregation = aggregate_transactions(
        &input.transactions,
        config.policy,
        &config.unknown_order_key,
    );

    let mut listings = reconcile_listings(&input.listings);
    let manual_restored = apply_manual_fields(&mut listings, &input.manual);

    let merged = merge_listings(
        &aggregation.orders,
        &listings,
        &config.unknown_order_key,
        &config.list_separator,
    );

    let summary = compute_summary(
        &aggregation.stats,
        aggregation.orders.len(),
        &merged.stats,
        &merged.listings,
        manual_restored,
        input.rejected,
    );

    info!(
        config = %config.name,
        orders = summary.orders,
        listings = summary.listings,
        matched = summary.matched,
        unmatched = summary.unmatched,
        "reconciliation complete"
    );

    ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            policy: config.policy,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        orders: aggregation.orders.into_values().collect(),
        listings: merged.listings,
    }
}
