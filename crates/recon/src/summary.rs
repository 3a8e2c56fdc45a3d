use serde::Serialize;

use crate::aggregate::AggregationStats;
use crate::merge::MergeStats;
use crate::model::SoldListingRecord;

/// Countable outcomes of one run, so callers can alarm on unusual rates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub transactions: usize,
    pub orders: usize,
    pub unknown_order_transactions: usize,
    pub ignored_transactions: usize,
    pub ignored_fees: usize,
    pub first_wins_dropped: usize,
    pub unparsable_shipping: usize,
    pub listings: usize,
    pub unknown_time_to_sell: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub missing_transaction_id: usize,
    pub ambiguous_line_items: usize,
    pub manual_restored: usize,
    pub rejected_records: usize,
}

impl RunSummary {
    /// Share of listings that found no aggregate, 0.0 for an empty run.
    pub fn unmatched_ratio(&self) -> f64 {
        if self.listings == 0 {
            0.0
        } else {
            self.unmatched as f64 / self.listings as f64
        }
    }
}

pub fn compute_summary(
    aggregation: &AggregationStats,
    orders: usize,
    merge: &MergeStats,
    listings: &[SoldListingRecord],
    manual_restored: usize,
    rejected_records: usize,
) -> RunSummary {
    RunSummary {
        transactions: aggregation.transactions,
        orders,
        unknown_order_transactions: aggregation.unknown_order,
        ignored_transactions: aggregation.ignored_transactions,
        ignored_fees: aggregation.ignored_fees,
        first_wins_dropped: aggregation.first_wins_dropped,
        unparsable_shipping: aggregation.unparsable_shipping,
        listings: listings.len(),
        unknown_time_to_sell: listings
            .iter()
            .filter(|l| l.time_to_sell_days.is_none())
            .count(),
        matched: merge.matched,
        unmatched: merge.unmatched,
        missing_transaction_id: merge.missing_transaction_id,
        ambiguous_line_items: merge.ambiguous_line_items,
        manual_restored,
        rejected_records,
    }
}
