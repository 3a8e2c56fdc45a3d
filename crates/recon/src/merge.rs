use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{FinancialFields, OrderAggregate, SoldListingRecord};
use crate::money::{format_cents, sum_parsable};

/// Inverse index line_item_id → order_id, rebuilt from each run's aggregates.
#[derive(Debug, Default)]
pub struct LineItemIndex {
    by_line_item: HashMap<String, String>,
    /// Line items claimed by more than one order.
    pub ambiguous: usize,
}

impl LineItemIndex {
    /// Orders are visited in key order. On conflict the first real order keeps
    /// the line item; the sentinel bucket only wins when nothing else claims it.
    pub fn build(orders: &BTreeMap<String, OrderAggregate>, unknown_order_key: &str) -> Self {
        let mut index = Self::default();
        for (order_id, agg) in orders {
            for line_item_id in &agg.line_item_ids {
                match index.by_line_item.get(line_item_id) {
                    None => {
                        index
                            .by_line_item
                            .insert(line_item_id.clone(), order_id.clone());
                    }
                    Some(existing) => {
                        index.ambiguous += 1;
                        warn!(
                            line_item_id = %line_item_id,
                            kept = %existing,
                            also = %order_id,
                            "line item claimed by more than one order"
                        );
                        if existing == unknown_order_key {
                            index
                                .by_line_item
                                .insert(line_item_id.clone(), order_id.clone());
                        }
                    }
                }
            }
        }
        index
    }

    pub fn order_for(&self, line_item_id: &str) -> Option<&str> {
        self.by_line_item.get(line_item_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_line_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_line_item.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub matched: usize,
    pub unmatched: usize,
    /// Listings skipped from matching because they carry no transaction id.
    pub missing_transaction_id: usize,
    pub ambiguous_line_items: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub listings: Vec<SoldListingRecord>,
    pub stats: MergeStats,
}

/// Backfill fee / shipping / refund fields onto sold listings.
///
/// Every record's financial fields are reset before matching, so the result
/// depends only on the two inputs. Manual fields pass through untouched.
pub fn merge_listings(
    orders: &BTreeMap<String, OrderAggregate>,
    listings: &[SoldListingRecord],
    unknown_order_key: &str,
    separator: &str,
) -> MergeOutput {
    let index = LineItemIndex::build(orders, unknown_order_key);
    let mut stats = MergeStats {
        ambiguous_line_items: index.ambiguous,
        ..MergeStats::default()
    };

    let listings = listings
        .iter()
        .map(|listing| {
            let mut record = listing.clone();
            record.financial = FinancialFields::default();

            if record.transaction_id.is_empty() {
                stats.missing_transaction_id += 1;
                stats.unmatched += 1;
                debug!(order_id = %record.order_id, "listing without transaction id; not matched");
                return record;
            }

            let agg = index
                .order_for(&record.transaction_id)
                .and_then(|order_id| orders.get(order_id));

            match agg {
                Some(agg) => {
                    stats.matched += 1;
                    record.financial = financial_fields(agg, separator);
                }
                None => {
                    stats.unmatched += 1;
                    debug!(
                        order_id = %record.order_id,
                        transaction_id = %record.transaction_id,
                        "no aggregate for listing"
                    );
                }
            }
            record
        })
        .collect();

    if stats.unmatched > 0 {
        warn!(
            unmatched = stats.unmatched,
            missing_transaction_id = stats.missing_transaction_id,
            "sold listings left without financial data"
        );
    }
    info!(
        matched = stats.matched,
        unmatched = stats.unmatched,
        line_items = index.len(),
        "merged aggregates onto sold listings"
    );

    MergeOutput { listings, stats }
}

/// Financial fields copied from one aggregate.
pub fn financial_fields(agg: &OrderAggregate, separator: &str) -> FinancialFields {
    FinancialFields {
        final_fee: agg.sale_final_fee.render(separator),
        fixed_final_fee: agg.sale_fixed_fee.render(separator),
        international_fee: agg.sale_international_fee.render(separator),
        cost_to_ship: format_cents(agg.shipping_label.total_cents),
        refund_owed: agg.refund_amounts.render(separator),
        refund_to_seller: refund_to_seller(agg),
    }
}

/// Refund final fee + refund fixed fee. Empty when neither side has a number
/// or when the sum does not fit.
pub fn refund_to_seller(agg: &OrderAggregate) -> String {
    let final_fee = sum_parsable(agg.refund_final_fee.iter());
    let fixed_fee = sum_parsable(agg.refund_fixed_fee.iter());
    match (final_fee, fixed_fee) {
        (None, None) => String::new(),
        (a, b) => match a.unwrap_or(0).checked_add(b.unwrap_or(0)) {
            Some(total) => format_cents(total),
            None => {
                warn!(order_id = %agg.order_id, "refund fees overflow; refund to seller left empty");
                String::new()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValues, ManualFields, ShippingTotal};

    fn aggregate(order_id: &str, line_items: &[&str]) -> OrderAggregate {
        let mut agg = OrderAggregate::new(order_id);
        agg.line_item_ids = line_items.iter().map(|s| s.to_string()).collect();
        agg
    }

    fn listing(transaction_id: &str) -> SoldListingRecord {
        SoldListingRecord {
            order_id: transaction_id.into(),
            transaction_id: transaction_id.into(),
            item_id: "1001".into(),
            title: "Lamp".into(),
            time_to_sell_days: Some(4),
            ..SoldListingRecord::default()
        }
    }

    fn orders(aggs: Vec<OrderAggregate>) -> BTreeMap<String, OrderAggregate> {
        aggs.into_iter().map(|a| (a.order_id.clone(), a)).collect()
    }

    #[test]
    fn matched_listing_gets_sale_side_fields() {
        let mut agg = aggregate("O1", &["L1"]);
        agg.sale_final_fee = FieldValues(vec!["2.00".into()]);
        agg.sale_fixed_fee = FieldValues(vec!["0.30".into()]);
        agg.shipping_label = ShippingTotal {
            total_cents: 650,
            label_count: 2,
            unparsable: 0,
        };
        let out = merge_listings(&orders(vec![agg]), &[listing("L1")], "unknown", "; ");

        let f = &out.listings[0].financial;
        assert_eq!(f.final_fee, "2.00");
        assert_eq!(f.fixed_final_fee, "0.30");
        assert_eq!(f.international_fee, "");
        assert_eq!(f.cost_to_ship, "6.50");
        assert_eq!(f.refund_owed, "");
        assert_eq!(f.refund_to_seller, "");
        assert_eq!(out.stats.matched, 1);
    }

    #[test]
    fn unmatched_listing_is_reset_and_still_emitted() {
        let stale = SoldListingRecord {
            financial: FinancialFields {
                final_fee: "9.99".into(),
                cost_to_ship: "1.00".into(),
                ..FinancialFields::default()
            },
            ..listing("L404")
        };
        let out = merge_listings(&orders(vec![aggregate("O1", &["L1"])]), &[stale.clone()], "unknown", "; ");

        let rec = &out.listings[0];
        assert!(rec.financial.is_empty());
        assert_eq!(rec.title, stale.title);
        assert_eq!(rec.time_to_sell_days, stale.time_to_sell_days);
        assert_eq!(out.stats.unmatched, 1);
    }

    #[test]
    fn manual_fields_are_never_touched() {
        let mut agg = aggregate("O1", &["L1"]);
        agg.sale_final_fee = FieldValues(vec!["2.00".into()]);
        let mut rec = listing("L1");
        rec.manual = ManualFields {
            item_cost: "4.00".into(),
            roi: "250%".into(),
            ..ManualFields::default()
        };
        let out = merge_listings(&orders(vec![agg]), &[rec.clone()], "unknown", "; ");
        assert_eq!(out.listings[0].manual, rec.manual);
    }

    #[test]
    fn missing_transaction_id_skips_matching() {
        let agg = aggregate("O1", &["L1"]);
        let out = merge_listings(&orders(vec![agg]), &[listing("")], "unknown", "; ");
        assert_eq!(out.stats.missing_transaction_id, 1);
        assert_eq!(out.stats.unmatched, 1);
        assert!(out.listings[0].financial.is_empty());
    }

    #[test]
    fn merge_is_idempotent() {
        let mut agg = aggregate("O1", &["L1", "L2"]);
        agg.sale_final_fee = FieldValues(vec!["1.00".into(), "2.00".into()]);
        agg.refund_amounts = FieldValues(vec!["-5.00".into()]);
        agg.refund_final_fee = FieldValues(vec!["-1.00".into()]);
        let orders = orders(vec![agg]);
        let input = vec![listing("L1"), listing("L2"), listing("L3")];

        let first = merge_listings(&orders, &input, "unknown", "; ");
        let second = merge_listings(&orders, &first.listings, "unknown", "; ");
        assert_eq!(first.listings, second.listings);
        assert_eq!(first.listings[0].financial.final_fee, "1.00; 2.00");
    }

    #[test]
    fn refund_to_seller_overflow_is_unknown() {
        let mut agg = OrderAggregate::new("O1");
        agg.refund_final_fee = FieldValues(vec!["92233720368547758.07".into()]);
        agg.refund_fixed_fee = FieldValues(vec!["0.30".into()]);
        assert_eq!(refund_to_seller(&agg), "");
    }

    #[test]
    fn refund_to_seller_distinguishes_zero_from_unknown() {
        let mut agg = OrderAggregate::new("O1");
        assert_eq!(refund_to_seller(&agg), "");

        agg.refund_final_fee = FieldValues(vec!["n/a".into()]);
        assert_eq!(refund_to_seller(&agg), "");

        agg.refund_fixed_fee = FieldValues(vec!["0.00".into()]);
        assert_eq!(refund_to_seller(&agg), "0.00");

        agg.refund_final_fee = FieldValues(vec!["1.20".into()]);
        agg.refund_fixed_fee = FieldValues(vec!["0.30".into()]);
        assert_eq!(refund_to_seller(&agg), "1.50");

        agg.refund_fixed_fee = FieldValues::default();
        assert_eq!(refund_to_seller(&agg), "1.20");
    }

    #[test]
    fn index_prefers_real_order_over_sentinel() {
        let orders = orders(vec![
            aggregate("O1", &["L1"]),
            aggregate("O2", &["L1", "L2"]),
            aggregate("unknown", &["L2", "L3"]),
        ]);
        let index = LineItemIndex::build(&orders, "unknown");
        assert_eq!(index.order_for("L1"), Some("O1"));
        assert_eq!(index.order_for("L2"), Some("O2"));
        assert_eq!(index.order_for("L3"), Some("unknown"));
        assert_eq!(index.ambiguous, 2);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn sentinel_first_in_key_order_yields_to_real_order() {
        let orders = orders(vec![
            aggregate("AAA-unknown", &["L9"]),
            aggregate("ZZZ", &["L9"]),
        ]);
        let index = LineItemIndex::build(&orders, "AAA-unknown");
        assert_eq!(index.order_for("L9"), Some("ZZZ"));
    }
}
