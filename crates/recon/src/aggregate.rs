use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::AggregationPolicy;
use crate::fees::route_fee;
use crate::model::{EventCounts, OrderAggregate, RawTransaction, TransactionType};
use crate::money::parse_cents;

/// Counters for conditions that lose or bend data during aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub transactions: usize,
    /// Transactions grouped under the sentinel order key.
    pub unknown_order: usize,
    /// Transactions of a type outside the handled set.
    pub ignored_transactions: usize,
    /// Fees with no route for their event type, or beyond the first under first-wins.
    pub ignored_fees: usize,
    /// Whole events dropped because an earlier event of the same type won.
    pub first_wins_dropped: usize,
    /// Non-empty shipping-label amounts that did not parse (counted as 0).
    pub unparsable_shipping: usize,
}

#[derive(Debug, Clone, Default)]
pub struct AggregationOutput {
    pub orders: BTreeMap<String, OrderAggregate>,
    pub stats: AggregationStats,
}

/// Group transactions by order id and fold each group into one aggregate.
///
/// Input order matters under `FirstWins`; the caller must hand over the
/// complete, order-stable fetch result. Every order that had at least one
/// transaction is present in the output, even if all its fields are empty.
pub fn aggregate_transactions(
    txns: &[RawTransaction],
    policy: AggregationPolicy,
    unknown_order_key: &str,
) -> AggregationOutput {
    let mut orders: BTreeMap<String, OrderAggregate> = BTreeMap::new();
    let mut stats = AggregationStats::default();

    for txn in txns {
        stats.transactions += 1;

        let order_id = match txn.order_id.as_deref() {
            Some(id) => id,
            None => {
                stats.unknown_order += 1;
                debug!(
                    transaction_type = %txn.transaction_type,
                    date = %txn.transaction_date,
                    "transaction without order id grouped under '{unknown_order_key}'"
                );
                unknown_order_key
            }
        };

        let agg = orders
            .entry(order_id.to_string())
            .or_insert_with(|| OrderAggregate::new(order_id));

        if let Some(line_item_id) = txn.line_item_id.as_deref().filter(|id| !id.is_empty()) {
            agg.line_item_ids.insert(line_item_id.to_string());
        }

        match &txn.transaction_type {
            TransactionType::ShippingLabel => {
                agg.events.shipping_label += 1;
                add_shipping_label(agg, &txn.amount, &mut stats);
            }
            TransactionType::Other(raw) => {
                agg.events.other += 1;
                stats.ignored_transactions += 1;
                debug!(order_id, transaction_type = %raw, "ignoring unhandled transaction type");
            }
            kind => {
                let prior = bump_event(&mut agg.events, kind);
                if policy == AggregationPolicy::FirstWins && prior > 0 {
                    stats.first_wins_dropped += 1;
                    debug!(
                        order_id,
                        transaction_type = %kind,
                        date = %txn.transaction_date,
                        "first-wins: dropping later event"
                    );
                    continue;
                }
                record_event(agg, txn, policy, &mut stats);
            }
        }
    }

    for agg in orders.values() {
        if agg.shipping_label.unparsable > 1 {
            warn!(
                order_id = %agg.order_id,
                unparsable = agg.shipping_label.unparsable,
                labels = agg.shipping_label.label_count,
                "multiple unparsable shipping-label amounts counted as 0"
            );
        }
    }

    if stats.unknown_order > 0 {
        warn!(
            count = stats.unknown_order,
            "transactions without order id grouped under '{unknown_order_key}'"
        );
    }
    if stats.first_wins_dropped > 0 {
        warn!(count = stats.first_wins_dropped, "first-wins policy dropped later events");
    }

    info!(
        transactions = stats.transactions,
        orders = orders.len(),
        %policy,
        "aggregated transactions"
    );

    AggregationOutput { orders, stats }
}

/// Increment the per-type counter; returns the count before the increment.
fn bump_event(events: &mut EventCounts, kind: &TransactionType) -> usize {
    let slot = match kind {
        TransactionType::Sale => &mut events.sale,
        TransactionType::Refund => &mut events.refund,
        TransactionType::ShippingLabel => &mut events.shipping_label,
        TransactionType::Dispute => &mut events.dispute,
        TransactionType::Credit => &mut events.credit,
        TransactionType::Other(_) => &mut events.other,
    };
    let prior = *slot;
    *slot += 1;
    prior
}

fn record_event(
    agg: &mut OrderAggregate,
    txn: &RawTransaction,
    policy: AggregationPolicy,
    stats: &mut AggregationStats,
) {
    match txn.transaction_type {
        TransactionType::Sale => {
            agg.sale_amounts.record(policy, &txn.amount);
            agg.sale_dates.record(policy, &txn.transaction_date);
        }
        TransactionType::Refund => {
            agg.refund_amounts.record(policy, &txn.amount);
        }
        TransactionType::Dispute => {
            agg.dispute_amounts.record(policy, &txn.amount);
        }
        TransactionType::Credit => {
            agg.credit_amounts.record(policy, &txn.amount);
        }
        TransactionType::ShippingLabel | TransactionType::Other(_) => return,
    }

    for fee in &txn.fees {
        let recorded = match route_fee(&txn.transaction_type, &fee.fee_type) {
            Some(slot) => slot.field_mut(agg).record(policy, &fee.amount),
            None => false,
        };
        if !recorded {
            stats.ignored_fees += 1;
            debug!(
                order_id = %agg.order_id,
                transaction_type = %txn.transaction_type,
                fee_type = ?fee.fee_type,
                "fee not recorded"
            );
        }
    }
}

fn add_shipping_label(agg: &mut OrderAggregate, amount: &str, stats: &mut AggregationStats) {
    agg.shipping_label.label_count += 1;
    if amount.trim().is_empty() {
        return;
    }
    let cents = match parse_cents(amount) {
        Ok(cents) => cents,
        Err(e) => {
            agg.shipping_label.unparsable += 1;
            stats.unparsable_shipping += 1;
            debug!(order_id = %agg.order_id, amount, error = %e, "unparsable shipping-label amount");
            return;
        }
    };
    match agg.shipping_label.total_cents.checked_add(cents) {
        Some(total) => agg.shipping_label.total_cents = total,
        None => {
            agg.shipping_label.unparsable += 1;
            stats.unparsable_shipping += 1;
            warn!(order_id = %agg.order_id, amount, "shipping-label amount overflows total; counted as 0");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FeeType, MarketplaceFee};

    fn txn(order: Option<&str>, kind: &str, line_item: Option<&str>, amount: &str) -> RawTransaction {
        RawTransaction {
            order_id: order.map(String::from),
            line_item_id: line_item.map(String::from),
            transaction_type: TransactionType::parse(kind),
            transaction_date: "2024-01-05T10:00:00.000Z".into(),
            amount: amount.into(),
            fees: Vec::new(),
        }
    }

    fn fee(kind: &str, amount: &str) -> MarketplaceFee {
        MarketplaceFee {
            fee_type: FeeType::parse(kind),
            amount: amount.into(),
        }
    }

    fn run(txns: &[RawTransaction], policy: AggregationPolicy) -> AggregationOutput {
        aggregate_transactions(txns, policy, "unknown")
    }

    #[test]
    fn sale_with_two_shipping_labels() {
        let mut sale = txn(Some("O1"), "SALE", Some("L1"), "20.00");
        sale.fees.push(fee("FINAL_VALUE_FEE", "2.00"));
        let txns = vec![
            sale,
            txn(Some("O1"), "SHIPPING_LABEL", None, "5.50"),
            txn(Some("O1"), "SHIPPING_LABEL", None, "1.00"),
        ];
        let out = run(&txns, AggregationPolicy::AccumulateAll);
        let agg = &out.orders["O1"];
        assert_eq!(agg.sale_final_fee.0, vec!["2.00"]);
        assert_eq!(agg.shipping_label.total_cents, 650);
        assert_eq!(agg.line_item_ids.iter().collect::<Vec<_>>(), vec!["L1"]);
    }

    #[test]
    fn line_item_ids_deduplicate() {
        let txns = vec![
            txn(Some("O1"), "SALE", Some("L1"), "10.00"),
            txn(Some("O1"), "REFUND", Some("L1"), "-10.00"),
            txn(Some("O1"), "SHIPPING_LABEL", Some("L1"), "3.00"),
            txn(Some("O1"), "SALE", Some("L2"), "4.00"),
            txn(Some("O1"), "CREDIT", Some(""), "1.00"),
        ];
        let out = run(&txns, AggregationPolicy::AccumulateAll);
        assert_eq!(out.orders["O1"].line_item_ids.len(), 2);
    }

    #[test]
    fn one_key_per_order_plus_sentinel() {
        let txns = vec![
            txn(Some("O1"), "SALE", None, "1.00"),
            txn(Some("O2"), "SALE", None, "1.00"),
            txn(Some("O2"), "REFUND", None, "-1.00"),
            txn(Some("O3"), "TRANSFER", None, "9.00"),
            txn(None, "SHIPPING_LABEL", None, "2.00"),
            txn(None, "SHIPPING_LABEL", None, "3.00"),
        ];
        let out = run(&txns, AggregationPolicy::AccumulateAll);
        let keys: Vec<_> = out.orders.keys().cloned().collect();
        assert_eq!(keys, vec!["O1", "O2", "O3", "unknown"]);
        assert_eq!(out.stats.unknown_order, 2);
        assert_eq!(out.orders["unknown"].shipping_label.total_cents, 500);
    }

    #[test]
    fn order_with_only_ignored_events_still_present() {
        let txns = vec![txn(Some("O9"), "NON_SALE_CHARGE", None, "4.00")];
        let out = run(&txns, AggregationPolicy::AccumulateAll);
        let agg = &out.orders["O9"];
        assert!(agg.sale_amounts.is_empty());
        assert_eq!(agg.events.other, 1);
        assert_eq!(out.stats.ignored_transactions, 1);
    }

    #[test]
    fn shipping_sum_treats_unparsable_as_zero() {
        let txns = vec![
            txn(Some("O1"), "SHIPPING_LABEL", None, "4.25"),
            txn(Some("O1"), "SHIPPING_LABEL", None, "abc"),
            txn(Some("O1"), "SHIPPING_LABEL", None, ""),
            txn(Some("O1"), "SHIPPING_LABEL", None, "-1.25"),
            txn(Some("O1"), "SHIPPING_LABEL", None, "1.2.3"),
        ];
        let out = run(&txns, AggregationPolicy::FirstWins);
        let ship = &out.orders["O1"].shipping_label;
        assert_eq!(ship.total_cents, 300);
        assert_eq!(ship.label_count, 5);
        assert_eq!(ship.unparsable, 2);
        assert_eq!(out.stats.unparsable_shipping, 2);
    }

    #[test]
    fn shipping_sum_rounds_extra_fraction_digits() {
        let txns = vec![
            txn(Some("O1"), "SHIPPING_LABEL", None, "5.505"),
            txn(Some("O1"), "SHIPPING_LABEL", None, "1.00"),
        ];
        let out = run(&txns, AggregationPolicy::AccumulateAll);
        let ship = &out.orders["O1"].shipping_label;
        assert_eq!(ship.total_cents, 651);
        assert_eq!(ship.unparsable, 0);
    }

    #[test]
    fn shipping_overflow_counts_as_unparsable() {
        let big = "92233720368547758.07";
        let txns = vec![
            txn(Some("O1"), "SHIPPING_LABEL", None, big),
            txn(Some("O1"), "SHIPPING_LABEL", None, big),
        ];
        let out = run(&txns, AggregationPolicy::AccumulateAll);
        let ship = &out.orders["O1"].shipping_label;
        assert_eq!(ship.total_cents, i64::MAX);
        assert_eq!(ship.label_count, 2);
        assert_eq!(ship.unparsable, 1);
        assert_eq!(out.stats.unparsable_shipping, 1);
    }

    #[test]
    fn transaction_type_is_case_insensitive() {
        let txns = vec![
            txn(Some("O1"), "sale", None, "12.00"),
            txn(Some("O1"), "Shipping_Label", None, "2.00"),
        ];
        let out = run(&txns, AggregationPolicy::AccumulateAll);
        assert_eq!(out.orders["O1"].sale_amounts.0, vec!["12.00"]);
        assert_eq!(out.orders["O1"].shipping_label.total_cents, 200);
    }

    #[test]
    fn accumulate_all_keeps_every_sale() {
        let mut first = txn(Some("O1"), "SALE", Some("L1"), "10.00");
        first.fees.push(fee("FINAL_VALUE_FEE", "1.00"));
        let mut second = txn(Some("O1"), "SALE", Some("L2"), "15.00");
        second.fees.push(fee("FINAL_VALUE_FEE", "1.50"));
        second.fees.push(fee("INTERNATIONAL_FEE", "0.25"));

        let out = run(&[first, second], AggregationPolicy::AccumulateAll);
        let agg = &out.orders["O1"];
        assert_eq!(agg.sale_amounts.0, vec!["10.00", "15.00"]);
        assert_eq!(agg.sale_dates.0.len(), 2);
        assert_eq!(agg.sale_final_fee.0, vec!["1.00", "1.50"]);
        assert_eq!(agg.sale_international_fee.0, vec!["0.25"]);
        assert_eq!(out.stats.first_wins_dropped, 0);
    }

    #[test]
    fn first_wins_drops_later_events_whole() {
        let mut first = txn(Some("O1"), "SALE", Some("L1"), "10.00");
        first.fees.push(fee("FINAL_VALUE_FEE", "1.00"));
        let mut second = txn(Some("O1"), "SALE", Some("L2"), "15.00");
        second.fees.push(fee("FINAL_VALUE_FEE", "1.50"));
        second.fees.push(fee("INTERNATIONAL_FEE", "0.25"));
        let refund_a = txn(Some("O1"), "REFUND", None, "-3.00");
        let refund_b = txn(Some("O1"), "REFUND", None, "-4.00");

        let out = run(&[first, second, refund_a, refund_b], AggregationPolicy::FirstWins);
        let agg = &out.orders["O1"];
        assert_eq!(agg.sale_amounts.0, vec!["10.00"]);
        assert_eq!(agg.sale_final_fee.0, vec!["1.00"]);
        assert!(agg.sale_international_fee.is_empty());
        assert_eq!(agg.refund_amounts.0, vec!["-3.00"]);
        assert_eq!(agg.events.sale, 2);
        assert_eq!(out.stats.first_wins_dropped, 2);
        // Line items from dropped events are still observed.
        assert!(agg.line_item_ids.contains("L2"));
    }

    #[test]
    fn first_wins_is_independent_per_type() {
        let txns = vec![
            txn(Some("O1"), "DISPUTE", None, "-8.00"),
            txn(Some("O1"), "CREDIT", None, "2.00"),
            txn(Some("O1"), "SALE", None, "8.00"),
            txn(Some("O1"), "CREDIT", None, "5.00"),
        ];
        let out = run(&txns, AggregationPolicy::FirstWins);
        let agg = &out.orders["O1"];
        assert_eq!(agg.dispute_amounts.0, vec!["-8.00"]);
        assert_eq!(agg.credit_amounts.0, vec!["2.00"]);
        assert_eq!(agg.sale_amounts.0, vec!["8.00"]);
        assert_eq!(out.stats.first_wins_dropped, 1);
    }

    #[test]
    fn refund_fees_route_to_refund_side() {
        let mut refund = txn(Some("O1"), "REFUND", Some("L1"), "-20.00");
        refund.fees.push(fee("FINAL_VALUE_FEE", "-2.00"));
        refund.fees.push(fee("FINAL_VALUE_FEE_FIXED_PER_ORDER", "-0.30"));
        refund.fees.push(fee("INTERNATIONAL_FEE", "-0.10"));
        refund.fees.push(fee("AD_FEE", "-1.00"));

        let out = run(&[refund], AggregationPolicy::AccumulateAll);
        let agg = &out.orders["O1"];
        assert_eq!(agg.refund_final_fee.0, vec!["-2.00"]);
        assert_eq!(agg.refund_fixed_fee.0, vec!["-0.30"]);
        assert!(agg.sale_final_fee.is_empty());
        assert_eq!(out.stats.ignored_fees, 2);
    }

    #[test]
    fn no_transactions_no_orders() {
        let out = run(&[], AggregationPolicy::AccumulateAll);
        assert!(out.orders.is_empty());
        assert_eq!(out.stats, AggregationStats::default());
    }
}
