//! CSV exports for the persistence side.
//!
//! Column order is fixed and the header is always written, even with zero
//! rows. Rows come out in input order, so the same run result always
//! serializes to the same bytes.

use std::io::Write;

use serde::Serialize;

use crate::error::ReconError;
use crate::model::{OrderAggregate, SoldListingRecord};
use crate::money::format_cents;

/// Rendered in place of an unknown time-to-sell.
pub const UNKNOWN_DAYS: &str = "N/A";

pub const TRANSACTIONS_HEADER: [&str; 13] = [
    "Order ID",
    "Line Item IDs",
    "Sale Amount Value",
    "Sale Transaction Date",
    "Final Fee",
    "Fixed Final Fee",
    "International Fee",
    "Cost To Ship",
    "Refund Owed",
    "Refund Final Fee",
    "Refund Fixed Final Fee",
    "Dispute Amount Value",
    "Credit Amount Value",
];

pub const SOLD_LISTINGS_HEADER: [&str; 24] = [
    "Order ID",
    "Transaction ID",
    "Item ID",
    "Title",
    "Photo URL",
    "List Date",
    "Sold Date",
    "Time To Sell(days)",
    "Item Cost",
    "Purchased At",
    "SKU",
    "Quantity Sold",
    "Sold For Price",
    "Shipping Paid",
    "Fixed Final Fee",
    "Final Fee",
    "International Fee",
    "Cost To Ship",
    "Net Return",
    "ROI",
    "Net Profit Margin",
    "Refund To Buyer",
    "Refund Owed",
    "Refund To Seller",
];

#[derive(Debug, Serialize)]
struct TransactionsRow<'a> {
    order_id: &'a str,
    line_item_ids: String,
    sale_amounts: String,
    sale_dates: String,
    final_fee: String,
    fixed_final_fee: String,
    international_fee: String,
    cost_to_ship: String,
    refund_owed: String,
    refund_final_fee: String,
    refund_fixed_fee: String,
    dispute_amounts: String,
    credit_amounts: String,
}

impl<'a> TransactionsRow<'a> {
    fn new(agg: &'a OrderAggregate, separator: &str) -> Self {
        Self {
            order_id: &agg.order_id,
            line_item_ids: agg.render_line_items(separator),
            sale_amounts: agg.sale_amounts.render(separator),
            sale_dates: agg.sale_dates.render(separator),
            final_fee: agg.sale_final_fee.render(separator),
            fixed_final_fee: agg.sale_fixed_fee.render(separator),
            international_fee: agg.sale_international_fee.render(separator),
            cost_to_ship: format_cents(agg.shipping_label.total_cents),
            refund_owed: agg.refund_amounts.render(separator),
            refund_final_fee: agg.refund_final_fee.render(separator),
            refund_fixed_fee: agg.refund_fixed_fee.render(separator),
            dispute_amounts: agg.dispute_amounts.render(separator),
            credit_amounts: agg.credit_amounts.render(separator),
        }
    }
}

#[derive(Debug, Serialize)]
struct SoldListingRow<'a> {
    order_id: &'a str,
    transaction_id: &'a str,
    item_id: &'a str,
    title: &'a str,
    photo_url: &'a str,
    list_date: &'a str,
    sold_date: &'a str,
    time_to_sell_days: String,
    item_cost: &'a str,
    purchased_at: &'a str,
    sku: &'a str,
    quantity_sold: &'a str,
    sold_for_price: &'a str,
    shipping_paid: &'a str,
    fixed_final_fee: &'a str,
    final_fee: &'a str,
    international_fee: &'a str,
    cost_to_ship: &'a str,
    net_return: &'a str,
    roi: &'a str,
    net_profit_margin: &'a str,
    refund_to_buyer: &'a str,
    refund_owed: &'a str,
    refund_to_seller: &'a str,
}

impl<'a> From<&'a SoldListingRecord> for SoldListingRow<'a> {
    fn from(r: &'a SoldListingRecord) -> Self {
        Self {
            order_id: &r.order_id,
            transaction_id: &r.transaction_id,
            item_id: &r.item_id,
            title: &r.title,
            photo_url: &r.photo_url,
            list_date: &r.list_date,
            sold_date: &r.sold_date,
            time_to_sell_days: r
                .time_to_sell_days
                .map(|d| d.to_string())
                .unwrap_or_else(|| UNKNOWN_DAYS.to_string()),
            item_cost: &r.manual.item_cost,
            purchased_at: &r.manual.purchased_at,
            sku: &r.sku,
            quantity_sold: &r.quantity_sold,
            sold_for_price: &r.sold_for_price,
            shipping_paid: &r.shipping_paid,
            fixed_final_fee: &r.financial.fixed_final_fee,
            final_fee: &r.financial.final_fee,
            international_fee: &r.financial.international_fee,
            cost_to_ship: &r.financial.cost_to_ship,
            net_return: &r.manual.net_return,
            roi: &r.manual.roi,
            net_profit_margin: &r.manual.net_profit_margin,
            refund_to_buyer: &r.manual.refund_to_buyer,
            refund_owed: &r.financial.refund_owed,
            refund_to_seller: &r.financial.refund_to_seller,
        }
    }
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer)
}

fn export_err(e: impl std::fmt::Display) -> ReconError {
    ReconError::Export(format!("CSV write error: {e}"))
}

/// One row per order, in the given order.
pub fn write_transactions_csv<W: Write>(
    orders: &[OrderAggregate],
    separator: &str,
    writer: W,
) -> Result<(), ReconError> {
    let mut csv_writer = csv_writer(writer);
    csv_writer.write_record(TRANSACTIONS_HEADER).map_err(export_err)?;
    for agg in orders {
        csv_writer
            .serialize(TransactionsRow::new(agg, separator))
            .map_err(export_err)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn write_sold_listings_csv<W: Write>(
    listings: &[SoldListingRecord],
    writer: W,
) -> Result<(), ReconError> {
    let mut csv_writer = csv_writer(writer);
    csv_writer.write_record(SOLD_LISTINGS_HEADER).map_err(export_err)?;
    for listing in listings {
        csv_writer
            .serialize(SoldListingRow::from(listing))
            .map_err(export_err)?;
    }
    csv_writer.flush()?;
    Ok(())
}
