use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::config::AggregationPolicy;
use crate::summary::RunSummary;

// ---------------------------------------------------------------------------
// Input: financial events
// ---------------------------------------------------------------------------

/// Financial event type. Compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TransactionType {
    Sale,
    Refund,
    ShippingLabel,
    Dispute,
    Credit,
    Other(String),
}

impl TransactionType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "SALE" => Self::Sale,
            "REFUND" => Self::Refund,
            "SHIPPING_LABEL" => Self::ShippingLabel,
            "DISPUTE" => Self::Dispute,
            "CREDIT" => Self::Credit,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sale => write!(f, "SALE"),
            Self::Refund => write!(f, "REFUND"),
            Self::ShippingLabel => write!(f, "SHIPPING_LABEL"),
            Self::Dispute => write!(f, "DISPUTE"),
            Self::Credit => write!(f, "CREDIT"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// Marketplace fee type. Exact match against the declared set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeeType {
    FinalValueFee,
    FinalValueFeeFixedPerOrder,
    InternationalFee,
    Other(String),
}

impl FeeType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "FINAL_VALUE_FEE" => Self::FinalValueFee,
            "FINAL_VALUE_FEE_FIXED_PER_ORDER" => Self::FinalValueFeeFixedPerOrder,
            "INTERNATIONAL_FEE" => Self::InternationalFee,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceFee {
    pub fee_type: FeeType,
    /// Verbatim provider value; may be empty or unparsable.
    pub amount: String,
}

/// One financial event, already decoded from the provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    /// `None` when absent, empty, or the `N/A` placeholder.
    pub order_id: Option<String>,
    /// Id of the first line item the event references.
    pub line_item_id: Option<String>,
    pub transaction_type: TransactionType,
    pub transaction_date: String,
    /// Verbatim provider value; may be empty or unparsable.
    pub amount: String,
    /// Fees attached to the event's first line item.
    pub fees: Vec<MarketplaceFee>,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Observed values for one aggregate field, in event order.
///
/// Under `FirstWins` at most one value is ever held.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldValues(pub Vec<String>);

impl FieldValues {
    /// Record a value under `policy`. Returns false if the value was dropped.
    pub fn record(&mut self, policy: AggregationPolicy, value: &str) -> bool {
        match policy {
            AggregationPolicy::AccumulateAll => {
                self.0.push(value.to_string());
                true
            }
            AggregationPolicy::FirstWins => {
                if self.0.is_empty() {
                    self.0.push(value.to_string());
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn render(&self, separator: &str) -> String {
        self.0.join(separator)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Running shipping-label total. Always sum-all, regardless of policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShippingTotal {
    pub total_cents: i64,
    pub label_count: usize,
    /// Non-empty amounts that failed to parse and contributed 0.
    pub unparsable: usize,
}

/// Events seen per type for one order (including ones dropped by first-wins).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub sale: usize,
    pub refund: usize,
    pub shipping_label: usize,
    pub dispute: usize,
    pub credit: usize,
    pub other: usize,
}

/// Consolidated financial summary for one order id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrderAggregate {
    pub order_id: String,
    pub line_item_ids: BTreeSet<String>,
    pub sale_amounts: FieldValues,
    pub sale_dates: FieldValues,
    pub sale_final_fee: FieldValues,
    pub sale_fixed_fee: FieldValues,
    pub sale_international_fee: FieldValues,
    pub shipping_label: ShippingTotal,
    pub refund_amounts: FieldValues,
    pub refund_final_fee: FieldValues,
    pub refund_fixed_fee: FieldValues,
    pub dispute_amounts: FieldValues,
    pub credit_amounts: FieldValues,
    pub events: EventCounts,
}

impl OrderAggregate {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            ..Self::default()
        }
    }

    /// Line item ids in sorted order, joined for output.
    pub fn render_line_items(&self, separator: &str) -> String {
        self.line_item_ids
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator)
    }
}

// ---------------------------------------------------------------------------
// Input: sold listings
// ---------------------------------------------------------------------------

/// One sale transaction of one listed item, as delivered by the listing feed.
///
/// Deserializes from both the sold-list CSV headers and snake_case JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawSoldListing {
    #[serde(rename = "Order ID", alias = "order_id")]
    pub order_id: String,
    #[serde(rename = "Transaction ID", alias = "transaction_id")]
    pub transaction_id: String,
    #[serde(rename = "Item ID", alias = "item_id")]
    pub item_id: String,
    #[serde(rename = "Title", alias = "title")]
    pub title: String,
    #[serde(rename = "Photo URL", alias = "photo_url")]
    pub photo_url: String,
    #[serde(rename = "List Date", alias = "list_date")]
    pub list_date: String,
    #[serde(rename = "Sold Date", alias = "sold_date")]
    pub sold_date: String,
    #[serde(rename = "SKU", alias = "sku")]
    pub sku: String,
    #[serde(rename = "Quantity Sold", alias = "quantity_sold")]
    pub quantity_sold: String,
    #[serde(rename = "Sold For Price", alias = "sold_for_price")]
    pub sold_for_price: String,
    #[serde(rename = "Shipping Paid", alias = "shipping_paid")]
    pub shipping_paid: String,
}

// ---------------------------------------------------------------------------
// Output: reconciled listings
// ---------------------------------------------------------------------------

/// Fields populated by the merge stage. Empty string = unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinancialFields {
    pub final_fee: String,
    pub fixed_final_fee: String,
    pub international_fee: String,
    pub cost_to_ship: String,
    pub refund_owed: String,
    pub refund_to_seller: String,
}

impl FinancialFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Human-maintained fields. No automated stage writes these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualFields {
    #[serde(rename = "Item Cost", alias = "item_cost")]
    pub item_cost: String,
    #[serde(rename = "Purchased At", alias = "purchased_at")]
    pub purchased_at: String,
    #[serde(rename = "Net Return", alias = "net_return")]
    pub net_return: String,
    #[serde(rename = "ROI", alias = "roi")]
    pub roi: String,
    #[serde(rename = "Net Profit Margin", alias = "net_profit_margin")]
    pub net_profit_margin: String,
    #[serde(rename = "Refund To Buyer", alias = "refund_to_buyer")]
    pub refund_to_buyer: String,
}

impl ManualFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Natural key of a sold listing record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListingKey {
    pub order_id: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SoldListingRecord {
    pub order_id: String,
    pub transaction_id: String,
    pub item_id: String,
    pub title: String,
    pub photo_url: String,
    pub list_date: String,
    pub sold_date: String,
    /// `None` when either timestamp is missing or malformed. Never conflated with 0.
    pub time_to_sell_days: Option<i64>,
    pub sku: String,
    pub quantity_sold: String,
    pub sold_for_price: String,
    pub shipping_paid: String,
    pub financial: FinancialFields,
    pub manual: ManualFields,
}

impl SoldListingRecord {
    pub fn key(&self) -> ListingKey {
        ListingKey {
            order_id: self.order_id.clone(),
            transaction_id: self.transaction_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Run input + output
// ---------------------------------------------------------------------------

/// Pre-loaded records for one run.
#[derive(Debug, Default)]
pub struct ReconInput {
    pub transactions: Vec<RawTransaction>,
    pub listings: Vec<RawSoldListing>,
    /// Previously stored manual fields, by natural key.
    pub manual: BTreeMap<ListingKey, ManualFields>,
    /// Records the decoders had to reject.
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub summary: RunSummary,
    pub orders: Vec<OrderAggregate>,
    pub listings: Vec<SoldListingRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub policy: AggregationPolicy,
    pub engine_version: String,
    pub run_at: String,
}
