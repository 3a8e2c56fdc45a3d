//! Decoders from provider wire shapes into the core's input records.
//!
//! Each record decodes independently: a malformed record is counted in
//! `Decoded::rejected` and logged, the rest of the input still loads. Only
//! an input that cannot be read at all (not JSON, no CSV header) is an error.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::PLACEHOLDER;
use crate::error::ReconError;
use crate::model::{
    FeeType, ListingKey, ManualFields, MarketplaceFee, RawSoldListing, RawTransaction,
    TransactionType,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub records: T,
    pub rejected: usize,
}

// ---------------------------------------------------------------------------
// Finances API transactions (JSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTransaction {
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    transaction_type: Option<String>,
    #[serde(default)]
    transaction_date: Option<String>,
    #[serde(default)]
    amount: Option<ApiAmount>,
    #[serde(default)]
    order_line_items: Option<Vec<ApiLineItem>>,
}

#[derive(Debug, Deserialize)]
struct ApiAmount {
    #[serde(default)]
    value: Option<ApiValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiValue {
    Text(String),
    Number(serde_json::Number),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiLineItem {
    #[serde(default)]
    line_item_id: Option<String>,
    #[serde(default)]
    marketplace_fees: Option<Vec<ApiFee>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFee {
    #[serde(default)]
    fee_type: Option<String>,
    #[serde(default)]
    amount: Option<ApiAmount>,
}

fn amount_text(amount: Option<&ApiAmount>) -> String {
    match amount.and_then(|a| a.value.as_ref()) {
        Some(ApiValue::Text(s)) => s.clone(),
        Some(ApiValue::Number(n)) => n.to_string(),
        None => String::new(),
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && v != PLACEHOLDER)
}

impl From<ApiTransaction> for RawTransaction {
    fn from(api: ApiTransaction) -> Self {
        let first_line_item = api.order_line_items.and_then(|items| items.into_iter().next());
        let (line_item_id, fees) = match first_line_item {
            Some(item) => {
                let fees = item
                    .marketplace_fees
                    .unwrap_or_default()
                    .into_iter()
                    .map(|fee| MarketplaceFee {
                        fee_type: FeeType::parse(fee.fee_type.as_deref().unwrap_or("")),
                        amount: amount_text(fee.amount.as_ref()),
                    })
                    .collect();
                (present(item.line_item_id), fees)
            }
            None => (None, Vec::new()),
        };

        RawTransaction {
            order_id: present(api.order_id),
            line_item_id,
            transaction_type: TransactionType::parse(api.transaction_type.as_deref().unwrap_or("")),
            transaction_date: api.transaction_date.unwrap_or_default(),
            amount: amount_text(api.amount.as_ref()),
            fees,
        }
    }
}

/// Decode Finances API output: one page object, an array of pages, or a bare
/// array of transactions. Page order and in-page order are preserved.
pub fn decode_transactions(json: &str) -> Result<Decoded<Vec<RawTransaction>>, ReconError> {
    let root: Value = serde_json::from_str(json).map_err(|e| ReconError::Decode {
        source: "transactions".into(),
        message: e.to_string(),
    })?;

    let mut raw_items: Vec<Value> = Vec::new();
    match root {
        Value::Object(mut page) => match page.remove("transactions") {
            Some(Value::Array(items)) => raw_items.extend(items),
            Some(Value::Null) | None => {}
            Some(_) => {
                return Err(ReconError::Decode {
                    source: "transactions".into(),
                    message: "'transactions' is not an array".into(),
                })
            }
        },
        Value::Array(elements) => {
            for element in elements {
                match element {
                    Value::Object(mut page) if page.contains_key("transactions") => {
                        if let Some(Value::Array(items)) = page.remove("transactions") {
                            raw_items.extend(items);
                        }
                    }
                    other => raw_items.push(other),
                }
            }
        }
        _ => {
            return Err(ReconError::Decode {
                source: "transactions".into(),
                message: "expected a page object or an array".into(),
            })
        }
    }

    let mut records = Vec::with_capacity(raw_items.len());
    let mut rejected = 0;
    for (position, item) in raw_items.into_iter().enumerate() {
        match serde_json::from_value::<ApiTransaction>(item) {
            Ok(api) => records.push(RawTransaction::from(api)),
            Err(e) => {
                rejected += 1;
                warn!(position, error = %e, "rejecting malformed transaction");
            }
        }
    }

    info!(transactions = records.len(), rejected, "decoded transactions");
    Ok(Decoded { records, rejected })
}

// ---------------------------------------------------------------------------
// Sold listings (CSV or JSON)
// ---------------------------------------------------------------------------

/// Decode a sold list, choosing JSON for `*.json` names and CSV otherwise.
pub fn decode_sold_listings(
    file_name: &str,
    data: &str,
) -> Result<Decoded<Vec<RawSoldListing>>, ReconError> {
    if file_name.to_ascii_lowercase().ends_with(".json") {
        decode_sold_listings_json(data)
    } else {
        decode_sold_listings_csv(data)
    }
}

pub fn decode_sold_listings_csv(data: &str) -> Result<Decoded<Vec<RawSoldListing>>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(data.as_bytes());

    let headers = reader.headers().map_err(|e| ReconError::Decode {
        source: "sold listings".into(),
        message: e.to_string(),
    })?;
    require_column(headers, &["Transaction ID", "transaction_id"], "sold listings")?;

    let mut records = Vec::new();
    let mut rejected = 0;
    for (row, result) in reader.deserialize::<RawSoldListing>().enumerate() {
        match result {
            Ok(listing) => records.push(listing),
            Err(e) => {
                rejected += 1;
                warn!(row = row + 1, error = %e, "rejecting malformed sold-list row");
            }
        }
    }

    info!(listings = records.len(), rejected, "decoded sold listings");
    Ok(Decoded { records, rejected })
}

pub fn decode_sold_listings_json(data: &str) -> Result<Decoded<Vec<RawSoldListing>>, ReconError> {
    let items: Vec<Value> = serde_json::from_str(data).map_err(|e| ReconError::Decode {
        source: "sold listings".into(),
        message: e.to_string(),
    })?;

    let mut records = Vec::with_capacity(items.len());
    let mut rejected = 0;
    for (position, item) in items.into_iter().enumerate() {
        match serde_json::from_value::<RawSoldListing>(item) {
            Ok(listing) => records.push(listing),
            Err(e) => {
                rejected += 1;
                warn!(position, error = %e, "rejecting malformed sold listing");
            }
        }
    }

    info!(listings = records.len(), rejected, "decoded sold listings");
    Ok(Decoded { records, rejected })
}

// ---------------------------------------------------------------------------
// Manual fields (previous reconciled export)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManualRow {
    #[serde(rename = "Order ID", alias = "order_id")]
    order_id: String,
    #[serde(rename = "Transaction ID", alias = "transaction_id")]
    transaction_id: String,
    #[serde(rename = "Item Cost", alias = "item_cost")]
    item_cost: String,
    #[serde(rename = "Purchased At", alias = "purchased_at")]
    purchased_at: String,
    #[serde(rename = "Net Return", alias = "net_return")]
    net_return: String,
    #[serde(rename = "ROI", alias = "roi")]
    roi: String,
    #[serde(rename = "Net Profit Margin", alias = "net_profit_margin")]
    net_profit_margin: String,
    #[serde(rename = "Refund To Buyer", alias = "refund_to_buyer")]
    refund_to_buyer: String,
}

/// Read manual fields back from a previously exported reconciled sold list.
/// Rows whose manual fields are all empty are skipped.
pub fn decode_manual_fields_csv(
    data: &str,
) -> Result<Decoded<BTreeMap<ListingKey, ManualFields>>, ReconError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(data.as_bytes());

    let headers = reader.headers().map_err(|e| ReconError::Decode {
        source: "manual fields".into(),
        message: e.to_string(),
    })?;
    require_column(headers, &["Transaction ID", "transaction_id"], "manual fields")?;

    let mut records = BTreeMap::new();
    let mut rejected = 0;
    for (row, result) in reader.deserialize::<ManualRow>().enumerate() {
        let row_data = match result {
            Ok(r) => r,
            Err(e) => {
                rejected += 1;
                warn!(row = row + 1, error = %e, "rejecting malformed manual-field row");
                continue;
            }
        };
        let manual = ManualFields {
            item_cost: row_data.item_cost,
            purchased_at: row_data.purchased_at,
            net_return: row_data.net_return,
            roi: row_data.roi,
            net_profit_margin: row_data.net_profit_margin,
            refund_to_buyer: row_data.refund_to_buyer,
        };
        if manual.is_empty() {
            continue;
        }
        let key = ListingKey {
            order_id: row_data.order_id.trim().to_string(),
            transaction_id: row_data.transaction_id.trim().to_string(),
        };
        records.insert(key, manual);
    }

    info!(stored = records.len(), rejected, "decoded manual fields");
    Ok(Decoded { records, rejected })
}

fn require_column(
    headers: &csv::StringRecord,
    accepted: &[&str],
    source: &str,
) -> Result<(), ReconError> {
    if headers.iter().any(|h| accepted.contains(&h)) {
        Ok(())
    } else {
        Err(ReconError::Decode {
            source: source.into(),
            message: format!("missing column '{}'", accepted[0]),
        })
    }
}
