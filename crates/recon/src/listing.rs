use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::PLACEHOLDER;
use crate::model::{FinancialFields, ManualFields, RawSoldListing, SoldListingRecord};

/// Listing-feed timestamp format, e.g. `2024-01-05T00:00:00.000000Z`.
/// chrono treats `%.f` as optional, so the fraction is checked separately.
pub const LISTING_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

const MAX_FRACTION_DIGITS: usize = 6;

const SECONDS_PER_DAY: i64 = 86_400;

/// Parse `YYYY-MM-DDTHH:MM:SS.ffffffZ`. The fraction is required and holds 1 to 6 digits.
pub fn parse_listing_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    let (_, fraction) = value.strip_suffix('Z')?.rsplit_once('.')?;
    if fraction.is_empty()
        || fraction.len() > MAX_FRACTION_DIGITS
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    NaiveDateTime::parse_from_str(value, LISTING_TIMESTAMP_FORMAT).ok()
}

/// Whole days from listing to sale, floored. `None` if either side is missing or malformed.
pub fn time_to_sell_days(list_date: &str, sold_date: &str) -> Option<i64> {
    let listed = parse_listing_timestamp(list_date)?;
    let sold = parse_listing_timestamp(sold_date)?;
    Some((sold - listed).num_seconds().div_euclid(SECONDS_PER_DAY))
}

/// Normalise raw sold-list entries into records with empty financial fields.
pub fn reconcile_listings(raw: &[RawSoldListing]) -> Vec<SoldListingRecord> {
    let mut unknown_days = 0usize;

    let records: Vec<SoldListingRecord> = raw
        .iter()
        .map(|entry| {
            let record = to_record(entry);
            if record.time_to_sell_days.is_none() {
                unknown_days += 1;
                debug!(
                    order_id = %record.order_id,
                    transaction_id = %record.transaction_id,
                    list_date = %record.list_date,
                    sold_date = %record.sold_date,
                    "time to sell unknown"
                );
            }
            record
        })
        .collect();

    info!(listings = records.len(), unknown_time_to_sell = unknown_days, "normalised sold listings");
    records
}

fn to_record(entry: &RawSoldListing) -> SoldListingRecord {
    let list_date = clean(&entry.list_date);
    let sold_date = clean(&entry.sold_date);
    let time_to_sell_days = time_to_sell_days(&list_date, &sold_date);

    SoldListingRecord {
        order_id: clean(&entry.order_id),
        transaction_id: clean(&entry.transaction_id),
        item_id: clean(&entry.item_id),
        title: clean(&entry.title),
        photo_url: clean(&entry.photo_url),
        list_date,
        sold_date,
        time_to_sell_days,
        sku: clean(&entry.sku),
        quantity_sold: clean(&entry.quantity_sold),
        sold_for_price: clean(&entry.sold_for_price),
        shipping_paid: clean(&entry.shipping_paid),
        financial: FinancialFields::default(),
        manual: ManualFields::default(),
    }
}

fn clean(value: &str) -> String {
    let value = value.trim();
    if value == PLACEHOLDER {
        String::new()
    } else {
        value.to_string()
    }
}
