//! `tally-store`: SQLite persistence for reconciliation runs.
//!
//! Both tables mirror the latest run: order aggregates and sold items are
//! cleared and rewritten inside one transaction. Sold items are keyed by
//! (order_id, transaction_id); a repeated key keeps the last row. Manual
//! columns are read back so the next run can restore them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use tally_recon::merge::refund_to_seller;
use tally_recon::model::{ListingKey, ManualFields, ReconResult};
use tally_recon::money::format_cents;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS order_aggregates (
    order_id TEXT PRIMARY KEY,
    line_item_ids TEXT NOT NULL,
    sale_amounts TEXT NOT NULL,
    sale_dates TEXT NOT NULL,
    final_fee TEXT NOT NULL,
    fixed_final_fee TEXT NOT NULL,
    international_fee TEXT NOT NULL,
    cost_to_ship TEXT NOT NULL,
    refund_owed TEXT NOT NULL,
    refund_final_fee TEXT NOT NULL,
    refund_fixed_final_fee TEXT NOT NULL,
    refund_to_seller TEXT NOT NULL,
    dispute_amounts TEXT NOT NULL,
    credit_amounts TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sold_items (
    order_id TEXT NOT NULL,
    transaction_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    title TEXT NOT NULL,
    photo_url TEXT NOT NULL,
    list_date TEXT NOT NULL,
    sold_date TEXT NOT NULL,
    time_to_sell_days INTEGER,         -- NULL = unknown
    item_cost TEXT NOT NULL,
    purchased_at TEXT NOT NULL,
    sku TEXT NOT NULL,
    quantity_sold TEXT NOT NULL,
    sold_for_price TEXT NOT NULL,
    shipping_paid TEXT NOT NULL,
    fixed_final_fee TEXT NOT NULL,
    final_fee TEXT NOT NULL,
    international_fee TEXT NOT NULL,
    cost_to_ship TEXT NOT NULL,
    net_return TEXT NOT NULL,
    roi TEXT NOT NULL,
    net_profit_margin TEXT NOT NULL,
    refund_to_buyer TEXT NOT NULL,
    refund_owed TEXT NOT NULL,
    refund_to_seller TEXT NOT NULL,
    PRIMARY KEY (order_id, transaction_id)
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StoreError {
    Open { path: String, message: String },
    Sqlite(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { path, message } => write!(f, "cannot open database {path}: {message}"),
            Self::Sqlite(msg) => write!(f, "database error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e.to_string())
    }
}

fn open(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path).map_err(|e| StoreError::Open {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

// ---------------------------------------------------------------------------
// Save
// ---------------------------------------------------------------------------

/// Persist one run result in a single transaction.
pub fn save_run(path: &Path, result: &ReconResult, separator: &str) -> Result<(), StoreError> {
    let mut conn = open(path)?;
    let tx = conn.transaction()?;

    tx.execute("DELETE FROM order_aggregates", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO order_aggregates VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        for agg in &result.orders {
            stmt.execute(params![
                agg.order_id,
                agg.render_line_items(separator),
                agg.sale_amounts.render(separator),
                agg.sale_dates.render(separator),
                agg.sale_final_fee.render(separator),
                agg.sale_fixed_fee.render(separator),
                agg.sale_international_fee.render(separator),
                format_cents(agg.shipping_label.total_cents),
                agg.refund_amounts.render(separator),
                agg.refund_final_fee.render(separator),
                agg.refund_fixed_fee.render(separator),
                refund_to_seller(agg),
                agg.dispute_amounts.render(separator),
                agg.credit_amounts.render(separator),
            ])?;
        }
    }

    tx.execute("DELETE FROM sold_items", [])?;
    let mut duplicate_keys = 0usize;
    {
        let mut seen: HashSet<(&str, &str)> = HashSet::new();
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO sold_items VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
              ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)",
        )?;
        for r in &result.listings {
            if !seen.insert((r.order_id.as_str(), r.transaction_id.as_str())) {
                duplicate_keys += 1;
                debug!(
                    order_id = %r.order_id,
                    transaction_id = %r.transaction_id,
                    "duplicate sold item key; later row replaces earlier"
                );
            }
            stmt.execute(params![
                r.order_id,
                r.transaction_id,
                r.item_id,
                r.title,
                r.photo_url,
                r.list_date,
                r.sold_date,
                r.time_to_sell_days,
                r.manual.item_cost,
                r.manual.purchased_at,
                r.sku,
                r.quantity_sold,
                r.sold_for_price,
                r.shipping_paid,
                r.financial.fixed_final_fee,
                r.financial.final_fee,
                r.financial.international_fee,
                r.financial.cost_to_ship,
                r.manual.net_return,
                r.manual.roi,
                r.manual.net_profit_margin,
                r.manual.refund_to_buyer,
                r.financial.refund_owed,
                r.financial.refund_to_seller,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")?;
        stmt.execute(params!["config_name", result.meta.config_name])?;
        stmt.execute(params!["policy", result.meta.policy.to_string()])?;
        stmt.execute(params!["engine_version", result.meta.engine_version])?;
        stmt.execute(params!["run_at", result.meta.run_at])?;
    }

    tx.commit()?;
    if duplicate_keys > 0 {
        warn!(count = duplicate_keys, "sold items with a repeated (order_id, transaction_id) collapsed");
    }
    info!(
        path = %path.display(),
        orders = result.orders.len(),
        listings = result.listings.len(),
        "saved run to sqlite"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Manual fields of every stored sold item that has at least one set.
/// A database file that does not exist yet yields an empty map.
pub fn load_manual_fields(path: &Path) -> Result<BTreeMap<ListingKey, ManualFields>, StoreError> {
    if !path.exists() {
        debug!(path = %path.display(), "no database yet; no stored manual fields");
        return Ok(BTreeMap::new());
    }

    let conn = open(path)?;
    let mut stmt = conn.prepare(
        "SELECT order_id, transaction_id, item_cost, purchased_at, net_return, roi,
                net_profit_margin, refund_to_buyer
         FROM sold_items",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            ListingKey {
                order_id: row.get(0)?,
                transaction_id: row.get(1)?,
            },
            ManualFields {
                item_cost: row.get(2)?,
                purchased_at: row.get(3)?,
                net_return: row.get(4)?,
                roi: row.get(5)?,
                net_profit_margin: row.get(6)?,
                refund_to_buyer: row.get(7)?,
            },
        ))
    })?;

    let mut stored = BTreeMap::new();
    for row in rows {
        let (key, manual) = row?;
        if !manual.is_empty() {
            stored.insert(key, manual);
        }
    }

    debug!(path = %path.display(), stored = stored.len(), "loaded stored manual fields");
    Ok(stored)
}
