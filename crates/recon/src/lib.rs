//! `tally-recon`: eBay seller transaction and listing reconciliation.
//!
//! Pure engine crate: receives pre-loaded records, returns aggregated orders
//! and reconciled sold listings. Decoding of API payloads and CSV rendering
//! live here too; file and database IO belong to the callers.

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod fees;
pub mod listing;
pub mod manual;
pub mod merge;
pub mod model;
pub mod money;
pub mod source;
pub mod summary;

pub use config::{AggregationPolicy, ReconConfig};
pub use engine::run;
pub use error::ReconError;
pub use model::{ReconInput, ReconResult};
