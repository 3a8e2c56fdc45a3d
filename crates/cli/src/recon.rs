//! `tally run` / `tally validate`: config-driven sold-listing reconciliation.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Subcommand;
use tracing::{debug, info};

use tally_recon::model::{ListingKey, ManualFields, ReconInput, ReconResult};
use tally_recon::source::{decode_manual_fields_csv, decode_sold_listings, decode_transactions};
use tally_recon::{export, ReconConfig};

use crate::exit_codes::{EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME, EXIT_RECON_UNMATCHED};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Aggregate transactions, reconcile sold listings and write outputs
    #[command(after_help = "\
Examples:
  tally run shop.tally.toml
  tally run shop.tally.toml --json
  tally run shop.tally.toml --output result.json
  tally run shop.tally.toml --fail-on-unmatched")]
    Run {
        /// Path to the .tally.toml config file
        config: PathBuf,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Exit 62 when a listing with a transaction id found no order
        #[arg(long)]
        fail_on_unmatched: bool,
    },

    /// Validate a config without running
    #[command(after_help = "\
Examples:
  tally validate shop.tally.toml")]
    Validate {
        /// Path to the .tally.toml config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run { config, json, output, fail_on_unmatched } => {
            cmd_run(config, json, output, fail_on_unmatched)
        }
        ReconCommands::Validate { config } => cmd_validate(config),
    }
}

fn runtime_err(msg: impl Into<String>) -> CliError {
    CliError::new(EXIT_RECON_RUNTIME, msg)
}

fn load_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| runtime_err(format!("cannot read config {}: {e}", config_path.display())))?;
    ReconConfig::from_toml(&config_str).map_err(|e| CliError::new(EXIT_RECON_INVALID_CONFIG, e.to_string()))
}

fn read_input(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| runtime_err(format!("cannot read {}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

fn cmd_run(
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    fail_on_unmatched: bool,
) -> Result<(), CliError> {
    let config = load_config(&config_path)?;

    // Resolve file paths relative to config file's directory
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let sqlite_path = config.output.sqlite.as_ref().map(|p| base_dir.join(p));

    let input = load_input(&config, base_dir, sqlite_path.as_deref())?;
    let result = tally_recon::run(&config, &input);

    write_outputs(&config, base_dir, sqlite_path.as_deref(), &result)?;

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| runtime_err(format!("JSON serialization error: {e}")))?;

    if let Some(ref path) = output_file {
        std::fs::write(path, &json_str)
            .map_err(|e| runtime_err(format!("cannot write output: {e}")))?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        println!("{json_str}");
    }

    // Human summary to stderr
    let s = &result.summary;
    eprintln!(
        "{}: {} transactions in {} orders, {} listings: {} matched, {} unmatched ({:.1}%), {} rejected",
        result.meta.config_name,
        s.transactions,
        s.orders,
        s.listings,
        s.matched,
        s.unmatched,
        s.unmatched_ratio() * 100.0,
        s.rejected_records,
    );

    let unmatched_with_id = s.unmatched - s.missing_transaction_id;
    if fail_on_unmatched && unmatched_with_id > 0 {
        return Err(CliError::new(
            EXIT_RECON_UNMATCHED,
            format!("{unmatched_with_id} listing(s) found no order aggregate"),
        )
        .with_hint("check that the transactions export covers the sold-list date range"));
    }

    Ok(())
}

fn load_input(
    config: &ReconConfig,
    base_dir: &Path,
    sqlite_path: Option<&Path>,
) -> Result<ReconInput, CliError> {
    let transactions_path = base_dir.join(&config.inputs.transactions);
    let transactions = decode_transactions(&read_input(&transactions_path)?)
        .map_err(|e| runtime_err(format!("{}: {e}", transactions_path.display())))?;

    let listings_path = base_dir.join(&config.inputs.sold_listings);
    let listings = decode_sold_listings(&config.inputs.sold_listings, &read_input(&listings_path)?)
        .map_err(|e| runtime_err(format!("{}: {e}", listings_path.display())))?;

    let mut rejected = transactions.rejected + listings.rejected;
    let mut manual: BTreeMap<ListingKey, ManualFields> = BTreeMap::new();

    if let Some(path) = sqlite_path {
        let stored = tally_store::load_manual_fields(path).map_err(|e| runtime_err(e.to_string()))?;
        debug!(stored = stored.len(), "manual fields from sqlite");
        manual.extend(stored);
    }

    // An explicit manual-fields CSV overrides what the database holds. It may
    // not exist yet when it names this run's own sold-listings export.
    if let Some(ref name) = config.inputs.manual_fields {
        let path = base_dir.join(name);
        if path.exists() {
            let decoded = decode_manual_fields_csv(&read_input(&path)?)
                .map_err(|e| runtime_err(format!("{}: {e}", path.display())))?;
            debug!(stored = decoded.records.len(), "manual fields from csv");
            rejected += decoded.rejected;
            manual.extend(decoded.records);
        } else {
            debug!(path = %path.display(), "manual fields csv not found; none loaded");
        }
    }

    Ok(ReconInput {
        transactions: transactions.records,
        listings: listings.records,
        manual,
        rejected,
    })
}

fn create_file(path: &Path) -> Result<BufWriter<File>, CliError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| runtime_err(format!("cannot write {}: {e}", path.display())))
}

fn write_outputs(
    config: &ReconConfig,
    base_dir: &Path,
    sqlite_path: Option<&Path>,
    result: &ReconResult,
) -> Result<(), CliError> {
    let out = &config.output;

    if let Some(ref name) = out.transactions_csv {
        let path = base_dir.join(name);
        export::write_transactions_csv(&result.orders, &config.list_separator, create_file(&path)?)
            .map_err(|e| runtime_err(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "wrote transactions csv");
    }

    if let Some(ref name) = out.sold_listings_csv {
        let path = base_dir.join(name);
        export::write_sold_listings_csv(&result.listings, create_file(&path)?)
            .map_err(|e| runtime_err(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "wrote sold listings csv");
    }

    if let Some(ref name) = out.json {
        let path = base_dir.join(name);
        let mut writer = create_file(&path)?;
        serde_json::to_writer_pretty(&mut writer, result)
            .map_err(|e| runtime_err(format!("{}: {e}", path.display())))?;
        writer
            .flush()
            .map_err(|e| runtime_err(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "wrote json result");
    }

    if let Some(path) = sqlite_path {
        tally_store::save_run(path, result, &config.list_separator)
            .map_err(|e| runtime_err(e.to_string()))?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    eprintln!(
        "valid: '{}' policy={} unknown_order_key='{}'",
        config.name, config.policy, config.unknown_order_key,
    );
    Ok(())
}
