use serde::{Deserialize, Serialize};

use crate::error::ReconError;

/// Placeholder the provider feeds use for "no value".
pub const PLACEHOLDER: &str = "N/A";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub policy: AggregationPolicy,
    /// Order key for transactions that carry no order id.
    #[serde(default = "default_unknown_order_key")]
    pub unknown_order_key: String,
    /// Join string for multi-valued fields on output.
    #[serde(default = "default_list_separator")]
    pub list_separator: String,
    pub inputs: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

fn default_unknown_order_key() -> String {
    "unknown".into()
}

fn default_list_separator() -> String {
    "; ".into()
}

// ---------------------------------------------------------------------------
// Aggregation policy
// ---------------------------------------------------------------------------

/// How repeated SALE / REFUND / DISPUTE / CREDIT events of one order combine.
///
/// `AccumulateAll` keeps every value in event order. `FirstWins` keeps the
/// first event of each type and drops later ones whole (amount, date, and
/// fees). Shipping labels are summed under both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationPolicy {
    #[default]
    AccumulateAll,
    FirstWins,
}

impl std::fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccumulateAll => write!(f, "accumulate_all"),
            Self::FirstWins => write!(f, "first_wins"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Finances API transaction pages (JSON).
    pub transactions: String,
    /// Sold list, CSV or `.json`.
    pub sold_listings: String,
    /// Previous reconciled sold list to carry manual fields from.
    #[serde(default)]
    pub manual_fields: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub transactions_csv: Option<String>,
    #[serde(default)]
    pub sold_listings_csv: Option<String>,
    #[serde(default)]
    pub json: Option<String>,
    #[serde(default)]
    pub sqlite: Option<String>,
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        let key = self.unknown_order_key.trim();
        if key.is_empty() {
            return Err(ReconError::ConfigValidation(
                "unknown_order_key must not be empty".into(),
            ));
        }
        if key == PLACEHOLDER {
            return Err(ReconError::ConfigValidation(format!(
                "unknown_order_key cannot be the placeholder '{PLACEHOLDER}'"
            )));
        }

        if self.list_separator.is_empty() {
            return Err(ReconError::ConfigValidation(
                "list_separator must not be empty".into(),
            ));
        }

        if self.inputs.transactions.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "inputs.transactions must not be empty".into(),
            ));
        }
        if self.inputs.sold_listings.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "inputs.sold_listings must not be empty".into(),
            ));
        }

        let outputs = [
            ("output.transactions_csv", &self.output.transactions_csv),
            ("output.sold_listings_csv", &self.output.sold_listings_csv),
            ("output.json", &self.output.json),
            ("output.sqlite", &self.output.sqlite),
        ];
        for (field, value) in outputs {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "{field} must not be empty when set"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
name = "eBay sold"

[inputs]
transactions = "transactions.json"
sold_listings = "SOLD_LISTINGS.csv"
"#;

    #[test]
    fn parse_minimal_uses_defaults() {
        let config = ReconConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.name, "eBay sold");
        assert_eq!(config.policy, AggregationPolicy::AccumulateAll);
        assert_eq!(config.unknown_order_key, "unknown");
        assert_eq!(config.list_separator, "; ");
        assert!(config.inputs.manual_fields.is_none());
        assert!(config.output.sqlite.is_none());
    }

    #[test]
    fn parse_full() {
        let input = r#"
name = "Full"
policy = "first_wins"
unknown_order_key = "no-order"
list_separator = " | "

[inputs]
transactions = "t.json"
sold_listings = "s.json"
manual_fields = "prev.csv"

[output]
transactions_csv = "TRANSACTIONS.csv"
sold_listings_csv = "SOLD.csv"
json = "run.json"
sqlite = "tally.db"
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert_eq!(config.policy, AggregationPolicy::FirstWins);
        assert_eq!(config.unknown_order_key, "no-order");
        assert_eq!(config.list_separator, " | ");
        assert_eq!(config.inputs.manual_fields.as_deref(), Some("prev.csv"));
        assert_eq!(config.output.sqlite.as_deref(), Some("tally.db"));
    }

    #[test]
    fn reject_unknown_policy() {
        let input = format!("policy = \"last_wins\"\n{MINIMAL}");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_placeholder_sentinel() {
        let input = format!("unknown_order_key = \"N/A\"\n{MINIMAL}");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("placeholder"));
    }

    #[test]
    fn reject_empty_output_path() {
        let input = format!("{MINIMAL}\n[output]\njson = \"  \"\n");
        let err = ReconConfig::from_toml(&input).unwrap_err();
        assert!(err.to_string().contains("output.json"));
    }

    #[test]
    fn reject_missing_inputs() {
        let err = ReconConfig::from_toml("name = \"x\"\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }
}
