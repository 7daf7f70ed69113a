//! Analysis configuration
//!
//! Every threshold and lookup table used by the pipeline lives here and is
//! passed explicitly to each stage. Config is loaded with a two-layer
//! resolution:
//! 1. Explicit path, or override in data dir (~/.local/share/spendlens/config/analysis.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Override files may be partial; omitted keys keep their defaults.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/analysis.toml");

/// Top-level configuration threaded through every pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// The only currency accepted in a batch
    pub display_currency: String,
    pub thresholds: Thresholds,
    pub categories: CategoryTables,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            display_currency: "GBP".to_string(),
            thresholds: Thresholds::default(),
            categories: CategoryTables::default(),
        }
    }
}

/// Numeric policy knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub winsorise_percentile: f64,
    /// Trailing window for merchant concentration
    pub hhi_window_weeks: i64,
    pub hhi_high_threshold: f64,
    /// Spend below this magnitude counts as a "drip" transaction
    pub small_tx_threshold: f64,
    pub small_tx_week_limit: usize,
    pub drip_rise_min_delta: f64,
    pub late_hours_start: u32,
    pub recurring_cv_threshold: f64,
    pub recurring_interval_tolerance: i64,
    pub recurring_min_occurrences: usize,
    pub rent_amount_threshold: f64,
    pub ghost_lookback_days: i64,
    pub anomaly_window_weeks: usize,
    pub anomaly_z_threshold: f64,
    pub anomaly_week_delta: f64,
    pub outlier_percentile: f64,
    pub duplicate_window_secs: i64,
    pub opportunity_cap_ratio: f64,
    pub rising_mom_threshold: f64,
    pub rising_min_spend: f64,
    pub max_suggestions: usize,
    pub max_challenges: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            winsorise_percentile: 0.99,
            hhi_window_weeks: 8,
            hhi_high_threshold: 0.4,
            small_tx_threshold: 5.0,
            small_tx_week_limit: 6,
            drip_rise_min_delta: 0.15,
            late_hours_start: 21,
            recurring_cv_threshold: 0.15,
            recurring_interval_tolerance: 2,
            recurring_min_occurrences: 3,
            rent_amount_threshold: 200.0,
            ghost_lookback_days: 60,
            anomaly_window_weeks: 6,
            anomaly_z_threshold: 2.0,
            anomaly_week_delta: 0.30,
            outlier_percentile: 0.99,
            duplicate_window_secs: 300,
            opportunity_cap_ratio: 0.2,
            rising_mom_threshold: 0.10,
            rising_min_spend: 15.0,
            max_suggestions: 10,
            max_challenges: 3,
        }
    }
}

const MAX_WINDOW_WEEKS: i64 = 520;
const MAX_LOOKBACK_DAYS: i64 = 3650;
const MAX_DUPLICATE_WINDOW_SECS: i64 = 86_400 * 30;

impl Thresholds {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("winsorise_percentile", self.winsorise_percentile),
            ("outlier_percentile", self.outlier_percentile),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, value, "0..=1"));
            }
        }
        if !(1..=MAX_WINDOW_WEEKS).contains(&self.hhi_window_weeks) {
            return Err(invalid(
                "hhi_window_weeks",
                self.hhi_window_weeks,
                &format!("1..={}", MAX_WINDOW_WEEKS),
            ));
        }
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.ghost_lookback_days) {
            return Err(invalid(
                "ghost_lookback_days",
                self.ghost_lookback_days,
                &format!("1..={}", MAX_LOOKBACK_DAYS),
            ));
        }
        if !(0..=MAX_DUPLICATE_WINDOW_SECS).contains(&self.duplicate_window_secs) {
            return Err(invalid(
                "duplicate_window_secs",
                self.duplicate_window_secs,
                &format!("0..={}", MAX_DUPLICATE_WINDOW_SECS),
            ));
        }
        if self.recurring_interval_tolerance < 0 {
            return Err(invalid(
                "recurring_interval_tolerance",
                self.recurring_interval_tolerance,
                ">= 0",
            ));
        }
        if self.anomaly_window_weeks == 0 {
            return Err(invalid("anomaly_window_weeks", 0, ">= 1"));
        }
        if self.late_hours_start > 23 {
            return Err(invalid("late_hours_start", self.late_hours_start, "0..=23"));
        }
        Ok(())
    }
}

fn invalid(name: &str, value: impl std::fmt::Display, range: &str) -> Error {
    Error::Config(format!(
        "thresholds.{} = {} is out of range (expected {})",
        name, value, range
    ))
}

/// Data-driven category lookups (aliases and policy sets)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryTables {
    /// Essentials excluded from drip-spend detection
    pub necessity: BTreeSet<String>,
    /// Categories where switching merchant is a realistic saving
    pub swap_eligible: BTreeSet<String>,
    pub late_night: BTreeSet<String>,
    pub ridehail: BTreeSet<String>,
    pub rent: BTreeSet<String>,
    /// Case-folded raw category -> canonical category
    pub aliases: BTreeMap<String, String>,
}

fn set_of(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for CategoryTables {
    fn default() -> Self {
        let aliases = [
            ("uber", "transport.ridehail"),
            ("bolt", "transport.ridehail"),
            ("lyft", "transport.ridehail"),
            ("tfl", "transport.public"),
            ("national rail", "transport.public"),
            ("tesco", "groceries"),
            ("sainsburys", "groceries"),
            ("sainsbury's", "groceries"),
            ("waitrose", "groceries"),
            ("aldi", "groceries"),
            ("lidl", "groceries"),
            ("deliveroo", "eating_out"),
            ("just eat", "eating_out"),
            ("starbucks", "dining.coffee"),
            ("pret", "dining.coffee"),
            ("hmrc", "taxes"),
            ("salary", "income.salary"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            necessity: set_of(&[
                "groceries",
                "housing.rent",
                "rent",
                "utilities",
                "transport.public",
                "taxes",
            ]),
            swap_eligible: set_of(&["groceries", "dining.coffee"]),
            late_night: set_of(&["eating_out", "dining.delivery"]),
            ridehail: set_of(&["transport.ridehail"]),
            rent: set_of(&["housing.rent", "rent"]),
            aliases,
        }
    }
}

impl CategoryTables {
    pub fn is_necessity(&self, category: &str) -> bool {
        self.necessity.contains(category)
    }

    pub fn is_rent(&self, category: &str) -> bool {
        self.rent.contains(category)
    }

    pub fn is_ridehail(&self, category: &str) -> bool {
        self.ridehail.contains(category)
    }
}

impl AnalysisConfig {
    /// Load configuration: explicit path, then data-dir override, then embedded default
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let content = match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::NotFound(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                read_config(path)?
            }
            None => match default_config_path() {
                Some(default_path) if default_path.exists() => {
                    debug!(path = %default_path.display(), "Using config override");
                    read_config(&default_path)?
                }
                _ => DEFAULT_CONFIG.to_string(),
            },
        };

        Self::from_toml(&content)
    }

    /// Parse a (possibly partial) TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))?;
        config.thresholds.validate()?;
        Ok(config)
    }

    /// The embedded default configuration file
    pub fn embedded_default() -> &'static str {
        DEFAULT_CONFIG
    }

    /// Render as TOML (for `spendlens config`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Display symbol for the configured currency
    pub fn currency_symbol(&self) -> &str {
        match self.display_currency.as_str() {
            "GBP" => "£",
            "USD" => "$",
            "EUR" => "€",
            other => other,
        }
    }
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))
}

/// Get the default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("spendlens").join("config").join("analysis.toml"))
}
