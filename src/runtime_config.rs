// =============================================================================
// Heat Configuration — thresholds, mappings and file locations
// =============================================================================
//
// Every constant the scoring and reporting pipelines depend on lives here and
// is passed explicitly into the code that needs it.  Defaults reproduce the
// fixed values the tool has always run with, so an absent or empty
// `heat_config.json` behaves exactly like the stock setup.
//
// All fields carry `#[serde(default)]` so that adding new fields never breaks
// loading an older config file.  Persistence uses an atomic tmp + rename.
// =============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_price_lookback() -> usize {
    7
}

fn default_price_threshold() -> f64 {
    0.40
}

fn default_tvl_lookback() -> usize {
    30
}

fn default_tvl_threshold() -> f64 {
    0.60
}

fn default_funding_threshold() -> f64 {
    0.0012
}

fn default_points_per_signal() -> u32 {
    2
}

fn default_chains() -> Vec<String> {
    ["solana", "near", "avalanche", "sui"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_basket_protocols() -> BTreeMap<String, Vec<String>> {
    let mut m = BTreeMap::new();
    m.insert("L1".to_string(), default_chains());
    m
}

fn default_alert_threshold() -> u32 {
    4
}

fn default_prep_tokens() -> Vec<String> {
    ["BTC", "ETH", "SOL", "BNB"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_binance_pairs() -> BTreeMap<String, Option<String>> {
    let mut m = BTreeMap::new();
    // No spot pair on Binance; fall back to CoinGecko.
    m.insert("TAO".to_string(), None);
    m.insert("FET".to_string(), Some("FETUSDT".to_string()));
    m
}

fn default_coingecko_ids() -> BTreeMap<String, String> {
    [
        ("BTC", "bitcoin"),
        ("ETH", "ethereum"),
        ("SOL", "solana"),
        ("BNB", "binancecoin"),
        ("TAO", "bittensor"),
        ("FET", "fetch-ai"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_prices_path() -> PathBuf {
    PathBuf::from("prices.csv")
}

fn default_tvl_path() -> PathBuf {
    PathBuf::from("tvl.csv")
}

fn default_baskets_path() -> PathBuf {
    PathBuf::from("baskets.yml")
}

fn default_bias_path() -> PathBuf {
    PathBuf::from("bias_data.json")
}

fn default_dashboard_bind() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_funding_cache_secs() -> u64 {
    300
}

// =============================================================================
// ScoreConfig
// =============================================================================

/// Lookbacks, thresholds and the basket-to-protocol mapping consumed by the
/// heat score aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreConfig {
    /// Rows between the compared price snapshots.
    #[serde(default = "default_price_lookback")]
    pub price_lookback: usize,

    /// Minimum average price change as a fraction (0.40 = +40 %).
    #[serde(default = "default_price_threshold")]
    pub price_threshold: f64,

    /// Rows between the compared TVL snapshots.
    #[serde(default = "default_tvl_lookback")]
    pub tvl_lookback: usize,

    /// Minimum average TVL growth as a fraction (0.60 = +60 %).
    #[serde(default = "default_tvl_threshold")]
    pub tvl_threshold: f64,

    /// Minimum funding rate as a raw decimal (0.0012 = 0.12 %).
    #[serde(default = "default_funding_threshold")]
    pub funding_threshold: f64,

    /// Points awarded by each sub-signal that fires.
    #[serde(default = "default_points_per_signal")]
    pub points_per_signal: u32,

    #[serde(default = "default_true")]
    pub enable_price: bool,

    #[serde(default = "default_true")]
    pub enable_funding: bool,

    #[serde(default = "default_true")]
    pub enable_tvl: bool,

    /// Basket -> TVL columns (chains / protocols). Baskets missing here never
    /// receive a TVL contribution.
    #[serde(default = "default_basket_protocols")]
    pub basket_protocols: BTreeMap<String, Vec<String>>,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            price_lookback: default_price_lookback(),
            price_threshold: default_price_threshold(),
            tvl_lookback: default_tvl_lookback(),
            tvl_threshold: default_tvl_threshold(),
            funding_threshold: default_funding_threshold(),
            points_per_signal: default_points_per_signal(),
            enable_price: true,
            enable_funding: true,
            enable_tvl: true,
            basket_protocols: default_basket_protocols(),
        }
    }
}

impl ScoreConfig {
    /// Number of sub-signals that can contribute.
    pub fn active_signals(&self) -> u32 {
        [self.enable_price, self.enable_funding, self.enable_tvl]
            .iter()
            .filter(|on| **on)
            .count() as u32
    }

    /// Upper bound of any basket's score.
    pub fn max_score(&self) -> u32 {
        self.active_signals() * self.points_per_signal
    }
}

// =============================================================================
// HeatConfig
// =============================================================================

/// Top-level configuration for every subcommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatConfig {
    // --- Files --------------------------------------------------------------
    #[serde(default = "default_prices_path")]
    pub prices_path: PathBuf,

    #[serde(default = "default_tvl_path")]
    pub tvl_path: PathBuf,

    #[serde(default = "default_baskets_path")]
    pub baskets_path: PathBuf,

    #[serde(default = "default_bias_path")]
    pub bias_path: PathBuf,

    // --- Scoring ------------------------------------------------------------
    #[serde(default)]
    pub score: ScoreConfig,

    /// Minimum basket score that produces an alert line.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u32,

    /// Send a confirmation message after every alert run, hot or not.
    #[serde(default)]
    pub send_heartbeat: bool,

    /// Chains / protocols snapshotted into the TVL history.
    #[serde(default = "default_chains")]
    pub tvl_chains: Vec<String>,

    // --- Prep report ----------------------------------------------------------
    #[serde(default = "default_prep_tokens")]
    pub prep_tokens: Vec<String>,

    /// Symbol -> Binance spot pair. `null` marks a symbol without a spot pair.
    /// Unlisted symbols trade as `<SYMBOL>USDT`.
    #[serde(default = "default_binance_pairs")]
    pub binance_pairs: BTreeMap<String, Option<String>>,

    /// Symbol -> CoinGecko id. Unlisted symbols use the lower-cased symbol.
    #[serde(default = "default_coingecko_ids")]
    pub coingecko_ids: BTreeMap<String, String>,

    // --- Dashboard ----------------------------------------------------------
    #[serde(default = "default_dashboard_bind")]
    pub dashboard_bind: String,

    /// How long fetched funding rates are reused by the dashboard.
    #[serde(default = "default_funding_cache_secs")]
    pub funding_cache_secs: u64,
}

impl Default for HeatConfig {
    fn default() -> Self {
        Self {
            prices_path: default_prices_path(),
            tvl_path: default_tvl_path(),
            baskets_path: default_baskets_path(),
            bias_path: default_bias_path(),
            score: ScoreConfig::default(),
            alert_threshold: default_alert_threshold(),
            send_heartbeat: false,
            tvl_chains: default_chains(),
            prep_tokens: default_prep_tokens(),
            binance_pairs: default_binance_pairs(),
            coingecko_ids: default_coingecko_ids(),
            dashboard_bind: default_dashboard_bind(),
            funding_cache_secs: default_funding_cache_secs(),
        }
    }
}

impl HeatConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read heat config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse heat config from {}", path.display()))?;

        info!(
            path = %path.display(),
            alert_threshold = config.alert_threshold,
            max_score = config.score.max_score(),
            "heat config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write (write to
    /// `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise heat config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "heat config saved (atomic)");
        Ok(())
    }

    /// Binance spot pair for `symbol`, or `None` when the symbol is marked as
    /// having no spot market.
    pub fn binance_pair(&self, symbol: &str) -> Option<String> {
        let symbol = symbol.to_uppercase();
        match self.binance_pairs.get(&symbol) {
            Some(mapped) => mapped.clone(),
            None => Some(format!("{symbol}USDT")),
        }
    }

    /// CoinGecko id for `symbol`.
    pub fn coingecko_id(&self, symbol: &str) -> String {
        self.coingecko_ids
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_else(|| symbol.to_lowercase())
    }
}
