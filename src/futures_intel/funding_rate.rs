// =============================================================================
// Funding Rate Monitor — perpetual futures funding from Binance and Bybit
// =============================================================================
//
// Funding rates are periodic payments between longs and shorts that anchor the
// perpetual contract price to spot.  A persistently high positive rate means
// longs are crowded, which the heat score treats as a sign of froth.
//
// Each token is read from two venues independently:
//
//   Binance  GET fapi/v1/fundingRate?symbol=<SYM>USDT&limit=1
//   Bybit    GET v5/market/funding/history?category=linear&symbol=<SYM>USDT&limit=1
//
// The token rate is the mean of the non-zero readings.  A venue that fails or
// reports exactly zero is ignored; if neither produces a reading the rate is
// 0.0.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::market_data::{get_json, parse_str_f64};

const BINANCE_FAPI_URL: &str = "https://fapi.binance.com";
const BYBIT_API_URL: &str = "https://api.bybit.com";

/// Funding readings for one token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingReading {
    pub symbol: String,

    /// Latest Binance rate as a decimal, if the read succeeded.
    pub binance: Option<f64>,

    /// Latest Bybit rate as a decimal, if the read succeeded.
    pub bybit: Option<f64>,

    /// Combined rate as a decimal (e.g. 0.0001 = 0.01%).
    pub rate: f64,
}

impl FundingReading {
    /// Combined rate as a percentage (e.g. 0.01).
    pub fn rate_pct(&self) -> f64 {
        self.rate * 100.0
    }
}

/// Fetches funding rates from both venues for USDT-margined perpetuals.
#[derive(Debug, Clone)]
pub struct FundingRateMonitor {
    client: reqwest::Client,
    binance_url: String,
    bybit_url: String,
}

impl FundingRateMonitor {
    /// Create a monitor that re-uses an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self::with_base_urls(client, BINANCE_FAPI_URL, BYBIT_API_URL)
    }

    /// Monitor against other Binance futures / Bybit hosts.
    pub fn with_base_urls(
        client: reqwest::Client,
        binance_url: impl Into<String>,
        bybit_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            binance_url: binance_url.into(),
            bybit_url: bybit_url.into(),
        }
    }

    /// Latest Binance funding rate for `symbol` (base asset, e.g. "SOL").
    pub async fn binance_rate(&self, symbol: &str) -> Result<f64> {
        let pair = perp_pair(symbol);
        let url = format!("{}/fapi/v1/fundingRate", self.binance_url);
        let body = get_json(
            &self.client,
            &url,
            &[("symbol", pair.clone()), ("limit", "1".to_string())],
            "binance fundingRate",
        )
        .await?;
        parse_binance_funding(&body).with_context(|| format!("binance funding for {pair}"))
    }

    /// Latest Bybit funding rate for `symbol`.
    pub async fn bybit_rate(&self, symbol: &str) -> Result<f64> {
        let pair = perp_pair(symbol);
        let url = format!("{}/v5/market/funding/history", self.bybit_url);
        let body = get_json(
            &self.client,
            &url,
            &[
                ("category", "linear".to_string()),
                ("symbol", pair.clone()),
                ("limit", "1".to_string()),
            ],
            "bybit funding/history",
        )
        .await?;
        parse_bybit_funding(&body).with_context(|| format!("bybit funding for {pair}"))
    }

    /// Read both venues and combine. Never fails.
    pub async fn fetch(&self, symbol: &str) -> FundingReading {
        let binance = self
            .binance_rate(symbol)
            .await
            .map_err(|e| warn!(symbol, error = %e, "binance funding unavailable"))
            .ok();
        let bybit = self
            .bybit_rate(symbol)
            .await
            .map_err(|e| warn!(symbol, error = %e, "bybit funding unavailable"))
            .ok();

        let reading = FundingReading {
            symbol: symbol.to_uppercase(),
            binance,
            bybit,
            rate: combine_rates(&[binance, bybit]),
        };

        debug!(
            symbol,
            rate_pct = format!("{:.4}", reading.rate_pct()),
            "funding rate fetched"
        );

        reading
    }

    /// Combined rate for every symbol, fetched one after another.
    pub async fn fetch_many<'a, I>(&self, symbols: I) -> HashMap<String, f64>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut out = HashMap::new();
        for symbol in symbols {
            let reading = self.fetch(symbol).await;
            out.insert(reading.symbol, reading.rate);
        }
        out
    }
}

/// USDT-margined perpetual for a base asset.
fn perp_pair(symbol: &str) -> String {
    format!("{}USDT", symbol.to_uppercase())
}

/// Mean of the readings that exist and are non-zero, else 0.0.
pub fn combine_rates(readings: &[Option<f64>]) -> f64 {
    let usable: Vec<f64> = readings
        .iter()
        .flatten()
        .copied()
        .filter(|r| *r != 0.0 && r.is_finite())
        .collect();
    if usable.is_empty() {
        0.0
    } else {
        usable.iter().sum::<f64>() / usable.len() as f64
    }
}

/// `[{"symbol": "...", "fundingRate": "0.0001", ...}]`
pub fn parse_binance_funding(body: &Value) -> Result<f64> {
    let entry = body
        .as_array()
        .context("funding rate response is not an array")?
        .first()
        .context("funding rate response array is empty")?;
    parse_str_f64(&entry["fundingRate"])
}

/// `{"retCode": 0, "result": {"list": [{"fundingRate": "0.0001", ...}]}}`
pub fn parse_bybit_funding(body: &Value) -> Result<f64> {
    let code = body["retCode"].as_i64().context("bybit response missing retCode")?;
    if code != 0 {
        anyhow::bail!(
            "bybit retCode {code}: {}",
            body["retMsg"].as_str().unwrap_or("unknown error")
        );
    }
    let entry = body["result"]["list"]
        .as_array()
        .context("bybit result.list is not an array")?
        .first()
        .context("bybit result.list is empty")?;
    parse_str_f64(&entry["fundingRate"])
}
