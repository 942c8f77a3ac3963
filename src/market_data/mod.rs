// =============================================================================
// Market Data — public REST sources
// =============================================================================
//
// Thin clients over the third-party APIs the tool reads from:
//
//   CoinGecko    spot USD prices              (coingecko.rs)
//   DefiLlama    chain / protocol TVL         (defillama.rs)
//   Binance      spot klines                  (crate::binance)
//   Binance+Bybit perpetual funding rates     (crate::futures_intel)
//
// Every fetch returns `anyhow::Result`; callers decide whether a failure is
// fatal or degrades to a missing value.

pub mod candle;
pub mod coingecko;
pub mod defillama;

pub use candle::Candle;
pub use coingecko::CoinGeckoClient;
pub use defillama::DefiLlamaClient;

use std::time::Duration;

use anyhow::{Context, Result};

use crate::binance::BinanceClient;
use crate::futures_intel::FundingRateMonitor;

/// Timeout applied to every outbound market data request.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// Build the shared HTTP client.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(concat!("sector-heat/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build reqwest client")
}

/// GET `url` and decode the JSON body, failing on a non-success status.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
    query: &[(&str, String)],
    what: &str,
) -> Result<serde_json::Value> {
    let resp = client
        .get(url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("GET {what} request failed"))?;

    let status = resp.status();
    let text = resp
        .text()
        .await
        .with_context(|| format!("failed to read {what} response body"))?;

    if !status.is_success() {
        anyhow::bail!("{what} returned {}: {}", status, snippet(&text));
    }

    serde_json::from_str(&text).with_context(|| format!("failed to parse {what} response body"))
}

/// First part of a response body for error messages.
pub(crate) fn snippet(text: &str) -> String {
    const MAX_CHARS: usize = 200;
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{head}…")
    }
}

/// Parse a JSON value that may be either a string or a number into `f64`.
pub(crate) fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

/// Every market data client, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct MarketClients {
    pub coingecko: CoinGeckoClient,
    pub defillama: DefiLlamaClient,
    pub binance: BinanceClient,
    pub funding: FundingRateMonitor,
}

impl MarketClients {
    pub fn new() -> Result<Self> {
        let client = http_client()?;
        Ok(Self {
            coingecko: CoinGeckoClient::with_client(client.clone()),
            defillama: DefiLlamaClient::with_client(client.clone()),
            binance: BinanceClient::with_client(client.clone()),
            funding: FundingRateMonitor::with_client(client),
        })
    }
}
