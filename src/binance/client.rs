// =============================================================================
// Binance Spot REST Client — public market data
// =============================================================================
//
// Only unauthenticated endpoints are used, so requests carry no API key and
// no signature.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::market_data::{get_json, parse_str_f64, Candle};

const BASE_URL: &str = "https://api.binance.com";

/// Binance caps a single klines request at 1000 candles.
const MAX_KLINES: u32 = 1000;

#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceClient {
    /// Create a client that re-uses an existing HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    /// Client against another host, e.g. a regional mirror.
    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        debug!("BinanceClient initialised (base_url={base_url})");
        Self { base_url, client }
    }

    /// GET /api/v3/klines for the candles opening in `[start, end)`.
    #[instrument(skip(self), name = "binance::get_klines_range")]
    pub async fn get_klines_range(
        &self,
        pair: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        // endTime is inclusive on Binance's side.
        let end_ms = end.timestamp_millis() - 1;

        let body = get_json(
            &self.client,
            &url,
            &[
                ("symbol", pair.to_string()),
                ("interval", interval.to_string()),
                ("startTime", start.timestamp_millis().to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", MAX_KLINES.to_string()),
            ],
            "binance /api/v3/klines",
        )
        .await?;

        let candles = parse_klines(&body)?;
        debug!(pair, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

/// Parse Binance's array-of-arrays klines response.
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, ...
pub fn parse_klines(body: &serde_json::Value) -> Result<Vec<Candle>> {
    let raw = body.as_array().context("klines response is not an array")?;

    let mut candles = Vec::with_capacity(raw.len());

    for entry in raw {
        let arr = entry.as_array().context("kline entry is not an array")?;

        if arr.len() < 7 {
            warn!("skipping malformed kline entry with {} elements", arr.len());
            continue;
        }

        let open_time = arr[0].as_i64().unwrap_or(0);
        let open = parse_str_f64(&arr[1])?;
        let high = parse_str_f64(&arr[2])?;
        let low = parse_str_f64(&arr[3])?;
        let close = parse_str_f64(&arr[4])?;
        let volume = parse_str_f64(&arr[5])?;
        let close_time = arr[6].as_i64().unwrap_or(0);

        candles.push(Candle::new(open_time, open, high, low, close, volume, close_time));
    }

    Ok(candles)
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
