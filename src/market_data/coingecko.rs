// =============================================================================
// CoinGecko — spot USD prices
// =============================================================================

use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::get_json;

const BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Client for the CoinGecko `simple/price` endpoint.
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: reqwest::Client,
    base_url: String,
}

impl CoinGeckoClient {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Fetch USD prices for `(symbol, coingecko_id)` pairs.
    ///
    /// Returns `{SYMBOL: price}`; symbols CoinGecko does not know are omitted.
    #[instrument(skip(self, ids), fields(count = ids.len()), name = "coingecko::get_prices")]
    pub async fn get_prices(&self, ids: &[(String, String)]) -> Result<BTreeMap<String, f64>> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let id_list = ids
            .iter()
            .map(|(_, id)| id.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/simple/price", self.base_url);

        let body = get_json(
            &self.client,
            &url,
            &[("ids", id_list), ("vs_currencies", "usd".to_string())],
            "coingecko simple/price",
        )
        .await?;

        let prices = parse_prices(&body, ids);
        if prices.len() < ids.len() {
            warn!(
                requested = ids.len(),
                received = prices.len(),
                "coingecko returned fewer prices than requested"
            );
        }
        debug!(count = prices.len(), "coingecko prices fetched");
        Ok(prices)
    }

    /// Fetch one symbol's USD price.
    pub async fn get_price(&self, symbol: &str, id: &str) -> Result<Option<f64>> {
        let ids = [(symbol.to_uppercase(), id.to_string())];
        Ok(self.get_prices(&ids).await?.remove(&symbol.to_uppercase()))
    }
}

/// Map a `{"<id>": {"usd": <price>}}` body back to symbols.
pub fn parse_prices(body: &Value, ids: &[(String, String)]) -> BTreeMap<String, f64> {
    ids.iter()
        .filter_map(|(symbol, id)| {
            body.get(id.as_str())
                .and_then(|entry| entry.get("usd"))
                .and_then(Value::as_f64)
                .filter(|p| p.is_finite())
                .map(|p| (symbol.to_uppercase(), p))
        })
        .collect()
}
