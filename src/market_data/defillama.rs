// =============================================================================
// DefiLlama — chain / protocol TVL
// =============================================================================

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::get_json;

const BASE_URL: &str = "https://api.llama.fi";

#[derive(Debug, Clone)]
pub struct DefiLlamaClient {
    client: reqwest::Client,
    base_url: String,
}

impl DefiLlamaClient {
    pub fn with_client(client: reqwest::Client) -> Self {
        Self::with_base_url(client, BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// GET /tvl/{protocol} — current TVL in USD.
    #[instrument(skip(self), name = "defillama::get_tvl")]
    pub async fn get_tvl(&self, protocol: &str) -> Result<f64> {
        let url = format!("{}/tvl/{}", self.base_url, protocol.to_lowercase());
        let body = get_json(&self.client, &url, &[], "defillama tvl").await?;
        let tvl = parse_tvl(&body).with_context(|| format!("bad TVL body for {protocol}"))?;
        debug!(protocol, tvl, "tvl fetched");
        Ok(tvl)
    }

    /// TVL for every protocol in `protocols`. Failed reads are logged and left
    /// out of the result.
    pub async fn snapshot(&self, protocols: &[String]) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for protocol in protocols {
            match self.get_tvl(protocol).await {
                Ok(tvl) => {
                    out.insert(protocol.clone(), tvl);
                }
                Err(e) => warn!(protocol = %protocol, error = %e, "tvl fetch failed, leaving cell empty"),
            }
        }
        out
    }
}

/// The endpoint answers with a bare JSON number.
pub fn parse_tvl(body: &Value) -> Result<f64> {
    let tvl = super::parse_str_f64(body)?;
    if !tvl.is_finite() || tvl < 0.0 {
        anyhow::bail!("implausible TVL value {tvl}");
    }
    Ok(tvl)
}
