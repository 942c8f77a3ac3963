// =============================================================================
// Dashboard State
// =============================================================================
//
// Shared by every dashboard request via `Arc<AppState>`.  Scores are always
// recomputed from the history files; only funding readings are cached, since
// each refresh costs two HTTP calls per basket token.
//
// Thread safety:
//   - parking_lot::RwLock around the funding cache; the lock is never held
//     across an await.
// =============================================================================

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::bias_tracker::BiasData;
use crate::futures_intel::FundingRateMonitor;
use crate::runtime_config::HeatConfig;
use crate::scoring::{score_from_history, BasketScore};
use crate::types::Baskets;

struct FundingCache {
    fetched_at: Instant,
    rates: HashMap<String, f64>,
}

/// Payload of `GET /api/v1/scores`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreSnapshot {
    pub generated_at: String,
    pub alert_threshold: u32,
    pub max_score: u32,
    pub baskets: Vec<BasketScore>,
}

pub struct AppState {
    pub config: HeatConfig,
    pub baskets: Baskets,
    funding: FundingRateMonitor,
    funding_cache: RwLock<Option<FundingCache>>,
}

impl AppState {
    pub fn new(config: HeatConfig, baskets: Baskets, funding: FundingRateMonitor) -> Self {
        Self {
            config,
            baskets,
            funding,
            funding_cache: RwLock::new(None),
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.funding_cache_secs)
    }

    /// Pre-load the funding cache.
    pub fn seed_funding(&self, rates: HashMap<String, f64>) {
        *self.funding_cache.write() = Some(FundingCache {
            fetched_at: Instant::now(),
            rates,
        });
    }

    /// Funding rates for every basket token, served from cache while fresh.
    pub async fn funding_rates(&self) -> HashMap<String, f64> {
        if !self.config.score.enable_funding {
            return HashMap::new();
        }

        {
            let cache = self.funding_cache.read();
            if let Some(c) = cache.as_ref() {
                if c.fetched_at.elapsed() < self.cache_ttl() {
                    return c.rates.clone();
                }
            }
        }

        debug!("funding cache stale, refreshing");
        let tokens = self.baskets.all_tokens();
        let rates = self.funding.fetch_many(tokens.iter()).await;
        self.seed_funding(rates.clone());
        rates
    }

    pub async fn build_score_snapshot(&self) -> ScoreSnapshot {
        let funding = self.funding_rates().await;
        let scores: BTreeMap<String, BasketScore> =
            score_from_history(&self.config, &self.baskets, &funding);

        ScoreSnapshot {
            generated_at: Utc::now().to_rfc3339(),
            alert_threshold: self.config.alert_threshold,
            max_score: self.config.score.max_score(),
            baskets: scores.into_values().collect(),
        }
    }

    /// Journal entries of the last seven days; an unreadable journal is an
    /// error for the caller to report.
    pub fn weekly_bias(&self) -> anyhow::Result<BiasData> {
        Ok(BiasData::read(&self.config.bias_path)?.weekly_summary(Utc::now()))
    }
}
