// =============================================================================
// Alert Pipeline — snapshot, score, notify
// =============================================================================
//
// One run per day (cron):
//
//   1. append today's prices (all basket tokens) to the price history
//   2. append today's TVL (configured chains) to the TVL history
//   3. read funding for every basket token
//   4. score every basket from the full history
//   5. send one line per basket whose score reaches the alert threshold
//
// Steps 1-4 are fail-open.  Step 5 is the only one whose failure ends the run
// with an error.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::history::append_snapshot;
use crate::market_data::MarketClients;
use crate::notify::TelegramNotifier;
use crate::runtime_config::HeatConfig;
use crate::scoring::{score_from_history, score_values, BasketScore};
use crate::types::Baskets;

/// Fetch and append today's price and TVL rows.
///
/// Fetch failures are logged, not returned. A source that produced no values
/// at all appends nothing, so a fully failed fetch never inserts an empty row
/// into the lookback window. A failed write to one history file does not stop
/// the other; the first write error is returned once both have been tried.
pub async fn take_snapshots(
    config: &HeatConfig,
    baskets: &Baskets,
    clients: &MarketClients,
    today: NaiveDate,
) -> Result<()> {
    let tokens: Vec<String> = baskets.all_tokens().into_iter().collect();
    let ids: Vec<(String, String)> = tokens
        .iter()
        .map(|t| (t.clone(), config.coingecko_id(t)))
        .collect();

    let mut first_error: Option<anyhow::Error> = None;

    let prices = clients.coingecko.get_prices(&ids).await.unwrap_or_else(|e| {
        warn!(error = %e, "price fetch failed");
        BTreeMap::new()
    });
    if prices.is_empty() {
        warn!(path = %config.prices_path.display(), "no prices fetched, price snapshot skipped");
    } else {
        match append_snapshot(&config.prices_path, today, &tokens, &prices) {
            Ok(()) => info!(tokens = prices.len(), %today, "price snapshot saved"),
            Err(e) => {
                error!(error = %e, "price snapshot not saved");
                first_error = Some(e);
            }
        }
    }

    if !config.tvl_chains.is_empty() {
        let tvl = clients.defillama.snapshot(&config.tvl_chains).await;
        if tvl.is_empty() {
            warn!(path = %config.tvl_path.display(), "no TVL fetched, TVL snapshot skipped");
        } else {
            match append_snapshot(&config.tvl_path, today, &config.tvl_chains, &tvl) {
                Ok(()) => info!(chains = tvl.len(), %today, "tvl snapshot saved"),
                Err(e) => {
                    error!(error = %e, "tvl snapshot not saved");
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Funding for every basket token, or nothing when the funding signal is off.
pub async fn fetch_funding(
    config: &HeatConfig,
    baskets: &Baskets,
    clients: &MarketClients,
) -> HashMap<String, f64> {
    if !config.score.enable_funding {
        return HashMap::new();
    }
    let tokens = baskets.all_tokens();
    clients.funding.fetch_many(tokens.iter()).await
}

/// One line per basket at or above `threshold`.
pub fn alert_lines(scores: &BTreeMap<String, BasketScore>, threshold: u32) -> Vec<String> {
    scores
        .values()
        .filter(|s| s.score >= threshold)
        .map(|s| {
            format!(
                "🔥 {} basket heating up (score {}/{}) – good time to consider trimming!",
                s.basket, s.score, s.max_score
            )
        })
        .collect()
}

/// What an alert run produced.
#[derive(Debug, Clone)]
pub struct AlertOutcome {
    pub scores: BTreeMap<String, BasketScore>,
    pub lines: Vec<String>,
    pub delivered: bool,
}

/// Full alert run. With `notifier == None` the message is only logged.
pub async fn run_alert(
    config: &HeatConfig,
    baskets: &Baskets,
    clients: &MarketClients,
    notifier: Option<&TelegramNotifier>,
    today: NaiveDate,
) -> Result<AlertOutcome> {
    if let Err(e) = take_snapshots(config, baskets, clients, today).await {
        warn!(error = %e, "snapshot failed, scoring existing history");
    }

    let funding = fetch_funding(config, baskets, clients).await;
    let scores = score_from_history(config, baskets, &funding);
    info!(scores = ?score_values(&scores), "heat scores");

    let lines = alert_lines(&scores, config.alert_threshold);
    let mut delivered = false;

    match notifier {
        Some(n) => {
            if !lines.is_empty() {
                n.send_message(&lines.join("\n"), None).await?;
                delivered = true;
            }
            if config.send_heartbeat {
                n.send_message("✅ sector-heat alert run completed.", None).await?;
            }
        }
        None => {
            for line in &lines {
                info!(line = %line, "dry run, alert not sent");
            }
        }
    }

    info!(hot = lines.len(), delivered, "alert run finished");
    Ok(AlertOutcome {
        scores,
        lines,
        delivered,
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post},
        Json, Router,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    use crate::binance::BinanceClient;
    use crate::futures_intel::FundingRateMonitor;
    use crate::history::SnapshotTable;
    use crate::market_data::{CoinGeckoClient, DefiLlamaClient};
    use crate::runtime_config::ScoreConfig;
    use crate::scoring::calc_scores;

    fn score(basket: &str, score: u32) -> BasketScore {
        BasketScore {
            basket: basket.to_string(),
            score,
            max_score: 6,
            contributions: Vec::new(),
        }
    }

    // ── Local stand-in for CoinGecko, DefiLlama, the funding venues and
    //    the Bot API ─────────────────────────────────────────────────────────

    #[derive(Default)]
    struct Upstream {
        prices: Value,
        tvl: BTreeMap<String, f64>,
        funding: f64,
        sent: Mutex<Vec<String>>,
    }

    async fn simple_price(State(up): State<Arc<Upstream>>) -> Json<Value> {
        Json(up.prices.clone())
    }

    async fn tvl(State(up): State<Arc<Upstream>>, Path(protocol): Path<String>) -> impl IntoResponse {
        match up.tvl.get(&protocol) {
            Some(v) => (StatusCode::OK, Json(json!(v))),
            None => (StatusCode::BAD_REQUEST, Json(json!({ "message": "protocol not found" }))),
        }
    }

    async fn binance_funding(State(up): State<Arc<Upstream>>) -> Json<Value> {
        Json(json!([{ "fundingRate": up.funding.to_string() }]))
    }

    async fn bybit_funding(State(up): State<Arc<Upstream>>) -> Json<Value> {
        Json(json!({ "retCode": 0, "result": { "list": [{ "fundingRate": up.funding.to_string() }] } }))
    }

    async fn send_message(State(up): State<Arc<Upstream>>, Json(body): Json<Value>) -> Json<Value> {
        up.sent.lock().push(body["text"].as_str().unwrap_or_default().to_string());
        Json(json!({ "ok": true, "result": {} }))
    }

    /// Serve `up` on a random local port and return the base URL.
    async fn serve(up: Arc<Upstream>) -> String {
        let app = Router::new()
            .route("/cg/simple/price", get(simple_price))
            .route("/llama/tvl/:protocol", get(tvl))
            .route("/fapi/v1/fundingRate", get(binance_funding))
            .route("/v5/market/funding/history", get(bybit_funding))
            .route("/tg/:bot/sendMessage", post(send_message))
            .with_state(up);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        base
    }

    fn clients(base: &str) -> MarketClients {
        let http = reqwest::Client::new();
        MarketClients {
            coingecko: CoinGeckoClient::with_base_url(http.clone(), format!("{base}/cg")),
            defillama: DefiLlamaClient::with_base_url(http.clone(), format!("{base}/llama")),
            binance: BinanceClient::with_base_url(http.clone(), base),
            funding: FundingRateMonitor::with_base_urls(http, base, base),
        }
    }

    fn notifier(base: &str) -> TelegramNotifier {
        TelegramNotifier::new("T", "42", reqwest::Client::new()).with_base_url(format!("{base}/tg"))
    }

    fn config_in(dir: &std::path::Path) -> HeatConfig {
        let mut config = HeatConfig {
            prices_path: dir.join("prices.csv"),
            tvl_path: dir.join("tvl.csv"),
            tvl_chains: vec!["solana".to_string(), "near".to_string()],
            ..HeatConfig::default()
        };
        config.score.enable_funding = false;
        config
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    // ── Snapshots ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_fetch_appends_no_row() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let base = serve(Arc::new(Upstream {
            prices: json!({}),
            ..Upstream::default()
        }))
        .await;
        let baskets = Baskets::from_yaml("AI: [FET, TAO]\n").unwrap();

        take_snapshots(&config, &baskets, &clients(&base), today()).await.unwrap();

        assert!(!config.prices_path.exists());
        assert!(!config.tvl_path.exists());
    }

    #[tokio::test]
    async fn partial_fetch_leaves_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let mut tvl = BTreeMap::new();
        tvl.insert("solana".to_string(), 4_500_000_000.0);
        let base = serve(Arc::new(Upstream {
            prices: json!({ "fetch-ai": { "usd": 1.5 } }),
            tvl,
            ..Upstream::default()
        }))
        .await;
        let baskets = Baskets::from_yaml("AI: [FET, TAO]\n").unwrap();

        take_snapshots(&config, &baskets, &clients(&base), today()).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&config.prices_path).unwrap(),
            "date,FET,TAO\n2024-06-03,1.5,\n"
        );
        assert_eq!(
            std::fs::read_to_string(&config.tvl_path).unwrap(),
            "date,solana,near\n2024-06-03,4500000000,\n"
        );
    }

    #[tokio::test]
    async fn failed_price_write_still_saves_tvl() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        // A directory cannot be appended to.
        config.prices_path = dir.path().to_path_buf();
        let mut tvl = BTreeMap::new();
        tvl.insert("near".to_string(), 250.0);
        let base = serve(Arc::new(Upstream {
            prices: json!({ "fetch-ai": { "usd": 1.5 } }),
            tvl,
            ..Upstream::default()
        }))
        .await;
        let baskets = Baskets::from_yaml("AI: [FET]\n").unwrap();

        let result = take_snapshots(&config, &baskets, &clients(&base), today()).await;

        assert!(result.is_err());
        assert_eq!(
            std::fs::read_to_string(&config.tvl_path).unwrap(),
            "date,solana,near\n2024-06-03,,250\n"
        );
    }

    // ── Alert lines and delivery ────────────────────────────────────────────

    #[test]
    fn only_baskets_at_threshold_alert() {
        let mut scores = BTreeMap::new();
        scores.insert("AI".to_string(), score("AI", 4));
        scores.insert("L1".to_string(), score("L1", 2));
        scores.insert("RWA".to_string(), score("RWA", 6));

        let lines = alert_lines(&scores, 4);
        assert_eq!(
            lines,
            vec![
                "🔥 AI basket heating up (score 4/6) – good time to consider trimming!",
                "🔥 RWA basket heating up (score 6/6) – good time to consider trimming!",
            ]
        );
    }

    #[test]
    fn cold_history_produces_no_alert() {
        let baskets = Baskets::from_yaml("AI: [FET]\n").unwrap();
        let scores = calc_scores(
            &baskets,
            &SnapshotTable::default(),
            &SnapshotTable::default(),
            &HashMap::new(),
            &ScoreConfig::default(),
        );
        assert!(alert_lines(&scores, 4).is_empty());
    }

    #[tokio::test]
    async fn cold_run_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let up = Arc::new(Upstream {
            prices: json!({ "fetch-ai": { "usd": 1.5 } }),
            ..Upstream::default()
        });
        let base = serve(up.clone()).await;
        let baskets = Baskets::from_yaml("AI: [FET]\n").unwrap();

        let outcome = run_alert(&config, &baskets, &clients(&base), Some(&notifier(&base)), today())
            .await
            .unwrap();

        assert!(outcome.lines.is_empty());
        assert!(!outcome.delivered);
        assert!(up.sent.lock().is_empty());
        // The snapshot still ran.
        assert!(config.prices_path.exists());
    }

    #[tokio::test]
    async fn heartbeat_only_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.send_heartbeat = true;
        let up = Arc::new(Upstream {
            prices: json!({}),
            ..Upstream::default()
        });
        let base = serve(up.clone()).await;
        let baskets = Baskets::from_yaml("AI: [FET]\n").unwrap();

        let outcome = run_alert(&config, &baskets, &clients(&base), Some(&notifier(&base)), today())
            .await
            .unwrap();

        assert!(!outcome.delivered);
        assert_eq!(*up.sent.lock(), vec!["✅ sector-heat alert run completed.".to_string()]);
    }

    #[tokio::test]
    async fn hot_basket_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.score.enable_funding = true;
        config.alert_threshold = 2;
        let up = Arc::new(Upstream {
            prices: json!({}),
            funding: 0.002,
            ..Upstream::default()
        });
        let base = serve(up.clone()).await;
        let baskets = Baskets::from_yaml("AI: [FET]\n").unwrap();

        let outcome = run_alert(&config, &baskets, &clients(&base), Some(&notifier(&base)), today())
            .await
            .unwrap();

        assert!(outcome.delivered);
        assert_eq!(outcome.scores["AI"].score, 2);
        assert_eq!(
            *up.sent.lock(),
            vec!["🔥 AI basket heating up (score 2/6) – good time to consider trimming!".to_string()]
        );
    }

    #[tokio::test]
    async fn dry_run_sends_nothing_even_when_hot() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.score.enable_funding = true;
        config.alert_threshold = 2;
        config.send_heartbeat = true;
        let up = Arc::new(Upstream {
            prices: json!({}),
            funding: 0.002,
            ..Upstream::default()
        });
        let base = serve(up.clone()).await;
        let baskets = Baskets::from_yaml("AI: [FET]\n").unwrap();

        let outcome = run_alert(&config, &baskets, &clients(&base), None, today()).await.unwrap();

        assert_eq!(outcome.lines.len(), 1);
        assert!(!outcome.delivered);
        assert!(up.sent.lock().is_empty());
    }
}
