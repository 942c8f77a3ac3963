// =============================================================================
// Heat Score Aggregator
// =============================================================================
//
// Each basket earns a fixed number of points per sub-signal that fires:
//
//   price    average change of the basket's tokens over `price_lookback` rows
//            >= price_threshold
//   funding  any member token's funding rate >= funding_threshold
//   tvl      average change of the basket's mapped chains over `tvl_lookback`
//            rows >= tvl_threshold
//
// Boundaries are inclusive.  A sub-signal never contributes a partial value.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::SnapshotTable;
use crate::runtime_config::ScoreConfig;
use crate::types::{Baskets, SignalKind};

/// Outcome of one sub-signal for one basket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalContribution {
    pub signal: SignalKind,
    /// Measured value: average fractional change for price/tvl, highest member
    /// rate for funding. `None` when there was nothing to measure.
    pub value: Option<f64>,
    pub threshold: f64,
    pub fired: bool,
    pub points: u32,
}

/// Heat score of a single basket with its per-signal breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketScore {
    pub basket: String,
    pub score: u32,
    pub max_score: u32,
    pub contributions: Vec<SignalContribution>,
}

impl BasketScore {
    fn empty(basket: &str, max_score: u32) -> Self {
        Self {
            basket: basket.to_string(),
            score: 0,
            max_score,
            contributions: Vec::new(),
        }
    }

    fn add(&mut self, signal: SignalKind, value: Option<f64>, threshold: f64, points_per_signal: u32) {
        let fired = value.is_some_and(|v| v >= threshold);
        let points = if fired { points_per_signal } else { 0 };
        self.score += points;
        self.contributions.push(SignalContribution {
            signal,
            value,
            threshold,
            fired,
            points,
        });
    }
}

/// Compute the heat score of every basket.
///
/// This function is **fail-open**: it never returns an error and always
/// yields an entry for every basket. Missing data of any kind (history
/// shorter than the lookback, tokens absent from the history, empty cells, a
/// basket with no protocol mapping, tokens without a funding reading)
/// silently makes the affected sub-signal contribute zero. Under-reporting a
/// basket is preferred over blocking the alert pipeline.
///
/// `funding` holds the per-token funding rate as a raw decimal; absent tokens
/// count as having no reading.
pub fn calc_scores(
    baskets: &Baskets,
    prices: &SnapshotTable,
    tvl: &SnapshotTable,
    funding: &HashMap<String, f64>,
    cfg: &ScoreConfig,
) -> BTreeMap<String, BasketScore> {
    let max_score = cfg.max_score();
    let mut scores = BTreeMap::new();

    for (basket, members) in baskets.iter() {
        let mut result = BasketScore::empty(basket, max_score);

        if cfg.enable_price {
            let change = average_change(prices, members, cfg.price_lookback);
            result.add(SignalKind::Price, change, cfg.price_threshold, cfg.points_per_signal);
        }

        if cfg.enable_funding {
            let top_rate = members
                .iter()
                .filter_map(|t| funding.get(t).copied())
                .filter(|r| r.is_finite())
                .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));
            result.add(SignalKind::Funding, top_rate, cfg.funding_threshold, cfg.points_per_signal);
        }

        if cfg.enable_tvl {
            let change = cfg
                .basket_protocols
                .get(basket)
                .and_then(|protocols| average_change(tvl, protocols, cfg.tvl_lookback));
            result.add(SignalKind::Tvl, change, cfg.tvl_threshold, cfg.points_per_signal);
        }

        debug!(
            basket = %basket,
            score = result.score,
            max_score,
            "basket scored"
        );
        scores.insert(basket.clone(), result);
    }

    scores
}

/// Mean fractional change over the columns of `table` that exist and have
/// usable values on both compared rows.
fn average_change(table: &SnapshotTable, columns: &[String], lookback: usize) -> Option<f64> {
    let changes: Vec<f64> = columns
        .iter()
        .filter_map(|c| table.pct_change(c, lookback))
        .collect();
    if changes.is_empty() {
        return None;
    }
    Some(changes.iter().sum::<f64>() / changes.len() as f64)
}

/// Basket -> score, dropping the breakdown.
pub fn score_values(scores: &BTreeMap<String, BasketScore>) -> BTreeMap<String, u32> {
    scores.iter().map(|(k, v)| (k.clone(), v.score)).collect()
}
