// =============================================================================
// Scoring Module
// =============================================================================
//
// Turns the snapshot history plus live funding readings into one bounded
// integer "heat score" per basket.  `score_from_history` is the entry point
// used by the CLI and the dashboard; it reads the history files and hands the
// tables to the pure aggregator.

pub mod heat_score;

pub use heat_score::{calc_scores, score_values, BasketScore};

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::history::SnapshotTable;
use crate::runtime_config::HeatConfig;
use crate::types::Baskets;

/// Load both history files and score every basket.
///
/// A history file that cannot be read is logged and treated as empty, so the
/// affected sub-signals score zero.
pub fn score_from_history(
    config: &HeatConfig,
    baskets: &Baskets,
    funding: &HashMap<String, f64>,
) -> BTreeMap<String, BasketScore> {
    let prices = load_or_empty(&config.prices_path);
    let tvl = if config.score.enable_tvl {
        load_or_empty(&config.tvl_path)
    } else {
        SnapshotTable::default()
    };
    calc_scores(baskets, &prices, &tvl, funding, &config.score)
}

fn load_or_empty(path: &std::path::Path) -> SnapshotTable {
    SnapshotTable::load(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "history unreadable, scoring without it");
        SnapshotTable::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::history::append_snapshot;

    #[test]
    fn scores_from_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = HeatConfig {
            prices_path: dir.path().join("prices.csv"),
            tvl_path: dir.path().join("tvl.csv"),
            ..HeatConfig::default()
        };
        let baskets = Baskets::from_yaml("AI: [FET]\nL1: [SOL]\n").unwrap();
        let columns = vec!["FET".to_string(), "SOL".to_string()];

        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        for i in 0..8u32 {
            let mut row = BTreeMap::new();
            row.insert("FET".to_string(), 1.0 + i as f64 * 0.1);
            row.insert("SOL".to_string(), 100.0);
            let date = start + chrono::Duration::days(i as i64);
            append_snapshot(&config.prices_path, date, &columns, &row).unwrap();
        }

        let scores = score_from_history(&config, &baskets, &HashMap::new());
        // FET: 1.0 -> 1.7 = +70 %
        assert_eq!(scores["AI"].score, 2);
        assert_eq!(scores["L1"].score, 0);
    }

    #[test]
    fn unreadable_history_scores_zero() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where a file is expected cannot be read as CSV.
        let config = HeatConfig {
            prices_path: dir.path().to_path_buf(),
            tvl_path: dir.path().join("missing.csv"),
            ..HeatConfig::default()
        };
        let baskets = Baskets::from_yaml("AI: [FET]\n").unwrap();
        let scores = score_from_history(&config, &baskets, &HashMap::new());
        assert_eq!(scores["AI"].score, 0);
    }
}
