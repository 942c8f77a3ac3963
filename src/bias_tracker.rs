// =============================================================================
// Bias Tracker — daily directional bias and setup scores per token
// =============================================================================
//
// A small JSON journal where the trader records, per day and token, a
// directional bias ("bullish", "bearish", ...) and a setup quality score.
// The weekly summary is posted to Telegram on demand.
//
// File layout:
//
//   {
//     "biases":       { "2024-06-03": { "BTC": { "bias": "bullish", ... } } },
//     "setup_scores": { "2024-06-03": { "BTC": { "score": 7.0, ... } } }
//   }
//
// The file is rewritten after every mutation using an atomic tmp + rename.
// =============================================================================

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Length of the summary window.
const SUMMARY_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasEntry {
    pub bias: String,
    pub user_id: String,
    /// RFC 3339 time the entry was recorded.
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupEntry {
    pub score: f64,
    pub user_id: String,
    pub timestamp: String,
}

/// date -> token -> entry
pub type DailyEntries<T> = BTreeMap<String, BTreeMap<String, T>>;

/// The whole journal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BiasData {
    #[serde(default)]
    pub biases: DailyEntries<BiasEntry>,
    #[serde(default)]
    pub setup_scores: DailyEntries<SetupEntry>,
}

impl BiasData {
    /// Read the journal without creating it; a missing file is empty.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bias journal {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse bias journal {}", path.display()))
    }

    /// Entries dated within the last seven days of `now`: a date is kept when
    /// its midnight (UTC) is not earlier than `now - 7 days`.
    pub fn weekly_summary(&self, now: DateTime<Utc>) -> BiasData {
        let cutoff = now - Duration::days(SUMMARY_DAYS);
        BiasData {
            biases: within(&self.biases, cutoff),
            setup_scores: within(&self.setup_scores, cutoff),
        }
    }
}

fn within<T: Clone>(entries: &DailyEntries<T>, cutoff: DateTime<Utc>) -> DailyEntries<T> {
    entries
        .iter()
        .filter(|(date, _)| match NaiveDate::parse_from_str(date, DATE_FORMAT) {
            Ok(d) => d
                .and_hms_opt(0, 0, 0)
                .is_some_and(|midnight| midnight.and_utc() >= cutoff),
            Err(_) => {
                warn!(date = %date, "ignoring journal entry with unparseable date");
                false
            }
        })
        .map(|(date, tokens)| (date.clone(), tokens.clone()))
        .collect()
}

/// Render a weekly summary as Telegram Markdown.
pub fn format_summary(summary: &BiasData) -> String {
    let mut message = String::from("*Weekly Bias & Setup Score Summary*\n\n");

    message.push_str("*Biases:*\n");
    for (date, tokens) in &summary.biases {
        message.push_str(&format!("\n{date}:\n"));
        for (token, entry) in tokens {
            message.push_str(&format!("{token}: {}\n", entry.bias));
        }
    }

    message.push_str("\n*Setup Scores:*\n");
    for (date, tokens) in &summary.setup_scores {
        message.push_str(&format!("\n{date}:\n"));
        for (token, entry) in tokens {
            message.push_str(&format!("{token}: {}\n", entry.score));
        }
    }

    message
}

/// Journal bound to a file.
#[derive(Debug)]
pub struct BiasTracker {
    path: PathBuf,
    data: BiasData,
}

impl BiasTracker {
    /// Open the journal at `path`, creating an empty one if it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let exists = path.exists();
        let tracker = Self {
            data: BiasData::read(&path)?,
            path,
        };
        if !exists {
            tracker.save()?;
            info!(path = %tracker.path.display(), "bias journal initialised");
        }
        Ok(tracker)
    }

    #[cfg(test)]
    pub fn data(&self) -> &BiasData {
        &self.data
    }

    /// Record `bias` for `token` on `now`'s date, replacing any earlier entry
    /// for the same day and token.
    pub fn add_bias(&mut self, token: &str, bias: &str, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let entry = BiasEntry {
            bias: bias.to_string(),
            user_id: user_id.to_string(),
            timestamp: now.to_rfc3339(),
        };
        self.data
            .biases
            .entry(day_key(now))
            .or_default()
            .insert(token.to_uppercase(), entry);
        debug!(token, bias, user_id, "bias recorded");
        self.save()
    }

    /// Record a setup score for `token` on `now`'s date.
    pub fn add_setup_score(&mut self, token: &str, score: f64, user_id: &str, now: DateTime<Utc>) -> Result<()> {
        let entry = SetupEntry {
            score,
            user_id: user_id.to_string(),
            timestamp: now.to_rfc3339(),
        };
        self.data
            .setup_scores
            .entry(day_key(now))
            .or_default()
            .insert(token.to_uppercase(), entry);
        debug!(token, score, user_id, "setup score recorded");
        self.save()
    }

    pub fn weekly_summary(&self, now: DateTime<Utc>) -> BiasData {
        self.data.weekly_summary(now)
    }

    pub fn format_weekly_summary(&self, now: DateTime<Utc>) -> String {
        format_summary(&self.weekly_summary(now))
    }

    /// Atomic write: tmp sibling, then rename.
    fn save(&self) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.data)
            .context("failed to serialise bias journal")?;
        let tmp_path = self.path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp journal to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp journal to {}", self.path.display()))?;
        Ok(())
    }
}

fn day_key(now: DateTime<Utc>) -> String {
    now.date_naive().format(DATE_FORMAT).to_string()
}
