// =============================================================================
// London Prep Report
// =============================================================================
//
// Sent shortly before the London open (cron at 06:25 UTC).  For each
// configured token it lists:
//
//   - the Asia session range (00:00-07:00 UTC today, 15m candles, clipped to
//     the last completed hour)
//   - the previous UTC day's VWAP (1h candles)
//   - the combined Binance/Bybit funding rate
//   - a naive setup derived from VWAP vs. the Asia range
//
// Tokens without a Binance spot pair show the CoinGecko spot price instead.
// Any per-token failure degrades that token's line to a warning marker; it
// never aborts the report.
// =============================================================================

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use tracing::{info, warn};

use crate::indicators::{session_range, vwap, SessionRange};
use crate::market_data::MarketClients;
use crate::runtime_config::HeatConfig;
use crate::setup::{naive_setup, TradeSetup};

/// Asia session length from 00:00 UTC.
const ASIA_SESSION_HOURS: i64 = 7;

/// What could be assembled for one token.
#[derive(Debug, Clone, PartialEq)]
pub enum PrepStatus {
    Ready {
        range: SessionRange,
        vwap: f64,
        funding: f64,
        setup: Option<TradeSetup>,
    },
    NoSpotPair {
        spot: Option<f64>,
        funding: f64,
    },
    SessionNotStarted,
    RangeUnavailable,
    VwapMissing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrepLine {
    pub token: String,
    pub status: PrepStatus,
}

/// `[00:00, min(07:00, current hour))` of `now`'s UTC day, or `None` before
/// the first hour has completed.
pub fn asia_window(now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let day_start = now.date_naive().and_hms_opt(0, 0, 0)?.and_utc();
    let session_end = day_start + Duration::hours(ASIA_SESSION_HOURS);
    let current_hour = day_start + Duration::hours(i64::from(now.hour()));
    let end = session_end.min(current_hour);
    (end > day_start).then_some((day_start, end))
}

/// The full UTC day before `now`.
pub fn previous_day_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);
    (day_start - Duration::days(1), day_start)
}

/// Assemble one token's line.
pub async fn prep_token(
    config: &HeatConfig,
    clients: &MarketClients,
    token: &str,
    now: DateTime<Utc>,
) -> PrepLine {
    let token = token.to_uppercase();
    let line = |status| PrepLine {
        token: token.clone(),
        status,
    };

    let funding = clients.funding.fetch(&token).await.rate;

    let Some(pair) = config.binance_pair(&token) else {
        let spot = clients
            .coingecko
            .get_price(&token, &config.coingecko_id(&token))
            .await
            .unwrap_or_else(|e| {
                warn!(token = %token, error = %e, "coingecko spot fallback failed");
                None
            });
        return line(PrepStatus::NoSpotPair { spot, funding });
    };

    let Some((start, end)) = asia_window(now) else {
        return line(PrepStatus::SessionNotStarted);
    };

    let range = match clients.binance.get_klines_range(&pair, "15m", start, end).await {
        Ok(candles) => session_range(&candles),
        Err(e) => {
            warn!(token = %token, pair = %pair, error = %e, "asia range unavailable");
            None
        }
    };
    let Some(range) = range else {
        return line(PrepStatus::RangeUnavailable);
    };

    let (day_start, day_end) = previous_day_window(now);
    let day_vwap = match clients.binance.get_klines_range(&pair, "1h", day_start, day_end).await {
        Ok(candles) => vwap(&candles),
        Err(e) => {
            warn!(token = %token, pair = %pair, error = %e, "previous-day klines unavailable");
            None
        }
    };
    let Some(day_vwap) = day_vwap else {
        return line(PrepStatus::VwapMissing);
    };

    line(PrepStatus::Ready {
        range,
        vwap: day_vwap,
        funding,
        setup: naive_setup(range, day_vwap),
    })
}

/// Every configured token, in order.
pub async fn collect(config: &HeatConfig, clients: &MarketClients, now: DateTime<Utc>) -> Vec<PrepLine> {
    let mut lines = Vec::with_capacity(config.prep_tokens.len());
    for token in &config.prep_tokens {
        lines.push(prep_token(config, clients, token, now).await);
    }
    info!(tokens = lines.len(), "prep data collected");
    lines
}

/// Render the Markdown report.
pub fn format_report(date: NaiveDate, lines: &[PrepLine], funding_threshold: f64) -> String {
    let mut out = vec![format!("*London prep*  {} 06:30 UTC", date.format("%Y-%m-%d"))];

    for PrepLine { token, status } in lines {
        match status {
            PrepStatus::Ready {
                range,
                vwap,
                funding,
                setup,
            } => {
                let mut text = format!(
                    "`{token}`  Asia {}–{} · VWAP {} · Funding {:.2}%",
                    fmt_price(range.low),
                    fmt_price(range.high),
                    fmt_price(*vwap),
                    funding * 100.0
                );
                if *funding >= funding_threshold {
                    text.push_str(" · crowded longs");
                }
                out.push(text);
                if let Some(s) = setup {
                    let mut text = format!(
                        "    ↳ {} entry {} · SL {} · TP {}",
                        s.bias,
                        fmt_price(s.entry),
                        fmt_price(s.stop),
                        fmt_price(s.target)
                    );
                    if let Some(rr) = s.reward_risk() {
                        text.push_str(&format!(" · R:R {rr:.1}"));
                    }
                    out.push(text);
                }
            }
            PrepStatus::NoSpotPair { spot, funding } => match spot {
                Some(p) => out.push(format!(
                    "`{token}`  ⚠️ no Binance spot pair · spot {} · Funding {:.2}%",
                    fmt_price(*p),
                    funding * 100.0
                )),
                None => out.push(format!("`{token}`  ⚠️ no Binance spot pair, spot price unavailable")),
            },
            PrepStatus::SessionNotStarted => out.push(format!("`{token}`  ⚠️ Asia session not started")),
            PrepStatus::RangeUnavailable => out.push(format!("`{token}`  ⚠️ pair missing or API error")),
            PrepStatus::VwapMissing => out.push(format!("`{token}`  ⚠️ VWAP missing")),
        }
    }

    out.join("\n")
}

/// Price with precision scaled to magnitude.
pub fn fmt_price(p: f64) -> String {
    let abs = p.abs();
    if abs >= 100.0 {
        format!("{p:.1}")
    } else if abs >= 1.0 {
        format!("{p:.3}")
    } else {
        format!("{p:.5}")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::setup::SetupBias;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, m, 0).unwrap()
    }

    #[test]
    fn asia_window_at_prep_time() {
        let (start, end) = asia_window(at(6, 25)).unwrap();
        assert_eq!(start, at(0, 0));
        assert_eq!(end, at(6, 0));
    }

    #[test]
    fn asia_window_caps_at_seven() {
        let (_, end) = asia_window(at(15, 10)).unwrap();
        assert_eq!(end, at(7, 0));
    }

    #[test]
    fn asia_window_empty_before_one_am() {
        assert!(asia_window(at(0, 40)).is_none());
    }

    #[test]
    fn previous_day_is_full_utc_day() {
        let (start, end) = previous_day_window(at(6, 25));
        assert_eq!(end, at(0, 0));
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn price_precision_scales() {
        assert_eq!(fmt_price(67123.456), "67123.5");
        assert_eq!(fmt_price(1.23456), "1.235");
        assert_eq!(fmt_price(0.0123456), "0.01235");
    }

    #[test]
    fn report_formats_every_status() {
        let range = SessionRange {
            high: 110.0,
            low: 100.0,
        };
        let lines = vec![
            PrepLine {
                token: "BTC".into(),
                status: PrepStatus::Ready {
                    range,
                    vwap: 112.0,
                    funding: 0.0001,
                    setup: naive_setup(range, 112.0),
                },
            },
            PrepLine {
                token: "TAO".into(),
                status: PrepStatus::NoSpotPair {
                    spot: Some(420.0),
                    funding: 0.0015,
                },
            },
            PrepLine {
                token: "XYZ".into(),
                status: PrepStatus::RangeUnavailable,
            },
            PrepLine {
                token: "ETH".into(),
                status: PrepStatus::VwapMissing,
            },
        ];
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let text = format_report(date, &lines, 0.0012);
        let rows: Vec<&str> = text.lines().collect();

        assert_eq!(rows[0], "*London prep*  2024-06-03 06:30 UTC");
        assert_eq!(rows[1], "`BTC`  Asia 100.0–110.0 · VWAP 112.0 · Funding 0.01%");
        assert_eq!(rows[2], "    ↳ LONG entry 110.0 · SL 105.0 · TP 120.0 · R:R 2.0");
        assert_eq!(rows[3], "`TAO`  ⚠️ no Binance spot pair · spot 420.0 · Funding 0.15%");
        assert_eq!(rows[4], "`XYZ`  ⚠️ pair missing or API error");
        assert_eq!(rows[5], "`ETH`  ⚠️ VWAP missing");
    }

    #[test]
    fn crowded_funding_is_flagged() {
        let range = SessionRange {
            high: 2.0,
            low: 1.0,
        };
        let lines = vec![PrepLine {
            token: "SOL".into(),
            status: PrepStatus::Ready {
                range,
                vwap: 1.5,
                funding: 0.002,
                setup: naive_setup(range, 1.5),
            },
        }];
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let text = format_report(date, &lines, 0.0012);
        assert!(text.contains("Funding 0.20% · crowded longs"));
        assert!(text.contains(&format!("↳ {} entry", SetupBias::Range)));
    }
}
