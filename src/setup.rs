// =============================================================================
// Naive Trade Setup — VWAP vs. Asia range
// =============================================================================
//
// A deliberately simple read of where yesterday's fair value sits relative to
// the overnight range:
//
//   VWAP above Asia high  =>  LONG   entry on break of the high, stop at the
//                                    range midpoint, target one range width
//                                    above the entry
//   VWAP below Asia low   =>  SHORT  mirror image
//   VWAP inside the range =>  RANGE  buy the low, stop a quarter range below,
//                                    target the midpoint
//
// Nothing here is a trading recommendation; the prep report prints it as a
// talking point.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::SessionRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupBias {
    Long,
    Short,
    Range,
}

impl std::fmt::Display for SetupBias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
            Self::Range => write!(f, "RANGE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeSetup {
    pub bias: SetupBias,
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
}

impl TradeSetup {
    /// Reward-to-risk of the setup, if the stop is at a non-zero distance.
    pub fn reward_risk(&self) -> Option<f64> {
        let risk = (self.entry - self.stop).abs();
        if risk == 0.0 {
            return None;
        }
        Some((self.target - self.entry).abs() / risk)
    }
}

/// Derive the naive setup. Returns `None` for a degenerate range or a
/// non-finite VWAP.
pub fn naive_setup(range: SessionRange, vwap: f64) -> Option<TradeSetup> {
    let width = range.width();
    if !vwap.is_finite() || !width.is_finite() || width <= 0.0 {
        return None;
    }
    let mid = range.mid();

    let setup = if vwap > range.high {
        TradeSetup {
            bias: SetupBias::Long,
            entry: range.high,
            stop: mid,
            target: range.high + width,
        }
    } else if vwap < range.low {
        TradeSetup {
            bias: SetupBias::Short,
            entry: range.low,
            stop: mid,
            target: range.low - width,
        }
    } else {
        TradeSetup {
            bias: SetupBias::Range,
            entry: range.low,
            stop: range.low - width * 0.25,
            target: mid,
        }
    };
    Some(setup)
}
