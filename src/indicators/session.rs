// =============================================================================
// Session Range
// =============================================================================
//
// High and low of a trading session, e.g. the Asia session (00:00-07:00 UTC)
// that London traders use as the reference range for the day.
// =============================================================================

use crate::market_data::Candle;

/// High/low of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionRange {
    pub high: f64,
    pub low: f64,
}

impl SessionRange {
    pub fn mid(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.high - self.low
    }
}

/// Highest high and lowest low over `candles`.
///
/// Returns `None` for an empty slice or when any bound is non-finite.
pub fn session_range(candles: &[Candle]) -> Option<SessionRange> {
    if candles.is_empty() {
        return None;
    }
    let high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    if !high.is_finite() || !low.is_finite() {
        return None;
    }
    Some(SessionRange { high, low })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64) -> Candle {
        Candle::new(0, low, high, low, high, 1.0, 0)
    }

    #[test]
    fn empty_is_none() {
        assert!(session_range(&[]).is_none());
    }

    #[test]
    fn picks_extremes() {
        let r = session_range(&[candle(10.0, 8.0), candle(12.0, 9.0), candle(11.0, 7.5)]).unwrap();
        assert_eq!(r.high, 12.0);
        assert_eq!(r.low, 7.5);
        assert_eq!(r.mid(), 9.75);
        assert_eq!(r.width(), 4.5);
    }
}
