// =============================================================================
// Volume-Weighted Average Price (VWAP)
// =============================================================================
//
// VWAP weights each candle's typical price by its traded volume:
//
//   typical = (high + low + close) / 3
//   VWAP    = sum(typical * volume) / sum(volume)
//
// Computed over one session of candles, it serves as the fair-value line the
// prep report compares the Asia range against.
// =============================================================================

use crate::market_data::Candle;

/// VWAP over `candles`.
///
/// Returns `None` when the input is empty, total volume is zero, or the result
/// is non-finite.
pub fn vwap(candles: &[Candle]) -> Option<f64> {
    let (pv, v) = candles.iter().fold((0.0, 0.0), |(pv, v), c| {
        (pv + c.typical_price() * c.volume, v + c.volume)
    });
    if v <= 0.0 {
        return None;
    }
    let result = pv / v;
    result.is_finite().then_some(result)
}
