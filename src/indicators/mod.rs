// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free calculations over candles.  Every public function
// returns `Option<T>` so callers are forced to handle insufficient-data and
// numerical-edge-case scenarios.

pub mod session;
pub mod vwap;

pub use session::{session_range, SessionRange};
pub use vwap::vwap;
