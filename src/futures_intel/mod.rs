// =============================================================================
// Futures Intelligence Module
// =============================================================================
//
// Perpetual futures data used as a sentiment proxy.  Only funding rates are
// read; they feed the funding sub-signal of the heat score and the funding
// column of the prep report.

pub mod funding_rate;

pub use funding_rate::FundingRateMonitor;
