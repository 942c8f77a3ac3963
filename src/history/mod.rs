// =============================================================================
// Snapshot History
// =============================================================================
//
// Flat CSV files used as a rudimentary daily time series:
//
//   prices.csv  date,BTC,ETH,...        (USD spot price per token)
//   tvl.csv     date,solana,near,...    (USD TVL per chain / protocol)
//
// Rows are appended once per run and never rewritten.

pub mod snapshot;

pub use snapshot::{append_snapshot, SnapshotTable};
