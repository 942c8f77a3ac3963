// =============================================================================
// Notifications
// =============================================================================
//
// Reports go to one fixed Telegram chat per run.  Delivery is the only step
// whose failure aborts a run.

pub mod telegram;

pub use telegram::{ParseMode, TelegramNotifier};
