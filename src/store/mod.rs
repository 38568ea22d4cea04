mod failed_trades;
mod tradable_list;

pub use failed_trades::FailedTradesManager;
pub use tradable_list::{TradableList, TradeCategory};

use crate::{common::error::TradeError, trade::Trade};

/// Durable home of trade snapshots. The task runner hands every committed transition to
/// it; implementations replace the stored snapshot with the same trade id.
pub trait TradeStore: Send + Sync {
    fn persist(&self, trade: &Trade) -> Result<(), TradeError>;
}
