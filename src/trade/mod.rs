mod engine;
mod state;
mod trade;

pub use engine::{TradeAccess, TradeEngine, TradeNotif};
pub use state::{TradePhase, TradeState};
pub use trade::Trade;
