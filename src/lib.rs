pub mod common;
pub mod config;
pub mod manager;
pub mod offer;
pub mod protocol;
pub mod store;
pub mod testing;
pub mod trade;

pub use common::error::{TradeError, TradeErrorKind};
