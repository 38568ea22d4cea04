use std::sync::Arc;

use tracing::{info, warn};

use crate::{common::types::KeyRing, trade::Trade};

use super::TradableList;

/// Terminal store for trades that left the protocol through an unrecoverable fault.
/// Trades are only ever added here; recovery and dispute tooling reads them back.
pub struct FailedTradesManager {
    key_ring: KeyRing,
    list: Arc<TradableList>,
}

impl FailedTradesManager {
    pub fn new(key_ring: KeyRing, list: Arc<TradableList>) -> Self {
        Self { key_ring, list }
    }

    /// No-op if a trade with the same id is already registered.
    pub fn add(&self, trade: Trade) {
        let trade_id = trade.id().to_string();
        if self.list.add(trade) {
            info!("Trade w/ ID {} added to failed trades", trade_id);
        } else {
            warn!("Trade w/ ID {} already in failed trades", trade_id);
        }
    }

    /// Whether the local node created the offer behind this trade.
    pub fn was_my_offer(&self, trade: &Trade) -> bool {
        trade.offer().is_my_offer(&self.key_ring)
    }

    pub fn failed_trades(&self) -> Vec<Trade> {
        self.list.trades()
    }

    pub fn get_trade_by_id(&self, trade_id: &str) -> Option<Trade> {
        self.list.get_trade_by_id(trade_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::TradeCategory, testing::SomeTestParams};

    fn failed_trades_manager(key_ring: KeyRing) -> FailedTradesManager {
        let dir = SomeTestParams::temp_data_dir();
        let list = Arc::new(TradableList::new(dir, TradeCategory::Failed));
        FailedTradesManager::new(key_ring, list)
    }

    #[test]
    fn adding_same_trade_twice_keeps_one_entry() {
        let manager = failed_trades_manager(SomeTestParams::seller_key_ring());
        let mut trade = SomeTestParams::seller_trade();
        manager.add(trade.clone());
        trade.append_to_error_message("second failure");
        manager.add(trade);

        let failed = manager.failed_trades();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].error_message().is_none());
    }

    #[test]
    fn lookup_by_id_finds_only_registered_trades() {
        let manager = failed_trades_manager(SomeTestParams::seller_key_ring());
        let trade = SomeTestParams::seller_trade();
        manager.add(trade.clone());

        assert_eq!(manager.get_trade_by_id(trade.id()), Some(trade));
        assert!(manager.get_trade_by_id("unknown-trade-id").is_none());
    }

    #[test]
    fn offer_ownership_follows_key_ring() {
        let trade = SomeTestParams::seller_trade();
        assert!(failed_trades_manager(SomeTestParams::seller_key_ring()).was_my_offer(&trade));
        assert!(!failed_trades_manager(SomeTestParams::buyer_key_ring()).was_my_offer(&trade));
    }
}
