use std::{collections::HashMap, fs, sync::Arc};

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::{
    common::{
        error::TradeError,
        types::{KeyRing, NodeAddress, PubKeyRing, TradeId},
    },
    config::TradeManagerConfig,
    offer::Offer,
    protocol::{
        BuyerProtocol, InterceptHook, MailboxMessage, MailboxMessenger, ProtocolServices,
        SellerProtocol, TaskChain, WalletService,
    },
    store::{FailedTradesManager, TradableList, TradeCategory},
    trade::{Trade, TradeAccess, TradeEngine},
};

/// Entry point for the surrounding application. Owns the open, closed and failed trade
/// stores and one [`TradeEngine`] per open trade, and routes incoming mailbox messages
/// and user actions to the right engine.
pub struct TradeManager {
    config: TradeManagerConfig,
    services: ProtocolServices,
    open_trades: Arc<TradableList>,
    closed_trades: Arc<TradableList>,
    failed_trades_manager: FailedTradesManager,
    engines: RwLock<HashMap<TradeId, TradeEngine>>,
    intercept_hook: Option<InterceptHook>,
}

impl TradeManager {
    // Constructors

    /// Opens the trade stores under `config.data_dir` and resumes every open trade in
    /// the state it was last persisted in.
    pub async fn new(
        config: TradeManagerConfig,
        key_ring: KeyRing,
        my_node_address: NodeAddress,
        wallet: Arc<dyn WalletService>,
        messenger: Arc<dyn MailboxMessenger>,
    ) -> Result<Self, TradeError> {
        Self::new_with_intercept_hook(config, key_ring, my_node_address, wallet, messenger, None)
            .await
    }

    /// Same as [`TradeManager::new`], with `intercept_hook` installed on every trade.
    /// Meant for fault injection in tests.
    pub async fn new_with_intercept_hook(
        config: TradeManagerConfig,
        key_ring: KeyRing,
        my_node_address: NodeAddress,
        wallet: Arc<dyn WalletService>,
        messenger: Arc<dyn MailboxMessenger>,
        intercept_hook: Option<InterceptHook>,
    ) -> Result<Self, TradeError> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let open_trades = Arc::new(TradableList::open(&config.data_dir, TradeCategory::Open)?);
        let closed_trades = Arc::new(TradableList::open(&config.data_dir, TradeCategory::Closed)?);
        let failed_trades = Arc::new(TradableList::open(&config.data_dir, TradeCategory::Failed)?);
        let failed_trades_manager = FailedTradesManager::new(key_ring.clone(), failed_trades);

        let services = ProtocolServices::new(
            wallet,
            messenger,
            open_trades.clone(),
            key_ring,
            my_node_address,
        );

        let manager = Self {
            config,
            services,
            open_trades,
            closed_trades,
            failed_trades_manager,
            engines: RwLock::new(HashMap::new()),
            intercept_hook,
        };

        for trade in manager.open_trades.trades() {
            if manager.closed_trades.contains(trade.id())
                || manager.failed_trades_manager.get_trade_by_id(trade.id()).is_some()
            {
                warn!(
                    "Trade w/ ID {} already retired, dropping it from the open trades",
                    trade.id()
                );
                manager.open_trades.remove(trade.id());
                continue;
            }
            info!(
                "Trade w/ ID {} resuming in state {}",
                trade.id(),
                trade.state()
            );
            manager.spawn_engine(trade).await;
        }

        Ok(manager)
    }

    // Trade Management

    /// Starts a trade on one of our own offers. The trading peer is filled in once a
    /// taker shows up, through [`TradeManager::set_trading_peer`].
    pub async fn make_trade(&self, offer: Offer) -> Result<TradeAccess, TradeError> {
        if !offer.is_my_offer(&self.services.key_ring) {
            return Err(TradeError::Validation(format!(
                "Offer {} is not owned by this node and cannot be made",
                offer.id
            )));
        }
        self.check_unknown_trade(&offer.id).await?;

        let trade = Trade::new(offer, true);
        self.open_trades.add(trade.clone());
        info!(
            "Trade w/ ID {} created as maker {} for {} {} volume",
            trade.id(),
            trade.role(),
            trade.offer().volume(),
            trade.offer().currency.code()
        );
        Ok(self.spawn_engine(trade).await)
    }

    /// Starts a trade by taking someone else's offer, with the maker as trading peer.
    pub async fn take_offer(
        &self,
        offer: Offer,
        maker_node_address: NodeAddress,
    ) -> Result<TradeAccess, TradeError> {
        if offer.is_my_offer(&self.services.key_ring) {
            return Err(TradeError::Validation(format!(
                "Offer {} is owned by this node and cannot be taken",
                offer.id
            )));
        }
        self.check_unknown_trade(&offer.id).await?;

        let maker_pub_key_ring = offer.owner_pub_key_ring;
        let mut trade = Trade::new(offer, false);
        trade.set_trading_peer(maker_node_address, maker_pub_key_ring)?;
        self.open_trades.add(trade.clone());
        info!(
            "Trade w/ ID {} created as taker {} for {} {} volume",
            trade.id(),
            trade.role(),
            trade.offer().volume(),
            trade.offer().currency.code()
        );
        Ok(self.spawn_engine(trade).await)
    }

    pub async fn set_trading_peer(
        &self,
        trade_id: &str,
        node_address: NodeAddress,
        pub_key_ring: PubKeyRing,
    ) -> Result<(), TradeError> {
        self.trade_access(trade_id)
            .await?
            .set_trading_peer(node_address, pub_key_ring)
            .await
    }

    pub async fn trade_access(&self, trade_id: &str) -> Result<TradeAccess, TradeError> {
        match self.engines.read().await.get(trade_id) {
            Some(engine) => Ok(engine.new_accessor()),
            None => Err(TradeError::Validation(format!(
                "Trade w/ ID {} is not an open trade",
                trade_id
            ))),
        }
    }

    // Protocol Progression

    /// Routes an incoming mailbox message to its trade. Trades reaching a settled payout
    /// state move to the closed store.
    pub async fn handle_mailbox_message(
        &self,
        message: Box<dyn MailboxMessage>,
    ) -> Result<(), TradeError> {
        let trade_id = message.trade_id().to_string();
        let access = match self.trade_access(&trade_id).await {
            Ok(access) => access,
            Err(error) => {
                warn!(
                    "Dropping {} from {} - {}",
                    message.message_name(),
                    message.sender_node_address(),
                    error
                );
                return Err(error);
            }
        };

        access.handle_mailbox_message(message).await?;
        self.close_if_settled(&trade_id, &access).await
    }

    /// Seller publishes the deposit and tells the buyer about it.
    pub async fn publish_deposit(&self, trade_id: &str) -> Result<(), TradeError> {
        self.run_chain(trade_id, SellerProtocol::publish_deposit())
            .await
    }

    /// Buyer reports that the fiat transfer was initiated.
    pub async fn confirm_fiat_payment_started(&self, trade_id: &str) -> Result<(), TradeError> {
        self.run_chain(trade_id, BuyerProtocol::on_fiat_payment_started())
            .await
    }

    /// Seller confirms the fiat arrived and releases the payout signature.
    pub async fn confirm_fiat_payment_received(&self, trade_id: &str) -> Result<(), TradeError> {
        self.run_chain(trade_id, SellerProtocol::on_fiat_payment_received())
            .await
    }

    async fn run_chain(&self, trade_id: &str, chain: TaskChain) -> Result<(), TradeError> {
        let access = self.trade_access(trade_id).await?;
        access.run_chain(chain).await?;
        self.close_if_settled(trade_id, &access).await
    }

    async fn close_if_settled(
        &self,
        trade_id: &str,
        access: &TradeAccess,
    ) -> Result<(), TradeError> {
        let trade = access.trade().await?;
        if trade.state().is_payout_settled() {
            self.close_trade(trade_id).await?;
        }
        Ok(())
    }

    // Store Membership

    pub async fn close_trade(&self, trade_id: &str) -> Result<Trade, TradeError> {
        let trade = self.retire_engine(trade_id).await?;
        self.closed_trades.add(trade.clone());
        self.open_trades.remove(trade_id);
        info!(
            "Trade w/ ID {} closed in state {}",
            trade.id(),
            trade.state()
        );
        Ok(trade)
    }

    /// Moves an open trade to the failed store, recording `reason` on it.
    pub async fn fail_trade(
        &self,
        trade_id: &str,
        reason: impl AsRef<str>,
    ) -> Result<Trade, TradeError> {
        let mut trade = self.retire_engine(trade_id).await?;
        trade.append_to_error_message(reason.as_ref());
        self.failed_trades_manager.add(trade.clone());
        self.open_trades.remove(trade_id);
        warn!(
            "Trade w/ ID {} failed in state {} - {}",
            trade.id(),
            trade.state(),
            reason.as_ref()
        );
        Ok(trade)
    }

    /// Stops the trade's engine. The trade stays in the open store until the caller has
    /// added it to its destination store.
    async fn retire_engine(&self, trade_id: &str) -> Result<Trade, TradeError> {
        let engine = self.engines.write().await.remove(trade_id).ok_or_else(|| {
            TradeError::Validation(format!("Trade w/ ID {} is not an open trade", trade_id))
        })?;

        let trade = engine.new_accessor().shutdown().await?;
        if let Some(error) = engine.task_handle.await.err() {
            error!(
                "Trade w/ ID {} engine did not stop cleanly - {}",
                trade_id, error
            );
        }
        Ok(trade)
    }

    // Queries

    /// Looks the trade up in the open, closed and failed stores, in that order. Open
    /// trades are read from their engine so the snapshot is current.
    pub async fn get_trade_by_id(&self, trade_id: &str) -> Option<Trade> {
        if let Ok(access) = self.trade_access(trade_id).await {
            match access.trade().await {
                Ok(trade) => return Some(trade),
                Err(error) => {
                    debug!("Trade w/ ID {} engine not reachable - {}", trade_id, error)
                }
            }
        }
        self.open_trades
            .get_trade_by_id(trade_id)
            .or_else(|| self.closed_trades.get_trade_by_id(trade_id))
            .or_else(|| self.failed_trades_manager.get_trade_by_id(trade_id))
    }

    pub fn open_trades(&self) -> Vec<Trade> {
        self.open_trades.trades()
    }

    pub fn closed_trades(&self) -> Vec<Trade> {
        self.closed_trades.trades()
    }

    pub fn failed_trades_manager(&self) -> &FailedTradesManager {
        &self.failed_trades_manager
    }

    /// Stops every engine and flushes all stores to disk.
    pub async fn shutdown(self) -> Result<(), TradeError> {
        let engines: Vec<TradeEngine> = self
            .engines
            .write()
            .await
            .drain()
            .map(|(_, engine)| engine)
            .collect();
        for engine in engines {
            if let Some(error) = engine.new_accessor().shutdown().await.err() {
                warn!(
                    "Trade w/ ID {} engine already stopped - {}",
                    engine.trade_id(),
                    error
                );
            }
            if let Some(error) = engine.task_handle.await.err() {
                error!("Trade engine did not stop cleanly - {}", error);
            }
        }

        self.open_trades.terminate();
        self.closed_trades.terminate();
        info!(
            "Trade manager for {} shut down",
            self.config.data_dir.display()
        );
        Ok(())
    }

    // Private Functions

    async fn check_unknown_trade(&self, trade_id: &str) -> Result<(), TradeError> {
        if self.engines.read().await.contains_key(trade_id)
            || self.open_trades.contains(trade_id)
            || self.closed_trades.contains(trade_id)
            || self.failed_trades_manager.get_trade_by_id(trade_id).is_some()
        {
            return Err(TradeError::Validation(format!(
                "Trade w/ ID {} already exists",
                trade_id
            )));
        }
        Ok(())
    }

    async fn spawn_engine(&self, trade: Trade) -> TradeAccess {
        let trade_id = trade.id().to_string();
        let engine = TradeEngine::new(
            trade,
            self.services.clone(),
            self.config.trade_request_channel_size,
            self.intercept_hook.clone(),
        );
        let access = engine.new_accessor();
        self.engines.write().await.insert(trade_id, engine);
        access
    }
}
