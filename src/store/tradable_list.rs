use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, IntoStaticStr};
use tracing::{debug, error, info};

use crate::{
    common::{error::TradeError, persist::Persister, types::SerdeGenericTrait},
    trade::Trade,
};

use super::TradeStore;

/// Store membership of a trade. Open trades are in progress; failed and closed trades
/// have left the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, IntoStaticStr)]
pub enum TradeCategory {
    Open,
    Failed,
    Closed,
}

impl TradeCategory {
    pub fn file_name(&self) -> String {
        format!("{}Trades.json", self)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct TradableListStore {
    trades: Vec<Trade>,
}

#[typetag::serde(name = "tradable_list")]
impl SerdeGenericTrait for TradableListStore {
    fn any_ref(&self) -> &dyn std::any::Any {
        self
    }
}

/// Trades of one [`TradeCategory`] in insertion order, keyed by trade id and written to
/// `<dir>/<Category>Trades.json` in the background on every change.
pub struct TradableList {
    category: TradeCategory,
    store: Arc<RwLock<TradableListStore>>,
    persister: Mutex<Option<Persister>>,
}

impl TradableList {
    /// Restores the list from `dir_path` if it was persisted before, or starts empty.
    pub fn open(dir_path: impl AsRef<Path>, category: TradeCategory) -> Result<Self, TradeError> {
        let data_path = Self::data_path_for(&dir_path, category);
        if data_path.exists() {
            Self::restore(dir_path, category)
        } else {
            Ok(Self::new(dir_path, category))
        }
    }

    pub fn new(dir_path: impl AsRef<Path>, category: TradeCategory) -> Self {
        let data_path = Self::data_path_for(&dir_path, category);
        Self::with_store(category, TradableListStore::default(), data_path)
    }

    pub fn restore(dir_path: impl AsRef<Path>, category: TradeCategory) -> Result<Self, TradeError> {
        let data_path = Self::data_path_for(&dir_path, category);
        let json = Persister::restore(&data_path)?;
        let store: TradableListStore = serde_json::from_str(&json)?;
        info!(
            "Restored {} {} trades from {}",
            store.trades.len(),
            category,
            data_path.display()
        );
        Ok(Self::with_store(category, store, data_path))
    }

    fn with_store(category: TradeCategory, store: TradableListStore, data_path: PathBuf) -> Self {
        let store = Arc::new(RwLock::new(store));
        let generic_store: Arc<RwLock<dyn SerdeGenericTrait + 'static>> = store.clone();
        let persister = Persister::new(generic_store, data_path);
        persister.queue();

        Self {
            category,
            store,
            persister: Mutex::new(Some(persister)),
        }
    }

    fn data_path_for(dir_path: impl AsRef<Path>, category: TradeCategory) -> PathBuf {
        dir_path.as_ref().join(category.file_name())
    }

    fn read_store(&self) -> RwLockReadGuard<'_, TradableListStore> {
        self.store.read().unwrap_or_else(|poisoned| {
            error!("{} trades store lock poisoned on read", self.category);
            poisoned.into_inner()
        })
    }

    fn write_store(&self) -> RwLockWriteGuard<'_, TradableListStore> {
        self.store.write().unwrap_or_else(|poisoned| {
            error!("{} trades store lock poisoned on write", self.category);
            poisoned.into_inner()
        })
    }

    fn queue_persist(&self) {
        match self.persister.lock() {
            Ok(persister) => match persister.as_ref() {
                Some(persister) => persister.queue(),
                None => error!("{} trades persisted after terminate", self.category),
            },
            Err(error) => error!("{} trades persister lock poisoned - {}", self.category, error),
        }
    }

    // Getter methods

    pub fn category(&self) -> TradeCategory {
        self.category
    }

    pub fn get_trade_by_id(&self, trade_id: &str) -> Option<Trade> {
        self.read_store()
            .trades
            .iter()
            .find(|trade| trade.id() == trade_id)
            .cloned()
    }

    pub fn contains(&self, trade_id: &str) -> bool {
        self.read_store()
            .trades
            .iter()
            .any(|trade| trade.id() == trade_id)
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.read_store().trades.to_owned()
    }

    pub fn len(&self) -> usize {
        self.read_store().trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_store().trades.is_empty()
    }

    // Setter methods

    /// Appends the trade unless one with the same id is already listed. Returns whether
    /// it was added.
    pub fn add(&self, trade: Trade) -> bool {
        let mut store = self.write_store();
        if store.trades.iter().any(|listed| listed.id() == trade.id()) {
            debug!(
                "Trade w/ ID {} already in {} trades",
                trade.id(),
                self.category
            );
            return false;
        }
        store.trades.push(trade);
        drop(store);
        self.queue_persist();
        true
    }

    /// Replaces the snapshot with the same trade id, or appends it if not yet listed.
    pub fn update(&self, trade: Trade) {
        let mut store = self.write_store();
        match store
            .trades
            .iter_mut()
            .find(|listed| listed.id() == trade.id())
        {
            Some(listed) => *listed = trade,
            None => store.trades.push(trade),
        }
        drop(store);
        self.queue_persist();
    }

    pub fn remove(&self, trade_id: &str) -> Option<Trade> {
        let mut store = self.write_store();
        let position = store
            .trades
            .iter()
            .position(|trade| trade.id() == trade_id)?;
        let trade = store.trades.remove(position);
        drop(store);
        self.queue_persist();
        Some(trade)
    }

    /// Writes the final snapshot and stops the persistence thread. Later changes stay in
    /// memory only.
    pub fn terminate(&self) {
        let persister = match self.persister.lock() {
            Ok(mut persister) => persister.take(),
            Err(error) => {
                error!("{} trades persister lock poisoned - {}", self.category, error);
                None
            }
        };
        if let Some(persister) = persister {
            debug!(
                "Terminating {} trades persister at {}",
                self.category,
                persister.data_path().display()
            );
            persister.terminate();
        }
    }
}

impl TradeStore for TradableList {
    fn persist(&self, trade: &Trade) -> Result<(), TradeError> {
        self.update(trade.clone());
        Ok(())
    }
}

impl Drop for TradableList {
    fn drop(&mut self) {
        self.terminate();
    }
}
