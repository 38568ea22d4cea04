use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::error::TradeError;

/// Settings for a [`TradeManager`](crate::manager::TradeManager). Deserializable so the
/// embedding application can load it from its own config file.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradeManagerConfig {
    /// Directory holding the open, failed and closed trade files.
    pub data_dir: PathBuf,
    pub trade_request_channel_size: usize,
}

impl TradeManagerConfig {
    const DEFAULT_DATA_DIR: &'static str = "trades";
    const DEFAULT_TRADE_REQUEST_CHANNEL_SIZE: usize = 10;

    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn data_dir(&mut self, data_dir: impl AsRef<Path>) -> &mut Self {
        self.data_dir = data_dir.as_ref().to_path_buf();
        self
    }

    pub fn trade_request_channel_size(&mut self, trade_request_channel_size: usize) -> &mut Self {
        self.trade_request_channel_size = trade_request_channel_size;
        self
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        if self.trade_request_channel_size == 0 {
            return Err(TradeError::Validation(
                "trade_request_channel_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for TradeManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(Self::DEFAULT_DATA_DIR),
            trade_request_channel_size: Self::DEFAULT_TRADE_REQUEST_CHANNEL_SIZE,
        }
    }
}
