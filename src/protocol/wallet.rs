use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::{common::error::TradeError, offer::Offer};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTxInfo {
    pub tx_id: String,
    pub lock_time_block_height: u32,
}

/// Inputs both parties must agree on for the 2-of-2 payout transaction spending the
/// deposit. Built identically on both sides from the shared protocol context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutTxRequest {
    pub trade_id: String,
    pub deposit_tx_id: String,
    pub buyer_payout_address: String,
    pub seller_payout_address: String,
    pub lock_time_block_height: u32,
}

/// Bitcoin wallet operations a trade needs. Errors surface as task failures.
#[cfg_attr(test, automock)]
pub trait WalletService: Send + Sync {
    /// Idempotent per trade: repeated calls for one trade return the same address.
    fn get_or_create_payout_address(&self, trade_id: &str) -> Result<String, TradeError>;

    fn publish_deposit_tx(&self, trade_id: &str, offer: &Offer)
        -> Result<DepositTxInfo, TradeError>;

    fn sign_payout_tx(&self, request: &PayoutTxRequest) -> Result<Vec<u8>, TradeError>;

    /// Adds the local signature to the peer's and broadcasts. Returns the payout tx id.
    fn finalize_payout_tx(
        &self,
        request: &PayoutTxRequest,
        peer_signature: &[u8],
    ) -> Result<String, TradeError>;

    fn verify_payout_tx(&self, trade_id: &str, payout_tx_id: &str) -> Result<(), TradeError>;
}
