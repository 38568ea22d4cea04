use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::common::types::TradeRole;

/// Lifecycle of a trade. Declaration order is the timeline: a trade only ever moves to a
/// later variant, and only to variants belonging to its own role. Seller and buyer
/// states are interleaved by protocol phase so both roles' subsequences stay increasing.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeState {
    Preparation,

    // Deposit phase
    SellerPublishedDepositTx,
    SellerSentDepositTxPublishedMsg,
    BuyerReceivedDepositTxPublishedMsg,

    // Fiat payment phase
    BuyerSentFiatPaymentInitiatedMsg,
    SellerReceivedFiatPaymentInitiatedMsg,

    // Payout phase
    SellerSentFiatPaymentReceiptMsg,
    BuyerReceivedFiatPaymentReceiptMsg,
    BuyerPublishedPayoutTx,
    BuyerSentPayoutTxPublishedMsg,
    SellerReceivedPayoutTxPublishedMsg,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, IntoStaticStr,
)]
pub enum TradePhase {
    Init,
    DepositPublished,
    FiatSent,
    FiatReceived,
    PayoutPublished,
}

impl TradeState {
    /// Role that may enter this state. `None` for states shared by both roles.
    pub fn role(&self) -> Option<TradeRole> {
        match self {
            TradeState::Preparation => None,
            TradeState::SellerPublishedDepositTx
            | TradeState::SellerSentDepositTxPublishedMsg
            | TradeState::SellerReceivedFiatPaymentInitiatedMsg
            | TradeState::SellerSentFiatPaymentReceiptMsg
            | TradeState::SellerReceivedPayoutTxPublishedMsg => Some(TradeRole::Seller),
            TradeState::BuyerReceivedDepositTxPublishedMsg
            | TradeState::BuyerSentFiatPaymentInitiatedMsg
            | TradeState::BuyerReceivedFiatPaymentReceiptMsg
            | TradeState::BuyerPublishedPayoutTx
            | TradeState::BuyerSentPayoutTxPublishedMsg => Some(TradeRole::Buyer),
        }
    }

    pub fn phase(&self) -> TradePhase {
        match self {
            TradeState::Preparation => TradePhase::Init,
            TradeState::SellerPublishedDepositTx
            | TradeState::SellerSentDepositTxPublishedMsg
            | TradeState::BuyerReceivedDepositTxPublishedMsg => TradePhase::DepositPublished,
            TradeState::BuyerSentFiatPaymentInitiatedMsg
            | TradeState::SellerReceivedFiatPaymentInitiatedMsg => TradePhase::FiatSent,
            TradeState::SellerSentFiatPaymentReceiptMsg
            | TradeState::BuyerReceivedFiatPaymentReceiptMsg => TradePhase::FiatReceived,
            TradeState::BuyerPublishedPayoutTx
            | TradeState::BuyerSentPayoutTxPublishedMsg
            | TradeState::SellerReceivedPayoutTxPublishedMsg => TradePhase::PayoutPublished,
        }
    }

    pub fn allowed_for(&self, role: TradeRole) -> bool {
        match self.role() {
            Some(state_role) => state_role == role,
            None => true,
        }
    }

    /// Last state each role reaches once the payout transaction is out. Trades in it
    /// are ready to move to the closed store.
    pub fn is_payout_settled(&self) -> bool {
        matches!(
            self,
            TradeState::BuyerSentPayoutTxPublishedMsg
                | TradeState::SellerReceivedPayoutTxPublishedMsg
        )
    }
}
