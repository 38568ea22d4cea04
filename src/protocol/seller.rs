use crate::common::types::TradeRole;

use super::{
    task::TaskChain,
    tasks::{
        ProcessFiatTransferStartedMessage, ProcessPayoutTxPublishedMessage, PublishDepositTx,
        SendDepositTxPublishedMessage, SendFinalizePayoutTxRequest, SignPayoutTx,
    },
};

/// Task chains the seller runs, one per protocol phase.
pub struct SellerProtocol;

impl SellerProtocol {
    /// Started by the seller once the trade is set up with its peer.
    pub fn publish_deposit() -> TaskChain {
        TaskChain::for_role("SellerProtocol::publish_deposit", TradeRole::Seller)
            .then::<PublishDepositTx>()
            .then::<SendDepositTxPublishedMessage>()
    }

    pub fn on_fiat_transfer_started() -> TaskChain {
        TaskChain::for_role("SellerProtocol::on_fiat_transfer_started", TradeRole::Seller)
            .then::<ProcessFiatTransferStartedMessage>()
    }

    /// Started by the seller after confirming the fiat payment arrived.
    pub fn on_fiat_payment_received() -> TaskChain {
        TaskChain::for_role("SellerProtocol::on_fiat_payment_received", TradeRole::Seller)
            .then::<SignPayoutTx>()
            .then::<SendFinalizePayoutTxRequest>()
    }

    pub fn on_payout_tx_published() -> TaskChain {
        TaskChain::for_role("SellerProtocol::on_payout_tx_published", TradeRole::Seller)
            .then::<ProcessPayoutTxPublishedMessage>()
    }
}
