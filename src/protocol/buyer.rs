use crate::common::types::TradeRole;

use super::{
    task::TaskChain,
    tasks::{
        ProcessDepositTxPublishedMessage, ProcessFinalizePayoutTxRequest,
        SendFiatTransferStartedMessage, SendPayoutTxPublishedMessage, SignAndPublishPayoutTx,
    },
};

/// Task chains the buyer runs, one per protocol phase.
pub struct BuyerProtocol;

impl BuyerProtocol {
    pub fn on_deposit_tx_published() -> TaskChain {
        TaskChain::for_role("BuyerProtocol::on_deposit_tx_published", TradeRole::Buyer)
            .then::<ProcessDepositTxPublishedMessage>()
    }

    /// Started by the buyer after initiating the fiat transfer outside the protocol.
    pub fn on_fiat_payment_started() -> TaskChain {
        TaskChain::for_role("BuyerProtocol::on_fiat_payment_started", TradeRole::Buyer)
            .then::<SendFiatTransferStartedMessage>()
    }

    pub fn on_finalize_payout_request() -> TaskChain {
        TaskChain::for_role("BuyerProtocol::on_finalize_payout_request", TradeRole::Buyer)
            .then::<ProcessFinalizePayoutTxRequest>()
            .then::<SignAndPublishPayoutTx>()
            .then::<SendPayoutTxPublishedMessage>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_payout_request_publishes_then_notifies() {
        assert_eq!(
            BuyerProtocol::on_finalize_payout_request().task_names(),
            vec![
                "ProcessFinalizePayoutTxRequest",
                "SignAndPublishPayoutTx",
                "SendPayoutTxPublishedMessage"
            ]
        );
        assert_eq!(
            BuyerProtocol::on_fiat_payment_started().role(),
            Some(TradeRole::Buyer)
        );
    }
}
