mod buyer;
mod context;
mod mailbox;
mod messages;
mod runner;
mod seller;
mod services;
mod task;
pub mod tasks;
mod wallet;

pub use buyer::BuyerProtocol;
pub use context::{DepositTxRef, ProtocolContext, WriteOnce};
pub use mailbox::{DeliveryReceipt, MailboxMessenger, MailboxOutcome};
pub use messages::{
    DepositTxPublishedMessage, FiatTransferStartedMessage, FinalizePayoutTxRequest,
    MailboxMessage, PayoutTxPublishedMessage,
};
pub use runner::{
    ChainCompleteHandler, ChainFailedHandler, ChainProgressHandler, InterceptHook, TaskRunner,
};
pub use seller::SellerProtocol;
pub use services::ProtocolServices;
pub use task::{ProtocolTask, TaskChain, TaskConstructor, TaskContext, TaskStep};
pub use wallet::{DepositTxInfo, PayoutTxRequest, WalletService};

#[cfg(test)]
pub(crate) use mailbox::MockMailboxMessenger;
#[cfg(test)]
pub(crate) use wallet::MockWalletService;

use crate::common::{error::TradeError, types::TradeRole};

/// Picks the chain that processes an incoming mailbox message for a trade of `role`.
pub fn chain_for_message(
    role: TradeRole,
    message: &dyn MailboxMessage,
) -> Result<TaskChain, TradeError> {
    let any = message.any_ref();
    let chain = match role {
        TradeRole::Seller if any.is::<FiatTransferStartedMessage>() => {
            Some(SellerProtocol::on_fiat_transfer_started())
        }
        TradeRole::Seller if any.is::<PayoutTxPublishedMessage>() => {
            Some(SellerProtocol::on_payout_tx_published())
        }
        TradeRole::Buyer if any.is::<DepositTxPublishedMessage>() => {
            Some(BuyerProtocol::on_deposit_tx_published())
        }
        TradeRole::Buyer if any.is::<FinalizePayoutTxRequest>() => {
            Some(BuyerProtocol::on_finalize_payout_request())
        }
        _ => None,
    };

    chain.ok_or_else(|| {
        TradeError::Validation(format!(
            "Trade w/ ID {} as {} has no handler for {}",
            message.trade_id(),
            role,
            message.message_name()
        ))
    })
}
