mod buyer;
mod seller;

pub use buyer::{
    ProcessDepositTxPublishedMessage, ProcessFinalizePayoutTxRequest,
    SendFiatTransferStartedMessage, SendPayoutTxPublishedMessage, SignAndPublishPayoutTx,
};
pub use seller::{
    ProcessFiatTransferStartedMessage, ProcessPayoutTxPublishedMessage, PublishDepositTx,
    SendDepositTxPublishedMessage, SendFinalizePayoutTxRequest, SignPayoutTx,
};

use tracing::debug;

use crate::{
    common::{error::TradeError, types::TradeRole},
    trade::TradeState,
};

use super::{task::TaskContext, wallet::PayoutTxRequest};

/// Allocates this node's payout address for the trade, or returns the one allocated
/// earlier, and records it in the protocol context.
pub(crate) fn own_payout_address(ctx: &mut TaskContext<'_>) -> Result<String, TradeError> {
    let payout_address = ctx
        .services
        .wallet
        .get_or_create_payout_address(ctx.trade.id())?;
    ctx.trade
        .context_mut()
        .payout_address
        .set("payout_address", payout_address.clone())?;
    Ok(payout_address)
}

/// Moves the trade to the state a processed message leads to. A replayed message whose
/// artifacts already matched finds the trade at or past that state and leaves it there.
pub(crate) fn enter_received_state(
    ctx: &mut TaskContext<'_>,
    state: TradeState,
) -> Result<(), TradeError> {
    if ctx.trade.state() >= state {
        debug!(
            "Trade w/ ID {} already in {}, not moving to {} for replayed message",
            ctx.trade_id(),
            ctx.trade.state(),
            state
        );
        return Ok(());
    }
    ctx.trade.set_state(state)?;
    Ok(())
}

/// Payout inputs as both parties see them. Requires the deposit, the lock time and the
/// peer's payout address to be known.
pub(crate) fn payout_tx_request(
    ctx: &TaskContext<'_>,
    own_payout_address: &str,
) -> Result<PayoutTxRequest, TradeError> {
    let context = ctx.trade.context();
    let deposit_tx = context.deposit_tx.require("deposit_tx")?;
    let lock_time_block_height = *context
        .lock_time_block_height
        .require("lock_time_block_height")?;
    let peer_payout_address = context.peer_payout_address.require("peer_payout_address")?;

    let (buyer_payout_address, seller_payout_address) = match ctx.trade.role() {
        TradeRole::Buyer => (own_payout_address.to_string(), peer_payout_address.clone()),
        TradeRole::Seller => (peer_payout_address.clone(), own_payout_address.to_string()),
    };

    Ok(PayoutTxRequest {
        trade_id: ctx.trade.id().to_string(),
        deposit_tx_id: deposit_tx.tx_id.clone(),
        buyer_payout_address,
        seller_payout_address,
        lock_time_block_height,
    })
}
