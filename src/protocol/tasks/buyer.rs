use tracing::debug;

use crate::{
    common::error::TradeError,
    protocol::{
        context::DepositTxRef,
        messages::{
            DepositTxPublishedMessage, FiatTransferStartedMessage, FinalizePayoutTxRequest,
            PayoutTxPublishedMessage,
        },
        task::{ProtocolTask, TaskContext, TaskStep},
    },
    trade::TradeState,
};

use super::{enter_received_state, own_payout_address, payout_tx_request};

#[derive(Default)]
pub struct ProcessDepositTxPublishedMessage;

impl ProtocolTask for ProcessDepositTxPublishedMessage {
    fn name(&self) -> &'static str {
        "ProcessDepositTxPublishedMessage"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        let message = ctx.message::<DepositTxPublishedMessage>()?;
        ctx.accept_sender(&message.sender_node_address)?;

        let deposit_tx = DepositTxRef {
            tx_id: message.deposit_tx_id.clone(),
        };
        let context = ctx.trade.context_mut();
        context.deposit_tx.check("deposit_tx", &deposit_tx)?;
        context
            .lock_time_block_height
            .check("lock_time_block_height", &message.lock_time_block_height)?;

        context.deposit_tx.set("deposit_tx", deposit_tx)?;
        context
            .lock_time_block_height
            .set("lock_time_block_height", message.lock_time_block_height)?;
        enter_received_state(ctx, TradeState::BuyerReceivedDepositTxPublishedMsg)?;
        Ok(TaskStep::Complete)
    }
}

/// Tells the seller the fiat transfer was initiated, along with where the buyer wants
/// the payout.
#[derive(Default)]
pub struct SendFiatTransferStartedMessage;

impl ProtocolTask for SendFiatTransferStartedMessage {
    fn name(&self) -> &'static str {
        "SendFiatTransferStartedMessage"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        ctx.trade.context().deposit_tx.require("deposit_tx")?;
        ctx.peer_node_address()?;

        let buyer_payout_address = own_payout_address(ctx)?;
        let message = FiatTransferStartedMessage {
            trade_id: ctx.trade_id().to_string(),
            buyer_payout_address,
            sender_node_address: ctx.services.my_node_address.clone(),
        };
        ctx.send_to_peer(Box::new(message))
    }

    fn delivered_state(&self) -> Option<TradeState> {
        Some(TradeState::BuyerSentFiatPaymentInitiatedMsg)
    }
}

#[derive(Default)]
pub struct ProcessFinalizePayoutTxRequest;

impl ProtocolTask for ProcessFinalizePayoutTxRequest {
    fn name(&self) -> &'static str {
        "ProcessFinalizePayoutTxRequest"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        let request = ctx.message::<FinalizePayoutTxRequest>()?;
        ctx.accept_sender(&request.sender_node_address)?;

        // Lock time was fixed by the deposit; a differing value is an overwrite
        let context = ctx.trade.context_mut();
        context
            .lock_time_block_height
            .check("lock_time_block_height", &request.lock_time_block_height)?;
        context
            .peer_payout_address
            .check("peer_payout_address", &request.payout_address)?;
        context
            .peer_payout_tx_signature
            .check("peer_payout_tx_signature", &request.payout_signature)?;

        context
            .lock_time_block_height
            .set("lock_time_block_height", request.lock_time_block_height)?;
        context
            .peer_payout_address
            .set("peer_payout_address", request.payout_address.clone())?;
        context
            .peer_payout_tx_signature
            .set("peer_payout_tx_signature", request.payout_signature.clone())?;
        enter_received_state(ctx, TradeState::BuyerReceivedFiatPaymentReceiptMsg)?;
        Ok(TaskStep::Complete)
    }
}

#[derive(Default)]
pub struct SignAndPublishPayoutTx;

impl ProtocolTask for SignAndPublishPayoutTx {
    fn name(&self) -> &'static str {
        "SignAndPublishPayoutTx"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        if let Some(payout_tx_id) = ctx.trade.context().payout_tx_id.get() {
            debug!(
                "Trade w/ ID {} payout tx {} already published",
                ctx.trade_id(),
                payout_tx_id
            );
            return Ok(TaskStep::Complete);
        }

        let payout_address = own_payout_address(ctx)?;
        let request = payout_tx_request(ctx, &payout_address)?;
        let peer_signature = ctx
            .trade
            .context()
            .peer_payout_tx_signature
            .require("peer_payout_tx_signature")?
            .clone();

        let payout_tx_id = ctx
            .services
            .wallet
            .finalize_payout_tx(&request, &peer_signature)?;
        ctx.trade
            .context_mut()
            .payout_tx_id
            .set("payout_tx_id", payout_tx_id)?;
        ctx.trade.set_state(TradeState::BuyerPublishedPayoutTx)?;
        Ok(TaskStep::Complete)
    }
}

#[derive(Default)]
pub struct SendPayoutTxPublishedMessage;

impl ProtocolTask for SendPayoutTxPublishedMessage {
    fn name(&self) -> &'static str {
        "SendPayoutTxPublishedMessage"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        let payout_tx_id = ctx
            .trade
            .context()
            .payout_tx_id
            .require("payout_tx_id")?
            .clone();

        let message = PayoutTxPublishedMessage {
            trade_id: ctx.trade_id().to_string(),
            payout_tx_id,
            sender_node_address: ctx.services.my_node_address.clone(),
        };
        ctx.send_to_peer(Box::new(message))
    }

    fn delivered_state(&self) -> Option<TradeState> {
        Some(TradeState::BuyerSentPayoutTxPublishedMsg)
    }
}
