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
pub struct PublishDepositTx;

impl ProtocolTask for PublishDepositTx {
    fn name(&self) -> &'static str {
        "PublishDepositTx"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        if let Some(deposit_tx) = ctx.trade.context().deposit_tx.get() {
            debug!(
                "Trade w/ ID {} deposit tx {} already published",
                ctx.trade_id(),
                deposit_tx.tx_id
            );
            return Ok(TaskStep::Complete);
        }

        let deposit_tx_info = ctx
            .services
            .wallet
            .publish_deposit_tx(ctx.trade.id(), ctx.trade.offer())?;

        let context = ctx.trade.context_mut();
        context.deposit_tx.set(
            "deposit_tx",
            DepositTxRef {
                tx_id: deposit_tx_info.tx_id,
            },
        )?;
        context.lock_time_block_height.set(
            "lock_time_block_height",
            deposit_tx_info.lock_time_block_height,
        )?;
        ctx.trade.set_state(TradeState::SellerPublishedDepositTx)?;
        Ok(TaskStep::Complete)
    }
}

#[derive(Default)]
pub struct SendDepositTxPublishedMessage;

impl ProtocolTask for SendDepositTxPublishedMessage {
    fn name(&self) -> &'static str {
        "SendDepositTxPublishedMessage"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        let context = ctx.trade.context();
        let deposit_tx_id = context.deposit_tx.require("deposit_tx")?.tx_id.clone();
        let lock_time_block_height = *context
            .lock_time_block_height
            .require("lock_time_block_height")?;

        let message = DepositTxPublishedMessage {
            trade_id: ctx.trade_id().to_string(),
            deposit_tx_id,
            lock_time_block_height,
            sender_node_address: ctx.services.my_node_address.clone(),
        };
        ctx.send_to_peer(Box::new(message))
    }

    fn delivered_state(&self) -> Option<TradeState> {
        Some(TradeState::SellerSentDepositTxPublishedMsg)
    }
}

#[derive(Default)]
pub struct ProcessFiatTransferStartedMessage;

impl ProtocolTask for ProcessFiatTransferStartedMessage {
    fn name(&self) -> &'static str {
        "ProcessFiatTransferStartedMessage"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        let message = ctx.message::<FiatTransferStartedMessage>()?;
        ctx.trade.context().deposit_tx.require("deposit_tx")?;
        ctx.accept_sender(&message.sender_node_address)?;

        ctx.trade.context_mut().peer_payout_address.set(
            "peer_payout_address",
            message.buyer_payout_address.clone(),
        )?;
        enter_received_state(ctx, TradeState::SellerReceivedFiatPaymentInitiatedMsg)?;
        Ok(TaskStep::Complete)
    }
}

#[derive(Default)]
pub struct SignPayoutTx;

impl ProtocolTask for SignPayoutTx {
    fn name(&self) -> &'static str {
        "SignPayoutTx"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        if ctx.trade.context().payout_tx_signature.is_set() {
            debug!("Trade w/ ID {} payout tx already signed", ctx.trade_id());
            return Ok(TaskStep::Complete);
        }

        let payout_address = own_payout_address(ctx)?;
        let request = payout_tx_request(ctx, &payout_address)?;
        let signature = ctx.services.wallet.sign_payout_tx(&request)?;
        ctx.trade
            .context_mut()
            .payout_tx_signature
            .set("payout_tx_signature", signature)?;
        Ok(TaskStep::Complete)
    }
}

/// Hands the seller's payout signature to the buyer once fiat arrived, so the buyer can
/// complete and broadcast the payout.
#[derive(Default)]
pub struct SendFinalizePayoutTxRequest;

impl ProtocolTask for SendFinalizePayoutTxRequest {
    fn name(&self) -> &'static str {
        "SendFinalizePayoutTxRequest"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        ctx.peer_node_address()?;
        let context = ctx.trade.context();
        let payout_signature = context
            .payout_tx_signature
            .require("payout_tx_signature")?
            .clone();
        let lock_time_block_height = *context
            .lock_time_block_height
            .require("lock_time_block_height")?;

        let payout_address = own_payout_address(ctx)?;
        let message = FinalizePayoutTxRequest {
            trade_id: ctx.trade_id().to_string(),
            payout_signature,
            payout_address,
            lock_time_block_height,
            sender_node_address: ctx.services.my_node_address.clone(),
        };
        ctx.send_to_peer(Box::new(message))
    }

    fn delivered_state(&self) -> Option<TradeState> {
        Some(TradeState::SellerSentFiatPaymentReceiptMsg)
    }
}

#[derive(Default)]
pub struct ProcessPayoutTxPublishedMessage;

impl ProtocolTask for ProcessPayoutTxPublishedMessage {
    fn name(&self) -> &'static str {
        "ProcessPayoutTxPublishedMessage"
    }

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError> {
        let message = ctx.message::<PayoutTxPublishedMessage>()?;
        ctx.accept_sender(&message.sender_node_address)?;

        ctx.services
            .wallet
            .verify_payout_tx(ctx.trade.id(), &message.payout_tx_id)?;
        ctx.trade
            .context_mut()
            .payout_tx_id
            .set("payout_tx_id", message.payout_tx_id.clone())?;
        enter_received_state(ctx, TradeState::SellerReceivedPayoutTxPublishedMsg)?;
        Ok(TaskStep::Complete)
    }
}
