use std::{any::Any, fmt::Debug};

use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};

use crate::common::types::{NodeAddress, TradeId};

/// A protocol message deliverable through the mailbox. Every message carries its trade id
/// so the receiver can route it and process a re-sent copy idempotently.
#[typetag::serde(tag = "type")]
pub trait MailboxMessage: DynClone + Debug + Send + Sync {
    fn trade_id(&self) -> &str;
    fn sender_node_address(&self) -> &NodeAddress;
    fn message_name(&self) -> &'static str;
    fn any_ref(&self) -> &dyn Any;
}

dyn_clone::clone_trait_object!(MailboxMessage);

impl dyn MailboxMessage {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.any_ref().downcast_ref()
    }
}

macro_rules! impl_mailbox_message {
    ($message:ident, $name:tt) => {
        #[typetag::serde(name = $name)]
        impl MailboxMessage for $message {
            fn trade_id(&self) -> &str {
                &self.trade_id
            }

            fn sender_node_address(&self) -> &NodeAddress {
                &self.sender_node_address
            }

            fn message_name(&self) -> &'static str {
                $name
            }

            fn any_ref(&self) -> &dyn Any {
                self
            }
        }
    };
}

// Seller -> Buyer

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositTxPublishedMessage {
    pub trade_id: TradeId,
    pub deposit_tx_id: String,
    pub lock_time_block_height: u32,
    pub sender_node_address: NodeAddress,
}

impl_mailbox_message!(DepositTxPublishedMessage, "deposit-tx-published");

// Buyer -> Seller

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FiatTransferStartedMessage {
    pub trade_id: TradeId,
    pub buyer_payout_address: String,
    pub sender_node_address: NodeAddress,
}

impl_mailbox_message!(FiatTransferStartedMessage, "fiat-transfer-started");

// Seller -> Buyer

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalizePayoutTxRequest {
    pub trade_id: TradeId,
    pub payout_signature: Vec<u8>,
    pub payout_address: String,
    pub lock_time_block_height: u32,
    pub sender_node_address: NodeAddress,
}

impl_mailbox_message!(FinalizePayoutTxRequest, "finalize-payout-tx-request");

// Buyer -> Seller

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PayoutTxPublishedMessage {
    pub trade_id: TradeId,
    pub payout_tx_id: String,
    pub sender_node_address: NodeAddress,
}

impl_mailbox_message!(PayoutTxPublishedMessage, "payout-tx-published");
