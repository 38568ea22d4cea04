use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};
use tokio::sync::oneshot;
use tracing::{error, trace};

#[cfg(test)]
use mockall::automock;

use crate::common::types::{NodeAddress, PubKeyRing};

use super::messages::MailboxMessage;

/// Result of one mailbox send. Exactly one is produced per send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
pub enum MailboxOutcome {
    /// Delivered directly to the online peer.
    Arrived,
    /// Peer offline; queued in its mailbox for later retrieval.
    StoredInMailbox,
    /// Delivery could not be attempted or was rejected.
    Fault(String),
}

impl MailboxOutcome {
    /// Arrived and StoredInMailbox are indistinguishable to the protocol.
    pub fn is_delivered(&self) -> bool {
        match self {
            MailboxOutcome::Arrived | MailboxOutcome::StoredInMailbox => true,
            MailboxOutcome::Fault(_) => false,
        }
    }
}

/// Encrypted store-and-forward delivery of protocol messages.
///
/// Implementations must not block. The outcome is reported once through `outcome_tx`,
/// possibly long after the call returns and from another execution context. Dropping
/// `outcome_tx` without sending is reported to the waiting task as a fault.
#[cfg_attr(test, automock)]
pub trait MailboxMessenger: Send + Sync {
    fn send_encrypted_mailbox_message(
        &self,
        peer_node_address: &NodeAddress,
        peer_pub_key_ring: &PubKeyRing,
        message: Box<dyn MailboxMessage>,
        outcome_tx: oneshot::Sender<MailboxOutcome>,
    );
}

/// Receiving half of a pending mailbox send, handed back to the task runner by a task
/// that suspended at the send boundary.
#[derive(Debug)]
pub struct DeliveryReceipt {
    trade_id: String,
    outcome_rx: oneshot::Receiver<MailboxOutcome>,
}

impl DeliveryReceipt {
    pub fn channel(trade_id: impl Into<String>) -> (oneshot::Sender<MailboxOutcome>, Self) {
        let (outcome_tx, outcome_rx) = oneshot::channel::<MailboxOutcome>();
        let receipt = Self {
            trade_id: trade_id.into(),
            outcome_rx,
        };
        (outcome_tx, receipt)
    }

    pub async fn outcome(self) -> MailboxOutcome {
        match self.outcome_rx.await {
            Ok(outcome) => {
                trace!(
                    "Trade w/ ID {} mailbox delivery outcome {}",
                    self.trade_id,
                    outcome
                );
                outcome
            }
            Err(error) => {
                error!(
                    "Trade w/ ID {} mailbox outcome listener dropped without result - {}",
                    self.trade_id, error
                );
                MailboxOutcome::Fault(format!("Delivery outcome never reported - {}", error))
            }
        }
    }
}
