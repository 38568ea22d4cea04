use std::sync::Mutex;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::{
    common::{
        error::TradeError,
        types::{NodeAddress, PubKeyRing},
    },
    offer::Offer,
    protocol::{
        DepositTxInfo, MailboxMessage, MailboxMessenger, MailboxOutcome, PayoutTxRequest,
        WalletService,
    },
    store::TradeStore,
    trade::Trade,
};

use super::SomeTestParams;

/// How [`TestMailbox`] reports each send.
#[derive(Clone, Debug, PartialEq)]
pub enum MailboxBehavior {
    Arrive,
    StoreInMailbox,
    Fault(String),
    /// Keep the outcome sender until [`TestMailbox::release_held`] is called.
    Hold,
}

/// Mailbox that records what was sent and reports a configurable outcome. Can also pass
/// every sent message on to a channel, standing in for the peer's inbox.
pub struct TestMailbox {
    behavior: Mutex<MailboxBehavior>,
    sent: Mutex<Vec<(NodeAddress, Box<dyn MailboxMessage>)>>,
    held: Mutex<Vec<oneshot::Sender<MailboxOutcome>>>,
    inbox_tx: Option<mpsc::UnboundedSender<Box<dyn MailboxMessage>>>,
}

impl TestMailbox {
    pub fn new(behavior: MailboxBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            sent: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
            inbox_tx: None,
        }
    }

    pub fn arriving() -> Self {
        Self::new(MailboxBehavior::Arrive)
    }

    pub fn storing_in_mailbox() -> Self {
        Self::new(MailboxBehavior::StoreInMailbox)
    }

    pub fn faulting(reason: impl Into<String>) -> Self {
        Self::new(MailboxBehavior::Fault(reason.into()))
    }

    pub fn holding() -> Self {
        Self::new(MailboxBehavior::Hold)
    }

    /// Messages that are reported delivered are also pushed to `inbox_tx`.
    pub fn forwarding(
        behavior: MailboxBehavior,
        inbox_tx: mpsc::UnboundedSender<Box<dyn MailboxMessage>>,
    ) -> Self {
        Self {
            inbox_tx: Some(inbox_tx),
            ..Self::new(behavior)
        }
    }

    pub fn set_behavior(&self, behavior: MailboxBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent_messages(&self) -> Vec<Box<dyn MailboxMessage>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn sent_to(&self) -> Vec<NodeAddress> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(peer_node_address, _)| peer_node_address.clone())
            .collect()
    }

    /// Reports `outcome` for every held send. Returns how many were released.
    pub fn release_held(&self, outcome: MailboxOutcome) -> usize {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        let count = held.len();
        for outcome_tx in held {
            if outcome_tx.send(outcome.clone()).is_err() {
                warn!("Held mailbox outcome receiver already dropped");
            }
        }
        count
    }
}

impl MailboxMessenger for TestMailbox {
    fn send_encrypted_mailbox_message(
        &self,
        peer_node_address: &NodeAddress,
        _peer_pub_key_ring: &PubKeyRing,
        message: Box<dyn MailboxMessage>,
        outcome_tx: oneshot::Sender<MailboxOutcome>,
    ) {
        debug!(
            "TestMailbox sending {} for trade {} to {}",
            message.message_name(),
            message.trade_id(),
            peer_node_address
        );
        self.sent
            .lock()
            .unwrap()
            .push((peer_node_address.clone(), message.clone()));

        let behavior = self.behavior.lock().unwrap().clone();
        let outcome = match behavior {
            MailboxBehavior::Arrive => MailboxOutcome::Arrived,
            MailboxBehavior::StoreInMailbox => MailboxOutcome::StoredInMailbox,
            MailboxBehavior::Fault(reason) => MailboxOutcome::Fault(reason),
            MailboxBehavior::Hold => {
                self.held.lock().unwrap().push(outcome_tx);
                return;
            }
        };

        if outcome.is_delivered() {
            if let Some(inbox_tx) = &self.inbox_tx {
                if inbox_tx.send(message).is_err() {
                    warn!("TestMailbox inbox receiver dropped");
                }
            }
        }
        let _ = outcome_tx.send(outcome);
    }
}

/// Wallet with deterministic addresses and transaction ids derived from the trade id.
/// Any operation can be made to fail with [`TestWallet::fail_on`].
pub struct TestWallet {
    label: String,
    failures: Mutex<Vec<(&'static str, String)>>,
    calls: Mutex<Vec<String>>,
}

impl TestWallet {
    pub const GET_OR_CREATE_PAYOUT_ADDRESS: &'static str = "get_or_create_payout_address";
    pub const PUBLISH_DEPOSIT_TX: &'static str = "publish_deposit_tx";
    pub const SIGN_PAYOUT_TX: &'static str = "sign_payout_tx";
    pub const FINALIZE_PAYOUT_TX: &'static str = "finalize_payout_tx";
    pub const VERIFY_PAYOUT_TX: &'static str = "verify_payout_tx";

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failures: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_on(&self, operation: &'static str, reason: impl Into<String>) {
        self.failures
            .lock()
            .unwrap()
            .push((operation, reason.into()));
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Names of the wallet operations called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn payout_tx_id(trade_id: &str) -> String {
        format!("payout-{}", trade_id)
    }

    fn record(&self, operation: &'static str) -> Result<(), TradeError> {
        self.calls.lock().unwrap().push(operation.to_string());
        match self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|(failing, _)| *failing == operation)
        {
            Some((_, reason)) => Err(TradeError::Wallet(reason.clone())),
            None => Ok(()),
        }
    }
}

impl WalletService for TestWallet {
    fn get_or_create_payout_address(&self, trade_id: &str) -> Result<String, TradeError> {
        self.record(Self::GET_OR_CREATE_PAYOUT_ADDRESS)?;
        let trade_prefix: String = trade_id.chars().take(8).collect();
        Ok(format!("bc1q{}{}", self.label, trade_prefix))
    }

    fn publish_deposit_tx(
        &self,
        trade_id: &str,
        _offer: &Offer,
    ) -> Result<DepositTxInfo, TradeError> {
        self.record(Self::PUBLISH_DEPOSIT_TX)?;
        Ok(DepositTxInfo {
            tx_id: format!("deposit-{}", trade_id),
            lock_time_block_height: SomeTestParams::LOCK_TIME_BLOCK_HEIGHT,
        })
    }

    fn sign_payout_tx(&self, request: &PayoutTxRequest) -> Result<Vec<u8>, TradeError> {
        self.record(Self::SIGN_PAYOUT_TX)?;
        let signature = format!(
            "{}:{}:{}:{}",
            self.label,
            request.deposit_tx_id,
            request.buyer_payout_address,
            request.seller_payout_address
        );
        Ok(signature.into_bytes())
    }

    fn finalize_payout_tx(
        &self,
        request: &PayoutTxRequest,
        peer_signature: &[u8],
    ) -> Result<String, TradeError> {
        self.record(Self::FINALIZE_PAYOUT_TX)?;
        if peer_signature.is_empty() {
            return Err(TradeError::Wallet(format!(
                "Missing peer signature for payout of trade {}",
                request.trade_id
            )));
        }
        Ok(Self::payout_tx_id(&request.trade_id))
    }

    fn verify_payout_tx(&self, trade_id: &str, payout_tx_id: &str) -> Result<(), TradeError> {
        self.record(Self::VERIFY_PAYOUT_TX)?;
        if payout_tx_id != Self::payout_tx_id(trade_id) {
            return Err(TradeError::Wallet(format!(
                "Payout tx {} does not spend the deposit of trade {}",
                payout_tx_id, trade_id
            )));
        }
        Ok(())
    }
}

/// Keeps every persisted snapshot in memory, in order. Can be made to reject writes with
/// [`RecordingTradeStore::fail_with`].
#[derive(Default)]
pub struct RecordingTradeStore {
    snapshots: Mutex<Vec<Trade>>,
    failure: Mutex<Option<String>>,
}

impl RecordingTradeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock().unwrap() = Some(reason.into());
    }

    pub fn snapshots(&self) -> Vec<Trade> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Trade> {
        self.snapshots.lock().unwrap().last().cloned()
    }
}

impl TradeStore for RecordingTradeStore {
    fn persist(&self, trade: &Trade) -> Result<(), TradeError> {
        if let Some(reason) = self.failure.lock().unwrap().as_ref() {
            return Err(TradeError::Simple(format!(
                "Trade w/ ID {} not persisted - {}",
                trade.id(),
                reason
            )));
        }
        self.snapshots.lock().unwrap().push(trade.clone());
        Ok(())
    }
}
