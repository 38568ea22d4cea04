use std::any::Any;

use tracing::{debug, error};

use crate::{
    common::{
        error::TradeError,
        types::{NodeAddress, PubKeyRing, TradeRole},
    },
    trade::{Trade, TradeState},
};

use super::{
    mailbox::{DeliveryReceipt, MailboxOutcome},
    messages::MailboxMessage,
    services::ProtocolServices,
};

/// What a task hands back to the runner after its body ran.
#[derive(Debug)]
pub enum TaskStep {
    Complete,
    /// The task sent a mailbox message and suspends until the outcome arrives.
    AwaitDelivery(DeliveryReceipt),
}

/// Everything a task may touch while it runs. Built fresh by the runner for each task.
pub struct TaskContext<'a> {
    pub trade: &'a mut Trade,
    pub services: &'a ProtocolServices,
    message: Option<&'a (dyn MailboxMessage + 'static)>,
}

impl<'a> TaskContext<'a> {
    pub fn new(
        trade: &'a mut Trade,
        services: &'a ProtocolServices,
        message: Option<&'a (dyn MailboxMessage + 'static)>,
    ) -> Self {
        Self {
            trade,
            services,
            message,
        }
    }

    pub fn trade_id(&self) -> &str {
        self.trade.id()
    }

    /// The message that triggered this chain, downcast to the type the task expects.
    pub fn message<T: Any>(&self) -> Result<&'a T, TradeError> {
        let Some(message) = self.message else {
            return Err(TradeError::MissingDependency(format!(
                "Trade w/ ID {} expected a triggering mailbox message",
                self.trade.id()
            )));
        };
        message.downcast_ref::<T>().ok_or_else(|| {
            TradeError::Validation(format!(
                "Trade w/ ID {} received unexpected mailbox message {}",
                self.trade.id(),
                message.message_name()
            ))
        })
    }

    pub fn peer_node_address(&self) -> Result<NodeAddress, TradeError> {
        match self.trade.trading_peer_node_address() {
            Some(node_address) => Ok(node_address.clone()),
            None => {
                error!(
                    "Trade w/ ID {} trading peer node address is None",
                    self.trade.id()
                );
                Err(TradeError::MissingDependency(
                    "Trading peer node address is not yet known".to_string(),
                ))
            }
        }
    }

    pub fn peer_pub_key_ring(&self) -> Result<PubKeyRing, TradeError> {
        self.trade
            .context()
            .peer_pub_key_ring
            .require("peer_pub_key_ring")
            .copied()
    }

    /// Accepts a message sender as the trading peer. The first sender fills in the peer
    /// address if the handshake has not; afterwards only that address is accepted.
    pub fn accept_sender(&mut self, sender: &NodeAddress) -> Result<(), TradeError> {
        self.trade.set_trading_peer_node_address(sender.clone())
    }

    /// Sends `message` to the trading peer. Fails with `MissingDependency` before any
    /// network I/O when the peer address or key ring is unknown.
    pub fn send_to_peer(&self, message: Box<dyn MailboxMessage>) -> Result<TaskStep, TradeError> {
        let peer_node_address = self.peer_node_address()?;
        let peer_pub_key_ring = self.peer_pub_key_ring()?;
        let (outcome_tx, receipt) = DeliveryReceipt::channel(self.trade.id());

        debug!(
            "Trade w/ ID {} sending {} to {}",
            self.trade.id(),
            message.message_name(),
            peer_node_address
        );
        self.services.messenger.send_encrypted_mailbox_message(
            &peer_node_address,
            &peer_pub_key_ring,
            message,
            outcome_tx,
        );
        Ok(TaskStep::AwaitDelivery(receipt))
    }
}

/// One step of the trade protocol.
///
/// A task runs once. Its body either completes synchronously or sends a mailbox message
/// and returns [`TaskStep::AwaitDelivery`]; the runner then feeds the outcome back
/// through [`ProtocolTask::on_delivery`].
pub trait ProtocolTask: Send {
    fn name(&self) -> &'static str;

    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<TaskStep, TradeError>;

    /// State entered once this task's message is delivered.
    fn delivered_state(&self) -> Option<TradeState> {
        None
    }

    fn on_delivery(
        &mut self,
        ctx: &mut TaskContext<'_>,
        outcome: MailboxOutcome,
    ) -> Result<(), TradeError> {
        match outcome {
            MailboxOutcome::Arrived | MailboxOutcome::StoredInMailbox => {
                if let Some(state) = self.delivered_state() {
                    ctx.trade.set_state(state)?;
                }
                Ok(())
            }
            MailboxOutcome::Fault(error_message) => Err(TradeError::DeliveryFault(format!(
                "{} sending failed - {}",
                self.name(),
                error_message
            ))),
        }
    }
}

pub type TaskConstructor = Box<dyn Fn() -> Box<dyn ProtocolTask> + Send + Sync>;

/// Ordered task constructors for one protocol phase. Tasks are only constructed when the
/// runner reaches them.
pub struct TaskChain {
    name: &'static str,
    role: Option<TradeRole>,
    constructors: Vec<TaskConstructor>,
}

impl TaskChain {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            role: None,
            constructors: Vec::new(),
        }
    }

    /// Restricts the chain to trades of `role`.
    pub fn for_role(name: &'static str, role: TradeRole) -> Self {
        Self {
            name,
            role: Some(role),
            constructors: Vec::new(),
        }
    }

    pub fn then<T: ProtocolTask + Default + 'static>(self) -> Self {
        self.with(|| Box::new(T::default()))
    }

    pub fn with(
        mut self,
        constructor: impl Fn() -> Box<dyn ProtocolTask> + Send + Sync + 'static,
    ) -> Self {
        self.constructors.push(Box::new(constructor));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn role(&self) -> Option<TradeRole> {
        self.role
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub(crate) fn construct(&self, cursor: usize) -> Option<Box<dyn ProtocolTask>> {
        self.constructors.get(cursor).map(|constructor| constructor())
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.constructors
            .iter()
            .map(|constructor| constructor().name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        common::error::TradeErrorKind,
        protocol::{DepositTxPublishedMessage, FiatTransferStartedMessage},
        testing::{RecordingTradeStore, SomeTestParams, TestMailbox, TestWallet},
    };

    fn services(mailbox: Arc<TestMailbox>) -> ProtocolServices {
        SomeTestParams::buyer_services(
            Arc::new(TestWallet::new("buyer")),
            mailbox,
            Arc::new(RecordingTradeStore::new()),
        )
    }

    fn deposit_message() -> DepositTxPublishedMessage {
        DepositTxPublishedMessage {
            trade_id: SomeTestParams::SELLER_OFFER_ID.to_string(),
            deposit_tx_id: format!("deposit-{}", SomeTestParams::SELLER_OFFER_ID),
            lock_time_block_height: SomeTestParams::LOCK_TIME_BLOCK_HEIGHT,
            sender_node_address: SomeTestParams::seller_node_address(),
        }
    }

    #[test]
    fn message_downcasts_to_expected_type_only() {
        let services = services(Arc::new(TestMailbox::arriving()));
        let mut trade = SomeTestParams::buyer_trade();
        let message = deposit_message();
        let ctx = TaskContext::new(&mut trade, &services, Some(&message));

        assert_eq!(
            ctx.message::<DepositTxPublishedMessage>().unwrap().deposit_tx_id,
            message.deposit_tx_id
        );
        let error = ctx.message::<FiatTransferStartedMessage>().unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::Protocol);
    }

    #[test]
    fn missing_message_is_missing_dependency() {
        let services = services(Arc::new(TestMailbox::arriving()));
        let mut trade = SomeTestParams::buyer_trade();
        let ctx = TaskContext::new(&mut trade, &services, None);

        let error = ctx.message::<DepositTxPublishedMessage>().unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::MissingDependency);
    }

    #[test]
    fn send_without_peer_never_reaches_messenger() {
        let mailbox = Arc::new(TestMailbox::arriving());
        let services = services(mailbox.clone());
        let mut trade = SomeTestParams::seller_trade();
        let ctx = TaskContext::new(&mut trade, &services, None);

        let error = ctx.send_to_peer(Box::new(deposit_message())).unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::MissingDependency);
        assert_eq!(mailbox.send_count(), 0);
    }

    #[tokio::test]
    async fn send_to_known_peer_awaits_delivery() {
        let mailbox = Arc::new(TestMailbox::storing_in_mailbox());
        let services = services(mailbox.clone());
        let mut trade = SomeTestParams::buyer_trade();
        let ctx = TaskContext::new(&mut trade, &services, None);

        let step = ctx.send_to_peer(Box::new(deposit_message())).unwrap();
        let TaskStep::AwaitDelivery(receipt) = step else {
            panic!("Send should suspend the task");
        };
        assert_eq!(receipt.outcome().await, MailboxOutcome::StoredInMailbox);
        assert_eq!(mailbox.sent_to(), vec![SomeTestParams::seller_node_address()]);
    }

    #[test]
    fn chain_constructs_tasks_lazily_in_order() {
        let chain = TaskChain::for_role("seller chain", TradeRole::Seller)
            .then::<crate::protocol::tasks::PublishDepositTx>()
            .then::<crate::protocol::tasks::SendDepositTxPublishedMessage>();

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.role(), Some(TradeRole::Seller));
        assert_eq!(
            chain.task_names(),
            vec!["PublishDepositTx", "SendDepositTxPublishedMessage"]
        );
        assert!(chain.construct(2).is_none());
        assert!(TaskChain::new("empty").is_empty());
    }
}
