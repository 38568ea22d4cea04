use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::mpsc;

use crusty_settle::{
    common::types::{KeyRing, NodeAddress},
    config::TradeManagerConfig,
    manager::TradeManager,
    protocol::{InterceptHook, MailboxMessage},
    testing::{MailboxBehavior, SomeTestParams, TestMailbox, TestWallet},
    TradeError,
};

/// One side of a trade: a manager with its own data dir, wallet and mailbox. Messages
/// the peer sends land in `inbox_rx` and are handed to the manager by
/// [`TestNode::deliver_next`].
pub struct TestNode {
    pub manager: TradeManager,
    pub mailbox: Arc<TestMailbox>,
    pub wallet: Arc<TestWallet>,
    pub key_ring: KeyRing,
    pub node_address: NodeAddress,
    pub data_dir: PathBuf,
    inbox_rx: mpsc::UnboundedReceiver<Box<dyn MailboxMessage>>,
    intercept_hook: Option<InterceptHook>,
}

impl TestNode {
    /// Seller and buyer whose mailboxes feed each other's inbox.
    pub async fn pair() -> (TestNode, TestNode) {
        Self::pair_with_hooks(None, None).await
    }

    pub async fn pair_with_hooks(
        seller_hook: Option<InterceptHook>,
        buyer_hook: Option<InterceptHook>,
    ) -> (TestNode, TestNode) {
        let (to_seller_tx, to_seller_rx) = mpsc::unbounded_channel();
        let (to_buyer_tx, to_buyer_rx) = mpsc::unbounded_channel();

        let seller = Self::start(
            "seller",
            SomeTestParams::seller_key_ring(),
            SomeTestParams::seller_node_address(),
            Arc::new(TestMailbox::forwarding(MailboxBehavior::Arrive, to_buyer_tx)),
            to_seller_rx,
            seller_hook,
        )
        .await;
        let buyer = Self::start(
            "buyer",
            SomeTestParams::buyer_key_ring(),
            SomeTestParams::buyer_node_address(),
            Arc::new(TestMailbox::forwarding(MailboxBehavior::Arrive, to_seller_tx)),
            to_buyer_rx,
            buyer_hook,
        )
        .await;
        (seller, buyer)
    }

    async fn start(
        label: &str,
        key_ring: KeyRing,
        node_address: NodeAddress,
        mailbox: Arc<TestMailbox>,
        inbox_rx: mpsc::UnboundedReceiver<Box<dyn MailboxMessage>>,
        intercept_hook: Option<InterceptHook>,
    ) -> TestNode {
        let data_dir = SomeTestParams::temp_data_dir();
        let wallet = Arc::new(TestWallet::new(label));
        let manager = Self::new_manager(
            &data_dir,
            &key_ring,
            &node_address,
            &wallet,
            &mailbox,
            intercept_hook.clone(),
        )
        .await
        .unwrap();

        TestNode {
            manager,
            mailbox,
            wallet,
            key_ring,
            node_address,
            data_dir,
            inbox_rx,
            intercept_hook,
        }
    }

    async fn new_manager(
        data_dir: &PathBuf,
        key_ring: &KeyRing,
        node_address: &NodeAddress,
        wallet: &Arc<TestWallet>,
        mailbox: &Arc<TestMailbox>,
        intercept_hook: Option<InterceptHook>,
    ) -> Result<TradeManager, TradeError> {
        let mut config = TradeManagerConfig::new(data_dir);
        config.trade_request_channel_size(4);
        TradeManager::new_with_intercept_hook(
            config,
            key_ring.clone(),
            node_address.clone(),
            wallet.clone(),
            mailbox.clone(),
            intercept_hook,
        )
        .await
    }

    /// Hands the next message from the peer to the manager.
    pub async fn deliver_next(&mut self) -> Result<(), TradeError> {
        let message = self
            .inbox_rx
            .try_recv()
            .expect("Peer should have sent a message");
        self.manager.handle_mailbox_message(message).await
    }

    pub fn inbox_is_empty(&mut self) -> bool {
        self.inbox_rx.try_recv().is_err()
    }

    /// Shuts the manager down and starts a new one on the same data dir, as after a
    /// process restart.
    pub async fn restart(self) -> TestNode {
        self.restart_after(|_| {}).await
    }

    /// Like [`TestNode::restart`], with `edit` run on the data dir while no manager is
    /// up. Lets a test leave the stores the way an interrupted process would.
    pub async fn restart_after(self, edit: impl FnOnce(&Path)) -> TestNode {
        let TestNode {
            manager,
            mailbox,
            wallet,
            key_ring,
            node_address,
            data_dir,
            inbox_rx,
            intercept_hook,
        } = self;
        manager.shutdown().await.unwrap();
        edit(&data_dir);

        let manager = Self::new_manager(
            &data_dir,
            &key_ring,
            &node_address,
            &wallet,
            &mailbox,
            intercept_hook.clone(),
        )
        .await
        .unwrap();

        TestNode {
            manager,
            mailbox,
            wallet,
            key_ring,
            node_address,
            data_dir,
            inbox_rx,
            intercept_hook,
        }
    }
}
