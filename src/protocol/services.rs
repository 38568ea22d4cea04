use std::sync::Arc;

use crate::{
    common::types::{KeyRing, NodeAddress},
    store::TradeStore,
};

use super::{mailbox::MailboxMessenger, wallet::WalletService};

/// Collaborators a task chain needs, injected by whoever owns the trade. Nothing in
/// here is owned by a trade; one instance is typically shared by all trades of a node.
#[derive(Clone)]
pub struct ProtocolServices {
    pub wallet: Arc<dyn WalletService>,
    pub messenger: Arc<dyn MailboxMessenger>,
    pub trade_store: Arc<dyn TradeStore>,
    pub key_ring: KeyRing,
    pub my_node_address: NodeAddress,
}

impl ProtocolServices {
    pub fn new(
        wallet: Arc<dyn WalletService>,
        messenger: Arc<dyn MailboxMessenger>,
        trade_store: Arc<dyn TradeStore>,
        key_ring: KeyRing,
        my_node_address: NodeAddress,
    ) -> Self {
        Self {
            wallet,
            messenger,
            trade_store,
            key_ring,
            my_node_address,
        }
    }
}
