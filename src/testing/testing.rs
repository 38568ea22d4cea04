use std::{fs, path::PathBuf, sync::Arc};

use uuid::Uuid;

use crate::{
    common::types::{KeyRing, NodeAddress},
    protocol::{MailboxMessenger, ProtocolServices, WalletService},
    store::TradeStore,
};

pub struct SomeTestParams {}

impl SomeTestParams {
    pub const LOCK_TIME_BLOCK_HEIGHT: u32 = 800_144;
    pub const SELLER_PAYOUT_ADDRESS: &'static str = "bc1qsellerpayout0wn5dg4jn3p2pvl3g5x0ukf2f6";
    pub const BUYER_PAYOUT_ADDRESS: &'static str = "bc1qbuyerpayout0r7gkqzshx8l2y4v3fz5xm9n2q";
    pub const SELLER_OFFER_ID: &'static str = "20c38e4b-037b-4654-b99c-1d9f2beb755f";

    pub fn seller_key_ring() -> KeyRing {
        KeyRing::from_slices(&[0x51; 32], &[0x52; 32]).unwrap()
    }

    pub fn buyer_key_ring() -> KeyRing {
        KeyRing::from_slices(&[0xb1; 32], &[0xb2; 32]).unwrap()
    }

    pub fn seller_node_address() -> NodeAddress {
        NodeAddress::new("sellerqw3i6kk3ztf5ncvsm3wr7tqnmyhvgxkbwb3gsxdbqdrbxkvyd.onion", 9999)
    }

    pub fn buyer_node_address() -> NodeAddress {
        NodeAddress::new("buyerlp6fbxmvxjpi3kgttp5ucv7nzz3jzzdmcb4e3oukeltqbypid.onion", 9999)
    }

    pub fn arbitrator_node_address() -> NodeAddress {
        NodeAddress::new("arbitratorq3m5ja2ulm7fkjh3zdfgl3mvkxhzkjcg2xqfksnrnmhyd.onion", 9999)
    }

    pub fn seller_services(
        wallet: Arc<dyn WalletService>,
        messenger: Arc<dyn MailboxMessenger>,
        trade_store: Arc<dyn TradeStore>,
    ) -> ProtocolServices {
        ProtocolServices::new(
            wallet,
            messenger,
            trade_store,
            Self::seller_key_ring(),
            Self::seller_node_address(),
        )
    }

    pub fn buyer_services(
        wallet: Arc<dyn WalletService>,
        messenger: Arc<dyn MailboxMessenger>,
        trade_store: Arc<dyn TradeStore>,
    ) -> ProtocolServices {
        ProtocolServices::new(
            wallet,
            messenger,
            trade_store,
            Self::buyer_key_ring(),
            Self::buyer_node_address(),
        )
    }

    /// Fresh, empty directory unique to the caller.
    pub fn temp_data_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("crusty-settle-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}
