use iso_currency::Currency;

use crate::{
    common::types::Direction,
    offer::{Offer, OfferBuilder},
    protocol::DepositTxRef,
    trade::{Trade, TradeState},
};

use super::SomeTestParams;

impl SomeTestParams {
    /// Builder for an offer owned by the maker of `direction`: the seller's key ring for
    /// a sell offer, the buyer's for a buy offer.
    pub fn offer_builder(direction: Direction) -> OfferBuilder {
        let owner_key_ring = match direction {
            Direction::Sell => Self::seller_key_ring(),
            Direction::Buy => Self::buyer_key_ring(),
        };

        let mut builder = OfferBuilder::new();
        builder
            .direction(direction)
            .amount_sat(2_500_000u64)
            .price(5_830_000u64) // 58,300.00 EUR per BTC
            .currency(Currency::EUR)
            .owner_pub_key_ring(owner_key_ring.pub_key_ring())
            .arbitrator_node_address(Self::arbitrator_node_address());
        builder
    }

    pub fn seller_offer() -> Offer {
        Self::seller_offer_with_id(Self::SELLER_OFFER_ID)
    }

    pub fn seller_offer_with_id(offer_id: &str) -> Offer {
        Self::offer_builder(Direction::Sell)
            .id(offer_id)
            .build()
            .unwrap()
    }

    /// The seller's side of the trade on [`SomeTestParams::seller_offer`], peer unknown.
    pub fn seller_trade() -> Trade {
        Trade::new(Self::seller_offer(), true)
    }

    /// The buyer's side of the trade on [`SomeTestParams::seller_offer`], with the seller
    /// as trading peer.
    pub fn buyer_trade() -> Trade {
        Self::buyer_trade_for(Self::SELLER_OFFER_ID)
    }

    pub fn buyer_trade_for(offer_id: &str) -> Trade {
        let mut trade = Trade::new(Self::seller_offer_with_id(offer_id), false);
        trade
            .set_trading_peer(
                Self::seller_node_address(),
                Self::seller_key_ring().pub_key_ring(),
            )
            .unwrap();
        trade
    }

    /// Seller trade whose deposit is published and announced to the buyer.
    pub fn seller_trade_with_deposit() -> Trade {
        let mut trade = Self::seller_trade();
        trade
            .set_trading_peer(
                Self::buyer_node_address(),
                Self::buyer_key_ring().pub_key_ring(),
            )
            .unwrap();

        let context = trade.context_mut();
        context
            .deposit_tx
            .set(
                "deposit_tx",
                DepositTxRef {
                    tx_id: format!("deposit-{}", Self::SELLER_OFFER_ID),
                },
            )
            .unwrap();
        context
            .lock_time_block_height
            .set("lock_time_block_height", Self::LOCK_TIME_BLOCK_HEIGHT)
            .unwrap();
        trade
            .set_state(TradeState::SellerSentDepositTxPublishedMsg)
            .unwrap();
        trade
    }

    /// Seller trade that received the buyer's fiat notice and already signed the payout.
    /// Only the finalize request is left to send.
    pub fn seller_trade_awaiting_fiat_receipt() -> Trade {
        let mut trade = Self::seller_trade_with_deposit();
        let context = trade.context_mut();
        context
            .peer_payout_address
            .set("peer_payout_address", Self::BUYER_PAYOUT_ADDRESS.to_string())
            .unwrap();
        context
            .payout_tx_signature
            .set("payout_tx_signature", vec![0x30, 0x44, 0x02, 0x20])
            .unwrap();
        trade
            .set_state(TradeState::SellerReceivedFiatPaymentInitiatedMsg)
            .unwrap();
        trade
    }
}
