use iso_currency::Currency;
use serde::{Deserialize, Serialize};

use crate::common::types::{Direction, KeyRing, NodeAddress, PubKeyRing};

const SATS_PER_BTC: u64 = 100_000_000;

// Offer Data Structure

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub direction: Direction,
    pub amount_sat: u64,
    pub price: u64, // Fiat minor units per whole BTC
    pub currency: Currency,
    pub owner_pub_key_ring: PubKeyRing,
    pub arbitrator_node_address: NodeAddress,
}

impl Offer {
    pub fn is_my_offer(&self, key_ring: &KeyRing) -> bool {
        self.owner_pub_key_ring == key_ring.pub_key_ring()
    }

    /// Fiat volume in minor units, rounded down.
    pub fn volume(&self) -> u64 {
        ((self.amount_sat as u128 * self.price as u128) / SATS_PER_BTC as u128) as u64
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::SomeTestParams;

    #[test]
    fn offer_belongs_to_owner_key_ring_only() {
        let offer = SomeTestParams::seller_offer();
        assert!(offer.is_my_offer(&SomeTestParams::seller_key_ring()));
        assert!(!offer.is_my_offer(&SomeTestParams::buyer_key_ring()));
    }

    #[test]
    fn volume_is_amount_times_price() {
        let mut offer = SomeTestParams::seller_offer();
        offer.amount_sat = 50_000_000;
        offer.price = 3_000_000;
        assert_eq!(offer.volume(), 1_500_000);
    }
}
