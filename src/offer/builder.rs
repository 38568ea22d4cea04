use std::result::Result;

use iso_currency::Currency;
use uuid::Uuid;

use crate::common::{
    error::TradeError,
    types::{Direction, NodeAddress, PubKeyRing},
};

use super::Offer;

pub struct OfferBuilder {
    id: Option<String>,
    direction: Option<Direction>,
    amount_sat: Option<u64>,
    price: Option<u64>,
    currency: Option<Currency>,
    owner_pub_key_ring: Option<PubKeyRing>,
    arbitrator_node_address: Option<NodeAddress>,
}

impl OfferBuilder {
    pub fn new() -> Self {
        Self {
            id: None,
            direction: None,
            amount_sat: None,
            price: None,
            currency: None,
            owner_pub_key_ring: None,
            arbitrator_node_address: None,
        }
    }

    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.id = Some(id.into());
        self
    }

    pub fn direction(&mut self, direction: impl Into<Direction>) -> &mut Self {
        self.direction = Some(direction.into());
        self
    }

    pub fn amount_sat(&mut self, amount_sat: impl Into<u64>) -> &mut Self {
        self.amount_sat = Some(amount_sat.into());
        self
    }

    pub fn price(&mut self, price: impl Into<u64>) -> &mut Self {
        self.price = Some(price.into());
        self
    }

    pub fn currency(&mut self, currency: impl Into<Currency>) -> &mut Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn owner_pub_key_ring(&mut self, owner_pub_key_ring: impl Into<PubKeyRing>) -> &mut Self {
        self.owner_pub_key_ring = Some(owner_pub_key_ring.into());
        self
    }

    pub fn arbitrator_node_address(
        &mut self,
        arbitrator_node_address: impl Into<NodeAddress>,
    ) -> &mut Self {
        self.arbitrator_node_address = Some(arbitrator_node_address.into());
        self
    }

    pub fn build(&mut self) -> Result<Offer, TradeError> {
        let id = if let Some(explicit_id) = self.id.take() {
            explicit_id
        } else {
            Uuid::new_v4().to_string()
        };

        let Some(direction) = self.direction else {
            return Err(TradeError::Validation("No Direction defined".to_string()));
        };

        let amount_sat = match self.amount_sat {
            Some(amount_sat) if amount_sat > 0 => amount_sat,
            Some(_) => {
                return Err(TradeError::Validation("Amount must be non-zero".to_string()));
            }
            None => return Err(TradeError::Validation("No Amount defined".to_string())),
        };

        let price = match self.price {
            Some(price) if price > 0 => price,
            Some(_) => return Err(TradeError::Validation("Price must be non-zero".to_string())),
            None => return Err(TradeError::Validation("No Price defined".to_string())),
        };

        let Some(currency) = self.currency else {
            return Err(TradeError::Validation("No Currency defined".to_string()));
        };

        let Some(owner_pub_key_ring) = self.owner_pub_key_ring else {
            return Err(TradeError::Validation(
                "No Owner PubKeyRing defined".to_string(),
            ));
        };

        let Some(arbitrator_node_address) = self.arbitrator_node_address.take() else {
            return Err(TradeError::Validation(
                "No Arbitrator NodeAddress defined".to_string(),
            ));
        };

        let offer = Offer {
            id,
            direction,
            amount_sat,
            price,
            currency,
            owner_pub_key_ring,
            arbitrator_node_address,
        };

        Ok(offer)
    }
}

impl Default for OfferBuilder {
    fn default() -> Self {
        Self::new()
    }
}
