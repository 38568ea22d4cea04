use dyn_clone::DynClone;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

use std::any::Any;
use std::{fmt, fmt::Debug, str::FromStr};

use crate::common::error::TradeError;

pub type TradeId = String;

#[typetag::serde(tag = "type")]
pub trait SerdeGenericTrait: DynClone + Debug + Send + Sync {
    fn any_ref(&self) -> &dyn Any;
}

dyn_clone::clone_trait_object!(SerdeGenericTrait);

impl dyn SerdeGenericTrait {
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.any_ref().downcast_ref()
    }
}

/// Network address of a peer, as handed out by the P2P layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddress {
    pub host_name: String,
    pub port: u16,
}

impl NodeAddress {
    pub fn new(host_name: impl Into<String>, port: u16) -> Self {
        Self {
            host_name: host_name.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host_name, self.port)
    }
}

impl FromStr for NodeAddress {
    type Err = TradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((host_name, port)) = s.rsplit_once(':') else {
            return Err(TradeError::Validation(format!(
                "Node address {} is missing a port",
                s
            )));
        };
        if host_name.is_empty() {
            return Err(TradeError::Validation(format!(
                "Node address {} is missing a host name",
                s
            )));
        }
        let port = port.parse::<u16>().map_err(|error| {
            TradeError::Validation(format!("Node address {} has invalid port - {}", s, error))
        })?;
        Ok(Self::new(host_name, port))
    }
}

/// Public half of a peer's key material. Messages to the peer are encrypted to
/// `encryption_pub_key`; the peer signs with the key behind `signature_pub_key`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubKeyRing {
    pub signature_pub_key: PublicKey,
    pub encryption_pub_key: PublicKey,
}

/// Local identity. Only the public halves are kept: signing and decryption happen inside
/// the wallet and messenger, which hold their own secrets.
#[derive(Clone, Debug)]
pub struct KeyRing {
    pub_key_ring: PubKeyRing,
}

impl KeyRing {
    pub fn new(signature_key: SecretKey, encryption_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let pub_key_ring = PubKeyRing {
            signature_pub_key: PublicKey::from_secret_key(&secp, &signature_key),
            encryption_pub_key: PublicKey::from_secret_key(&secp, &encryption_key),
        };
        Self { pub_key_ring }
    }

    pub fn from_slices(signature_key: &[u8], encryption_key: &[u8]) -> Result<Self, TradeError> {
        let signature_key = SecretKey::from_slice(signature_key)?;
        let encryption_key = SecretKey::from_slice(encryption_key)?;
        Ok(Self::new(signature_key, encryption_key))
    }

    pub fn pub_key_ring(&self) -> PubKeyRing {
        self.pub_key_ring
    }
}

/// Direction of an offer from the maker's point of view.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
pub enum Direction {
    Buy,
    Sell,
}

/// Which side of the Bitcoin leg the local actor is on. The seller funds the deposit and
/// releases the payout once fiat arrives; the buyer sends fiat and publishes the payout.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, IntoStaticStr,
)]
pub enum TradeRole {
    Buyer,
    Seller,
}

impl TradeRole {
    pub fn from_offer(direction: Direction, is_maker: bool) -> Self {
        match (direction, is_maker) {
            (Direction::Buy, true) | (Direction::Sell, false) => TradeRole::Buyer,
            (Direction::Sell, true) | (Direction::Buy, false) => TradeRole::Seller,
        }
    }

    pub fn counterparty(&self) -> Self {
        match self {
            TradeRole::Buyer => TradeRole::Seller,
            TradeRole::Seller => TradeRole::Buyer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_address_round_trips_through_display() {
        let address = NodeAddress::new("abcdefgh.onion", 9999);
        let parsed = NodeAddress::from_str(&address.to_string()).unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn node_address_without_port_is_rejected() {
        assert!(NodeAddress::from_str("abcdefgh.onion").is_err());
        assert!(NodeAddress::from_str(":9999").is_err());
        assert!(NodeAddress::from_str("host:notaport").is_err());
    }

    #[test]
    fn maker_selling_is_seller_and_taker_is_buyer() {
        assert_eq!(TradeRole::from_offer(Direction::Sell, true), TradeRole::Seller);
        assert_eq!(TradeRole::from_offer(Direction::Sell, false), TradeRole::Buyer);
        assert_eq!(TradeRole::from_offer(Direction::Buy, true), TradeRole::Buyer);
        assert_eq!(TradeRole::from_offer(Direction::Buy, false), TradeRole::Seller);
        assert_eq!(TradeRole::Buyer.counterparty(), TradeRole::Seller);
    }

    #[test]
    fn key_ring_derives_distinct_public_keys() {
        let key_ring = KeyRing::from_slices(&[0x11; 32], &[0x22; 32]).unwrap();
        let pub_key_ring = key_ring.pub_key_ring();
        assert_ne!(
            pub_key_ring.signature_pub_key,
            pub_key_ring.encryption_pub_key
        );
    }

    #[test]
    fn key_ring_rejects_invalid_secret() {
        assert!(KeyRing::from_slices(&[0x00; 32], &[0x22; 32]).is_err());
    }
}
