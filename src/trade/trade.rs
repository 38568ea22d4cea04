use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    common::{
        error::TradeError,
        types::{NodeAddress, PubKeyRing, TradeId, TradeRole},
    },
    offer::Offer,
    protocol::ProtocolContext,
};

use super::TradeState;

const ERROR_MESSAGE_SEPARATOR: &str = "\n";

/// One negotiated exchange between two counterparties under an offer's terms.
///
/// State only moves forward. Failure and completion are not states: they are expressed by
/// which store the trade lives in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    id: TradeId,
    offer: Offer,
    role: TradeRole,
    is_maker: bool,
    state: TradeState,
    trading_peer_node_address: Option<NodeAddress>,
    error_message: Option<String>,
    context: ProtocolContext,
}

impl Trade {
    pub fn new(offer: Offer, is_maker: bool) -> Self {
        let role = TradeRole::from_offer(offer.direction, is_maker);
        Self {
            id: offer.id.clone(),
            offer,
            role,
            is_maker,
            state: TradeState::Preparation,
            trading_peer_node_address: None,
            error_message: None,
            context: ProtocolContext::new(),
        }
    }

    // Getter methods

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn offer(&self) -> &Offer {
        &self.offer
    }

    pub fn role(&self) -> TradeRole {
        self.role
    }

    pub fn is_maker(&self) -> bool {
        self.is_maker
    }

    pub fn state(&self) -> TradeState {
        self.state
    }

    pub fn arbitrator_node_address(&self) -> &NodeAddress {
        &self.offer.arbitrator_node_address
    }

    pub fn trading_peer_node_address(&self) -> Option<&NodeAddress> {
        self.trading_peer_node_address.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn context(&self) -> &ProtocolContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut ProtocolContext {
        &mut self.context
    }

    // Setter methods

    /// Moves the trade forward. Re-entering the current state is a no-op, so a message
    /// re-sent after a fault can complete its task again. Returns whether the state changed.
    pub fn set_state(&mut self, state: TradeState) -> Result<bool, TradeError> {
        if !state.allowed_for(self.role) || state < self.state {
            return Err(TradeError::InvalidStateTransition {
                from: self.state,
                to: state,
            });
        }
        if state == self.state {
            debug!("Trade w/ ID {} already in state {}", self.id, state);
            return Ok(false);
        }
        info!(
            "Trade w/ ID {} state {} -> {}",
            self.id, self.state, state
        );
        self.state = state;
        Ok(true)
    }

    /// Records the counterparty once the handshake establishes it. The address is fixed
    /// for the rest of the trade.
    pub fn set_trading_peer_node_address(
        &mut self,
        node_address: NodeAddress,
    ) -> Result<(), TradeError> {
        match &self.trading_peer_node_address {
            Some(existing) if *existing != node_address => Err(TradeError::Validation(format!(
                "Trade w/ ID {} already has trading peer {}, refusing {}",
                self.id, existing, node_address
            ))),
            Some(_) => Ok(()),
            None => {
                self.trading_peer_node_address = Some(node_address);
                Ok(())
            }
        }
    }

    pub fn set_trading_peer(
        &mut self,
        node_address: NodeAddress,
        pub_key_ring: PubKeyRing,
    ) -> Result<(), TradeError> {
        self.set_trading_peer_node_address(node_address)?;
        self.context
            .peer_pub_key_ring
            .set("peer_pub_key_ring", pub_key_ring)
    }

    pub fn append_to_error_message(&mut self, message: impl AsRef<str>) {
        match &mut self.error_message {
            Some(error_message) => {
                error_message.push_str(ERROR_MESSAGE_SEPARATOR);
                error_message.push_str(message.as_ref());
            }
            None => self.error_message = Some(message.as_ref().to_string()),
        }
    }
}
