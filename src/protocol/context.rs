use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::{error::TradeError, types::PubKeyRing};

/// A context slot that is set at most once per trade. Re-writing the identical value is
/// accepted, since a replayed protocol message carries the same artifact. Any differing
/// write is rejected and the stored value is kept.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteOnce<T> {
    value: Option<T>,
}

impl<T> Default for WriteOnce<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<T: PartialEq + std::fmt::Debug> WriteOnce<T> {
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    pub fn set(&mut self, field: &'static str, value: T) -> Result<(), TradeError> {
        self.check(field, &value)?;
        if self.value.is_none() {
            self.value = Some(value);
        }
        Ok(())
    }

    /// Fails the way [`WriteOnce::set`] would, without writing. Lets a task validate all
    /// of a message's artifacts before recording any of them.
    pub fn check(&self, field: &'static str, value: &T) -> Result<(), TradeError> {
        match &self.value {
            Some(existing) if existing != value => {
                warn!(
                    "Rejected overwrite of {} - existing {:?}, attempted {:?}",
                    field, existing, value
                );
                Err(TradeError::ContextOverwrite { field })
            }
            _ => Ok(()),
        }
    }

    /// Returns the value or a `MissingDependency` error naming the field.
    pub fn require(&self, field: &'static str) -> Result<&T, TradeError> {
        self.value.as_ref().ok_or_else(|| {
            TradeError::MissingDependency(format!("{} is not yet known", field))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositTxRef {
    pub tx_id: String,
}

/// Artifacts accumulated across the protocol steps of one trade. Owned by its [`Trade`]
/// and persisted with it. Wallet and mailbox handles are not part of it; they reach the
/// tasks through [`ProtocolServices`].
///
/// [`Trade`]: crate::trade::Trade
/// [`ProtocolServices`]: crate::protocol::ProtocolServices
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolContext {
    pub peer_pub_key_ring: WriteOnce<PubKeyRing>,
    pub deposit_tx: WriteOnce<DepositTxRef>,
    pub lock_time_block_height: WriteOnce<u32>,
    pub payout_address: WriteOnce<String>,
    pub peer_payout_address: WriteOnce<String>,
    pub payout_tx_signature: WriteOnce<Vec<u8>>,
    pub peer_payout_tx_signature: WriteOnce<Vec<u8>>,
    pub payout_tx_id: WriteOnce<String>,
}

impl ProtocolContext {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::TradeErrorKind;

    #[test]
    fn first_write_is_stored() {
        let mut context = ProtocolContext::new();
        context
            .payout_tx_signature
            .set("payout_tx_signature", vec![1, 2, 3])
            .unwrap();
        assert_eq!(context.payout_tx_signature.get(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn identical_rewrite_is_accepted() {
        let mut context = ProtocolContext::new();
        context.lock_time_block_height.set("lock_time", 800_144).unwrap();
        context.lock_time_block_height.set("lock_time", 800_144).unwrap();
        assert_eq!(context.lock_time_block_height.get(), Some(&800_144));
    }

    #[test]
    fn differing_rewrite_is_rejected_and_value_kept() {
        let mut context = ProtocolContext::new();
        context
            .payout_tx_signature
            .set("payout_tx_signature", vec![1, 2, 3])
            .unwrap();
        let error = context
            .payout_tx_signature
            .set("payout_tx_signature", vec![9, 9, 9])
            .unwrap_err();
        assert!(matches!(
            error,
            TradeError::ContextOverwrite {
                field: "payout_tx_signature"
            }
        ));
        assert_eq!(context.payout_tx_signature.get(), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn check_reports_conflict_without_writing() {
        let mut context = ProtocolContext::new();
        assert!(context
            .lock_time_block_height
            .check("lock_time_block_height", &800_144)
            .is_ok());
        assert!(!context.lock_time_block_height.is_set());

        context
            .lock_time_block_height
            .set("lock_time_block_height", 800_144)
            .unwrap();
        assert!(context
            .lock_time_block_height
            .check("lock_time_block_height", &800_144)
            .is_ok());
        let error = context
            .lock_time_block_height
            .check("lock_time_block_height", &800_200)
            .unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::Protocol);
    }

    #[test]
    fn require_on_empty_field_is_missing_dependency() {
        let context = ProtocolContext::new();
        let error = context.deposit_tx.require("deposit_tx").unwrap_err();
        assert_eq!(error.kind(), TradeErrorKind::MissingDependency);
    }

    #[test]
    fn context_survives_json_round_trip() {
        let mut context = ProtocolContext::new();
        context
            .deposit_tx
            .set(
                "deposit_tx",
                DepositTxRef {
                    tx_id: "aa".repeat(32),
                },
            )
            .unwrap();
        let json = serde_json::to_string(&context).unwrap();
        let restored: ProtocolContext = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, context);
    }
}
