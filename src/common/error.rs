use std::{error::Error, fmt};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, IntoStaticStr};

use crate::trade::TradeState;

/// Coarse classification of a [`TradeError`]. Callers use it to decide whether a halted
/// trade is worth retrying or belongs in the failed-trades store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, IntoStaticStr)]
pub enum TradeErrorKind {
    MissingDependency,
    DeliveryFault,
    UnexpectedTask,
    Protocol,
    Internal,
}

#[derive(Debug)]
pub enum TradeError {
    Simple(String),
    MissingDependency(String),
    DeliveryFault(String),
    UnexpectedTask(String),
    Intercepted(String),
    ContextOverwrite { field: &'static str },
    InvalidStateTransition { from: TradeState, to: TradeState },
    Wallet(String),
    Validation(String),
    EmptyChain(String),
    StrumParsing(strum::ParseError),
    CurrencyParsing(iso_currency::ParseCurrencyError),
    Secp256k1(secp256k1::Error),
    SerdesJson(serde_json::Error),
    Io(std::io::Error),
    MpscSend(String),
    OneshotRecv(tokio::sync::oneshot::error::RecvError),
}

impl TradeError {
    pub fn kind(&self) -> TradeErrorKind {
        match self {
            TradeError::MissingDependency(_) => TradeErrorKind::MissingDependency,
            TradeError::DeliveryFault(_) => TradeErrorKind::DeliveryFault,
            TradeError::UnexpectedTask(_) | TradeError::Intercepted(_) => {
                TradeErrorKind::UnexpectedTask
            }
            TradeError::ContextOverwrite { .. }
            | TradeError::InvalidStateTransition { .. }
            | TradeError::Wallet(_)
            | TradeError::Validation(_) => TradeErrorKind::Protocol,
            TradeError::Simple(_)
            | TradeError::EmptyChain(_)
            | TradeError::StrumParsing(_)
            | TradeError::CurrencyParsing(_)
            | TradeError::Secp256k1(_)
            | TradeError::SerdesJson(_)
            | TradeError::Io(_)
            | TradeError::MpscSend(_)
            | TradeError::OneshotRecv(_) => TradeErrorKind::Internal,
        }
    }
}

impl Error for TradeError {}

impl fmt::Display for TradeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let error_string = match self {
            TradeError::Simple(msg) => format!("crusty-settle | Other - {}", msg),
            TradeError::MissingDependency(msg) => {
                format!("crusty-settle | MissingDependency - {}", msg)
            }
            TradeError::DeliveryFault(msg) => format!("crusty-settle | DeliveryFault - {}", msg),
            TradeError::UnexpectedTask(msg) => {
                format!("crusty-settle | UnexpectedTaskError - {}", msg)
            }
            TradeError::Intercepted(msg) => format!("crusty-settle | Intercepted - {}", msg),
            TradeError::ContextOverwrite { field } => format!(
                "crusty-settle | ContextOverwrite - {} already set to a different value",
                field
            ),
            TradeError::InvalidStateTransition { from, to } => format!(
                "crusty-settle | InvalidStateTransition - {} cannot move to {}",
                from, to
            ),
            TradeError::Wallet(msg) => format!("crusty-settle | WalletError - {}", msg),
            TradeError::Validation(msg) => format!("crusty-settle | Validation - {}", msg),
            TradeError::EmptyChain(name) => {
                format!("crusty-settle | EmptyChain - task chain {} has no tasks", name)
            }
            TradeError::StrumParsing(err) => {
                format!("crusty-settle | StrumParseError - {}", err)
            }
            TradeError::CurrencyParsing(err) => {
                format!("crusty-settle | ParseCurrencyError - {}", err)
            }
            TradeError::Secp256k1(err) => format!("crusty-settle | Secp256k1Error - {}", err),
            TradeError::SerdesJson(err) => format!("crusty-settle | SerdesJsonError - {}", err),
            TradeError::Io(err) => format!("crusty-settle | IoError - {}", err),
            TradeError::MpscSend(msg) => format!("crusty-settle | MpscSendError - {}", msg),
            TradeError::OneshotRecv(err) => {
                format!("crusty-settle | OneshotRecvError - {}", err)
            }
        };
        write!(f, "{}", error_string)
    }
}

impl From<strum::ParseError> for TradeError {
    fn from(e: strum::ParseError) -> TradeError {
        TradeError::StrumParsing(e)
    }
}

impl From<iso_currency::ParseCurrencyError> for TradeError {
    fn from(e: iso_currency::ParseCurrencyError) -> TradeError {
        TradeError::CurrencyParsing(e)
    }
}

impl From<secp256k1::Error> for TradeError {
    fn from(e: secp256k1::Error) -> TradeError {
        TradeError::Secp256k1(e)
    }
}

impl From<serde_json::Error> for TradeError {
    fn from(e: serde_json::Error) -> TradeError {
        TradeError::SerdesJson(e)
    }
}

impl From<std::io::Error> for TradeError {
    fn from(e: std::io::Error) -> TradeError {
        TradeError::Io(e)
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for TradeError {
    fn from(e: tokio::sync::mpsc::error::SendError<T>) -> TradeError {
        TradeError::MpscSend(e.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for TradeError {
    fn from(e: tokio::sync::oneshot::error::RecvError) -> TradeError {
        TradeError::OneshotRecv(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dependency_is_classified() {
        let error = TradeError::MissingDependency("peer node address".to_string());
        assert_eq!(error.kind(), TradeErrorKind::MissingDependency);
        assert!(error.to_string().contains("peer node address"));
    }

    #[test]
    fn intercepted_counts_as_unexpected() {
        let error = TradeError::Intercepted("SignPayoutTx".to_string());
        assert_eq!(error.kind(), TradeErrorKind::UnexpectedTask);
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let error = TradeError::InvalidStateTransition {
            from: TradeState::SellerSentFiatPaymentReceiptMsg,
            to: TradeState::SellerPublishedDepositTx,
        };
        let string = error.to_string();
        assert!(string.contains("SELLER_SENT_FIAT_PAYMENT_RECEIPT_MSG"));
        assert!(string.contains("SELLER_PUBLISHED_DEPOSIT_TX"));
        assert_eq!(error.kind(), TradeErrorKind::Protocol);
    }
}
