//! Deterministic fixtures and in-memory collaborators for exercising trades without a
//! wallet or network.

mod doubles;
mod offer;
mod testing;

pub use doubles::{MailboxBehavior, RecordingTradeStore, TestMailbox, TestWallet};
pub use testing::SomeTestParams;
