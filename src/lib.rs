/// Account balances and cards.
/// Balances are modified using events, which are created by handling commands
pub mod account;

/// Validated requests. Nothing in here touches the store.
pub mod command;

pub mod currency;

pub mod error;

/// Ledger rows and the filter used to query them.
pub mod transaction;

/// Storage interface, plus "in memory" implementation.
///
/// Engines only talk to the traits, so the in memory store can be replaced
/// with a database backed one.
pub mod store;

/// Reference lookups, serialized per key.
pub mod idempotency;

/// Top-ups and peer to peer transfers.
pub mod transfer;

/// Card authorization state machine and the card network message format.
pub mod authorization;

pub mod config;

/// Wires both engines to a single store.
pub mod wallet;

/// Ideally, this module should exist on its own crate, as a way to
/// bootstrap the ledger from a binary. It lives here so integration tests
/// can drive it.
pub mod bin_utils;
