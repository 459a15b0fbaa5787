//! Core traits defining AGORANET interfaces
//!
//! These traits define the contracts between the ledger and its external
//! collaborators: the key-value state engine, the exchange-rate oracle, and
//! the payment transfer rail.

use crate::types::*;
use async_trait::async_trait;

/// Result type for AGORANET operations
pub type AgoranetResult<T> = Result<T, crate::error::AgoranetError>;

/// State provider trait
#[async_trait]
pub trait StateProvider: Send + Sync {
    /// Get the current state version
    async fn version(&self) -> StateVersion;

    /// Get a value by key
    async fn get(&self, key: &[u8]) -> AgoranetResult<Option<Vec<u8>>>;

    /// Check if a key exists
    async fn exists(&self, key: &[u8]) -> AgoranetResult<bool>;
}

/// State mutator trait
#[async_trait]
pub trait StateMutator: StateProvider {
    /// Set a value
    async fn set(&self, key: &[u8], value: &[u8]) -> AgoranetResult<()>;

    /// Delete a key
    async fn delete(&self, key: &[u8]) -> AgoranetResult<()>;

    /// Apply a batch of changes atomically
    ///
    /// All writes belonging to one ledger mutation go through a single
    /// batch so that a derived index can never be updated without its
    /// primary record.
    async fn apply_batch(&self, changes: Vec<StateChange>) -> AgoranetResult<StateVersion>;
}

/// State change operation
#[derive(Debug, Clone)]
pub enum StateChange {
    Set { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Exchange-rate oracle trait
///
/// Supplies the current rate between the payment denomination and the
/// reference currency. Price aggregation is the oracle's own concern; the
/// ledger only consumes the latest rate, resolved synchronously before a
/// payment check proceeds.
#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Get the latest exchange rate
    async fn latest_rate(&self) -> AgoranetResult<Rate>;
}

/// External transfer rail for treasury withdrawals
///
/// The transfer must be all-or-nothing: on `Err` no funds have moved and
/// the caller keeps its balance bookkeeping unchanged.
#[async_trait]
pub trait TransferAgent: Send + Sync {
    /// Transfer `amount` to `to`
    async fn transfer(&self, to: Address, amount: Amount) -> AgoranetResult<()>;
}
