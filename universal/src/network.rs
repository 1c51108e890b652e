//! The interface to the target chain's network, and the types which cross it.

use std::fmt::{self, Display, Formatter};

use alloy::primitives::{B256, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::UniversalAccount;

/// The hash of a submitted transaction. The caller owns the handle once it is returned; nothing in this crate tracks
/// it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHandle(pub B256);

impl Display for TxHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tagged payload. `category` names the application and message type, as `<APP>:<SUBTYPE>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub category: String,
    pub data: Bytes,
}

/// An [Envelope] together with the signature over its `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    pub category: String,
    pub data: Bytes,
    pub signature: Bytes,
    /// The account which produced `signature`.
    pub signer: UniversalAccount,
    /// The account on the target chain which the transaction is sent from. For external signers this is their
    /// derived wallet.
    pub from: UniversalAccount,
}

impl SignedEnvelope {
    pub fn envelope(&self) -> Envelope {
        Envelope {
            category: self.category.clone(),
            data: self.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum QueryScope {
    /// Transactions sent by or to an account.
    Account(UniversalAccount),
    /// Transactions whose envelope has the given category.
    Category(String),
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryFilter {
    pub scope: QueryScope,
    /// Only include blocks produced at or after this time, in milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub order: Order,
    /// 1-based page number.
    pub page: u32,
    pub limit: u32,
}

impl QueryFilter {
    /// The first page of up to 10 results within `scope`, newest first.
    pub fn new(scope: QueryScope) -> Self {
        QueryFilter {
            scope,
            start_time: None,
            order: Order::Desc,
            page: 1,
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: TxHandle,
    pub category: String,
    pub data: Bytes,
    pub from: UniversalAccount,
    #[serde(default)]
    pub recipients: Vec<UniversalAccount>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub hash: B256,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub blocks: Vec<Block>,
}

impl QueryResult {
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks.iter().flat_map(|b| b.transactions.iter())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The request may not have reached the node.
    #[error("transport error: {0}")]
    Transport(String),
    /// The node received the request and refused it.
    #[error("rejected by node ({code}): {message}")]
    Rejected { code: i32, message: String },
    /// The node replied with something we could not understand. It may have acted on the request.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn is_transport(&self) -> bool {
        matches!(self, NetworkError::Transport(_))
    }
}

/// Submitting a signed transaction failed.
///
/// Submissions are not deduplicated. `retry_safe` is set only for transport failures, where the caller may resend the
/// same signed envelope; doing so after the node has in fact accepted it produces a duplicate transaction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("submission failed (retry safe: {retry_safe}): {source}")]
pub struct SubmissionError {
    pub retry_safe: bool,
    #[source]
    pub source: NetworkError,
}

impl From<NetworkError> for SubmissionError {
    fn from(source: NetworkError) -> Self {
        SubmissionError {
            retry_safe: source.is_transport(),
            source,
        }
    }
}

/// A connection to the target chain.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Broadcast a signed envelope to `recipients`, returning the hash of the resulting transaction.
    async fn send(
        &self,
        recipients: &[UniversalAccount],
        envelope: &SignedEnvelope,
    ) -> Result<TxHandle, NetworkError>;

    async fn get(&self, filter: &QueryFilter) -> Result<QueryResult, NetworkError>;
}
