//! A [NetworkClient] which talks to a target chain node over JSON-RPC.

use std::time::Duration;

use alloy::primitives::B256;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use jsonrpsee::{
    core::{ClientError, client::ClientT},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::Serialize;
use tracing::trace;

use crate::{
    account::UniversalAccount,
    cfg::Config,
    network::{
        NetworkClient, NetworkError, Order, QueryFilter, QueryResult, SignedEnvelope, TxHandle,
    },
};

pub const SEND_TRANSACTION: &str = "universal_sendTransaction";
pub const GET_TRANSACTIONS: &str = "universal_getTransactions";

#[derive(Debug, Clone)]
pub struct JsonRpcNetworkClient {
    client: HttpClient,
}

/// The paging half of a [QueryFilter], sent as the second parameter of [GET_TRANSACTIONS].
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<u64>,
    order: Order,
    page: u32,
    limit: u32,
}

impl JsonRpcNetworkClient {
    pub fn new(url: impl AsRef<str>) -> Result<Self> {
        Ok(JsonRpcNetworkClient {
            client: HttpClientBuilder::default()
                .request_timeout(Duration::from_secs(30))
                .build(url)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let url = config
            .rpc_url
            .as_deref()
            .ok_or_else(|| anyhow!("no rpc_url configured"))?;
        Self::new(url)
    }
}

#[async_trait]
impl NetworkClient for JsonRpcNetworkClient {
    async fn send(
        &self,
        recipients: &[UniversalAccount],
        envelope: &SignedEnvelope,
    ) -> Result<TxHandle, NetworkError> {
        trace!(category = %envelope.category, "sending transaction");
        let hash: B256 = self
            .client
            .request(SEND_TRANSACTION, rpc_params![recipients, envelope])
            .await
            .map_err(network_error)?;
        Ok(TxHandle(hash))
    }

    async fn get(&self, filter: &QueryFilter) -> Result<QueryResult, NetworkError> {
        let page = Page {
            start_time: filter.start_time,
            order: filter.order,
            page: filter.page,
            limit: filter.limit,
        };
        self.client
            .request(GET_TRANSACTIONS, rpc_params![&filter.scope, page])
            .await
            .map_err(network_error)
    }
}

fn network_error(e: ClientError) -> NetworkError {
    match e {
        ClientError::Call(e) => NetworkError::Rejected {
            code: e.code(),
            message: e.message().to_owned(),
        },
        ClientError::ParseError(e) => NetworkError::InvalidResponse(e.to_string()),
        e => NetworkError::Transport(e.to_string()),
    }
}
