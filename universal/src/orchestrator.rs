//! Builds, signs and submits transactions on behalf of universal accounts, and reads them back.
//!
//! A call to [TxOrchestrator::execute] moves through `built -> signed -> submitted`. Every input is validated and every
//! account resolved before the signer is asked for anything, and the network is only contacted once a signature is in
//! hand, so a failure at any step leaves nothing behind on the network. Nothing is tracked after a handle is returned.

use std::sync::Arc;

use alloy::primitives::Bytes;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    account::UniversalAccount,
    address::AddressCodec,
    cfg::Config,
    error::Error,
    network::{
        NetworkClient, QueryFilter, QueryResult, QueryScope, SignedEnvelope, SubmissionError,
        Transaction, TxHandle,
    },
    schema::{MessageSchema, SchemaError, SchemaRegistry, validate_category},
    signer::SignerAdapter,
    wallet::WalletDeriver,
};

/// An application message carried by a transaction. `body` must match the schema registered for `category`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppMessage {
    pub category: String,
    pub body: Value,
}

/// A call to make on the target chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecuteParams {
    /// The address to call, in either of the target chain's encodings.
    pub target: String,
    /// Amount of the native token to send, in its smallest unit. Defaults to zero.
    pub value: Option<BigUint>,
    pub data: Option<Bytes>,
    pub message: Option<AppMessage>,
}

/// The signed payload, in the shape of [MessageSchema::execute].
#[derive(Debug, Serialize, Deserialize)]
struct ExecutePayload {
    target: String,
    value: String,
    data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<MessagePayload>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MessagePayload {
    category: String,
    body: Bytes,
}

pub struct TxOrchestrator {
    config: Config,
    codec: AddressCodec,
    deriver: WalletDeriver,
    network: Arc<dyn NetworkClient>,
    registry: SchemaRegistry,
    execute_schema: MessageSchema,
}

impl TxOrchestrator {
    pub fn new(
        config: Config,
        network: Arc<dyn NetworkClient>,
        registry: SchemaRegistry,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let codec = config.address_codec()?;
        let deriver = WalletDeriver::new(&config, codec.clone());
        Ok(Self::with_deriver(config, deriver, network, registry))
    }

    /// Create an orchestrator which resolves wallets with an existing `deriver`, sharing its cache.
    pub fn with_deriver(
        config: Config,
        deriver: WalletDeriver,
        network: Arc<dyn NetworkClient>,
        registry: SchemaRegistry,
    ) -> Self {
        TxOrchestrator {
            codec: deriver.codec().clone(),
            config,
            deriver,
            network,
            registry,
            execute_schema: MessageSchema::execute(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn deriver(&self) -> &WalletDeriver {
        &self.deriver
    }

    /// The account on the target chain which transactions signed by `account` are sent from. Native accounts send
    /// from themselves and every other account sends from its derived wallet.
    pub fn resolve_sender(&self, account: &UniversalAccount) -> Result<UniversalAccount, Error> {
        self.resolve_account(account)
    }

    /// Resolve `account` to a target chain account whose address is EIP-55 checksummed hex, whichever encoding it
    /// was given in.
    fn resolve_account(&self, account: &UniversalAccount) -> Result<UniversalAccount, Error> {
        let chain = self.codec.chain();
        if account.is_on(chain) {
            let address = self.codec.parse_target_address(&account.address)?;
            Ok(chain.account(address.to_checksum(None)))
        } else {
            Ok(self.deriver.resolve_owner(account)?.target_account(chain))
        }
    }

    /// Sign `params` with `signer` and submit it, fanning out to `recipients` if given.
    ///
    /// Resolution of every recipient must succeed before anything is signed. No step is retried; see
    /// [Error::is_retry_safe] for whether the caller may repeat the call.
    pub async fn execute(
        &self,
        params: ExecuteParams,
        signer: &SignerAdapter,
        recipients: Option<&[UniversalAccount]>,
    ) -> Result<TxHandle, Error> {
        let target = self.codec.parse_target_address(&params.target).map_err(|e| {
            Error::Validation(format!("invalid target address `{}`: {e}", params.target))
        })?;

        let from = self.resolve_sender(signer.account())?;
        let recipients = recipients
            .unwrap_or_default()
            .iter()
            .map(|r| self.resolve_account(r))
            .collect::<Result<Vec<_>, _>>()?;

        let (category, message) = match params.message {
            Some(AppMessage { category, body }) => {
                let body = self.registry.get(&category)?.encode(&body)?;
                let message = MessagePayload {
                    category: category.clone(),
                    body: body.into(),
                };
                (category, Some(message))
            }
            None => (self.config.default_category.clone(), None),
        };
        let payload = ExecutePayload {
            target: target.to_checksum(None),
            value: params.value.unwrap_or_default().to_string(),
            data: params.data.unwrap_or_default(),
            message,
        };
        let payload =
            serde_json::to_value(&payload).map_err(|e| SchemaError::Encode(e.to_string()))?;
        let data = self.execute_schema.encode(&payload)?;
        debug!(%from, %category, recipients = recipients.len(), "transaction built");

        let signature = signer.sign(&data).await?;
        debug!(%from, "transaction signed");

        let envelope = SignedEnvelope {
            category,
            data: data.into(),
            signature: signature.into(),
            signer: signer.account().clone(),
            from,
        };
        let handle = self
            .network
            .send(&recipients, &envelope)
            .await
            .map_err(|e| {
                warn!(from = %envelope.from, error = %e, "submission failed");
                SubmissionError::from(e)
            })?;
        info!(
            %handle,
            from = %envelope.from,
            category = %envelope.category,
            "transaction submitted"
        );

        Ok(handle)
    }

    /// Fetch a page of transactions. Results always come from the network. A target chain account in the scope is
    /// matched in its checksummed hex form.
    pub async fn query(&self, filter: &QueryFilter) -> Result<QueryResult, Error> {
        if filter.limit == 0 || filter.limit > self.config.max_query_limit {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}, got {}",
                self.config.max_query_limit, filter.limit
            )));
        }
        if filter.page == 0 {
            return Err(Error::Validation("page numbers start at 1".to_owned()));
        }
        let mut filter = filter.clone();
        match &mut filter.scope {
            QueryScope::Account(account) if account.is_on(self.codec.chain()) => {
                *account = self.resolve_account(account)?;
            }
            QueryScope::Account(account) => self.codec.validate_account(account)?,
            QueryScope::Category(category) => validate_category(category)?,
            QueryScope::All => {}
        }

        self.network.get(&filter).await.map_err(|e| {
            warn!(error = %e, "query failed");
            Error::Query(e)
        })
    }

    /// Decode and validate the payload of a transaction produced by [TxOrchestrator::execute]. An application message
    /// is decoded against the schema registered for its category.
    pub fn decode_message(&self, tx: &Transaction) -> Result<ExecuteParams, Error> {
        let payload = self.execute_schema.decode(&tx.data)?;
        let payload: ExecutePayload =
            serde_json::from_value(payload).map_err(|e| SchemaError::Decode(e.to_string()))?;

        let value = payload
            .value
            .parse::<BigUint>()
            .map_err(|e| SchemaError::Decode(format!("invalid value: {e}")))?;
        let message = match payload.message {
            Some(MessagePayload { category, body }) => {
                if category != tx.category {
                    return Err(SchemaError::Decode(format!(
                        "message category `{category}` does not match envelope category `{}`",
                        tx.category
                    ))
                    .into());
                }
                let body = self.registry.get(&category)?.decode(&body)?;
                Some(AppMessage { category, body })
            }
            None => None,
        };

        Ok(ExecuteParams {
            target: payload.target,
            value: Some(value),
            data: Some(payload.data),
            message,
        })
    }
}
