//! The chain-access seam.
//!
//! [`Connection`] is everything the client needs from a node: read calls,
//! signed submission, receipt lookup, historical logs and a live log feed.
//! [`RpcConnection`] implements it over any alloy [`Provider`]; tests swap in
//! an in-memory double.

use crate::{
    auth::AuthContext,
    config::Config,
    error::{ContractError, Result},
    types::Confirmation,
};
use alloy_network::EthereumWallet;
use alloy_primitives::{Address, Bytes, TxHash};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{BlockId, Filter, Log, TransactionRequest};
use async_trait::async_trait;
use futures::{stream, stream::BoxStream, StreamExt};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

pub type LogStream = BoxStream<'static, Result<Log>>;

#[async_trait]
pub trait Connection: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn block_number(&self) -> Result<u64>;

    async fn nonce(&self, address: Address) -> Result<u64>;

    /// `eth_call` against `block`, or the latest state when `None`.
    async fn call(&self, request: TransactionRequest, block: Option<BlockId>) -> Result<Bytes>;

    /// Sign `request` with `auth` and broadcast it. Returns once the node has
    /// accepted the transaction; never waits for inclusion.
    async fn send_transaction(
        &self,
        request: TransactionRequest,
        auth: &AuthContext,
    ) -> Result<TxHash>;

    /// `None` while the transaction is still pending.
    async fn receipt(&self, hash: TxHash) -> Result<Option<Confirmation>>;

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>>;

    /// Live feed of logs matching `filter`. Dropping the stream releases the
    /// underlying listener.
    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream>;
}

/// How new logs reach a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogDelivery {
    /// `eth_subscribe("logs")`; needs a pubsub transport.
    Subscribe,
    /// `eth_newFilter` + `eth_getFilterChanges` at the given interval.
    Poll(Duration),
}

#[derive(Clone)]
pub struct RpcConnection<P = DynProvider> {
    provider: P,
    delivery: LogDelivery,
}

impl<P> RpcConnection<P>
where
    P: Provider + Clone + 'static,
{
    pub const fn new(provider: P, delivery: LogDelivery) -> Self {
        Self { provider, delivery }
    }

    pub const fn provider(&self) -> &P {
        &self.provider
    }
}

impl RpcConnection<DynProvider> {
    /// Connect using the endpoint in `config`. Websocket transports get
    /// push subscriptions, HTTP falls back to filter polling.
    pub async fn connect(config: &Config) -> Result<Self> {
        let builder = ProviderBuilder::new().disable_recommended_fillers();

        let connection = match (&config.network.ws_url, config.client.use_websocket) {
            (Some(ws_url), true) => {
                info!("Connecting to {} over websocket", config.network.name);
                let provider = builder.connect(ws_url.as_str()).await?;
                Self::new(provider.erased(), LogDelivery::Subscribe)
            }
            _ => {
                info!("Connecting to {} over HTTP", config.network.name);
                let provider = builder.connect_http(config.network.rpc_url.clone());
                Self::new(
                    provider.erased(),
                    LogDelivery::Poll(Duration::from_secs(config.client.polling_interval_seconds)),
                )
            }
        };

        Ok(connection)
    }

    pub fn shared(self) -> Arc<dyn Connection> {
        Arc::new(self)
    }
}

#[async_trait]
impl<P> Connection for RpcConnection<P>
where
    P: Provider + Clone + 'static,
{
    async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn nonce(&self, address: Address) -> Result<u64> {
        Ok(self.provider.get_transaction_count(address).await?)
    }

    async fn call(&self, request: TransactionRequest, block: Option<BlockId>) -> Result<Bytes> {
        let call = self.provider.call(request);
        let output = match block {
            Some(block) => call.block(block).await?,
            None => call.await?,
        };
        Ok(output)
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
        auth: &AuthContext,
    ) -> Result<TxHash> {
        // Nonce, gas and fees are filled by alloy's recommended fillers.
        let signing = ProviderBuilder::new()
            .wallet(EthereumWallet::from(auth.signer().clone()))
            .connect_provider(self.provider.clone());

        let pending = signing.send_transaction(request).await?;
        let hash = *pending.tx_hash();
        debug!("Broadcast transaction {hash}");
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Confirmation>> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.map(|receipt| Confirmation {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
            gas_used: receipt.gas_used,
            contract_address: receipt.contract_address,
        }))
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        Ok(self.provider.get_logs(filter).await?)
    }

    async fn subscribe_logs(&self, filter: &Filter) -> Result<LogStream> {
        match self.delivery {
            LogDelivery::Subscribe => {
                let subscription = self.provider.subscribe_logs(filter).await?;
                Ok(subscription.into_stream().map(Ok).boxed())
            }
            LogDelivery::Poll(interval) => {
                if interval.is_zero() {
                    return Err(ContractError::Config(
                        "Log polling interval must be greater than 0".to_string(),
                    ));
                }
                let poller = self
                    .provider
                    .watch_logs(filter)
                    .await?
                    .with_poll_interval(interval);
                Ok(poller
                    .into_stream()
                    .flat_map(|logs| stream::iter(logs.into_iter().map(Ok)))
                    .boxed())
            }
        }
    }
}
