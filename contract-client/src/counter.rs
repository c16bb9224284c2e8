//! Typed wrapper for the counter contract: `increase(uint256)` adds to a
//! running total readable through `account()`, emitting `success(count)`.

use crate::{
    auth::AuthContext,
    client::ContractClient,
    config::ClientConfig,
    connection::Connection,
    descriptor::ContractDescriptor,
    error::{ContractError, Result},
    events::{EventHistory, EventSubscription},
    transaction::TransactionHandle,
    types::{BlockRange, EventRecord},
};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, TxHash, U256};
use alloy_rpc_types_eth::Log;
use alloy_sol_types::sol;
use once_cell::sync::OnceCell;
use std::sync::Arc;

pub const COUNTER_ABI: &str = r#"[
    {"inputs":[],"stateMutability":"nonpayable","type":"constructor"},
    {"anonymous":false,"inputs":[{"indexed":true,"internalType":"uint256","name":"count","type":"uint256"}],"name":"success","type":"event"},
    {"inputs":[],"name":"account","outputs":[{"internalType":"uint256","name":"","type":"uint256"}],"stateMutability":"view","type":"function"},
    {"inputs":[{"internalType":"uint256","name":"amount","type":"uint256"}],"name":"increase","outputs":[],"stateMutability":"nonpayable","type":"function"}
]"#;

pub const COUNTER_BYTECODE: &str = "0x6080604052348015600e575f5ffd5b5060015f819055506101df806100235f395ff3fe608060405234801561000f575f5ffd5b5060043610610034575f3560e01c806330f3f0db146100385780635dab242014610054575b5f5ffd5b610052600480360381019061004d91906100f6565b610072565b005b61005c6100ba565b6040516100699190610130565b60405180910390f35b805f5f8282546100829190610176565b925050819055505f547f888ea2435479e7986dcaef778dfd65df5aeb458b8d46acb3889df43451838da560405160405180910390a250565b5f5481565b5f5ffd5b5f819050919050565b6100d5816100c3565b81146100df575f5ffd5b50565b5f813590506100f0816100cc565b92915050565b5f6020828403121561010b5761010a6100bf565b5b5f610118848285016100e2565b91505092915050565b61012a816100c3565b82525050565b5f6020820190506101435f830184610121565b92915050565b7f4e487b71000000000000000000000000000000000000000000000000000000005f52601160045260245ffd5b5f610180826100c3565b915061018b836100c3565b92508282019050808211156101a3576101a2610149565b5b9291505056fea2646970667358221220f39a84c9ab53e6ddb3f5e098d5dbff2361fe1f6af14c95326e6c469c95ae5cff64736f6c634300081e0033";

sol! {
    interface ICounter {
        function account() external view returns (uint256);
        function increase(uint256 amount) external;
    }
}

static DESCRIPTOR: OnceCell<Arc<ContractDescriptor>> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessEvent {
    pub count: U256,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<TxHash>,
}

impl TryFrom<&EventRecord> for SuccessEvent {
    type Error = ContractError;

    fn try_from(record: &EventRecord) -> Result<Self> {
        if record.event_name != "success" {
            return Err(ContractError::Decoding(format!(
                "Expected a `success` event, got `{}`",
                record.event_name
            )));
        }
        let count = record
            .field("count")
            .and_then(DynSolValue::as_uint)
            .map(|(count, _)| count)
            .ok_or_else(|| ContractError::Decoding("`success` has no uint `count`".to_string()))?;

        Ok(Self {
            count,
            block_number: record.block_number,
            transaction_hash: record.transaction_hash,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Counter {
    client: ContractClient,
}

impl Counter {
    /// The embedded interface and bytecode, parsed once per process.
    pub fn descriptor() -> Result<Arc<ContractDescriptor>> {
        DESCRIPTOR
            .get_or_try_init(|| {
                ContractDescriptor::parse_with_bytecode(COUNTER_ABI, COUNTER_BYTECODE).map(Arc::new)
            })
            .map(Arc::clone)
    }

    pub fn bind(address: Address, connection: Arc<dyn Connection>) -> Result<Self> {
        let client = ContractClient::bind(address, connection, Self::descriptor()?)?;
        Ok(Self { client })
    }

    pub async fn deploy(
        connection: Arc<dyn Connection>,
        auth: &AuthContext,
    ) -> Result<(Self, TransactionHandle)> {
        let (client, handle) =
            ContractClient::deploy(Self::descriptor()?, connection, &[], auth).await?;
        Ok((Self { client }, handle))
    }

    /// Apply paging and buffering limits to the event helpers.
    #[must_use]
    pub fn with_client_config(self, config: &ClientConfig) -> Self {
        Self {
            client: self.client.with_client_config(config),
        }
    }

    #[must_use]
    pub fn from_client(client: ContractClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub const fn client(&self) -> &ContractClient {
        &self.client
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.client.address()
    }

    pub async fn account(&self) -> Result<U256> {
        self.client
            .call("account", &[])
            .await?
            .as_uint()
            .ok_or_else(|| ContractError::Decoding("`account` did not return a uint".to_string()))
    }

    pub async fn increase(&self, amount: U256, auth: &AuthContext) -> Result<TransactionHandle> {
        self.client
            .submit_typed(&ICounter::increaseCall { amount }, auth)
            .await
    }

    pub fn parse_success(&self, log: &Log) -> Result<SuccessEvent> {
        SuccessEvent::try_from(&self.client.parse_log("success", log)?)
    }

    /// `success` events whose `count` is one of `counts` (any when empty).
    pub fn filter_success(&self, counts: &[U256], range: BlockRange) -> Result<EventHistory> {
        self.client
            .filter_events("success", &[count_filter(counts)], range)
    }

    pub async fn watch_success(&self, counts: &[U256]) -> Result<EventSubscription> {
        self.client
            .watch_events("success", &[count_filter(counts)])
            .await
    }
}

fn count_filter(counts: &[U256]) -> Vec<DynSolValue> {
    counts
        .iter()
        .map(|count| DynSolValue::Uint(*count, 256))
        .collect()
}
