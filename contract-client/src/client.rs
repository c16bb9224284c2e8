use crate::{
    auth::AuthContext,
    config::ClientConfig,
    connection::Connection,
    descriptor::ContractDescriptor,
    error::{ContractError, Result},
    events::{build_filter, decode_log, EventHistory, EventSubscription},
    transaction::TransactionHandle,
    types::{BlockRange, CallResult, EventRecord},
};
use alloy_dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier};
use alloy_json_abi::{Function, StateMutability};
use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, U256};
use alloy_rpc_types_eth::{BlockId, Log, TransactionRequest};
use alloy_sol_types::SolCall;
use std::sync::Arc;
use tracing::{debug, info};

/// A contract descriptor bound to a deployed address and a connection.
///
/// The client holds no chain state of its own; every call goes to the
/// connection. Address and descriptor are fixed at construction, so binding
/// elsewhere means building a new client.
#[derive(Clone)]
pub struct ContractClient {
    descriptor: Arc<ContractDescriptor>,
    address: Address,
    connection: Arc<dyn Connection>,
    max_block_range: u64,
    event_channel_capacity: usize,
}

impl std::fmt::Debug for ContractClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractClient")
            .field("address", &self.address)
            .field("max_block_range", &self.max_block_range)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .finish_non_exhaustive()
    }
}

impl ContractClient {
    /// Pure construction; nothing is sent to the node.
    pub fn bind(
        address: Address,
        connection: Arc<dyn Connection>,
        descriptor: Arc<ContractDescriptor>,
    ) -> Result<Self> {
        if address == Address::ZERO {
            return Err(ContractError::Config(
                "Cannot bind a contract to the zero address".to_string(),
            ));
        }

        let defaults = ClientConfig::default();
        debug!("Bound contract client to {address}");

        Ok(Self {
            descriptor,
            address,
            connection,
            max_block_range: defaults.max_block_range,
            event_channel_capacity: defaults.event_channel_capacity,
        })
    }

    /// Apply paging and buffering limits from configuration.
    #[must_use]
    pub fn with_client_config(mut self, config: &ClientConfig) -> Self {
        self.max_block_range = config.max_block_range.max(1);
        self.event_channel_capacity = config.event_channel_capacity.max(1);
        self
    }

    /// Deploy the descriptor's bytecode with `constructor_args` and bind a
    /// client to the resulting address. Returns right after broadcast; the
    /// contract exists only once the returned transaction is mined.
    pub async fn deploy(
        descriptor: Arc<ContractDescriptor>,
        connection: Arc<dyn Connection>,
        constructor_args: &[DynSolValue],
        auth: &AuthContext,
    ) -> Result<(Self, TransactionHandle)> {
        let code = descriptor.deployment_code().ok_or_else(|| {
            ContractError::Config("Descriptor has no deployment bytecode".to_string())
        })?;

        let mut init_code = code.to_vec();
        match descriptor.constructor() {
            Some(constructor) => {
                check_arity("constructor", constructor.inputs.len(), constructor_args.len())?;
                let encoded = constructor
                    .abi_encode_input(constructor_args)
                    .map_err(|e| ContractError::Encoding(format!("constructor: {e}")))?;
                init_code.extend_from_slice(&encoded);
            }
            None => check_arity("constructor", 0, constructor_args.len())?,
        }

        auth.ensure_network(connection.chain_id().await?)?;

        let deployer = auth.address();
        let nonce = connection.nonce(deployer).await?;
        let address = deployer.create(nonce);

        let request = TransactionRequest::default()
            .with_from(deployer)
            .with_nonce(nonce)
            .with_chain_id(auth.chain_id())
            .with_deploy_code(init_code);

        let hash = connection.send_transaction(request, auth).await?;
        info!("Deploying contract to {address} in transaction {hash}");

        let client = Self::bind(address, Arc::clone(&connection), descriptor)?;
        Ok((client, TransactionHandle::new(hash, connection)))
    }

    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<ContractDescriptor> {
        &self.descriptor
    }

    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.connection
    }

    /// Read `method` against the latest state.
    pub async fn call(&self, method: &str, args: &[DynSolValue]) -> Result<CallResult> {
        self.read(method, args, None).await
    }

    /// Read `method` against the state at `block`.
    pub async fn call_at(
        &self,
        method: &str,
        args: &[DynSolValue],
        block: BlockId,
    ) -> Result<CallResult> {
        self.read(method, args, Some(block)).await
    }

    /// Statically typed read for a `sol!`-generated call type. The call's
    /// selector must be part of the descriptor.
    pub async fn call_typed<C: SolCall>(&self, call: &C) -> Result<C::Return> {
        self.descriptor.function_by_selector(C::SELECTOR.into())?;

        let request = self.request_to().with_input(call.abi_encode());
        let output = self.connection.call(request, None).await?;

        C::abi_decode_returns(&output)
            .map_err(|e| ContractError::Decoding(format!("{}: {e}", C::SIGNATURE)))
    }

    /// Encode, sign and broadcast a state-changing call. Does not wait for
    /// the transaction to be mined.
    pub async fn submit(
        &self,
        method: &str,
        args: &[DynSolValue],
        auth: &AuthContext,
    ) -> Result<TransactionHandle> {
        self.submit_with_value(method, args, U256::ZERO, auth).await
    }

    pub async fn submit_with_value(
        &self,
        method: &str,
        args: &[DynSolValue],
        value: U256,
        auth: &AuthContext,
    ) -> Result<TransactionHandle> {
        let function = self.descriptor.function(method)?;
        ensure_writable(function, value)?;
        let calldata = encode_input(function, args)?;
        self.broadcast(calldata, value, auth, &function.name).await
    }

    pub async fn submit_typed<C: SolCall>(
        &self,
        call: &C,
        auth: &AuthContext,
    ) -> Result<TransactionHandle> {
        let function = self.descriptor.function_by_selector(C::SELECTOR.into())?;
        ensure_writable(function, U256::ZERO)?;
        self.broadcast(call.abi_encode(), U256::ZERO, auth, &function.name)
            .await
    }

    /// Historical `event` logs in `range`, optionally constrained on indexed
    /// fields (one OR-set per indexed field, empty = any value).
    pub fn filter_events(
        &self,
        event: &str,
        indexed: &[Vec<DynSolValue>],
        range: BlockRange,
    ) -> Result<EventHistory> {
        let event = self.descriptor.event(event)?.clone();
        let filter = build_filter(&event, self.address, indexed)?;

        Ok(EventHistory::new(
            Arc::clone(&self.connection),
            event,
            filter,
            range.from,
            range.to,
            self.max_block_range,
        ))
    }

    /// Decode a single raw log, e.g. one taken from a transaction receipt,
    /// as `event`.
    pub fn parse_log(&self, event: &str, log: &Log) -> Result<EventRecord> {
        decode_log(self.descriptor.event(event)?, log)
    }

    /// Live `event` feed. The subscription must be cancelled (or dropped) to
    /// release the underlying listener.
    pub async fn watch_events(
        &self,
        event: &str,
        indexed: &[Vec<DynSolValue>],
    ) -> Result<EventSubscription> {
        let event = self.descriptor.event(event)?.clone();
        let filter = build_filter(&event, self.address, indexed)?;
        let logs = self.connection.subscribe_logs(&filter).await?;

        Ok(EventSubscription::spawn(
            logs,
            event,
            self.event_channel_capacity,
        ))
    }

    async fn read(
        &self,
        method: &str,
        args: &[DynSolValue],
        block: Option<BlockId>,
    ) -> Result<CallResult> {
        let function = self.descriptor.function(method)?;
        let calldata = encode_input(function, args)?;

        let request = self.request_to().with_input(calldata);
        let output = self.connection.call(request, block).await?;

        decode_output(function, &output).map(CallResult::new)
    }

    async fn broadcast(
        &self,
        calldata: Vec<u8>,
        value: U256,
        auth: &AuthContext,
        method: &str,
    ) -> Result<TransactionHandle> {
        auth.ensure_network(self.connection.chain_id().await?)?;

        let request = self
            .request_to()
            .with_from(auth.address())
            .with_chain_id(auth.chain_id())
            .with_value(value)
            .with_input(calldata);

        let hash = self.connection.send_transaction(request, auth).await?;
        info!("Submitted {method} to {} in transaction {hash}", self.address);

        Ok(TransactionHandle::new(hash, Arc::clone(&self.connection)))
    }

    fn request_to(&self) -> TransactionRequest {
        TransactionRequest::default().with_to(self.address)
    }
}

fn check_arity(method: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(ContractError::Encoding(format!(
            "`{method}` takes {expected} arguments, got {got}"
        )));
    }
    Ok(())
}

fn ensure_writable(function: &Function, value: U256) -> Result<()> {
    match function.state_mutability {
        StateMutability::View | StateMutability::Pure => Err(ContractError::Encoding(format!(
            "`{}` is read-only; use call",
            function.name
        ))),
        StateMutability::NonPayable if !value.is_zero() => Err(ContractError::Encoding(format!(
            "`{}` is not payable",
            function.name
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn encode_input(function: &Function, args: &[DynSolValue]) -> Result<Vec<u8>> {
    check_arity(&function.name, function.inputs.len(), args.len())?;
    function
        .abi_encode_input(args)
        .map_err(|e| ContractError::Encoding(format!("`{}`: {e}", function.name)))
}

pub(crate) fn decode_output(function: &Function, data: &[u8]) -> Result<Vec<DynSolValue>> {
    let types = function
        .outputs
        .iter()
        .map(|param| {
            param
                .resolve()
                .map_err(|e| ContractError::Decoding(format!("`{}`: {e}", function.name)))
        })
        .collect::<Result<Vec<DynSolType>>>()?;

    if types.is_empty() {
        return Ok(Vec::new());
    }

    match DynSolType::Tuple(types).abi_decode_sequence(data) {
        Ok(DynSolValue::Tuple(values)) => Ok(values),
        Ok(other) => Ok(vec![other]),
        Err(e) => Err(ContractError::Decoding(format!(
            "`{}` returned {} undecodable bytes: {e}",
            function.name,
            data.len()
        ))),
    }
}
