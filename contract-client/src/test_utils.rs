//! In-memory chain used as the connection double in tests.
//!
//! It understands just enough of the counter contract to answer `account()`,
//! apply `increase(uint256)` when blocks are mined, and emit `success` logs.
//! Transactions are only mined when a test calls [`MockConnection::mine`].

use crate::{
    auth::AuthContext,
    connection::{Connection, LogStream},
    error::{ContractError, Result},
    types::Confirmation,
};
use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{keccak256, Address, Bytes, LogData, TxHash, TxKind, B256, U256};
use alloy_rpc_types_eth::{BlockId, Filter, Log, TransactionRequest};
use async_trait::async_trait;
use futures::{channel::mpsc, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;

pub(crate) const CHAIN_ID: u64 = 31337;

// anvil's first dev account
pub(crate) const DEV_KEY: &str =
    "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub(crate) const TEST_ABI: &str = r#"[
    {"inputs":[],"stateMutability":"nonpayable","type":"constructor"},
    {"anonymous":false,"inputs":[{"indexed":true,"name":"count","type":"uint256"}],"name":"success","type":"event"},
    {"anonymous":false,"inputs":[
        {"indexed":true,"name":"tag","type":"string"},
        {"indexed":true,"name":"who","type":"address"},
        {"indexed":false,"name":"amount","type":"uint256"},
        {"indexed":false,"name":"memo","type":"string"}
    ],"name":"Note","type":"event"},
    {"anonymous":true,"inputs":[
        {"indexed":true,"name":"id","type":"uint256"},
        {"indexed":false,"name":"value","type":"uint256"}
    ],"name":"Ping","type":"event"},
    {"inputs":[],"name":"account","outputs":[{"name":"","type":"uint256"}],"stateMutability":"view","type":"function"},
    {"inputs":[{"name":"amount","type":"uint256"}],"name":"increase","outputs":[],"stateMutability":"nonpayable","type":"function"},
    {"inputs":[{"name":"x","type":"uint256"}],"name":"echo","outputs":[{"name":"","type":"uint256"}],"stateMutability":"pure","type":"function"},
    {"inputs":[{"name":"a","type":"uint256"}],"name":"pair","outputs":[{"name":"total","type":"uint256"},{"name":"exists","type":"bool"}],"stateMutability":"view","type":"function"},
    {"inputs":[],"name":"deposit","outputs":[],"stateMutability":"payable","type":"function"}
]"#;

pub(crate) fn auth() -> AuthContext {
    AuthContext::from_private_key(DEV_KEY, CHAIN_ID).unwrap()
}

pub(crate) fn contract_address() -> Address {
    Address::repeat_byte(0xC0)
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub(crate) fn success_topic() -> B256 {
    keccak256("success(uint256)".as_bytes())
}

pub(crate) fn success_log(address: Address, count: U256, block: u64) -> Log {
    raw_log(
        address,
        vec![success_topic(), B256::from(count.to_be_bytes::<32>())],
        Bytes::new(),
        block,
    )
}

pub(crate) fn raw_log(address: Address, topics: Vec<B256>, data: Bytes, block: u64) -> Log {
    Log {
        inner: alloy_primitives::Log {
            address,
            data: LogData::new_unchecked(topics, data),
        },
        block_number: Some(block),
        transaction_hash: Some(keccak256(block.to_be_bytes())),
        log_index: Some(0),
        ..Default::default()
    }
}

struct ChainState {
    block_number: u64,
    total: U256,
    nonces: HashMap<Address, u64>,
    pending: Vec<(TxHash, Address, u64, TransactionRequest)>,
    receipts: HashMap<TxHash, Confirmation>,
    logs: Vec<Log>,
    log_queries: Vec<(Option<u64>, Option<u64>)>,
    call_blocks: Vec<Option<BlockId>>,
    sent: usize,
    call_override: Option<Bytes>,
    transport_down: bool,
    reverting: bool,
    live: Vec<mpsc::UnboundedSender<Result<Log>>>,
}

pub(crate) struct MockConnection {
    chain_id: u64,
    state: Mutex<ChainState>,
}

impl MockConnection {
    pub(crate) fn new() -> Self {
        Self::with_chain_id(CHAIN_ID)
    }

    pub(crate) fn with_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            state: Mutex::new(ChainState {
                block_number: 0,
                // the counter's constructor starts the total at 1
                total: U256::from(1),
                nonces: HashMap::new(),
                pending: Vec::new(),
                receipts: HashMap::new(),
                logs: Vec::new(),
                log_queries: Vec::new(),
                call_blocks: Vec::new(),
                sent: 0,
                call_override: None,
                transport_down: false,
                reverting: false,
                live: Vec::new(),
            }),
        }
    }

    /// Include every pending transaction in a new block.
    pub(crate) fn mine(&self) {
        let mut state = self.state.lock();
        state.block_number += 1;
        let block = state.block_number;
        let pending = std::mem::take(&mut state.pending);

        for (hash, from, nonce, request) in pending {
            let success = !state.reverting;
            let input = request.input.input().cloned().unwrap_or_default();

            let contract_address = match request.to {
                Some(TxKind::Call(to)) => {
                    if success && input.len() >= 36 && input[..4] == selector("increase(uint256)") {
                        let amount = U256::from_be_slice(&input[4..36]);
                        state.total += amount;
                        let log = success_log(to, state.total, block);
                        state.live.retain(|tx| tx.unbounded_send(Ok(log.clone())).is_ok());
                        state.logs.push(log);
                    }
                    None
                }
                _ => Some(from.create(nonce)),
            };

            state.receipts.insert(
                hash,
                Confirmation {
                    transaction_hash: hash,
                    block_number: Some(block),
                    success,
                    gas_used: 21_000,
                    contract_address,
                },
            );
        }
    }

    pub(crate) fn set_block_number(&self, block: u64) {
        self.state.lock().block_number = block;
    }

    pub(crate) fn add_log(&self, log: Log) {
        self.state.lock().logs.push(log);
    }

    pub(crate) fn push_live(&self, item: Result<Log>) {
        let mut state = self.state.lock();
        let mut item = Some(item);
        state.live.retain(|tx| match item.take() {
            Some(next) => tx.unbounded_send(next).is_ok(),
            None => true,
        });
    }

    pub(crate) fn close_live(&self) {
        self.state.lock().live.clear();
    }

    /// Whether every live subscriber has gone away.
    pub(crate) fn live_released(&self) -> bool {
        self.state.lock().live.iter().all(mpsc::UnboundedSender::is_closed)
    }

    pub(crate) fn log_queries(&self) -> Vec<(Option<u64>, Option<u64>)> {
        self.state.lock().log_queries.clone()
    }

    pub(crate) fn call_blocks(&self) -> Vec<Option<BlockId>> {
        self.state.lock().call_blocks.clone()
    }

    pub(crate) fn sent(&self) -> usize {
        self.state.lock().sent
    }

    pub(crate) fn set_call_override(&self, output: Bytes) {
        self.state.lock().call_override = Some(output);
    }

    pub(crate) fn set_transport_down(&self, down: bool) {
        self.state.lock().transport_down = down;
    }

    pub(crate) fn set_reverting(&self, reverting: bool) {
        self.state.lock().reverting = reverting;
    }

    fn check_transport(&self) -> Result<()> {
        if self.state.lock().transport_down {
            return Err(ContractError::transport("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn chain_id(&self) -> Result<u64> {
        self.check_transport()?;
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> Result<u64> {
        self.check_transport()?;
        Ok(self.state.lock().block_number)
    }

    async fn nonce(&self, address: Address) -> Result<u64> {
        self.check_transport()?;
        Ok(self.state.lock().nonces.get(&address).copied().unwrap_or_default())
    }

    async fn call(&self, request: TransactionRequest, block: Option<BlockId>) -> Result<Bytes> {
        self.check_transport()?;
        // yield so concurrent callers interleave
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        state.call_blocks.push(block);
        if let Some(output) = &state.call_override {
            return Ok(output.clone());
        }

        let input = request.input.input().cloned().unwrap_or_default();
        if input.len() < 4 {
            return Ok(Bytes::new());
        }
        let (head, args) = input.split_at(4);

        let output = if head == selector("account()") {
            DynSolValue::Uint(state.total, 256).abi_encode()
        } else if head == selector("echo(uint256)") {
            args.to_vec()
        } else if head == selector("pair(uint256)") {
            let a = U256::from_be_slice(&args[..32]);
            DynSolValue::Tuple(vec![
                DynSolValue::Uint(a * U256::from(2), 256),
                DynSolValue::Bool(true),
            ])
            .abi_encode_sequence()
            .unwrap_or_default()
        } else {
            Vec::new()
        };

        Ok(output.into())
    }

    async fn send_transaction(
        &self,
        request: TransactionRequest,
        auth: &AuthContext,
    ) -> Result<TxHash> {
        self.check_transport()?;

        let from = request.from.unwrap_or_else(|| auth.address());
        if from != auth.address() {
            return Err(ContractError::Auth("sender does not match signer".to_string()));
        }

        let mut state = self.state.lock();
        let expected = state.nonces.get(&from).copied().unwrap_or_default();
        let nonce = request.nonce.unwrap_or(expected);
        state.nonces.insert(from, nonce + 1);
        state.sent += 1;

        let mut preimage = from.to_vec();
        preimage.extend_from_slice(&nonce.to_be_bytes());
        let hash = keccak256(preimage);

        state.pending.push((hash, from, nonce, request));
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<Confirmation>> {
        self.check_transport()?;
        Ok(self.state.lock().receipts.get(&hash).cloned())
    }

    async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
        self.check_transport()?;

        let mut state = self.state.lock();
        let from = filter.get_from_block();
        let to = filter.get_to_block();
        state.log_queries.push((from, to));

        let logs = state
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.unwrap_or_default();
                from.map_or(true, |from| block >= from) && to.map_or(true, |to| block <= to)
            })
            .filter(|log| {
                filter
                    .topics
                    .iter()
                    .zip(log.inner.data.topics())
                    .all(|(accepted, topic)| accepted.matches(topic))
            })
            .cloned()
            .collect();

        Ok(logs)
    }

    async fn subscribe_logs(&self, _filter: &Filter) -> Result<LogStream> {
        self.check_transport()?;
        let (sender, receiver) = mpsc::unbounded();
        self.state.lock().live.push(sender);
        Ok(receiver.boxed())
    }
}
