use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, BlockHash, TxHash, U256};
use serde::{Deserialize, Serialize};

/// Decoded outputs of a read call, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct CallResult {
    values: Vec<DynSolValue>,
}

impl CallResult {
    #[must_use]
    pub const fn new(values: Vec<DynSolValue>) -> Self {
        Self { values }
    }

    #[must_use]
    pub fn first(&self) -> Option<&DynSolValue> {
        self.values.first()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&DynSolValue> {
        self.values.get(index)
    }

    /// First output as an unsigned integer, if it is one.
    #[must_use]
    pub fn as_uint(&self) -> Option<U256> {
        self.first().and_then(DynSolValue::as_uint).map(|(value, _)| value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn into_values(self) -> Vec<DynSolValue> {
        self.values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventField {
    pub name: String,
    pub indexed: bool,
    /// Indexed `string`/`bytes`/array fields only carry their topic hash.
    pub value: DynSolValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event_name: String,
    pub fields: Vec<EventField>,
    pub address: Address,
    pub block_number: Option<u64>,
    pub block_hash: Option<BlockHash>,
    pub transaction_hash: Option<TxHash>,
    pub log_index: Option<u64>,
    pub removed: bool,
}

impl EventRecord {
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&DynSolValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// Inclusive block window; `to: None` means up to the latest block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl BlockRange {
    #[must_use]
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to: Some(to) }
    }

    #[must_use]
    pub const fn from_block(from: u64) -> Self {
        Self { from, to: None }
    }
}

impl Default for BlockRange {
    fn default() -> Self {
        Self::from_block(0)
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}
