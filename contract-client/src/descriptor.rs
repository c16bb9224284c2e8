//! Parsed contract interface plus optional deployment bytecode.
//!
//! A [`ContractDescriptor`] is built once from a Solidity JSON ABI and never
//! mutated afterwards, so it can be shared behind an `Arc` by any number of
//! [`ContractClient`](crate::ContractClient)s.

use crate::error::{ContractError, Result};
use alloy_dyn_abi::{DynSolType, Specifier};
use alloy_json_abi::{Constructor, Event, Function, JsonAbi, StateMutability};
use alloy_primitives::{Bytes, Selector};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    abi: JsonAbi,
    bytecode: Option<Bytes>,
}

impl ContractDescriptor {
    /// Parse a JSON ABI (the array form emitted by solc).
    pub fn parse(schema: &str) -> Result<Self> {
        let abi: JsonAbi = serde_json::from_str(schema)
            .map_err(|e| ContractError::Schema(format!("Malformed ABI: {e}")))?;
        Self::from_abi(abi, None)
    }

    pub fn parse_with_bytecode(schema: &str, bytecode: &str) -> Result<Self> {
        Self::parse(schema)?.with_bytecode(bytecode)
    }

    /// Parse a compiled artifact of the form
    /// `{"abi": [...], "bin": "0x.."}` or `{"abi": [...], "bytecode": {"object": "0x.."}}`.
    /// The ABI may also be given as a JSON-encoded string.
    pub fn from_artifact(artifact: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(artifact)
            .map_err(|e| ContractError::Schema(format!("Malformed artifact: {e}")))?;

        let abi = match value.get("abi") {
            Some(Value::String(raw)) => serde_json::from_str::<JsonAbi>(raw),
            Some(other) => serde_json::from_value::<JsonAbi>(other.clone()),
            None => return Err(ContractError::Schema("Artifact has no `abi` field".to_string())),
        }
        .map_err(|e| ContractError::Schema(format!("Malformed ABI: {e}")))?;

        let bytecode = ["bin", "bytecode"]
            .iter()
            .filter_map(|key| value.get(*key))
            .find_map(|code| match code {
                Value::String(hex) => Some(hex.as_str()),
                Value::Object(obj) => obj.get("object").and_then(Value::as_str),
                _ => None,
            })
            .map(decode_bytecode)
            .transpose()?
            .flatten();

        Self::from_abi(abi, bytecode)
    }

    pub fn from_artifact_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_artifact(&raw)
    }

    /// Validates that every parameter resolves to a concrete ABI type.
    pub fn from_abi(abi: JsonAbi, bytecode: Option<Bytes>) -> Result<Self> {
        for function in abi.functions() {
            for param in function.inputs.iter().chain(&function.outputs) {
                resolve(param, &function.name)?;
            }
        }
        for event in abi.events() {
            let indexed = event.inputs.iter().filter(|p| p.indexed).count();
            let max_indexed = if event.anonymous { 4 } else { 3 };
            if indexed > max_indexed {
                return Err(ContractError::Schema(format!(
                    "Event `{}` has {indexed} indexed fields, at most {max_indexed} fit in the log topics",
                    event.name
                )));
            }
            for param in &event.inputs {
                let _: DynSolType = param.resolve().map_err(|e| {
                    ContractError::Schema(format!(
                        "Event `{}` field `{}` has unresolvable type `{}`: {e}",
                        event.name, param.name, param.ty
                    ))
                })?;
            }
        }
        if let Some(constructor) = &abi.constructor {
            for param in &constructor.inputs {
                resolve(param, "constructor")?;
            }
        }

        Ok(Self { abi, bytecode })
    }

    pub fn with_bytecode(mut self, bytecode: &str) -> Result<Self> {
        self.bytecode = decode_bytecode(bytecode)?;
        Ok(self)
    }

    #[must_use]
    pub const fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    #[must_use]
    pub const fn deployment_code(&self) -> Option<&Bytes> {
        self.bytecode.as_ref()
    }

    #[must_use]
    pub const fn constructor(&self) -> Option<&Constructor> {
        self.abi.constructor.as_ref()
    }

    /// Look up a function by bare name (first overload wins) or by full
    /// signature such as `increase(uint256)`.
    pub fn function(&self, name: &str) -> Result<&Function> {
        let found = if name.contains('(') {
            self.abi.functions().find(|f| f.signature() == name)
        } else {
            self.abi.function(name).and_then(|overloads| overloads.first())
        };
        found.ok_or_else(|| ContractError::Encoding(format!("Unknown method `{name}`")))
    }

    pub fn function_by_selector(&self, selector: Selector) -> Result<&Function> {
        self.abi
            .functions()
            .find(|f| f.selector() == selector)
            .ok_or_else(|| {
                ContractError::Encoding(format!("No method with selector {selector} in interface"))
            })
    }

    pub fn event(&self, name: &str) -> Result<&Event> {
        self.abi
            .event(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| ContractError::Encoding(format!("Unknown event `{name}`")))
    }

    pub fn is_read_only(&self, name: &str) -> Result<bool> {
        Ok(matches!(
            self.function(name)?.state_mutability,
            StateMutability::View | StateMutability::Pure
        ))
    }
}

fn resolve(param: &alloy_json_abi::Param, owner: &str) -> Result<DynSolType> {
    param.resolve().map_err(|e| {
        ContractError::Schema(format!(
            "`{owner}` parameter `{}` has unresolvable type `{}`: {e}",
            param.name, param.ty
        ))
    })
}

fn decode_bytecode(raw: &str) -> Result<Option<Bytes>> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(None);
    }
    hex::decode(trimmed)
        .map(|code| Some(Bytes::from(code)))
        .map_err(|e| ContractError::Schema(format!("Invalid deployment bytecode: {e}")))
}
