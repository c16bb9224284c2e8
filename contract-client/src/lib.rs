#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports
)]

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod counter;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod transaction;
pub mod types;

#[cfg(test)]
mod test_utils;



pub use auth::AuthContext;
pub use client::ContractClient;
pub use config::{ClientConfig, Config, NetworkConfig};
pub use connection::{Connection, LogDelivery, LogStream, RpcConnection};
pub use counter::{Counter, SuccessEvent};
pub use descriptor::ContractDescriptor;
pub use error::{ContractError, Result};
pub use events::{CancelHandle, EventHistory, EventSubscription, SubscriptionStatus};
pub use transaction::TransactionHandle;
pub use types::*;

pub use alloy_dyn_abi::DynSolValue;
