use crate::{
    auth::AuthContext,
    error::{ContractError, Result},
};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    pub contract: ContractConfig,
    pub signer: Option<SignerConfig>,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: Url,
    pub ws_url: Option<Url>,
    pub explorer_url: Option<Url>,
    pub is_testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Unset until the contract has been deployed.
    pub address: Option<Address>,
    pub deployment_block: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    pub private_key: String,
    pub address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Widest block window requested per `eth_getLogs` page.
    pub max_block_range: u64,
    /// Records buffered between a live subscription and its consumer.
    pub event_channel_capacity: usize,
    pub polling_interval_seconds: u64,
    pub timeout_seconds: u64,
    pub use_websocket: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let network_name = env::var("ETHEREUM_NETWORK").unwrap_or_else(|_| "sepolia".to_string());
        let chain_id: u64 = env::var("CHAIN_ID")
            .unwrap_or_else(|_| Self::default_chain_id(&network_name).to_string())
            .parse()
            .map_err(|e| ContractError::Config(format!("Invalid chain ID: {e}")))?;

        let rpc_url = env::var("ETHEREUM_RPC_URL")
            .map_err(|_| ContractError::Config("ETHEREUM_RPC_URL is required".to_string()))?;

        let rpc_url = Url::parse(&rpc_url)
            .map_err(|e| ContractError::Config(format!("Invalid ETHEREUM_RPC_URL: {e}")))?;
        let ws_url = Self::build_ws_url_from_rpc(&rpc_url).ok();

        let address = env::var("CONTRACT_ADDRESS")
            .ok()
            .map(|raw| {
                raw.parse::<Address>()
                    .map_err(|e| ContractError::Config(format!("Invalid CONTRACT_ADDRESS: {e}")))
            })
            .transpose()?;

        let signer = if let Ok(private_key) = env::var("ETHEREUM_WALLET_PRIVATE_KEY") {
            let deployer_address = env::var("ETHEREUM_DEPLOYER_ADDRESS")
                .map_err(|_| {
                    ContractError::Config(
                        "ETHEREUM_DEPLOYER_ADDRESS is required when ETHEREUM_WALLET_PRIVATE_KEY is provided".to_string(),
                    )
                })?
                .parse::<Address>()
                .map_err(|e| {
                    ContractError::Config(format!("Invalid ETHEREUM_DEPLOYER_ADDRESS: {e}"))
                })?;

            let auth = AuthContext::from_private_key(&private_key, chain_id)?;
            if auth.address() != deployer_address {
                return Err(ContractError::Config(format!(
                    "Private key address ({}) does not match ETHEREUM_DEPLOYER_ADDRESS ({})",
                    auth.address(),
                    deployer_address
                )));
            }

            Some(SignerConfig {
                private_key,
                address: deployer_address,
            })
        } else {
            None
        };

        let defaults = ClientConfig::default();

        Ok(Self {
            network: NetworkConfig {
                name: network_name.clone(),
                chain_id,
                rpc_url,
                ws_url,
                explorer_url: Self::get_explorer_url(&network_name),
                is_testnet: Self::is_testnet(chain_id),
            },
            contract: ContractConfig {
                address,
                deployment_block: env::var("DEPLOYMENT_BLOCK")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
            signer,
            client: ClientConfig {
                max_block_range: env_or("MAX_BLOCK_RANGE", defaults.max_block_range),
                event_channel_capacity: env_or(
                    "EVENT_CHANNEL_CAPACITY",
                    defaults.event_channel_capacity,
                ),
                polling_interval_seconds: env_or(
                    "POLLING_INTERVAL_SECONDS",
                    defaults.polling_interval_seconds,
                ),
                timeout_seconds: env_or("TIMEOUT_SECONDS", defaults.timeout_seconds),
                use_websocket: env_or("USE_WEBSOCKET", defaults.use_websocket),
            },
        })
    }

    fn default_chain_id(network: &str) -> u64 {
        match network {
            "mainnet" => 1,
            "base" => 8453,
            "base-sepolia" => 84532,
            "arbitrum" => 42161,
            "arbitrum-sepolia" => 421_614,
            "optimism" => 10,
            "optimism-sepolia" => 11_155_420,
            "anvil" | "localhost" => 31337,
            _ => 11_155_111,
        }
    }

    fn build_ws_url_from_rpc(rpc_url: &Url) -> Result<Url> {
        let mut ws_url = rpc_url.clone();

        match rpc_url.scheme() {
            "https" => ws_url.set_scheme("wss").map_err(|()| {
                ContractError::Config("Failed to convert HTTPS to WSS".to_string())
            })?,
            "http" => ws_url
                .set_scheme("ws")
                .map_err(|()| ContractError::Config("Failed to convert HTTP to WS".to_string()))?,
            "ws" | "wss" => {}
            _ => {
                return Err(ContractError::Config(
                    "Unsupported RPC URL scheme".to_string(),
                ))
            }
        }

        Ok(ws_url)
    }

    fn get_explorer_url(network: &str) -> Option<Url> {
        let url_str = match network {
            "mainnet" => "https://etherscan.io",
            "sepolia" => "https://sepolia.etherscan.io",
            "base" => "https://basescan.org",
            "base-sepolia" => "https://sepolia.basescan.org",
            "arbitrum" => "https://arbiscan.io",
            "arbitrum-sepolia" => "https://sepolia.arbiscan.io",
            "optimism" => "https://optimistic.etherscan.io",
            "optimism-sepolia" => "https://sepolia-optimism.etherscan.io",
            _ => return None,
        };

        Url::parse(url_str).ok()
    }

    const fn is_testnet(chain_id: u64) -> bool {
        matches!(chain_id, 11_155_111 | 84532 | 421_614 | 11_155_420 | 31337)
    }

    /// Credentials for write calls, bound to the configured chain.
    pub fn auth_context(&self) -> Result<AuthContext> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            ContractError::Auth("ETHEREUM_WALLET_PRIVATE_KEY is not configured".to_string())
        })?;
        AuthContext::from_private_key(&signer.private_key, self.network.chain_id)
    }

    pub fn contract_address(&self) -> Result<Address> {
        self.contract
            .address
            .ok_or_else(|| ContractError::Config("CONTRACT_ADDRESS is required".to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.as_str().is_empty() {
            return Err(ContractError::Config(
                "ETHEREUM_RPC_URL is required".to_string(),
            ));
        }

        if self.contract.address == Some(Address::ZERO) {
            return Err(ContractError::Config(
                "CONTRACT_ADDRESS must not be the zero address".to_string(),
            ));
        }

        if self.client.max_block_range == 0 {
            return Err(ContractError::Config(
                "Max block range must be greater than 0".to_string(),
            ));
        }

        if self.client.event_channel_capacity == 0 {
            return Err(ContractError::Config(
                "Event channel capacity must be greater than 0".to_string(),
            ));
        }

        if self.client.polling_interval_seconds == 0 {
            return Err(ContractError::Config(
                "Polling interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_block_range: 1000,
            event_channel_capacity: 256,
            polling_interval_seconds: 4,
            timeout_seconds: 120,
            use_websocket: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                name: "anvil".to_string(),
                chain_id: 31337,
                rpc_url: Url::parse("http://127.0.0.1:8545").expect("static URL is valid"),
                ws_url: Url::parse("ws://127.0.0.1:8545").ok(),
                explorer_url: None,
                is_testnet: true,
            },
            contract: ContractConfig {
                address: None,
                deployment_block: None,
            },
            signer: None,
            client: ClientConfig::default(),
        }
    }
}
