use crate::error::{ContractError, Result};
use alloy_primitives::Address;
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use std::str::FromStr;

/// Signing credentials together with the network they are valid for.
#[derive(Debug, Clone)]
pub struct AuthContext {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl AuthContext {
    #[must_use]
    pub fn new(mut signer: PrivateKeySigner, chain_id: u64) -> Self {
        signer.set_chain_id(Some(chain_id));
        Self { signer, chain_id }
    }

    /// Accepts a hex private key with or without the `0x` prefix.
    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(private_key.trim())
            .map_err(|e| ContractError::Auth(format!("Invalid private key: {e}")))?;
        Ok(Self::new(signer, chain_id))
    }

    #[must_use]
    pub const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub(crate) fn ensure_network(&self, connected_chain_id: u64) -> Result<()> {
        if self.chain_id != connected_chain_id {
            return Err(ContractError::Auth(format!(
                "Credentials are for chain {} but the connection is on chain {connected_chain_id}",
                self.chain_id
            )));
        }
        Ok(())
    }
}
