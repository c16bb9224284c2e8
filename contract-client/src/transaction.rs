use crate::{
    connection::Connection,
    error::{ContractError, Result},
    types::Confirmation,
};
use alloy_primitives::TxHash;
use std::{sync::Arc, time::Duration};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// A broadcast transaction. Holding one does not imply it will be mined.
#[derive(Clone)]
pub struct TransactionHandle {
    hash: TxHash,
    connection: Arc<dyn Connection>,
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

impl TransactionHandle {
    pub(crate) fn new(hash: TxHash, connection: Arc<dyn Connection>) -> Self {
        Self { hash, connection }
    }

    #[must_use]
    pub const fn hash(&self) -> TxHash {
        self.hash
    }

    /// Single receipt lookup; `None` while pending.
    pub async fn receipt(&self) -> Result<Option<Confirmation>> {
        self.connection.receipt(self.hash).await
    }

    /// Poll until the transaction is mined or `timeout` elapses. A mined but
    /// reverted transaction is reported as [`ContractError::Reverted`].
    pub async fn confirm(&self, poll_interval: Duration, timeout: Duration) -> Result<Confirmation> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(confirmation) = self.receipt().await? {
                if !confirmation.success {
                    return Err(ContractError::Reverted(self.hash));
                }
                info!(
                    "Transaction {} mined in block {:?}",
                    self.hash, confirmation.block_number
                );
                return Ok(confirmation);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ContractError::Timeout(format!(
                    "Transaction {} not mined within {timeout:?}",
                    self.hash
                )));
            }
            debug!("Transaction {} pending", self.hash);
            sleep(poll_interval.min(deadline - now)).await;
        }
    }
}
