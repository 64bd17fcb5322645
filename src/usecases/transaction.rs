//! Transaction coordinator. Runs a unit of work atomically against storage.
//!
//! The unit of work receives a [`Scope::Tx`] and must hand it to every repository call it
//! makes. Nested calls to [`TransactionCoordinator::run`] are not supported.

use crate::domain::DomainError;
use crate::ports::{Scope, TxManager};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct TransactionCoordinator {
    tx_manager: Arc<dyn TxManager>,
}

impl TransactionCoordinator {
    pub fn new(tx_manager: Arc<dyn TxManager>) -> Self {
        Self { tx_manager }
    }

    /// Begin, run `unit`, then commit on success or roll back on failure.
    ///
    /// A failed rollback is reported together with the original error. A commit failure
    /// is returned as-is. If the returned future is dropped before completion the
    /// transaction handle is dropped uncommitted and storage discards its writes.
    pub async fn run<T, F, Fut>(&self, unit: F) -> Result<T, DomainError>
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = Result<T, DomainError>>,
    {
        let tx = self.tx_manager.begin().await?;

        match unit(Scope::Tx(Arc::clone(&tx))).await {
            Ok(value) => {
                tx.commit().await?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %err, rollback_error = %rollback_err, "rollback failed");
                    return Err(DomainError::Rollback {
                        rollback: Box::new(rollback_err),
                        source: Box::new(err),
                    });
                }
                warn!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}
