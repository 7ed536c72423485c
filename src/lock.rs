use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, Statement,
    TransactionTrait, Value,
};

use crate::config::AdvisoryLockStrategy;
use crate::error::TreeError;

/// A transaction scope wrapping one tree mutation, optionally guarded by a
/// PostgreSQL advisory lock.
///
/// The guard must be consumed through [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); if it is dropped instead (including during
/// an unwind), the underlying transaction rolls back.
pub struct LockedTransaction {
    txn: Option<DatabaseTransaction>,
    lock_key: Option<String>,
}

impl LockedTransaction {
    pub async fn acquire(
        strategy: &AdvisoryLockStrategy,
        db: &DatabaseConnection,
    ) -> Result<Self, TreeError> {
        let txn = db.begin().await?;

        let lock_key = match strategy.key() {
            Some(key) => {
                let key = key.as_str().to_owned();
                if let Err(err) = lock_call(&txn, "pg_advisory_lock", &key).await {
                    let _ = txn.rollback().await;
                    return Err(err);
                }
                Some(key)
            }
            None => None,
        };

        Ok(Self {
            txn: Some(txn),
            lock_key,
        })
    }

    /// Connection the caller issues its statements on.
    pub fn connection(&self) -> &DatabaseTransaction {
        self.txn.as_ref().expect("transaction already consumed")
    }

    /// Whether this scope holds an advisory lock.
    pub fn holds_lock(&self) -> bool {
        self.lock_key.is_some()
    }

    pub async fn commit(mut self) -> Result<(), TreeError> {
        self.release().await?;
        if let Some(txn) = self.txn.take() {
            txn.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(mut self) -> Result<(), TreeError> {
        let _ = self.release().await;
        if let Some(txn) = self.txn.take() {
            txn.rollback().await?;
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<(), TreeError> {
        if let (Some(txn), Some(key)) = (self.txn.as_ref(), self.lock_key.take()) {
            lock_call(txn, "pg_advisory_unlock", &key).await?;
        }
        Ok(())
    }
}

async fn lock_call(
    txn: &DatabaseTransaction,
    function: &str,
    key: &str,
) -> Result<(), TreeError> {
    txn.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        format!("SELECT {function}(hashtext($1), 0)"),
        [Value::from(key)],
    ))
    .await?;
    Ok(())
}
