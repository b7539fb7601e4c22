//! Persistence of transaction lifecycle records
//!
//! The Minter only ever inserts new rows and the status checkers only update
//! existing ones. Checker writes go through `update_if_pending`, so a row that
//! has reached `confirmed` or `failed` stays there even when several instances
//! share one database.

use std::collections::HashMap;
use std::str::FromStr;

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;
use parking_lot::RwLock;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, SqlErr,
};
use sea_orm_migration::MigratorTrait;

use crate::entities::transactions::{self, Entity as Transactions};
use crate::models::transaction::{TransactionRecord, TransactionStatus};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("transaction {0} already exists")]
    AlreadyExists(TxHash),
    #[error("transaction {0} not found")]
    NotFound(TxHash),
    #[error("database error")]
    Database(#[from] DbErr),
    #[error("invalid stored row for {hash}: {reason}")]
    InvalidRow { hash: String, reason: String },
}

/// What `update` does when no record with the given hash exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Fail with `RepoError::NotFound`
    #[default]
    Strict,
    /// Silently do nothing
    Lenient,
}

#[async_trait]
pub trait TransactionRepo: Send + Sync {
    /// Idempotent schema/initialization.
    async fn setup(&self) -> Result<(), RepoError>;

    /// Insert a brand-new record. Fails if the hash is already known.
    async fn create(&self, record: &TransactionRecord) -> Result<(), RepoError>;

    /// Full replace by hash.
    async fn update(&self, record: &TransactionRecord) -> Result<(), RepoError>;

    /// Full replace by hash, but only while the stored row is still `pending`.
    /// Returns `false` and leaves the row alone once it has left `pending`.
    /// A missing hash follows the `UpdatePolicy` like `update`.
    async fn update_if_pending(&self, record: &TransactionRecord) -> Result<bool, RepoError>;

    async fn get(&self, hash: &TxHash) -> Result<Option<TransactionRecord>, RepoError>;

    /// All records still in `pending`, unordered and unpaginated.
    async fn get_all_pending(&self) -> Result<Vec<TransactionRecord>, RepoError>;
}

#[derive(Debug, Default)]
pub struct InMemoryTransactionRepo {
    records: RwLock<HashMap<TxHash, TransactionRecord>>,
    update_policy: UpdatePolicy,
}

impl InMemoryTransactionRepo {
    pub fn new(update_policy: UpdatePolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            update_policy,
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl TransactionRepo for InMemoryTransactionRepo {
    async fn setup(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn create(&self, record: &TransactionRecord) -> Result<(), RepoError> {
        let mut records = self.records.write();
        if records.contains_key(&record.hash) {
            return Err(RepoError::AlreadyExists(record.hash));
        }
        records.insert(record.hash, record.clone());
        Ok(())
    }

    async fn update(&self, record: &TransactionRecord) -> Result<(), RepoError> {
        let mut records = self.records.write();
        match records.get_mut(&record.hash) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => match self.update_policy {
                UpdatePolicy::Strict => Err(RepoError::NotFound(record.hash)),
                UpdatePolicy::Lenient => Ok(()),
            },
        }
    }

    async fn update_if_pending(&self, record: &TransactionRecord) -> Result<bool, RepoError> {
        let mut records = self.records.write();
        match records.get_mut(&record.hash) {
            Some(existing) if existing.status == TransactionStatus::Pending => {
                *existing = record.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => match self.update_policy {
                UpdatePolicy::Strict => Err(RepoError::NotFound(record.hash)),
                UpdatePolicy::Lenient => Ok(false),
            },
        }
    }

    async fn get(&self, hash: &TxHash) -> Result<Option<TransactionRecord>, RepoError> {
        Ok(self.records.read().get(hash).cloned())
    }

    async fn get_all_pending(&self) -> Result<Vec<TransactionRecord>, RepoError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.status == TransactionStatus::Pending)
            .cloned()
            .collect())
    }
}

#[derive(Clone)]
pub struct PostgresTransactionRepo {
    db: DatabaseConnection,
    update_policy: UpdatePolicy,
}

impl PostgresTransactionRepo {
    pub fn new(db: DatabaseConnection, update_policy: UpdatePolicy) -> Self {
        Self { db, update_policy }
    }
}

#[async_trait]
impl TransactionRepo for PostgresTransactionRepo {
    async fn setup(&self) -> Result<(), RepoError> {
        tracing::info!("Running migrations...");
        migration::Migrator::up(&self.db, None).await?;
        Ok(())
    }

    async fn create(&self, record: &TransactionRecord) -> Result<(), RepoError> {
        let active_model = active_model_from(record);
        match Transactions::insert(active_model).exec(&self.db).await {
            Ok(_) => Ok(()),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(RepoError::AlreadyExists(record.hash))
                }
                _ => Err(e.into()),
            },
        }
    }

    async fn update(&self, record: &TransactionRecord) -> Result<(), RepoError> {
        let result = Transactions::update_many()
            .set(active_model_from(record))
            .filter(transactions::Column::Hash.eq(record.hash.to_string()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 && self.update_policy == UpdatePolicy::Strict {
            return Err(RepoError::NotFound(record.hash));
        }
        Ok(())
    }

    async fn update_if_pending(&self, record: &TransactionRecord) -> Result<bool, RepoError> {
        let result = Transactions::update_many()
            .set(active_model_from(record))
            .filter(transactions::Column::Hash.eq(record.hash.to_string()))
            .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            return Ok(true);
        }

        // Nothing matched: either the row already left pending or it does not exist
        let exists = Transactions::find_by_id(record.hash.to_string())
            .one(&self.db)
            .await?
            .is_some();
        if !exists && self.update_policy == UpdatePolicy::Strict {
            return Err(RepoError::NotFound(record.hash));
        }
        Ok(false)
    }

    async fn get(&self, hash: &TxHash) -> Result<Option<TransactionRecord>, RepoError> {
        Transactions::find_by_id(hash.to_string())
            .one(&self.db)
            .await?
            .map(TransactionRecord::try_from)
            .transpose()
    }

    async fn get_all_pending(&self) -> Result<Vec<TransactionRecord>, RepoError> {
        Transactions::find()
            .filter(transactions::Column::Status.eq(TransactionStatus::Pending.as_str()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(TransactionRecord::try_from)
            .collect()
    }
}

fn active_model_from(record: &TransactionRecord) -> transactions::ActiveModel {
    transactions::ActiveModel {
        hash: Set(record.hash.to_string()),
        status: Set(record.status.to_string()),
        from_address: Set(record.from.map(|a| a.to_string())),
        to_address: Set(record.to.to_string()),
        value: Set(record.value.map(|v| v.to_string())),
        nonce: Set(record.nonce.map(|n| n as i64)),
        gas_limit: Set(record.gas_limit.map(|g| g as i64)),
        block_number: Set(record.block_number.map(|b| b as i64)),
        token_id: Set(record.token_id.map(|id| id.to_string())),
        token_uri: Set(record.token_uri.clone()),
        issued_at: Set(record.issued_at),
        created_at: Set(record.created_at),
        updated_at: Set(record.updated_at),
    }
}

impl TryFrom<transactions::Model> for TransactionRecord {
    type Error = RepoError;

    fn try_from(model: transactions::Model) -> Result<Self, Self::Error> {
        let invalid = |reason: String| RepoError::InvalidRow {
            hash: model.hash.clone(),
            reason,
        };

        let hash = TxHash::from_str(&model.hash).map_err(|e| invalid(format!("hash: {}", e)))?;
        let status = model.status.parse::<TransactionStatus>().map_err(invalid)?;
        let from = model
            .from_address
            .as_deref()
            .map(Address::from_str)
            .transpose()
            .map_err(|e| invalid(format!("from_address: {}", e)))?;
        let to = Address::from_str(&model.to_address)
            .map_err(|e| invalid(format!("to_address: {}", e)))?;
        let value = model
            .value
            .as_deref()
            .map(U256::from_str)
            .transpose()
            .map_err(|e| invalid(format!("value: {}", e)))?;
        let token_id = model
            .token_id
            .as_deref()
            .map(U256::from_str)
            .transpose()
            .map_err(|e| invalid(format!("token_id: {}", e)))?;

        Ok(Self {
            hash,
            status,
            from,
            to,
            value,
            nonce: model.nonce.map(|n| n as u64),
            gas_limit: model.gas_limit.map(|g| g as u64),
            block_number: model.block_number.map(|b| b as u64),
            token_id,
            token_uri: model.token_uri,
            issued_at: model.issued_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
