use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{debug, trace};
use uuid::Uuid;

use super::{JobDetails, JobStorage, NewJob, StorageError};
use crate::database::models::{counter, job, job_state, queued_job, set_entry};
use crate::jobs::{
    invocation::{Invocation, JobData},
    job_id::JobId,
    states::{StateData, StateRecord},
    transaction::WriteOp,
};

/// Storage backed by any database `SeaORM` can talk to.
///
/// A commit runs every buffered operation inside one database transaction;
/// the first failing statement rolls the whole batch back.
#[derive(Clone, Debug)]
pub struct DatabaseStorage {
    db: DatabaseConnection,
}

impl DatabaseStorage {
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl JobStorage for DatabaseStorage {
    async fn create_job(&self, job: NewJob) -> Result<JobId, StorageError> {
        let job_id = JobId::new();

        let job_model = job::ActiveModel {
            id: Set(job_id.as_uuid()),
            job_type: Set(job.invocation.job_type().to_string()),
            arguments: Set(serde_json::to_string(job.invocation.arguments())?),
            created_at: Set(job.created_at),
            expire_at: Set(Some(job.expire_at)),
            state_name: Set(None),
            state_reason: Set(None),
            state_data: Set(None),
            state_changed_at: Set(None),
        };

        job_model.insert(&self.db).await?;

        debug!("Inserted job {} of type {}", job_id, job.invocation.job_type());
        Ok(job_id)
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<JobDetails>, StorageError> {
        let Some(model) = job::Entity::find_by_id(job_id.as_uuid()).one(&self.db).await? else {
            return Ok(None);
        };

        job_details(model).map(Some)
    }

    async fn commit(&self, operations: Vec<WriteOp>) -> Result<(), StorageError> {
        let txn = self.db.begin().await?;

        for operation in operations {
            // Dropping `txn` on error rolls back everything applied so far
            apply_operation(&txn, operation).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn queued_job_ids(&self, queue: &str) -> Result<Vec<JobId>, StorageError> {
        Ok(queued_job::Entity::find()
            .filter(queued_job::Column::Queue.eq(queue))
            .order_by_asc(queued_job::Column::EnqueuedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|queued| JobId::from_uuid(queued.job_id))
            .collect())
    }

    async fn state_history(&self, job_id: JobId) -> Result<Vec<StateRecord>, StorageError> {
        job_state::Entity::find()
            .filter(job_state::Column::JobId.eq(job_id.as_uuid()))
            .order_by_asc(job_state::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|entry| {
                Ok(StateRecord {
                    data: decode_state_data(job_id, &entry.data)?,
                    name: entry.name,
                    reason: entry.reason,
                    created_at: entry.created_at,
                })
            })
            .collect()
    }

    async fn set_entries(&self, key: &str) -> Result<Vec<(String, f64)>, StorageError> {
        Ok(set_entry::Entity::find()
            .filter(set_entry::Column::Key.eq(key))
            .order_by_asc(set_entry::Column::Score)
            .order_by_asc(set_entry::Column::Value)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|entry| (entry.value, entry.score))
            .collect())
    }

    async fn counter_value(&self, key: &str) -> Result<i64, StorageError> {
        Ok(counter::Entity::find()
            .filter(counter::Column::Key.eq(key))
            .all(&self.db)
            .await?
            .iter()
            .map(|row| row.value)
            .sum())
    }
}

async fn apply_operation(
    txn: &DatabaseTransaction,
    operation: WriteOp,
) -> Result<(), StorageError> {
    trace!("Applying {:?}", operation);

    match operation {
        WriteOp::AddToQueue { queue, job_id } => {
            queued_job::ActiveModel {
                id: Set(Uuid::new_v4()),
                queue: Set(queue),
                job_id: Set(job_id.as_uuid()),
                enqueued_at: Set(Utc::now()),
            }
            .insert(txn)
            .await?;
        }
        WriteOp::SetJobState { job_id, state } => {
            let job_model = job::ActiveModel {
                id: Set(job_id.as_uuid()),
                state_name: Set(Some(state.name)),
                state_reason: Set(state.reason),
                state_data: Set(Some(serde_json::to_string(&state.data)?)),
                state_changed_at: Set(Some(state.created_at)),
                ..Default::default()
            };
            update_job(txn, job_id, job_model).await?;
        }
        WriteOp::AddJobState { job_id, state } => {
            job_state::ActiveModel {
                id: Set(Uuid::new_v4()),
                job_id: Set(job_id.as_uuid()),
                name: Set(state.name),
                reason: Set(state.reason),
                data: Set(serde_json::to_string(&state.data)?),
                created_at: Set(state.created_at),
            }
            .insert(txn)
            .await?;
        }
        WriteOp::AddToSet { key, value, score } => {
            set_entry::Entity::delete_many()
                .filter(set_entry::Column::Key.eq(key.as_str()))
                .filter(set_entry::Column::Value.eq(value.as_str()))
                .exec(txn)
                .await?;

            set_entry::ActiveModel {
                id: Set(Uuid::new_v4()),
                key: Set(key),
                value: Set(value),
                score: Set(score),
            }
            .insert(txn)
            .await?;
        }
        WriteOp::RemoveFromSet { key, value } => {
            set_entry::Entity::delete_many()
                .filter(set_entry::Column::Key.eq(key))
                .filter(set_entry::Column::Value.eq(value))
                .exec(txn)
                .await?;
        }
        WriteOp::IncrementCounter { key } => {
            insert_counter(txn, key, 1).await?;
        }
        WriteOp::DecrementCounter { key } => {
            insert_counter(txn, key, -1).await?;
        }
        WriteOp::ExpireJob { job_id, expire_at } => {
            let job_model = job::ActiveModel {
                id: Set(job_id.as_uuid()),
                expire_at: Set(Some(expire_at)),
                ..Default::default()
            };
            update_job(txn, job_id, job_model).await?;
        }
        WriteOp::PersistJob { job_id } => {
            let job_model = job::ActiveModel {
                id: Set(job_id.as_uuid()),
                expire_at: Set(None),
                ..Default::default()
            };
            update_job(txn, job_id, job_model).await?;
        }
    }

    Ok(())
}

async fn update_job(
    txn: &DatabaseTransaction,
    job_id: JobId,
    job_model: job::ActiveModel,
) -> Result<(), StorageError> {
    match job_model.update(txn).await {
        Ok(_) => Ok(()),
        Err(DbErr::RecordNotUpdated) => Err(StorageError::JobMissing(job_id)),
        Err(e) => Err(e.into()),
    }
}

async fn insert_counter(
    txn: &DatabaseTransaction,
    key: String,
    value: i64,
) -> Result<(), StorageError> {
    counter::ActiveModel {
        id: Set(Uuid::new_v4()),
        key: Set(key),
        value: Set(value),
    }
    .insert(txn)
    .await?;
    Ok(())
}

fn job_details(model: job::Model) -> Result<JobDetails, StorageError> {
    let job_id = JobId::from_uuid(model.id);
    let corrupt = |message: String| StorageError::CorruptRecord { job_id, message };

    let arguments =
        serde_json::from_str(&model.arguments).map_err(|e| corrupt(e.to_string()))?;
    let invocation =
        Invocation::new(model.job_type, arguments).map_err(|e| corrupt(e.to_string()))?;

    let state = match (model.state_name, model.state_data, model.state_changed_at) {
        (Some(name), Some(data), Some(created_at)) => Some(StateRecord {
            name,
            reason: model.state_reason,
            data: decode_state_data(job_id, &data)?,
            created_at,
        }),
        (None, _, _) => None,
        _ => return Err(corrupt("incomplete current state".to_string())),
    };

    Ok(JobDetails {
        job: JobData {
            id: job_id,
            invocation,
            created_at: model.created_at,
        },
        state,
        expire_at: model.expire_at,
    })
}

fn decode_state_data(job_id: JobId, data: &str) -> Result<StateData, StorageError> {
    serde_json::from_str(data).map_err(|e| StorageError::CorruptRecord {
        job_id,
        message: format!("invalid state data: {e}"),
    })
}
