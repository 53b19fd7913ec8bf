//! `SeaORM` Entity for persisted jobs and their current state

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "job")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_type: String,
    /// JSON encoded invocation arguments
    #[sea_orm(column_type = "Text")]
    pub arguments: String,
    pub created_at: DateTimeUtc,
    pub expire_at: Option<DateTimeUtc>,
    pub state_name: Option<String>,
    pub state_reason: Option<String>,
    /// JSON encoded state data
    #[sea_orm(column_type = "Text", nullable)]
    pub state_data: Option<String>,
    pub state_changed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job_state::Entity")]
    JobState,
    #[sea_orm(has_many = "super::queued_job::Entity")]
    QueuedJob,
}

impl Related<super::job_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobState.def()
    }
}

impl Related<super::queued_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QueuedJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
