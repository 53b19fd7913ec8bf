use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Job::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Job::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Job::JobType).string().not_null())
                    .col(ColumnDef::new(Job::Arguments).text().not_null())
                    .col(
                        ColumnDef::new(Job::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Job::ExpireAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(Job::StateName).string().null())
                    .col(ColumnDef::new(Job::StateReason).string().null())
                    .col(ColumnDef::new(Job::StateData).text().null())
                    .col(
                        ColumnDef::new(Job::StateChangedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobState::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JobState::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(JobState::JobId).uuid().not_null())
                    .col(ColumnDef::new(JobState::Name).string().not_null())
                    .col(ColumnDef::new(JobState::Reason).string().null())
                    .col(ColumnDef::new(JobState::Data).text().not_null())
                    .col(
                        ColumnDef::new(JobState::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-job_state-job_id")
                            .from(JobState::Table, JobState::JobId)
                            .to(Job::Table, Job::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-job_state-job_id")
                    .table(JobState::Table)
                    .col(JobState::JobId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobQueue::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JobQueue::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(JobQueue::Queue).string().not_null())
                    .col(ColumnDef::new(JobQueue::JobId).uuid().not_null())
                    .col(
                        ColumnDef::new(JobQueue::EnqueuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-job_queue-job_id")
                            .from(JobQueue::Table, JobQueue::JobId)
                            .to(Job::Table, Job::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-job_queue-queue")
                    .table(JobQueue::Table)
                    .col(JobQueue::Queue)
                    .col(JobQueue::EnqueuedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobSet::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(JobSet::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(JobSet::Key).string().not_null())
                    .col(ColumnDef::new(JobSet::Value).string().not_null())
                    .col(ColumnDef::new(JobSet::Score).double().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-job_set-key-value")
                    .table(JobSet::Table)
                    .col(JobSet::Key)
                    .col(JobSet::Value)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(JobCounter::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobCounter::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobCounter::Key).string().not_null())
                    .col(ColumnDef::new(JobCounter::Value).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-job_counter-key")
                    .table(JobCounter::Table)
                    .col(JobCounter::Key)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobCounter::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobSet::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobQueue::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(JobState::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Job::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Job {
    Table,
    Id,
    JobType,
    Arguments,
    CreatedAt,
    ExpireAt,
    StateName,
    StateReason,
    StateData,
    StateChangedAt,
}

#[derive(DeriveIden)]
enum JobState {
    Table,
    Id,
    JobId,
    Name,
    Reason,
    Data,
    CreatedAt,
}

#[derive(DeriveIden)]
enum JobQueue {
    Table,
    Id,
    Queue,
    JobId,
    EnqueuedAt,
}

#[derive(DeriveIden)]
enum JobSet {
    Table,
    Id,
    Key,
    Value,
    Score,
}

#[derive(DeriveIden)]
enum JobCounter {
    Table,
    Id,
    Key,
    Value,
}
