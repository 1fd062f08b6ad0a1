//! Create `delivery_queue` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryQueue::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeliveryQueue::ActorId)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryQueue::Address).text().not_null())
                    .col(ColumnDef::new(DeliveryQueue::Body).text().not_null())
                    .col(ColumnDef::new(DeliveryQueue::SigningKey).text().not_null())
                    .col(
                        ColumnDef::new(DeliveryQueue::Attempt)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(DeliveryQueue::ClaimedUntil).timestamp_with_time_zone())
                    .col(ColumnDef::new(DeliveryQueue::ClaimToken).uuid())
                    .col(
                        ColumnDef::new(DeliveryQueue::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Per-actor lookups when an operator inspects a backlog
        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_queue_actor_id")
                    .table(DeliveryQueue::Table)
                    .col(DeliveryQueue::ActorId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryQueue::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum DeliveryQueue {
    Table,
    Id,
    ActorId,
    Address,
    Body,
    SigningKey,
    Attempt,
    ClaimedUntil,
    ClaimToken,
    CreatedAt,
}
