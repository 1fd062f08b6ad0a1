//! Create `actor_keypair` table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActorKeypair::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActorKeypair::ActorId)
                            .string_len(512)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActorKeypair::PublicKey).text().not_null())
                    .col(ColumnDef::new(ActorKeypair::PrivateKey).text().not_null())
                    .col(
                        ColumnDef::new(ActorKeypair::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ActorKeypair::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ActorKeypair::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ActorKeypair {
    Table,
    ActorId,
    PublicKey,
    PrivateKey,
    CreatedAt,
    UpdatedAt,
}
