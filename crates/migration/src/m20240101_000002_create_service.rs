//! Create `service` table.
//!
//! `endpoints` maps environment name to provisioner base URL; `teams` lists
//! the teams allowed to use the service.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Service::Table)
                    .if_not_exists()
                    .col(string_len(Service::Name, 128).primary_key())
                    .col(json_binary(Service::Endpoints).not_null().default(Expr::cust("'{}'::jsonb")))
                    .col(json_binary(Service::Teams).not_null().default(Expr::cust("'[]'::jsonb")))
                    .col(text(Service::Doc).not_null().default(""))
                    .col(timestamp_with_time_zone(Service::CreatedAt).not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Service::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Service { Table, Name, Endpoints, Teams, Doc, CreatedAt }
