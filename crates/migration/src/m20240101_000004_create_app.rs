//! Create `app` table.
//!
//! Written by the application platform; the broker only mutates `env`.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(App::Table)
                    .if_not_exists()
                    .col(string_len(App::Name, 128).primary_key())
                    .col(string_len(App::Framework, 64).not_null().default(""))
                    .col(json_binary(App::Teams).not_null().default(Expr::cust("'[]'::jsonb")))
                    .col(json_binary(App::Units).not_null().default(Expr::cust("'[]'::jsonb")))
                    .col(json_binary(App::Env).not_null().default(Expr::cust("'{}'::jsonb")))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(App::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum App { Table, Name, Framework, Teams, Units, Env }
