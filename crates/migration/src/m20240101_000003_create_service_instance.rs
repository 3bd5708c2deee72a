//! Create `service_instance` table.
//!
//! `apps` is the ordered list of bound application names; it is only
//! mutated through single-statement conditional updates.
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceInstance::Table)
                    .if_not_exists()
                    .col(string_len(ServiceInstance::Name, 128).primary_key())
                    .col(string_len(ServiceInstance::ServiceName, 128).not_null())
                    .col(json_binary(ServiceInstance::Teams).not_null().default(Expr::cust("'[]'::jsonb")))
                    .col(json_binary(ServiceInstance::Apps).not_null().default(Expr::cust("'[]'::jsonb")))
                    .col(timestamp_with_time_zone(ServiceInstance::CreatedAt).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_instance_service")
                            .from(ServiceInstance::Table, ServiceInstance::ServiceName)
                            .to(Service::Table, Service::Name)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(ServiceInstance::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum ServiceInstance { Table, Name, ServiceName, Teams, Apps, CreatedAt }

#[derive(DeriveIden)]
enum Service { Table, Name }
