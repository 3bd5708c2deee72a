use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Names are primary keys already; the explicit unique indexes keep the
        // uniqueness contract visible even if keys change later.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uniq_service_name")
                    .table(Service::Table)
                    .col(Service::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uniq_service_instance_name")
                    .table(ServiceInstance::Table)
                    .col(ServiceInstance::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ServiceInstance: lookup by owning service (delete guard, catalog)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_service_instance_service")
                    .table(ServiceInstance::Table)
                    .col(ServiceInstance::ServiceName)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_service_instance_created")
                    .table(ServiceInstance::Table)
                    .col(ServiceInstance::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_service_instance_created").table(ServiceInstance::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_service_instance_service").table(ServiceInstance::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("uniq_service_instance_name").table(ServiceInstance::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("uniq_service_name").table(Service::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Service { Table, Name }

#[derive(DeriveIden)]
enum ServiceInstance { Table, Name, ServiceName, CreatedAt }
