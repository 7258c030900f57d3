use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_inventory_tables::Migration),
            Box::new(m20240415_000002_add_audit_request_context::Migration),
        ]
    }
}

mod m20240301_000001_create_inventory_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_inventory_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Users::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Users::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Users::Username)
                                .string_len(150)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                        .col(ColumnDef::new(Users::Role).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Users::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Users::RegisteredAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(States::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(States::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(States::Name)
                                .string_len(50)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(States::Description).string_len(200).null())
                        .col(
                            ColumnDef::new(States::Color)
                                .string_len(7)
                                .not_null()
                                .default("#6c757d"),
                        )
                        .col(
                            ColumnDef::new(States::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string_len(150).not_null())
                        .col(ColumnDef::new(Products::Description).string_len(500).null())
                        .col(
                            ColumnDef::new(Products::Code)
                                .string_len(50)
                                .null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::StateId).integer().not_null())
                        .col(ColumnDef::new(Products::AssignedUserId).integer().null())
                        .col(
                            ColumnDef::new(Products::AssignedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Products::DueAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Products::ReturnedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_state_id")
                                .from(Products::Table, Products::StateId)
                                .to(States::Table, States::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_products_assigned_user_id")
                                .from(Products::Table, Products::AssignedUserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Movements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Movements::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Movements::ProductId).integer().not_null())
                        .col(ColumnDef::new(Movements::UserId).integer().not_null())
                        .col(
                            ColumnDef::new(Movements::PreviousState)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Movements::NewState).string_len(50).not_null())
                        .col(
                            ColumnDef::new(Movements::OccurredAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Movements::Detail).string_len(500).null())
                        .col(ColumnDef::new(Movements::DurationDays).integer().null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_movements_product_id")
                                .from(Movements::Table, Movements::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_movements_user_id")
                                .from(Movements::Table, Movements::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_movements_product_occurred")
                        .table(Movements::Table)
                        .col(Movements::ProductId)
                        .col(Movements::OccurredAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_movements_occurred_at")
                        .table(Movements::Table)
                        .col(Movements::OccurredAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(AuditEntries::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(AuditEntries::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(AuditEntries::UserId).integer().not_null())
                        .col(ColumnDef::new(AuditEntries::Action).string_len(100).not_null())
                        .col(ColumnDef::new(AuditEntries::Detail).text().null())
                        .col(
                            ColumnDef::new(AuditEntries::OccurredAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_audit_entries_user_id")
                                .from(AuditEntries::Table, AuditEntries::UserId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Notifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Notifications::Id)
                                .integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Notifications::Message)
                                .string_len(250)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Notifications::Read)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(Notifications::RecipientId).integer().null())
                        .col(ColumnDef::new(Notifications::Kind).string_len(32).not_null())
                        .col(ColumnDef::new(Notifications::Link).string_len(200).null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_notifications_recipient_id")
                                .from(Notifications::Table, Notifications::RecipientId)
                                .to(Users::Table, Users::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Notifications::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(AuditEntries::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Movements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(States::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Users::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Users {
        Table,
        Id,
        Username,
        PasswordHash,
        Role,
        Active,
        RegisteredAt,
    }

    #[derive(DeriveIden)]
    enum States {
        Table,
        Id,
        Name,
        Description,
        Color,
        SortOrder,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Description,
        Code,
        StateId,
        AssignedUserId,
        AssignedAt,
        DueAt,
        ReturnedAt,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum Movements {
        Table,
        Id,
        ProductId,
        UserId,
        PreviousState,
        NewState,
        OccurredAt,
        Detail,
        DurationDays,
    }

    #[derive(DeriveIden)]
    enum AuditEntries {
        Table,
        Id,
        UserId,
        Action,
        Detail,
        OccurredAt,
    }

    #[derive(DeriveIden)]
    enum Notifications {
        Table,
        Id,
        Message,
        CreatedAt,
        Read,
        RecipientId,
        Kind,
        Link,
    }
}

mod m20240415_000002_add_audit_request_context {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240415_000002_add_audit_request_context"
        }
    }

    // SQLite only accepts one column per ALTER TABLE statement.
    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .alter_table(
                    Table::alter()
                        .table(AuditEntries::Table)
                        .add_column(ColumnDef::new(AuditEntries::IpAddress).string_len(45).null())
                        .to_owned(),
                )
                .await?;
            manager
                .alter_table(
                    Table::alter()
                        .table(AuditEntries::Table)
                        .add_column(ColumnDef::new(AuditEntries::UserAgent).string_len(255).null())
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .alter_table(
                    Table::alter()
                        .table(AuditEntries::Table)
                        .drop_column(AuditEntries::UserAgent)
                        .to_owned(),
                )
                .await?;
            manager
                .alter_table(
                    Table::alter()
                        .table(AuditEntries::Table)
                        .drop_column(AuditEntries::IpAddress)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    enum AuditEntries {
        Table,
        IpAddress,
        UserAgent,
    }
}
