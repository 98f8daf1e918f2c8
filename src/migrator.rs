use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_orders_table::Migration),
            Box::new(m20260101_000002_create_onboarding_records_table::Migration),
            Box::new(m20260101_000003_create_webhook_events_table::Migration),
            Box::new(m20260101_000004_create_clients_table::Migration),
            Box::new(m20260101_000005_create_provisioned_resources_tables::Migration),
        ]
    }
}

mod m20260101_000001_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::OrderNumber).string().not_null())
                        .col(
                            ColumnDef::new(Orders::CheckoutSessionId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::WorkspaceId).uuid().not_null())
                        .col(ColumnDef::new(Orders::ClientId).uuid().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(
                            ColumnDef::new(Orders::InboxCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::DomainCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Orders::TotalAmountCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::Skus).json().not_null())
                        .col(ColumnDef::new(Orders::OrderDate).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Orders::FulfilledDate).timestamp_with_time_zone().null())
                        .col(ColumnDef::new(Orders::FulfillmentNotes).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp_with_time_zone().null())
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_order_number")
                        .table(Orders::Table)
                        .col(Orders::OrderNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Second line of defense against duplicate checkout events:
            // a session id can only ever originate one order.
            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_checkout_session_id")
                        .table(Orders::Table)
                        .col(Orders::CheckoutSessionId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Orders {
        Table,
        Id,
        OrderNumber,
        CheckoutSessionId,
        WorkspaceId,
        ClientId,
        Status,
        InboxCount,
        DomainCount,
        TotalAmountCents,
        Currency,
        Skus,
        OrderDate,
        FulfilledDate,
        FulfillmentNotes,
        CreatedAt,
        UpdatedAt,
        Version,
    }
}

mod m20260101_000002_create_onboarding_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_onboarding_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OnboardingRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OnboardingRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OnboardingRecords::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OnboardingRecords::BusinessType).string().null())
                        .col(ColumnDef::new(OnboardingRecords::Industry).string().null())
                        .col(ColumnDef::new(OnboardingRecords::CompanySize).string().null())
                        .col(ColumnDef::new(OnboardingRecords::Website).string().null())
                        .col(
                            ColumnDef::new(OnboardingRecords::DomainPreferences)
                                .json()
                                .null(),
                        )
                        .col(ColumnDef::new(OnboardingRecords::Personas).json().null())
                        .col(
                            ColumnDef::new(OnboardingRecords::EspCredentials)
                                .json()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OnboardingRecords::StepCompleted)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(OnboardingRecords::IsCompleted)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(OnboardingRecords::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OnboardingRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OnboardingRecords::UpdatedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .to_owned(),
                )
                .await?;

            // At most one onboarding record per order.
            manager
                .create_index(
                    Index::create()
                        .name("idx_onboarding_records_order_id")
                        .table(OnboardingRecords::Table)
                        .col(OnboardingRecords::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OnboardingRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum OnboardingRecords {
        Table,
        Id,
        OrderId,
        BusinessType,
        Industry,
        CompanySize,
        Website,
        DomainPreferences,
        Personas,
        EspCredentials,
        StepCompleted,
        IsCompleted,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000003_create_webhook_events_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_webhook_events_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(WebhookEvents::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WebhookEvents::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(WebhookEvents::EventId).string().not_null())
                        .col(
                            ColumnDef::new(WebhookEvents::ProcessedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // The atomic check-and-mark primitive: concurrent deliveries of
            // the same event race on this index and exactly one insert wins.
            manager
                .create_index(
                    Index::create()
                        .name("idx_webhook_events_event_id")
                        .table(WebhookEvents::Table)
                        .col(WebhookEvents::EventId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WebhookEvents::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum WebhookEvents {
        Table,
        Id,
        EventId,
        ProcessedAt,
    }
}

mod m20260101_000004_create_clients_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_clients_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Clients::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Clients::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Clients::WorkspaceId).uuid().not_null())
                        .col(
                            ColumnDef::new(Clients::ExternalCustomerId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Clients::Email).string().null())
                        .col(ColumnDef::new(Clients::Name).string().null())
                        .col(ColumnDef::new(Clients::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_clients_workspace_external_customer")
                        .table(Clients::Table)
                        .col(Clients::WorkspaceId)
                        .col(Clients::ExternalCustomerId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Clients::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Clients {
        Table,
        Id,
        WorkspaceId,
        ExternalCustomerId,
        Email,
        Name,
        CreatedAt,
    }
}

mod m20260101_000005_create_provisioned_resources_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000005_create_provisioned_resources_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MailDomains::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MailDomains::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MailDomains::Name).string().not_null())
                        .col(ColumnDef::new(MailDomains::Status).string().not_null())
                        .col(ColumnDef::new(MailDomains::OrderId).uuid().not_null())
                        .col(ColumnDef::new(MailDomains::WorkspaceId).uuid().not_null())
                        .col(ColumnDef::new(MailDomains::ClientId).uuid().not_null())
                        .col(ColumnDef::new(MailDomains::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_mail_domains_name")
                        .table(MailDomains::Table)
                        .col(MailDomains::Name)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Mailboxes::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Mailboxes::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Mailboxes::Address).string().not_null())
                        .col(ColumnDef::new(Mailboxes::DisplayName).string().null())
                        .col(ColumnDef::new(Mailboxes::DomainId).uuid().not_null())
                        .col(ColumnDef::new(Mailboxes::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Mailboxes::WorkspaceId).uuid().not_null())
                        .col(ColumnDef::new(Mailboxes::ClientId).uuid().not_null())
                        .col(ColumnDef::new(Mailboxes::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_mailboxes_address")
                        .table(Mailboxes::Table)
                        .col(Mailboxes::Address)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Personas::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Personas::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Personas::Name).string().not_null())
                        .col(ColumnDef::new(Personas::Role).string().null())
                        .col(ColumnDef::new(Personas::Tags).json().null())
                        .col(ColumnDef::new(Personas::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Personas::WorkspaceId).uuid().not_null())
                        .col(ColumnDef::new(Personas::ClientId).uuid().not_null())
                        .col(ColumnDef::new(Personas::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Subscriptions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Subscriptions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Subscriptions::OrderId).uuid().not_null())
                        .col(ColumnDef::new(Subscriptions::Sku).string().not_null())
                        .col(ColumnDef::new(Subscriptions::Status).string().not_null())
                        .col(ColumnDef::new(Subscriptions::WorkspaceId).uuid().not_null())
                        .col(ColumnDef::new(Subscriptions::ClientId).uuid().not_null())
                        .col(
                            ColumnDef::new(Subscriptions::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Exactly one subscription per order.
            manager
                .create_index(
                    Index::create()
                        .name("idx_subscriptions_order_id")
                        .table(Subscriptions::Table)
                        .col(Subscriptions::OrderId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Subscriptions::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Personas::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Mailboxes::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MailDomains::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum MailDomains {
        Table,
        Id,
        Name,
        Status,
        OrderId,
        WorkspaceId,
        ClientId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Mailboxes {
        Table,
        Id,
        Address,
        DisplayName,
        DomainId,
        OrderId,
        WorkspaceId,
        ClientId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Personas {
        Table,
        Id,
        Name,
        Role,
        Tags,
        OrderId,
        WorkspaceId,
        ClientId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Subscriptions {
        Table,
        Id,
        OrderId,
        Sku,
        Status,
        WorkspaceId,
        ClientId,
        CreatedAt,
    }
}
