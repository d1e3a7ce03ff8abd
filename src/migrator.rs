use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_catalog_tables::Migration),
            Box::new(m20240301_000002_create_stock_ledger_tables::Migration),
            Box::new(m20240301_000003_create_stock_corrections_table::Migration),
            Box::new(m20240301_000004_create_serial_tables::Migration),
            Box::new(m20240301_000005_create_idempotency_records_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240301_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Locations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Locations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Locations::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(Locations::Name).string().not_null())
                        .col(
                            ColumnDef::new(Locations::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Locations::CreatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_locations_business_id")
                        .table(Locations::Table)
                        .col(Locations::BusinessId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariations::BusinessId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariations::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariations::Sku).string().not_null())
                        .col(ColumnDef::new(ProductVariations::Name).string().not_null())
                        // sqlite caps decimal precision at 16.
                        .col(
                            ColumnDef::new(ProductVariations::SellingPrice)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductVariations::DefaultUnitCost)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariations::IsSerialized)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProductVariations::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_variations_sku")
                        .table(ProductVariations::Table)
                        .col(ProductVariations::BusinessId)
                        .col(ProductVariations::Sku)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariations::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Locations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Locations {
        Table,
        Id,
        BusinessId,
        Name,
        IsActive,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum ProductVariations {
        Table,
        Id,
        BusinessId,
        ProductId,
        Sku,
        Name,
        SellingPrice,
        DefaultUnitCost,
        IsSerialized,
        CreatedAt,
    }
}

mod m20240301_000002_create_stock_ledger_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_stock_ledger_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Append-only ledger of signed movements
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::LocationId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::ProductId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::VariationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::MovementType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::Quantity)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::BalanceAfter)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::UnitCost)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(ColumnDef::new(StockMovements::ReferenceType).string().null())
                        .col(ColumnDef::new(StockMovements::ReferenceId).uuid().null())
                        .col(ColumnDef::new(StockMovements::Notes).string().null())
                        .col(ColumnDef::new(StockMovements::ActorId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Windowed scans run over this composite index
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_key_created_at")
                        .table(StockMovements::Table)
                        .col(StockMovements::BusinessId)
                        .col(StockMovements::VariationId)
                        .col(StockMovements::LocationId)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_reference")
                        .table(StockMovements::Table)
                        .col(StockMovements::ReferenceType)
                        .col(StockMovements::ReferenceId)
                        .to_owned(),
                )
                .await?;

            // Denormalized balance cache, one row per (variation, location)
            manager
                .create_table(
                    Table::create()
                        .table(StockLevels::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLevels::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockLevels::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::ProductId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::VariationId).uuid().not_null())
                        .col(ColumnDef::new(StockLevels::LocationId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockLevels::QtyAvailable)
                                .decimal_len(16, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockLevels::SellingPrice)
                                .decimal_len(16, 4)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(StockLevels::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(ColumnDef::new(StockLevels::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(StockLevels::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_levels_variation_location")
                        .table(StockLevels::Table)
                        .col(StockLevels::VariationId)
                        .col(StockLevels::LocationId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLevels::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        BusinessId,
        LocationId,
        ProductId,
        VariationId,
        MovementType,
        Quantity,
        BalanceAfter,
        UnitCost,
        ReferenceType,
        ReferenceId,
        Notes,
        ActorId,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum StockLevels {
        Table,
        Id,
        BusinessId,
        ProductId,
        VariationId,
        LocationId,
        QtyAvailable,
        SellingPrice,
        Version,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000003_create_stock_corrections_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_stock_corrections_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockCorrections::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockCorrections::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::BusinessId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::LocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::VariationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::SystemCount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::PhysicalCount)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::Difference)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockCorrections::Reason).string().not_null())
                        .col(ColumnDef::new(StockCorrections::Remarks).string().null())
                        .col(
                            ColumnDef::new(StockCorrections::Status)
                                .string_len(32)
                                .not_null()
                                .default("pending"),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::RequestedBy)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockCorrections::ApprovedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockCorrections::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockCorrections::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_corrections_key_status")
                        .table(StockCorrections::Table)
                        .col(StockCorrections::VariationId)
                        .col(StockCorrections::LocationId)
                        .col(StockCorrections::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockCorrections::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockCorrections {
        Table,
        Id,
        BusinessId,
        LocationId,
        ProductId,
        VariationId,
        SystemCount,
        PhysicalCount,
        Difference,
        Reason,
        Remarks,
        Status,
        RequestedBy,
        ApprovedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000004_create_serial_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000004_create_serial_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(SerialUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SerialUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SerialUnits::BusinessId).uuid().not_null())
                        .col(ColumnDef::new(SerialUnits::VariationId).uuid().not_null())
                        .col(
                            ColumnDef::new(SerialUnits::SerialNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SerialUnits::Status)
                                .string_len(32)
                                .not_null()
                                .default("in_stock"),
                        )
                        .col(
                            ColumnDef::new(SerialUnits::CurrentLocationId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SerialUnits::OriginReferenceType)
                                .string()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(SerialUnits::OriginReferenceId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(SerialUnits::CreatedAt).timestamp_with_time_zone().not_null())
                        .col(ColumnDef::new(SerialUnits::UpdatedAt).timestamp_with_time_zone().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_serial_units_serial_number")
                        .table(SerialUnits::Table)
                        .col(SerialUnits::BusinessId)
                        .col(SerialUnits::VariationId)
                        .col(SerialUnits::SerialNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SerialMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SerialMovements::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SerialMovements::SerialUnitId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SerialMovements::MovementType)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(SerialMovements::FromLocationId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(SerialMovements::ToLocationId).uuid().null())
                        .col(
                            ColumnDef::new(SerialMovements::ReferenceType)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(SerialMovements::ReferenceId).uuid().null())
                        .col(ColumnDef::new(SerialMovements::ActorId).uuid().not_null())
                        .col(
                            ColumnDef::new(SerialMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_serial_movements_serial_unit_id")
                                .from(SerialMovements::Table, SerialMovements::SerialUnitId)
                                .to(SerialUnits::Table, SerialUnits::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_serial_movements_unit_created_at")
                        .table(SerialMovements::Table)
                        .col(SerialMovements::SerialUnitId)
                        .col(SerialMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_serial_movements_reference")
                        .table(SerialMovements::Table)
                        .col(SerialMovements::ReferenceType)
                        .col(SerialMovements::ReferenceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SerialMovements::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(SerialUnits::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum SerialUnits {
        Table,
        Id,
        BusinessId,
        VariationId,
        SerialNumber,
        Status,
        CurrentLocationId,
        OriginReferenceType,
        OriginReferenceId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum SerialMovements {
        Table,
        Id,
        SerialUnitId,
        MovementType,
        FromLocationId,
        ToLocationId,
        ReferenceType,
        ReferenceId,
        ActorId,
        CreatedAt,
    }
}

mod m20240301_000005_create_idempotency_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000005_create_idempotency_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(IdempotencyRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(IdempotencyRecords::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::ScopeKey)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::EntityId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(IdempotencyRecords::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_idempotency_records_scope_created_at")
                        .table(IdempotencyRecords::Table)
                        .col(IdempotencyRecords::ScopeKey)
                        .col(IdempotencyRecords::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(IdempotencyRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum IdempotencyRecords {
        Table,
        Id,
        ScopeKey,
        EntityId,
        CreatedAt,
    }
}
