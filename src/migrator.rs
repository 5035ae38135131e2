use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_companies_table::Migration),
            Box::new(m20260101_000002_create_production_records_table::Migration),
            Box::new(m20260101_000003_create_coc_lots_table::Migration),
            Box::new(m20260101_000004_create_lot_allocations_table::Migration),
            Box::new(m20260101_000005_create_rejected_modules_table::Migration),
        ]
    }
}

// Migration implementations

mod m20260101_000001_create_companies_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000001_create_companies_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Companies::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Companies::Id)
                                .integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Companies::CompanyName).string().not_null())
                        .col(ColumnDef::new(Companies::ModuleWattage).integer().not_null())
                        .col(ColumnDef::new(Companies::ModuleType).string().not_null())
                        .col(
                            ColumnDef::new(Companies::CellsPerModule)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Companies::CellsReceivedQty).integer().null())
                        .col(ColumnDef::new(Companies::CellsReceivedMw).decimal().null())
                        .col(ColumnDef::new(Companies::CreatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_companies_company_name")
                        .table(Companies::Table)
                        .col(Companies::CompanyName)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Companies::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Companies {
        Table,
        Id,
        CompanyName,
        ModuleWattage,
        ModuleType,
        CellsPerModule,
        CellsReceivedQty,
        CellsReceivedMw,
        CreatedAt,
    }
}

mod m20260101_000002_create_production_records_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000002_create_production_records_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ProductionRecords::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductionRecords::Id)
                                .integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::CompanyId)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductionRecords::Date).date().not_null())
                        .col(
                            ColumnDef::new(ProductionRecords::LotNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::DayProduction)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::NightProduction)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::Pdi)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::CellRejectionPercent)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::ModuleRejectionPercent)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::AllocationStatus)
                                .string()
                                .not_null()
                                .default("unallocated"),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::IsClosed)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductionRecords::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_production_records_company")
                                .from(ProductionRecords::Table, ProductionRecords::CompanyId)
                                .to(
                                    super::m20260101_000001_create_companies_table::Companies::Table,
                                    super::m20260101_000001_create_companies_table::Companies::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            // One record per company per day
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_records_company_date")
                        .table(ProductionRecords::Table)
                        .col(ProductionRecords::CompanyId)
                        .col(ProductionRecords::Date)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // Lot numbers are unique across all companies
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_production_records_lot_number")
                        .table(ProductionRecords::Table)
                        .col(ProductionRecords::LotNumber)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductionRecords::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductionRecords {
        Table,
        Id,
        CompanyId,
        Date,
        LotNumber,
        DayProduction,
        NightProduction,
        Pdi,
        CellRejectionPercent,
        ModuleRejectionPercent,
        AllocationStatus,
        IsClosed,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20260101_000003_create_coc_lots_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000003_create_coc_lots_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(CocLots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CocLots::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(ColumnDef::new(CocLots::ExternalId).big_integer().null())
                        .col(ColumnDef::new(CocLots::CompanyName).string().not_null())
                        .col(ColumnDef::new(CocLots::MaterialType).string().not_null())
                        .col(ColumnDef::new(CocLots::Brand).string().null())
                        .col(ColumnDef::new(CocLots::ProductType).string().null())
                        .col(ColumnDef::new(CocLots::LotBatchNumber).string().not_null())
                        .col(ColumnDef::new(CocLots::InvoiceNumber).string().not_null())
                        .col(ColumnDef::new(CocLots::InvoiceDate).date().not_null())
                        .col(
                            ColumnDef::new(CocLots::ReceivedQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CocLots::InvoiceQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(CocLots::ConsumedQuantity)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(CocLots::CocDocumentUrl).string().null())
                        .col(ColumnDef::new(CocLots::IqcDocumentUrl).string().null())
                        .col(
                            ColumnDef::new(CocLots::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(CocLots::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(CocLots::LastSyncedAt).timestamp().null())
                        .to_owned(),
                )
                .await?;

            // Sync idempotency key
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coc_lots_sync_key")
                        .table(CocLots::Table)
                        .col(CocLots::MaterialType)
                        .col(CocLots::LotBatchNumber)
                        .col(CocLots::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            // FIFO scans filter by material and order by invoice date
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_coc_lots_material_invoice_date")
                        .table(CocLots::Table)
                        .col(CocLots::MaterialType)
                        .col(CocLots::InvoiceDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CocLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum CocLots {
        Table,
        Id,
        ExternalId,
        CompanyName,
        MaterialType,
        Brand,
        ProductType,
        LotBatchNumber,
        InvoiceNumber,
        InvoiceDate,
        ReceivedQuantity,
        InvoiceQuantity,
        ConsumedQuantity,
        CocDocumentUrl,
        IqcDocumentUrl,
        IsActive,
        CreatedAt,
        LastSyncedAt,
    }
}

mod m20260101_000004_create_lot_allocations_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000004_create_lot_allocations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(LotAllocations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(LotAllocations::Id)
                                .big_integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotAllocations::ProductionRecordId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotAllocations::MaterialName)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotAllocations::LotId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotAllocations::Quantity)
                                .decimal()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LotAllocations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lot_allocations_record")
                                .from(LotAllocations::Table, LotAllocations::ProductionRecordId)
                                .to(
                                    super::m20260101_000002_create_production_records_table::ProductionRecords::Table,
                                    super::m20260101_000002_create_production_records_table::ProductionRecords::Id,
                                ),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_lot_allocations_lot")
                                .from(LotAllocations::Table, LotAllocations::LotId)
                                .to(
                                    super::m20260101_000003_create_coc_lots_table::CocLots::Table,
                                    super::m20260101_000003_create_coc_lots_table::CocLots::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lot_allocations_record_id")
                        .table(LotAllocations::Table)
                        .col(LotAllocations::ProductionRecordId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_lot_allocations_lot_id")
                        .table(LotAllocations::Table)
                        .col(LotAllocations::LotId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(LotAllocations::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum LotAllocations {
        Table,
        Id,
        ProductionRecordId,
        MaterialName,
        LotId,
        Quantity,
        CreatedAt,
    }
}

mod m20260101_000005_create_rejected_modules_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20260101_000005_create_rejected_modules_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RejectedModules::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RejectedModules::Id)
                                .integer()
                                .primary_key()
                                .auto_increment()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RejectedModules::CompanyId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RejectedModules::SerialNumber)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RejectedModules::RejectionDate)
                                .date()
                                .not_null(),
                        )
                        .col(ColumnDef::new(RejectedModules::Reason).string().not_null())
                        .col(ColumnDef::new(RejectedModules::Stage).string().not_null())
                        .col(
                            ColumnDef::new(RejectedModules::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_rejected_modules_company")
                                .from(RejectedModules::Table, RejectedModules::CompanyId)
                                .to(
                                    super::m20260101_000001_create_companies_table::Companies::Table,
                                    super::m20260101_000001_create_companies_table::Companies::Id,
                                ),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_rejected_modules_company_date")
                        .table(RejectedModules::Table)
                        .col(RejectedModules::CompanyId)
                        .col(RejectedModules::RejectionDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(RejectedModules::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum RejectedModules {
        Table,
        Id,
        CompanyId,
        SerialNumber,
        RejectionDate,
        Reason,
        Stage,
        CreatedAt,
    }
}
