//! Creates the transactions table holding the lifecycle of every submitted
//! mint transaction, keyed by transaction hash.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(string_len(Transactions::Hash, 66).primary_key())
                    .col(string_len(Transactions::Status, 16).not_null())
                    .col(string_len_null(Transactions::FromAddress, 42))
                    .col(string_len(Transactions::ToAddress, 42).not_null())
                    // U256 values are stored as decimal strings
                    .col(string_null(Transactions::Value))
                    .col(big_integer_null(Transactions::Nonce))
                    .col(big_integer_null(Transactions::GasLimit))
                    .col(big_integer_null(Transactions::BlockNumber))
                    .col(string_null(Transactions::TokenId))
                    .col(text_null(Transactions::TokenUri))
                    .col(timestamp_with_time_zone_null(Transactions::IssuedAt))
                    .col(timestamp_with_time_zone(Transactions::CreatedAt).not_null())
                    .col(timestamp_with_time_zone(Transactions::UpdatedAt).not_null())
                    .to_owned(),
            )
            .await?;

        // The status poll scans pending rows on every pass
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_status")
                    .table(Transactions::Table)
                    .col(Transactions::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Hash,
    Status,
    FromAddress,
    ToAddress,
    Value,
    Nonce,
    GasLimit,
    BlockNumber,
    TokenId,
    TokenUri,
    IssuedAt,
    CreatedAt,
    UpdatedAt,
}
