//! `SeaORM` Entity for transactions table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub hash: String,
    pub status: String,
    pub from_address: Option<String>,
    pub to_address: String,
    pub value: Option<String>,
    pub nonce: Option<i64>,
    pub gas_limit: Option<i64>,
    pub block_number: Option<i64>,
    pub token_id: Option<String>,
    pub token_uri: Option<String>,
    pub issued_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
