use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "app")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub framework: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub teams: Json,
    /// `[{"name": .., "ip": ..}]`; `ip` is null before the unit is deployed.
    #[sea_orm(column_type = "JsonBinary")]
    pub units: Json,
    /// Configuration key -> `{"name", "value", "public", "instance_name"}`.
    #[sea_orm(column_type = "JsonBinary")]
    pub env: Json,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation {}

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef { panic!("no relations defined here") }
}

impl ActiveModelBehavior for ActiveModel {}
