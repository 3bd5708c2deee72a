use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::service_instance;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    /// Environment name -> provisioner base URL.
    #[sea_orm(column_type = "JsonBinary")]
    pub endpoints: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub teams: Json,
    #[sea_orm(column_type = "Text")]
    pub doc: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter)]
pub enum Relation { ServiceInstance }

impl RelationTrait for Relation {
    fn def(&self) -> RelationDef {
        match self {
            Relation::ServiceInstance => Entity::has_many(service_instance::Entity).into(),
        }
    }
}

impl Related<service_instance::Entity> for Entity {
    fn to() -> RelationDef { Relation::ServiceInstance.def() }
}

impl ActiveModelBehavior for ActiveModel {}
