use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Condition of the catalogue record itself, independent of any single copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
#[serde(rename_all = "snake_case")]
pub enum BookStatus {
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "damaged")]
    Damaged,
    #[sea_orm(string_value = "lost")]
    Lost,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "books")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub publisher: Option<String>,
    /// False means reference-only: the book may be read on site but never lent.
    pub circulating: bool,
    pub status: BookStatus,
    pub is_deleted: bool,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::exemplar::Entity")]
    Exemplar,
    #[sea_orm(has_many = "super::lending::Entity")]
    Lending,
}

impl Related<super::exemplar::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Exemplar.def()
    }
}

impl Related<super::lending::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lending.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
