use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Availability status of one physical copy.
/// Valid values:
/// - `Available`: on shelf, can be lent
/// - `OnLoan`: currently lent out (has exactly one active lending)
/// - `Damaged`: withdrawn until repaired
/// - `Lost`: written off
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
#[serde(rename_all = "snake_case")]
pub enum ExemplarStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "on_loan")]
    OnLoan,
    #[sea_orm(string_value = "damaged")]
    Damaged,
    #[sea_orm(string_value = "lost")]
    Lost,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "exemplars")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Human-assigned identifier, unique among non-deleted exemplars.
    pub accession_number: String,
    pub book_id: i32,
    pub status: ExemplarStatus,
    /// Whether this copy is shown in the public catalogue (OPAC).
    pub visible: bool,
    pub is_deleted: bool,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::book::Entity",
        from = "Column::BookId",
        to = "super::book::Column::Id"
    )]
    Book,
    #[sea_orm(has_many = "super::lending::Entity")]
    Lending,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl Related<super::lending::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lending.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
