use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A lending transitions Active -> Returned exactly once.
/// Invariant: `return_date` is null exactly while the status is Active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(None)")]
#[serde(rename_all = "snake_case")]
pub enum LendingStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "returned")]
    Returned,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lendings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub member_id: i32,
    pub book_id: i32,
    /// Set when the loan tracks a specific physical copy. Legacy loans
    /// recorded at book level only leave this null.
    pub exemplar_id: Option<i32>,
    pub loan_date: String,
    pub due_date: String,
    pub return_date: Option<String>,
    pub status: LendingStatus,
    pub note: Option<String>,
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
    #[sea_orm(
        belongs_to = "super::exemplar::Entity",
        from = "Column::ExemplarId",
        to = "super::exemplar::Column::Id"
    )]
    Exemplar,
    #[sea_orm(
        belongs_to = "super::member::Entity",
        from = "Column::MemberId",
        to = "super::member::Column::Id"
    )]
    Member,
}

impl Related<super::book::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Book.def()
    }
}

impl Related<super::exemplar::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Exemplar.def()
    }
}

impl Related<super::member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Member.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
