//! Exemplar registry - copy-level state for each physical copy of a book
//!
//! Exemplar statuses are flipped by the lending service inside its
//! transactions; `set_status` below is the unguarded administrative
//! override kept for corrections (marking a copy damaged or lost).

use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::domain::{AuditContext, DomainError};
use crate::models::book::Entity as Book;
use crate::models::exemplar::{self, Entity as Exemplar, ExemplarStatus};
use crate::models::{book, lending};

use super::now_stamp;

#[derive(Debug, Deserialize)]
pub struct CreateExemplarInput {
    pub accession_number: String,
    pub book_id: i32,
    pub status: Option<ExemplarStatus>,
    pub visible: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExemplarInput {
    pub accession_number: Option<String>,
    pub book_id: Option<i32>,
    pub visible: Option<bool>,
}

/// Per-status counts, either for one book or the whole registry.
#[derive(Debug, Serialize)]
pub struct ExemplarStats {
    pub total: u64,
    pub available: u64,
    pub on_loan: u64,
    pub damaged: u64,
    pub lost: u64,
}

/// All non-deleted available copies of a book, ordered by accession number
/// ascending. The first element is the default pick when a borrower does
/// not ask for a specific copy, which keeps selection deterministic.
pub async fn find_available(
    db: &DatabaseConnection,
    book_id: i32,
) -> Result<Vec<exemplar::Model>, DomainError> {
    let exemplars = Exemplar::find()
        .filter(exemplar::Column::BookId.eq(book_id))
        .filter(exemplar::Column::Status.eq(ExemplarStatus::Available))
        .filter(exemplar::Column::IsDeleted.eq(false))
        .order_by_asc(exemplar::Column::AccessionNumber)
        .all(db)
        .await?;
    Ok(exemplars)
}

pub async fn find_by_id(
    db: &DatabaseConnection,
    id: i32,
) -> Result<Option<exemplar::Model>, DomainError> {
    let exemplar = Exemplar::find_by_id(id)
        .filter(exemplar::Column::IsDeleted.eq(false))
        .one(db)
        .await?;
    Ok(exemplar)
}

pub async fn find_by_accession(
    db: &DatabaseConnection,
    accession_number: &str,
) -> Result<Option<exemplar::Model>, DomainError> {
    let exemplar = Exemplar::find()
        .filter(exemplar::Column::AccessionNumber.eq(accession_number))
        .filter(exemplar::Column::IsDeleted.eq(false))
        .one(db)
        .await?;
    Ok(exemplar)
}

/// List non-deleted exemplars, optionally restricted to one book.
pub async fn list(
    db: &DatabaseConnection,
    page: u64,
    limit: u64,
    book_id: Option<i32>,
) -> Result<(Vec<exemplar::Model>, u64), DomainError> {
    let mut condition = Condition::all().add(exemplar::Column::IsDeleted.eq(false));
    if let Some(book_id) = book_id {
        condition = condition.add(exemplar::Column::BookId.eq(book_id));
    }

    let total = Exemplar::find()
        .filter(condition.clone())
        .count(db)
        .await?;

    let offset = page.saturating_sub(1) * limit;
    let exemplars = Exemplar::find()
        .filter(condition)
        .order_by_asc(exemplar::Column::AccessionNumber)
        .offset(offset)
        .limit(limit)
        .all(db)
        .await?;

    Ok((exemplars, total))
}

pub async fn stats(
    db: &DatabaseConnection,
    book_id: Option<i32>,
) -> Result<ExemplarStats, DomainError> {
    let count_with = |status: Option<ExemplarStatus>| {
        let mut condition = Condition::all().add(exemplar::Column::IsDeleted.eq(false));
        if let Some(book_id) = book_id {
            condition = condition.add(exemplar::Column::BookId.eq(book_id));
        }
        if let Some(status) = status {
            condition = condition.add(exemplar::Column::Status.eq(status));
        }
        Exemplar::find().filter(condition).count(db)
    };

    Ok(ExemplarStats {
        total: count_with(None).await?,
        available: count_with(Some(ExemplarStatus::Available)).await?,
        on_loan: count_with(Some(ExemplarStatus::OnLoan)).await?,
        damaged: count_with(Some(ExemplarStatus::Damaged)).await?,
        lost: count_with(Some(ExemplarStatus::Lost)).await?,
    })
}

/// Register a new physical copy. Rejects accession numbers already carried
/// by a non-deleted exemplar; the partial unique index in the schema backs
/// this check up against concurrent creation.
pub async fn create(
    db: &DatabaseConnection,
    input: CreateExemplarInput,
    audit: &AuditContext,
) -> Result<exemplar::Model, DomainError> {
    if input.accession_number.trim().is_empty() {
        return Err(DomainError::BadRequest(
            "accession number is required".to_string(),
        ));
    }

    Book::find_by_id(input.book_id)
        .filter(book::Column::IsDeleted.eq(false))
        .one(db)
        .await?
        .ok_or(DomainError::NotFound)?;

    if find_by_accession(db, &input.accession_number)
        .await?
        .is_some()
    {
        return Err(DomainError::Conflict(
            "accession number already exists".to_string(),
        ));
    }

    let now = now_stamp();
    let new_exemplar = exemplar::ActiveModel {
        accession_number: Set(input.accession_number),
        book_id: Set(input.book_id),
        status: Set(input.status.unwrap_or(ExemplarStatus::Available)),
        visible: Set(input.visible.unwrap_or(true)),
        is_deleted: Set(false),
        created_by: Set(audit.actor.clone()),
        updated_by: Set(audit.actor.clone()),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let saved = new_exemplar.insert(db).await?;
    tracing::info!(
        exemplar_id = saved.id,
        accession = %saved.accession_number,
        "exemplar registered"
    );
    Ok(saved)
}

pub async fn update(
    db: &DatabaseConnection,
    id: i32,
    input: UpdateExemplarInput,
    audit: &AuditContext,
) -> Result<exemplar::Model, DomainError> {
    let existing = find_by_id(db, id).await?.ok_or(DomainError::NotFound)?;

    if let Some(accession) = &input.accession_number {
        if accession != &existing.accession_number {
            if let Some(other) = find_by_accession(db, accession).await? {
                if other.id != id {
                    return Err(DomainError::Conflict(
                        "accession number already exists".to_string(),
                    ));
                }
            }
        }
    }

    if let Some(book_id) = input.book_id {
        Book::find_by_id(book_id)
            .filter(book::Column::IsDeleted.eq(false))
            .one(db)
            .await?
            .ok_or(DomainError::NotFound)?;
    }

    let mut active: exemplar::ActiveModel = existing.into();
    if let Some(accession) = input.accession_number {
        active.accession_number = Set(accession);
    }
    if let Some(book_id) = input.book_id {
        active.book_id = Set(book_id);
    }
    if let Some(visible) = input.visible {
        active.visible = Set(visible);
    }
    active.updated_by = Set(audit.actor.clone());
    active.updated_at = Set(now_stamp());

    Ok(active.update(db).await?)
}

/// Unconditional status write: the administrative override.
///
/// This bypasses the lending orchestration. Marking an on-loan exemplar
/// Available does NOT close its active lending, so the status/ledger
/// invariant can be broken on purpose here; reconciliation is a manual,
/// administrative concern.
pub async fn set_status(
    db: &DatabaseConnection,
    id: i32,
    status: ExemplarStatus,
    audit: &AuditContext,
) -> Result<bool, DomainError> {
    let result = Exemplar::update_many()
        .col_expr(exemplar::Column::Status, Expr::value(status))
        .col_expr(
            exemplar::Column::UpdatedBy,
            Expr::value(audit.actor.clone()),
        )
        .col_expr(exemplar::Column::UpdatedAt, Expr::value(now_stamp()))
        .filter(exemplar::Column::Id.eq(id))
        .filter(exemplar::Column::IsDeleted.eq(false))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::warn!(
            exemplar_id = id,
            status = ?status,
            actor = %audit.actor,
            "exemplar status overridden outside lending orchestration"
        );
    }
    Ok(result.rows_affected > 0)
}

/// Soft-delete a copy. Refused while the copy is out on loan.
pub async fn delete(
    db: &DatabaseConnection,
    id: i32,
    audit: &AuditContext,
) -> Result<(), DomainError> {
    let existing = find_by_id(db, id).await?.ok_or(DomainError::NotFound)?;

    if existing.status == ExemplarStatus::OnLoan {
        return Err(DomainError::InvalidState(
            "exemplar is on loan and cannot be deleted".to_string(),
        ));
    }

    let mut active: exemplar::ActiveModel = existing.into();
    active.is_deleted = Set(true);
    active.updated_by = Set(audit.actor.clone());
    active.updated_at = Set(now_stamp());
    active.update(db).await?;
    Ok(())
}

/// Count the open lendings referencing an exemplar. Used by tests and by
/// administrative tooling to audit the on-loan/ledger invariant.
pub async fn active_lending_count(
    db: &DatabaseConnection,
    exemplar_id: i32,
) -> Result<u64, DomainError> {
    let count = lending::Entity::find()
        .filter(lending::Column::ExemplarId.eq(exemplar_id))
        .filter(lending::Column::Status.eq(lending::LendingStatus::Active))
        .filter(lending::Column::IsDeleted.eq(false))
        .count(db)
        .await?;
    Ok(count)
}
