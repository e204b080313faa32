use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Claims;
use crate::domain::DomainError;
use crate::services::lending_service::{self, BorrowInput};

#[derive(Deserialize)]
pub struct BorrowRequest {
    pub book_id: Option<i32>,
    pub due_date: Option<String>,
    pub note: Option<String>,
    pub exemplar_id: Option<i32>,
}

pub async fn borrow(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<BorrowRequest>,
) -> Result<(StatusCode, Json<Value>), DomainError> {
    let book_id = payload
        .book_id
        .ok_or_else(|| DomainError::BadRequest("book_id is required".to_string()))?;
    let due_date = payload
        .due_date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| DomainError::BadRequest("due_date is required".to_string()))?;

    let input = BorrowInput {
        book_id,
        due_date,
        note: payload.note,
        exemplar_id: payload.exemplar_id,
    };

    let outcome = lending_service::borrow(&db, claims.uid, input, &claims.audit()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Book borrowed",
            "lending": outcome.lending,
            "exemplar": {
                "id": outcome.exemplar_id,
                "accession_number": outcome.accession_number
            }
        })),
    ))
}

pub async fn return_lending(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, DomainError> {
    let lending = lending_service::return_lending(&db, &id, &claims.audit()).await?;
    Ok(Json(json!({
        "message": "Book returned",
        "lending": lending
    })))
}

pub async fn get_lending(
    State(db): State<DatabaseConnection>,
    _claims: Claims,
    Path(id): Path<String>,
) -> Result<Json<Value>, DomainError> {
    let lending = lending_service::find_by_id(&db, &id)
        .await?
        .ok_or(DomainError::NotFound)?;
    Ok(Json(json!({ "lending": lending })))
}

#[derive(Deserialize)]
pub struct ListLendingsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_lendings(
    State(db): State<DatabaseConnection>,
    _claims: Claims,
    Query(query): Query<ListLendingsQuery>,
) -> Result<Json<Value>, DomainError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let (lendings, total) = lending_service::list(&db, page, limit).await?;
    let titles = lending_service::book_titles(&db, &lendings).await?;

    let rows: Vec<Value> = lendings
        .into_iter()
        .map(|l| {
            let title = titles.get(&l.book_id).cloned();
            json!({
                "lending": l,
                "book_title": title
            })
        })
        .collect();

    Ok(Json(json!({
        "lendings": rows,
        "pagination": { "page": page, "limit": limit, "total": total }
    })))
}

pub async fn my_lendings(
    State(db): State<DatabaseConnection>,
    claims: Claims,
) -> Result<Json<Value>, DomainError> {
    let lendings = lending_service::find_by_member(&db, claims.uid).await?;
    Ok(Json(json!({ "lendings": lendings })))
}

pub async fn list_overdue(
    State(db): State<DatabaseConnection>,
    _claims: Claims,
) -> Result<Json<Value>, DomainError> {
    let lendings = lending_service::find_overdue(&db).await?;
    let titles = lending_service::book_titles(&db, &lendings).await?;

    let rows: Vec<Value> = lendings
        .into_iter()
        .map(|l| {
            let title = titles.get(&l.book_id).cloned();
            json!({
                "lending": l,
                "book_title": title
            })
        })
        .collect();

    Ok(Json(json!({ "overdue": rows })))
}
