//! Thin catalog surface: just enough book CRUD for the lending core.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sea_orm::*;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::Claims;
use crate::domain::DomainError;
use crate::models::book::{self, BookStatus, Entity as Book};
use crate::services::now_stamp;

#[derive(Deserialize)]
pub struct ListBooksQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

pub async fn list_books(
    State(db): State<DatabaseConnection>,
    Query(query): Query<ListBooksQuery>,
) -> Result<Json<Value>, DomainError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let total = Book::find()
        .filter(book::Column::IsDeleted.eq(false))
        .count(&db)
        .await?;

    let books = Book::find()
        .filter(book::Column::IsDeleted.eq(false))
        .order_by_asc(book::Column::Title)
        .offset((page - 1) * limit)
        .limit(limit)
        .all(&db)
        .await?;

    Ok(Json(json!({
        "books": books,
        "pagination": { "page": page, "limit": limit, "total": total }
    })))
}

pub async fn get_book(
    State(db): State<DatabaseConnection>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, DomainError> {
    let book = Book::find_by_id(id)
        .filter(book::Column::IsDeleted.eq(false))
        .one(&db)
        .await?
        .ok_or(DomainError::NotFound)?;

    Ok(Json(json!({ "book": book })))
}

#[derive(Deserialize)]
pub struct CreateBookRequest {
    pub title: String,
    pub publisher: Option<String>,
    pub circulating: Option<bool>,
    pub status: Option<BookStatus>,
}

pub async fn create_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Value>), DomainError> {
    if !claims.is_admin() {
        return Err(DomainError::Forbidden(
            "only admins may manage the catalog".to_string(),
        ));
    }
    if payload.title.trim().is_empty() {
        return Err(DomainError::BadRequest("title is required".to_string()));
    }

    let audit = claims.audit();
    let now = now_stamp();
    let new_book = book::ActiveModel {
        title: Set(payload.title),
        publisher: Set(payload.publisher),
        circulating: Set(payload.circulating.unwrap_or(true)),
        status: Set(payload.status.unwrap_or(BookStatus::Normal)),
        is_deleted: Set(false),
        created_by: Set(audit.actor.clone()),
        updated_by: Set(audit.actor),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let saved = new_book.insert(&db).await?;
    Ok((StatusCode::CREATED, Json(json!({ "book": saved }))))
}

pub async fn delete_book(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, DomainError> {
    if !claims.is_admin() {
        return Err(DomainError::Forbidden(
            "only admins may manage the catalog".to_string(),
        ));
    }

    let book = Book::find_by_id(id)
        .filter(book::Column::IsDeleted.eq(false))
        .one(&db)
        .await?
        .ok_or(DomainError::NotFound)?;

    let mut active: book::ActiveModel = book.into();
    active.is_deleted = Set(true);
    active.updated_by = Set(claims.audit().actor);
    active.updated_at = Set(now_stamp());
    active.update(&db).await?;

    Ok(Json(json!({ "message": "Book deleted" })))
}
