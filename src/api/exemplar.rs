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
use crate::models::exemplar::ExemplarStatus;
use crate::services::exemplar_service::{self, CreateExemplarInput, UpdateExemplarInput};

fn require_admin(claims: &Claims) -> Result<(), DomainError> {
    if claims.is_admin() {
        Ok(())
    } else {
        Err(DomainError::Forbidden(
            "only admins may manage exemplars".to_string(),
        ))
    }
}

#[derive(Deserialize)]
pub struct ListExemplarsQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub book_id: Option<i32>,
}

pub async fn list_exemplars(
    State(db): State<DatabaseConnection>,
    Query(query): Query<ListExemplarsQuery>,
) -> Result<Json<Value>, DomainError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let (exemplars, total) = exemplar_service::list(&db, page, limit, query.book_id).await?;

    Ok(Json(json!({
        "exemplars": exemplars,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "total_pages": total.div_ceil(limit)
        }
    })))
}

pub async fn get_exemplar(
    State(db): State<DatabaseConnection>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, DomainError> {
    let exemplar = exemplar_service::find_by_id(&db, id)
        .await?
        .ok_or(DomainError::NotFound)?;
    Ok(Json(json!({ "exemplar": exemplar })))
}

pub async fn get_by_accession(
    State(db): State<DatabaseConnection>,
    Path(accession_number): Path<String>,
) -> Result<Json<Value>, DomainError> {
    let exemplar = exemplar_service::find_by_accession(&db, &accession_number)
        .await?
        .ok_or(DomainError::NotFound)?;
    Ok(Json(json!({ "exemplar": exemplar })))
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub book_id: Option<i32>,
}

pub async fn stats(
    State(db): State<DatabaseConnection>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, DomainError> {
    let stats = exemplar_service::stats(&db, query.book_id).await?;
    Ok(Json(json!({ "stats": stats })))
}

pub async fn list_for_book(
    State(db): State<DatabaseConnection>,
    Path(book_id): Path<i32>,
) -> Result<Json<Value>, DomainError> {
    let (exemplars, total) = exemplar_service::list(&db, 1, 100, Some(book_id)).await?;
    Ok(Json(json!({ "exemplars": exemplars, "total": total })))
}

pub async fn list_available_for_book(
    State(db): State<DatabaseConnection>,
    Path(book_id): Path<i32>,
) -> Result<Json<Value>, DomainError> {
    let exemplars = exemplar_service::find_available(&db, book_id).await?;
    let count = exemplars.len();
    Ok(Json(json!({
        "exemplars": exemplars,
        "available_count": count
    })))
}

pub async fn create_exemplar(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Json(payload): Json<CreateExemplarInput>,
) -> Result<(StatusCode, Json<Value>), DomainError> {
    require_admin(&claims)?;
    let exemplar = exemplar_service::create(&db, payload, &claims.audit()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "exemplar": exemplar }))))
}

pub async fn update_exemplar(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateExemplarInput>,
) -> Result<Json<Value>, DomainError> {
    require_admin(&claims)?;
    let exemplar = exemplar_service::update(&db, id, payload, &claims.audit()).await?;
    Ok(Json(json!({ "exemplar": exemplar })))
}

pub async fn delete_exemplar(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
) -> Result<Json<Value>, DomainError> {
    require_admin(&claims)?;
    exemplar_service::delete(&db, id, &claims.audit()).await?;
    Ok(Json(json!({ "message": "Exemplar deleted" })))
}

#[derive(Deserialize)]
pub struct SetStatusRequest {
    pub status: ExemplarStatus,
}

/// Administrative status override. Bypasses the lending orchestration, so
/// it can desynchronize an exemplar's status from the lending ledger;
/// intended for corrections like marking a copy damaged or lost.
pub async fn set_status(
    State(db): State<DatabaseConnection>,
    claims: Claims,
    Path(id): Path<i32>,
    Json(payload): Json<SetStatusRequest>,
) -> Result<Json<Value>, DomainError> {
    require_admin(&claims)?;

    let updated = exemplar_service::set_status(&db, id, payload.status, &claims.audit()).await?;
    if !updated {
        return Err(DomainError::NotFound);
    }

    Ok(Json(json!({
        "message": "Exemplar status updated",
        "exemplar": { "id": id, "status": payload.status }
    })))
}
