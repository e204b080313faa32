use crate::auth::{create_jwt, hash_password, verify_password};
use crate::models::member::{self, Entity as Member};
use crate::services::now_stamp;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use sea_orm::*;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

pub async fn login(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    tracing::info!("Login attempt for member: {}", payload.username);

    let found = Member::find()
        .filter(member::Column::Username.eq(&payload.username))
        .filter(member::Column::IsDeleted.eq(false))
        .one(&db)
        .await;

    let member = match found {
        Ok(Some(m)) => m,
        _ => {
            tracing::warn!("Member not found: {}", payload.username);
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response();
        }
    };

    match verify_password(&payload.password, &member.password_hash) {
        Ok(true) => match create_jwt(&member.username, member.id, &member.role) {
            Ok(token) => (StatusCode::OK, Json(json!({ "token": token }))).into_response(),
            Err(e) => {
                tracing::error!("Token creation failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        },
        _ => {
            tracing::warn!(
                "Password verification failed for member: {}",
                member.username
            );
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid credentials" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    name: String,
    username: String,
    email: Option<String>,
    password: String,
    role: Option<String>,
}

pub async fn register(
    State(db): State<DatabaseConnection>,
    Json(payload): Json<RegisterRequest>,
) -> impl IntoResponse {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "username and password are required" })),
        )
            .into_response();
    }

    let password_hash = match hash_password(&payload.password) {
        Ok(h) => h,
        Err(e) => {
            tracing::error!("Password hashing failed: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response();
        }
    };

    let now = now_stamp();
    let new_member = member::ActiveModel {
        name: Set(payload.name),
        username: Set(payload.username),
        email: Set(payload.email),
        password_hash: Set(password_hash),
        role: Set(payload.role.unwrap_or_else(|| "member".to_string())),
        is_deleted: Set(false),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_member.insert(&db).await {
        Ok(m) => (
            StatusCode::CREATED,
            Json(json!({ "message": "Member registered", "member": m })),
        )
            .into_response(),
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Username already taken" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Member registration failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response()
        }
    }
}
