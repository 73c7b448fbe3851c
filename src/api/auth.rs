use axum::{
    extract::{Form, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::api::validation::validate_username;
use crate::core::security;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::User;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::auth::TokenResponse;
use crate::schemas::user::{UserCreate, UserLogin, UserResponse};

/// Max attempts per window for auth endpoints (login/signup/token).
const AUTH_RATE_LIMIT: u64 = 10;
/// Rate limit window in seconds.
const AUTH_RATE_WINDOW_SECONDS: u64 = 60;

#[derive(Debug, Deserialize)]
struct OAuth2PasswordForm {
    username: String,
    password: String,
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/token", post(token))
        .route("/me", get(me))
}

async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<TokenResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let rate_key = format!("rl:signup:{}", payload.username);
    if !state.redis().allow(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS).await {
        return Err(ApiError::TooManyRequests("Too many signup attempts, try again later"));
    }

    let taken = repositories::users::exists_by_username(state.db(), &payload.username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;
    if taken {
        return Err(ApiError::Conflict("User with this username already exists".to_string()));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username: &payload.username,
            hashed_password,
            full_name: payload.full_name.trim(),
            role: UserRole::Student,
            is_active: true,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ApiError::Conflict("User with this username already exists".to_string())
        }
        other => ApiError::internal(other, "Failed to create user"),
    })?;

    tracing::info!(user_id = %user.id, username = %user.username, "User signed up");
    Ok((StatusCode::CREATED, Json(issue_token(&state, user)?)))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<UserLogin>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate_username(&payload.username)?;

    let rate_key = format!("rl:login:{}", payload.username);
    if !state.redis().allow(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS).await {
        return Err(ApiError::TooManyRequests("Too many login attempts, try again later"));
    }

    let user = authenticate(&state, &payload.username, &payload.password).await?;
    Ok(Json(issue_token(&state, user)?))
}

async fn token(
    State(state): State<AppState>,
    Form(payload): Form<OAuth2PasswordForm>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate_username(&payload.username)?;

    let rate_key = format!("rl:token:{}", payload.username);
    if !state.redis().allow(&rate_key, AUTH_RATE_LIMIT, AUTH_RATE_WINDOW_SECONDS).await {
        return Err(ApiError::TooManyRequests("Too many token attempts, try again later"));
    }

    let user = authenticate(&state, &payload.username, &payload.password).await?;
    Ok(Json(issue_token(&state, user)?))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse::from_db(user))
}

async fn authenticate(state: &AppState, username: &str, password: &str) -> Result<User, ApiError> {
    let user = repositories::users::find_by_username(state.db(), username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?
        .ok_or(ApiError::Unauthorized("Incorrect username or password"))?;

    let verified = security::verify_password(password, &user.hashed_password)
        .map_err(|_| ApiError::Unauthorized("Incorrect username or password"))?;
    if !verified {
        return Err(ApiError::Unauthorized("Incorrect username or password"));
    }

    if !user.is_active {
        return Err(ApiError::BadRequest("Inactive user".to_string()));
    }

    Ok(user)
}

fn issue_token(state: &AppState, user: User) -> Result<TokenResponse, ApiError> {
    let token = security::create_access_token(&user.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;
    Ok(TokenResponse::bearer(token, UserResponse::from_db(user)))
}
