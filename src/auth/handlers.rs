use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, LogoutResponse, PublicUser, RefreshRequest, RegisterRequest},
        jwt::AuthUser,
        services::Profile,
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let profile = Profile {
        role: payload.role,
        name: payload.name,
        surname: payload.surname,
        email: payload.email,
    };
    let session = state.sessions.register(profile, &payload.password).await?;
    Ok(Json(session))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = state.sessions.login(&payload.email, &payload.password).await?;
    Ok(Json(session))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<LogoutResponse>, AppError> {
    if let Some(token) = payload.refresh_token.as_deref() {
        state.sessions.logout(token).await?;
    }
    Ok(Json(LogoutResponse { success: true }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = state
        .sessions
        .refresh(payload.refresh_token.as_deref())
        .await?;
    Ok(Json(session))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .sessions
        .users()
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| {
            warn!(user_id = %user_id, "user not found");
            AppError::Unauthorized
        })?;

    Ok(Json(PublicUser::from(&user)))
}
