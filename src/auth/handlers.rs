use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, MeResponse, PublicUser, RegisterRequest,
            RegisterResponse,
        },
        extractors::AuthUser,
        jwt::JwtKeys,
        password::verify_password,
        store::StoreError,
    },
    error::ApiError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let username_len = payload.username.chars().count();
    if !(3..=20).contains(&username_len) {
        warn!(username = %payload.username, "register rejected: bad username length");
        return Err(ApiError::Validation(
            "username must be between 3 and 20 characters",
        ));
    }
    if payload.password.chars().count() < 8 {
        warn!("register rejected: password too short");
        return Err(ApiError::Validation(
            "password must be at least 8 characters",
        ));
    }
    // bcrypt reads at most 72 bytes and would silently truncate the rest
    if payload.password.len() > 72 {
        warn!("register rejected: password too long");
        return Err(ApiError::Validation("password must be at most 72 bytes"));
    }

    let user = match state.store.create(&payload.username, &payload.password).await {
        Ok(user) => user,
        Err(StoreError::UsernameTaken) => {
            warn!(username = %payload.username, "register rejected: username taken");
            return Err(ApiError::Conflict("username is already taken"));
        }
        Err(e) => {
            error!(error = %e, "create user failed");
            return Err(ApiError::Internal);
        }
    };

    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id: user.id }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("username and password are required"));
    }

    // unknown username and wrong password must look identical to the caller
    let user = match state.store.find_by_username(&payload.username).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            warn!(username = %payload.username, "login failed: unknown username");
            return Err(ApiError::Unauthorized);
        }
        Err(e) => {
            error!(error = %e, "find user failed");
            return Err(ApiError::Internal);
        }
    };

    if !verify_password(&payload.password, &user.password_hash) {
        warn!(user_id = user.id, username = %user.username, "login failed: invalid password");
        return Err(ApiError::Unauthorized);
    }

    let keys = JwtKeys::from_ref(&state);
    let token = match keys.sign(&user) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "jwt sign failed");
            return Err(ApiError::Internal);
        }
    };

    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: PublicUser {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        },
    }))
}

#[instrument]
pub async fn me(AuthUser { user_id, username }: AuthUser) -> Json<MeResponse> {
    debug!(user_id = user_id, "me endpoint accessed");
    Json(MeResponse { user_id, username })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn register_user(
        state: &AppState,
        username: &str,
        password: &str,
    ) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
        register(
            State(state.clone()),
            Json(RegisterRequest {
                username: username.into(),
                password: password.into(),
            }),
        )
        .await
    }

    async fn login_user(
        state: &AppState,
        username: &str,
        password: &str,
    ) -> Result<Json<LoginResponse>, ApiError> {
        login(
            State(state.clone()),
            Json(LoginRequest {
                username: username.into(),
                password: password.into(),
            }),
        )
        .await
    }

    #[tokio::test]
    async fn register_then_login_roundtrip() {
        let state = AppState::fake();
        let (status, Json(registered)) = register_user(&state, "alice", "password123")
            .await
            .expect("register");
        assert_eq!(status, StatusCode::CREATED);

        let Json(logged_in) = login_user(&state, "alice", "password123")
            .await
            .expect("login");
        assert_eq!(logged_in.user.id, registered.user_id);
        assert_eq!(logged_in.user.username, "alice");

        let claims = JwtKeys::from_ref(&state)
            .verify(&logged_in.token)
            .expect("token verifies");
        assert_eq!(claims.sub, registered.user_id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.iss, "test-issuer");
    }

    #[tokio::test]
    async fn register_validates_username_length() {
        let state = AppState::fake();
        let too_short = register_user(&state, "ab", "password123").await.unwrap_err();
        assert!(matches!(too_short, ApiError::Validation(_)));
        let too_long = register_user(&state, &"a".repeat(21), "password123")
            .await
            .unwrap_err();
        assert!(matches!(too_long, ApiError::Validation(_)));

        // boundary lengths are accepted
        assert!(register_user(&state, "abc", "password123").await.is_ok());
        assert!(register_user(&state, &"a".repeat(20), "password123")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn register_validates_password_length() {
        let state = AppState::fake();
        let err = register_user(&state, "alice", "short").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // the minimum is counted in characters, not bytes
        let err = register_user(&state, "alice", "пароль").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert!(register_user(&state, "alice", "парольно").await.is_ok());
    }

    #[tokio::test]
    async fn register_rejects_oversized_passwords() {
        let state = AppState::fake();
        let err = register_user(&state, "alice", &"a".repeat(73))
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Validation("password must be at most 72 bytes"));

        // exactly 72 bytes is still accepted
        assert!(register_user(&state, "alice", &"a".repeat(72)).await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let state = AppState::fake();
        register_user(&state, "alice", "password123")
            .await
            .expect("first register");
        let err = register_user(&state, "alice", "password456")
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::Conflict("username is already taken"));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let state = AppState::fake();
        register_user(&state, "alice", "password123")
            .await
            .expect("register");

        let wrong_password = login_user(&state, "alice", "wrong-password")
            .await
            .unwrap_err();
        let unknown_user = login_user(&state, "nobody", "password123")
            .await
            .unwrap_err();
        assert_eq!(wrong_password, ApiError::Unauthorized);
        assert_eq!(unknown_user, ApiError::Unauthorized);
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let state = AppState::fake();
        let err = login_user(&state, "", "").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn me_echoes_the_token_identity() {
        let Json(response) = me(AuthUser {
            user_id: 7,
            username: "alice".into(),
        })
        .await;
        assert_eq!(response.user_id, 7);
        assert_eq!(response.username, "alice");
    }
}
