use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::{header::AUTHORIZATION, request::Parts, StatusCode};
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::api::{
    ApiResponse, ApproveUserRequest, ChangePasswordRequest, LoginRequest, LoginResponse,
    RegisterRequest, UpdateProfileRequest, UserListParams, UserListResponse, UserProfile,
};
use crate::models::poetry::Pagination;
use crate::models::user::{NewUser, User, UserQuery, UserRole, UserStatus};
use crate::services::auth::{hash_password, verify_password};

const DEFAULT_USER_PAGE_SIZE: u32 = 20;
const MAX_USER_PAGE_SIZE: u32 = 100;

/// An authenticated, active account taken from the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let claims = state.tokens.verify(token)?;
        let user = state
            .users
            .find_user(claims.sub)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("account no longer exists".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(ApiError::Forbidden("account is not active".to_string()));
        }
        Ok(AuthUser(user))
    }
}

/// An authenticated admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if user.role != UserRole::Admin {
            return Err(ApiError::Forbidden("admin access required".to_string()));
        }
        Ok(AdminUser(user))
    }
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let username = req.username.trim();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest(
            "username and password are required".to_string(),
        ));
    }

    let invalid = || ApiError::Unauthorized("invalid username or password".to_string());
    let user = state
        .users
        .find_user_by_username(username)
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(req.password, user.password_hash.clone()).await? {
        tracing::info!(username = %user.username, "Rejected login with wrong password");
        return Err(invalid());
    }

    match user.status {
        UserStatus::Active => {}
        UserStatus::Pending => {
            return Err(ApiError::Forbidden("account is awaiting approval".to_string()))
        }
        UserStatus::Rejected => {
            return Err(ApiError::Forbidden("account was rejected".to_string()))
        }
    }

    let token = state.tokens.issue(&user)?;
    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(ApiResponse::with_message(
        "login successful",
        LoginResponse {
            token,
            user: UserProfile::from(&user),
        },
    )))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(mut req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserProfile>>), ApiError> {
    req.username = req.username.trim().to_string();
    req.nickname = req.nickname.trim().to_string();
    req.validate()?;

    if state
        .users
        .find_user_by_username(&req.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict("username already taken".to_string()));
    }

    let user = state
        .users
        .insert_user(NewUser {
            username: req.username,
            password_hash: hash_password(req.password).await?,
            nickname: req.nickname,
            role: UserRole::Guest,
            status: UserStatus::Pending,
        })
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "User registered");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "registration received, awaiting approval",
            UserProfile::from(&user),
        )),
    ))
}

/// GET /api/auth/me
pub async fn me(AuthUser(user): AuthUser) -> Json<ApiResponse<UserProfile>> {
    Json(ApiResponse::ok(UserProfile::from(&user)))
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    req.validate()?;
    let updated = state
        .users
        .update_profile(user.id, req.nickname, req.avatar)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    Ok(Json(ApiResponse::with_message(
        "profile updated",
        UserProfile::from(&updated),
    )))
}

/// PUT /api/auth/password
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    req.validate()?;
    if !verify_password(req.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::Unauthorized(
            "current password is incorrect".to_string(),
        ));
    }

    let hash = hash_password(req.new_password).await?;
    if !state.users.update_password(user.id, &hash).await? {
        return Err(ApiError::NotFound("user not found".to_string()));
    }
    tracing::info!(user_id = %user.id, "Password changed");
    Ok(Json(ApiResponse::message("password changed")))
}

/// GET /api/auth/users (admin)
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
    Query(params): Query<UserListParams>,
) -> Result<Json<ApiResponse<UserListResponse>>, ApiError> {
    let query = UserQuery {
        status: params.status,
        role: params.role,
        page: params.page.unwrap_or(1).max(1),
        limit: params
            .limit
            .unwrap_or(DEFAULT_USER_PAGE_SIZE)
            .clamp(1, MAX_USER_PAGE_SIZE),
    };
    let page = state.users.list_users(&query).await?;
    Ok(Json(ApiResponse::ok(UserListResponse {
        users: page.items,
        pagination: Pagination::new(page.total, query.page, query.limit),
    })))
}

/// PUT /api/auth/users/{id}/approve (admin)
pub async fn approve_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ApproveUserRequest>,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    if req.status == UserStatus::Pending {
        return Err(ApiError::BadRequest(
            "status must be active or rejected".to_string(),
        ));
    }
    let user = state
        .users
        .set_user_status(id, req.status, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;

    tracing::info!(
        admin_id = %admin.id,
        user_id = %user.id,
        status = %user.status,
        role = %user.role,
        "User review recorded"
    );
    Ok(Json(ApiResponse::with_message(
        "user updated",
        UserProfile::from(&user),
    )))
}

/// DELETE /api/auth/users/{id} (admin)
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let target = state
        .users
        .find_user(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".to_string()))?;
    if target.role == UserRole::Admin {
        return Err(ApiError::Forbidden("admins cannot be deleted".to_string()));
    }
    if !state.users.delete_user(id).await? {
        return Err(ApiError::NotFound("user not found".to_string()));
    }
    tracing::info!(admin_id = %admin.id, user_id = %id, "User deleted");
    Ok(Json(ApiResponse::message("user deleted")))
}
