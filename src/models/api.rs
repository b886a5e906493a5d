use garde::Validate;
use serde::{Deserialize, Serialize};

use super::poetry::{Pagination, PoetryRecord, SortField, SortOrder};
use super::user::{User, UserRole, UserStatus};

/// Envelope shared by every JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

// ── Auth ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(length(chars, min = 2, max = 20))]
    #[serde(default)]
    pub username: String,

    #[garde(length(min = 6, max = 128))]
    #[serde(default)]
    pub password: String,

    #[garde(length(chars, min = 1, max = 20))]
    #[serde(default)]
    pub nickname: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[garde(length(chars, min = 1, max = 20))]
    pub nickname: Option<String>,

    #[garde(length(max = 512))]
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[garde(length(min = 1))]
    #[serde(default)]
    pub current_password: String,

    #[garde(length(min = 6, max = 128))]
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ApproveUserRequest {
    pub status: UserStatus,
    pub role: Option<UserRole>,
}

#[derive(Debug, Deserialize)]
pub struct UserListParams {
    pub status: Option<UserStatus>,
    pub role: Option<UserRole>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Public projection of an account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: uuid::Uuid,
    pub username: String,
    pub nickname: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub avatar: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            nickname: user.nickname.clone(),
            role: user.role,
            status: user.status,
            avatar: user.avatar.clone(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<User>,
    pub pagination: Pagination,
}

// ── Poetry ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoetryListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub dynasty: Option<String>,
    pub author: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Deserialize)]
pub struct AuthorParams {
    pub dynasty: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PoetryListResponse {
    pub poetries: Vec<PoetryRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub like_count: i64,
}

/// Text fields of a poem submission, collected from a multipart form.
#[derive(Debug, Default, Validate)]
pub struct PoetryForm {
    #[garde(length(chars, min = 1, max = 100))]
    pub title: Option<String>,

    #[garde(length(chars, min = 1))]
    pub content: Option<String>,

    #[garde(length(chars, min = 1, max = 50))]
    pub author: Option<String>,

    #[garde(length(chars, min = 1, max = 20))]
    pub dynasty: Option<String>,

    #[garde(skip)]
    pub tags: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_limits_count_characters_not_bytes() {
        let form = PoetryForm {
            title: Some("春".repeat(100)),
            author: Some("杜甫".into()),
            dynasty: Some("唐".into()),
            content: Some("国破山河在".into()),
            tags: None,
        };
        assert!(form.validate().is_ok());

        let too_long = PoetryForm {
            title: Some("春".repeat(101)),
            ..form
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn register_rejects_short_password() {
        let req = RegisterRequest {
            username: "xiaoming".into(),
            password: "12345".into(),
            nickname: "小明".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn envelope_omits_empty_fields() {
        let body = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "message": "done"}));
    }
}
