use crate::storage::repository::AccessRepository;
use log::warn;
use sea_orm::{DatabaseConnection, DbErr};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Viewer => "viewer",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Unauthorized: Missing authorization header")]
    MissingCredential,
    #[error("Unauthorized: Invalid token")]
    InvalidToken,
    #[error("Forbidden: Admin access required")]
    Forbidden,
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// 已认证的调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require_admin(&self) -> Result<(), AuthError> {
        if self.is_admin() {
            Ok(())
        } else {
            warn!("用户 {} 不是管理员，拒绝写操作", self.user_id);
            Err(AuthError::Forbidden)
        }
    }
}

/// 从 `Authorization` 头取出令牌；接受 `Bearer <token>`
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let raw = header.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    // 只有方案名没有令牌，例如 "Bearer "
    if raw.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::MissingCredential);
    }
    let token = match raw.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => raw,
    };
    if token.is_empty() {
        return Err(AuthError::MissingCredential);
    }
    Ok(token)
}

/// 校验令牌并查出角色；没有 admin 角色的用户视为 viewer
pub async fn authenticate(db: &DatabaseConnection, header: Option<&str>) -> Result<Caller, AuthError> {
    let token = bearer_token(header)?;
    let Some(record) = AccessRepository::find_token(db, token).await? else {
        return Err(AuthError::InvalidToken);
    };

    let role = if AccessRepository::has_role(db, &record.user_id, Role::Admin.as_str()).await? {
        Role::Admin
    } else {
        Role::Viewer
    };

    Ok(Caller {
        user_id: record.user_id,
        email: record.email,
        role,
    })
}
