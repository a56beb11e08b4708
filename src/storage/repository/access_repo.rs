use crate::storage::entity::access_token::{
    self, ActiveModel as AccessTokenActiveModel, Entity as AccessToken,
};
use crate::storage::entity::user_role::{
    self, ActiveModel as UserRoleActiveModel, Entity as UserRole,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

pub struct AccessRepository;

impl AccessRepository {
    pub async fn find_token(
        db: &DatabaseConnection,
        token: &str,
    ) -> Result<Option<access_token::Model>, DbErr> {
        AccessToken::find_by_id(token.to_string()).one(db).await
    }

    pub async fn has_role(db: &DatabaseConnection, user_id: &str, role: &str) -> Result<bool, DbErr> {
        let found = UserRole::find()
            .filter(user_role::Column::UserId.eq(user_id))
            .filter(user_role::Column::Role.eq(role))
            .one(db)
            .await?;
        Ok(found.is_some())
    }

    pub async fn grant_role(db: &DatabaseConnection, user_id: &str, role: &str) -> Result<(), DbErr> {
        if Self::has_role(db, user_id, role).await? {
            return Ok(());
        }
        UserRoleActiveModel {
            user_id: Set(user_id.to_string()),
            role: Set(role.to_string()),
            created_at: Set(Utc::now().timestamp()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        Ok(())
    }

    /// 生成新的访问令牌并返回
    pub async fn issue_token(
        db: &DatabaseConnection,
        user_id: &str,
        email: Option<String>,
    ) -> Result<String, DbErr> {
        let token = Uuid::new_v4().simple().to_string();
        AccessTokenActiveModel {
            token: Set(token.clone()),
            user_id: Set(user_id.to_string()),
            email: Set(email),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(db)
        .await?;
        Ok(token)
    }
}
