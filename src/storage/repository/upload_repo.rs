use crate::storage::entity::upload_batch::{
    self, ActiveModel as UploadActiveModel, Entity as UploadBatch,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Processing,
    Completed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Processing => "processing",
            UploadStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct UploadRepository;

impl UploadRepository {
    pub async fn create(
        db: &DatabaseConnection,
        filename: &str,
    ) -> Result<upload_batch::Model, DbErr> {
        let active_model = UploadActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            filename: Set(filename.to_string()),
            status: Set(UploadStatus::Processing.as_str().to_string()),
            total_records: Set(0),
            uploaded_at: Set(Utc::now().timestamp()),
        };
        active_model.insert(db).await
    }

    pub async fn find(
        db: &DatabaseConnection,
        id: &str,
    ) -> Result<Option<upload_batch::Model>, DbErr> {
        UploadBatch::find_by_id(id.to_string()).one(db).await
    }

    /// 累加本块成功条数；只有最后一块把状态置为 completed
    pub async fn add_progress(
        db: &DatabaseConnection,
        id: &str,
        processed: i64,
        is_last_chunk: bool,
    ) -> Result<upload_batch::Model, DbErr> {
        let current = UploadBatch::find_by_id(id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("upload {}", id)))?;

        let total = current.total_records + processed;
        let status = if is_last_chunk {
            UploadStatus::Completed
        } else {
            UploadStatus::Processing
        };

        let mut am: UploadActiveModel = current.into();
        am.total_records = Set(total);
        am.status = Set(status.as_str().to_string());
        am.update(db).await
    }

    /// 最新的上传在前
    pub async fn list_recent(db: &DatabaseConnection) -> Result<Vec<upload_batch::Model>, DbErr> {
        UploadBatch::find()
            .order_by_desc(upload_batch::Column::UploadedAt)
            .all(db)
            .await
    }

    pub async fn delete(db: &DatabaseConnection, id: &str) -> Result<u64, DbErr> {
        let res = UploadBatch::delete_by_id(id.to_string()).exec(db).await?;
        Ok(res.rows_affected)
    }

    pub async fn delete_all(db: &DatabaseConnection) -> Result<u64, DbErr> {
        let res = UploadBatch::delete_many().exec(db).await?;
        Ok(res.rows_affected)
    }
}
