use crate::auth::AuthError;
use crate::workbook::TreeRecord;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_FILENAME: &str = "unknown.xlsx";
pub const DEFAULT_SUB_BATCH_SIZE: usize = 100;

/// 导入接口的请求体，一次一个分块
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkRequest {
    #[serde(default)]
    pub records: Vec<TreeRecord>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_id: Option<String>,
    #[serde(default)]
    pub chunk_number: Option<u32>,
    #[serde(default)]
    pub total_chunks: Option<u32>,
    #[serde(default)]
    pub is_last_chunk: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub success: bool,
    pub message: String,
    pub total_processed: u64,
    pub total_errors: u64,
    pub upload_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub upload_id: String,
    /// 同时删除该批次写入的报表行
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

impl ActionResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// 报表行 (row, col) 到树位置的换算方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeLookup {
    /// 直接用报表的 row/col 查树（与现有数据一致）
    #[default]
    Direct,
    /// 报表为 1 起始，查树前各减 1
    ZeroBased,
}

impl FromStr for TreeLookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(TreeLookup::Direct),
            "zero-based" | "zero_based" | "zerobased" => Ok(TreeLookup::ZeroBased),
            other => Err(format!("unknown tree lookup mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImportSettings {
    pub sub_batch_size: usize,
    pub tree_lookup: TreeLookup,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            sub_batch_size: DEFAULT_SUB_BATCH_SIZE,
            tree_lookup: TreeLookup::Direct,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("No records provided")]
    NoRecords,
    #[error("Failed to find upload record: {0}")]
    UploadNotFound(String),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}
