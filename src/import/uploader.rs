use crate::auth::Caller;
use crate::events::LogBus;
use crate::import::model::{ChunkRequest, ChunkResponse, ImportError};
use crate::import::service::ImportService;
use crate::workbook::TreeRecord;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    #[error("No records to upload")]
    NoRecords,
    #[error("http error: {0}")]
    Http(String),
    #[error("{message}")]
    Server {
        status: u16,
        message: String,
        body: String,
    },
    #[error("{0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl UploadError {
    fn status(&self) -> Option<u16> {
        match self {
            UploadError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    fn body(&self) -> Option<Value> {
        match self {
            UploadError::Server { body, .. } => {
                Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone())))
            }
            _ => None,
        }
    }
}

/// 分块的发送方式：远程 HTTP 或进程内直接调用
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn send_chunk(&self, request: &ChunkRequest) -> Result<ChunkResponse, UploadError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/functions/v1/process-excel",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl ChunkTransport for HttpTransport {
    async fn send_chunk(&self, request: &ChunkRequest) -> Result<ChunkResponse, UploadError> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .map_err(|e| UploadError::Http(e.to_string()))?;

        let status = resp.status();
        let raw = resp
            .text()
            .await
            .map_err(|e| UploadError::Http(e.to_string()))?;

        if !status.is_success() {
            // 错误体形如 {"success":false,"error":"..."}
            let message = serde_json::from_str::<Value>(&raw)
                .ok()
                .and_then(|v| {
                    v.get("message")
                        .or_else(|| v.get("error"))
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| format!("Server error: {}", status.as_u16()));
            return Err(UploadError::Server {
                status: status.as_u16(),
                message,
                body: raw,
            });
        }

        let parsed: ChunkResponse = serde_json::from_str(&raw)
            .map_err(|e| UploadError::InvalidResponse(format!("json parse failed: {e}, raw={raw}")))?;
        if !parsed.success {
            return Err(UploadError::Rejected(parsed.message));
        }
        Ok(parsed)
    }
}

/// 进程内导入，不经过网络
pub struct LocalTransport {
    service: Arc<ImportService>,
    caller: Caller,
}

impl LocalTransport {
    pub fn new(service: Arc<ImportService>, caller: Caller) -> Self {
        Self { service, caller }
    }
}

#[async_trait]
impl ChunkTransport for LocalTransport {
    async fn send_chunk(&self, request: &ChunkRequest) -> Result<ChunkResponse, UploadError> {
        Ok(self
            .service
            .process_chunk(&self.caller, request.clone())
            .await?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub upload_id: String,
    pub chunks_sent: usize,
    pub total_records: usize,
    pub total_processed: u64,
    pub total_errors: u64,
}

/// 客户端分块上传
///
/// 各分块严格按顺序发送，首块返回的 uploadId 带到后续分块。任一分块失败即停止，
/// 失败详情发布到事件总线，不自动重试。
pub struct ChunkedUploader<T> {
    transport: T,
    chunk_size: usize,
    events: LogBus,
}

impl<T: ChunkTransport> ChunkedUploader<T> {
    pub fn new(transport: T, events: LogBus) -> Self {
        Self {
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
            events,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn upload(
        &self,
        records: &[TreeRecord],
        filename: &str,
    ) -> Result<UploadReport, UploadError> {
        if records.is_empty() {
            self.events.error("No records to upload", None);
            return Err(UploadError::NoRecords);
        }

        let total_chunks = records.len().div_ceil(self.chunk_size);
        self.events.info(format!(
            "Processing {} records in chunks of {}...",
            records.len(),
            self.chunk_size
        ));

        let mut upload_id: Option<String> = None;
        let mut total_processed = 0;
        let mut total_errors = 0;

        for (idx, chunk) in records.chunks(self.chunk_size).enumerate() {
            let number = idx + 1;
            self.events.info(format!(
                "Uploading chunk {}/{} ({} records)...",
                number,
                total_chunks,
                chunk.len()
            ));

            let request = ChunkRequest {
                records: chunk.to_vec(),
                filename: Some(filename.to_string()),
                upload_id: upload_id.clone(),
                chunk_number: Some(number as u32),
                total_chunks: Some(total_chunks as u32),
                is_last_chunk: number == total_chunks,
            };

            let resp = match self.transport.send_chunk(&request).await {
                Ok(resp) => resp,
                Err(e) => {
                    let details = json!({
                        "error": e.to_string(),
                        "status": e.status(),
                        "body": e.body(),
                        "fileName": filename,
                        "chunk": format!("{}/{}", number, total_chunks),
                        "timestamp": Utc::now().to_rfc3339(),
                    });
                    let message = match e.status() {
                        Some(status) => format!(
                            "Upload failed at chunk {}/{} ({})",
                            number, total_chunks, status
                        ),
                        None => format!("Upload failed at chunk {}/{}: {}", number, total_chunks, e),
                    };
                    self.events.error(message, Some(details));
                    return Err(e);
                }
            };

            if upload_id.is_none() {
                upload_id = Some(resp.upload_id.clone());
            }
            total_processed += resp.total_processed;
            total_errors += resp.total_errors;
            if resp.total_errors > 0 {
                self.events.warning(format!(
                    "Chunk {}/{}: {} records skipped",
                    number, total_chunks, resp.total_errors
                ));
            }
            self.events.info(format!(
                "Chunk {}/{} completed successfully",
                number, total_chunks
            ));
        }

        self.events.info(format!(
            "Successfully uploaded all {} records",
            records.len()
        ));

        Ok(UploadReport {
            upload_id: upload_id.unwrap_or_default(),
            chunks_sent: total_chunks,
            total_records: records.len(),
            total_processed,
            total_errors,
        })
    }
}
