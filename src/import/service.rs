use crate::auth::Caller;
use crate::grid::TreeAddress;
use crate::import::model::{
    ActionResponse, ChunkRequest, ChunkResponse, DeleteRequest, ImportError, ImportSettings,
    TreeLookup, DEFAULT_FILENAME,
};
use crate::storage::entity::upload_batch;
use crate::storage::repository::{ParcelRepository, ReportRepository, UploadRepository};
use crate::workbook::TreeRecord;
use chrono::Utc;
use futures::future::join_all;
use log::{error, info, warn};
use sea_orm::{DatabaseConnection, DbErr};
use std::sync::Arc;

/// 服务端导入：把工作表记录与已保存的树坐标合并后写入报表
pub struct ImportService {
    db: Arc<DatabaseConnection>,
    settings: ImportSettings,
}

impl ImportService {
    pub fn new(db: Arc<DatabaseConnection>, settings: ImportSettings) -> Self {
        Self { db, settings }
    }

    /// 处理一个分块
    ///
    /// 找不到地块或树的记录跳过并计入错误；某个子批次 upsert 失败时整批计入错误，
    /// 继续处理下一批。分块之间不做事务，已提交的分块不会回滚。
    pub async fn process_chunk(
        &self,
        caller: &Caller,
        request: ChunkRequest,
    ) -> Result<ChunkResponse, ImportError> {
        caller.require_admin()?;
        if request.records.is_empty() {
            return Err(ImportError::NoRecords);
        }

        let batch = match request.upload_id.as_deref() {
            Some(id) => {
                info!(
                    "处理上传 {} 的分块 {}/{}",
                    id,
                    request.chunk_number.unwrap_or(1),
                    request.total_chunks.unwrap_or(1)
                );
                UploadRepository::find(&self.db, id)
                    .await?
                    .ok_or_else(|| ImportError::UploadNotFound(id.to_string()))?
            }
            None => {
                let filename = request
                    .filename
                    .as_deref()
                    .filter(|f| !f.trim().is_empty())
                    .unwrap_or(DEFAULT_FILENAME);
                let created = UploadRepository::create(&self.db, filename).await?;
                info!("为 {} 创建上传记录 {}", filename, created.id);
                created
            }
        };

        let mut total_processed: u64 = 0;
        let mut total_errors: u64 = 0;

        let sub_batch_size = self.settings.sub_batch_size.max(1);
        for sub_batch in request.records.chunks(sub_batch_size) {
            let located = join_all(sub_batch.iter().map(|r| self.locate(r))).await;

            let now = Utc::now().timestamp();
            let mut models = Vec::with_capacity(sub_batch.len());
            for (record, hit) in sub_batch.iter().zip(located) {
                match hit {
                    Ok(Some((lat, lng))) => {
                        models.push(ReportRepository::active_model(record, lat, lng, &batch.id, now))
                    }
                    Ok(None) => {}
                    Err(e) => warn!(
                        "查询树坐标失败 {} R{}C{}: {}",
                        record.parcel_key(),
                        record.row,
                        record.col,
                        e
                    ),
                }
            }

            let skipped = (sub_batch.len() - models.len()) as u64;
            if skipped > 0 {
                info!("跳过 {} 条记录（树表中不存在）", skipped);
                total_errors += skipped;
            }
            if models.is_empty() {
                continue;
            }

            let valid = models.len() as u64;
            match ReportRepository::upsert_batch(&self.db, models).await {
                Ok(_) => total_processed += valid,
                Err(e) => {
                    error!("子批次 upsert 失败（{} 条）: {}", valid, e);
                    total_errors += valid;
                }
            }
        }

        let updated = UploadRepository::add_progress(
            &self.db,
            &batch.id,
            total_processed as i64,
            request.is_last_chunk,
        )
        .await?;
        info!(
            "上传 {} 累计 {} 条，状态 {}（本块成功 {}，失败 {}）",
            updated.id, updated.total_records, updated.status, total_processed, total_errors
        );

        Ok(ChunkResponse {
            success: true,
            message: format!(
                "Processed {} records (chunk {}/{})",
                total_processed,
                request.chunk_number.unwrap_or(1),
                request.total_chunks.unwrap_or(1)
            ),
            total_processed,
            total_errors,
            upload_id: updated.id,
        })
    }

    /// 删除上传记录；`cascade` 为 false 时保留该批次写入的报表行
    pub async fn delete_upload(
        &self,
        caller: &Caller,
        request: DeleteRequest,
    ) -> Result<ActionResponse, ImportError> {
        caller.require_admin()?;
        info!("删除上传 {}（cascade={}）", request.upload_id, request.cascade);

        if request.cascade {
            let removed = ReportRepository::delete_by_upload(&self.db, &request.upload_id).await?;
            info!("已删除 {} 条报表行", removed);
        } else {
            let kept = ReportRepository::count_by_upload(&self.db, &request.upload_id).await?;
            if kept > 0 {
                info!("保留 {} 条引用该上传的报表行", kept);
            }
        }

        let affected = UploadRepository::delete(&self.db, &request.upload_id).await?;
        if affected == 0 {
            warn!("上传 {} 不存在，未删除任何记录", request.upload_id);
        }
        Ok(ActionResponse::ok("Upload deleted successfully"))
    }

    /// 清空报表和全部上传记录
    pub async fn clear_all(&self, caller: &Caller) -> Result<ActionResponse, ImportError> {
        caller.require_admin()?;
        let reports = ReportRepository::delete_all(&self.db).await?;
        let uploads = UploadRepository::delete_all(&self.db).await?;
        info!("已清空 {} 条报表行，{} 条上传记录", reports, uploads);
        Ok(ActionResponse::ok("All data cleared successfully"))
    }

    pub async fn list_uploads(&self) -> Result<Vec<upload_batch::Model>, ImportError> {
        Ok(UploadRepository::list_recent(&self.db).await?)
    }

    /// 查出记录对应树的坐标；地块或树不存在时返回 None
    async fn locate(&self, record: &TreeRecord) -> Result<Option<(f64, f64)>, DbErr> {
        let key = record.parcel_key();
        let Some(parcel) = ParcelRepository::find_by_key(self.db.as_ref(), key).await? else {
            warn!("跳过：地块不存在 {} R{}C{}", key, record.row, record.col);
            return Ok(None);
        };

        let (row, col) = match self.settings.tree_lookup {
            TreeLookup::Direct => (record.row, record.col),
            TreeLookup::ZeroBased => match TreeAddress::from_report(record.row, record.col) {
                Ok(addr) => (addr.row, addr.col),
                Err(e) => {
                    warn!("跳过：{} {}", key, e);
                    return Ok(None);
                }
            },
        };

        let Some(tree) = ParcelRepository::find_tree(&self.db, parcel.id, row, col).await? else {
            warn!("跳过：树不存在 {} R{}C{}", key, record.row, record.col);
            return Ok(None);
        };
        Ok(Some((tree.latitude, tree.longitude)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, Role};
    use crate::grid::{interpolate, Corner};
    use crate::parcel::{ParcelKey, ParcelService};
    use crate::storage::repository::upload_repo::UploadStatus;
    use crate::storage::{establish_connection, StorageConfig};

    fn admin() -> Caller {
        Caller {
            user_id: "admin-1".to_string(),
            email: Some("admin@farm.ma".to_string()),
            role: Role::Admin,
        }
    }

    fn viewer() -> Caller {
        Caller {
            user_id: "viewer-1".to_string(),
            email: None,
            role: Role::Viewer,
        }
    }

    fn record(key: ParcelKey, row: i32, col: i32) -> TreeRecord {
        TreeRecord {
            bloc: key.block,
            sector: key.sector,
            parcel: key.parcel,
            row,
            col,
            variete: "Medjool".to_string(),
            date_de_plantation: "2015".to_string(),
            superficie_du_bloc: "12".to_string(),
            nombre_de_regimes_21_22: Some(1),
            nombre_de_regimes_22_23: Some(2),
            nombre_de_regimes_23_24: None,
            nombre_de_regimes_24_25: Some(row * col),
            nombre_de_regimes_25_26: None,
        }
    }

    fn chunk(records: Vec<TreeRecord>) -> ChunkRequest {
        ChunkRequest {
            records,
            filename: Some("farm.xlsx".to_string()),
            upload_id: None,
            chunk_number: None,
            total_chunks: None,
            is_last_chunk: true,
        }
    }

    /// 建库并保存一个 rows x cols 的地块
    async fn setup(settings: ImportSettings, key: ParcelKey, size: i32) -> ImportService {
        let db = Arc::new(
            establish_connection(&StorageConfig::in_memory())
                .await
                .unwrap(),
        );
        let corners = [
            Corner::new(30.0, -9.0),
            Corner::new(30.0, -8.9),
            Corner::new(30.1, -8.9),
            Corner::new(30.1, -9.0),
        ];
        let points = interpolate(&corners, size, size).unwrap();
        ParcelService::new(db.clone())
            .save_grid(key, &points)
            .await
            .unwrap();
        ImportService::new(db, settings)
    }

    #[tokio::test]
    async fn test_import_merges_tree_coordinates() {
        let key = ParcelKey::new(1, 1, 1);
        let svc = setup(ImportSettings::default(), key, 3).await;

        // 后两条分别缺树、缺地块
        let records = vec![
            record(key, 1, 1),
            record(key, 2, 2),
            record(key, 5, 5),
            record(ParcelKey::new(9, 9, 9), 1, 1),
        ];
        let resp = svc.process_chunk(&admin(), chunk(records)).await.unwrap();
        assert!(resp.success);
        assert_eq!(resp.total_processed, 2);
        assert_eq!(resp.total_errors, 2);
        assert_eq!(resp.message, "Processed 2 records (chunk 1/1)");

        let tree = ParcelRepository::find_tree(&svc.db, 1, 1, 1).await.unwrap().unwrap();
        let report = ReportRepository::find_by_address(&svc.db, key, 1, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.latitude, Some(tree.latitude));
        assert_eq!(report.longitude, Some(tree.longitude));
        assert_eq!(report.upload_id.as_deref(), Some(resp.upload_id.as_str()));
        assert_eq!(report.variete.as_deref(), Some("Medjool"));
        assert_eq!(report.nombre_de_regimes_24_25, Some(1));

        let batch = UploadRepository::find(&svc.db, &resp.upload_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.filename, "farm.xlsx");
        assert_eq!(batch.total_records, 2);
        assert_eq!(batch.status, UploadStatus::Completed.as_str());
    }

    #[tokio::test]
    async fn test_reimport_overwrites_existing_row() {
        let key = ParcelKey::new(2, 1, 1);
        let svc = setup(ImportSettings::default(), key, 2).await;

        svc.process_chunk(&admin(), chunk(vec![record(key, 1, 1)]))
            .await
            .unwrap();
        let mut changed = record(key, 1, 1);
        changed.variete = "Deglet Nour".to_string();
        changed.nombre_de_regimes_24_25 = None;
        let second = svc
            .process_chunk(&admin(), chunk(vec![changed]))
            .await
            .unwrap();

        assert_eq!(ReportRepository::count_all(&svc.db).await.unwrap(), 1);
        let row = ReportRepository::find_by_address(&svc.db, key, 1, 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.variete.as_deref(), Some("Deglet Nour"));
        assert_eq!(row.nombre_de_regimes_24_25, None);
        assert_eq!(row.upload_id.as_deref(), Some(second.upload_id.as_str()));
    }

    #[tokio::test]
    async fn test_non_admin_cannot_import() {
        let key = ParcelKey::new(1, 1, 1);
        let svc = setup(ImportSettings::default(), key, 2).await;

        let err = svc
            .process_chunk(&viewer(), chunk(vec![record(key, 1, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Auth(AuthError::Forbidden)));
        assert!(svc.list_uploads().await.unwrap().is_empty());
        assert_eq!(ReportRepository::count_all(&svc.db).await.unwrap(), 0);

        let err = svc.clear_all(&viewer()).await.unwrap_err();
        assert!(matches!(err, ImportError::Auth(AuthError::Forbidden)));
    }

    #[tokio::test]
    async fn test_empty_and_unknown_upload_rejected() {
        let key = ParcelKey::new(1, 1, 1);
        let svc = setup(ImportSettings::default(), key, 2).await;

        let err = svc.process_chunk(&admin(), chunk(vec![])).await.unwrap_err();
        assert_eq!(err.to_string(), "No records provided");

        let mut req = chunk(vec![record(key, 1, 1)]);
        req.upload_id = Some("missing".to_string());
        let err = svc.process_chunk(&admin(), req).await.unwrap_err();
        assert!(matches!(err, ImportError::UploadNotFound(id) if id == "missing"));
        assert!(svc.list_uploads().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chunks_accumulate_on_one_batch() {
        let key = ParcelKey::new(1, 2, 1);
        let settings = ImportSettings {
            sub_batch_size: 2,
            ..ImportSettings::default()
        };
        let svc = setup(settings, key, 4).await;

        let mut first = chunk((1..=3).map(|c| record(key, 1, c)).collect());
        first.filename = None;
        first.chunk_number = Some(1);
        first.total_chunks = Some(2);
        first.is_last_chunk = false;
        let r1 = svc.process_chunk(&admin(), first).await.unwrap();
        assert_eq!(r1.total_processed, 3);
        assert_eq!(r1.message, "Processed 3 records (chunk 1/2)");

        let batch = UploadRepository::find(&svc.db, &r1.upload_id).await.unwrap().unwrap();
        assert_eq!(batch.filename, DEFAULT_FILENAME);
        assert_eq!(batch.status, UploadStatus::Processing.as_str());

        let mut second = chunk((1..=3).map(|c| record(key, 2, c)).collect());
        second.upload_id = Some(r1.upload_id.clone());
        second.chunk_number = Some(2);
        second.total_chunks = Some(2);
        let r2 = svc.process_chunk(&admin(), second).await.unwrap();
        assert_eq!(r2.upload_id, r1.upload_id);

        let batch = UploadRepository::find(&svc.db, &r1.upload_id).await.unwrap().unwrap();
        assert_eq!(batch.total_records, 6);
        assert_eq!(batch.status, UploadStatus::Completed.as_str());
        assert_eq!(svc.list_uploads().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_based_lookup_shifts_indices() {
        let key = ParcelKey::new(3, 1, 1);
        let settings = ImportSettings {
            tree_lookup: TreeLookup::ZeroBased,
            ..ImportSettings::default()
        };
        let svc = setup(settings, key, 2).await;

        // (2,2) -> 树 (1,1)；(3,3) 超出 2x2
        let resp = svc
            .process_chunk(&admin(), chunk(vec![record(key, 2, 2), record(key, 3, 3)]))
            .await
            .unwrap();
        assert_eq!(resp.total_processed, 1);
        assert_eq!(resp.total_errors, 1);

        let tree = ParcelRepository::find_tree(&svc.db, 1, 1, 1).await.unwrap().unwrap();
        let report = ReportRepository::find_by_address(&svc.db, key, 2, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.latitude, Some(tree.latitude));
    }

    #[tokio::test]
    async fn test_delete_upload_with_and_without_cascade() {
        let key = ParcelKey::new(1, 1, 1);
        let svc = setup(ImportSettings::default(), key, 3).await;

        let kept = svc
            .process_chunk(&admin(), chunk(vec![record(key, 1, 1)]))
            .await
            .unwrap();
        let removed = svc
            .process_chunk(&admin(), chunk(vec![record(key, 2, 2)]))
            .await
            .unwrap();

        let resp = svc
            .delete_upload(
                &admin(),
                DeleteRequest {
                    upload_id: kept.upload_id.clone(),
                    cascade: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(resp, ActionResponse::ok("Upload deleted successfully"));
        assert!(UploadRepository::find(&svc.db, &kept.upload_id).await.unwrap().is_none());
        assert_eq!(
            ReportRepository::count_by_upload(&svc.db, &kept.upload_id).await.unwrap(),
            1
        );

        svc.delete_upload(
            &admin(),
            DeleteRequest {
                upload_id: removed.upload_id.clone(),
                cascade: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            ReportRepository::count_by_upload(&svc.db, &removed.upload_id).await.unwrap(),
            0
        );
        assert_eq!(ReportRepository::count_all(&svc.db).await.unwrap(), 1);

        // 不存在的 id 不算错误
        svc.delete_upload(
            &admin(),
            DeleteRequest {
                upload_id: "nope".to_string(),
                cascade: true,
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_clear_all_empties_report_and_history() {
        let key = ParcelKey::new(1, 1, 1);
        let svc = setup(ImportSettings::default(), key, 3).await;
        svc.process_chunk(&admin(), chunk(vec![record(key, 1, 1), record(key, 1, 2)]))
            .await
            .unwrap();

        let resp = svc.clear_all(&admin()).await.unwrap();
        assert_eq!(resp.message, "All data cleared successfully");
        assert_eq!(ReportRepository::count_all(&svc.db).await.unwrap(), 0);
        assert!(svc.list_uploads().await.unwrap().is_empty());
        // 地块和树不受影响
        assert!(ParcelRepository::find_tree(&svc.db, 1, 0, 0).await.unwrap().is_some());
    }
}
