use crate::grid::address::AddressParseError;
use crate::grid::{GridPoint, TreeAddress};
use crate::parcel::key::ParcelKey;
use crate::storage::entity::{parcel, tree, tree_report};
use crate::storage::repository::{ParcelRepository, ReportRepository};
use chrono::{DateTime, TimeZone, Utc};
use log::info;
use sea_orm::{DatabaseConnection, DbErr, SqlErr};
use serde::Serialize;
use std::sync::Arc;

/// 全量报表按页读取时的默认页大小
pub const REPORT_PAGE_SIZE: u64 = 1000;

#[derive(thiserror::Error, Debug)]
pub enum ParcelError {
    #[error("block, sector and parcel numbers must be positive ({0})")]
    InvalidKey(ParcelKey),
    #[error("no trees to save")]
    EmptyGrid,
    #[error(transparent)]
    InvalidAddress(#[from] AddressParseError),
    #[error("Parcel Already Exists: {0}")]
    AlreadyExists(ParcelKey),
    #[error("parcel not found: {0}")]
    NotFound(ParcelKey),
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// 地图上的一棵树
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedTree {
    pub address: TreeAddress,
    pub lat: f64,
    pub lng: f64,
    pub timestamp: DateTime<Utc>,
}

impl PlacedTree {
    pub fn from_point(point: &GridPoint, timestamp: DateTime<Utc>) -> Self {
        Self {
            address: point.address,
            lat: point.lat,
            lng: point.lng,
            timestamp,
        }
    }
}

impl From<tree::Model> for PlacedTree {
    fn from(m: tree::Model) -> Self {
        Self {
            address: TreeAddress::new(m.row_index, m.col_index),
            lat: m.latitude,
            lng: m.longitude,
            timestamp: Utc
                .timestamp_opt(m.created_at, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedParcel {
    pub id: i32,
    #[serde(flatten)]
    pub key: ParcelKey,
    pub tree_count: usize,
}

impl SavedParcel {
    fn new(model: &parcel::Model, tree_count: usize) -> Self {
        Self {
            id: model.id,
            key: ParcelKey::new(model.block_number, model.sector_number, model.parcel_number),
            tree_count,
        }
    }
}

pub struct ParcelService {
    db: Arc<DatabaseConnection>,
}

impl ParcelService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// 保存地块及其全部树；同一 (区块, 分区, 地块号) 只能保存一次
    pub async fn save_grid(
        &self,
        key: ParcelKey,
        points: &[GridPoint],
    ) -> Result<SavedParcel, ParcelError> {
        if !key.is_valid() {
            return Err(ParcelError::InvalidKey(key));
        }
        if points.is_empty() {
            return Err(ParcelError::EmptyGrid);
        }
        if ParcelRepository::find_by_key(self.db.as_ref(), key)
            .await?
            .is_some()
        {
            return Err(ParcelError::AlreadyExists(key));
        }

        // 预检之后仍可能并发插入，唯一索引兜底
        let (model, count) = ParcelRepository::insert_with_trees(&self.db, key, points)
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => ParcelError::AlreadyExists(key),
                _ => ParcelError::Database(e),
            })?;

        info!("地块 {} 已保存，共 {} 棵树", key, count);
        Ok(SavedParcel::new(&model, count))
    }

    pub async fn load_trees(
        &self,
        key: ParcelKey,
        only: Option<TreeAddress>,
    ) -> Result<Vec<PlacedTree>, ParcelError> {
        let parcel = ParcelRepository::find_by_key(self.db.as_ref(), key)
            .await?
            .ok_or(ParcelError::NotFound(key))?;

        let trees = ParcelRepository::list_trees(&self.db, parcel.id, only).await?;
        Ok(trees.into_iter().map(PlacedTree::from).collect())
    }

    /// 树位置为 0 起始，报表为 1 起始
    pub async fn report_for_tree(
        &self,
        key: ParcelKey,
        address: TreeAddress,
    ) -> Result<Option<tree_report::Model>, ParcelError> {
        let (row, col) = address.to_report()?;
        Ok(ReportRepository::find_by_address(&self.db, key, row, col).await?)
    }

    /// 逐页读取整张报表，直到某页不满
    pub async fn all_reports(&self, page_size: u64) -> Result<Vec<tree_report::Model>, ParcelError> {
        let page_size = page_size.max(1);
        let mut all = Vec::new();
        let mut offset = 0;
        loop {
            let page = ReportRepository::page(&self.db, offset, page_size).await?;
            let len = page.len() as u64;
            all.extend(page);
            if len < page_size {
                break;
            }
            offset += page_size;
        }
        Ok(all)
    }
}
