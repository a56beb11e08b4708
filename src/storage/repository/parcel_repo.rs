use crate::grid::{GridPoint, TreeAddress};
use crate::parcel::ParcelKey;
use crate::storage::entity::parcel::{self, ActiveModel as ParcelActiveModel, Entity as Parcel};
use crate::storage::entity::tree::{self, ActiveModel as TreeActiveModel, Entity as Tree};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};

// 单条 INSERT 的行数上限，避免超出 SQLite 参数个数限制
const TREE_INSERT_CHUNK: usize = 500;

pub struct ParcelRepository;

impl ParcelRepository {
    pub async fn find_by_key<C>(db: &C, key: ParcelKey) -> Result<Option<parcel::Model>, DbErr>
    where
        C: ConnectionTrait,
    {
        Parcel::find()
            .filter(parcel::Column::BlockNumber.eq(key.block))
            .filter(parcel::Column::SectorNumber.eq(key.sector))
            .filter(parcel::Column::ParcelNumber.eq(key.parcel))
            .one(db)
            .await
    }

    /// 在同一事务内写入地块及其全部树，任一步失败整体回滚
    pub async fn insert_with_trees(
        db: &DatabaseConnection,
        key: ParcelKey,
        points: &[GridPoint],
    ) -> Result<(parcel::Model, usize), DbErr> {
        let now = Utc::now().timestamp();
        let txn = db.begin().await?;

        let parcel = ParcelActiveModel {
            block_number: Set(key.block),
            sector_number: Set(key.sector),
            parcel_number: Set(key.parcel),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        let trees: Vec<TreeActiveModel> = points
            .iter()
            .map(|p| TreeActiveModel {
                parcel_id: Set(parcel.id),
                tree_id: Set(p.address.to_string()),
                row_index: Set(p.address.row),
                col_index: Set(p.address.col),
                latitude: Set(p.lat),
                longitude: Set(p.lng),
                created_at: Set(now),
                ..Default::default()
            })
            .collect();

        for chunk in trees.chunks(TREE_INSERT_CHUNK) {
            Tree::insert_many(chunk.to_vec())
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok((parcel, trees.len()))
    }

    pub async fn find_tree(
        db: &DatabaseConnection,
        parcel_id: i32,
        row_index: i32,
        col_index: i32,
    ) -> Result<Option<tree::Model>, DbErr> {
        Tree::find()
            .filter(tree::Column::ParcelId.eq(parcel_id))
            .filter(tree::Column::RowIndex.eq(row_index))
            .filter(tree::Column::ColIndex.eq(col_index))
            .one(db)
            .await
    }

    /// 地块下的树，按行、列排序；给定位置时只返回该位置
    pub async fn list_trees(
        db: &DatabaseConnection,
        parcel_id: i32,
        only: Option<TreeAddress>,
    ) -> Result<Vec<tree::Model>, DbErr> {
        let mut query = Tree::find().filter(tree::Column::ParcelId.eq(parcel_id));
        if let Some(addr) = only {
            query = query
                .filter(tree::Column::RowIndex.eq(addr.row))
                .filter(tree::Column::ColIndex.eq(addr.col));
        }
        query
            .order_by_asc(tree::Column::RowIndex)
            .order_by_asc(tree::Column::ColIndex)
            .all(db)
            .await
    }
}
