use crate::parcel::ParcelKey;
use crate::storage::entity::tree_report::{
    self, ActiveModel as ReportActiveModel, Entity as TreeReport,
};
use crate::workbook::TreeRecord;
use sea_orm::sea_query::{Alias, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

const CONFLICT_KEY: [&str; 5] = ["bloc", "sector", "parcel", "row", "col"];

// 冲突时覆盖的列（created_at 保留首次写入时间）
const UPSERT_COLUMNS: [&str; 12] = [
    "variete",
    "date_de_plantation",
    "superficie_du_bloc",
    "nombre_de_regimes_21_22",
    "nombre_de_regimes_22_23",
    "nombre_de_regimes_23_24",
    "nombre_de_regimes_24_25",
    "nombre_de_regimes_25_26",
    "latitude",
    "longitude",
    "upload_id",
    "updated_at",
];

pub struct ReportRepository;

impl ReportRepository {
    /// 由工作表记录和树坐标构造待写入的报表行
    pub fn active_model(
        record: &TreeRecord,
        latitude: f64,
        longitude: f64,
        upload_id: &str,
        now: i64,
    ) -> ReportActiveModel {
        ReportActiveModel {
            id: NotSet,
            bloc: Set(record.bloc),
            sector: Set(record.sector),
            parcel: Set(record.parcel),
            row: Set(record.row),
            col: Set(record.col),
            variete: Set(Some(record.variete.clone())),
            date_de_plantation: Set(Some(record.date_de_plantation.clone())),
            superficie_du_bloc: Set(Some(record.superficie_du_bloc.clone())),
            nombre_de_regimes_21_22: Set(record.nombre_de_regimes_21_22),
            nombre_de_regimes_22_23: Set(record.nombre_de_regimes_22_23),
            nombre_de_regimes_23_24: Set(record.nombre_de_regimes_23_24),
            nombre_de_regimes_24_25: Set(record.nombre_de_regimes_24_25),
            nombre_de_regimes_25_26: Set(record.nombre_de_regimes_25_26),
            latitude: Set(Some(latitude)),
            longitude: Set(Some(longitude)),
            upload_id: Set(Some(upload_id.to_string())),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    /// 单条语句批量 upsert，按 (bloc, sector, parcel, row, col) 覆盖已有行
    pub async fn upsert_batch(
        db: &DatabaseConnection,
        models: Vec<ReportActiveModel>,
    ) -> Result<u64, DbErr> {
        if models.is_empty() {
            return Ok(0);
        }

        let on_conflict = OnConflict::columns(CONFLICT_KEY.into_iter().map(Alias::new))
            .update_columns(UPSERT_COLUMNS.into_iter().map(Alias::new))
            .to_owned();

        TreeReport::insert_many(models)
            .on_conflict(on_conflict)
            .exec_without_returning(db)
            .await
    }

    /// `row` / `col` 为 1 起始
    pub async fn find_by_address(
        db: &DatabaseConnection,
        key: ParcelKey,
        row: i32,
        col: i32,
    ) -> Result<Option<tree_report::Model>, DbErr> {
        TreeReport::find()
            .filter(tree_report::Column::Bloc.eq(key.block))
            .filter(tree_report::Column::Sector.eq(key.sector))
            .filter(tree_report::Column::Parcel.eq(key.parcel))
            .filter(tree_report::Column::Row.eq(row))
            .filter(tree_report::Column::Col.eq(col))
            .one(db)
            .await
    }

    pub async fn page(
        db: &DatabaseConnection,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<tree_report::Model>, DbErr> {
        TreeReport::find()
            .order_by_asc(tree_report::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(db)
            .await
    }

    #[cfg(test)]
    pub async fn count_all(db: &DatabaseConnection) -> Result<u64, DbErr> {
        TreeReport::find().count(db).await
    }

    pub async fn count_by_upload(db: &DatabaseConnection, upload_id: &str) -> Result<u64, DbErr> {
        TreeReport::find()
            .filter(tree_report::Column::UploadId.eq(upload_id))
            .count(db)
            .await
    }

    pub async fn delete_by_upload(db: &DatabaseConnection, upload_id: &str) -> Result<u64, DbErr> {
        let res = TreeReport::delete_many()
            .filter(tree_report::Column::UploadId.eq(upload_id))
            .exec(db)
            .await?;
        Ok(res.rows_affected)
    }

    pub async fn delete_all(db: &DatabaseConnection) -> Result<u64, DbErr> {
        let res = TreeReport::delete_many().exec(db).await?;
        Ok(res.rows_affected)
    }
}
