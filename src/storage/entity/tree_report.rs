use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parcels_trees_report")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub bloc: i32,
    pub sector: i32,
    pub parcel: i32,
    pub row: i32, // 1 起始
    pub col: i32, // 1 起始
    #[sea_orm(nullable)]
    pub variete: Option<String>,
    #[sea_orm(nullable)]
    pub date_de_plantation: Option<String>,
    #[sea_orm(nullable)]
    pub superficie_du_bloc: Option<String>,

    // 各季果串数
    #[sea_orm(nullable)]
    pub nombre_de_regimes_21_22: Option<i32>,
    #[sea_orm(nullable)]
    pub nombre_de_regimes_22_23: Option<i32>,
    #[sea_orm(nullable)]
    pub nombre_de_regimes_23_24: Option<i32>,
    #[sea_orm(nullable)]
    pub nombre_de_regimes_24_25: Option<i32>,
    #[sea_orm(nullable)]
    pub nombre_de_regimes_25_26: Option<i32>,

    // 导入时从 trees 表合并
    #[sea_orm(nullable)]
    pub latitude: Option<f64>,
    #[sea_orm(nullable)]
    pub longitude: Option<f64>,

    // 不建外键：删除上传记录时报表行是否级联由调用方决定
    #[sea_orm(nullable)]
    pub upload_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
