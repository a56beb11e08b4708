use crate::parcel::ParcelKey;
use serde::{Deserialize, Serialize};

/// 工作表中一棵树的一行农艺数据
///
/// 字段名与报表表 `parcels_trees_report` 的列名一致，也是导入接口的线上格式。
/// `row` / `col` 为 1 起始。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRecord {
    pub bloc: i32,
    pub sector: i32,
    pub parcel: i32,
    pub row: i32,
    pub col: i32,
    #[serde(default)]
    pub variete: String,
    #[serde(default)]
    pub date_de_plantation: String,
    #[serde(default)]
    pub superficie_du_bloc: String,
    #[serde(default)]
    pub nombre_de_regimes_21_22: Option<i32>,
    #[serde(default)]
    pub nombre_de_regimes_22_23: Option<i32>,
    #[serde(default)]
    pub nombre_de_regimes_23_24: Option<i32>,
    #[serde(default)]
    pub nombre_de_regimes_24_25: Option<i32>,
    #[serde(default)]
    pub nombre_de_regimes_25_26: Option<i32>,
}

impl TreeRecord {
    pub fn parcel_key(&self) -> ParcelKey {
        ParcelKey::new(self.bloc, self.sector, self.parcel)
    }
}
