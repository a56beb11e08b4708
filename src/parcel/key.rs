use serde::{Deserialize, Serialize};
use std::fmt;

/// 地块的组合标识 (区块, 分区, 地块号)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParcelKey {
    #[serde(rename = "blockNumber")]
    pub block: i32,
    #[serde(rename = "sectorNumber")]
    pub sector: i32,
    #[serde(rename = "parcelNumber")]
    pub parcel: i32,
}

impl ParcelKey {
    pub fn new(block: i32, sector: i32, parcel: i32) -> Self {
        Self {
            block,
            sector,
            parcel,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.block > 0 && self.sector > 0 && self.parcel > 0
    }
}

/// 与工作表命名一致：B{区块}S{分区}P{地块}
impl fmt::Display for ParcelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "B{}S{}P{}", self.block, self.sector, self.parcel)
    }
}
