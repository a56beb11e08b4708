use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 网格中一棵树的位置
///
/// 网格与 `trees` 表使用 0 起始的行列；报表表 `parcels_trees_report`
/// 使用 1 起始的行列，跨越两者时必须经过 `to_report` / `from_report`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeAddress {
    pub row: i32,
    pub col: i32,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("tree address must look like \"row,col\", got {0:?}")]
    Malformed(String),
    #[error("report row/col must be >= 1, got ({0}, {1})")]
    ReportIndex(i32, i32),
    #[error("tree row/col out of range: ({0}, {1})")]
    OutOfRange(i32, i32),
}

impl TreeAddress {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// 转换为报表表中的 (row, col)，1 起始；负数或溢出的行列报错
    pub fn to_report(self) -> Result<(i32, i32), AddressParseError> {
        let out_of_range = || AddressParseError::OutOfRange(self.row, self.col);
        if self.row < 0 || self.col < 0 {
            return Err(out_of_range());
        }
        let row = self.row.checked_add(1).ok_or_else(out_of_range)?;
        let col = self.col.checked_add(1).ok_or_else(out_of_range)?;
        Ok((row, col))
    }

    /// 由报表表中的 1 起始行列还原
    pub fn from_report(row: i32, col: i32) -> Result<Self, AddressParseError> {
        if row < 1 || col < 1 {
            return Err(AddressParseError::ReportIndex(row, col));
        }
        Ok(Self::new(row - 1, col - 1))
    }
}

impl fmt::Display for TreeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.row, self.col)
    }
}

impl FromStr for TreeAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AddressParseError::Malformed(s.to_string());
        let (row, col) = s.split_once(',').ok_or_else(malformed)?;
        let row = row.trim().parse::<i32>().map_err(|_| malformed())?;
        let col = col.trim().parse::<i32>().map_err(|_| malformed())?;
        if row < 0 || col < 0 {
            return Err(malformed());
        }
        Ok(Self::new(row, col))
    }
}
