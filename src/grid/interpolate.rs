use crate::grid::address::TreeAddress;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 用户在地图上点选的地块角点
///
/// 角点顺序有意义：c0..c3 依次对应单位正方形的 (0,0)、(1,0)、(1,1)、(0,1)。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Corner {
    pub lat: f64,
    pub lng: f64,
}

impl Corner {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl FromStr for Corner {
    type Err = String;

    /// 解析 "lat,lng"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lat, lng) = s
            .split_once(',')
            .ok_or_else(|| format!("corner must look like \"lat,lng\", got {s:?}"))?;
        let lat = lat
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("bad latitude {lat:?}: {e}"))?;
        let lng = lng
            .trim()
            .parse::<f64>()
            .map_err(|e| format!("bad longitude {lng:?}: {e}"))?;
        Ok(Self::new(lat, lng))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPoint {
    pub address: TreeAddress,
    pub lat: f64,
    pub lng: f64,
}

/// 单个地块允许的最大树数
pub const MAX_GRID_TREES: usize = 10_000;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("number of rows and columns must be greater than 0 (rows={rows}, cols={cols})")]
    InvalidDimensions { rows: i32, cols: i32 },
    #[error("a parcel needs exactly 4 corners, got {0}")]
    CornerCount(usize),
    #[error("grid of {rows} x {cols} exceeds the limit of {max} trees")]
    TooLarge { rows: i32, cols: i32, max: usize },
}

/// 双线性插值：把 rows x cols 的网格映射到四边形内
///
/// 采样点取格子中心 u=(col+0.5)/cols, v=(row+0.5)/rows，不会落在地块边线上。
/// 结果按行优先排列。
pub fn interpolate(corners: &[Corner; 4], rows: i32, cols: i32) -> Result<Vec<GridPoint>, GridError> {
    if rows <= 0 || cols <= 0 {
        return Err(GridError::InvalidDimensions { rows, cols });
    }
    let total = (rows as usize)
        .checked_mul(cols as usize)
        .filter(|n| *n <= MAX_GRID_TREES)
        .ok_or(GridError::TooLarge {
            rows,
            cols,
            max: MAX_GRID_TREES,
        })?;

    let mut points = Vec::with_capacity(total);
    for row in 0..rows {
        for col in 0..cols {
            let u = (f64::from(col) + 0.5) / f64::from(cols);
            let v = (f64::from(row) + 0.5) / f64::from(rows);
            let (lat, lng) = blend(corners, u, v);
            points.push(GridPoint {
                address: TreeAddress::new(row, col),
                lat,
                lng,
            });
        }
    }
    Ok(points)
}

/// 与 `interpolate` 相同，角点来自不定长输入（例如 HTTP 请求体）
pub fn interpolate_slice(corners: &[Corner], rows: i32, cols: i32) -> Result<Vec<GridPoint>, GridError> {
    let corners: &[Corner; 4] = corners
        .try_into()
        .map_err(|_| GridError::CornerCount(corners.len()))?;
    interpolate(corners, rows, cols)
}

fn blend(corners: &[Corner; 4], u: f64, v: f64) -> (f64, f64) {
    let [c0, c1, c2, c3] = corners;
    let w0 = (1.0 - u) * (1.0 - v);
    let w1 = u * (1.0 - v);
    let w2 = u * v;
    let w3 = (1.0 - u) * v;
    let lat = w0 * c0.lat + w1 * c1.lat + w2 * c2.lat + w3 * c3.lat;
    let lng = w0 * c0.lng + w1 * c1.lng + w2 * c2.lng + w3 * c3.lng;
    (lat, lng)
}
