use crate::grid::interpolate::Corner;

pub const CORNERS_PER_PARCEL: usize = 4;

/// 一次点击之后的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionStep {
    /// 未处于选点模式，点击被忽略
    Ignored,
    /// 还需要 `remaining` 个角点
    Awaiting { remaining: usize },
    /// 第 4 个角点已到，选点模式结束
    Complete([Corner; 4]),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("clear existing trees before selecting a new parcel ({0} placed)")]
    GridNotCleared(usize),
}

/// 地块角点选择状态机
///
/// 唯一的状态来源：事件回调里直接同步读取 `is_selecting` / `corners`。
#[derive(Debug, Default)]
pub struct CornerSelection {
    selecting: bool,
    corners: Vec<Corner>,
}

impl CornerSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进入选点模式；已有树未清除时拒绝
    pub fn start(&mut self, placed_trees: usize) -> Result<(), SelectionError> {
        if placed_trees > 0 {
            return Err(SelectionError::GridNotCleared(placed_trees));
        }
        self.selecting = true;
        self.corners.clear();
        Ok(())
    }

    pub fn click(&mut self, lat: f64, lng: f64) -> SelectionStep {
        if !self.selecting {
            return SelectionStep::Ignored;
        }
        self.corners.push(Corner::new(lat, lng));

        if self.corners.len() < CORNERS_PER_PARCEL {
            return SelectionStep::Awaiting {
                remaining: CORNERS_PER_PARCEL - self.corners.len(),
            };
        }

        let picked = [
            self.corners[0],
            self.corners[1],
            self.corners[2],
            self.corners[3],
        ];
        self.selecting = false;
        self.corners.clear();
        SelectionStep::Complete(picked)
    }

    pub fn cancel(&mut self) {
        self.selecting = false;
        self.corners.clear();
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    pub fn corners(&self) -> &[Corner] {
        &self.corners
    }
}
