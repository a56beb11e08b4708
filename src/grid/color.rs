use serde::Serialize;

const NO_DATA: [u8; 4] = [200, 200, 200, 255];

/// 产量取值范围，用于把某一季的果串数映射为颜色
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimeRange {
    pub min_value: i32,
    pub max_value: i32,
}

impl RegimeRange {
    /// 忽略空值；全部为空时返回 (0, 1)
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<i32>>,
    {
        let mut range: Option<(i32, i32)> = None;
        for v in values.into_iter().flatten() {
            range = Some(match range {
                Some((lo, hi)) => (lo.min(v), hi.max(v)),
                None => (v, v),
            });
        }
        let (min_value, max_value) = range.unwrap_or((0, 1));
        Self {
            min_value,
            max_value,
        }
    }
}

/// 红（低产/零）到绿（高产）的 RGBA 渐变；无数据或无差异时为灰色
pub fn tree_color(regimes: Option<i32>, range: RegimeRange) -> [u8; 4] {
    let Some(value) = regimes else {
        return NO_DATA;
    };
    if range.max_value == range.min_value {
        return NO_DATA;
    }

    let span = f64::from(range.max_value) - f64::from(range.min_value);
    let normalized = ((f64::from(value) - f64::from(range.min_value)) / span).clamp(0.0, 1.0);
    let red = (255.0 * (1.0 - normalized)).round() as u8;
    let green = (255.0 * normalized).round() as u8;
    [red, green, 0, 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_skips_nulls() {
        let range = RegimeRange::from_values([Some(4), None, Some(12), Some(7)]);
        assert_eq!(range.min_value, 4);
        assert_eq!(range.max_value, 12);

        let empty = RegimeRange::from_values([None, None]);
        assert_eq!((empty.min_value, empty.max_value), (0, 1));
    }

    #[test]
    fn test_gradient_endpoints() {
        let range = RegimeRange {
            min_value: 0,
            max_value: 10,
        };
        assert_eq!(tree_color(Some(0), range), [255, 0, 0, 255]);
        assert_eq!(tree_color(Some(10), range), [0, 255, 0, 255]);
        assert_eq!(tree_color(Some(5), range), [128, 128, 0, 255]);
        // 超出范围的值被截断
        assert_eq!(tree_color(Some(40), range), [0, 255, 0, 255]);
    }

    #[test]
    fn test_gray_without_data() {
        let flat = RegimeRange {
            min_value: 3,
            max_value: 3,
        };
        assert_eq!(tree_color(None, flat), [200, 200, 200, 255]);
        assert_eq!(tree_color(Some(3), flat), [200, 200, 200, 255]);
    }
}
