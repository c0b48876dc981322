//! 简单描述统计.

use itertools::{Itertools, MinMaxResult};

/// 最小值, 平均值, 中位数, 最大值.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Summary {
    /// 最小值.
    pub min: f64,
    /// 平均值.
    pub mean: f64,
    /// 中位数. 个数为偶数时取中间两个值的平均.
    pub median: f64,
    /// 最大值.
    pub max: f64,
}

impl Summary {
    /// 统计 `values`. 为空时返回 `None`.
    pub fn of<I: IntoIterator<Item = f64>>(values: I) -> Option<Summary> {
        let mut values: Vec<f64> = values.into_iter().collect();
        let (min, max) = match values.iter().copied().minmax_by(f64::total_cmp) {
            MinMaxResult::NoElements => return None,
            MinMaxResult::OneElement(v) => (v, v),
            MinMaxResult::MinMax(lo, hi) => (lo, hi),
        };
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        values.sort_unstable_by(f64::total_cmp);
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };
        Some(Summary {
            min,
            mean,
            median,
            max,
        })
    }

    /// 以 `[min, mean, median, max]` 顺序展开.
    #[inline]
    pub fn to_array(&self) -> [f64; 4] {
        [self.min, self.mean, self.median, self.max]
    }
}

/// 以 `[min, mean, median, max]` 顺序展开, 缺失时全为 `None`.
pub(crate) fn summary_row(summary: Option<Summary>) -> Vec<Option<f64>> {
    match summary {
        Some(s) => s.to_array().into_iter().map(Some).collect(),
        None => vec![None; 4],
    }
}
