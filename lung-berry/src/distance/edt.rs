//! 精确欧氏距离变换与最近特征变换.
//!
//! 采用 Felzenszwalb & Huttenlocher 的可分离抛物线下包络算法,
//! 依次沿三个方向处理, 同时记录最近特征体素的线性索引.

use ndarray::{Array3, ArrayView3, ArrayViewMut1, Axis, Zip};

use crate::data::linear;

/// 沿单个方向的一维平方距离变换.
///
/// `dist` 为当前平方距离 (无特征处为无穷), `feat` 为对应的最近特征索引.
/// 处理后两者都就地更新. 位置 `q` 的坐标为 `q * step`.
/// 与两个特征等距时取下标较小的一侧.
fn transform_lane(mut dist: ArrayViewMut1<f64>, mut feat: ArrayViewMut1<usize>, step: f64) {
    let n = dist.len();
    let f: Vec<f64> = dist.to_vec();
    let src: Vec<usize> = feat.to_vec();

    // 下包络中抛物线的顶点位置和分界点.
    let mut v: Vec<usize> = Vec::with_capacity(n);
    let mut z: Vec<f64> = Vec::with_capacity(n + 1);
    let x = |q: usize| q as f64 * step;

    for q in (0..n).filter(|&q| f[q].is_finite()) {
        let mut s = f64::NEG_INFINITY;
        while let Some(&p) = v.last() {
            s = ((f[q] + x(q) * x(q)) - (f[p] + x(p) * x(p))) / (2.0 * (x(q) - x(p)));
            if s > z[v.len() - 1] {
                break;
            }
            v.pop();
            z.pop();
            s = f64::NEG_INFINITY;
        }
        v.push(q);
        z.push(s);
    }
    if v.is_empty() {
        return;
    }
    z.push(f64::INFINITY);

    let mut k = 0;
    for q in 0..n {
        while z[k + 1] < x(q) {
            k += 1;
        }
        let p = v[k];
        let diff = x(q) - x(p);
        dist[q] = diff * diff + f[p];
        feat[q] = src[p];
    }
}

/// 最近特征变换.
///
/// 对每个体素求最近的特征体素 (`features` 中为 `true`), 距离按 `sampling`
/// 给出的三个方向间距计算.
///
/// # 返回值
///
/// `(欧氏距离, 最近特征体素的行优先线性索引)`. 不存在特征体素时返回 `None`.
pub fn feature_transform(
    features: ArrayView3<bool>,
    sampling: [f64; 3],
) -> Option<(Array3<f64>, Array3<usize>)> {
    if !features.iter().any(|v| *v) {
        return None;
    }
    let shape = features.dim();
    let mut dist = features.mapv(|v| if v { 0.0 } else { f64::INFINITY });
    let mut feat = Array3::from_shape_fn(shape, |pos| {
        if features[pos] {
            linear(shape, pos)
        } else {
            usize::MAX
        }
    });

    for (axis, step) in sampling.into_iter().enumerate() {
        let zip = Zip::from(dist.lanes_mut(Axis(axis))).and(feat.lanes_mut(Axis(axis)));
        cfg_if::cfg_if! {
            if #[cfg(feature = "rayon")] {
                zip.par_for_each(|d, f| transform_lane(d, f, step));
            } else {
                zip.for_each(|d, f| transform_lane(d, f, step));
            }
        }
    }
    dist.mapv_inplace(f64::sqrt);
    Some((dist, feat))
}

/// 欧氏距离变换: 每个前景体素到最近背景体素的距离, 背景体素为 0.
///
/// 距离按 `sampling` 给出的三个方向间距计算. 不存在背景体素时返回 `None`.
pub fn distance_transform_edt(mask: ArrayView3<bool>, sampling: [f64; 3]) -> Option<Array3<f64>> {
    let background = mask.mapv(|v| !v);
    feature_transform(background.view(), sampling).map(|(dist, _)| dist)
}
