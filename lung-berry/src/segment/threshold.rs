//! 填充值识别, Otsu 阈值和前景提取.

use std::collections::HashMap;

use log::{debug, warn};
use ndarray::{ArrayView3, Axis};
use ordered_float::OrderedFloat;

use crate::config::ThresholdBand;
use crate::BinaryMask;

/// 获取扫描的填充值: 六个外表面上出现次数最多的体素值.
///
/// 并列时取较小的值. 网格为空时返回 `None`.
pub fn filler_value(voxels: ArrayView3<f32>) -> Option<f32> {
    if voxels.is_empty() {
        return None;
    }
    let mut counter: HashMap<OrderedFloat<f32>, usize> = HashMap::new();
    for axis in 0..3 {
        let len = voxels.len_of(Axis(axis));
        for index in [0, len - 1] {
            for &v in voxels.index_axis(Axis(axis), index).iter() {
                *counter.entry(OrderedFloat(v)).or_insert(0) += 1;
            }
        }
    }
    counter
        .into_iter()
        .max_by(|(va, ca), (vb, cb)| ca.cmp(cb).then(vb.cmp(va)))
        .map(|(v, _)| v.into_inner())
}

/// `a` 是否与 `b` 足够接近: `|a - b| <= 1e-8 + 1e-5 * |b|`.
#[inline]
pub(crate) fn is_close(a: f32, b: f32) -> bool {
    let (a, b) = (a as f64, b as f64);
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// 以 Otsu 方法求阈值. 直方图在 `[min, max]` 上等分为 `bins` 个箱,
/// 返回使类间方差最大的划分处 (低类最后一个箱) 的箱中心.
///
/// 非有限值会被忽略. 无有效值时返回 `None`, 所有值相同时返回该值.
///
/// # 注意
///
/// `bins` 必须大于 0, 否则 panic.
pub fn otsu_threshold(values: &[f32], bins: usize) -> Option<f32> {
    assert!(bins > 0);
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f32, f32)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
    if min == max {
        return Some(min);
    }

    let (min, max) = (min as f64, max as f64);
    let bin_width = (max - min) / bins as f64;
    let mut histogram = vec![0usize; bins];
    for &v in values.iter().filter(|v| v.is_finite()) {
        let bin = ((v as f64 - min) / bin_width).floor() as usize;
        histogram[bin.min(bins - 1)] += 1;
    }
    let centre = |i: usize| min + (i as f64 + 0.5) * bin_width;

    let total: f64 = histogram.iter().sum::<usize>() as f64;
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| centre(i) * c as f64)
        .sum();

    let mut weight_low = 0.0;
    let mut sum_low = 0.0;
    let mut best = (f64::NEG_INFINITY, 0usize);
    for (t, &count) in histogram.iter().enumerate().take(bins - 1) {
        weight_low += count as f64;
        sum_low += centre(t) * count as f64;
        let weight_high = total - weight_low;
        if weight_low == 0.0 {
            continue;
        }
        if weight_high == 0.0 {
            break;
        }
        let mean_low = sum_low / weight_low;
        let mean_high = (sum_total - sum_low) / weight_high;
        let variance = weight_low * weight_high * (mean_low - mean_high).powi(2);
        // 严格大于, 保留第一个最大值.
        if variance > best.0 {
            best = (variance, t);
        }
    }
    Some(centre(best.1) as f32)
}

/// 求肺部空气/组织阈值.
///
/// 先排除与填充值接近的体素, 再对其余体素求 Otsu 阈值.
/// 阈值不严格位于 `band` 内, 或无法计算时, 使用 `band.fallback()`, 并输出警告.
pub fn lung_threshold(voxels: ArrayView3<f32>, band: &ThresholdBand, bins: usize) -> f32 {
    let candidate = filler_value(voxels).and_then(|filler| {
        let values: Vec<f32> = voxels
            .iter()
            .copied()
            .filter(|&v| !is_close(v, filler))
            .collect();
        debug!(
            "filler value {filler}, {} of {} voxels kept for thresholding",
            values.len(),
            voxels.len()
        );
        otsu_threshold(&values, bins)
    });
    match candidate {
        Some(t) if band.contains(t) => {
            debug!("lung threshold {t}");
            t
        }
        Some(t) => {
            warn!(
                "lung threshold {t} outside ({}, {}), falling back to {}",
                band.lower(),
                band.upper(),
                band.fallback()
            );
            band.fallback()
        }
        None => {
            warn!(
                "lung threshold undefined, falling back to {}",
                band.fallback()
            );
            band.fallback()
        }
    }
}

/// 前景掩膜: `voxels >= t`.
#[inline]
pub fn foreground(voxels: ArrayView3<f32>, t: f32) -> BinaryMask {
    voxels.mapv(|v| v >= t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{s, Array3};

    fn init_logger() {
        let _ = simple_logger::init_with_level(log::Level::Debug);
    }

    #[test]
    fn test_filler_value_mode() {
        let mut v = Array3::from_elem((4, 4, 4), -1024.0f32);
        v.slice_mut(s![1..3, 1..3, 1..3]).fill(40.0);
        assert_eq!(filler_value(v.view()), Some(-1024.0));

        // 仅内部不同, 不影响外表面.
        v[(1, 1, 1)] = 7.0;
        assert_eq!(filler_value(v.view()), Some(-1024.0));

        assert_eq!(filler_value(Array3::<f32>::zeros((0, 4, 4)).view()), None);
    }

    #[test]
    fn test_filler_value_tie() {
        // 1x1x2: 每个外表面都恰好覆盖两个值中的一个或全部, 两者次数相同.
        let mut v = Array3::from_elem((1, 1, 2), 5.0f32);
        v[(0, 0, 0)] = 3.0;
        assert_eq!(filler_value(v.view()), Some(3.0));
    }

    #[test]
    fn test_is_close() {
        assert!(is_close(-1024.0, -1024.0));
        assert!(is_close(-1024.005, -1024.0));
        assert!(!is_close(-1023.0, -1024.0));
        assert!(is_close(0.0, 0.0));
        assert!(!is_close(1e-6, 0.0));
    }

    #[test]
    fn test_otsu_threshold_bimodal() {
        let mut data = Vec::new();
        for i in 0..100 {
            data.push(-900.0 + i as f32);
        }
        for i in 0..100 {
            data.push(0.0 + i as f32);
        }
        let t = otsu_threshold(&data, 256).unwrap();
        assert!(t > -801.0 && t < 0.0, "{t}");
    }

    #[test]
    fn test_otsu_threshold_degenerate() {
        assert_eq!(otsu_threshold(&[], 256), None);
        assert_eq!(otsu_threshold(&[f32::NAN], 256), None);
        assert_eq!(otsu_threshold(&[3.0, 3.0, 3.0], 256), Some(3.0));
    }

    #[test]
    fn test_otsu_two_values() {
        // 两个值时, 阈值为低值所在箱的中心.
        let t = otsu_threshold(&[0.0, 0.0, 256.0, 256.0], 256).unwrap();
        assert!((t - 0.5).abs() < 1e-6, "{t}");
    }

    #[test]
    fn test_lung_threshold_in_band() {
        init_logger();
        // 外层填充值 -2000, 内部为空气 -900 和组织 40.
        let mut v = Array3::from_elem((10, 10, 10), -2000.0f32);
        v.slice_mut(s![1..9, 1..9, 1..9]).fill(40.0);
        v.slice_mut(s![1..9, 1..9, 1..5]).fill(-900.0);
        let t = lung_threshold(v.view(), &ThresholdBand::default(), 256);
        assert!(t > -900.0 && t < 40.0, "{t}");
        assert!(t < 0.0);
    }

    #[test]
    fn test_lung_threshold_fallback() {
        init_logger();
        // 内部全为正值, 阈值落在区间外.
        let mut v = Array3::from_elem((6, 6, 6), -1000.0f32);
        v.slice_mut(s![1..5, 1..5, 1..5]).fill(100.0);
        v.slice_mut(s![1..5, 1..5, 1..3]).fill(300.0);
        let band = ThresholdBand::default();
        assert_eq!(lung_threshold(v.view(), &band, 256), -500.0);

        // 只有填充值, 阈值无法计算.
        let v = Array3::from_elem((3, 3, 3), -1000.0f32);
        let band = ThresholdBand::new(-1000.0, 0.0, -420.0).unwrap();
        assert_eq!(lung_threshold(v.view(), &band, 256), -420.0);
    }

    #[test]
    fn test_foreground() {
        let v = Array3::from_shape_vec((1, 1, 3), vec![-1.0f32, 0.0, 1.0]).unwrap();
        let fg = foreground(v.view(), 0.0);
        assert_eq!(fg.iter().copied().collect::<Vec<_>>(), vec![false, true, true]);
    }
}
