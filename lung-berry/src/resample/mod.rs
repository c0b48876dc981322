//! 立方化重采样: 将各向异性体素网格插值为各向同性网格, 同时维护结节对齐.
//!
//! 网格与结节使用同一套坐标映射: 输出体素 `i` 的中心对应输入坐标
//! `(i + 0.5) / f - 0.5`, 其中 `f` 为该方向的缩放因子.

use log::{debug, warn};
use ndarray::{s, Array3, Zip};

use crate::data::{compress_mask, UnitCell};
use crate::{Idx3d, Nodule, Scan};

pub mod spline;

pub use spline::{resample_axis, resample_separable};

/// 各方向缩放因子: `spacing / min(spacing)`. 每个分量都不小于 1.
pub fn scaling_factors(unit_cell: UnitCell) -> [f64; 3] {
    let min = unit_cell.min_step();
    unit_cell.as_array().map(|s| s / min)
}

/// 长度为 `n` 的方向以因子 `f` 缩放后的长度: `max(1, round(n * f))`.
#[inline]
fn scaled_len(n: usize, f: f64) -> usize {
    ((n as f64 * f).round() as usize).max(1)
}

/// 输出体素 `start .. start + len` 的中心在输入空间中的坐标, 再平移 `-offset`.
fn centre_coords(start: usize, len: usize, f: f64, offset: f64) -> Vec<f64> {
    (start..start + len)
        .map(|i| (i as f64 + 0.5) / f - 0.5 - offset)
        .collect()
}

/// 立方化重采样.
///
/// 体素网格以三次 B 样条 (镜像边界) 插值, 新的体素分辨率在三个方向上都等于原最小分辨率.
/// 每个结节按 [`rescale_nodule`] 处理. 已是各向同性的扫描直接返回拷贝.
pub fn cubify(scan: &Scan) -> Scan {
    let unit_cell = scan.unit_cell();
    if unit_cell.is_isotropic() {
        return scan.clone();
    }
    let factors = scaling_factors(unit_cell);
    let (z, h, w) = scan.shape();
    let shape = (
        scaled_len(z, factors[0]),
        scaled_len(h, factors[1]),
        scaled_len(w, factors[2]),
    );
    let coords = [
        centre_coords(0, shape.0, factors[0], 0.0),
        centre_coords(0, shape.1, factors[1], 0.0),
        centre_coords(0, shape.2, factors[2], 0.0),
    ];
    let voxels = resample_separable(
        scan.voxels().view(),
        [&coords[0][..], &coords[1][..], &coords[2][..]],
    );
    debug!(
        "cubify `{}`: {:?} -> {shape:?}, factors {factors:?}",
        scan.patient_id(),
        scan.shape()
    );

    let nodules = scan
        .nodules()
        .iter()
        .map(|n| rescale_nodule(n, factors, shape))
        .collect();
    Scan::new(
        scan.patient_id(),
        voxels,
        UnitCell::cubic(unit_cell.min_step()),
        nodules,
    )
}

/// 压缩掩膜插值前在每个方向两侧补零的宽度. 不小于样条支撑半径,
/// 使包围盒外的采样点只看到背景.
const NODULE_PAD: usize = 2;

/// 按缩放因子 `factors` 重采样结节, `grid` 为新体素网格的形状.
///
/// 候选包围盒为 `floor(origin * f) .. ceil((origin + dim) * f)`, 并裁剪到网格内.
/// 压缩掩膜四周补零后, 在候选包围盒各体素中心对应的坐标处插值, 以 `> 0.5` 二值化,
/// 最后重新压缩到最小包围盒.
///
/// # 注意
///
/// 结节在重采样后可能没有任何体素, 此时输出警告, 并以全为 `false` 的候选包围盒保留该结节.
pub fn rescale_nodule(nodule: &Nodule, factors: [f64; 3], grid: Idx3d) -> Nodule {
    let origin = [nodule.origin().0, nodule.origin().1, nodule.origin().2];
    let dims = [nodule.shape().0, nodule.shape().1, nodule.shape().2];
    let grid = [grid.0, grid.1, grid.2];

    let mut starts = [0usize; 3];
    let mut coords: [Vec<f64>; 3] = Default::default();
    for k in 0..3 {
        let f = factors[k];
        let end = (((origin[k] + dims[k]) as f64 * f).ceil() as usize).min(grid[k]);
        let start = ((origin[k] as f64 * f).floor() as usize).min(end.saturating_sub(1));
        starts[k] = start;
        let offset = origin[k] as f64 - NODULE_PAD as f64;
        coords[k] = centre_coords(start, end - start, f, offset);
    }

    let p = NODULE_PAD;
    let mut weights: Array3<f32> =
        Array3::zeros((dims[0] + 2 * p, dims[1] + 2 * p, dims[2] + 2 * p));
    Zip::from(weights.slice_mut(s![p..p + dims[0], p..p + dims[1], p..p + dims[2]]))
        .and(nodule.mask())
        .for_each(|w, &v| *w = if v { 1.0 } else { 0.0 });
    let mask = resample_separable(
        weights.view(),
        [&coords[0][..], &coords[1][..], &coords[2][..]],
    )
    .mapv(|v| v > 0.5);

    let (origin, mask) = match compress_mask(mask.view()) {
        Ok(((z, h, w), cropped)) => ((starts[0] + z, starts[1] + h, starts[2] + w), cropped),
        Err(_) => {
            warn!("nodule `{}` vanished after rescaling", nodule.id());
            ((starts[0], starts[1], starts[2]), mask)
        }
    };
    let rescaled = Nodule::new(
        nodule.id(),
        nodule.characteristics().clone(),
        origin,
        mask,
    );
    debug_assert!(
        rescaled.fits_in((grid[0], grid[1], grid[2])),
        "rescaled nodule `{}` exceeds grid",
        rescaled.id()
    );
    rescaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phantom;
    use ndarray::s;
    use std::collections::BTreeMap;

    #[test]
    fn test_scaling_factors() {
        let f = scaling_factors(UnitCell::new([2.5, 0.5, 0.5]).unwrap());
        assert_eq!(f, [5.0, 1.0, 1.0]);
        let f = scaling_factors(UnitCell::new([1.0, 2.0, 4.0]).unwrap());
        assert_eq!(f, [1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_scaled_len() {
        assert_eq!(scaled_len(3, 1.5), 5);
        assert_eq!(scaled_len(3, 1.4), 4);
        assert_eq!(scaled_len(0, 2.0), 1);
    }

    #[test]
    fn test_cubify_isotropic_is_identity() {
        let scan = phantom::chest_with(UnitCell::cubic(0.7));
        let cubic = cubify(&scan);
        assert_eq!(cubic.shape(), scan.shape());
        assert_eq!(cubic.voxels(), scan.voxels());
        assert_eq!(cubic.nodules(), scan.nodules());
        assert_eq!(cubic.unit_cell(), scan.unit_cell());
    }

    #[test]
    fn test_cubify_anisotropic() {
        let scan = phantom::chest_with(UnitCell::new([2.0, 1.0, 1.0]).unwrap());
        let cubic = cubify(&scan);
        assert_eq!(cubic.shape(), (24, 32, 32));
        assert_eq!(cubic.unit_cell(), UnitCell::cubic(1.0));
        assert_eq!(cubic.patient_id(), "phantom");

        let nodule = &cubic.nodules()[0];
        assert_eq!(nodule.origin(), (12, 14, 14));
        assert_eq!(nodule.shape(), (4, 3, 3));
        assert!(nodule.mask().iter().all(|v| *v));
        assert_eq!(nodule.characteristic("malignancy"), Some(3));

        // 包围盒与新网格对齐.
        let full = nodule.full_mask(cubic.shape());
        assert_eq!(&full.slice(s![12..16, 14..17, 14..17]), nodule.mask());

        // 沿 z 为常值的位置没有振铃, 肺内位置允许少量振铃.
        assert!((cubic[(10, 4, 4)] - phantom::TISSUE).abs() < 1e-3);
        assert!((cubic[(10, 16, 10)] - phantom::LUNG).abs() < 25.0);
    }

    #[test]
    fn test_cubify_constant_volume() {
        let voxels = Array3::from_elem((3, 5, 4), -300.0f32);
        let scan = Scan::new(
            "flat",
            voxels,
            UnitCell::new([3.0, 1.0, 1.5]).unwrap(),
            vec![],
        );
        let cubic = cubify(&scan);
        assert_eq!(cubic.shape(), (9, 5, 6));
        assert!(cubic.voxels().iter().all(|v| (v + 300.0).abs() < 1e-2));
    }

    #[test]
    fn test_rescale_nodule_clamped() {
        let nodule = Nodule::new(
            "edge",
            BTreeMap::new(),
            (2, 0, 0),
            Array3::from_elem((1, 2, 2), true),
        );
        // z: 3 -> round(4.2) = 4, 候选包围盒 floor(2.8) .. ceil(4.2) 裁剪为 2 .. 4.
        // 原体素缩放后为 [2.8, 4.2), 只有体素 3 的中心 3.5 落在其中.
        let rescaled = rescale_nodule(&nodule, [1.4, 1.0, 1.0], (4, 2, 2));
        assert_eq!(rescaled.origin(), (3, 0, 0));
        assert_eq!(rescaled.shape(), (1, 2, 2));
        assert!(rescaled.fits_in((4, 2, 2)));
        assert!(rescaled.mask().iter().all(|v| *v));
    }

    #[test]
    fn test_rescale_single_voxel_does_not_inflate() {
        let nodule = Nodule::new(
            "dot",
            BTreeMap::new(),
            (2, 0, 0),
            Array3::from_elem((1, 1, 1), true),
        );
        // 缩放范围为 [2.8, 4.2), 只有体素 3 的中心 3.5 落在其中.
        let rescaled = rescale_nodule(&nodule, [1.4, 1.0, 1.0], (5, 1, 1));
        assert_eq!(rescaled.voxel_count(), 1);
        assert_eq!(rescaled.origin(), (3, 0, 0));
        assert_eq!(rescaled.shape(), (1, 1, 1));
    }

    #[test]
    fn test_rescale_solid_nodule_volume() {
        // 3x3x3 实心结节, z 方向放大 2 倍后为 6x3x3, 包围盒外不被填充.
        let nodule = Nodule::new(
            "cube",
            BTreeMap::new(),
            (1, 1, 1),
            Array3::from_elem((3, 3, 3), true),
        );
        let rescaled = rescale_nodule(&nodule, [2.0, 1.0, 1.0], (10, 5, 5));
        assert_eq!(rescaled.origin(), (2, 1, 1));
        assert_eq!(rescaled.shape(), (6, 3, 3));
        assert_eq!(rescaled.voxel_count(), 6 * 3 * 3);
    }

    #[test]
    fn test_rescale_nodule_stays_inside() {
        let scan = phantom::chest_with(UnitCell::new([2.5, 0.75, 0.75]).unwrap());
        let cubic = cubify(&scan);
        for nodule in cubic.nodules() {
            assert!(nodule.fits_in(cubic.shape()));
            assert!(nodule.voxel_count() > 0);
        }
    }
}
