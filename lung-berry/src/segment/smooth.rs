//! 逐水平切片的圆盘形态学平滑.

use ndarray::{s, Array2, ArrayView2, ArrayView3, ArrayViewMut2, Axis, Zip};

use crate::BinaryMask;

/// 半径为 `radius` 的圆盘结构元, 以相对中心的偏移 `(dh, dw)` 表示.
fn disk_offsets(radius: usize) -> Vec<(isize, isize)> {
    let r = radius as isize;
    (-r..=r)
        .flat_map(|dh| (-r..=r).map(move |dw| (dh, dw)))
        .filter(|(dh, dw)| dh * dh + dw * dw <= r * r)
        .collect()
}

/// 平移 `offset` 后源与目标的重叠区间: `(源起点, 目标起点, 长度)`.
#[inline]
fn shift_range(offset: isize, size: usize) -> (usize, usize, usize) {
    let shift = offset.unsigned_abs();
    let len = size.saturating_sub(shift);
    if offset >= 0 {
        (0, shift, len)
    } else {
        (shift, 0, len)
    }
}

/// 以平移再取或的方式对单个切片做二值膨胀. 图像外视为背景.
fn dilate_slice(src: ArrayView2<bool>, mut dst: ArrayViewMut2<bool>, offsets: &[(isize, isize)]) {
    let (rows, cols) = src.dim();
    dst.fill(false);
    for &(dh, dw) in offsets {
        let (src_h, dst_h, h) = shift_range(dh, rows);
        let (src_w, dst_w, w) = shift_range(dw, cols);
        if h == 0 || w == 0 {
            continue;
        }
        Zip::from(dst.slice_mut(s![dst_h..dst_h + h, dst_w..dst_w + w]))
            .and(src.slice(s![src_h..src_h + h, src_w..src_w + w]))
            .for_each(|d, &v| *d |= v);
    }
}

/// 对每个水平切片以 `op` 处理, 可借助 `rayon` 并行.
fn map_slices<F>(mask: ArrayView3<bool>, op: F) -> BinaryMask
where
    F: Fn(ArrayView2<bool>, ArrayViewMut2<bool>) + Sync + Send,
{
    let mut out = BinaryMask::from_elem(mask.dim(), false);
    let zip = Zip::from(out.axis_iter_mut(Axis(0))).and(mask.axis_iter(Axis(0)));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|d, s| op(s, d));
        } else {
            zip.for_each(|d, s| op(s, d));
        }
    }
    out
}

/// 以半径为 `radius` 的圆盘逐切片膨胀. `radius == 0` 时返回原掩膜的拷贝.
pub fn dilate_slices(mask: ArrayView3<bool>, radius: usize) -> BinaryMask {
    let offsets = disk_offsets(radius);
    map_slices(mask, |s, d| dilate_slice(s, d, &offsets))
}

/// 以半径为 `radius` 的圆盘逐切片腐蚀. 图像外视为前景,
/// 因此触碰切片边缘的区域不会因边缘而被腐蚀.
pub fn erode_slices(mask: ArrayView3<bool>, radius: usize) -> BinaryMask {
    let offsets = disk_offsets(radius);
    map_slices(mask, |s, mut d| {
        let inverse: Array2<bool> = s.mapv(|v| !v);
        dilate_slice(inverse.view(), d.view_mut(), &offsets);
        d.mapv_inplace(|v| !v);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count(mask: &BinaryMask) -> usize {
        mask.iter().filter(|v| **v).count()
    }

    #[test]
    fn test_disk_offsets() {
        assert_eq!(disk_offsets(0), vec![(0, 0)]);
        assert_eq!(disk_offsets(1).len(), 5);
        // skimage.morphology.disk(2) 共 13 个点.
        assert_eq!(disk_offsets(2).len(), 13);
    }

    #[test]
    fn test_shift_range_out_of_bounds() {
        assert_eq!(shift_range(5, 3), (0, 5, 0));
        assert_eq!(shift_range(-1, 3), (1, 0, 2));
    }

    #[test]
    fn test_dilate_erode_single_voxel() {
        let mut mask = BinaryMask::from_elem((2, 9, 9), false);
        mask[(1, 4, 4)] = true;
        let dilated = dilate_slices(mask.view(), 2);
        assert_eq!(count(&dilated), 13);
        // 不跨切片.
        assert!(dilated.index_axis(Axis(0), 0).iter().all(|v| !*v));

        let eroded = erode_slices(dilated.view(), 2);
        assert_eq!(eroded, mask);
        assert_eq!(dilate_slices(mask.view(), 0), mask);
    }

    #[test]
    fn test_erode_border_is_foreground() {
        let mask = BinaryMask::from_elem((1, 5, 5), true);
        assert_eq!(erode_slices(mask.view(), 2), mask);
    }
}
