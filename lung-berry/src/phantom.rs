//! 测试用合成胸部扫描.

use std::collections::BTreeMap;

use ndarray::{s, Array3};

use crate::{Nodule, Scan, UnitCell};

/// 合成扫描形状.
pub(crate) const SHAPE: (usize, usize, usize) = (12, 32, 32);

/// 体外空气.
pub(crate) const OUTSIDE: f32 = -1000.0;

/// 软组织.
pub(crate) const TISSUE: f32 = 40.0;

/// 肺内空气.
pub(crate) const LUNG: f32 = -850.0;

/// 构建合成胸部扫描, 体素分辨率为 `unit_cell`.
///
/// 体部为 `h, w ∈ [2, 30)` 的软组织柱, 肺为 `z ∈ [1, 11), h, w ∈ [6, 26)` 的空气块,
/// 结节为肺内 `[6, 8) x [14, 17) x [14, 17)` 的软组织块.
pub(crate) fn chest_with(unit_cell: UnitCell) -> Scan {
    let mut voxels = Array3::from_elem(SHAPE, OUTSIDE);
    voxels.slice_mut(s![.., 2..30, 2..30]).fill(TISSUE);
    voxels.slice_mut(s![1..11, 6..26, 6..26]).fill(LUNG);
    voxels.slice_mut(s![6..8, 14..17, 14..17]).fill(TISSUE);

    let characteristics: BTreeMap<String, i32> = [
        ("malignancy".to_string(), 3),
        ("subtlety".to_string(), 5),
    ]
    .into_iter()
    .collect();
    let nodule = Nodule::new(
        "phantom-1",
        characteristics,
        (6, 14, 14),
        Array3::from_elem((2, 3, 3), true),
    );
    Scan::new("phantom", voxels, unit_cell, vec![nodule])
}

/// 体素分辨率为 1 毫米的合成胸部扫描.
pub(crate) fn chest() -> Scan {
    chest_with(UnitCell::cubic(1.0))
}
