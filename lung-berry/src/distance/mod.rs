//! 气管距离场.
//!
//! 以首个含肺切片 (气管顶部) 为初始波前, 在肺内空气中求解 Eikonal 方程,
//! 得到每个可达体素到气管顶部的测地距离. 不可达体素随后以最近已解体素的值外推.

use log::debug;
use ndarray::{Array3, ArrayView3, Axis, Zip};

use crate::error::{SegmentError, SegmentResult, Stage};
use crate::{Idx3d, Scan};

pub mod edt;
pub mod march;

pub use edt::{distance_transform_edt, feature_transform};
pub use march::fast_march;

/// 距离场: 旅行距离与求解掩膜两个平行数组.
///
/// 未解体素 (包络外, 或被障碍阻挡) 的值为 `f64::INFINITY`.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceField {
    values: Array3<f64>,
    solved: Array3<bool>,
}

impl DistanceField {
    /// 由旅行距离构建距离场. 有限值视为已解.
    pub fn new(values: Array3<f64>) -> Self {
        let solved = values.mapv(f64::is_finite);
        Self { values, solved }
    }

    /// 旅行距离.
    #[inline]
    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// 求解掩膜.
    #[inline]
    pub fn solved(&self) -> &Array3<bool> {
        &self.solved
    }

    /// 获取数据形状大小.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.values.dim()
    }

    /// 已解体素个数.
    #[inline]
    pub fn solved_count(&self) -> usize {
        self.solved.iter().filter(|v| **v).count()
    }

    /// 获取 `pos` 处的距离. 未解或越界时返回 `None`.
    #[inline]
    pub fn get(&self, pos: Idx3d) -> Option<f64> {
        match self.solved.get(pos) {
            Some(true) => Some(self.values[pos]),
            _ => None,
        }
    }

    /// 将每个未解体素填充为 (索引空间中) 欧氏距离最近的已解体素的值.
    ///
    /// 没有已解体素时返回 [`SegmentError::NoContent`].
    pub fn extrapolate(&self) -> SegmentResult<Array3<f64>> {
        let (_, nearest) = feature_transform(self.solved.view(), [1.0; 3]).ok_or(
            SegmentError::NoContent {
                stage: Stage::Extrapolation,
            },
        )?;
        // 逻辑 (行优先) 顺序, 与特征变换给出的线性索引一致.
        let flat: Vec<f64> = self.values.iter().copied().collect();
        Ok(nearest.mapv(|i| flat[i]))
    }
}

/// 肺内空气阈值: 包络内体素值的中位数. 个数为偶数时取中间两个值的平均.
///
/// 包络为空时返回 [`SegmentError::NoContent`].
pub fn lung_air_threshold(
    voxels: ArrayView3<f32>,
    envelope: ArrayView3<bool>,
) -> SegmentResult<f32> {
    let mut values: Vec<f32> = Zip::from(&voxels)
        .and(&envelope)
        .fold(Vec::new(), |mut acc, &v, &e| {
            if e {
                acc.push(v);
            }
            acc
        });
    if values.is_empty() {
        return Err(SegmentError::NoContent {
            stage: Stage::LungThreshold,
        });
    }
    values.sort_unstable_by(f32::total_cmp);
    let n = values.len();
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };
    Ok(median)
}

/// 气管顶部: 首个含包络体素的水平切片索引.
///
/// 包络为空时返回 [`SegmentError::NoContent`].
pub fn seed_slice(envelope: ArrayView3<bool>) -> SegmentResult<usize> {
    envelope
        .axis_iter(Axis(0))
        .position(|s| s.iter().any(|v| *v))
        .ok_or(SegmentError::NoContent {
            stage: Stage::SeedSearch,
        })
}

/// 初始波前标量场: 切片 `z <= seed` 为 -1, 其余为 +1.
pub fn seed_level(shape: Idx3d, seed: usize) -> Array3<f64> {
    Array3::from_shape_fn(shape, |(z, _, _)| if z <= seed { -1.0 } else { 1.0 })
}

/// 求气管距离场.
///
/// `lung_mask` 为肺部包络. 包络内体素值高于包络中位数的体素, 以及包络外的体素,
/// 都视为障碍. 波前从首个含包络切片出发, 按体素分辨率在可通过体素间传播.
///
/// # 注意
///
/// `lung_mask` 与扫描形状不一致时返回 [`SegmentError::ShapeMismatch`].
pub fn tracheal_distance(
    scan: &Scan,
    lung_mask: ArrayView3<bool>,
) -> SegmentResult<DistanceField> {
    if lung_mask.dim() != scan.shape() {
        return Err(SegmentError::ShapeMismatch {
            expected: scan.shape(),
            found: lung_mask.dim(),
        });
    }
    let seed = seed_slice(lung_mask)?;
    let voxels = scan.voxels().view();
    let t = lung_air_threshold(voxels, lung_mask)?;

    let mut passable = lung_mask.to_owned();
    Zip::from(&mut passable)
        .and(&voxels)
        .for_each(|p, &v| *p = *p && !(v > t));

    let level = seed_level(scan.shape(), seed);
    let values = fast_march(passable.view(), level.view(), scan.unit_cell().as_array());
    let field = DistanceField::new(values);
    debug!(
        "tracheal distance of `{}`: seed slice {seed}, air threshold {t}, {} voxels solved",
        scan.patient_id(),
        field.solved_count()
    );
    Ok(field)
}
