//! 结节标注及其压缩存储.

use std::collections::BTreeMap;

use ndarray::{s, Array3, ArrayView3, Zip};

use crate::error::{SegmentError, SegmentResult};
use crate::{BinaryMask, Idx3d};

/// 结节标注.
///
/// 掩膜以包围盒裁剪后的形式保存, `origin` 为包围盒在原体素网格中的起点.
/// 对于 `shape` 形状的完整网格, 满足
/// `full[origin .. origin + mask.shape] == mask`, 其余位置全为 `false`.
///
/// 放射科医师评估的属性保存在 `characteristics` 中. 不存在的属性视为缺失, 而不是 0.
#[derive(Debug, Clone, PartialEq)]
pub struct Nodule {
    id: String,
    characteristics: BTreeMap<String, i32>,
    origin: Idx3d,
    mask: BinaryMask,
}

impl Nodule {
    /// 以已压缩的掩膜构建结节.
    ///
    /// # 注意
    ///
    /// `mask` 的每一维长度都必须不小于 1, 否则 panic.
    pub fn new(
        id: impl Into<String>,
        characteristics: BTreeMap<String, i32>,
        origin: Idx3d,
        mask: BinaryMask,
    ) -> Self {
        let (z, h, w) = mask.dim();
        assert!(z > 0 && h > 0 && w > 0, "nodule mask has zero extent");
        Self {
            id: id.into(),
            characteristics,
            origin,
            mask,
        }
    }

    /// 以完整网格上的掩膜构建结节. 掩膜会被压缩到最小包围盒.
    ///
    /// 掩膜全为 `false` 时返回 [`SegmentError::EmptyMask`].
    pub fn from_full_mask(
        id: impl Into<String>,
        characteristics: BTreeMap<String, i32>,
        full: ArrayView3<bool>,
    ) -> SegmentResult<Self> {
        let (origin, mask) = compress_mask(full)?;
        Ok(Self::new(id, characteristics, origin, mask))
    }

    /// 结节编号.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 全部属性.
    #[inline]
    pub fn characteristics(&self) -> &BTreeMap<String, i32> {
        &self.characteristics
    }

    /// 获取名为 `name` 的属性. 缺失时返回 `None`.
    #[inline]
    pub fn characteristic(&self, name: &str) -> Option<i32> {
        self.characteristics.get(name).copied()
    }

    /// 包围盒起点.
    #[inline]
    pub fn origin(&self) -> Idx3d {
        self.origin
    }

    /// 压缩后的掩膜.
    #[inline]
    pub fn mask(&self) -> &BinaryMask {
        &self.mask
    }

    /// 包围盒形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.mask.dim()
    }

    /// 包围盒终点 (不含).
    #[inline]
    pub fn end(&self) -> Idx3d {
        let (z, h, w) = self.origin;
        let (dz, dh, dw) = self.shape();
        (z + dz, h + dh, w + dw)
    }

    /// 包围盒是否完全位于 `shape` 形状的网格内.
    #[inline]
    pub fn fits_in(&self, (z, h, w): Idx3d) -> bool {
        let (ez, eh, ew) = self.end();
        ez <= z && eh <= h && ew <= w
    }

    /// 结节体素个数.
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.mask.iter().filter(|v| **v).count()
    }

    /// 获取结节在 `shape` 形状的完整网格上的掩膜.
    ///
    /// # 注意
    ///
    /// 结节包围盒超出网格时 panic.
    #[inline]
    pub fn full_mask(&self, shape: Idx3d) -> BinaryMask {
        place_mask(self.origin, self.mask.view(), shape)
    }

    /// 以行优先规则获取结节所有体素在完整网格上的索引.
    pub fn positions(&self) -> impl Iterator<Item = Idx3d> + '_ {
        let (z0, h0, w0) = self.origin;
        self.mask
            .indexed_iter()
            .filter_map(move |((z, h, w), &v)| v.then_some((z0 + z, h0 + h, w0 + w)))
    }
}

/// 将掩膜压缩到最小包围盒.
///
/// # 返回值
///
/// `(包围盒起点, 裁剪后的掩膜)`. 裁剪后的掩膜每一维长度都不小于 1.
/// 掩膜全为 `false` 时返回 [`SegmentError::EmptyMask`].
pub fn compress_mask(full: ArrayView3<bool>) -> SegmentResult<(Idx3d, BinaryMask)> {
    let mut lo = [usize::MAX; 3];
    let mut hi = [0usize; 3];
    let mut any = false;
    for ((z, h, w), _) in full.indexed_iter().filter(|(_, v)| **v) {
        any = true;
        for (k, p) in [z, h, w].into_iter().enumerate() {
            lo[k] = lo[k].min(p);
            hi[k] = hi[k].max(p);
        }
    }
    if !any {
        return Err(SegmentError::EmptyMask);
    }
    let cropped = full
        .slice(s![lo[0]..=hi[0], lo[1]..=hi[1], lo[2]..=hi[2]])
        .to_owned();
    Ok(((lo[0], lo[1], lo[2]), cropped))
}

/// 将压缩掩膜放回 `shape` 形状的完整网格. [`compress_mask`] 的逆运算.
///
/// # 注意
///
/// `origin + mask.shape` 超出 `shape` 时 panic.
pub fn place_mask(origin: Idx3d, mask: ArrayView3<bool>, shape: Idx3d) -> BinaryMask {
    let (z, h, w) = origin;
    let (dz, dh, dw) = mask.dim();
    assert!(
        z + dz <= shape.0 && h + dh <= shape.1 && w + dw <= shape.2,
        "mask at {origin:?} with shape {:?} exceeds grid {shape:?}",
        mask.dim()
    );
    let mut full = Array3::from_elem(shape, false);
    Zip::from(full.slice_mut(s![z..z + dz, h..h + dh, w..w + dw]))
        .and(&mask)
        .for_each(|d, &v| *d = v);
    full
}
