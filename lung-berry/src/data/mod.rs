use std::ops::Index;
use std::path::Path;

use log::debug;
use ndarray::{Array3, ArrayView2, Axis};
use nifti::{IntoNdArray, NiftiObject, ReaderOptions};
use thiserror::Error;

use crate::{Idx2d, Idx3d};

mod nodule;

pub use nodule::{compress_mask, place_mask, Nodule};

/// 体素分辨率 (毫米), 顺序为 `(z, h, w)`. 三个分量都严格为正且有限.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UnitCell([f64; 3]);

impl UnitCell {
    /// 构建体素分辨率. 存在非正或非有限分量时返回 `None`.
    pub fn new(spacing: [f64; 3]) -> Option<UnitCell> {
        spacing
            .iter()
            .all(|s| s.is_finite() && *s > 0.0)
            .then_some(Self(spacing))
    }

    /// 三个方向均为 `step` 的各向同性分辨率.
    ///
    /// # 注意
    ///
    /// `step` 必须严格为正且有限, 否则 panic.
    pub fn cubic(step: f64) -> UnitCell {
        assert!(step.is_finite() && step > 0.0, "invalid voxel step: {step}");
        Self([step; 3])
    }

    /// 以数组形式获取分辨率.
    #[inline]
    pub fn as_array(&self) -> [f64; 3] {
        self.0
    }

    /// 三个方向中最小的分辨率.
    #[inline]
    pub fn min_step(&self) -> f64 {
        self.0.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    pub fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.0;
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    pub fn voxel(&self) -> f64 {
        self.0.iter().product()
    }
}

impl Index<usize> for UnitCell {
    type Output = f64;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

/// 打开 nifti 扫描文件时的错误.
#[derive(Debug, Error)]
pub enum OpenScanError {
    /// nifti 解析错误.
    #[error(transparent)]
    Nifti(#[from] nifti::NiftiError),

    /// 数据不是三维体.
    #[error("expected a 3D volume, found {0} dimensions")]
    NotVolume(usize),

    /// header 中的体素分辨率非法.
    #[error("invalid voxel spacing {0:?}")]
    InvalidSpacing([f64; 3]),
}

/// 3D 胸部 CT 扫描, 包括 HU 体素数据, 体素分辨率和结节标注.
///
/// 核心流程不会原地修改扫描; 重采样总是返回新的实例.
#[derive(Debug, Clone)]
pub struct Scan {
    patient_id: String,
    voxels: Array3<f32>,
    unit_cell: UnitCell,
    nodules: Vec<Nodule>,
}

impl Index<Idx3d> for Scan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.voxels[index]
    }
}

impl Scan {
    /// 构建扫描.
    ///
    /// # 注意
    ///
    /// 每个结节的包围盒都必须完全位于体素网格内, 否则 panic.
    pub fn new(
        patient_id: impl Into<String>,
        voxels: Array3<f32>,
        unit_cell: UnitCell,
        nodules: Vec<Nodule>,
    ) -> Self {
        let shape = voxels.dim();
        for nodule in nodules.iter() {
            assert!(
                nodule.fits_in(shape),
                "nodule `{}` at {:?} with shape {:?} exceeds grid {:?}",
                nodule.id(),
                nodule.origin(),
                nodule.shape(),
                shape
            );
        }
        Self {
            patient_id: patient_id.into(),
            voxels,
            unit_cell,
            nodules,
        }
    }

    /// 打开 nii 文件格式的 3D CT 扫描. `path` 为 nii 文件的本地路径.
    /// 体素分辨率取自 header. 返回的扫描不含结节, 可以通过 [`Self::with_nodules`] 添加.
    pub fn open_nifti<P: AsRef<Path>>(
        path: P,
        patient_id: impl Into<String>,
    ) -> Result<Self, OpenScanError> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let [_, w_mm, h_mm, z_mm, ..] = obj.header().pixdim;
        let spacing = [z_mm as f64, h_mm as f64, w_mm as f64];
        let unit_cell = UnitCell::new(spacing).ok_or(OpenScanError::InvalidSpacing(spacing))?;

        // [W, H, z] -> [z, H, W].
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .permuted_axes([2, 1, 0].as_slice());
        let &[z, h, w] = data.shape() else {
            return Err(OpenScanError::NotVolume(data.ndim()));
        };

        // 按逻辑顺序收集, 与底层存储布局无关.
        let voxels = Array3::from_shape_vec((z, h, w), data.iter().copied().collect())
            .map_err(|_| OpenScanError::NotVolume(3))?;
        let patient_id = patient_id.into();
        debug!(
            "opened scan `{patient_id}` with shape {:?} and spacing {spacing:?}",
            voxels.dim()
        );
        Ok(Self::new(patient_id, voxels, unit_cell, vec![]))
    }

    /// 替换结节标注. 与 [`Self::new`] 一样检查结节是否位于网格内.
    pub fn with_nodules(self, nodules: Vec<Nodule>) -> Self {
        Self::new(self.patient_id, self.voxels, self.unit_cell, nodules)
    }

    /// 患者/扫描编号.
    #[inline]
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// 体素数据 (HU).
    #[inline]
    pub fn voxels(&self) -> &Array3<f32> {
        &self.voxels
    }

    /// 体素分辨率.
    #[inline]
    pub fn unit_cell(&self) -> UnitCell {
        self.unit_cell
    }

    /// 结节标注.
    #[inline]
    pub fn nodules(&self) -> &[Nodule] {
        &self.nodules
    }

    /// 获取数据形状大小.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.voxels.dim()
    }

    /// 获取数据水平切片形状大小.
    #[inline]
    pub fn slice_shape(&self) -> Idx2d {
        let (_, h, w) = self.shape();
        (h, w)
    }

    /// 获取水平切片个数.
    #[inline]
    pub fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    pub fn size(&self) -> usize {
        self.voxels.len()
    }

    /// 检查索引是否合法.
    #[inline]
    pub fn check(&self, pos: &Idx3d) -> bool {
        check(self.shape(), pos)
    }

    /// 获取第 `z` 个水平切片.
    ///
    /// # 注意
    ///
    /// `z` 越界时 panic.
    #[inline]
    pub fn slice_at(&self, z: usize) -> ArrayView2<f32> {
        self.voxels.index_axis(Axis(0), z)
    }
}

/// 检查索引 `pos` 在形状 `shape` 下是否合法.
#[inline]
pub(crate) fn check((z, h, w): Idx3d, (z0, h0, w0): &Idx3d) -> bool {
    *z0 < z && *h0 < h && *w0 < w
}

/// 获取 `pos` 前后上下左右六个点的坐标.
///
/// 在数据范围外的坐标会被过滤掉.
#[inline]
pub(crate) fn diamond_neighbours(shape: Idx3d, (z, h, w): Idx3d) -> impl Iterator<Item = Idx3d> {
    [
        (z.wrapping_sub(1), h, w),
        (z.saturating_add(1), h, w),
        (z, h.wrapping_sub(1), w),
        (z, h.saturating_add(1), w),
        (z, h, w.wrapping_sub(1)),
        (z, h, w.saturating_add(1)),
    ]
    .into_iter()
    .filter(move |p| check(shape, p))
}

/// 获取 `pos` 周围 26 个点 (含棱和角方向) 的坐标.
///
/// 在数据范围外的坐标会被过滤掉.
#[inline]
pub(crate) fn cube_neighbours(shape: Idx3d, (z, h, w): Idx3d) -> impl Iterator<Item = Idx3d> {
    (0..27usize)
        .filter(|&k| k != 13)
        .map(move |k| {
            (
                (z + k / 9).wrapping_sub(1),
                (h + k / 3 % 3).wrapping_sub(1),
                (w + k % 3).wrapping_sub(1),
            )
        })
        .filter(move |p| check(shape, p))
}

/// 行优先线性索引.
#[inline]
pub(crate) fn linear((_, h, w): Idx3d, (z0, h0, w0): Idx3d) -> usize {
    (z0 * h + h0) * w + w0
}

/// [`linear`] 的逆运算.
#[inline]
pub(crate) fn unravel((_, h, w): Idx3d, i: usize) -> Idx3d {
    (i / (h * w), (i / w) % h, i % w)
}
