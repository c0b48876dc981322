#![warn(missing_docs)]

//! 核心库. 从胸部 CT 扫描中提取肺部/体部包络, 计算从气管顶部出发、
//! 穿过肺内空气的测地距离场, 并在裁剪和各向异性重采样下维护结节区域与体素网格的对齐.
//!
//! # 坐标约定
//!
//! 所有三维数据均以 `(z, h, w)` 顺序访问. `z` 是沿身体长轴的方向
//! (`z = 0` 为头侧), `h` 和 `w` 是水平切片内的两个方向.
//! 从 nifti 文件读入的 `[W, H, z]` 数据会在加载时转换为该模式.
//!
//! # 流水线
//!
//! 1. 阈值化: 识别填充值, 以 Otsu 方法求空气/组织阈值, 并检查阈值是否落在合理区间内.
//!   实现位于 `lung-berry/src/segment/threshold.rs`.
//! 2. 包络提取: 6-邻接连通区域标记, 清除触碰水平边缘的区域, 选取最大区域并填充内部空洞.
//!   实现位于 `lung-berry/src/segment/envelope.rs`.
//! 3. 气管距离场: 以肺内体素中位数为阈值建立障碍, 以首个含肺切片为种子,
//!   通过 fast marching 求解 Eikonal 方程, 再以最近已解体素外推未解体素.
//!   实现位于 `lung-berry/src/distance`.
//! 4. 结节压缩与立方化重采样. 实现位于 `lung-berry/src/data/nodule.rs` 和
//!   `lung-berry/src/resample`.
//! 5. 特征提取注册表. 实现位于 `lung-berry/src/featurize`.
//!
//! # 注意
//!
//! 1. 退化输入 (空分割, 无内容的种子搜索) 以 [`SegmentError`] 返回, 不会静默产生空结果.
//! 2. 阈值超出合理区间时回退到配置中的固定值, 并通过 `log` 输出警告.
//! 3. 几何不变量被破坏属于程序缺陷, 以断言处理.

/// 三维索引 `(z, h, w)`, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

/// 二维索引 `(h, w)`.
pub type Idx2d = (usize, usize);

/// 与某个体素网格 (或其裁剪子区域) 形状一致的三维二值掩膜.
pub type BinaryMask = ndarray::Array3<bool>;

mod data;
mod error;

pub mod config;
pub mod consts;
pub mod distance;
pub mod featurize;
pub mod prelude;
pub mod resample;
pub mod segment;

pub use config::PipelineConfig;
pub use data::{compress_mask, place_mask, Nodule, OpenScanError, Scan, UnitCell};
pub use distance::{tracheal_distance, DistanceField};
pub use error::{SegmentError, SegmentResult, Stage};
pub use resample::cubify;
pub use segment::{segment_body, segment_lungs};

#[cfg(test)]
pub(crate) mod phantom;
