//! 通用常量.

/// Hounsfield 单位 (HU) 下的标定常量.
///
/// 这些值针对单一扫描仪强度约定标定. 数据换用其它强度约定时,
/// 应通过 [`crate::config`] 修改, 而不是改动这里.
pub mod hu {
    /// 空气的典型 HU 值. 自动阈值必须严格大于它.
    pub const AIR: f32 = -1000.0;

    /// 水的 HU 值. 自动阈值必须严格小于它.
    pub const WATER: f32 = 0.0;

    /// 自动阈值落在合理区间外时使用的肺部阈值.
    pub const LUNG_FALLBACK: f32 = -500.0;

    /// 体部前景阈值 (肺组织的下限).
    pub const BODY: f32 = -700.0;
}

/// Otsu 直方图的默认箱数.
pub const OTSU_BINS: usize = 256;

/// 放射科医师评估的结节属性名称. 顺序即特征表的列顺序.
pub const CHARACTERISTICS: [&str; 9] = [
    "subtlety",
    "internalStructure",
    "calcification",
    "sphericity",
    "margin",
    "lobulation",
    "spiculation",
    "texture",
    "malignancy",
];
