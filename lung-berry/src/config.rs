//! 流水线配置.
//!
//! 默认值即针对 Hounsfield 单位标定的常量, 详见 [`crate::consts::hu`].

use crate::consts::{hu, OTSU_BINS};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 肺部阈值的合理区间及回退值.
///
/// 自动阈值必须严格位于 `(lower, upper)` 内, 否则使用 `fallback`.
/// 该区间是只读的. 若要修改参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdBand {
    lower: f32,
    upper: f32,
    fallback: f32,
}

impl ThresholdBand {
    /// 构建阈值区间.
    ///
    /// 三个值都必须有限, 且 `lower < upper`, 否则返回 `None`.
    /// `fallback` 不要求位于区间内.
    pub fn new(lower: f32, upper: f32, fallback: f32) -> Option<ThresholdBand> {
        if lower.is_finite() && upper.is_finite() && fallback.is_finite() && lower < upper {
            Some(Self {
                lower,
                upper,
                fallback,
            })
        } else {
            None
        }
    }

    /// 针对 Hounsfield 单位标定的区间: `(-1000, 0)`, 回退值 -500.
    #[inline]
    pub const fn hounsfield() -> ThresholdBand {
        Self {
            lower: hu::AIR,
            upper: hu::WATER,
            fallback: hu::LUNG_FALLBACK,
        }
    }

    /// 区间下限 (不含).
    #[inline]
    pub fn lower(&self) -> f32 {
        self.lower
    }

    /// 区间上限 (不含).
    #[inline]
    pub fn upper(&self) -> f32 {
        self.upper
    }

    /// 回退值.
    #[inline]
    pub fn fallback(&self) -> f32 {
        self.fallback
    }

    /// `t` 是否严格位于区间内. NaN 不在任何区间内.
    #[inline]
    pub fn contains(&self, t: f32) -> bool {
        self.lower < t && t < self.upper
    }
}

impl Default for ThresholdBand {
    fn default() -> Self {
        Self::hounsfield()
    }
}

/// 体部分割配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BodyConfig {
    /// 不小于该值的体素视为体部前景.
    pub threshold: f32,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self { threshold: hu::BODY }
    }
}

/// 肺部分割配置.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LungConfig {
    /// 逐切片圆盘平滑半径 (体素). 0 表示不平滑.
    pub smoothing_radius: usize,
}

/// 完整流水线配置.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// 肺部阈值区间.
    pub threshold: ThresholdBand,

    /// 体部分割.
    pub body: BodyConfig,

    /// 肺部分割.
    pub lung: LungConfig,

    /// Otsu 直方图箱数.
    pub otsu_bins: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdBand::default(),
            body: BodyConfig::default(),
            lung: LungConfig::default(),
            otsu_bins: OTSU_BINS,
        }
    }
}

#[cfg(feature = "serde")]
impl PipelineConfig {
    /// 从 TOML 文本读取配置. 缺失的字段取默认值.
    ///
    /// # 注意
    ///
    /// 阈值区间整体给出时不会再经过 [`ThresholdBand::new`] 的校验,
    /// 非法区间会被当作反序列化错误拒绝.
    pub fn from_toml_str(s: &str) -> Result<PipelineConfig, toml::de::Error> {
        let cfg: PipelineConfig = toml::from_str(s)?;
        let band = cfg.threshold;
        if ThresholdBand::new(band.lower, band.upper, band.fallback).is_none() {
            return Err(serde::de::Error::custom(format!(
                "invalid threshold band: {band:?}"
            )));
        }
        if cfg.otsu_bins == 0 {
            return Err(serde::de::Error::custom("otsu_bins must be positive"));
        }
        Ok(cfg)
    }
}
