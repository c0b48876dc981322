//! 运行时错误.

use std::fmt::{self, Formatter};

use thiserror::Error;

use crate::Idx3d;

/// 流水线阶段. 用于在退化输入错误中指明出错位置.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// 体部包络分割.
    BodySegmentation,

    /// 肺部包络分割.
    LungSegmentation,

    /// 肺内空气阈值估计.
    LungThreshold,

    /// 气管顶部 (种子切片) 搜索.
    SeedSearch,

    /// 距离场外推.
    Extrapolation,

    /// 特征提取.
    Featurization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::BodySegmentation => "body segmentation",
            Stage::LungSegmentation => "lung segmentation",
            Stage::LungThreshold => "lung threshold",
            Stage::SeedSearch => "seed search",
            Stage::Extrapolation => "distance extrapolation",
            Stage::Featurization => "featurization",
        };
        f.write_str(name)
    }
}

/// 分割 / 距离场 / 特征提取的运行时错误.
///
/// 这里只包含由输入数据导致的退化情况. 几何不变量被破坏属于程序缺陷,
/// 不以错误形式返回.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SegmentError {
    /// 去除边缘区域后不存在任何连通区域.
    #[error("{stage}: no connected component left after border clearing")]
    EmptySegmentation {
        /// 出错阶段.
        stage: Stage,
    },

    /// 掩膜或数据中没有可用内容.
    #[error("{stage}: no content")]
    NoContent {
        /// 出错阶段.
        stage: Stage,
    },

    /// 掩膜全为背景, 包围盒没有定义.
    #[error("mask has no foreground voxel, bounding box is undefined")]
    EmptyMask,

    /// 两个本应一致的三维形状不一致.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 期望形状.
        expected: Idx3d,
        /// 实际形状.
        found: Idx3d,
    },

    /// 注册表中不存在该名称的特征提取器.
    #[error("unknown featurizer `{0}`")]
    UnknownFeaturizer(String),
}

impl SegmentError {
    /// 错误是否由退化的扫描数据引起 (而不是调用方式错误).
    pub fn is_degenerate_input(&self) -> bool {
        matches!(
            self,
            SegmentError::EmptySegmentation { .. }
                | SegmentError::NoContent { .. }
                | SegmentError::EmptyMask
        )
    }

    /// 获取出错阶段 (若有).
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SegmentError::EmptySegmentation { stage } | SegmentError::NoContent { stage } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// 分割 / 距离场 / 特征提取运行时结果.
pub type SegmentResult<T> = Result<T, SegmentError>;

#[cfg(test)]
mod tests {
    use super::{SegmentError, Stage};

    #[test]
    fn test_error_names_stage() {
        let e = SegmentError::NoContent {
            stage: Stage::SeedSearch,
        };
        assert_eq!(e.stage(), Some(Stage::SeedSearch));
        assert!(e.is_degenerate_input());
        assert_eq!(e.to_string(), "seed search: no content");

        let e = SegmentError::ShapeMismatch {
            expected: (1, 2, 3),
            found: (3, 2, 1),
        };
        assert_eq!(e.stage(), None);
        assert!(!e.is_degenerate_input());
    }
}
