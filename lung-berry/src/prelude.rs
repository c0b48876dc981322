//! 🫁欢迎光临🫁
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{BinaryMask, Idx2d, Idx3d};

pub use crate::config::{BodyConfig, LungConfig, PipelineConfig, ThresholdBand};
pub use crate::data::{compress_mask, place_mask, Nodule, OpenScanError, Scan, UnitCell};
pub use crate::error::{SegmentError, SegmentResult, Stage};

pub use crate::consts::hu::{AIR, BODY, LUNG_FALLBACK, WATER};
pub use crate::consts::CHARACTERISTICS;

pub use crate::segment::{segment_body, segment_lungs};

pub use crate::distance::{distance_transform_edt, tracheal_distance, DistanceField};

pub use crate::resample::cubify;

pub use crate::featurize::{
    featurize_batch, featurize_scan, featurize_single, FeatureTable, FeaturizerRegistry,
    ScanReport,
};
