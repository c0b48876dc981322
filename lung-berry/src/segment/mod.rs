//! 体部与肺部分割.
//!
//! 两者都由阈值化得到前景, 再经 [`envelope::extract_envelope`] 得到无内部空洞的包络.

use log::debug;

use crate::config::PipelineConfig;
use crate::error::{SegmentResult, Stage};
use crate::{BinaryMask, Scan};

pub mod envelope;
pub mod smooth;
pub mod threshold;

pub use envelope::{close_envelope, dominant_component, extract_envelope, Labels};
pub use threshold::{filler_value, foreground, lung_threshold, otsu_threshold};

/// 获取体部包络.
///
/// 不小于 `cfg.body.threshold` 的体素视为前景, 取最大连通区域并填充内部空洞.
pub fn segment_body(scan: &Scan, cfg: &PipelineConfig) -> SegmentResult<BinaryMask> {
    let fg = foreground(scan.voxels().view(), cfg.body.threshold);
    let envelope = extract_envelope(fg.view(), Stage::BodySegmentation)?;
    debug!(
        "body envelope of `{}`: {} voxels",
        scan.patient_id(),
        envelope.iter().filter(|v| **v).count()
    );
    Ok(envelope)
}

/// 获取肺部包络 (包含肺内空气和肺内结构).
///
/// 低于自动阈值的体素视为空气. 取不触碰水平边缘的最大空气区域,
/// 可选地逐切片圆盘平滑, 并填充内部空洞.
pub fn segment_lungs(scan: &Scan, cfg: &PipelineConfig) -> SegmentResult<BinaryMask> {
    let voxels = scan.voxels().view();
    let t = lung_threshold(voxels, &cfg.threshold, cfg.otsu_bins);
    // `!(v >= t)` 同时将 NaN 视为空气.
    let air = voxels.mapv(|v| !(v >= t));
    let mut lungs = dominant_component(air.view(), Stage::LungSegmentation)?;
    drop(air);

    let radius = cfg.lung.smoothing_radius;
    if radius > 0 {
        lungs = smooth::dilate_slices(lungs.view(), radius);
    }
    let mut envelope = close_envelope(lungs.view());
    if radius > 0 {
        envelope = smooth::erode_slices(envelope.view(), radius);
    }
    debug!(
        "lung envelope of `{}`: threshold {t}, {} voxels",
        scan.patient_id(),
        envelope.iter().filter(|v| **v).count()
    );
    Ok(envelope)
}
