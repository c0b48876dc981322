//! 内置特征提取器. 每个提取器对扫描中的每个结节输出一行.

use std::f64::consts::PI;

use ndarray::Array3;

use super::stats::{summary_row, Summary};
use super::FeatureTable;
use crate::config::PipelineConfig;
use crate::consts::CHARACTERISTICS;
use crate::distance::{distance_transform_edt, tracheal_distance};
use crate::error::{SegmentError, SegmentResult, Stage};
use crate::segment::{segment_body, segment_lungs};
use crate::{Nodule, Scan};

/// 统计类特征的列名: `{min, mean, median, max}_{name}`.
fn summary_columns(name: &str) -> Vec<String> {
    ["min", "mean", "median", "max"]
        .iter()
        .map(|p| format!("{p}_{name}"))
        .collect()
}

/// 在 `field` 上统计每个结节覆盖的值.
fn summarize_field(scan: &Scan, field: &Array3<f64>, name: &str) -> FeatureTable {
    let mut table = FeatureTable::new(summary_columns(name));
    for nodule in scan.nodules() {
        let summary = Summary::of(nodule.positions().map(|p| field[p]));
        table.push_row(nodule.id(), summary_row(summary));
    }
    table
}

/// 气管距离: 结节覆盖体素上, 外推后的气管距离场的统计值 (毫米).
pub fn featurize_tracheal_distance(
    scan: &Scan,
    cfg: &PipelineConfig,
) -> SegmentResult<FeatureTable> {
    let lungs = segment_lungs(scan, cfg)?;
    let distances = tracheal_distance(scan, lungs.view())?.extrapolate()?;
    Ok(summarize_field(scan, &distances, "tracheal_distance"))
}

/// 体部深度: 结节覆盖体素到体部包络外的欧氏距离的统计值 (毫米).
pub fn featurize_body_depth(scan: &Scan, cfg: &PipelineConfig) -> SegmentResult<FeatureTable> {
    let body = segment_body(scan, cfg)?;
    let depths = distance_transform_edt(body.view(), scan.unit_cell().as_array()).ok_or(
        SegmentError::NoContent {
            stage: Stage::Featurization,
        },
    )?;
    Ok(summarize_field(scan, &depths, "body_depth"))
}

/// 结节质心 (毫米).
pub fn featurize_center(scan: &Scan, _cfg: &PipelineConfig) -> SegmentResult<FeatureTable> {
    let columns = ["center_z", "center_h", "center_w"]
        .map(String::from)
        .to_vec();
    let mut table = FeatureTable::new(columns);
    let cell = scan.unit_cell();
    for nodule in scan.nodules() {
        let row = match center_of_mass(nodule) {
            Some(c) => (0..3).map(|k| Some(c[k] * cell[k])).collect(),
            None => vec![None; 3],
        };
        table.push_row(nodule.id(), row);
    }
    Ok(table)
}

/// 结节体素索引的平均值. 结节没有体素时返回 `None`.
fn center_of_mass(nodule: &Nodule) -> Option<[f64; 3]> {
    let mut sum = [0.0; 3];
    let mut n = 0usize;
    for (z, h, w) in nodule.positions() {
        sum[0] += z as f64;
        sum[1] += h as f64;
        sum[2] += w as f64;
        n += 1;
    }
    (n > 0).then(|| sum.map(|s| s / n as f64))
}

/// 放射科医师评估的结节属性. 缺失的属性为 `None`.
pub fn featurize_characteristics(
    scan: &Scan,
    _cfg: &PipelineConfig,
) -> SegmentResult<FeatureTable> {
    let columns = CHARACTERISTICS.map(String::from).to_vec();
    let mut table = FeatureTable::new(columns);
    for nodule in scan.nodules() {
        let row = CHARACTERISTICS
            .iter()
            .map(|name| nodule.characteristic(name).map(f64::from))
            .collect();
        table.push_row(nodule.id(), row);
    }
    Ok(table)
}

/// 区域属性: 体积 (立方毫米), 等效球直径 (毫米), 最小/平均/最大 HU 值.
pub fn featurize_region_properties(
    scan: &Scan,
    _cfg: &PipelineConfig,
) -> SegmentResult<FeatureTable> {
    let columns = [
        "volume",
        "equivalent_diameter",
        "min_intensity",
        "mean_intensity",
        "max_intensity",
    ]
    .map(String::from)
    .to_vec();
    let mut table = FeatureTable::new(columns);
    let voxel = scan.unit_cell().voxel();
    for nodule in scan.nodules() {
        let volume = voxel * nodule.voxel_count() as f64;
        // 等体积球的直径, 而不是半径 `(3V / 4π)^(1/3)`.
        let diameter = 2.0 * (3.0 * volume / (4.0 * PI)).cbrt();
        let intensity = Summary::of(nodule.positions().map(|p| scan[p] as f64));
        let mut row = vec![Some(volume), Some(diameter)];
        row.extend([
            intensity.map(|s| s.min),
            intensity.map(|s| s.mean),
            intensity.map(|s| s.max),
        ]);
        table.push_row(nodule.id(), row);
    }
    Ok(table)
}
