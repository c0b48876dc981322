//! 结节特征提取.
//!
//! 每个特征提取器 ([`Featurize`]) 对一个扫描输出一张表, 每个结节一行.
//! 提取器以名称注册在 [`FeaturizerRegistry`] 中, 对同一扫描逐个运行,
//! 某个提取器失败不会影响其他提取器的结果.

use std::collections::BTreeMap;
use std::io::{self, Write};

use log::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::{SegmentError, SegmentResult};
use crate::Scan;

mod featurizers;
pub mod stats;

pub use featurizers::{
    featurize_body_depth, featurize_center, featurize_characteristics,
    featurize_region_properties, featurize_tracheal_distance,
};

/// 特征提取器.
pub type Featurize = fn(&Scan, &PipelineConfig) -> SegmentResult<FeatureTable>;

/// 特征表. 每行以结节编号标识, 缺失值为 `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<(String, Vec<Option<f64>>)>,
}

impl FeatureTable {
    /// 以列名构建空表.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// 追加一行.
    ///
    /// # 注意
    ///
    /// `values` 的长度必须与列数一致, 否则 panic.
    pub fn push_row(&mut self, id: impl Into<String>, values: Vec<Option<f64>>) {
        assert_eq!(
            values.len(),
            self.columns.len(),
            "row length does not match column count"
        );
        self.rows.push((id.into(), values));
    }

    /// 列名.
    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 全部行.
    #[inline]
    pub fn rows(&self) -> &[(String, Vec<Option<f64>>)] {
        &self.rows
    }

    /// 行数.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// 是否没有任何行.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 获取结节 `id` 在列 `column` 上的值. 行或列不存在, 或值缺失时返回 `None`.
    pub fn get(&self, id: &str, column: &str) -> Option<f64> {
        let c = self.columns.iter().position(|n| n == column)?;
        let (_, values) = self.rows.iter().find(|(i, _)| i == id)?;
        values[c]
    }

    /// 将表格以制表符分隔写进 `w` 中. 缺失值写为 `/`.
    pub fn describe_into<W: Write>(&self, w: &mut W) -> io::Result<()> {
        #[inline]
        fn f64_to_display(f: Option<f64>) -> String {
            match f {
                Some(f) => format!("{f:.6}"),
                None => "/".to_string(),
            }
        }

        write!(w, "id")?;
        for c in self.columns.iter() {
            write!(w, "\t{c}")?;
        }
        writeln!(w)?;
        for (id, values) in self.rows.iter() {
            write!(w, "{id}")?;
            for v in values.iter() {
                write!(w, "\t{}", f64_to_display(*v))?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

/// 特征提取器注册表. 以名称的字典序运行.
#[derive(Clone, Default)]
pub struct FeaturizerRegistry {
    featurizers: BTreeMap<&'static str, Featurize>,
}

impl FeaturizerRegistry {
    /// 空注册表.
    pub fn new() -> Self {
        Self::default()
    }

    /// 含全部内置提取器的注册表.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register("body_depth", featurize_body_depth);
        r.register("center", featurize_center);
        r.register("characteristics", featurize_characteristics);
        r.register("region_properties", featurize_region_properties);
        r.register("tracheal_distance", featurize_tracheal_distance);
        r
    }

    /// 以 `name` 注册提取器. 同名的旧提取器被替换并返回.
    pub fn register(&mut self, name: &'static str, f: Featurize) -> Option<Featurize> {
        self.featurizers.insert(name, f)
    }

    /// 获取名为 `name` 的提取器.
    #[inline]
    pub fn get(&self, name: &str) -> Option<Featurize> {
        self.featurizers.get(name).copied()
    }

    /// 全部提取器名称.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.featurizers.keys().copied()
    }

    /// 提取器个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.featurizers.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.featurizers.is_empty()
    }
}

/// 单个扫描的特征提取结果. 每个提取器各自成败.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    patient_id: String,
    results: Vec<(&'static str, SegmentResult<FeatureTable>)>,
}

impl ScanReport {
    /// 扫描编号.
    #[inline]
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    /// 全部结果, 按提取器名称排序.
    #[inline]
    pub fn results(&self) -> &[(&'static str, SegmentResult<FeatureTable>)] {
        &self.results
    }

    /// 名为 `name` 的提取器的结果.
    pub fn get(&self, name: &str) -> Option<&SegmentResult<FeatureTable>> {
        self.results
            .iter()
            .find_map(|(n, r)| (*n == name).then_some(r))
    }

    /// 失败的提取器及其错误.
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &SegmentError)> + '_ {
        self.results
            .iter()
            .filter_map(|(n, r)| r.as_ref().err().map(|e| (*n, e)))
    }

    /// 将成功的结果按结节编号横向合并为一张表. 失败的提取器不贡献任何列.
    pub fn merged(&self) -> FeatureTable {
        let tables: Vec<&FeatureTable> = self
            .results
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .collect();
        let columns = tables
            .iter()
            .flat_map(|t| t.columns().iter().cloned())
            .collect();
        let mut ids: Vec<&str> = Vec::new();
        for (id, _) in tables.iter().flat_map(|t| t.rows()) {
            if !ids.contains(&id.as_str()) {
                ids.push(id.as_str());
            }
        }

        let mut merged = FeatureTable::new(columns);
        for id in ids {
            let row = tables
                .iter()
                .flat_map(|t| t.columns().iter().map(move |c| t.get(id, c)))
                .collect();
            merged.push_row(id, row);
        }
        merged
    }
}

/// 以注册表中的全部提取器处理 `scan`.
///
/// 失败的提取器输出警告, 其错误保存在返回的报告中.
pub fn featurize_scan(
    scan: &Scan,
    registry: &FeaturizerRegistry,
    cfg: &PipelineConfig,
) -> ScanReport {
    let results = registry
        .featurizers
        .iter()
        .map(|(&name, f)| {
            let r = f(scan, cfg);
            match &r {
                Ok(t) => debug!(
                    "featurizer `{name}` on `{}`: {} rows",
                    scan.patient_id(),
                    t.len()
                ),
                Err(e) => warn!("featurizer `{name}` failed on `{}`: {e}", scan.patient_id()),
            }
            (name, r)
        })
        .collect();
    ScanReport {
        patient_id: scan.patient_id().to_string(),
        results,
    }
}

/// 以名为 `name` 的提取器处理 `scan`.
///
/// 提取器不存在时返回 [`SegmentError::UnknownFeaturizer`].
pub fn featurize_single(
    scan: &Scan,
    registry: &FeaturizerRegistry,
    name: &str,
    cfg: &PipelineConfig,
) -> SegmentResult<FeatureTable> {
    let f = registry
        .get(name)
        .ok_or_else(|| SegmentError::UnknownFeaturizer(name.to_string()))?;
    f(scan, cfg)
}

/// 并行处理 `scans`, 结果顺序与输入一致.
#[cfg(feature = "rayon")]
pub fn featurize_batch(
    scans: &[Scan],
    registry: &FeaturizerRegistry,
    cfg: &PipelineConfig,
) -> Vec<ScanReport> {
    use rayon::prelude::*;

    scans
        .par_iter()
        .map(|s| featurize_scan(s, registry, cfg))
        .collect()
}

/// 逐个处理 `scans`, 结果顺序与输入一致.
#[cfg(not(feature = "rayon"))]
pub fn featurize_batch(
    scans: &[Scan],
    registry: &FeaturizerRegistry,
    cfg: &PipelineConfig,
) -> Vec<ScanReport> {
    scans
        .iter()
        .map(|s| featurize_scan(s, registry, cfg))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::{phantom, UnitCell};
    use ndarray::Array3;

    fn broken(_: &Scan, _: &PipelineConfig) -> SegmentResult<FeatureTable> {
        Err(SegmentError::NoContent {
            stage: Stage::Featurization,
        })
    }

    fn init_logger() {
        let _ = simple_logger::init_with_level(log::Level::Debug);
    }

    #[test]
    fn test_table() {
        let mut t = FeatureTable::new(vec!["a".to_string(), "b".to_string()]);
        assert!(t.is_empty());
        t.push_row("n1", vec![Some(1.5), None]);
        t.push_row("n2", vec![Some(-2.0), Some(3.0)]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("n1", "a"), Some(1.5));
        assert_eq!(t.get("n1", "b"), None);
        assert_eq!(t.get("n2", "b"), Some(3.0));
        assert_eq!(t.get("n3", "a"), None);
        assert_eq!(t.get("n1", "c"), None);

        let mut buf = Vec::new();
        t.describe_into(&mut buf).unwrap();
        assert_eq!(
            std::str::from_utf8(&buf).unwrap(),
            "id\ta\tb\nn1\t1.500000\t/\nn2\t-2.000000\t3.000000\n"
        );
    }

    #[test]
    #[should_panic]
    fn test_table_row_length() {
        let mut t = FeatureTable::new(vec!["a".to_string()]);
        t.push_row("n1", vec![None, None]);
    }

    #[test]
    fn test_registry() {
        let mut r = FeaturizerRegistry::with_defaults();
        assert_eq!(r.len(), 5);
        assert_eq!(
            r.names().collect::<Vec<_>>(),
            [
                "body_depth",
                "center",
                "characteristics",
                "region_properties",
                "tracheal_distance"
            ]
        );
        assert!(r.get("broken").is_none());
        assert!(r.register("broken", broken).is_none());
        assert!(r.register("broken", broken).is_some());
        assert_eq!(r.len(), 6);
        assert!(FeaturizerRegistry::new().is_empty());
    }

    #[test]
    fn test_featurize_scan() {
        init_logger();
        let scan = phantom::chest();
        let mut registry = FeaturizerRegistry::with_defaults();
        registry.register("broken", broken);
        let report = featurize_scan(&scan, &registry, &PipelineConfig::default());
        assert_eq!(report.patient_id(), "phantom");
        assert_eq!(report.results().len(), 6);

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "broken");
        assert!(report.get("broken").unwrap().is_err());
        assert!(report.get("tracheal_distance").unwrap().is_ok());

        let merged = report.merged();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.columns().len(), 4 + 3 + 9 + 5 + 4);
        assert_eq!(merged.get("phantom-1", "malignancy"), Some(3.0));
        assert_eq!(merged.get("phantom-1", "volume"), Some(18.0));
    }

    #[test]
    fn test_degenerate_scan_is_isolated() {
        init_logger();
        // 全为软组织: 没有肺, 体部触碰边缘, 两个分割相关的提取器都失败.
        let scan = phantom::chest();
        let solid = Scan::new(
            "solid",
            Array3::from_elem(scan.shape(), phantom::TISSUE),
            UnitCell::cubic(1.0),
            scan.nodules().to_vec(),
        );
        let report = featurize_scan(
            &solid,
            &FeaturizerRegistry::with_defaults(),
            &PipelineConfig::default(),
        );
        let mut failures: Vec<_> = report.failures().map(|(n, _)| n).collect();
        failures.sort_unstable();
        assert_eq!(failures, ["body_depth", "tracheal_distance"]);
        assert!(report
            .failures()
            .all(|(_, e)| matches!(e, SegmentError::EmptySegmentation { .. })));
        assert_eq!(
            report.merged().get("phantom-1", "mean_intensity"),
            Some(phantom::TISSUE as f64)
        );
    }

    #[test]
    fn test_featurize_single() {
        let scan = phantom::chest();
        let registry = FeaturizerRegistry::with_defaults();
        let cfg = PipelineConfig::default();
        let t = featurize_single(&scan, &registry, "center", &cfg).unwrap();
        assert_eq!(t.get("phantom-1", "center_z"), Some(6.5));
        assert_eq!(
            featurize_single(&scan, &registry, "nope", &cfg),
            Err(SegmentError::UnknownFeaturizer("nope".to_string()))
        );
    }

    #[test]
    fn test_featurize_batch() {
        let scans = vec![
            phantom::chest(),
            phantom::chest_with(UnitCell::new([2.0, 1.0, 1.0]).unwrap()),
        ];
        let mut registry = FeaturizerRegistry::new();
        registry.register("region_properties", featurize_region_properties);
        let reports = featurize_batch(&scans, &registry, &PipelineConfig::default());
        assert_eq!(reports.len(), 2);
        let volume = |r: &ScanReport| r.merged().get("phantom-1", "volume");
        assert_eq!(volume(&reports[0]), Some(18.0));
        assert_eq!(volume(&reports[1]), Some(36.0));
    }
}
