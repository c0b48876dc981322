//! 6-邻接连通区域标记与包络提取.

use std::collections::VecDeque;

use log::debug;
use ndarray::{Array3, ArrayView3, Axis, Zip};

use crate::data::{cube_neighbours, diamond_neighbours};
use crate::error::{SegmentError, SegmentResult, Stage};
use crate::{BinaryMask, Idx3d};

/// 连通区域标记结果.
///
/// 背景标记为 0, 各区域按行优先顺序从 1 开始编号.
#[derive(Debug, Clone)]
pub struct Labels {
    data: Array3<u32>,
    counts: Vec<usize>,
}

impl Labels {
    /// 按照 6-相邻规则标记 `mask` 的所有前景区域. 两个体素 `p1` 和 `p2`
    /// 属于同一个区域, 当且仅当存在一条从 `p1` 到 `p2` 的 6-相邻路径,
    /// 且路径上的所有体素都是前景.
    pub fn label(mask: ArrayView3<bool>) -> Self {
        Self::label_by(mask, diamond_neighbours)
    }

    /// 与 [`Self::label`] 相同, 但按照 26-相邻规则 (共享面, 棱或角) 连通.
    ///
    /// 6-相邻前景的补集应以该规则标记, 否则经由棱或角与外部相通的空洞会被误判为内部空洞.
    pub fn label_full(mask: ArrayView3<bool>) -> Self {
        Self::label_by(mask, cube_neighbours)
    }

    fn label_by<I, N>(mask: ArrayView3<bool>, neighbours: N) -> Self
    where
        I: Iterator<Item = Idx3d>,
        N: Fn(Idx3d, Idx3d) -> I,
    {
        let shape = mask.dim();
        let mut data = Array3::<u32>::zeros(shape);
        let mut counts = vec![0];
        let mut bfs_q = VecDeque::with_capacity(64);

        for (pos, &v) in mask.indexed_iter() {
            if !v || data[pos] != 0 {
                continue;
            }
            let label = counts.len() as u32;
            let mut count = 0;
            data[pos] = label;
            bfs_q.push_back(pos);
            while let Some(cur) = bfs_q.pop_front() {
                count += 1;
                for neigh in neighbours(shape, cur) {
                    if mask[neigh] && data[neigh] == 0 {
                        data[neigh] = label;
                        bfs_q.push_back(neigh);
                    }
                }
            }
            counts.push(count);
        }
        Self { data, counts }
    }

    /// 标记数组.
    #[inline]
    pub fn data(&self) -> &Array3<u32> {
        &self.data
    }

    /// 曾经分配过的区域个数 (含已清除的).
    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len() - 1
    }

    /// 是否从未分配过区域.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 区域 `label` 的体素个数. 已清除或不存在的区域为 0.
    #[inline]
    pub fn count(&self, label: u32) -> usize {
        match label {
            0 => 0,
            l => self.counts.get(l as usize).copied().unwrap_or(0),
        }
    }

    /// 清除所有触碰水平切片边缘 (`h` 或 `w` 方向的外表面) 的区域.
    /// 只触碰 `z` 方向外表面的区域保留.
    ///
    /// 空网格保持不变.
    pub fn clear_in_plane_border(&mut self) {
        if self.data.is_empty() {
            return;
        }
        let mut touching = vec![false; self.counts.len()];
        for axis in [1, 2] {
            let len = self.data.len_of(Axis(axis));
            for index in [0, len - 1] {
                for &l in self.data.index_axis(Axis(axis), index).iter() {
                    touching[l as usize] = true;
                }
            }
        }
        touching[0] = false;
        self.data.mapv_inplace(|l| if touching[l as usize] { 0 } else { l });
        for (count, _) in self.counts.iter_mut().zip(touching).filter(|(_, t)| *t) {
            *count = 0;
        }
    }

    /// 获取体素最多的区域. 并列时取编号最小的区域. 不存在区域时返回 `None`.
    pub fn dominant(&self) -> Option<u32> {
        let mut best: Option<(u32, usize)> = None;
        for (label, &count) in self.counts.iter().enumerate().skip(1) {
            if count > 0 && best.map_or(true, |(_, c)| count > c) {
                best = Some((label as u32, count));
            }
        }
        best.map(|(label, _)| label)
    }

    /// 区域 `label` 的掩膜.
    #[inline]
    pub fn mask_of(&self, label: u32) -> BinaryMask {
        self.data.mapv(|l| l != 0 && l == label)
    }

    /// 所有区域的并集.
    #[inline]
    pub fn foreground(&self) -> BinaryMask {
        self.data.mapv(|l| l != 0)
    }
}

/// 获取 `mask` 中不触碰水平切片边缘的最大连通区域.
///
/// 不存在这样的区域时返回 [`SegmentError::EmptySegmentation`], 并指明出错阶段 `stage`.
pub fn dominant_component(mask: ArrayView3<bool>, stage: Stage) -> SegmentResult<BinaryMask> {
    let mut labels = Labels::label(mask);
    let total = labels.len();
    labels.clear_in_plane_border();
    let Some(label) = labels.dominant() else {
        return Err(SegmentError::EmptySegmentation { stage });
    };
    debug!(
        "{stage}: {total} components, dominant #{label} with {} voxels",
        labels.count(label)
    );
    Ok(labels.mask_of(label))
}

/// 填充 `mask` 的内部空洞.
///
/// 对 `mask` 取反并按 26-相邻规则标记, 触碰水平切片边缘的反向区域视为外部,
/// 外部的补集即包络. 只触碰 `z` 方向外表面的空洞也会被填充.
pub fn close_envelope(mask: ArrayView3<bool>) -> BinaryMask {
    let inverse = mask.mapv(|v| !v);
    let labels = Labels::label_full(inverse.view());
    let mut inner = labels.clone();
    inner.clear_in_plane_border();

    let mut envelope = labels.foreground();
    Zip::from(&mut envelope)
        .and(inner.data())
        .for_each(|e, &l| *e = !(*e ^ (l != 0)));
    envelope
}

/// 提取包络: 选取最大连通区域并填充内部空洞.
pub fn extract_envelope(mask: ArrayView3<bool>, stage: Stage) -> SegmentResult<BinaryMask> {
    let dominant = dominant_component(mask, stage)?;
    Ok(close_envelope(dominant.view()))
}
