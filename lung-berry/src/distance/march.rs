//! Fast marching 求解 Eikonal 方程 `|∇T| = 1`.

use binary_heap_plus::BinaryHeap;
use ndarray::{Array3, ArrayView3};

use crate::data::{diamond_neighbours, linear, unravel};
use crate::Idx3d;

/// 体素求解状态.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    /// 尚未触及, 或仍在候选堆中.
    Open,

    /// 已确定最终值.
    Known,
}

/// 以一阶迎风格式求解 `|∇T| = 1`.
///
/// `passable` 中为 `true` 且 `seed_level <= 0` 的体素为初始波前, `T = 0`.
/// 波前只在 `passable` 体素间以 6-相邻方式传播. `spacing` 为三个方向的体素间距 (毫米).
///
/// # 返回值
///
/// 与输入同形的旅行距离. 不可达体素与障碍体素均为 `f64::INFINITY`.
///
/// # 注意
///
/// `passable` 与 `seed_level` 形状必须一致, 否则 panic.
pub fn fast_march(
    passable: ArrayView3<bool>,
    seed_level: ArrayView3<f64>,
    spacing: [f64; 3],
) -> Array3<f64> {
    let shape = passable.dim();
    assert_eq!(shape, seed_level.dim(), "seed level does not match domain");

    let mut values = Array3::from_elem(shape, f64::INFINITY);
    let mut state = Array3::from_elem(shape, State::Open);

    // 堆顶为旅行距离最小者, 距离相同时线性索引较小者优先.
    let mut heap: BinaryHeap<(f64, usize), _> =
        BinaryHeap::new_by(|a: &(f64, usize), b: &(f64, usize)| {
            b.0.total_cmp(&a.0).then(b.1.cmp(&a.1))
        });

    for ((pos, &p), &level) in passable.indexed_iter().zip(seed_level.iter()) {
        if p && level <= 0.0 {
            values[pos] = 0.0;
            heap.push((0.0, linear(shape, pos)));
        }
    }

    while let Some((t, i)) = heap.pop() {
        let pos = unravel(shape, i);
        // 过期条目.
        if state[pos] == State::Known || t > values[pos] {
            continue;
        }
        state[pos] = State::Known;

        for neigh in diamond_neighbours(shape, pos) {
            if !passable[neigh] || state[neigh] == State::Known {
                continue;
            }
            let candidate = solve_upwind(&values, &state, neigh, spacing);
            if candidate < values[neigh] {
                values[neigh] = candidate;
                heap.push((candidate, linear(shape, neigh)));
            }
        }
    }
    values
}

/// 由已确定的邻居求 `pos` 处的一阶迎风解.
fn solve_upwind(
    values: &Array3<f64>,
    state: &Array3<State>,
    pos: Idx3d,
    spacing: [f64; 3],
) -> f64 {
    let shape = values.dim();
    let (z, h, w) = pos;
    let axes: [[Idx3d; 2]; 3] = [
        [(z.wrapping_sub(1), h, w), (z.saturating_add(1), h, w)],
        [(z, h.wrapping_sub(1), w), (z, h.saturating_add(1), w)],
        [(z, h, w.wrapping_sub(1)), (z, h, w.saturating_add(1))],
    ];

    // 每个方向取较小的已知邻居值.
    let mut terms: Vec<(f64, f64)> = axes
        .iter()
        .zip(spacing)
        .filter_map(|(pair, step)| {
            pair.iter()
                .filter(|p| **p != pos && crate::data::check(shape, p))
                .filter(|p| state[**p] == State::Known)
                .map(|p| values[*p])
                .min_by(f64::total_cmp)
                .map(|a| (a, step))
        })
        .collect();
    terms.sort_by(|x, y| x.0.total_cmp(&y.0));

    let Some(&(a0, h0)) = terms.first() else {
        return f64::INFINITY;
    };
    let mut t = a0 + h0;
    let (mut qa, mut qb, mut qc) = (0.0, 0.0, -1.0);
    for &(a, step) in terms.iter() {
        if a >= t {
            break;
        }
        let inv = 1.0 / (step * step);
        qa += inv;
        qb += a * inv;
        qc += a * a * inv;
        let disc = qb * qb - qa * qc;
        if disc < 0.0 {
            break;
        }
        t = (qb + disc.sqrt()) / qa;
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn level_above(shape: Idx3d, z0: usize) -> Array3<f64> {
        Array3::from_shape_fn(shape, |(z, _, _)| if z <= z0 { -1.0 } else { 1.0 })
    }

    #[test]
    fn test_planar_front() {
        let shape = (6, 4, 4);
        let passable = Array3::from_elem(shape, true);
        let values = fast_march(passable.view(), level_above(shape, 0).view(), [2.0, 1.0, 1.0]);
        for ((z, _, _), v) in values.indexed_iter() {
            assert_eq!(*v, 2.0 * z as f64);
        }
    }

    #[test]
    fn test_diagonal_is_shorter_than_manhattan() {
        // 单点种子, 斜向距离介于欧氏距离与曼哈顿距离之间.
        let shape = (1, 9, 9);
        let passable = Array3::from_elem(shape, true);
        let mut level = Array3::from_elem(shape, 1.0);
        level[(0, 0, 0)] = -1.0;
        let values = fast_march(passable.view(), level.view(), [1.0, 1.0, 1.0]);
        assert_eq!(values[(0, 0, 4)], 4.0);
        let d = values[(0, 4, 4)];
        assert!(d > 32f64.sqrt() && d < 8.0, "{d}");
    }

    #[test]
    fn test_obstacles_stay_unsolved() {
        let shape = (5, 5, 5);
        let mut passable = Array3::from_elem(shape, true);
        // z = 2 整层不可通过.
        passable.slice_mut(s![2, .., ..]).fill(false);
        let values = fast_march(passable.view(), level_above(shape, 0).view(), [1.0; 3]);
        assert!(values.slice(s![0..2, .., ..]).iter().all(|v| v.is_finite()));
        assert!(values.slice(s![2.., .., ..]).iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn test_no_seed() {
        let shape = (3, 3, 3);
        let passable = Array3::from_elem(shape, true);
        let level = Array3::from_elem(shape, 1.0);
        let values = fast_march(passable.view(), level.view(), [1.0; 3]);
        assert!(values.iter().all(|v| v.is_infinite()));
    }
}
