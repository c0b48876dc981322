//! 三次 B 样条插值 (镜像边界).
//!
//! 先以递归滤波求样条系数, 再在任意坐标处求值. 三维插值按方向分离进行.

use ndarray::{Array3, ArrayView1, ArrayView3, ArrayViewMut1, Axis, Zip};
use num::Float;

/// 三次 B 样条预滤波器的极点.
const POLE: f64 = -0.267_949_192_431_122_7; // sqrt(3) - 2

/// 预滤波器增益 `(1 - z) * (1 - 1 / z)`.
const GAIN: f64 = 6.0;

/// 因果初始化的截断精度.
const TOLERANCE: f64 = 1e-9;

/// 坐标 `x` 在镜像边界下映射回 `[0, n - 1]`.
#[inline]
fn mirror(x: f64, n: usize) -> f64 {
    if n == 1 {
        return 0.0;
    }
    let last = (n - 1) as f64;
    let period = 2.0 * last;
    let r = x.rem_euclid(period);
    if r > last {
        period - r
    } else {
        r
    }
}

/// 整数下标 `i` 在镜像边界下映射回 `[0, n - 1]`.
#[inline]
fn mirror_index(i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let r = i.rem_euclid(period);
    if r > n as isize - 1 {
        (period - r) as usize
    } else {
        r as usize
    }
}

/// 就地求一维三次 B 样条系数.
fn prefilter(c: &mut [f64]) {
    let n = c.len();
    if n < 2 {
        return;
    }
    c.iter_mut().for_each(|v| *v *= GAIN);

    // 因果初始化.
    let horizon = (TOLERANCE.ln() / POLE.abs().ln()).ceil() as usize;
    let mut sum;
    if horizon < n {
        let mut zk = POLE;
        sum = c[0];
        for v in c.iter().take(horizon).skip(1) {
            sum += zk * v;
            zk *= POLE;
        }
    } else {
        let mut zk = POLE;
        let iz = 1.0 / POLE;
        let mut z2n = POLE.powi(n as i32 - 1);
        sum = c[0] + z2n * c[n - 1];
        z2n *= z2n * iz;
        for v in c.iter().take(n - 1).skip(1) {
            sum += (zk + z2n) * v;
            zk *= POLE;
            z2n *= iz;
        }
        sum /= 1.0 - zk * zk;
    }
    c[0] = sum;
    for k in 1..n {
        c[k] += POLE * c[k - 1];
    }

    // 反因果初始化.
    c[n - 1] = (POLE / (POLE * POLE - 1.0)) * (POLE * c[n - 2] + c[n - 1]);
    for k in (0..n - 1).rev() {
        c[k] = POLE * (c[k + 1] - c[k]);
    }
}

/// 由样条系数 `c` 在坐标 `x` 处求值.
fn evaluate(c: &[f64], x: f64) -> f64 {
    let n = c.len();
    let x = mirror(x, n);
    let j = x.floor();
    let t = x - j;
    let j = j as isize;
    let t2 = t * t;
    let t3 = t2 * t;
    let weights = [
        (1.0 - t).powi(3) / 6.0,
        (4.0 - 6.0 * t2 + 3.0 * t3) / 6.0,
        (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) / 6.0,
        t3 / 6.0,
    ];
    weights
        .iter()
        .enumerate()
        .map(|(k, w)| w * c[mirror_index(j - 1 + k as isize, n)])
        .sum()
}

/// 在一维数据 `input` 上按坐标 `coords` 插值, 结果写入 `output`.
fn resample_lane<T: Float>(input: ArrayView1<T>, mut output: ArrayViewMut1<T>, coords: &[f64]) {
    let mut c: Vec<f64> = input
        .iter()
        .map(|v| v.to_f64().unwrap_or(f64::NAN))
        .collect();
    prefilter(&mut c);
    for (o, &x) in output.iter_mut().zip(coords) {
        *o = <T as num::NumCast>::from(evaluate(&c, x)).unwrap_or_else(T::nan);
    }
}

/// 沿 `axis` 方向按坐标 `coords` 插值. 输出在该方向的长度为 `coords.len()`.
pub fn resample_axis<T>(input: ArrayView3<T>, axis: usize, coords: &[f64]) -> Array3<T>
where
    T: Float + Send + Sync,
{
    let mut shape = input.dim();
    match axis {
        0 => shape.0 = coords.len(),
        1 => shape.1 = coords.len(),
        _ => shape.2 = coords.len(),
    }
    let mut output = Array3::from_elem(shape, T::zero());
    if input.len_of(Axis(axis)) == 0 {
        return output;
    }
    let zip = Zip::from(output.lanes_mut(Axis(axis))).and(input.lanes(Axis(axis)));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|o, i| resample_lane(i, o, coords));
        } else {
            zip.for_each(|o, i| resample_lane(i, o, coords));
        }
    }
    output
}

/// 依次沿三个方向插值. `coords[k]` 为第 `k` 个方向上各输出位置对应的输入坐标.
pub fn resample_separable<T>(input: ArrayView3<T>, coords: [&[f64]; 3]) -> Array3<T>
where
    T: Float + Send + Sync,
{
    let a = resample_axis(input, 0, coords[0]);
    let b = resample_axis(a.view(), 1, coords[1]);
    resample_axis(b.view(), 2, coords[2])
}
