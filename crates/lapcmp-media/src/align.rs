//! Signal alignment with dynamic time warping.
//!
//! Small problems are solved on the full cost matrix. Larger ones use the
//! multi-resolution scheme: halve both series, align the halves recursively,
//! project the coarse path back up, widen it by `radius` and solve DTW only
//! inside that band.

use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{ensure_active, MediaError, MediaResult};
use crate::motion::MotionProxySignal;

/// Added to the standard deviation before dividing.
const ZSCORE_EPS: f64 = 1e-6;

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtwSettings {
    pub radius: usize,
    pub exact_cells: usize,
}

impl Default for DtwSettings {
    fn default() -> Self {
        Self {
            radius: 1,
            exact_cells: 4_000_000,
        }
    }
}

impl From<&EngineConfig> for DtwSettings {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            radius: cfg.dtw_radius,
            exact_cells: cfg.dtw_exact_cells,
        }
    }
}

/// Result of aligning two signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    /// Index pairs `(ia, ib)`, non-decreasing in both components
    pub path: Vec<(usize, usize)>,
    /// Cumulative Euclidean cost along the path
    pub cost: f64,
    /// Frame rate used for the time offsets
    pub fps: f64,
    /// `(ib - ia) / fps` for every path entry, in seconds
    pub delta_t: Vec<f64>,
}

/// The first usable frame rate of A, then B, then `default_fps`.
pub fn shared_fps(fps_a: Option<f64>, fps_b: Option<f64>, default_fps: f64) -> f64 {
    [fps_a, fps_b]
        .into_iter()
        .flatten()
        .find(|fps| fps.is_finite() && *fps > 0.0)
        .unwrap_or(default_fps)
}

/// Per-step time offsets for a path.
pub fn time_deltas(path: &[(usize, usize)], fps: f64) -> Vec<f64> {
    path.iter()
        .map(|&(ia, ib)| (ib as f64 - ia as f64) / fps)
        .collect()
}

/// Stack (speed, yaw) into an `N x 2` matrix and z-score each column.
pub fn normalized_features(signal: &MotionProxySignal) -> Array2<f64> {
    let n = signal.len();
    let mut features = Array2::<f64>::zeros((n, 2));
    for (i, (&v, &y)) in signal.v.iter().zip(&signal.y).enumerate() {
        features[[i, 0]] = v;
        features[[i, 1]] = y;
    }
    for mut column in features.axis_iter_mut(Axis(1)) {
        let mean = column.mean().unwrap_or(0.0);
        let std = column.std(0.0);
        column.mapv_inplace(|x| (x - mean) / (std + ZSCORE_EPS));
    }
    features
}

/// Align two motion proxies.
pub fn align_signals(
    a: &MotionProxySignal,
    b: &MotionProxySignal,
    fps: f64,
    settings: DtwSettings,
    cancel: &CancellationToken,
) -> MediaResult<Alignment> {
    if a.is_empty() || b.is_empty() {
        return Err(MediaError::insufficient_motion(format!(
            "motion signal lengths A={} B={}",
            a.len(),
            b.len()
        )));
    }

    let fa = normalized_features(a);
    let fb = normalized_features(b);
    let (cost, path) = fast_dtw(fa.view(), fb.view(), settings, cancel)?;
    let delta_t = time_deltas(&path, fps);

    info!(
        len_a = a.len(),
        len_b = b.len(),
        path_len = path.len(),
        cost,
        "Aligned motion signals"
    );

    Ok(Alignment {
        path,
        cost,
        fps,
        delta_t,
    })
}

/// Inclusive column range per row of the cost matrix.
pub type Window = Vec<(usize, usize)>;

/// Multi-resolution DTW; exact when the problem is small enough.
pub fn fast_dtw(
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
    settings: DtwSettings,
    cancel: &CancellationToken,
) -> MediaResult<(f64, Vec<(usize, usize)>)> {
    let (n, m) = (a.nrows(), b.nrows());
    let min_size = settings.radius + 2;

    if n <= min_size || m <= min_size || n.saturating_mul(m) <= settings.exact_cells {
        return dtw(a, b, None, cancel);
    }

    let a_half = halve(a);
    let b_half = halve(b);
    let (_, coarse_path) = fast_dtw(a_half.view(), b_half.view(), settings, cancel)?;
    let window = expand_window(&coarse_path, n, m, settings.radius);

    debug!(
        n,
        m,
        cells = window.iter().map(|(lo, hi)| hi - lo + 1).sum::<usize>(),
        "Windowed DTW"
    );

    dtw(a, b, Some(&window), cancel)
}

/// Average consecutive pairs of rows; an odd last row is dropped.
fn halve(x: ArrayView2<f64>) -> Array2<f64> {
    let end = x.nrows() / 2 * 2;
    let even = x.slice(s![..end;2, ..]);
    let odd = x.slice(s![1..end;2, ..]);
    (&even + &odd) / 2.0
}

/// Project a coarse path to full resolution and widen it by `radius`.
fn expand_window(coarse: &[(usize, usize)], n: usize, m: usize, radius: usize) -> Window {
    let mut window: Vec<Option<(usize, usize)>> = vec![None; n];
    let r = radius as isize;

    for &(ci, cj) in coarse {
        for di in -r..=r {
            let Some(row) = (ci as isize).checked_add(di).filter(|v| *v >= 0) else {
                continue;
            };
            let col_lo = (cj as isize - r).max(0) as usize * 2;
            let col_hi = ((cj as isize + r) as usize * 2 + 1).min(m - 1);
            if col_lo > col_hi {
                continue;
            }
            for i in [row as usize * 2, row as usize * 2 + 1] {
                if i >= n {
                    continue;
                }
                window[i] = Some(match window[i] {
                    Some((lo, hi)) => (lo.min(col_lo), hi.max(col_hi)),
                    None => (col_lo, col_hi),
                });
            }
        }
    }

    // Rows past the coarse grid (odd length) inherit the last covered range;
    // the final row must reach the last column.
    let mut last = (0, m - 1);
    let mut filled: Window = window
        .into_iter()
        .map(|range| {
            if let Some(range) = range {
                last = range;
            }
            last
        })
        .collect();
    filled[0].0 = 0;
    if let Some(end) = filled.last_mut() {
        end.1 = m - 1;
    }

    // Keep ranges monotone so every row connects to the previous one.
    for i in 1..n {
        filled[i].0 = filled[i].0.max(filled[i - 1].0).min(filled[i - 1].1 + 1);
        filled[i].1 = filled[i].1.max(filled[i - 1].1).max(filled[i].0);
    }
    filled
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Accumulated cost restricted to a per-row column window.
struct CostTable {
    window: Window,
    offsets: Vec<usize>,
    cells: Vec<f64>,
}

impl CostTable {
    fn new(window: Window) -> Self {
        let mut offsets = Vec::with_capacity(window.len());
        let mut total = 0;
        for &(lo, hi) in &window {
            offsets.push(total);
            total += hi - lo + 1;
        }
        Self {
            window,
            offsets,
            cells: vec![f64::INFINITY; total],
        }
    }

    fn get(&self, i: usize, j: usize) -> f64 {
        let (lo, hi) = self.window[i];
        if j < lo || j > hi {
            return f64::INFINITY;
        }
        self.cells[self.offsets[i] + j - lo]
    }

    fn set(&mut self, i: usize, j: usize, value: f64) {
        let lo = self.window[i].0;
        self.cells[self.offsets[i] + j - lo] = value;
    }
}

/// DTW over the full matrix (`window = None`) or a band.
///
/// Ties prefer the diagonal step, then the step in A, then the step in B.
/// `cancel` is checked once per row.
pub fn dtw(
    a: ArrayView2<f64>,
    b: ArrayView2<f64>,
    window: Option<&Window>,
    cancel: &CancellationToken,
) -> MediaResult<(f64, Vec<(usize, usize)>)> {
    let (n, m) = (a.nrows(), b.nrows());
    if n == 0 || m == 0 {
        return Err(MediaError::insufficient_motion("cannot align an empty series"));
    }

    let window = window.cloned().unwrap_or_else(|| vec![(0, m - 1); n]);
    let mut table = CostTable::new(window);

    for i in 0..n {
        ensure_active(cancel)?;
        let (lo, hi) = table.window[i];
        for j in lo..=hi {
            let cost = euclidean(a.row(i), b.row(j));
            let best = if i == 0 && j == 0 {
                0.0
            } else {
                let diag = if i > 0 && j > 0 { table.get(i - 1, j - 1) } else { f64::INFINITY };
                let up = if i > 0 { table.get(i - 1, j) } else { f64::INFINITY };
                let left = if j > 0 { table.get(i, j - 1) } else { f64::INFINITY };
                diag.min(up).min(left)
            };
            table.set(i, j, cost + best);
        }
    }

    let total = table.get(n - 1, m - 1);
    if !total.is_finite() {
        return Err(MediaError::internal("DTW window does not reach the end cell"));
    }

    let mut path = Vec::with_capacity(n + m);
    let (mut i, mut j) = (n - 1, m - 1);
    path.push((i, j));
    while i > 0 || j > 0 {
        let diag = if i > 0 && j > 0 { table.get(i - 1, j - 1) } else { f64::INFINITY };
        let up = if i > 0 { table.get(i - 1, j) } else { f64::INFINITY };
        let left = if j > 0 { table.get(i, j - 1) } else { f64::INFINITY };

        if diag <= up && diag <= left {
            i -= 1;
            j -= 1;
        } else if up <= left {
            i -= 1;
        } else {
            j -= 1;
        }
        path.push((i, j));
    }
    path.reverse();

    Ok((total, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn signal(values: &[f64]) -> MotionProxySignal {
        MotionProxySignal {
            s: (0..values.len()).map(|i| i as f64).collect(),
            v: values.to_vec(),
            y: values.iter().map(|v| (v * 0.7).sin()).collect(),
        }
    }

    fn live() -> CancellationToken {
        CancellationToken::new()
    }

    fn random_signal(rng: &mut StdRng, n: usize) -> MotionProxySignal {
        let v: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..5.0)).collect();
        signal(&v)
    }

    fn assert_monotone(path: &[(usize, usize)], n: usize, m: usize) {
        assert_eq!(path.first(), Some(&(0, 0)));
        assert_eq!(path.last(), Some(&(n - 1, m - 1)));
        for w in path.windows(2) {
            let (a, b) = (w[0], w[1]);
            assert!(b.0 >= a.0 && b.1 >= a.1, "path goes backwards: {:?} -> {:?}", a, b);
            assert!(b.0 - a.0 <= 1 && b.1 - a.1 <= 1, "path skips: {:?} -> {:?}", a, b);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_shared_fps_fallback() {
        assert_eq!(shared_fps(Some(25.0), Some(60.0), 30.0), 25.0);
        assert_eq!(shared_fps(None, Some(60.0), 30.0), 60.0);
        assert_eq!(shared_fps(Some(0.0), None, 30.0), 30.0);
    }

    #[test]
    fn test_zscore_columns() {
        let f = normalized_features(&signal(&[1.0, 2.0, 3.0]));
        let col = f.column(0);
        assert!(col.mean().unwrap().abs() < 1e-9);
        assert!((col.std(0.0) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_constant_channel_normalizes_to_zero() {
        let sig = MotionProxySignal {
            s: vec![0.0, 1.0, 2.0],
            v: vec![4.0; 3],
            y: vec![0.1, 0.2, 0.3],
        };
        let f = normalized_features(&sig);
        assert!(f.column(0).iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_identical_signals_align_on_diagonal() {
        let mut rng = StdRng::seed_from_u64(7);
        let sig = random_signal(&mut rng, 60);
        let alignment = align_signals(&sig, &sig, 30.0, DtwSettings::default(), &live()).unwrap();

        let expected: Vec<(usize, usize)> = (0..60).map(|i| (i, i)).collect();
        assert_eq!(alignment.path, expected);
        assert!(alignment.delta_t.iter().all(|d| *d == 0.0));
        assert!(alignment.cost.abs() < 1e-9);
    }

    #[test]
    fn test_identical_signals_align_on_diagonal_windowed() {
        let mut rng = StdRng::seed_from_u64(11);
        let sig = random_signal(&mut rng, 257);
        let settings = DtwSettings {
            radius: 1,
            exact_cells: 100,
        };
        let alignment = align_signals(&sig, &sig, 30.0, settings, &live()).unwrap();
        assert_eq!(alignment.path.len(), 257);
        assert!(alignment.path.iter().all(|(a, b)| a == b));
        assert!(alignment.delta_t.iter().all(|d| *d == 0.0));
    }

    #[test]
    fn test_paths_are_monotone() {
        let mut rng = StdRng::seed_from_u64(42);
        for (n, m, exact) in [(40, 55, usize::MAX), (301, 180, 1000), (97, 96, 0)] {
            let a = random_signal(&mut rng, n);
            let b = random_signal(&mut rng, m);
            let settings = DtwSettings {
                radius: 2,
                exact_cells: exact,
            };
            let alignment = align_signals(&a, &b, 30.0, settings, &live()).unwrap();
            assert_monotone(&alignment.path, n, m);
            assert_eq!(alignment.delta_t.len(), alignment.path.len());
        }
    }

    #[test]
    fn test_windowed_cost_not_below_exact() {
        let mut rng = StdRng::seed_from_u64(3);
        let a = normalized_features(&random_signal(&mut rng, 120));
        let b = normalized_features(&random_signal(&mut rng, 150));

        let (exact, _) = dtw(a.view(), b.view(), None, &live()).unwrap();
        let (approx, path) = fast_dtw(
            a.view(),
            b.view(),
            DtwSettings {
                radius: 3,
                exact_cells: 0,
            },
            &live(),
        )
        .unwrap();
        assert!(approx + 1e-9 >= exact);
        assert_monotone(&path, 120, 150);
    }

    #[test]
    fn test_shifted_signal_has_positive_delta() {
        // B repeats A's pattern five samples later.
        let base: Vec<f64> = (0..80).map(|i| ((i as f64) / 6.0).sin() * 2.0 + 2.0).collect();
        let mut shifted = vec![base[0]; 5];
        shifted.extend_from_slice(&base[..75]);

        let alignment = align_signals(
            &signal(&base),
            &signal(&shifted),
            10.0,
            DtwSettings::default(),
            &live(),
        )
        .unwrap();
        let mid = alignment.delta_t[alignment.delta_t.len() / 2];
        assert!((mid - 0.5).abs() < 0.21, "mid delta = {}", mid);
    }

    #[test]
    fn test_empty_signal_is_insufficient_motion() {
        let err = align_signals(
            &MotionProxySignal::default(),
            &signal(&[1.0, 2.0]),
            30.0,
            DtwSettings::default(),
            &live(),
        )
        .unwrap_err();
        assert!(matches!(err, MediaError::InsufficientMotion(_)));
    }

    #[test]
    fn test_cancelled_alignment() {
        let mut rng = StdRng::seed_from_u64(5);
        let sig = random_signal(&mut rng, 50);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = align_signals(&sig, &sig, 30.0, DtwSettings::default(), &cancel).unwrap_err();
        assert!(matches!(err, MediaError::Cancelled));
    }

    #[test]
    fn test_single_sample_signals() {
        let alignment = align_signals(
            &signal(&[1.0]),
            &signal(&[1.0, 2.0, 3.0]),
            30.0,
            DtwSettings::default(),
            &live(),
        )
        .unwrap();
        assert_eq!(alignment.path, vec![(0, 0), (0, 1), (0, 2)]);
        assert!((alignment.delta_t[2] - 2.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_expand_window_covers_odd_lengths() {
        let coarse = vec![(0, 0), (1, 1), (2, 2)];
        let window = expand_window(&coarse, 7, 7, 0);
        assert_eq!(window.len(), 7);
        assert_eq!(window[0].0, 0);
        assert_eq!(window[6].1, 6);
        assert!(window.windows(2).all(|w| w[1].0 <= w[0].1 + 1));
    }
}
