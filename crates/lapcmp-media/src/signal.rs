//! 1-D numeric helpers for motion signals.
//!
//! These follow the usual array-library conventions: `median` averages the
//! two middle values, `moving_average_same` is a zero-padded centred
//! convolution, `interp` clamps outside the sample range.

/// Median of `values`; 0.0 for an empty slice. Reorders the slice.
pub fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    let (_, upper, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    let upper = *upper;
    if n % 2 == 1 {
        return upper;
    }
    let lower = values[..mid]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    (lower + upper) / 2.0
}

/// Centred moving average of `window` samples with zeros outside the input.
///
/// Output has the same length as the input.
pub fn moving_average_same(values: &[f64], window: usize) -> Vec<f64> {
    let n = values.len();
    if n == 0 || window == 0 {
        return values.to_vec();
    }

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &v in values {
        acc += v;
        prefix.push(acc);
    }

    // Output i covers inputs [i + offset - (window - 1), i + offset].
    let offset = (window - 1) / 2;
    let scale = 1.0 / window as f64;
    (0..n)
        .map(|i| {
            let hi = (i + offset).min(n - 1);
            let lo = (i + offset).saturating_sub(window - 1);
            (prefix[hi + 1] - prefix[lo]) * scale
        })
        .collect()
}

/// Running sum.
pub fn cumsum(values: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut acc = 0.0;
    values
        .into_iter()
        .map(|v| {
            acc += v;
            acc
        })
        .collect()
}

/// `n` evenly spaced points over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut out: Vec<f64> = (0..n).map(|i| start + step * i as f64).collect();
            out[n - 1] = end;
            out
        }
    }
}

/// Piecewise-linear interpolation of `(xp, fp)` at each point of `x`.
///
/// `xp` must be non-decreasing. Points left of `xp[0]` take `fp[0]`, points
/// at or right of the last sample take the last value.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    debug_assert_eq!(xp.len(), fp.len());
    let (Some(&x_last), Some(&f_first), Some(&f_last)) = (xp.last(), fp.first(), fp.last())
    else {
        return vec![0.0; x.len()];
    };

    x.iter()
        .map(|&xi| {
            if xi >= x_last {
                return f_last;
            }
            // Last sample at or before xi.
            let after = xp.partition_point(|&v| v <= xi);
            if after == 0 {
                return f_first;
            }
            let j = after - 1;
            let (x0, x1) = (xp[j], xp[j + 1]);
            let t = (xi - x0) / (x1 - x0);
            fp[j] + t * (fp[j + 1] - fp[j])
        })
        .collect()
}
