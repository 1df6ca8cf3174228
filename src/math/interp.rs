//! Linear interpolation and integration on sampled axes.
//!
//! All routines expect an **ascending** axis; callers holding a descending axis
//! reverse it first (see [`ascending`]).

/// Return `(x, y)` sorted ascending in `x`.
///
/// The input is assumed strictly monotonic (either direction), so a reversal is
/// enough.
pub fn ascending(x: &[f64], y: &[f64]) -> (Vec<f64>, Vec<f64>) {
    if x.len() >= 2 && x[0] > x[x.len() - 1] {
        (x.iter().rev().copied().collect(), y.iter().rev().copied().collect())
    } else {
        (x.to_vec(), y.to_vec())
    }
}

/// Linearly interpolate `(x, y)` at `xq`. Points outside `[x0, xn]` give NaN.
pub fn interp_linear(x: &[f64], y: &[f64], xq: f64) -> f64 {
    let n = x.len();
    if n == 0 || !xq.is_finite() {
        return f64::NAN;
    }
    if n == 1 {
        return if xq == x[0] { y[0] } else { f64::NAN };
    }
    if xq < x[0] || xq > x[n - 1] {
        return f64::NAN;
    }

    // First index with x[i] >= xq.
    let i = x.partition_point(|&v| v < xq);
    if i < n && x[i] == xq {
        return y[i];
    }
    let (x0, x1) = (x[i - 1], x[i]);
    let (y0, y1) = (y[i - 1], y[i]);
    y0 + (y1 - y0) * (xq - x0) / (x1 - x0)
}

/// Trapezoidal integral, skipping any interval touching a NaN.
pub fn trapz(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .filter(|(_, yy)| yy[0].is_finite() && yy[1].is_finite())
        .map(|(xx, yy)| 0.5 * (yy[0] + yy[1]) * (xx[1] - xx[0]))
        .sum()
}

/// Exact integral of the piecewise-linear function `(x, y)` over `[a, b]`.
///
/// The range is clipped to the axis. Returns 0 for an empty overlap.
pub fn integrate_between(x: &[f64], y: &[f64], a: f64, b: f64) -> f64 {
    let n = x.len();
    if n < 2 {
        return 0.0;
    }
    let lo = a.max(x[0]);
    let hi = b.min(x[n - 1]);
    if !(hi > lo) {
        return 0.0;
    }

    let mut xs = Vec::new();
    let mut ys = Vec::new();
    xs.push(lo);
    ys.push(interp_linear(x, y, lo));
    for (&xi, &yi) in x.iter().zip(y) {
        if xi > lo && xi < hi {
            xs.push(xi);
            ys.push(yi);
        }
    }
    xs.push(hi);
    ys.push(interp_linear(x, y, hi));
    trapz(&xs, &ys)
}

/// Whether `x` is strictly monotonic (either direction) and finite.
pub fn is_strictly_monotonic(x: &[f64]) -> bool {
    if x.iter().any(|v| !v.is_finite()) {
        return false;
    }
    if x.len() < 2 {
        return true;
    }
    let increasing = x.windows(2).all(|w| w[1] > w[0]);
    let decreasing = x.windows(2).all(|w| w[1] < w[0]);
    increasing || decreasing
}
