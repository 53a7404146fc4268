/// `ln(exp(a) + exp(b))` without overflow.
///
/// `-inf` is the identity, so two unreachable states combine to `-inf`
/// instead of NaN.
#[inline(always)]
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Folds [`log_sum_exp`] over `values`; empty input gives `-inf`.
pub fn log_sum_exp_all(values: impl IntoIterator<Item = f64>) -> f64 {
    values
        .into_iter()
        .fold(f64::NEG_INFINITY, log_sum_exp)
}

/// Normalizes one row of raw activations into log-probabilities.
pub fn log_softmax_in_place(row: &mut [f64]) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return;
    }
    let sum: f64 = row.iter().map(|&x| (x - max).exp()).sum();
    let log_norm = max + sum.ln();
    for x in row.iter_mut() {
        *x -= log_norm;
    }
}
