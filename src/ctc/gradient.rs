use super::lattice::Lattice;
use super::log_space::log_sum_exp;
use super::LogProbMatrix;

/// Accumulates `ln sum_j alpha[j][t] * beta[j][t]` per `(t, symbol)` into
/// `marginals` (`frames x alphabet_size`). Symbols absent from `extended`
/// stay at `-inf`.
pub fn accumulate_marginals(
    lattice: &Lattice,
    extended: &[usize],
    alphabet_size: usize,
    marginals: &mut Vec<f64>,
) {
    let frames = lattice.frames();
    marginals.clear();
    marginals.resize(frames * alphabet_size, f64::NEG_INFINITY);

    for t in 0..frames {
        let cells = &mut marginals[t * alphabet_size..(t + 1) * alphabet_size];
        for j in lattice.window(t) {
            let occupancy = lattice.alpha(j, t) + lattice.beta(j, t);
            let symbol = extended[j];
            cells[symbol] = log_sum_exp(cells[symbol], occupancy);
        }
    }
}

/// Writes `exp(logp) - exp(marginal - log_likelihood)` for every frame of
/// `log_probs` into the first `frames x alphabet_size` values of `gradient`.
pub fn write_gradient(
    log_probs: &LogProbMatrix<'_>,
    marginals: &[f64],
    log_likelihood: f64,
    gradient: &mut [f64],
) {
    let values = log_probs.as_slice();
    debug_assert_eq!(marginals.len(), values.len());
    for ((g, &logp), &marginal) in gradient.iter_mut().zip(values).zip(marginals) {
        *g = logp.exp() - (marginal - log_likelihood).exp();
    }
}
