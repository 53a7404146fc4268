use std::ops::Range;

use super::log_space::log_sum_exp;
use super::LogProbMatrix;

/// Alpha and beta tables over the `(2L+1) x T` alignment lattice.
///
/// Storage is frame-major (`t * states + j`) and is reused across
/// [`Lattice::reset`] calls, so one lattice per worker thread serves every
/// item that thread solves.
#[derive(Debug, Default, Clone)]
pub struct Lattice {
    states: usize,
    frames: usize,
    alpha: Vec<f64>,
    beta: Vec<f64>,
}

impl Lattice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resizes to `states x frames` and marks every cell unreachable.
    pub fn reset(&mut self, states: usize, frames: usize) {
        let cells = states * frames;
        self.states = states;
        self.frames = frames;
        self.alpha.clear();
        self.alpha.resize(cells, f64::NEG_INFINITY);
        self.beta.clear();
        self.beta.resize(cells, f64::NEG_INFINITY);
    }

    pub fn states(&self) -> usize {
        self.states
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    #[inline]
    pub fn alpha(&self, j: usize, t: usize) -> f64 {
        self.alpha[t * self.states + j]
    }

    #[inline]
    pub fn beta(&self, j: usize, t: usize) -> f64 {
        self.beta[t * self.states + j]
    }

    /// Lattice rows that can be both reached from the start and still reach
    /// a final state by the last frame.
    #[inline]
    pub fn window(&self, t: usize) -> Range<usize> {
        reachable_window(self.states, self.frames, t)
    }

    /// Fills alpha and returns the log-likelihood of the full label sequence.
    pub fn forward(
        &mut self,
        log_probs: &LogProbMatrix<'_>,
        extended: &[usize],
        blank: usize,
    ) -> f64 {
        let states = self.states;
        let frames = self.frames;
        debug_assert_eq!(extended.len(), states);
        debug_assert_eq!(log_probs.frames(), frames);

        let first = log_probs.row(0);
        self.alpha[0] = first[extended[0]];
        if states > 1 {
            self.alpha[1] = first[extended[1]];
        }

        for t in 1..frames {
            let row = log_probs.row(t);
            let prev = (t - 1) * states;
            let curr = t * states;
            for j in reachable_window(states, frames, t) {
                let mut acc = self.alpha[prev + j];
                if j > 0 {
                    acc = log_sum_exp(acc, self.alpha[prev + j - 1]);
                    if allows_skip_from_before(extended, j, blank) {
                        acc = log_sum_exp(acc, self.alpha[prev + j - 2]);
                    }
                }
                self.alpha[curr + j] = acc + row[extended[j]];
            }
        }

        let last = (frames - 1) * states;
        if states > 1 {
            log_sum_exp(self.alpha[last + states - 1], self.alpha[last + states - 2])
        } else {
            self.alpha[last]
        }
    }

    /// Fills beta and returns the log-likelihood seen from the first frame,
    /// which must agree with [`Lattice::forward`].
    pub fn backward(
        &mut self,
        log_probs: &LogProbMatrix<'_>,
        extended: &[usize],
        blank: usize,
    ) -> f64 {
        let states = self.states;
        let frames = self.frames;
        debug_assert_eq!(extended.len(), states);

        let last = (frames - 1) * states;
        self.beta[last + states - 1] = 0.0;
        if states > 1 {
            self.beta[last + states - 2] = 0.0;
        }

        for t in (0..frames - 1).rev() {
            let next_row = log_probs.row(t + 1);
            let next = (t + 1) * states;
            let curr = t * states;
            for j in reachable_window(states, frames, t) {
                let label = extended[j];
                let mut acc = self.beta[next + j] + next_row[label];
                if j + 1 < states {
                    acc = log_sum_exp(acc, self.beta[next + j + 1] + next_row[extended[j + 1]]);
                    if label != blank && j + 2 < states && extended[j + 2] != label {
                        acc = log_sum_exp(acc, self.beta[next + j + 2] + next_row[extended[j + 2]]);
                    }
                }
                self.beta[curr + j] = acc;
            }
        }

        let first = log_probs.row(0);
        let mut total = self.beta[0] + first[extended[0]];
        if states > 1 {
            total = log_sum_exp(total, self.beta[1] + first[extended[1]]);
        }
        total
    }
}

/// `[max(0, S - 2(T - t)), min(2t + 2, S))` for `S` lattice rows and `T` frames.
#[inline]
pub fn reachable_window(states: usize, frames: usize, t: usize) -> Range<usize> {
    let start = states.saturating_sub(2 * (frames - t));
    let end = (2 * t + 2).min(states);
    start..end.max(start)
}

/// A non-blank row may be entered directly from two rows up unless that row
/// carries the same label.
#[inline(always)]
fn allows_skip_from_before(extended: &[usize], j: usize, blank: usize) -> bool {
    j >= 2 && extended[j] != blank && extended[j - 2] != extended[j]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_for_tight_alignment() {
        // 2 labels, 2 frames: ext [b, a, b, c, b]
        assert_eq!(reachable_window(5, 2, 0), 1..2);
        assert_eq!(reachable_window(5, 2, 1), 3..4);
    }

    #[test]
    fn window_grows_then_shrinks() {
        assert_eq!(reachable_window(5, 4, 0), 0..2);
        assert_eq!(reachable_window(5, 4, 1), 0..4);
        assert_eq!(reachable_window(5, 4, 2), 1..5);
        assert_eq!(reachable_window(5, 4, 3), 3..5);
    }

    #[test]
    fn window_is_empty_not_inverted_when_infeasible() {
        let w = reachable_window(7, 2, 0);
        assert!(w.is_empty());
    }

    #[test]
    fn reset_marks_all_cells_unreachable() {
        let mut lattice = Lattice::new();
        lattice.reset(3, 2);
        lattice.alpha[0] = 0.0;
        lattice.reset(5, 3);
        assert_eq!(lattice.states(), 5);
        assert_eq!(lattice.frames(), 3);
        for t in 0..3 {
            for j in 0..5 {
                assert_eq!(lattice.alpha(j, t), f64::NEG_INFINITY);
                assert_eq!(lattice.beta(j, t), f64::NEG_INFINITY);
            }
        }
    }

    #[test]
    fn skip_blocked_for_blank_and_repeat() {
        let ext = [0, 1, 0, 1, 0, 2, 0];
        assert!(!allows_skip_from_before(&ext, 1, 0));
        assert!(!allows_skip_from_before(&ext, 2, 0));
        assert!(!allows_skip_from_before(&ext, 3, 0));
        assert!(allows_skip_from_before(&ext, 5, 0));
    }
}
