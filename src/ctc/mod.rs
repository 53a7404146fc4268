pub mod extended;
pub mod gradient;
pub mod lattice;
pub mod log_space;
pub mod solver;

use crate::error::CtcError;

/// Read-only `frames x alphabet_size` view over one item's log-probabilities.
#[derive(Debug, Clone, Copy)]
pub struct LogProbMatrix<'a> {
    data: &'a [f64],
    frames: usize,
    alphabet_size: usize,
}

impl<'a> LogProbMatrix<'a> {
    pub fn new(data: &'a [f64], frames: usize, alphabet_size: usize) -> Result<Self, CtcError> {
        if frames == 0 || alphabet_size == 0 {
            return Err(CtcError::invalid_input(format!(
                "log-probability matrix must be non-empty, got {frames}x{alphabet_size}"
            )));
        }
        if data.len() != frames * alphabet_size {
            return Err(CtcError::invalid_input(format!(
                "log-probability buffer has {} values, expected {frames}x{alphabet_size}",
                data.len()
            )));
        }
        Ok(Self::from_rows(data, frames, alphabet_size))
    }

    /// Caller guarantees `data.len() == frames * alphabet_size`.
    pub(crate) fn from_rows(data: &'a [f64], frames: usize, alphabet_size: usize) -> Self {
        debug_assert_eq!(data.len(), frames * alphabet_size);
        Self {
            data,
            frames,
            alphabet_size,
        }
    }

    #[inline]
    pub fn row(&self, t: usize) -> &'a [f64] {
        &self.data[t * self.alphabet_size..(t + 1) * self.alphabet_size]
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn as_slice(&self) -> &'a [f64] {
        self.data
    }
}
