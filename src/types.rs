use crate::error::CtcError;

/// Dimensions of a batch-major `batch x max_time x alphabet_size` buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchShape {
    pub batch_size: usize,
    pub max_time: usize,
    /// Includes the blank symbol.
    pub alphabet_size: usize,
}

impl BatchShape {
    pub fn new(batch_size: usize, max_time: usize, alphabet_size: usize) -> Self {
        Self {
            batch_size,
            max_time,
            alphabet_size,
        }
    }

    /// Number of values owned by one batch item.
    pub fn item_len(&self) -> usize {
        self.max_time * self.alphabet_size
    }

    pub fn numel(&self) -> usize {
        self.batch_size * self.item_len()
    }
}

/// Borrowed view of one batch of CTC inputs.
///
/// Lengths and labels are signed so that malformed values coming from a
/// caller's integer tensors can be rejected instead of wrapping.
#[derive(Debug, Clone, Copy)]
pub struct CtcBatch<'a> {
    /// Row-major `batch x max_time x alphabet_size` log-probabilities
    /// (or raw activations when the engine is configured for them).
    pub log_probs: &'a [f64],
    pub shape: BatchShape,
    /// Row-major `batch x max_label_len` label indices.
    pub labels: &'a [i64],
    pub max_label_len: usize,
    pub seq_lengths: &'a [i64],
    pub label_lengths: &'a [i64],
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemStatus {
    Ok,
    /// No monotonic alignment fits; the loss is `+inf` and the gradient is zero.
    Infeasible {
        label_len: usize,
        seq_len: usize,
        required_frames: usize,
    },
    /// The solver task faulted; the loss is `+inf` and the gradient is zero.
    Failed { message: String },
}

impl ItemStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn into_result(self, batch_index: usize) -> Result<(), CtcError> {
        match self {
            Self::Ok => Ok(()),
            Self::Infeasible {
                label_len,
                seq_len,
                required_frames,
            } => Err(CtcError::Infeasible {
                batch_index,
                label_len,
                seq_len,
                required_frames,
            }),
            Self::Failed { message } => Err(CtcError::ItemFailed {
                batch_index,
                message,
            }),
        }
    }
}

/// Result of one solver invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub loss: f64,
    pub status: ItemStatus,
}

impl ItemOutcome {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            loss: f64::INFINITY,
            status: ItemStatus::Failed {
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CtcLossOutput {
    /// One negative log-likelihood per batch item.
    pub losses: Vec<f64>,
    /// Row-major `batch x max_time x alphabet_size`. Rows past an item's
    /// sequence length stay zero.
    pub gradients: Vec<f64>,
    pub statuses: Vec<ItemStatus>,
    pub shape: BatchShape,
}

impl CtcLossOutput {
    /// Gradient block of item `batch_index`, `max_time x alphabet_size`.
    pub fn item_gradient(&self, batch_index: usize) -> &[f64] {
        let len = self.shape.item_len();
        &self.gradients[batch_index * len..(batch_index + 1) * len]
    }

    pub fn is_all_ok(&self) -> bool {
        self.statuses.iter().all(ItemStatus::is_ok)
    }

    /// First non-ok item as an explicit error.
    pub fn first_error(&self) -> Option<CtcError> {
        self.statuses
            .iter()
            .enumerate()
            .find(|(_, status)| !status.is_ok())
            .and_then(|(i, status)| status.clone().into_result(i).err())
    }

    /// Scales each item's gradient by its upstream gradient, yielding the
    /// gradient of `sum_i grad_output[i] * loss[i]`.
    pub fn backward(&self, grad_output: &[f64]) -> Result<Vec<f64>, CtcError> {
        if grad_output.len() != self.shape.batch_size {
            return Err(CtcError::invalid_input(format!(
                "grad_output has {} entries for a batch of {}",
                grad_output.len(),
                self.shape.batch_size
            )));
        }
        let item_len = self.shape.item_len();
        if item_len == 0 {
            return Ok(Vec::new());
        }
        Ok(self
            .gradients
            .chunks(item_len)
            .zip(grad_output)
            .flat_map(|(block, &scale)| block.iter().map(move |&g| g * scale))
            .collect())
    }
}
