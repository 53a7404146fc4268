use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::config::CtcLossConfig;
use crate::ctc::log_space::log_softmax_in_place;
use crate::ctc::LogProbMatrix;
use crate::error::CtcError;
use crate::pipeline::traits::{ItemSolver, Task, WorkerPool};
use crate::types::{CtcBatch, CtcLossOutput, ItemOutcome, ItemStatus};

/// Batch orchestrator: validates a batch, fans one solver task per item out
/// to the worker pool and gathers losses, gradients and per-item statuses.
pub struct CtcLoss {
    config: CtcLossConfig,
    worker_pool: Box<dyn WorkerPool>,
    item_solver: Box<dyn ItemSolver>,
}

pub(crate) struct CtcLossParts {
    pub config: CtcLossConfig,
    pub worker_pool: Box<dyn WorkerPool>,
    pub item_solver: Box<dyn ItemSolver>,
}

struct PreparedItem {
    seq_len: usize,
    labels: Vec<usize>,
}

impl CtcLoss {
    pub(crate) fn from_parts(parts: CtcLossParts) -> Self {
        Self {
            config: parts.config,
            worker_pool: parts.worker_pool,
            item_solver: parts.item_solver,
        }
    }

    pub fn config(&self) -> &CtcLossConfig {
        &self.config
    }

    pub fn blank_index(&self) -> usize {
        self.config.blank_index
    }

    pub fn worker_label(&self) -> String {
        self.worker_pool.label()
    }

    /// Computes one loss per item and the full batch gradient.
    ///
    /// Malformed input fails the whole batch before any work is dispatched.
    /// Infeasible or faulting items are reported through
    /// [`CtcLossOutput::statuses`] and never disturb their siblings.
    pub fn compute(&self, batch: &CtcBatch<'_>) -> Result<CtcLossOutput, CtcError> {
        validate_shape(batch, self.config.blank_index)?;
        if self.config.after_log_softmax {
            return self.compute_normalized(batch);
        }

        let mut normalized = batch.log_probs.to_vec();
        for row in normalized.chunks_mut(batch.shape.alphabet_size) {
            log_softmax_in_place(row);
        }
        self.compute_normalized(&CtcBatch {
            log_probs: &normalized,
            ..*batch
        })
    }

    /// Same as [`CtcLoss::compute`] for inputs already in log-space,
    /// regardless of `after_log_softmax`.
    pub(crate) fn compute_normalized(
        &self,
        batch: &CtcBatch<'_>,
    ) -> Result<CtcLossOutput, CtcError> {
        validate_shape(batch, self.config.blank_index)?;
        let items = prepare_items(batch)?;

        let shape = batch.shape;
        let mut losses = vec![0.0; shape.batch_size];
        let mut gradients = vec![0.0; shape.numel()];
        let mut slots: Vec<Option<ItemOutcome>> = vec![None; shape.batch_size];

        if shape.batch_size > 0 {
            tracing::debug!(
                batch_size = shape.batch_size,
                max_time = shape.max_time,
                alphabet_size = shape.alphabet_size,
                pool = %self.worker_pool.label(),
                "dispatching ctc batch"
            );

            let item_len = shape.item_len();
            let alphabet_size = shape.alphabet_size;
            let log_probs = batch.log_probs;
            let solver = self.item_solver.as_ref();

            let tasks: Vec<Task<'_>> = items
                .iter()
                .zip(gradients.chunks_mut(item_len))
                .zip(slots.iter_mut())
                .enumerate()
                .map(|(batch_index, ((item, block), slot))| {
                    Box::new(move || {
                        let offset = batch_index * item_len;
                        let rows = item.seq_len * alphabet_size;
                        let matrix = LogProbMatrix::from_rows(
                            &log_probs[offset..offset + rows],
                            item.seq_len,
                            alphabet_size,
                        );
                        let block = &mut block[..rows];
                        let result = panic::catch_unwind(AssertUnwindSafe(|| {
                            solver.solve(matrix, &item.labels, &mut *block)
                        }));
                        *slot = Some(match result {
                            Ok(outcome) => outcome,
                            Err(payload) => {
                                block.fill(0.0);
                                ItemOutcome::failed(panic_message(payload.as_ref()))
                            }
                        });
                    }) as Task<'_>
                })
                .collect();

            self.worker_pool.run_all(tasks);
        }

        let mut statuses = Vec::with_capacity(shape.batch_size);
        for (batch_index, (slot, loss)) in slots.into_iter().zip(losses.iter_mut()).enumerate() {
            let outcome =
                slot.unwrap_or_else(|| ItemOutcome::failed("worker pool did not run the task"));
            match &outcome.status {
                ItemStatus::Ok => {}
                ItemStatus::Infeasible {
                    label_len,
                    seq_len,
                    required_frames,
                } => tracing::warn!(
                    batch_index,
                    label_len = *label_len,
                    seq_len = *seq_len,
                    required_frames = *required_frames,
                    "ctc alignment infeasible; reporting infinite loss"
                ),
                ItemStatus::Failed { message } => tracing::warn!(
                    batch_index,
                    message = %message,
                    "ctc item failed; reporting infinite loss"
                ),
            }
            *loss = outcome.loss;
            statuses.push(outcome.status);
        }

        Ok(CtcLossOutput {
            losses,
            gradients,
            statuses,
            shape,
        })
    }
}

fn validate_shape(batch: &CtcBatch<'_>, blank_index: usize) -> Result<(), CtcError> {
    let shape = batch.shape;
    if shape.alphabet_size == 0 {
        return Err(CtcError::invalid_input("alphabet size must be positive"));
    }
    if blank_index >= shape.alphabet_size {
        return Err(CtcError::invalid_input(format!(
            "blank index {blank_index} outside alphabet of size {}",
            shape.alphabet_size
        )));
    }
    if batch.log_probs.len() != shape.numel() {
        return Err(CtcError::invalid_input(format!(
            "log-probability buffer has {} values, expected {}x{}x{}",
            batch.log_probs.len(),
            shape.batch_size,
            shape.max_time,
            shape.alphabet_size
        )));
    }
    if batch.labels.len() != shape.batch_size * batch.max_label_len {
        return Err(CtcError::invalid_input(format!(
            "label buffer has {} values, expected {}x{}",
            batch.labels.len(),
            shape.batch_size,
            batch.max_label_len
        )));
    }
    if batch.seq_lengths.len() != shape.batch_size
        || batch.label_lengths.len() != shape.batch_size
    {
        return Err(CtcError::invalid_input(format!(
            "expected {} sequence and label lengths, got {} and {}",
            shape.batch_size,
            batch.seq_lengths.len(),
            batch.label_lengths.len()
        )));
    }
    Ok(())
}

fn prepare_items(batch: &CtcBatch<'_>) -> Result<Vec<PreparedItem>, CtcError> {
    let shape = batch.shape;
    let mut items = Vec::with_capacity(shape.batch_size);
    for i in 0..shape.batch_size {
        let seq_len = usize::try_from(batch.seq_lengths[i])
            .ok()
            .filter(|&len| len > 0 && len <= shape.max_time)
            .ok_or_else(|| {
                CtcError::invalid_input(format!(
                    "item {i}: sequence length {} outside 1..={}",
                    batch.seq_lengths[i], shape.max_time
                ))
            })?;
        let label_len = usize::try_from(batch.label_lengths[i])
            .ok()
            .filter(|&len| len <= batch.max_label_len)
            .ok_or_else(|| {
                CtcError::invalid_input(format!(
                    "item {i}: label length {} outside 0..={}",
                    batch.label_lengths[i], batch.max_label_len
                ))
            })?;

        let start = i * batch.max_label_len;
        let labels = batch.labels[start..start + label_len]
            .iter()
            .map(|&label| {
                usize::try_from(label)
                    .ok()
                    .filter(|&l| l < shape.alphabet_size)
                    .ok_or_else(|| {
                        CtcError::invalid_input(format!(
                            "item {i}: label {label} outside alphabet of size {}",
                            shape.alphabet_size
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let offset = i * shape.item_len();
        let rows = &batch.log_probs[offset..offset + seq_len * shape.alphabet_size];
        if rows.iter().any(|v| v.is_nan() || *v == f64::INFINITY) {
            return Err(CtcError::invalid_input(format!(
                "item {i}: log-probabilities contain NaN or +inf"
            )));
        }

        items.push(PreparedItem { seq_len, labels });
    }
    Ok(items)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "solver panicked".to_string()
    }
}
