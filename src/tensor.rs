//! candle `Tensor` boundary for [`CtcLoss`].
//!
//! Inputs of any float dtype and device are moved to the CPU and widened to
//! f64 before solving. Losses and gradients are handed back in the caller's
//! dtype, on the caller's device, in the caller's layout.

use candle_core::{DType, Device, Tensor, D};

use crate::error::CtcError;
use crate::pipeline::runtime::CtcLoss;
use crate::types::{BatchShape, CtcBatch, ItemStatus};

#[derive(Debug)]
pub struct TensorCtcOutput {
    /// `[batch]`
    pub losses: Tensor,
    /// Same shape and layout as the input log-probabilities.
    pub gradients: Tensor,
    pub statuses: Vec<ItemStatus>,
}

impl CtcLoss {
    /// Tensor form of [`CtcLoss::compute`].
    ///
    /// `log_probs` is `[batch, T, A]`, or `[T, batch, A]` when the engine is
    /// time-major. `labels` is `[batch, L_max]`; both length tensors are
    /// `[batch]`. Integer inputs may use any integer dtype.
    pub fn compute_tensors(
        &self,
        log_probs: &Tensor,
        labels: &Tensor,
        seq_lengths: &Tensor,
        label_lengths: &Tensor,
    ) -> Result<TensorCtcOutput, CtcError> {
        let src_device = log_probs.device().clone();
        let src_dtype = log_probs.dtype();
        let time_major = self.config().time_major;

        let work = log_probs
            .to_device(&Device::Cpu)
            .and_then(|t| t.to_dtype(DType::F64))
            .map_err(|e| CtcError::runtime("log_probs to f64", e))?;
        let work = if time_major {
            work.transpose(0, 1)
                .and_then(|t| t.contiguous())
                .map_err(|e| CtcError::runtime("time-major transpose", e))?
        } else {
            work
        };
        let work = if self.config().after_log_softmax {
            work
        } else {
            candle_nn::ops::log_softmax(&work, D::Minus1)
                .map_err(|e| CtcError::runtime("log_softmax", e))?
        };

        let (batch_size, max_time, alphabet_size) = work
            .dims3()
            .map_err(|e| CtcError::runtime("log_probs shape", e))?;
        let values: Vec<f64> = work
            .flatten_all()
            .and_then(|t| t.to_vec1())
            .map_err(|e| CtcError::runtime("log_probs to_vec", e))?;

        let labels = labels
            .to_device(&Device::Cpu)
            .and_then(|t| t.to_dtype(DType::I64))
            .map_err(|e| CtcError::runtime("labels to i64", e))?;
        let (_, max_label_len) = labels
            .dims2()
            .map_err(|e| CtcError::runtime("labels shape", e))?;
        let labels: Vec<i64> = labels
            .flatten_all()
            .and_then(|t| t.to_vec1())
            .map_err(|e| CtcError::runtime("labels to_vec", e))?;
        let seq_lengths = lengths_to_vec(seq_lengths, "sequence lengths")?;
        let label_lengths = lengths_to_vec(label_lengths, "label lengths")?;

        let shape = BatchShape::new(batch_size, max_time, alphabet_size);
        let output = self.compute_normalized(&CtcBatch {
            log_probs: &values,
            shape,
            labels: &labels,
            max_label_len,
            seq_lengths: &seq_lengths,
            label_lengths: &label_lengths,
        })?;

        let losses = Tensor::from_vec(output.losses, batch_size, &Device::Cpu)
            .and_then(|t| t.to_dtype(src_dtype))
            .and_then(|t| t.to_device(&src_device))
            .map_err(|e| CtcError::runtime("losses to caller dtype", e))?;
        let gradients = Tensor::from_vec(
            output.gradients,
            (batch_size, max_time, alphabet_size),
            &Device::Cpu,
        )
        .map_err(|e| CtcError::runtime("gradient tensor", e))?;
        let gradients = if time_major {
            gradients
                .transpose(0, 1)
                .and_then(|t| t.contiguous())
                .map_err(|e| CtcError::runtime("time-major transpose", e))?
        } else {
            gradients
        };
        let gradients = gradients
            .to_dtype(src_dtype)
            .and_then(|t| t.to_device(&src_device))
            .map_err(|e| CtcError::runtime("gradients to caller dtype", e))?;

        Ok(TensorCtcOutput {
            losses,
            gradients,
            statuses: output.statuses,
        })
    }
}

/// Scales each item's gradient block by its upstream gradient `[batch]`.
pub fn backward_tensor(
    gradients: &Tensor,
    grad_output: &Tensor,
    time_major: bool,
) -> Result<Tensor, CtcError> {
    let batch_size = grad_output
        .dims1()
        .map_err(|e| CtcError::runtime("grad_output shape", e))?;
    let scale_shape = if time_major {
        (1, batch_size, 1)
    } else {
        (batch_size, 1, 1)
    };
    grad_output
        .to_dtype(gradients.dtype())
        .and_then(|t| t.to_device(gradients.device()))
        .and_then(|t| t.reshape(scale_shape))
        .and_then(|scale| gradients.broadcast_mul(&scale))
        .map_err(|e| CtcError::runtime("scale gradients", e))
}

fn lengths_to_vec(lengths: &Tensor, what: &'static str) -> Result<Vec<i64>, CtcError> {
    lengths
        .to_device(&Device::Cpu)
        .and_then(|t| t.to_dtype(DType::I64))
        .and_then(|t| t.to_vec1())
        .map_err(|e| CtcError::runtime(what, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CtcLossConfig;
    use crate::pipeline::builder::CtcLossBuilder;

    fn engine(config: CtcLossConfig) -> CtcLoss {
        CtcLossBuilder::new(config).build().expect("build")
    }

    fn inputs() -> (Tensor, Tensor, Tensor, Tensor) {
        let logits = Tensor::new(
            &[
                [[0.2f32, 1.0, -0.5], [0.1, -0.3, 0.9], [1.2, 0.0, 0.4]],
                [[-0.4f32, 0.6, 0.3], [0.8, 0.1, -1.0], [0.0, 0.0, 0.0]],
            ],
            &Device::Cpu,
        )
        .unwrap();
        let log_probs = candle_nn::ops::log_softmax(&logits, D::Minus1).unwrap();
        let labels = Tensor::new(&[[1u32, 2], [2, 0]], &Device::Cpu).unwrap();
        let seq_lengths = Tensor::new(&[3u32, 2], &Device::Cpu).unwrap();
        let label_lengths = Tensor::new(&[2u32, 1], &Device::Cpu).unwrap();
        (log_probs, labels, seq_lengths, label_lengths)
    }

    #[test]
    fn round_trips_caller_dtype_and_shape() {
        let (log_probs, labels, seq, lab) = inputs();
        let out = engine(CtcLossConfig::default())
            .compute_tensors(&log_probs, &labels, &seq, &lab)
            .unwrap();
        assert_eq!(out.losses.dtype(), DType::F32);
        assert_eq!(out.gradients.dtype(), DType::F32);
        assert_eq!(out.losses.dims(), &[2]);
        assert_eq!(out.gradients.dims(), &[2, 3, 3]);
        assert!(out.statuses.iter().all(ItemStatus::is_ok));

        let losses: Vec<f32> = out.losses.to_vec1().unwrap();
        assert!(losses.iter().all(|l| l.is_finite() && *l > 0.0));
        // last frame of the second item is past its sequence length
        let grads: Vec<Vec<Vec<f32>>> = out.gradients.to_vec3().unwrap();
        assert!(grads[1][2].iter().all(|&g| g == 0.0));
    }

    #[test]
    fn raw_logits_match_pre_normalized_input() {
        let (log_probs, labels, seq, lab) = inputs();
        let normalized = engine(CtcLossConfig::default())
            .compute_tensors(&log_probs, &labels, &seq, &lab)
            .unwrap();

        let shifted = (&log_probs + 3.0).unwrap();
        let raw = engine(CtcLossConfig {
            after_log_softmax: false,
            ..CtcLossConfig::default()
        })
        .compute_tensors(&shifted, &labels, &seq, &lab)
        .unwrap();

        let a: Vec<f32> = normalized.losses.to_vec1().unwrap();
        let b: Vec<f32> = raw.losses.to_vec1().unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn time_major_layout_is_preserved() {
        let (log_probs, labels, seq, lab) = inputs();
        let batch_major = engine(CtcLossConfig::default())
            .compute_tensors(&log_probs, &labels, &seq, &lab)
            .unwrap();

        let tm_input = log_probs.transpose(0, 1).unwrap().contiguous().unwrap();
        let time_major = engine(CtcLossConfig {
            time_major: true,
            ..CtcLossConfig::default()
        })
        .compute_tensors(&tm_input, &labels, &seq, &lab)
        .unwrap();

        assert_eq!(time_major.gradients.dims(), &[3, 2, 3]);
        let expected: Vec<Vec<Vec<f32>>> = batch_major
            .gradients
            .transpose(0, 1)
            .unwrap()
            .to_vec3()
            .unwrap();
        let actual: Vec<Vec<Vec<f32>>> = time_major.gradients.to_vec3().unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn infeasible_item_yields_infinite_loss_tensor() {
        let (log_probs, _, _, _) = inputs();
        let labels = Tensor::new(&[[1u32, 2, 1], [1, 2, 1]], &Device::Cpu).unwrap();
        let seq = Tensor::new(&[3u32, 2], &Device::Cpu).unwrap();
        let lab = Tensor::new(&[3u32, 3], &Device::Cpu).unwrap();
        let out = engine(CtcLossConfig::default())
            .compute_tensors(&log_probs, &labels, &seq, &lab)
            .unwrap();
        let losses: Vec<f32> = out.losses.to_vec1().unwrap();
        assert!(losses[0].is_finite());
        assert_eq!(losses[1], f32::INFINITY);
        assert!(!out.statuses[1].is_ok());
    }

    #[test]
    fn backward_tensor_scales_each_item() {
        let grads = Tensor::new(
            &[[[1.0f32, 2.0], [3.0, 4.0]], [[1.0, 1.0], [1.0, 1.0]]],
            &Device::Cpu,
        )
        .unwrap();
        let upstream = Tensor::new(&[2.0f32, -1.0], &Device::Cpu).unwrap();
        let scaled: Vec<Vec<Vec<f32>>> = backward_tensor(&grads, &upstream, false)
            .unwrap()
            .to_vec3()
            .unwrap();
        assert_eq!(
            scaled,
            vec![
                vec![vec![2.0, 4.0], vec![6.0, 8.0]],
                vec![vec![-1.0, -1.0], vec![-1.0, -1.0]],
            ]
        );

        let tm: Vec<Vec<Vec<f32>>> = backward_tensor(&grads, &upstream, true)
            .unwrap()
            .to_vec3()
            .unwrap();
        assert_eq!(tm[0][1], vec![-3.0, -4.0]);
        assert_eq!(tm[1][0], vec![2.0, 2.0]);
    }

    #[test]
    fn wrong_rank_is_a_runtime_error() {
        let flat = Tensor::new(&[0.0f32, 0.0], &Device::Cpu).unwrap();
        let (_, labels, seq, lab) = inputs();
        let result = engine(CtcLossConfig::default()).compute_tensors(&flat, &labels, &seq, &lab);
        assert!(matches!(result, Err(CtcError::Runtime { .. })));
    }
}
