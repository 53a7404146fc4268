//! Connectionist Temporal Classification loss and gradient for batches of
//! variable-length sequences.
//!
//! Each batch item is solved independently by a log-space forward-backward
//! pass over the blank-interleaved label lattice; items run in parallel on a
//! [`WorkerPool`] and write into disjoint blocks of the batch outputs.

pub mod config;
pub mod ctc;
pub mod error;
pub mod pipeline;
#[cfg(feature = "candle")]
pub mod tensor;
pub mod types;

pub use config::CtcLossConfig;
pub use ctc::LogProbMatrix;
pub use error::CtcError;
pub use pipeline::builder::CtcLossBuilder;
pub use pipeline::runtime::CtcLoss;
pub use pipeline::traits::{ItemSolver, Task, WorkerPool};
#[cfg(feature = "candle")]
pub use tensor::{backward_tensor, TensorCtcOutput};
pub use types::{BatchShape, CtcBatch, CtcLossOutput, ItemOutcome, ItemStatus};
