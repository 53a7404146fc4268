use crate::ctc::LogProbMatrix;
use crate::types::ItemOutcome;

/// One independent unit of batch work.
pub type Task<'a> = Box<dyn FnOnce() + Send + 'a>;

pub trait ItemSolver: Send + Sync {
    /// Solves one item, writing its `frames x alphabet_size` gradient block.
    fn solve(
        &self,
        log_probs: LogProbMatrix<'_>,
        labels: &[usize],
        gradient: &mut [f64],
    ) -> ItemOutcome;
}

/// "Submit independent units of work, then wait for all of them."
pub trait WorkerPool: Send + Sync {
    /// Returns only after every task has run to completion.
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>);

    fn label(&self) -> String;
}
