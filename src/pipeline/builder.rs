use crate::config::CtcLossConfig;
use crate::error::CtcError;
use crate::pipeline::defaults::{ForwardBackwardSolver, RayonWorkerPool, ScopedThreadPool};
use crate::pipeline::runtime::{CtcLoss, CtcLossParts};
use crate::pipeline::traits::{ItemSolver, WorkerPool};

pub struct CtcLossBuilder {
    config: CtcLossConfig,
    worker_pool: Option<Box<dyn WorkerPool>>,
    item_solver: Option<Box<dyn ItemSolver>>,
}

impl CtcLossBuilder {
    pub fn new(config: CtcLossConfig) -> Self {
        Self {
            config,
            worker_pool: None,
            item_solver: None,
        }
    }

    pub fn with_blank_index(mut self, blank_index: usize) -> Self {
        self.config.blank_index = blank_index;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.config.max_workers = Some(max_workers);
        self
    }

    pub fn with_worker_pool(mut self, worker_pool: Box<dyn WorkerPool>) -> Self {
        self.worker_pool = Some(worker_pool);
        self
    }

    pub fn with_item_solver(mut self, item_solver: Box<dyn ItemSolver>) -> Self {
        self.item_solver = Some(item_solver);
        self
    }

    pub fn build(self) -> Result<CtcLoss, CtcError> {
        self.config.validate()?;

        let worker_pool: Box<dyn WorkerPool> = match (self.worker_pool, self.config.max_workers) {
            (Some(pool), _) => pool,
            (None, Some(threads)) => Box::new(RayonWorkerPool::new(threads)?),
            (None, None) => Box::new(ScopedThreadPool),
        };
        let item_solver = self
            .item_solver
            .unwrap_or_else(|| Box::new(ForwardBackwardSolver::new(self.config.blank_index)));

        tracing::debug!(
            blank_index = self.config.blank_index,
            after_log_softmax = self.config.after_log_softmax,
            time_major = self.config.time_major,
            pool = %worker_pool.label(),
            "built ctc loss engine"
        );

        Ok(CtcLoss::from_parts(CtcLossParts {
            config: self.config,
            worker_pool,
            item_solver,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::defaults::SequentialPool;

    #[test]
    fn builder_defaults_to_scoped_threads() {
        let engine = CtcLossBuilder::new(CtcLossConfig::default())
            .build()
            .expect("build");
        assert_eq!(engine.worker_label(), "scoped-threads");
        assert_eq!(engine.blank_index(), 0);
    }

    #[test]
    fn max_workers_selects_bounded_rayon_pool() {
        let engine = CtcLossBuilder::new(CtcLossConfig::default())
            .with_max_workers(2)
            .build()
            .expect("build");
        assert_eq!(engine.worker_label(), "rayon(2)");
    }

    #[test]
    fn explicit_pool_wins_over_max_workers() {
        let engine = CtcLossBuilder::new(CtcLossConfig::default())
            .with_max_workers(4)
            .with_worker_pool(Box::new(SequentialPool))
            .build()
            .expect("build");
        assert_eq!(engine.worker_label(), "sequential");
    }

    #[test]
    fn blank_index_can_be_overridden() {
        let engine = CtcLossBuilder::new(CtcLossConfig::default())
            .with_blank_index(5)
            .build()
            .expect("build");
        assert_eq!(engine.blank_index(), 5);
    }

    #[test]
    fn build_fails_on_zero_workers() {
        let result = CtcLossBuilder::new(CtcLossConfig::default())
            .with_max_workers(0)
            .build();
        assert!(matches!(result, Err(CtcError::InvalidInput { .. })));
    }
}
