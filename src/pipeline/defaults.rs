use std::cell::RefCell;

use crate::ctc::solver::{solve_item, Workspace};
use crate::ctc::LogProbMatrix;
use crate::error::CtcError;
use crate::pipeline::traits::{ItemSolver, Task, WorkerPool};
use crate::types::ItemOutcome;

thread_local! {
    static WORKSPACE: RefCell<Workspace> = RefCell::new(Workspace::new());
}

/// Log-space forward-backward solver with a per-thread reusable workspace.
pub struct ForwardBackwardSolver {
    blank_index: usize,
}

impl ForwardBackwardSolver {
    pub fn new(blank_index: usize) -> Self {
        Self { blank_index }
    }

    pub fn blank_index(&self) -> usize {
        self.blank_index
    }
}

impl ItemSolver for ForwardBackwardSolver {
    fn solve(
        &self,
        log_probs: LogProbMatrix<'_>,
        labels: &[usize],
        gradient: &mut [f64],
    ) -> ItemOutcome {
        WORKSPACE.with(|cell| match cell.try_borrow_mut() {
            Ok(mut workspace) => {
                solve_item(&log_probs, labels, self.blank_index, &mut workspace, gradient)
            }
            // re-entrant call on this thread, fall back to a private workspace
            Err(_) => solve_item(
                &log_probs,
                labels,
                self.blank_index,
                &mut Workspace::new(),
                gradient,
            ),
        })
    }
}

/// One scoped OS thread per task, joined before returning.
pub struct ScopedThreadPool;

impl WorkerPool for ScopedThreadPool {
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>) {
        std::thread::scope(|s| {
            for task in tasks {
                s.spawn(task);
            }
        });
    }

    fn label(&self) -> String {
        "scoped-threads".to_string()
    }
}

/// Bounded rayon pool shared by every batch the engine computes.
pub struct RayonWorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl RayonWorkerPool {
    pub fn new(threads: usize) -> Result<Self, CtcError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("ctc-worker-{i}"))
            .build()
            .map_err(|e| CtcError::runtime("build rayon pool", e))?;
        Ok(Self { pool, threads })
    }
}

impl WorkerPool for RayonWorkerPool {
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>) {
        self.pool.scope(|s| {
            for task in tasks {
                s.spawn(move |_| task());
            }
        });
    }

    fn label(&self) -> String {
        format!("rayon({})", self.threads)
    }
}

/// Runs tasks in submission order on the calling thread.
pub struct SequentialPool;

impl WorkerPool for SequentialPool {
    fn run_all<'a>(&self, tasks: Vec<Task<'a>>) {
        for task in tasks {
            task();
        }
    }

    fn label(&self) -> String {
        "sequential".to_string()
    }
}
