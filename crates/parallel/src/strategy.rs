//! Execution modes for tile jobs

use crate::pool::{PoolReport, WorkerPool};

/// How independent tile jobs are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One job after another on the calling thread
    #[default]
    Sequential,
    /// A worker pool sized to the available cores
    Pool,
    /// A worker pool with the given number of workers
    PoolWith(usize),
}

impl ExecutionMode {
    /// Mode from an optional `--workers` value: absent means sequential,
    /// 0 means one worker per core.
    pub fn from_workers(workers: Option<usize>) -> Self {
        match workers {
            None => ExecutionMode::Sequential,
            Some(0) => ExecutionMode::Pool,
            Some(n) => ExecutionMode::PoolWith(n),
        }
    }

    /// Number of workers this mode runs
    pub fn worker_count(&self) -> usize {
        match self {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Pool => num_cpus(),
            ExecutionMode::PoolWith(n) => (*n).max(1),
        }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, ExecutionMode::Sequential)
    }

    /// Run every job and wait for all of them to finish.
    ///
    /// Results come back in job order whatever the mode.
    pub fn run<J, R, F>(&self, jobs: Vec<J>, f: F) -> PoolReport<R>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> R + Sync,
    {
        match self {
            ExecutionMode::Sequential => WorkerPool::run_inline(jobs, f),
            _ => WorkerPool::new(self.worker_count()).run(jobs, f),
        }
    }
}

/// Get the number of available CPU cores
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

/// Size the global thread pool used by the block kernels.
///
/// Returns false when the pool was already built; its size then stays.
pub fn set_num_threads(threads: usize) -> bool {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_workers() {
        assert_eq!(ExecutionMode::from_workers(None), ExecutionMode::Sequential);
        assert_eq!(ExecutionMode::from_workers(Some(0)), ExecutionMode::Pool);
        assert_eq!(ExecutionMode::from_workers(Some(3)), ExecutionMode::PoolWith(3));
        assert_eq!(ExecutionMode::PoolWith(3).worker_count(), 3);
        assert_eq!(ExecutionMode::Sequential.worker_count(), 1);
        assert!(ExecutionMode::Pool.worker_count() >= 1);
    }

    #[test]
    fn test_set_num_threads_only_once() {
        // Whichever call builds the global pool first wins; later ones report false
        let _ = set_num_threads(2);
        assert!(!set_num_threads(3));
        assert!(num_cpus() >= 1);
    }

    #[test]
    fn test_modes_agree() {
        let jobs: Vec<u64> = (0..20).collect();
        for mode in [ExecutionMode::Sequential, ExecutionMode::Pool, ExecutionMode::PoolWith(3)] {
            let report = mode.run(jobs.clone(), |j| j * j);
            let values: Vec<u64> = report.results.iter().map(|r| r.result).collect();
            assert_eq!(values, jobs.iter().map(|j| j * j).collect::<Vec<_>>(), "{:?}", mode);
        }
    }
}
