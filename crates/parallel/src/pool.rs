//! Worker pool for independent tile jobs
//!
//! Jobs go out on one typed channel, results come back on another. The
//! caller blocks until every worker has drained the job queue and exited,
//! then reads back each worker's statistics.

use crossbeam_channel::unbounded;
use std::time::{Duration, Instant};
use tracing::debug;

/// What one worker did during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkerStats {
    pub worker: usize,
    pub jobs: usize,
    /// Time spent inside jobs
    pub busy: Duration,
}

/// Result of one job, tagged with its submission index
#[derive(Debug)]
pub struct JobResult<R> {
    pub id: usize,
    pub worker: usize,
    pub elapsed: Duration,
    pub result: R,
}

/// Everything a run produced
#[derive(Debug)]
pub struct PoolReport<R> {
    /// Results in submission order
    pub results: Vec<JobResult<R>>,
    /// One entry per worker, by worker index
    pub stats: Vec<WorkerStats>,
    pub wall_time: Duration,
}

impl<R> PoolReport<R> {
    pub fn total_jobs(&self) -> usize {
        self.stats.iter().map(|s| s.jobs).sum()
    }
}

/// Fixed-size pool of worker threads
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run all jobs on the pool and block until every worker has exited.
    ///
    /// A panic inside a job is re-raised on the calling thread after the join.
    pub fn run<J, R, F>(&self, jobs: Vec<J>, f: F) -> PoolReport<R>
    where
        J: Send,
        R: Send,
        F: Fn(J) -> R + Sync,
    {
        let start = Instant::now();
        let (job_tx, job_rx) = unbounded::<(usize, J)>();
        let (result_tx, result_rx) = unbounded::<JobResult<R>>();

        for (id, job) in jobs.into_iter().enumerate() {
            if job_tx.send((id, job)).is_err() {
                break;
            }
        }
        // Closing the queue lets workers exit once it is drained
        drop(job_tx);

        let f = &f;
        let stats: Vec<WorkerStats> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.workers)
                .map(|worker| {
                    let jobs = job_rx.clone();
                    let results = result_tx.clone();
                    scope.spawn(move || {
                        let mut stats = WorkerStats {
                            worker,
                            ..Default::default()
                        };
                        for (id, job) in jobs.iter() {
                            debug!("worker {} picked up job {}", worker, id);
                            let t0 = Instant::now();
                            let result = f(job);
                            let elapsed = t0.elapsed();
                            stats.jobs += 1;
                            stats.busy += elapsed;
                            let sent = results.send(JobResult {
                                id,
                                worker,
                                elapsed,
                                result,
                            });
                            if sent.is_err() {
                                break;
                            }
                        }
                        stats
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
                .collect()
        });
        drop(result_tx);

        let mut results: Vec<_> = result_rx.try_iter().collect();
        results.sort_by_key(|r| r.id);

        PoolReport {
            results,
            stats,
            wall_time: start.elapsed(),
        }
    }

    /// Run all jobs on the calling thread, reporting as a single worker
    pub fn run_inline<J, R, F>(jobs: Vec<J>, f: F) -> PoolReport<R>
    where
        F: Fn(J) -> R,
    {
        let start = Instant::now();
        let mut stats = WorkerStats::default();
        let results = jobs
            .into_iter()
            .enumerate()
            .map(|(id, job)| {
                let t0 = Instant::now();
                let result = f(job);
                let elapsed = t0.elapsed();
                stats.jobs += 1;
                stats.busy += elapsed;
                JobResult {
                    id,
                    worker: 0,
                    elapsed,
                    result,
                }
            })
            .collect();

        PoolReport {
            results,
            stats: vec![stats],
            wall_time: start.elapsed(),
        }
    }
}
