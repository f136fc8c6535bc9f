//! # Tidemark Parallel
//!
//! Execution strategies for the HMT pipeline.
//!
//! This crate provides:
//! - `ExecutionMode`: sequential or worker-pool execution of tile jobs
//! - `WorkerPool`: typed job/result channels with a join barrier and
//!   per-worker statistics
//! - Sizing of the rayon pool used by the block kernels

pub mod pool;
pub mod strategy;

pub use pool::{JobResult, PoolReport, WorkerPool, WorkerStats};
pub use strategy::{num_cpus, set_num_threads, ExecutionMode};
