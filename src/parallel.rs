//! Injectable map strategies for fanning group tasks out and back in.
//!
//! Every strategy returns results in input order (index correspondence, not
//! completion order) and only returns once every task has finished.

use crate::error::{PreprocessError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// A map-style execution strategy.
pub trait ParallelMap {
    fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send;
}

/// Runs tasks one after another on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialMap;

impl ParallelMap for SequentialMap {
    fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        items.into_iter().map(f).collect()
    }
}

/// Runs tasks on a rayon thread pool: the global one, or a dedicated pool.
#[derive(Clone, Default)]
pub struct RayonMap {
    pool: Option<Arc<ThreadPool>>,
}

impl RayonMap {
    /// Uses rayon's global pool.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Builds a dedicated pool with `num_threads` workers.
    pub fn with_num_threads(num_threads: usize) -> Result<Self> {
        if num_threads == 0 {
            return Err(PreprocessError::invalid_configuration("num_threads must be greater than 0"));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("pace-preprocess-{}", i))
            .build()
            .map_err(|e| PreprocessError::invalid_configuration(format!("failed to build thread pool: {}", e)))?;
        Ok(Self { pool: Some(Arc::new(pool)) })
    }

    /// Number of worker threads tasks will run on.
    pub fn current_num_threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }
}

impl std::fmt::Debug for RayonMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonMap")
            .field("dedicated_pool", &self.pool.is_some())
            .field("num_threads", &self.current_num_threads())
            .finish()
    }
}

impl ParallelMap for RayonMap {
    fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync + Send,
    {
        // Indexed collect keeps input order.
        match &self.pool {
            Some(pool) => pool.install(|| items.into_par_iter().map(f).collect()),
            None => items.into_par_iter().map(f).collect(),
        }
    }
}
