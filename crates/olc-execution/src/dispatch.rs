//! Bounded worker pool for subscriber callbacks.
//!
//! Backed by a dedicated multi-thread tokio runtime. Jobs go through
//! `spawn_blocking`, whose thread budget is capped at `workers`, so at most
//! that many callbacks run at once and the rest queue. The same runtime
//! drives the wait timers of the blocking workflows.

use std::future::Future;

use anyhow::{Context, Result};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

pub struct DispatchPool {
    handle: Handle,
    /// `Some` until drop.
    runtime: Option<Runtime>,
    workers: usize,
}

impl DispatchPool {
    /// Pool running at most `workers` callbacks concurrently (minimum 1).
    pub fn new(workers: usize) -> Result<Self> {
        let workers = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("olc-dispatch")
            .enable_time()
            .build()
            .context("failed to start callback dispatch runtime")?;
        debug!(workers, "dispatch pool started");
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            workers,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue `job` on the pool. Never runs it on the calling thread.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        // The JoinHandle is dropped: callers isolate their own failures.
        drop(self.handle.spawn_blocking(job));
    }

    /// Block the calling thread on `fut`, with the pool's timers available.
    ///
    /// # Panics
    /// If called from a thread that is already driving an async runtime.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}

impl Drop for DispatchPool {
    fn drop(&mut self) {
        // `shutdown_background` does not block, so a pool may be dropped
        // from any thread, including one of its own.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for DispatchPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchPool")
            .field("workers", &self.workers)
            .finish()
    }
}
