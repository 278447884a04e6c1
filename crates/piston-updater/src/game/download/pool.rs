use std::future::Future;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Executor handle plus the number of workers a job may run at once.
///
/// Components take a pool instead of reaching for a global runtime, so a test can run jobs
/// with a single worker.
#[derive(Debug, Clone)]
pub struct DownloadPool {
    handle: Handle,
    max_workers: usize,
}

impl DownloadPool {
    pub fn new(handle: Handle, max_workers: usize) -> Self {
        Self {
            handle,
            max_workers: max_workers.max(1),
        }
    }

    /// Pool on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// When called outside a tokio runtime.
    pub fn current(max_workers: usize) -> Self {
        Self::new(Handle::current(), max_workers)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }
}
