//! Download jobs.
//!
//! A job drains a shared queue with a fixed number of worker tasks. A failed download goes
//! to the back of the queue before its worker polls again, so the queue can only look empty
//! to a worker once nothing is left to retry. Workers report on an event channel; a single
//! coordinator counts worker exits and fires the finish callback exactly once.

use crate::config::{MAX_ATTEMPTS_PER_FILE, PROGRESS_INTERVAL_MS};
use crate::error::UpdaterError;
use crate::game::download::downloadable::{lock, Downloadable};
use crate::game::download::pool::DownloadPool;
use crate::game::download::progress::{JobEvent, JobProgress};
use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;

/// Receives job lifecycle callbacks
pub trait DownloadListener: Send + Sync {
    /// Called exactly once, after every worker has stopped
    fn on_download_job_finished(&self, job: &DownloadJob);

    fn on_download_job_progress_changed(&self, _job: &DownloadJob) {}
}

/// A listener that does nothing.
pub struct SilentDownloadListener;

impl DownloadListener for SilentDownloadListener {
    fn on_download_job_finished(&self, _job: &DownloadJob) {}
}

/// A named, single-use batch of downloads
#[derive(Clone)]
pub struct DownloadJob {
    inner: Arc<JobInner>,
}

struct JobInner {
    name: String,
    ignore_failures: bool,
    listener: Arc<dyn DownloadListener>,
    all_files: Mutex<Vec<Arc<Downloadable>>>,
    queue: Mutex<VecDeque<Arc<Downloadable>>>,
    successful: Mutex<Vec<Arc<Downloadable>>>,
    failures: Mutex<Vec<Arc<Downloadable>>>,
    remaining_workers: AtomicUsize,
    started: AtomicBool,
    finished: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    elapsed: Mutex<Option<Duration>>,
    events: UnboundedSender<JobEvent>,
    receiver: Mutex<Option<UnboundedReceiver<JobEvent>>>,
    done: watch::Sender<bool>,
}

impl DownloadJob {
    /// `ignore_failures` jobs never record failed downloads; use it for optional content.
    pub fn new(name: impl Into<String>, ignore_failures: bool, listener: Arc<dyn DownloadListener>) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(false);

        Self {
            inner: Arc::new(JobInner {
                name: name.into(),
                ignore_failures,
                listener,
                all_files: Mutex::new(Vec::new()),
                queue: Mutex::new(VecDeque::new()),
                successful: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
                remaining_workers: AtomicUsize::new(0),
                started: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                started_at: Mutex::new(None),
                elapsed: Mutex::new(None),
                events,
                receiver: Mutex::new(Some(receiver)),
                done,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn ignores_failures(&self) -> bool {
        self.inner.ignore_failures
    }

    pub fn add_downloadable(&self, download: Downloadable) -> Result<(), UpdaterError> {
        self.add_downloadables([download])
    }

    /// Queue downloads. Only allowed before [`DownloadJob::start`].
    pub fn add_downloadables(
        &self,
        downloads: impl IntoIterator<Item = Downloadable>,
    ) -> Result<(), UpdaterError> {
        // Checked under the file list lock so a concurrent start sees every accepted file
        let mut all_files = lock(&self.inner.all_files);
        if self.is_started() {
            return Err(UpdaterError::JobAlreadyStarted {
                name: self.inner.name.clone(),
            });
        }

        let mut queue = lock(&self.inner.queue);
        for download in downloads {
            let download = Arc::new(download);
            download.monitor().attach(self.inner.events.clone());
            all_files.push(download.clone());
            queue.push_back(download);
        }
        Ok(())
    }

    /// Spawn `pool.max_workers()` workers and a coordinator. An empty job finishes here.
    pub fn start(&self, pool: &DownloadPool) -> Result<(), UpdaterError> {
        let already_started = || UpdaterError::JobAlreadyStarted {
            name: self.inner.name.clone(),
        };

        let file_count = {
            let all_files = lock(&self.inner.all_files);
            if self.inner.started.swap(true, Ordering::AcqRel) {
                return Err(already_started());
            }
            all_files.len()
        };
        let Some(receiver) = lock(&self.inner.receiver).take() else {
            return Err(already_started());
        };
        *lock(&self.inner.started_at) = Some(Instant::now());

        if file_count == 0 {
            log::info!("Download job '{}' skipped as there are no files to download", self.inner.name);
            self.inner.finish();
            return Ok(());
        }

        let workers = pool.max_workers();
        self.inner.remaining_workers.store(workers, Ordering::Release);
        log::info!(
            "Download job '{}' started ({} workers, {} files)",
            self.inner.name,
            workers,
            file_count
        );

        pool.spawn(coordinate(self.inner.clone(), receiver, workers));
        for _ in 0..workers {
            pool.spawn(work(self.inner.clone()));
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    /// Started, nothing queued and no worker still running
    pub fn is_complete(&self) -> bool {
        self.is_started()
            && lock(&self.inner.queue).is_empty()
            && self.inner.remaining_workers.load(Ordering::Acquire) == 0
    }

    /// Whether the finish callback has fired
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Resolves once the finish callback has fired.
    pub async fn wait(&self) {
        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|finished| *finished).await;
    }

    pub fn file_count(&self) -> usize {
        lock(&self.inner.all_files).len()
    }

    pub fn all_files(&self) -> Vec<Arc<Downloadable>> {
        lock(&self.inner.all_files).clone()
    }

    pub fn successful(&self) -> usize {
        lock(&self.inner.successful).len()
    }

    pub fn failures(&self) -> usize {
        lock(&self.inner.failures).len()
    }

    pub fn failed_downloads(&self) -> Vec<Arc<Downloadable>> {
        lock(&self.inner.failures).clone()
    }

    /// `Err(JobFailed)` when any download was given up on
    pub fn ensure_success(&self) -> Result<(), UpdaterError> {
        match self.failures() {
            0 => Ok(()),
            failures => Err(UpdaterError::JobFailed {
                name: self.inner.name.clone(),
                failures,
            }),
        }
    }

    /// Running time so far, or the total once finished
    pub fn elapsed(&self) -> Option<Duration> {
        if let Some(elapsed) = *lock(&self.inner.elapsed) {
            return Some(elapsed);
        }
        lock(&self.inner.started_at).map(|started| started.elapsed())
    }

    /// Summed progress of every file, taken under the job lock
    pub fn progress(&self) -> JobProgress {
        let files = lock(&self.inner.all_files);
        let mut progress = JobProgress::default();
        let mut longest: Option<(&Arc<Downloadable>, Instant)> = None;

        for file in files.iter() {
            progress.current += file.monitor().current();
            progress.total += file.monitor().total();

            if file.finished_at().is_some() {
                continue;
            }
            if let Some(started) = file.started_at() {
                if longest.map_or(true, |(_, oldest)| started < oldest) {
                    longest = Some((file, started));
                }
            }
        }

        progress.status = longest.map(|(file, _)| file.status());
        progress
    }
}

impl JobInner {
    fn next(&self) -> Option<Arc<Downloadable>> {
        lock(&self.queue).pop_front()
    }

    fn requeue(&self, download: Arc<Downloadable>) {
        lock(&self.queue).push_back(download);
    }

    fn finish(self: &Arc<Self>) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }

        let elapsed = lock(&self.started_at).map(|started| started.elapsed());
        *lock(&self.elapsed) = elapsed;

        log::info!(
            "Download job '{}' finished: {} succeeded, {} failed, took {:?}",
            self.name,
            lock(&self.successful).len(),
            lock(&self.failures).len(),
            elapsed.unwrap_or_default()
        );

        let job = DownloadJob { inner: self.clone() };
        self.listener.on_download_job_finished(&job);
        self.done.send_replace(true);
    }
}

async fn work(inner: Arc<JobInner>) {
    while let Some(download) = inner.next() {
        download.mark_started();

        if download.attempts() > MAX_ATTEMPTS_PER_FILE {
            let error = UpdaterError::JobExhausted {
                url: download.url().to_string(),
                attempts: download.attempts(),
            };
            log::error!("{} (job '{}')", error, inner.name);
            download.mark_finished();
            download.monitor().complete();
            if !inner.ignore_failures {
                lock(&inner.failures).push(download);
            }
            continue;
        }

        log::info!(
            "Attempting to download {:?} for job '{}'... (try {})",
            download.target(),
            inner.name,
            download.attempts()
        );

        match AssertUnwindSafe(download.download()).catch_unwind().await {
            Ok(Ok(outcome)) => {
                download.mark_finished();
                download.monitor().complete();
                log::info!(
                    "Finished downloading {:?} for job '{}': {}",
                    download.target(),
                    inner.name,
                    outcome
                );
                lock(&inner.successful).push(download);
            }
            Ok(Err(e)) => {
                log::warn!(
                    "Couldn't download {} for job '{}': {}",
                    download.url(),
                    inner.name,
                    e
                );
                download.monitor().complete();
                inner.requeue(download);
            }
            Err(_) => {
                log::error!(
                    "Download of {} for job '{}' panicked",
                    download.url(),
                    inner.name
                );
                download.monitor().complete();
                inner.requeue(download);
            }
        }
    }

    let _ = inner.events.send(JobEvent::WorkerExited);
}

async fn coordinate(inner: Arc<JobInner>, mut events: UnboundedReceiver<JobEvent>, workers: usize) {
    let interval = Duration::from_millis(PROGRESS_INTERVAL_MS);
    let mut last_progress: Option<Instant> = None;
    let mut exited = 0;

    while let Some(event) = events.recv().await {
        match event {
            JobEvent::Progress => {
                if last_progress.map_or(true, |at| at.elapsed() >= interval) {
                    last_progress = Some(Instant::now());
                    let job = DownloadJob { inner: inner.clone() };
                    inner.listener.on_download_job_progress_changed(&job);
                }
            }
            JobEvent::WorkerExited => {
                exited += 1;
                inner.remaining_workers.fetch_sub(1, Ordering::AcqRel);
                if exited == workers {
                    break;
                }
            }
        }
    }

    inner.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::download::downloadable::FetchStrategy;
    use futures::future::BoxFuture;
    use reqwest::Client;
    use std::sync::atomic::AtomicU32;
    use tempfile::{tempdir, TempDir};

    #[derive(Default)]
    struct CountingListener {
        finished: AtomicUsize,
    }

    impl DownloadListener for CountingListener {
        fn on_download_job_finished(&self, job: &DownloadJob) {
            assert!(job.is_complete());
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Fails the first `failures` calls, then succeeds
    struct Scripted {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    impl FetchStrategy for Scripted {
        fn fetch<'a>(&'a self, download: &'a Downloadable) -> BoxFuture<'a, Result<String, UpdaterError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::task::yield_now().await;
                if call <= self.failures {
                    Err(UpdaterError::HttpStatus {
                        url: download.url().to_string(),
                        status: 503,
                    })
                } else {
                    Ok("ok".to_string())
                }
            })
        }
    }

    struct Panicking;

    impl FetchStrategy for Panicking {
        fn fetch<'a>(&'a self, _download: &'a Downloadable) -> BoxFuture<'a, Result<String, UpdaterError>> {
            Box::pin(async move { explode() })
        }
    }

    fn explode() -> Result<String, UpdaterError> {
        panic!("strategy blew up")
    }

    fn scripted(dir: &TempDir, name: &str, failures: u32) -> (Downloadable, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let download = Downloadable::new(
            Client::new(),
            format!("http://example.invalid/{}", name),
            dir.path().join(name),
            false,
            Box::new(Scripted {
                failures,
                calls: calls.clone(),
            }),
        );
        (download, calls)
    }

    #[tokio::test]
    async fn empty_job_finishes_immediately() {
        let listener = Arc::new(CountingListener::default());
        let job = DownloadJob::new("Empty", false, listener.clone());

        job.start(&DownloadPool::current(4)).unwrap();

        assert!(job.is_complete());
        assert!(job.is_finished());
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn finish_fires_once_for_many_workers() {
        let dir = tempdir().unwrap();
        let listener = Arc::new(CountingListener::default());
        let job = DownloadJob::new("Version & Libraries", false, listener.clone());

        let downloads: Vec<_> = (0..40u32)
            .map(|i| scripted(&dir, &format!("lib-{}.jar", i), i % 3).0)
            .collect();
        job.add_downloadables(downloads).unwrap();
        job.start(&DownloadPool::current(8)).unwrap();
        job.wait().await;

        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
        assert_eq!(job.successful(), 40);
        assert_eq!(job.failures(), 0);
        assert!(job.is_complete());
        assert!(job.ensure_success().is_ok());
        assert_eq!(job.progress().percent(), 100);
    }

    #[tokio::test]
    async fn exhausted_download_is_recorded_once() {
        let dir = tempdir().unwrap();
        let listener = Arc::new(CountingListener::default());
        let job = DownloadJob::new("Version & Libraries", false, listener.clone());
        let (download, calls) = scripted(&dir, "broken.jar", u32::MAX);

        job.add_downloadable(download).unwrap();
        job.start(&DownloadPool::current(3)).unwrap();
        job.wait().await;

        assert_eq!(job.failures(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS_PER_FILE + 1);
        assert_eq!(job.failed_downloads()[0].attempts(), MAX_ATTEMPTS_PER_FILE + 1);
        assert!(job.is_complete());
        assert!(matches!(job.ensure_success(), Err(UpdaterError::JobFailed { failures: 1, .. })));
        assert_eq!(listener.finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ignored_failures_are_not_recorded() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("Resources", true, Arc::new(SilentDownloadListener));
        let (download, _) = scripted(&dir, "missing.ogg", u32::MAX);

        job.add_downloadable(download).unwrap();
        job.start(&DownloadPool::current(2)).unwrap();
        job.wait().await;

        assert_eq!(job.failures(), 0);
        assert_eq!(job.successful(), 0);
        assert!(job.is_complete());
    }

    #[tokio::test]
    async fn flaky_download_is_retried() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("Version & Libraries", false, Arc::new(SilentDownloadListener));
        let (download, calls) = scripted(&dir, "flaky.jar", 2);

        job.add_downloadable(download).unwrap();
        job.start(&DownloadPool::current(1)).unwrap();
        job.wait().await;

        assert_eq!(job.successful(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(job.elapsed().is_some());
    }

    #[tokio::test]
    async fn download_succeeding_on_last_try_is_not_a_failure() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("Version & Libraries", false, Arc::new(SilentDownloadListener));
        let (download, calls) = scripted(&dir, "late.jar", MAX_ATTEMPTS_PER_FILE);

        job.add_downloadable(download).unwrap();
        job.start(&DownloadPool::current(1)).unwrap();
        job.wait().await;

        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS_PER_FILE + 1);
        assert_eq!(job.successful(), 1);
        assert_eq!(job.failures(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn files_added_while_starting_are_all_downloaded() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("Version & Libraries", false, Arc::new(SilentDownloadListener));
        let (first, _) = scripted(&dir, "first.jar", 0);
        job.add_downloadable(first).unwrap();

        let adders: Vec<_> = (0..32u32)
            .map(|i| {
                let job = job.clone();
                let (download, _) = scripted(&dir, &format!("racing-{}.jar", i), 0);
                tokio::spawn(async move { job.add_downloadable(download).is_ok() })
            })
            .collect();
        job.start(&DownloadPool::current(2)).unwrap();

        let mut accepted = 1;
        for adder in adders {
            if adder.await.unwrap() {
                accepted += 1;
            }
        }
        job.wait().await;

        assert_eq!(job.file_count(), accepted);
        assert_eq!(job.successful(), accepted);
        assert!(job.is_complete());
    }

    #[tokio::test]
    async fn panicking_download_does_not_stall_job() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("Version & Libraries", false, Arc::new(SilentDownloadListener));
        job.add_downloadable(Downloadable::new(
            Client::new(),
            "http://example.invalid/panic.jar",
            dir.path().join("panic.jar"),
            false,
            Box::new(Panicking),
        ))
        .unwrap();

        job.start(&DownloadPool::current(2)).unwrap();
        job.wait().await;

        assert_eq!(job.failures(), 1);
    }

    #[tokio::test]
    async fn started_job_rejects_changes() {
        let dir = tempdir().unwrap();
        let job = DownloadJob::new("Version & Libraries", false, Arc::new(SilentDownloadListener));
        job.start(&DownloadPool::current(1)).unwrap();

        let (download, _) = scripted(&dir, "late.jar", 0);
        assert!(matches!(
            job.add_downloadable(download),
            Err(UpdaterError::JobAlreadyStarted { .. })
        ));
        assert!(matches!(
            job.start(&DownloadPool::current(1)),
            Err(UpdaterError::JobAlreadyStarted { .. })
        ));
    }
}
