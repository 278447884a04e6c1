use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tokio::sync::mpsc::UnboundedSender;

/// Messages from workers and monitors to a job's coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobEvent {
    Progress,
    WorkerExited,
}

/// Bytes transferred against bytes expected for one artifact
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    current: AtomicU64,
    total: AtomicU64,
    events: OnceLock<UnboundedSender<JobEvent>>,
}

impl ProgressMonitor {
    pub fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            ..Self::default()
        }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Release);
        self.notify();
    }

    pub fn set_current(&self, current: u64) {
        self.current.store(current, Ordering::Release);
        self.notify();
    }

    /// Mark the artifact as done so it stops holding back the job's aggregate
    pub fn complete(&self) {
        self.set_current(self.total());
    }

    /// Route updates to the owning job. Only the first attachment sticks.
    pub(crate) fn attach(&self, events: UnboundedSender<JobEvent>) {
        let _ = self.events.set(events);
    }

    fn notify(&self) {
        if let Some(events) = self.events.get() {
            let _ = events.send(JobEvent::Progress);
        }
    }
}

/// Snapshot of a whole job's progress
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JobProgress {
    pub current: u64,
    pub total: u64,
    /// Status of the longest running in-flight download
    pub status: Option<String>,
}

impl JobProgress {
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f64 / self.total as f64).min(1.0) as f32
    }

    pub fn percent(&self) -> u8 {
        (self.fraction() * 100.0).round() as u8
    }
}
