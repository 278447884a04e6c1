pub mod asset;
pub mod checksummed;
pub mod downloadable;
pub mod etag;
pub mod job;
pub mod plain;
pub mod pool;
pub mod progress;

pub use asset::AssetFetch;
pub use checksummed::ChecksummedFetch;
pub use downloadable::{ensure_file_writable, Downloadable, FetchStrategy};
pub use etag::EtagFetch;
pub use job::{DownloadJob, DownloadListener, SilentDownloadListener};
pub use plain::PlainFetch;
pub use pool::DownloadPool;
pub use progress::{JobProgress, ProgressMonitor};
