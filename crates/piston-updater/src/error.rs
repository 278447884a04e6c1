use std::path::PathBuf;

/// Errors raised while resolving versions and synchronizing artifacts
#[derive(Debug, thiserror::Error)]
pub enum UpdaterError {
    #[error("Server responded with {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{kind} did not match for {}: expected {expected}, got {actual}", .path.display())]
    Integrity {
        kind: &'static str,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Circular inheritance detected while resolving {id}")]
    CircularInheritance { id: String },

    #[error("Malformed manifest {location}: {reason}")]
    MalformedManifest { location: String, reason: String },

    #[error("Gave up on {url} after {attempts} attempts")]
    JobExhausted { url: String, attempts: u32 },

    #[error("Download job '{name}' finished with {failures} failed downloads")]
    JobFailed { name: String, failures: usize },

    #[error("Download job '{name}' has already started")]
    JobAlreadyStarted { name: String },

    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    #[error("Version {0} is already tracked by this catalog")]
    AlreadyTracked(String),

    #[error("Do not have write permissions to {}", .0.display())]
    NotWritable(PathBuf),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl UpdaterError {
    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Connection failures, timeouts and non-2xx answers. Worth another try later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::HttpStatus { .. } | Self::Network { .. })
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        let status = UpdaterError::HttpStatus {
            url: "http://example.invalid/a.jar".to_string(),
            status: 503,
        };
        assert!(status.is_transient());
        assert!(!status.is_integrity());

        let mismatch = UpdaterError::Integrity {
            kind: "Checksum",
            path: PathBuf::from("a.jar"),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(mismatch.is_integrity());
        assert!(!mismatch.is_transient());
        assert_eq!(
            mismatch.to_string(),
            "Checksum did not match for a.jar: expected aa, got bb"
        );

        assert!(!UpdaterError::CircularInheritance { id: "a".into() }.is_transient());
    }
}
