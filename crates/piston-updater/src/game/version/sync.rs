use crate::game::version::manifest::Version;
use crate::game::version::release_type::ReleaseType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    Local,
    Remote,
}

/// Local and remote catalog entries for one version id, reconciled
#[derive(Debug, Clone, PartialEq)]
pub struct VersionSyncInfo {
    local: Option<Version>,
    remote: Option<Version>,
    installed: bool,
    up_to_date: bool,
}

impl VersionSyncInfo {
    /// Reconcile on timestamps alone: installed when a local entry exists, up to date unless
    /// the remote entry was updated after it.
    pub fn from_entries(local: Option<Version>, remote: Option<Version>) -> Self {
        let installed = local.is_some();
        let up_to_date = match (&local, &remote) {
            (Some(local), Some(remote)) => !is_newer(remote, local),
            _ => installed,
        };

        Self {
            local,
            remote,
            installed,
            up_to_date,
        }
    }

    /// Further require that every file the local version needs is on disk.
    pub fn with_files_present(mut self, present: bool) -> Self {
        self.up_to_date &= present;
        self
    }

    pub fn local_version(&self) -> Option<&Version> {
        self.local.as_ref()
    }

    pub fn remote_version(&self) -> Option<&Version> {
        self.remote.as_ref()
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn is_on_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn is_up_to_date(&self) -> bool {
        self.up_to_date
    }

    pub fn latest_source(&self) -> VersionSource {
        match (&self.local, &self.remote) {
            (None, _) => VersionSource::Remote,
            (_, None) => VersionSource::Local,
            (Some(local), Some(remote)) if is_newer(remote, local) => VersionSource::Remote,
            _ => VersionSource::Local,
        }
    }

    pub fn latest_version(&self) -> Option<&Version> {
        match self.latest_source() {
            VersionSource::Local => self.local.as_ref(),
            VersionSource::Remote => self.remote.as_ref(),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.latest_version().map(Version::id)
    }

    pub fn release_type(&self) -> Option<ReleaseType> {
        self.latest_version().and_then(Version::release_type)
    }
}

fn is_newer(candidate: &Version, than: &Version) -> bool {
    match (candidate.updated_time(), than.updated_time()) {
        (Some(candidate), Some(than)) => candidate > than,
        _ => false,
    }
}
