use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Operating systems as named in version manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperatingSystem {
    Linux,
    Windows,
    Osx,
    Unknown,
}

impl OperatingSystem {
    /// Detect the current OS
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        return OperatingSystem::Windows;

        #[cfg(target_os = "macos")]
        return OperatingSystem::Osx;

        #[cfg(any(target_os = "linux", target_os = "freebsd", target_os = "openbsd", target_os = "netbsd"))]
        return OperatingSystem::Linux;

        #[cfg(not(any(
            target_os = "windows",
            target_os = "macos",
            target_os = "linux",
            target_os = "freebsd",
            target_os = "openbsd",
            target_os = "netbsd"
        )))]
        return OperatingSystem::Unknown;
    }

    /// Get the OS name as a string (for rule matching and natives maps)
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Linux => "linux",
            OperatingSystem::Windows => "windows",
            OperatingSystem::Osx => "osx",
            OperatingSystem::Unknown => "unknown",
        }
    }

    /// Substrings of a host OS name that identify this OS
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            OperatingSystem::Linux => &["linux", "unix"],
            OperatingSystem::Windows => &["win"],
            OperatingSystem::Osx => &["mac"],
            OperatingSystem::Unknown => &[],
        }
    }

    /// Look up a manifest OS name. Anything unrecognised is `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "linux" => OperatingSystem::Linux,
            "windows" => OperatingSystem::Windows,
            "osx" => OperatingSystem::Osx,
            _ => OperatingSystem::Unknown,
        }
    }

    /// Match a free-form host OS name (e.g. "Mac OS X") against the alias table
    pub fn from_host_name(host: &str) -> Self {
        let host = host.to_lowercase();
        [OperatingSystem::Linux, OperatingSystem::Windows, OperatingSystem::Osx]
            .into_iter()
            .find(|os| os.aliases().iter().any(|alias| host.contains(alias)))
            .unwrap_or(OperatingSystem::Unknown)
    }

    pub fn is_supported(&self) -> bool {
        *self != OperatingSystem::Unknown
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for OperatingSystem {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OperatingSystem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(OperatingSystem::from_name(&name))
    }
}

static CURRENT: Lazy<Environment> = Lazy::new(Environment::detect);

/// The host facts compatibility rules are evaluated against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub os: OperatingSystem,
    /// OS version string matched by `os.version` rule regexes
    pub os_version: String,
    /// Architecture name matched by `os.arch` rule regexes (e.g. "x86", "amd64")
    pub arch: String,
    /// "64" or "32", substituted for `${arch}` in native classifiers
    pub arch_bits: &'static str,
}

impl Environment {
    pub fn new(os: OperatingSystem, os_version: impl Into<String>, arch: impl Into<String>) -> Self {
        let arch = arch.into();
        let arch_bits = if arch.contains("64") { "64" } else { "32" };
        Self {
            os,
            os_version: os_version.into(),
            arch,
            arch_bits,
        }
    }

    /// The environment of the running process, detected once.
    pub fn current() -> Environment {
        CURRENT.clone()
    }

    fn detect() -> Environment {
        // macOS rules match the product version ("10.9"), elsewhere the kernel version
        #[cfg(target_os = "macos")]
        let os_version = sysinfo::System::os_version();
        #[cfg(not(target_os = "macos"))]
        let os_version = sysinfo::System::kernel_version();

        let arch = match std::env::consts::ARCH {
            "x86_64" if cfg!(target_os = "macos") => "x86_64",
            "x86_64" => "amd64",
            other => other,
        };

        let mut env = Environment::new(
            OperatingSystem::current(),
            os_version.unwrap_or_default(),
            arch,
        );
        env.arch_bits = if cfg!(target_pointer_width = "64") { "64" } else { "32" };
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_names_resolve_through_aliases() {
        assert_eq!(OperatingSystem::from_host_name("Windows 10"), OperatingSystem::Windows);
        assert_eq!(OperatingSystem::from_host_name("Mac OS X"), OperatingSystem::Osx);
        assert_eq!(OperatingSystem::from_host_name("Linux"), OperatingSystem::Linux);
        assert_eq!(OperatingSystem::from_host_name("SunOS unix"), OperatingSystem::Linux);
        assert_eq!(OperatingSystem::from_host_name("Plan 9"), OperatingSystem::Unknown);
    }

    #[test]
    fn serde_uses_manifest_names() {
        let os: OperatingSystem = serde_json::from_str("\"osx\"").unwrap();
        assert_eq!(os, OperatingSystem::Osx);
        let other: OperatingSystem = serde_json::from_str("\"solaris\"").unwrap();
        assert_eq!(other, OperatingSystem::Unknown);
        assert_eq!(serde_json::to_string(&OperatingSystem::Windows).unwrap(), "\"windows\"");
    }

    #[test]
    fn arch_bits_follow_arch_name() {
        assert_eq!(Environment::new(OperatingSystem::Linux, "5.0", "amd64").arch_bits, "64");
        assert_eq!(Environment::new(OperatingSystem::Windows, "6.1", "x86").arch_bits, "32");
    }

    #[test]
    fn current_environment_is_stable() {
        assert_eq!(Environment::current(), Environment::current());
        assert!(OperatingSystem::current().is_supported());
    }
}
