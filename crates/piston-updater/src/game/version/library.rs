use crate::error::UpdaterError;
use crate::game::platform::{Environment, OperatingSystem};
use crate::game::version::rules::{rules_allow, CompatibilityRule};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Library definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Library {
    /// Maven coordinates, `group:artifact:version`
    pub name: String,

    /// Rules for conditional inclusion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<CompatibilityRule>>,

    /// Native classifier per OS, may contain `${arch}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natives: Option<HashMap<OperatingSystem, String>>,

    /// Extract rules for natives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractRules>,

    /// Custom Maven repository URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ExtractRules {
    /// Whether an archive entry should be extracted (no exclude prefix matches it)
    pub fn should_extract(&self, path: &str) -> bool {
        !self.exclude.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl Library {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn applies_to(&self, env: &Environment) -> bool {
        rules_allow(self.rules.as_deref(), env)
    }

    pub fn has_custom_url(&self) -> bool {
        self.url.is_some()
    }

    pub fn is_native(&self) -> bool {
        self.natives.is_some()
    }

    /// Base URL the artifact path is appended to
    pub fn download_base<'a>(&'a self, default_base: &'a str) -> &'a str {
        self.url.as_deref().unwrap_or(default_base)
    }

    fn coordinates(&self) -> Result<(&str, &str, &str), UpdaterError> {
        let mut parts = self.name.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(group), Some(artifact), Some(version))
                if !group.is_empty() && !artifact.is_empty() && !version.is_empty() =>
            {
                Ok((group, artifact, version))
            }
            _ => Err(UpdaterError::malformed(
                self.name.clone(),
                "library name is not group:artifact:version",
            )),
        }
    }

    /// `group/as/path/artifact/version`
    pub fn artifact_base_dir(&self) -> Result<String, UpdaterError> {
        let (group, artifact, version) = self.coordinates()?;
        Ok(format!("{}/{}/{}", group.replace('.', "/"), artifact, version))
    }

    /// `artifact-version[-classifier].jar`, with `${arch}` in the classifier expanded
    pub fn artifact_filename(
        &self,
        classifier: Option<&str>,
        env: &Environment,
    ) -> Result<String, UpdaterError> {
        let (_, artifact, version) = self.coordinates()?;
        Ok(match classifier {
            Some(classifier) => format!(
                "{}-{}-{}.jar",
                artifact,
                version,
                classifier.replace("${arch}", env.arch_bits)
            ),
            None => format!("{}-{}.jar", artifact, version),
        })
    }

    pub fn artifact_path(
        &self,
        classifier: Option<&str>,
        env: &Environment,
    ) -> Result<String, UpdaterError> {
        Ok(format!(
            "{}/{}",
            self.artifact_base_dir()?,
            self.artifact_filename(classifier, env)?
        ))
    }

    pub fn native_classifier(&self, os: OperatingSystem) -> Option<&str> {
        self.natives.as_ref()?.get(&os).map(String::as_str)
    }

    /// Path under `libraries/` this library occupies on `env`. `None` for a natives
    /// library with no classifier for the current OS.
    pub fn relevant_path(&self, env: &Environment) -> Result<Option<String>, UpdaterError> {
        if self.natives.is_none() {
            return self.artifact_path(None, env).map(Some);
        }

        match self.native_classifier(env.os) {
            Some(classifier) => self.artifact_path(Some(classifier), env).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment::new(OperatingSystem::Windows, "10.0", "amd64")
    }

    #[test]
    fn maven_layout() {
        let library = Library::new("net.sf.jopt-simple:jopt-simple:4.5");
        assert_eq!(
            library.artifact_path(None, &env()).unwrap(),
            "net/sf/jopt-simple/jopt-simple/4.5/jopt-simple-4.5.jar"
        );
    }

    #[test]
    fn natives_classifier_expands_arch() {
        let library: Library = serde_json::from_str(
            r#"{
                "name": "tv.twitch:twitch-platform:5.16",
                "natives": {"windows": "natives-windows-${arch}", "osx": "natives-osx"}
            }"#,
        )
        .unwrap();

        assert_eq!(
            library.relevant_path(&env()).unwrap().as_deref(),
            Some("tv/twitch/twitch-platform/5.16/twitch-platform-5.16-natives-windows-64.jar")
        );

        let linux = Environment::new(OperatingSystem::Linux, "6.1", "amd64");
        assert_eq!(library.relevant_path(&linux).unwrap(), None);
    }

    #[test]
    fn invalid_coordinates_are_malformed() {
        let library = Library::new("just-a-name");
        assert!(matches!(
            library.artifact_path(None, &env()),
            Err(UpdaterError::MalformedManifest { .. })
        ));
    }

    #[test]
    fn extract_excludes_by_prefix() {
        let rules = ExtractRules {
            exclude: vec!["META-INF/".to_string()],
        };
        assert!(!rules.should_extract("META-INF/MANIFEST.MF"));
        assert!(rules.should_extract("lwjgl.dll"));
    }

    #[test]
    fn custom_url_overrides_default_base() {
        let mut library = Library::new("com.example:lib:1.0");
        assert_eq!(library.download_base("https://libraries.example/"), "https://libraries.example/");
        library.url = Some("https://maven.example/".to_string());
        assert!(library.has_custom_url());
        assert_eq!(library.download_base("https://libraries.example/"), "https://maven.example/");
    }
}
