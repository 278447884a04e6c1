use crate::game::platform::{Environment, OperatingSystem};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Allow,
    Disallow,
}

/// OS/arch/version gated allow or disallow, shared by versions and libraries
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompatibilityRule {
    #[serde(default)]
    pub action: RuleAction,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsRestriction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OsRestriction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<OperatingSystem>,

    /// Regex the whole OS version must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Regex the whole architecture name must match
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

impl CompatibilityRule {
    /// The rule's action when it applies to `env`, `None` when it does not.
    pub fn applied_action(&self, env: &Environment) -> Option<RuleAction> {
        match &self.os {
            Some(os) if !os.is_current(env) => None,
            _ => Some(self.action),
        }
    }
}

impl OsRestriction {
    pub fn is_current(&self, env: &Environment) -> bool {
        if let Some(name) = self.name {
            if name != env.os {
                return false;
            }
        }

        if let Some(version) = &self.version {
            if !full_match(version, &env.os_version) {
                return false;
            }
        }

        if let Some(arch) = &self.arch {
            if !full_match(arch, &env.arch) {
                return false;
            }
        }

        true
    }
}

// An unparsable pattern restricts nothing
fn full_match(pattern: &str, value: &str) -> bool {
    match Regex::new(&format!("^(?:{})$", pattern)) {
        Ok(regex) => regex.is_match(value),
        Err(e) => {
            log::debug!("Ignoring invalid rule pattern {:?}: {}", pattern, e);
            true
        }
    }
}

/// Evaluate a rule list. No list means allowed; otherwise the last rule that applies wins
/// and an empty or non-matching list disallows.
pub fn rules_allow(rules: Option<&[CompatibilityRule]>, env: &Environment) -> bool {
    let Some(rules) = rules else {
        return true;
    };

    let last_action = rules
        .iter()
        .filter_map(|rule| rule.applied_action(env))
        .last()
        .unwrap_or(RuleAction::Disallow);

    last_action == RuleAction::Allow
}
