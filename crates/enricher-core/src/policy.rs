use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::errors::JobError;

/// Job env key holding the JSON-encoded constraints.
pub const POLICY_ENV_KEY: &str = "policy_constraints";

/// Per-job policy inputs. Read-only to the core.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConstraints {
    /// Upload ceiling in bytes; 0 means unlimited.
    #[serde(default)]
    pub max_artifact_bytes: usize,
    #[serde(default)]
    pub redaction_level: String,
    /// `None` leaves destinations unrestricted; `Some(vec![])` denies every host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_hosts: Option<Vec<String>>,
}

impl PolicyConstraints {
    /// Read from the job env. Absent key yields defaults; malformed JSON is a
    /// validation error.
    pub fn from_env(env: &HashMap<String, String>) -> Result<Self, JobError> {
        match env.get(POLICY_ENV_KEY).map(|s| s.trim()) {
            None | Some("") => Ok(Self::default()),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| JobError::validation(format!("invalid policy constraints: {e}"))),
        }
    }

    pub fn redaction_active(&self) -> bool {
        redaction_active(&self.redaction_level)
    }

    /// Check the host of `target` against the allow-list.
    pub fn host_allowed(&self, target: &str) -> Result<bool, JobError> {
        let url = Url::parse(target.trim())
            .map_err(|e| JobError::validation(format!("invalid destination url: {e}")))?;
        let host = url
            .host()
            .ok_or_else(|| JobError::validation("destination url has no host"))?;
        let Some(allowed) = &self.allowed_hosts else {
            return Ok(true);
        };
        let label = normalize_host_label(&host);
        Ok(allowed
            .iter()
            .filter_map(|raw| HostPattern::parse(raw))
            .any(|pattern| pattern.matches(&label)))
    }
}

/// True for any level other than empty or `none`.
pub fn redaction_active(level: &str) -> bool {
    let level = level.trim();
    !level.is_empty() && !level.eq_ignore_ascii_case("none")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HostPattern {
    Exact(String),
    /// `*.example.com` matches subdomains, not the apex.
    WildcardSuffix(String),
}

impl HostPattern {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = normalize_host_string(trimmed);
        if let Some(suffix) = normalized.strip_prefix("*.") {
            if suffix.is_empty() {
                return None;
            }
            return Some(Self::WildcardSuffix(suffix.to_string()));
        }
        Some(Self::Exact(normalized))
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            Self::Exact(value) => host == value,
            Self::WildcardSuffix(suffix) => {
                if host.len() <= suffix.len() || !host.ends_with(suffix.as_str()) {
                    return false;
                }
                let boundary = host.len() - suffix.len() - 1;
                host.as_bytes().get(boundary) == Some(&b'.')
            }
        }
    }
}

fn normalize_host_label(host: &Host<&str>) -> String {
    match host {
        Host::Domain(domain) => normalize_host_string(domain),
        Host::Ipv4(ip) => ip.to_string(),
        Host::Ipv6(ip) => ip.to_string(),
    }
}

fn normalize_host_string(host: &str) -> String {
    let trimmed = host.trim_end_matches('.');
    let trimmed = trimmed
        .strip_prefix('[')
        .and_then(|inner| inner.strip_suffix(']'))
        .unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}
