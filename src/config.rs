//! Server configuration, persisted as TOML.
//!
//! Every field has a serde default, so an empty file is a valid config.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::{FailurePolicy, RemovalPolicy};
use crate::error::ConfigError;
use crate::infer::BuilderOptions;
use crate::infer::augment::DEFAULT_EVIDENCE_NAMESPACE;
use crate::iri::CurieMap;

/// When inference runs after a mutating batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Never; `inconsistent-p` is omitted.
    Disabled,
    /// Before the response is sent.
    #[default]
    Synchronous,
    /// After the response, on a spawned task.
    Background,
}

/// External lookup service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Base URL of the remote lookup service.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_lookup_timeout")]
    pub timeout_secs: u64,
    /// Cached ids; 0 disables the cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// JSON table used instead of (or when there is no) remote service.
    #[serde(default)]
    pub static_entries_file: Option<PathBuf>,
}

fn default_lookup_timeout() -> u64 {
    10
}
fn default_cache_capacity() -> usize {
    10_000
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_lookup_timeout(),
            cache_capacity: default_cache_capacity(),
            static_entries_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where `store` writes models; stored models are loaded at startup.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// JSON class hierarchy. Without it every class is unknown and edge
    /// predicates cannot be validated.
    #[serde(default)]
    pub hierarchy_file: Option<PathBuf>,
    /// Prefix for new model ids.
    #[serde(default = "default_model_namespace")]
    pub model_namespace: String,
    #[serde(default = "default_evidence_namespace")]
    pub evidence_namespace: String,
    #[serde(default = "default_max_concurrent_reasoners")]
    pub max_concurrent_reasoners: usize,
    #[serde(default = "default_true")]
    pub use_module_extraction: bool,
    #[serde(default)]
    pub removal_policy: RemovalPolicy,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub inference_mode: InferenceMode,
    /// Imports set by `update-imports` and on new models (CURIEs or IRIs).
    #[serde(default)]
    pub default_imports: Vec<String>,
    #[serde(default = "default_slow_permit_warning_secs")]
    pub slow_permit_warning_secs: u64,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub lookup: LookupConfig,
    /// Extra CURIE prefixes, added to the built-in OBO set.
    #[serde(default)]
    pub prefixes: BTreeMap<String, String>,
}

fn default_bind() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    6800
}
fn default_model_namespace() -> String {
    "http://model.geneontology.org/".into()
}
fn default_evidence_namespace() -> String {
    DEFAULT_EVIDENCE_NAMESPACE.into()
}
fn default_max_concurrent_reasoners() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_slow_permit_warning_secs() -> u64 {
    60
}
fn default_history_limit() -> usize {
    crate::model::history::DEFAULT_HISTORY_LIMIT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            data_dir: None,
            hierarchy_file: None,
            model_namespace: default_model_namespace(),
            evidence_namespace: default_evidence_namespace(),
            max_concurrent_reasoners: default_max_concurrent_reasoners(),
            use_module_extraction: true,
            removal_policy: RemovalPolicy::default(),
            failure_policy: FailurePolicy::default(),
            inference_mode: InferenceMode::default(),
            default_imports: Vec::new(),
            slow_permit_warning_secs: default_slow_permit_warning_secs(),
            history_limit: default_history_limit(),
            lookup: LookupConfig::default(),
            prefixes: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });
        if self.max_concurrent_reasoners == 0 {
            return invalid("`max_concurrent_reasoners` must be at least 1".into());
        }
        if self.model_namespace.trim().is_empty() {
            return invalid("`model_namespace` must not be empty".into());
        }
        if self.evidence_namespace.trim().is_empty() {
            return invalid("`evidence_namespace` must not be empty".into());
        }
        if self.history_limit == 0 {
            return invalid("`history_limit` must be at least 1".into());
        }
        let curies = self.curies();
        for import in &self.default_imports {
            if let Err(e) = curies.expand(import) {
                return invalid(format!("default import: {e}"));
            }
        }
        if let Some(url) = &self.lookup.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return invalid(format!("`lookup.url` must be an http(s) URL, got \"{url}\""));
            }
        }
        Ok(())
    }

    /// Built-in prefixes plus the configured ones.
    pub fn curies(&self) -> CurieMap {
        CurieMap::default().with_prefixes(&self.prefixes)
    }

    pub fn builder_options(&self) -> BuilderOptions {
        BuilderOptions {
            max_concurrent: self.max_concurrent_reasoners,
            use_module_extraction: self.use_module_extraction,
            slow_permit_warning: Duration::from_secs(self.slow_permit_warning_secs.max(1)),
        }
    }
}
