//! Desired-state configuration
//!
//! ```toml
//! [sensuctl]
//! config_dir = "~/.config/sensu/sensuctl"
//!
//! [purge]
//! handlers = true
//!
//! [[handlers]]
//! name = "slack in ops"
//! type = "pipe"
//! command = "sensu-slack-handler --channel '#alerts'"
//! filters = ["is_incident"]
//!
//! [[licenses]]
//! file = "/etc/sensu/license.json"
//! ```

use crate::paths::expand_path;
use crate::resource::handler::{Handler, HandlerConfig};
use crate::resource::license::{License, LicenseConfig};
use crate::resource::{Ensure, Identity};
use anyhow::{Context, Result, bail};
use sensuctl::Client;
use sensuctl::backend::cli::CliBackend;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

// ============================================================================
// File Schema
// ============================================================================

/// The configuration file as written
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DesiredConfig {
    /// How to run sensuctl
    #[serde(default)]
    pub sensuctl: SensuctlConfig,

    /// Removal of undeclared objects
    #[serde(default)]
    pub purge: PurgeConfig,

    #[serde(default)]
    pub handlers: Vec<HandlerConfig>,

    #[serde(default)]
    pub licenses: Vec<LicenseConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensuctlConfig {
    /// sensuctl executable; searched for when unset
    #[serde(default)]
    pub path: Option<String>,

    /// Passed as `--config-dir` to every invocation
    #[serde(default)]
    pub config_dir: Option<String>,

    /// Extra environment for every invocation
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PurgeConfig {
    /// Delete handlers that are not declared
    #[serde(default)]
    pub handlers: bool,
}

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl DesiredConfig {
    /// Load from a file, choosing the format by extension.
    ///
    /// Files without a known extension are tried as TOML, then JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        log::debug!("Loading config from {}", path.display());

        let parsed = match ConfigFormat::from_path(path) {
            Some(format) => Self::parse(&content, format),
            None => Self::parse(&content, ConfigFormat::Toml)
                .or_else(|_| Self::parse(&content, ConfigFormat::Json)),
        };
        parsed.with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        match format {
            ConfigFormat::Toml => toml::from_str(content).context("Invalid TOML format"),
            ConfigFormat::Json => serde_json::from_str(content).context("Invalid JSON format"),
        }
    }

    /// Validate every declaration.
    ///
    /// The first invalid resource aborts; nothing has been sent to sensuctl yet.
    pub fn validate(self) -> Result<Desired> {
        let handlers = self
            .handlers
            .into_iter()
            .map(HandlerConfig::validate)
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen: BTreeSet<&Identity> = BTreeSet::new();
        for handler in &handlers {
            if !seen.insert(&handler.identity) {
                bail!("handler {} is declared more than once", handler.identity);
            }
        }

        let licenses = self
            .licenses
            .into_iter()
            .map(LicenseConfig::validate)
            .collect::<Result<Vec<_>, _>>()?;
        if licenses.iter().filter(|l| l.ensure == Ensure::Present).count() > 1 {
            bail!("only one license may be present");
        }

        Ok(Desired {
            sensuctl: self.sensuctl,
            purge: self.purge,
            handlers,
            licenses,
        })
    }
}

// ============================================================================
// Validated Configuration
// ============================================================================

/// Validated desired state
#[derive(Debug)]
pub struct Desired {
    pub sensuctl: SensuctlConfig,
    pub purge: PurgeConfig,
    pub handlers: Vec<Handler>,
    pub licenses: Vec<License>,
}

impl Desired {
    pub fn load(path: &Path) -> Result<Self> {
        DesiredConfig::load(path)?.validate()
    }

    pub fn resource_count(&self) -> usize {
        self.handlers.len() + self.licenses.len()
    }
}

impl SensuctlConfig {
    /// Build a client that runs the real sensuctl
    pub fn client(&self) -> Result<Client> {
        let mut backend = match &self.path {
            Some(path) => CliBackend::with_path(expand_path(path)),
            None => CliBackend::new()?,
        };
        if let Some(dir) = &self.config_dir {
            backend = backend.with_config_dir(&expand_path(dir));
        }
        if !self.env.is_empty() {
            backend = backend.with_env(self.env.clone());
        }
        log::debug!("Using sensuctl at {}", backend.path().display());
        Ok(Client::with_backend(Box::new(backend)))
    }
}
