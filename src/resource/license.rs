//! Sensu enterprise license
//!
//! There are no attributes to diff. The license either is active or is not,
//! and the file is handed to sensuctl as-is.

use super::{Ensure, ReconcileError};
use anyhow::{Result, bail};
use declarative::{Action, ApplyResult, Reconcile, ResourceDiff};
use sensuctl::Client;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Kind name used for targets and diffs
pub const KIND: &str = "license";

/// A license as written in the configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LicenseConfig {
    /// Path to the license document; `~` is expanded
    pub file: String,
    #[serde(default)]
    pub ensure: Ensure,
}

/// A validated license declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct License {
    pub file: PathBuf,
    pub ensure: Ensure,
}

impl LicenseConfig {
    pub fn validate(self) -> Result<License, ReconcileError> {
        let expanded = PathBuf::from(shellexpand::tilde(&self.file).as_ref());
        if self.file.trim().is_empty() {
            return Err(ReconcileError::validation(KIND, "You must provide a file"));
        }
        if !expanded.is_absolute() {
            return Err(ReconcileError::validation(
                format!("{KIND} {}", self.file),
                "file must be an absolute path",
            ));
        }
        Ok(License {
            file: expanded,
            ensure: self.ensure,
        })
    }
}

/// Whether a license is active. Any tool failure counts as "no license".
pub fn is_active(client: &Client) -> bool {
    match client.license_info() {
        Ok(_) => true,
        Err(e) => {
            log::debug!("No active license: {e}");
            false
        }
    }
}

/// One pass over declared licenses
pub struct LicensePass<'a> {
    client: &'a Client,
    desired: Vec<License>,
    active: bool,
}

impl<'a> LicensePass<'a> {
    pub fn prefetch(client: &'a Client, desired: Vec<License>) -> Self {
        let active = is_active(client);
        Self {
            client,
            desired,
            active,
        }
    }

    pub fn exists(&self) -> bool {
        self.active
    }

    fn apply_error(file: &Path, action: &'static str, source: sensuctl::Error) -> ReconcileError {
        ReconcileError::Apply {
            resource: format!("{KIND} {}", file.display()),
            action,
            source,
        }
    }

    /// Apply a license file (`create -f`)
    pub fn create(&mut self, license: &License) -> Result<(), ReconcileError> {
        self.client
            .create_file(&license.file)
            .map_err(|e| Self::apply_error(&license.file, "create", e))?;
        self.active = true;
        Ok(())
    }

    /// Remove a license file (`delete -f`)
    pub fn destroy(&mut self, license: &License) -> Result<(), ReconcileError> {
        self.client
            .delete_file(&license.file)
            .map_err(|e| Self::apply_error(&license.file, "delete", e))?;
        self.active = false;
        Ok(())
    }
}

impl Reconcile for LicensePass<'_> {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn plan(&self) -> Vec<ResourceDiff> {
        self.desired
            .iter()
            .filter_map(|license| {
                let action = match (license.ensure, self.active) {
                    (Ensure::Present, false) => Action::Create,
                    (Ensure::Absent, true) => Action::Delete,
                    _ => return None,
                };
                Some(ResourceDiff::new(
                    KIND,
                    license.file.display().to_string(),
                    action,
                ))
            })
            .collect()
    }

    fn apply(&mut self, diff: &ResourceDiff) -> Result<ApplyResult> {
        let Some(license) = self
            .desired
            .iter()
            .find(|l| l.file.display().to_string() == diff.id)
            .cloned()
        else {
            bail!("no declared license {}", diff.id);
        };

        match diff.action {
            Action::Create => {
                self.create(&license)?;
                log::info!("Applied license {}", diff.id);
                Ok(ApplyResult::Created)
            }
            Action::Delete => {
                self.destroy(&license)?;
                log::info!("Removed license {}", diff.id);
                Ok(ApplyResult::Removed)
            }
            Action::Update { .. } => Ok(ApplyResult::Skipped {
                reason: "licenses have no attributes to update".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensuctl::backend::memory::MemoryBackend;
    use std::sync::Arc;

    const FILE: &str = "/etc/sensu/license.json";

    fn license(ensure: Ensure) -> License {
        License {
            file: PathBuf::from(FILE),
            ensure,
        }
    }

    fn client() -> (Client, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (Client::with_backend(Box::new(Arc::clone(&backend))), backend)
    }

    #[test]
    fn test_requires_absolute_file() {
        let cfg = LicenseConfig {
            file: "license.json".to_string(),
            ensure: Ensure::Present,
        };
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.to_string(), "license license.json: file must be an absolute path");

        let cfg = LicenseConfig {
            file: "~/license.json".to_string(),
            ensure: Ensure::Present,
        };
        if dirs::home_dir().is_some() {
            assert!(cfg.validate().unwrap().file.is_absolute());
        }
    }

    #[test]
    fn test_info_failure_means_absent() {
        let (client, backend) = client();
        let pass = LicensePass::prefetch(&client, vec![license(Ensure::Present)]);
        assert!(!pass.exists());
        assert_eq!(backend.invocations()[0].args, ["license", "info"]);
    }

    #[test]
    fn test_create_passes_file_through() {
        let (client, backend) = client();
        let mut pass = LicensePass::prefetch(&client, vec![license(Ensure::Present)]);

        let diffs = pass.plan();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].id, FILE);
        assert_eq!(pass.apply(&diffs[0]).unwrap(), ApplyResult::Created);

        assert_eq!(backend.invocations()[1].args, ["create", "-f", FILE]);
        assert!(pass.exists());
        assert!(pass.plan().is_empty());
    }

    #[test]
    fn test_destroy_active_license() {
        let (client, backend) = client();
        backend.set_license(FILE);
        let mut pass = LicensePass::prefetch(&client, vec![license(Ensure::Absent)]);

        let diffs = pass.plan();
        assert!(diffs[0].is_removal());
        assert_eq!(pass.apply(&diffs[0]).unwrap(), ApplyResult::Removed);
        assert_eq!(backend.invocations()[1].args, ["delete", "-f", FILE]);
        assert!(!is_active(&client));
    }

    #[test]
    fn test_create_failure_reports_output() {
        let (client, backend) = client();
        backend.fail_on("create", "Error: license is expired");
        let mut pass = LicensePass::prefetch(&client, vec![license(Ensure::Present)]);

        let diffs = pass.plan();
        let err = pass.apply(&diffs[0]).unwrap_err();
        assert!(format!("{err:#}").contains("license is expired"));
        assert!(!pass.exists());
    }
}
