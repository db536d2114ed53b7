//! Real sensuctl backend that spawns the `sensuctl` process.

use crate::backend::{Backend, Invocation};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

/// Backend that executes real `sensuctl` commands.
#[derive(Debug, Clone)]
pub struct CliBackend {
    /// Path to the sensuctl executable
    path: PathBuf,
    /// Arguments prepended to every invocation
    global_args: Vec<String>,
    /// Extra environment passed to every invocation
    env: BTreeMap<String, String>,
}

impl CliBackend {
    /// Create a backend using the sensuctl found on this system.
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(find_sensuctl()?))
    }

    /// Create a backend for an explicit executable path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            global_args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Point sensuctl at a non-default configuration directory.
    pub fn with_config_dir(mut self, dir: &Path) -> Self {
        self.global_args.push("--config-dir".to_string());
        self.global_args.push(dir.display().to_string());
        self
    }

    /// Add environment variables for every invocation.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    /// Path of the executable this backend runs.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for CliBackend {
    fn execute(&self, invocation: &Invocation) -> Result<String> {
        log::debug!("Running {invocation}");

        let mut command = Command::new(&self.path);
        command
            .args(&self.global_args)
            .args(&invocation.args)
            .envs(&self.env)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::SensuctlNotFound
            } else {
                Error::Io(e)
            }
        })?;

        // stdin is fed from its own thread while stdout and stderr drain, so a
        // chatty sensuctl cannot block on a full pipe before reading its input.
        let (output, written) = thread::scope(|scope| {
            let writer = child
                .stdin
                .take()
                .zip(invocation.stdin.as_deref())
                .map(|(mut stdin, document)| {
                    // stdin is dropped when the thread ends so sensuctl sees EOF
                    scope.spawn(move || stdin.write_all(document.as_bytes()))
                });
            let output = child.wait_with_output();
            let written = writer.map_or(Ok(()), |w| {
                w.join()
                    .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")))
            });
            (output, written)
        });
        let output = output?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            log::debug!("{invocation} exited with {}", output.status);
            return Err(Error::from_sensuctl_output(
                &invocation.label(),
                &stderr,
                &stdout,
            ));
        }

        // A write error only matters when sensuctl itself reported success
        written?;
        Ok(stdout)
    }
}

/// Find the sensuctl executable path.
fn find_sensuctl() -> Result<PathBuf> {
    let paths = [
        "/usr/bin/sensuctl",
        "/usr/local/bin/sensuctl",
        "/opt/sensu/bin/sensuctl",
    ];

    for path in &paths {
        if Path::new(path).exists() {
            return Ok(PathBuf::from(path));
        }
    }

    let output = Command::new("which")
        .arg("sensuctl")
        .output()
        .map_err(|_| Error::SensuctlNotFound)?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    Err(Error::SensuctlNotFound)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_sensuctl(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("sensuctl");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    fn test_passes_args_and_global_flags() {
        let dir = TempDir::new().unwrap();
        let path = fake_sensuctl(&dir, "echo \"$@\"");
        let backend = CliBackend::with_path(path).with_config_dir(Path::new("/etc/sensuctl"));

        let out = backend
            .execute(&Invocation::new(["handler", "list"]))
            .unwrap();
        assert_eq!(out.trim(), "--config-dir /etc/sensuctl handler list");
    }

    #[test]
    fn test_pipes_stdin_and_env() {
        let dir = TempDir::new().unwrap();
        let path = fake_sensuctl(&dir, "printf '%s:' \"$SENSU_TEST\"; cat");
        let mut env = BTreeMap::new();
        env.insert("SENSU_TEST".to_string(), "yes".to_string());
        let backend = CliBackend::with_path(path).with_env(env);

        let out = backend
            .execute(&Invocation::new(["create"]).with_stdin("{\"a\":1}"))
            .unwrap();
        assert_eq!(out, "yes:{\"a\":1}");
    }

    #[test]
    fn test_large_stdin_with_chatty_stderr() {
        let dir = TempDir::new().unwrap();
        let path = fake_sensuctl(
            &dir,
            "head -c 262144 /dev/zero >&2; wc -c | tr -d ' '",
        );
        let backend = CliBackend::with_path(path);
        let document = "x".repeat(1 << 20);

        let out = backend
            .execute(&Invocation::new(["create"]).with_stdin(document))
            .unwrap();
        assert_eq!(out.trim(), (1 << 20).to_string());
    }

    #[test]
    fn test_non_zero_exit_is_command_failed() {
        let dir = TempDir::new().unwrap();
        let path = fake_sensuctl(&dir, "echo 'Error: unauthorized' >&2; exit 1");
        let backend = CliBackend::with_path(path);

        let err = backend
            .execute(&Invocation::new(["license", "info"]))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
        assert!(err.to_string().contains("sensuctl license info failed"));
    }

    #[test]
    fn test_missing_binary() {
        let backend = CliBackend::with_path("/nonexistent/sensuctl");
        let err = backend.execute(&Invocation::new(["version"])).unwrap_err();
        assert!(matches!(err, Error::SensuctlNotFound));
    }
}
