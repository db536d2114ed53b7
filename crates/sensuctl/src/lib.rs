//! # sensuctl
//!
//! Typed Rust client for Sensu Go's `sensuctl` command-line tool.
//!
//! This crate provides functionality for:
//! - Listing objects of a kind across all namespaces
//! - Upserting objects from generated metadata/spec documents
//! - Deleting objects by kind, name and namespace
//! - Applying and removing license files
//!
//! ## Example
//!
//! ```no_run
//! use sensuctl::{Client, ObjectMeta};
//! use serde_json::{Map, json};
//!
//! let client = Client::new().expect("sensuctl not available");
//!
//! for record in client.list("handler").expect("list failed") {
//!     println!("{} in {}", record.metadata.name, record.metadata.namespace);
//! }
//!
//! let mut spec = Map::new();
//! spec.insert("type".into(), json!("pipe"));
//! spec.insert("command".into(), json!("notify.sh"));
//! client
//!     .create("Handler", ObjectMeta::new("slack", "default"), spec)
//!     .expect("create failed");
//! ```
//!
//! Every call is a single blocking process invocation. Nothing is cached
//! and nothing is retried.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::{Backend, Invocation};
pub use error::{Error, ErrorCategory, Result};
pub use types::{DEFAULT_NAMESPACE, ListRecord, ObjectDocument, ObjectMeta};

use backend::cli::CliBackend;
use serde_json::{Map, Value};
use std::path::Path;

/// High-level client for sensuctl operations.
///
/// The client builds argument vectors and documents, and hands them to a
/// [`Backend`] for execution.
pub struct Client {
    backend: Box<dyn Backend>,
}

impl Client {
    /// Create a new Client with the default backend.
    ///
    /// Returns an error if sensuctl is not installed.
    pub fn new() -> Result<Self> {
        let backend = CliBackend::new()?;
        Ok(Self {
            backend: Box::new(backend),
        })
    }

    /// Create a client with a custom backend (useful for testing).
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    fn run(&self, invocation: &Invocation) -> Result<String> {
        self.backend.execute(invocation)
    }

    // =========================================================================
    // Object Operations
    // =========================================================================

    /// List every object of `kind` across all namespaces.
    ///
    /// Runs `sensuctl <kind> list --all-namespaces --format json`.
    pub fn list(&self, kind: &str) -> Result<Vec<ListRecord>> {
        let invocation = Invocation::new([kind, "list", "--all-namespaces", "--format", "json"]);
        let output = self.run(&invocation)?;
        parse_list(&invocation, &output)
    }

    /// Create or overwrite an object.
    ///
    /// Runs `sensuctl create` with the generated document on stdin.
    /// sensuctl's create is an upsert, so this is also how updates are sent.
    pub fn create(&self, kind: &str, metadata: ObjectMeta, spec: Map<String, Value>) -> Result<()> {
        self.create_document(&ObjectDocument::new(kind, metadata, spec))
    }

    /// Create or overwrite an object from a prepared document.
    pub fn create_document(&self, document: &ObjectDocument) -> Result<()> {
        let body = serde_json::to_string(document)?;
        self.run(&Invocation::new(["create"]).with_stdin(body))?;
        Ok(())
    }

    /// Delete one object.
    ///
    /// Runs `sensuctl <kind> delete <name> --skip-confirm --namespace <namespace>`.
    pub fn delete(&self, kind: &str, name: &str, namespace: &str) -> Result<()> {
        self.run(&Invocation::new([
            kind,
            "delete",
            name,
            "--skip-confirm",
            "--namespace",
            namespace,
        ]))?;
        Ok(())
    }

    // =========================================================================
    // File Operations
    // =========================================================================

    /// Create resources from a file (`sensuctl create -f <file>`).
    pub fn create_file(&self, file: &Path) -> Result<()> {
        let file = file.display().to_string();
        self.run(&Invocation::new(["create", "-f", file.as_str()]))?;
        Ok(())
    }

    /// Delete resources described in a file (`sensuctl delete -f <file>`).
    pub fn delete_file(&self, file: &Path) -> Result<()> {
        let file = file.display().to_string();
        self.run(&Invocation::new(["delete", "-f", file.as_str()]))?;
        Ok(())
    }

    /// Query the active license (`sensuctl license info`).
    pub fn license_info(&self) -> Result<String> {
        self.run(&Invocation::new(["license", "info"]))
    }
}

/// Parse list output; sensuctl prints `null` or nothing when a kind is empty.
fn parse_list(invocation: &Invocation, output: &str) -> Result<Vec<ListRecord>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }

    serde_json::from_str(trimmed).map_err(|source| Error::Decode {
        command: invocation.label(),
        source,
    })
}
