//! In-memory sensuctl emulation.
//!
//! Understands the same argument vectors the [`Client`](crate::Client)
//! produces and keeps objects in a map, so reconciliation can be exercised
//! end-to-end without a Sensu backend. Every invocation is recorded.

use crate::backend::{Backend, Invocation};
use crate::error::{Error, Result};
use crate::types::{ListRecord, ObjectDocument};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

type ObjectKey = (String, String, String);

#[derive(Debug, Default)]
struct MemoryState {
    /// (kind, namespace, name) -> document
    objects: BTreeMap<ObjectKey, ObjectDocument>,
    /// License file currently applied
    license: Option<String>,
    /// Every invocation seen, in order
    invocations: Vec<Invocation>,
    /// Invocation label -> error output to fail with
    failures: BTreeMap<String, String>,
}

/// Backend that emulates sensuctl in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Seed an object as if it had been created earlier.
    pub fn insert(&self, document: ObjectDocument) {
        let key = object_key(&document);
        self.lock().objects.insert(key, document);
    }

    /// Seed an applied license.
    pub fn set_license(&self, file: impl Into<String>) {
        self.lock().license = Some(file.into());
    }

    /// Make every invocation with this label (e.g. `handler list`) fail.
    pub fn fail_on(&self, label: impl Into<String>, output: impl Into<String>) {
        self.lock().failures.insert(label.into(), output.into());
    }

    /// Invocations executed so far.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    /// Forget recorded invocations.
    pub fn clear_invocations(&self) {
        self.lock().invocations.clear();
    }

    /// Look up a stored object.
    pub fn get(&self, kind: &str, name: &str, namespace: &str) -> Option<ObjectDocument> {
        self.lock()
            .objects
            .get(&(kind.to_lowercase(), namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of stored objects of a kind.
    pub fn count(&self, kind: &str) -> usize {
        let kind = kind.to_lowercase();
        self.lock().objects.keys().filter(|k| k.0 == kind).count()
    }
}

fn object_key(document: &ObjectDocument) -> ObjectKey {
    (
        document.kind.to_lowercase(),
        document.metadata.namespace.clone(),
        document.metadata.name.clone(),
    )
}

fn not_found(label: &str, what: &str) -> Error {
    Error::from_sensuctl_output(label, &format!("Error: {what} not found"), "")
}

fn unsupported(invocation: &Invocation) -> Error {
    Error::from_sensuctl_output(
        &invocation.label(),
        &format!("Error: unknown command \"{}\"", invocation.args.join(" ")),
        "",
    )
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

impl Backend for MemoryBackend {
    fn execute(&self, invocation: &Invocation) -> Result<String> {
        let mut state = self.lock();
        state.invocations.push(invocation.clone());

        let label = invocation.label();
        if let Some(output) = state.failures.get(&label) {
            return Err(Error::from_sensuctl_output(&label, output, ""));
        }

        let args: Vec<&str> = invocation.args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["create", "-f", file] => {
                state.license = Some((*file).to_string());
                Ok(String::new())
            }
            ["create"] => {
                let raw = invocation.stdin.as_deref().unwrap_or_default();
                let document: ObjectDocument = serde_json::from_str(raw).map_err(|e| {
                    Error::from_sensuctl_output(&label, &format!("Error: invalid document: {e}"), "")
                })?;
                let key = object_key(&document);
                state.objects.insert(key, document);
                Ok(String::new())
            }
            ["delete", "-f", file] => {
                if state.license.as_deref() == Some(*file) {
                    state.license = None;
                    Ok(String::new())
                } else {
                    Err(not_found(&label, "license"))
                }
            }
            ["license", "info"] => match &state.license {
                Some(file) => Ok(format!("{{\"file\":\"{file}\"}}")),
                None => Err(not_found(&label, "license")),
            },
            [kind, "list", ..] => {
                let records: Vec<ListRecord> = state
                    .objects
                    .iter()
                    .filter(|(key, _)| key.0 == *kind)
                    .map(|(_, doc)| doc.to_record())
                    .collect();
                if records.is_empty() {
                    Ok("null".to_string())
                } else {
                    Ok(serde_json::to_string(&records)?)
                }
            }
            [kind, "delete", name, ..] => {
                let namespace = flag_value(&invocation.args, "--namespace").unwrap_or("default");
                let key = ((*kind).to_string(), namespace.to_string(), (*name).to_string());
                match state.objects.remove(&key) {
                    Some(_) => Ok(String::new()),
                    None => Err(not_found(&label, &format!("{kind} {name}"))),
                }
            }
            _ => Err(unsupported(invocation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::types::ObjectMeta;
    use serde_json::{Map, json};

    fn handler_doc(name: &str) -> ObjectDocument {
        let mut spec = Map::new();
        spec.insert("type".to_string(), json!("pipe"));
        ObjectDocument::new("Handler", ObjectMeta::new(name, "default"), spec)
    }

    #[test]
    fn test_create_then_list() {
        let backend = MemoryBackend::new();
        let doc = serde_json::to_string(&handler_doc("a")).unwrap();
        backend
            .execute(&Invocation::new(["create"]).with_stdin(doc))
            .unwrap();

        let out = backend
            .execute(&Invocation::new(["handler", "list", "--format", "json"]))
            .unwrap();
        let records: Vec<ListRecord> = serde_json::from_str(&out).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.name, "a");
        assert_eq!(records[0].fields["type"], "pipe");
    }

    #[test]
    fn test_empty_list_is_null() {
        let backend = MemoryBackend::new();
        let out = backend
            .execute(&Invocation::new(["handler", "list"]))
            .unwrap();
        assert_eq!(out, "null");
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let backend = MemoryBackend::new();
        let err = backend
            .execute(&Invocation::new([
                "handler",
                "delete",
                "a",
                "--skip-confirm",
                "--namespace",
                "default",
            ]))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_fail_on_label() {
        let backend = MemoryBackend::new();
        backend.fail_on("handler list", "Error: unauthorized");
        let err = backend
            .execute(&Invocation::new(["handler", "list"]))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
        assert_eq!(backend.invocations().len(), 1);
    }

    #[test]
    fn test_license_lifecycle() {
        let backend = MemoryBackend::new();
        assert!(backend.execute(&Invocation::new(["license", "info"])).is_err());

        backend
            .execute(&Invocation::new(["create", "-f", "/etc/sensu/license.json"]))
            .unwrap();
        assert!(backend.execute(&Invocation::new(["license", "info"])).is_ok());

        backend
            .execute(&Invocation::new(["delete", "-f", "/etc/sensu/license.json"]))
            .unwrap();
        assert!(backend.execute(&Invocation::new(["license", "info"])).is_err());
    }
}
