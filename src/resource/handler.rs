//! Sensu handlers
//!
//! A handler is validated from its configuration shape, matched against the
//! handlers `sensuctl handler list` reports, and converged with one upsert
//! per changed handler. Updates are full documents: sensuctl's `create`
//! overwrites, so every attribute the operator did not mention is carried
//! over from the discovered state.

use super::field::{Blank, Field, LooseInteger, non_blank};
use super::{Ensure, Identity, ReconcileError};
use crate::engine::context::{Discovered, ReconcileContext};
use anyhow::{Result, bail};
use declarative::{Action, ApplyResult, AttributeChange, Reconcile, ResourceDiff};
use regex::Regex;
use sensuctl::{Client, DEFAULT_NAMESPACE, ListRecord, ObjectDocument, ObjectMeta};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Kind name used on the sensuctl command line
pub const KIND: &str = "handler";

/// Kind name used in documents
const DOCUMENT_KIND: &str = "Handler";

/// Environment stamped on handlers that do not name one
pub const DEFAULT_ENVIRONMENT: &str = "default";

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.\-]+$").expect("handler name pattern is valid"));

/// Spec keys owned by typed attributes; anything else is `custom`
const SPEC_KEYS: [&str; 9] = [
    "type",
    "filters",
    "mutator",
    "timeout",
    "command",
    "env_vars",
    "handlers",
    "socket",
    "runtime_assets",
];

type Labels = BTreeMap<String, String>;

// ============================================================================
// Handler Type
// ============================================================================

/// How Sensu delivers events to a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerType {
    Pipe,
    Tcp,
    Udp,
    Set,
}

impl HandlerType {
    pub const ALL: [Self; 4] = [Self::Pipe, Self::Tcp, Self::Udp, Self::Set];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pipe => "pipe",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Set => "set",
        }
    }

    /// tcp and udp handlers write to a socket
    pub fn needs_socket(self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }
}

impl FromStr for HandlerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                let expected: Vec<_> = Self::ALL.iter().map(|t| t.as_str()).collect();
                format!(
                    "Invalid type '{s}', expected one of: {}",
                    expected.join(", ")
                )
            })
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// A handler as written in the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    /// Title; either `name` or `name in namespace`
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the name part of the title
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub ensure: Ensure,
    /// Overrides the namespace part of the title
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default, rename = "type")]
    pub handler_type: Field<String>,
    #[serde(default)]
    pub filters: Field<Vec<String>>,
    #[serde(default)]
    pub mutator: Field<String>,
    #[serde(default)]
    pub timeout: Field<LooseInteger>,
    #[serde(default)]
    pub command: Field<String>,
    #[serde(default)]
    pub env_vars: Field<Vec<String>>,
    #[serde(default)]
    pub handlers: Field<Vec<String>>,
    #[serde(default)]
    pub socket_host: Field<String>,
    #[serde(default)]
    pub socket_port: Field<LooseInteger>,
    #[serde(default)]
    pub runtime_assets: Field<Vec<String>>,
    #[serde(default)]
    pub labels: Field<Labels>,
    #[serde(default)]
    pub annotations: Field<Labels>,
    /// Extra spec keys sent verbatim beside the typed attributes
    #[serde(default)]
    pub custom: Field<Map<String, Value>>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl HandlerConfig {
    /// Check attribute combinations and produce a typed handler.
    ///
    /// Nothing is sent to sensuctl until every handler validates.
    pub fn validate(self) -> Result<Handler, ReconcileError> {
        let title = self
            .name
            .as_deref()
            .or(self.resource_name.as_deref())
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| ReconcileError::validation(KIND, "Title or name must be provided"))?;
        let resource = format!("{KIND} {title}");
        let fail = |message: String| ReconcileError::validation(&resource, message);

        let (title_name, title_namespace) = Identity::parse_title(&title);
        let name = self.resource_name.unwrap_or(title_name);
        if !NAME_PATTERN.is_match(&name) {
            return Err(fail(format!(
                "Invalid name '{name}': only letters, digits, '_', '.' and '-' are allowed"
            )));
        }
        let namespace = self
            .namespace
            .or(title_namespace)
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

        let handler_type = self
            .handler_type
            .try_map(|t| t.parse::<HandlerType>())
            .map_err(&fail)?;
        if self.ensure == Ensure::Present && !handler_type.is_set() {
            return Err(fail("You must provide a type".to_string()));
        }

        let timeout = integer("timeout", self.timeout)
            .and_then(|f| {
                f.try_map(|n| {
                    u32::try_from(n)
                        .map_err(|_| format!("timeout must be between 0 and {}", u32::MAX))
                })
            })
            .map_err(&fail)?;
        let socket_port = integer("socket_port", self.socket_port)
            .and_then(|f| {
                f.try_map(|n| {
                    u16::try_from(n)
                        .map_err(|_| "socket_port must be between 0 and 65535".to_string())
                })
            })
            .map_err(&fail)?;

        // Blank values count as missing for the checks below
        let command = self.command.non_blank();
        let socket_host = self.socket_host.non_blank();
        let socket_port = socket_port.non_blank();

        if let Field::Set(t) = handler_type {
            if t == HandlerType::Pipe && !command.is_set() {
                return Err(fail("command must be defined for type pipe".to_string()));
            }
            if t.needs_socket() && !socket_host.is_set() && !socket_port.is_set() {
                return Err(fail(
                    "socket_host and socket_port are required for type tcp or type udp"
                        .to_string(),
                ));
            }
        }
        match (socket_host.is_set(), socket_port.is_set()) {
            (true, false) => {
                return Err(fail("socket_port is required if socket_host is set".to_string()));
            }
            (false, true) => {
                return Err(fail("socket_host is required if socket_port is set".to_string()));
            }
            _ => {}
        }

        if let Some(key) = self
            .custom
            .as_set()
            .and_then(|custom| custom.keys().find(|k| SPEC_KEYS.contains(&k.as_str())))
        {
            return Err(fail(format!(
                "custom cannot set '{key}', use the {key} attribute instead"
            )));
        }

        Ok(Handler {
            identity: Identity::new(name, namespace),
            ensure: self.ensure,
            attributes: HandlerAttributes {
                handler_type,
                filters: self.filters.non_blank(),
                mutator: self.mutator.non_blank(),
                timeout: timeout.non_blank(),
                command,
                env_vars: self.env_vars.non_blank(),
                handlers: self.handlers.non_blank(),
                socket_host,
                socket_port,
                runtime_assets: self.runtime_assets.non_blank(),
                labels: self.labels.non_blank(),
                annotations: self.annotations.non_blank(),
                custom: self.custom.non_blank(),
            },
            environment: self
                .environment
                .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string()),
            organization: self.organization,
        })
    }
}

fn integer(attribute: &str, value: Field<LooseInteger>) -> Result<Field<i64>, String> {
    value.try_map(|v| {
        v.to_i64()
            .ok_or_else(|| format!("{attribute} should be an Integer"))
    })
}

// ============================================================================
// Desired and Discovered State
// ============================================================================

/// A validated handler declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub identity: Identity,
    pub ensure: Ensure,
    pub attributes: HandlerAttributes,
    pub environment: String,
    pub organization: Option<String>,
}

/// Desired attribute values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerAttributes {
    pub handler_type: Field<HandlerType>,
    pub filters: Field<Vec<String>>,
    pub mutator: Field<String>,
    pub timeout: Field<u32>,
    pub command: Field<String>,
    pub env_vars: Field<Vec<String>>,
    pub handlers: Field<Vec<String>>,
    pub socket_host: Field<String>,
    pub socket_port: Field<u16>,
    pub runtime_assets: Field<Vec<String>>,
    pub labels: Field<Labels>,
    pub annotations: Field<Labels>,
    pub custom: Field<Map<String, Value>>,
}

/// Attribute values as they are (or will be) on the backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerState {
    pub handler_type: Option<HandlerType>,
    pub filters: Option<Vec<String>>,
    pub mutator: Option<String>,
    pub timeout: Option<u32>,
    pub command: Option<String>,
    pub env_vars: Option<Vec<String>>,
    pub handlers: Option<Vec<String>>,
    pub socket_host: Option<String>,
    pub socket_port: Option<u16>,
    pub runtime_assets: Option<Vec<String>>,
    pub labels: Option<Labels>,
    pub annotations: Option<Labels>,
    pub custom: Option<Map<String, Value>>,
}

impl HandlerAttributes {
    /// Attributes whose desired value differs from `current`
    pub fn changes(&self, current: &HandlerState) -> Vec<AttributeChange> {
        let mut changes = Vec::new();
        push_change(&mut changes, "type", &self.handler_type, current.handler_type.as_ref());
        push_change(&mut changes, "filters", &self.filters, current.filters.as_ref());
        push_change(&mut changes, "mutator", &self.mutator, current.mutator.as_ref());
        push_change(&mut changes, "timeout", &self.timeout, current.timeout.as_ref());
        push_change(&mut changes, "command", &self.command, current.command.as_ref());
        push_change(&mut changes, "env_vars", &self.env_vars, current.env_vars.as_ref());
        push_change(&mut changes, "handlers", &self.handlers, current.handlers.as_ref());
        push_change(&mut changes, "socket_host", &self.socket_host, current.socket_host.as_ref());
        push_change(&mut changes, "socket_port", &self.socket_port, current.socket_port.as_ref());
        push_change(
            &mut changes,
            "runtime_assets",
            &self.runtime_assets,
            current.runtime_assets.as_ref(),
        );
        push_change(&mut changes, "labels", &self.labels, current.labels.as_ref());
        push_change(&mut changes, "annotations", &self.annotations, current.annotations.as_ref());
        push_change(&mut changes, "custom", &self.custom, current.custom.as_ref());
        changes
    }

    /// The state to upsert, given the state on the backend
    pub fn resolve(&self, prior: &HandlerState) -> HandlerState {
        HandlerState {
            handler_type: self.handler_type.resolve(prior.handler_type.as_ref()),
            filters: self.filters.resolve(prior.filters.as_ref()),
            mutator: self.mutator.resolve(prior.mutator.as_ref()),
            timeout: self.timeout.resolve(prior.timeout.as_ref()),
            command: self.command.resolve(prior.command.as_ref()),
            env_vars: self.env_vars.resolve(prior.env_vars.as_ref()),
            handlers: self.handlers.resolve(prior.handlers.as_ref()),
            socket_host: self.socket_host.resolve(prior.socket_host.as_ref()),
            socket_port: self.socket_port.resolve(prior.socket_port.as_ref()),
            runtime_assets: self.runtime_assets.resolve(prior.runtime_assets.as_ref()),
            labels: self.labels.resolve(prior.labels.as_ref()),
            annotations: self.annotations.resolve(prior.annotations.as_ref()),
            custom: self.custom.resolve(prior.custom.as_ref()),
        }
    }
}

fn push_change<T: AttrValue>(
    changes: &mut Vec<AttributeChange>,
    attribute: &str,
    desired: &Field<T>,
    current: Option<&T>,
) {
    let pending = match desired {
        Field::Unset => false,
        Field::Absent => current.is_some(),
        Field::Set(v) => current != Some(v),
    };
    if pending {
        changes.push(AttributeChange::new(
            attribute,
            current.map(render),
            desired.as_set().map(render),
        ));
    }
}

/// Attribute types that can be written into a document
trait AttrValue: PartialEq {
    fn to_value(&self) -> Value;
}

impl AttrValue for String {
    fn to_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

impl AttrValue for Vec<String> {
    fn to_value(&self) -> Value {
        Value::from(self.clone())
    }
}

impl AttrValue for u32 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl AttrValue for u16 {
    fn to_value(&self) -> Value {
        Value::from(*self)
    }
}

impl AttrValue for HandlerType {
    fn to_value(&self) -> Value {
        Value::from(self.as_str())
    }
}

impl AttrValue for Labels {
    fn to_value(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                .collect(),
        )
    }
}

impl AttrValue for Map<String, Value> {
    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }
}

fn render<T: AttrValue>(value: &T) -> String {
    value.to_value().to_string()
}

fn put<T: AttrValue>(map: &mut Map<String, Value>, key: &str, value: Option<&T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.to_value());
    }
}

/// Spec fields of a listed handler. Blank values mean "not set".
#[derive(Debug, Default, Deserialize)]
struct HandlerSpec {
    #[serde(default, rename = "type")]
    handler_type: Option<HandlerType>,
    #[serde(default, deserialize_with = "non_blank")]
    filters: Option<Vec<String>>,
    #[serde(default, deserialize_with = "non_blank")]
    mutator: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    timeout: Option<u32>,
    #[serde(default, deserialize_with = "non_blank")]
    command: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    env_vars: Option<Vec<String>>,
    #[serde(default, deserialize_with = "non_blank")]
    handlers: Option<Vec<String>>,
    #[serde(default)]
    socket: Option<SocketSpec>,
    #[serde(default, deserialize_with = "non_blank")]
    runtime_assets: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct SocketSpec {
    #[serde(default, deserialize_with = "non_blank")]
    host: Option<String>,
    #[serde(default, deserialize_with = "non_blank")]
    port: Option<u16>,
}

impl HandlerState {
    /// Parse the spec half of a listed record
    fn from_record(record: &ListRecord) -> serde_json::Result<Self> {
        let spec: HandlerSpec = serde_json::from_value(Value::Object(record.fields.clone()))?;
        let socket = spec.socket.unwrap_or_default();
        Ok(Self {
            handler_type: spec.handler_type,
            filters: spec.filters,
            mutator: spec.mutator,
            timeout: spec.timeout,
            command: spec.command,
            env_vars: spec.env_vars,
            handlers: spec.handlers,
            socket_host: socket.host,
            socket_port: socket.port,
            runtime_assets: spec.runtime_assets,
            labels: record.metadata.labels.clone().filter(|l| !l.is_blank()),
            annotations: record.metadata.annotations.clone().filter(|a| !a.is_blank()),
            custom: custom_fields(&record.fields),
        })
    }

    /// Build the `spec` object; unset attributes are omitted
    pub fn spec(&self) -> Map<String, Value> {
        let mut spec = Map::new();
        put(&mut spec, "type", self.handler_type.as_ref());
        put(&mut spec, "filters", self.filters.as_ref());
        put(&mut spec, "mutator", self.mutator.as_ref());
        put(&mut spec, "timeout", self.timeout.as_ref());
        put(&mut spec, "command", self.command.as_ref());
        put(&mut spec, "env_vars", self.env_vars.as_ref());
        put(&mut spec, "handlers", self.handlers.as_ref());
        if self.socket_host.is_some() || self.socket_port.is_some() {
            let mut socket = Map::new();
            put(&mut socket, "host", self.socket_host.as_ref());
            put(&mut socket, "port", self.socket_port.as_ref());
            spec.insert("socket".to_string(), Value::Object(socket));
        }
        put(&mut spec, "runtime_assets", self.runtime_assets.as_ref());
        for (key, value) in self.custom.iter().flatten() {
            spec.entry(key.as_str()).or_insert_with(|| value.clone());
        }
        spec
    }
}

/// Non-blank spec keys that no typed attribute owns
fn custom_fields(fields: &Map<String, Value>) -> Option<Map<String, Value>> {
    let custom: Map<String, Value> = fields
        .iter()
        .filter(|(key, value)| !SPEC_KEYS.contains(&key.as_str()) && !value.is_blank())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    (!custom.is_blank()).then_some(custom)
}

/// A handler reported by `sensuctl handler list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerInstance {
    pub identity: Identity,
    pub state: HandlerState,
}

impl HandlerInstance {
    pub fn from_record(record: &ListRecord) -> serde_json::Result<Self> {
        Ok(Self {
            identity: Identity::new(&record.metadata.name, &record.metadata.namespace),
            state: HandlerState::from_record(record)?,
        })
    }
}

impl Discovered for HandlerInstance {
    fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl Handler {
    /// The document to upsert for a resolved state
    pub fn document(&self, state: &HandlerState) -> ObjectDocument {
        let mut metadata = ObjectMeta::new(&self.identity.name, &self.identity.namespace);
        metadata.labels.clone_from(&state.labels);
        metadata.annotations.clone_from(&state.annotations);
        metadata.environment = Some(self.environment.clone());
        metadata.organization.clone_from(&self.organization);
        ObjectDocument::new(DOCUMENT_KIND, metadata, state.spec())
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// List every handler on the backend
pub fn discover(client: &Client) -> Result<Vec<HandlerInstance>, ReconcileError> {
    let records = client
        .list(KIND)
        .map_err(|source| ReconcileError::Discovery { kind: KIND, source })?;
    log::debug!("Discovered {} handlers", records.len());

    records
        .iter()
        .map(HandlerInstance::from_record)
        .collect::<serde_json::Result<Vec<_>>>()
        .map_err(|source| ReconcileError::Discovery {
            kind: KIND,
            source: sensuctl::Error::Decode {
                command: format!("{KIND} list"),
                source,
            },
        })
}

/// One pass over all handlers
pub struct HandlerPass<'a> {
    client: &'a Client,
    desired: Vec<Handler>,
    context: ReconcileContext<HandlerInstance>,
    purge: bool,
}

impl<'a> HandlerPass<'a> {
    /// Discover existing handlers and bind them to the desired ones.
    ///
    /// Makes exactly one `list` call.
    pub fn prefetch(
        client: &'a Client,
        desired: Vec<Handler>,
        purge: bool,
    ) -> Result<Self, ReconcileError> {
        let discovered = discover(client)?;
        Ok(Self {
            client,
            desired,
            context: ReconcileContext::new(discovered),
            purge,
        })
    }

    pub fn exists(&self, identity: &Identity) -> bool {
        self.context.contains(identity)
    }

    pub fn instances(&self) -> impl Iterator<Item = &HandlerInstance> {
        self.context.iter()
    }

    pub fn is_declared(&self, identity: &Identity) -> bool {
        self.desired.iter().any(|h| &h.identity == identity)
    }

    fn apply_error(handler: &Identity, action: &'static str, source: sensuctl::Error) -> ReconcileError {
        ReconcileError::Apply {
            resource: format!("{KIND} {handler}"),
            action,
            source,
        }
    }

    /// Create a handler that does not exist yet
    pub fn create(&mut self, handler: &Handler) -> Result<(), ReconcileError> {
        let state = handler.attributes.resolve(&HandlerState::default());
        self.client
            .create_document(&handler.document(&state))
            .map_err(|e| Self::apply_error(&handler.identity, "create", e))?;

        self.context.insert(HandlerInstance {
            identity: handler.identity.clone(),
            state,
        });
        Ok(())
    }

    /// The upsert document for an existing handler
    pub fn flush_document(&self, handler: &Handler) -> ObjectDocument {
        let prior = self
            .context
            .find(&handler.identity)
            .map(|i| &i.state)
            .cloned()
            .unwrap_or_default();
        handler.document(&handler.attributes.resolve(&prior))
    }

    /// Upsert every pending attribute of an existing handler in one call
    pub fn flush(&mut self, handler: &Handler) -> Result<(), ReconcileError> {
        let document = self.flush_document(handler);
        self.client
            .create_document(&document)
            .map_err(|e| Self::apply_error(&handler.identity, "update", e))?;

        let prior = self
            .context
            .find(&handler.identity)
            .map(|i| i.state.clone())
            .unwrap_or_default();
        self.context.insert(HandlerInstance {
            identity: handler.identity.clone(),
            state: handler.attributes.resolve(&prior),
        });
        Ok(())
    }

    /// Delete a handler and forget its discovered state
    pub fn destroy(&mut self, identity: &Identity) -> Result<(), ReconcileError> {
        self.client
            .delete(KIND, &identity.name, &identity.namespace)
            .map_err(|e| Self::apply_error(identity, "delete", e))?;
        self.context.remove(identity);
        Ok(())
    }

    fn desired_by_id(&self, id: &str) -> Option<&Handler> {
        self.desired.iter().find(|h| h.identity.to_string() == id)
    }

    fn identity_by_id(&self, id: &str) -> Option<Identity> {
        self.desired_by_id(id)
            .map(|h| h.identity.clone())
            .or_else(|| {
                self.context
                    .iter()
                    .find(|i| i.identity.to_string() == id)
                    .map(|i| i.identity.clone())
            })
    }
}

impl Reconcile for HandlerPass<'_> {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn plan(&self) -> Vec<ResourceDiff> {
        let mut diffs = Vec::new();

        for handler in &self.desired {
            let id = handler.identity.to_string();
            let current = self.context.find(&handler.identity);
            let action = match (handler.ensure, current) {
                (Ensure::Present, None) => Some(Action::Create),
                (Ensure::Present, Some(instance)) => {
                    let changes = handler.attributes.changes(&instance.state);
                    (!changes.is_empty()).then_some(Action::Update { changes })
                }
                (Ensure::Absent, Some(_)) => Some(Action::Delete),
                (Ensure::Absent, None) => None,
            };
            if let Some(action) = action {
                diffs.push(ResourceDiff::new(KIND, id, action));
            }
        }

        if self.purge {
            let declared: BTreeSet<&Identity> = self.desired.iter().map(|h| &h.identity).collect();
            diffs.extend(
                self.context
                    .iter()
                    .filter(|i| !declared.contains(&i.identity))
                    .map(|i| ResourceDiff::new(KIND, i.identity.to_string(), Action::Delete)),
            );
        }

        diffs
    }

    fn apply(&mut self, diff: &ResourceDiff) -> Result<ApplyResult> {
        match &diff.action {
            Action::Create => {
                let Some(handler) = self.desired_by_id(&diff.id).cloned() else {
                    bail!("no declared handler {}", diff.id);
                };
                self.create(&handler)?;
                log::info!("Created handler {}", diff.id);
                Ok(ApplyResult::Created)
            }
            Action::Update { changes } => {
                let Some(handler) = self.desired_by_id(&diff.id).cloned() else {
                    bail!("no declared handler {}", diff.id);
                };
                self.flush(&handler)?;
                log::info!("Updated handler {} ({} attributes)", diff.id, changes.len());
                Ok(ApplyResult::Modified)
            }
            Action::Delete => {
                let Some(identity) = self.identity_by_id(&diff.id) else {
                    bail!("unknown handler {}", diff.id);
                };
                self.destroy(&identity)?;
                log::info!("Deleted handler {}", diff.id);
                Ok(ApplyResult::Removed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensuctl::backend::memory::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn config(name: &str) -> HandlerConfig {
        HandlerConfig {
            name: Some(name.to_string()),
            handler_type: Field::Set("pipe".to_string()),
            command: Field::Set("test".to_string()),
            ..Default::default()
        }
    }

    fn validation_message(config: HandlerConfig) -> String {
        match config.validate() {
            Err(ReconcileError::Validation { message, .. }) => message,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn client() -> (Client, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        (Client::with_backend(Box::new(Arc::clone(&backend))), backend)
    }

    fn seed(backend: &MemoryBackend, name: &str, spec: Value) {
        let Value::Object(spec) = spec else {
            panic!("spec must be an object");
        };
        backend.insert(ObjectDocument::new(
            DOCUMENT_KIND,
            ObjectMeta::new(name, "default"),
            spec,
        ));
    }

    // ------------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------------

    #[test]
    fn test_minimal_pipe_handler() {
        let handler = config("test").validate().unwrap();
        assert_eq!(handler.identity, Identity::new("test", "default"));
        assert_eq!(handler.environment, "default");
        assert_eq!(handler.attributes.handler_type, Field::Set(HandlerType::Pipe));
    }

    #[test]
    fn test_requires_name() {
        let cfg = HandlerConfig {
            name: None,
            ..config("x")
        };
        assert_eq!(validation_message(cfg), "Title or name must be provided");
    }

    #[test]
    fn test_rejects_whitespace_name() {
        assert!(validation_message(config("bad name")).starts_with("Invalid name"));
    }

    #[test]
    fn test_title_carries_namespace() {
        let handler = config("slack in ops").validate().unwrap();
        assert_eq!(handler.identity, Identity::new("slack", "ops"));

        let cfg = HandlerConfig {
            namespace: Some("prod".to_string()),
            ..config("slack in ops")
        };
        assert_eq!(cfg.validate().unwrap().identity.namespace, "prod");
    }

    #[test]
    fn test_requires_type_when_present() {
        let cfg = HandlerConfig {
            handler_type: Field::Unset,
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "You must provide a type");

        let cfg = HandlerConfig {
            handler_type: Field::Unset,
            ensure: Ensure::Absent,
            ..config("test")
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_type() {
        let cfg = HandlerConfig {
            handler_type: Field::Set("foo".to_string()),
            ..config("test")
        };
        assert_eq!(
            validation_message(cfg),
            "Invalid type 'foo', expected one of: pipe, tcp, udp, set"
        );
    }

    #[test]
    fn test_integer_coercion() {
        let cfg = HandlerConfig {
            timeout: Field::Set(LooseInteger::Text("5".to_string())),
            ..config("test")
        };
        assert_eq!(cfg.validate().unwrap().attributes.timeout, Field::Set(5));

        let cfg = HandlerConfig {
            timeout: Field::Set(LooseInteger::Text("foo".to_string())),
            ..config("test")
        };
        assert!(validation_message(cfg).contains("should be an Integer"));

        let cfg = HandlerConfig {
            handler_type: Field::Set("tcp".to_string()),
            socket_host: Field::Set("127.0.0.1".to_string()),
            socket_port: Field::Set(LooseInteger::Text("foo".to_string())),
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "socket_port should be an Integer");

        let cfg = HandlerConfig {
            handler_type: Field::Set("tcp".to_string()),
            socket_host: Field::Set("127.0.0.1".to_string()),
            socket_port: Field::Set(LooseInteger::Int(70000)),
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "socket_port must be between 0 and 65535");
    }

    #[test]
    fn test_pipe_requires_command() {
        let cfg = HandlerConfig {
            command: Field::Unset,
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "command must be defined for type pipe");
    }

    #[test]
    fn test_socket_types_require_socket() {
        for t in ["tcp", "udp"] {
            let cfg = HandlerConfig {
                handler_type: Field::Set(t.to_string()),
                ..config("test")
            };
            assert_eq!(
                validation_message(cfg),
                "socket_host and socket_port are required for type tcp or type udp"
            );
        }
    }

    #[test]
    fn test_socket_pairing() {
        let cfg = HandlerConfig {
            socket_host: Field::Set("127.0.0.1".to_string()),
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "socket_port is required if socket_host is set");

        let cfg = HandlerConfig {
            socket_port: Field::Set(LooseInteger::Text("2003".to_string())),
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "socket_host is required if socket_port is set");
    }

    #[test]
    fn test_blank_values_do_not_satisfy_requirements() {
        let cfg = HandlerConfig {
            command: Field::Set(String::new()),
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "command must be defined for type pipe");

        let cfg = HandlerConfig {
            handler_type: Field::Set("tcp".to_string()),
            socket_host: Field::Set(String::new()),
            socket_port: Field::Set(LooseInteger::Int(0)),
            ..config("test")
        };
        assert_eq!(
            validation_message(cfg),
            "socket_host and socket_port are required for type tcp or type udp"
        );

        let cfg = HandlerConfig {
            handler_type: Field::Set("tcp".to_string()),
            socket_host: Field::Set(String::new()),
            socket_port: Field::Set(LooseInteger::Int(2003)),
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "socket_host is required if socket_port is set");

        let cfg = HandlerConfig {
            handler_type: Field::Set("udp".to_string()),
            socket_host: Field::Set("10.0.0.1".to_string()),
            socket_port: Field::Set(LooseInteger::Text("0".to_string())),
            ..config("test")
        };
        assert_eq!(validation_message(cfg), "socket_port is required if socket_host is set");
    }

    #[test]
    fn test_non_integer_values_from_toml() {
        for value in ["true", "5.5", "\"five\""] {
            let cfg: HandlerConfig = toml::from_str(&format!(
                "name = \"test\"\ntype = \"pipe\"\ncommand = \"x\"\ntimeout = {value}"
            ))
            .unwrap();
            assert_eq!(validation_message(cfg), "timeout should be an Integer");
        }
    }

    #[test]
    fn test_custom_must_be_a_map() {
        let err = toml::from_str::<HandlerConfig>("name = \"test\"\ncustom = \"foo\"")
            .unwrap_err();
        assert!(err.to_string().contains("expected a map"), "{err}");

        let cfg: HandlerConfig =
            toml::from_str("name = \"test\"\ntype = \"set\"\ncustom = { foo = \"bar\" }")
                .unwrap();
        let handler = cfg.validate().unwrap();
        assert_eq!(
            handler.attributes.custom.as_set().map(|c| c["foo"].clone()),
            Some(json!("bar"))
        );
    }

    #[test]
    fn test_custom_cannot_shadow_attributes() {
        let cfg = HandlerConfig {
            custom: Field::Set(Map::from_iter([("command".to_string(), json!("x"))])),
            ..config("test")
        };
        assert_eq!(
            validation_message(cfg),
            "custom cannot set 'command', use the command attribute instead"
        );
    }

    #[test]
    fn test_valid_socket_handler() {
        let cfg = HandlerConfig {
            handler_type: Field::Set("udp".to_string()),
            command: Field::Unset,
            socket_host: Field::Set("10.0.0.1".to_string()),
            socket_port: Field::Set(LooseInteger::Int(2003)),
            ..config("graphite")
        };
        let handler = cfg.validate().unwrap();
        assert_eq!(handler.attributes.socket_port, Field::Set(2003));
    }

    #[test]
    fn test_from_toml() {
        let cfg: HandlerConfig = toml::from_str(
            r#"
            name = "slack in ops"
            type = "pipe"
            command = "notify.sh"
            mutator = "absent"
            timeout = "10"
            filters = ["is_incident"]
            "#,
        )
        .unwrap();
        let handler = cfg.validate().unwrap();
        assert_eq!(handler.attributes.mutator, Field::Absent);
        assert_eq!(handler.attributes.timeout, Field::Set(10));
        assert_eq!(handler.attributes.env_vars, Field::Unset);
    }

    #[test]
    fn test_rejects_unknown_key() {
        let result: Result<HandlerConfig, _> = toml::from_str("name = \"a\"\nkommand = \"x\"");
        assert!(result.is_err());
    }

    // ------------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------------

    #[test]
    fn test_discovered_record_normalized() {
        let record: ListRecord = serde_json::from_value(json!({
            "metadata": {"name": "a", "namespace": "ops", "labels": {}},
            "type": "tcp",
            "mutator": "",
            "filters": null,
            "timeout": 0,
            "env_vars": [],
            "socket": {"host": "10.0.0.1", "port": 2003},
            "unknown_field": true
        }))
        .unwrap();
        let instance = HandlerInstance::from_record(&record).unwrap();

        assert_eq!(instance.identity, Identity::new("a", "ops"));
        assert_eq!(instance.state.handler_type, Some(HandlerType::Tcp));
        assert_eq!(instance.state.mutator, None);
        assert_eq!(instance.state.filters, None);
        assert_eq!(instance.state.timeout, None);
        assert_eq!(instance.state.env_vars, None);
        assert_eq!(instance.state.labels, None);
        assert_eq!(instance.state.socket_port, Some(2003));
    }

    #[test]
    fn test_discovery_failure() {
        let (client, backend) = client();
        backend.fail_on("handler list", "Error: connection refused");

        let err = HandlerPass::prefetch(&client, Vec::new(), false)
            .err()
            .unwrap();
        assert!(matches!(err, ReconcileError::Discovery { kind: "handler", .. }));
        assert!(err.advice().is_some());
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    #[test]
    fn test_create_then_discover_round_trip() {
        let (client, _backend) = client();
        let cfg = HandlerConfig {
            filters: Field::Set(vec!["is_incident".to_string()]),
            timeout: Field::Set(LooseInteger::Int(30)),
            labels: Field::Set(BTreeMap::from([("team".to_string(), "ops".to_string())])),
            ..config("test")
        };
        let handler = cfg.validate().unwrap();

        let mut pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();
        let diffs = pass.plan();
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].is_addition());
        assert_eq!(pass.apply(&diffs[0]).unwrap(), ApplyResult::Created);
        assert!(pass.exists(&handler.identity));

        let discovered = discover(&client).unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].identity, handler.identity);
        assert_eq!(
            discovered[0].state,
            handler.attributes.resolve(&HandlerState::default())
        );

        let pass = HandlerPass::prefetch(&client, vec![handler], false).unwrap();
        assert!(pass.plan().is_empty());
    }

    #[test]
    fn test_create_document_shape() {
        let (client, backend) = client();
        let cfg = HandlerConfig {
            handler_type: Field::Set("tcp".to_string()),
            command: Field::Unset,
            mutator: Field::Absent,
            socket_host: Field::Set("10.0.0.1".to_string()),
            socket_port: Field::Set(LooseInteger::Text("2003".to_string())),
            ..config("graphite in ops")
        };
        let mut pass = HandlerPass::prefetch(&client, Vec::new(), false).unwrap();
        pass.create(&cfg.validate().unwrap()).unwrap();

        let calls = backend.invocations();
        let sent: Value = serde_json::from_str(calls[1].stdin.as_deref().unwrap()).unwrap();
        assert_eq!(sent["type"], "Handler");
        assert_eq!(sent["api_version"], "core/v2");
        assert_eq!(sent["metadata"]["name"], "graphite");
        assert_eq!(sent["metadata"]["namespace"], "ops");
        assert_eq!(sent["metadata"]["environment"], "default");
        assert_eq!(sent["spec"]["socket"], json!({"host": "10.0.0.1", "port": 2003}));
        assert!(sent["spec"].get("mutator").is_none());
        assert!(sent["spec"].get("command").is_none());
    }

    #[test]
    fn test_create_failure_leaves_resource_absent() {
        let (client, backend) = client();
        backend.fail_on("create", "Error: handler rejected: invalid spec");
        let handler = config("test").validate().unwrap();

        let mut pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();
        let diffs = pass.plan();
        let err = pass.apply(&diffs[0]).unwrap_err();

        assert!(format!("{err:#}").contains("invalid spec"));
        assert!(!pass.exists(&handler.identity));
        assert_eq!(backend.count(KIND), 0);
    }

    #[test]
    fn test_custom_merged_into_spec_and_diffed() {
        let (client, backend) = client();
        seed(
            &backend,
            "test",
            json!({"type": "pipe", "command": "test", "secrets": null, "team": "ops"}),
        );

        let discovered = discover(&client).unwrap();
        assert_eq!(
            discovered[0].state.custom,
            Some(Map::from_iter([("team".to_string(), json!("ops"))]))
        );

        let handler = config("test").validate().unwrap();
        let pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();
        assert!(pass.plan().is_empty());
        assert_eq!(pass.flush_document(&handler).spec["team"], "ops");

        let cfg = HandlerConfig {
            custom: Field::Set(Map::from_iter([("team".to_string(), json!("sre"))])),
            ..config("test")
        };
        let handler = cfg.validate().unwrap();
        let mut pass = HandlerPass::prefetch(&client, vec![handler], false).unwrap();
        let diffs = pass.plan();
        let Action::Update { changes } = &diffs[0].action else {
            panic!("expected update");
        };
        assert_eq!(changes[0].attribute, "custom");

        pass.apply(&diffs[0]).unwrap();
        let stored = backend.get(DOCUMENT_KIND, "test", "default").unwrap();
        assert_eq!(stored.spec["team"], "sre");
        assert_eq!(stored.spec["command"], "test");
    }

    #[test]
    fn test_update_failure_keeps_prior_state() {
        let (client, backend) = client();
        seed(&backend, "test", json!({"type": "pipe", "command": "old"}));
        let handler = config("test").validate().unwrap();
        let mut pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();
        backend.fail_on("create", "Error: etcd unavailable");

        let diffs = pass.plan();
        assert!(matches!(diffs[0].action, Action::Update { .. }));
        let err = pass.apply(&diffs[0]).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("update"), "{message}");
        assert!(message.contains("etcd unavailable"), "{message}");

        assert!(pass.exists(&handler.identity));
        assert_eq!(pass.plan(), diffs);
        let stored = backend.get(DOCUMENT_KIND, "test", "default").unwrap();
        assert_eq!(stored.spec["command"], "old");
    }

    #[test]
    fn test_destroy_failure_keeps_instance() {
        let (client, backend) = client();
        seed(&backend, "test", json!({"type": "pipe", "command": "x"}));
        let cfg = HandlerConfig {
            ensure: Ensure::Absent,
            ..config("test")
        };
        let handler = cfg.validate().unwrap();
        let mut pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();
        backend.fail_on("handler delete", "Error: permission denied");

        let diffs = pass.plan();
        let err = pass.apply(&diffs[0]).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("delete"), "{message}");
        assert!(message.contains("permission denied"), "{message}");

        assert!(pass.exists(&handler.identity));
        assert_eq!(backend.count(KIND), 1);
        assert_eq!(pass.plan(), diffs);
    }

    #[test]
    fn test_unset_keeps_prior_and_absent_clears() {
        let (client, backend) = client();
        seed(
            &backend,
            "test",
            json!({"type": "pipe", "command": "old", "mutator": "m1", "timeout": 10}),
        );
        let cfg = HandlerConfig {
            command: Field::Set("new".to_string()),
            timeout: Field::Absent,
            ..config("test")
        };
        let handler = cfg.validate().unwrap();
        let mut pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();

        let diffs = pass.plan();
        assert_eq!(diffs.len(), 1);
        let Action::Update { changes } = &diffs[0].action else {
            panic!("expected update");
        };
        let attributes: Vec<_> = changes.iter().map(|c| c.attribute.as_str()).collect();
        assert_eq!(attributes, ["timeout", "command"]);

        assert_eq!(pass.apply(&diffs[0]).unwrap(), ApplyResult::Modified);
        let stored = backend.get(DOCUMENT_KIND, "test", "default").unwrap();
        assert_eq!(stored.spec["command"], "new");
        assert_eq!(stored.spec["mutator"], "m1");
        assert!(stored.spec.get("timeout").is_none());
        assert!(pass.plan().is_empty());
    }

    #[test]
    fn test_flush_is_idempotent() {
        let (client, backend) = client();
        seed(&backend, "test", json!({"type": "pipe", "command": "old"}));
        let handler = config("test").validate().unwrap();
        let mut pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();

        let first = pass.flush_document(&handler);
        assert_eq!(first, pass.flush_document(&handler));

        pass.flush(&handler).unwrap();
        pass.flush(&handler).unwrap();
        let sent: Vec<_> = backend
            .invocations()
            .into_iter()
            .filter_map(|i| i.stdin)
            .collect();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[test]
    fn test_destroy_issues_single_delete() {
        let (client, backend) = client();
        seed(&backend, "test", json!({"type": "pipe", "command": "x"}));
        let cfg = HandlerConfig {
            ensure: Ensure::Absent,
            ..config("test")
        };
        let handler = cfg.validate().unwrap();
        let mut pass = HandlerPass::prefetch(&client, vec![handler.clone()], false).unwrap();
        backend.clear_invocations();

        let diffs = pass.plan();
        assert!(diffs[0].is_removal());
        assert_eq!(pass.apply(&diffs[0]).unwrap(), ApplyResult::Removed);

        let calls = backend.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].args,
            ["handler", "delete", "test", "--skip-confirm", "--namespace", "default"]
        );
        assert!(!pass.exists(&handler.identity));
        assert!(pass.plan().is_empty());
    }

    #[test]
    fn test_purge_removes_undeclared() {
        let (client, backend) = client();
        seed(&backend, "keep", json!({"type": "pipe", "command": "test"}));
        seed(&backend, "stray", json!({"type": "pipe", "command": "x"}));
        let desired = vec![config("keep").validate().unwrap()];

        let pass = HandlerPass::prefetch(&client, desired.clone(), false).unwrap();
        assert!(pass.plan().is_empty());
        assert!(!pass.is_declared(&Identity::new("stray", "default")));

        let mut pass = HandlerPass::prefetch(&client, desired, true).unwrap();
        let diffs = pass.plan();
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].id, "stray in default");
        pass.apply(&diffs[0]).unwrap();
        assert_eq!(backend.count(KIND), 1);
    }
}
