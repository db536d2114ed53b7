//! Wire types exchanged with sensuctl.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// API version stamped on every generated document.
pub const CORE_API_VERSION: &str = "core/v2";

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity and labeling fields of a Sensu object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object name, unique within its namespace
    pub name: String,
    /// Namespace the object lives in
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Free-form key/value labels
    #[serde(
        default,
        deserialize_with = "empty_map_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub labels: Option<BTreeMap<String, String>>,
    /// Free-form key/value annotations
    #[serde(
        default,
        deserialize_with = "empty_map_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub annotations: Option<BTreeMap<String, String>>,
    /// Legacy environment scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Legacy organization scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn empty_map_as_none<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let map = Option::<BTreeMap<String, String>>::deserialize(deserializer)?;
    Ok(map.filter(|m| !m.is_empty()))
}

impl ObjectMeta {
    /// Create metadata with just a name and namespace.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: None,
            annotations: None,
            environment: None,
            organization: None,
        }
    }
}

/// A complete object document as accepted by `sensuctl create`.
///
/// The metadata/spec split mirrors the Sensu API: identity and labeling
/// live in `metadata`, behavioral fields in `spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDocument {
    /// Object kind, e.g. `Handler`
    #[serde(rename = "type")]
    pub kind: String,
    /// API group and version
    pub api_version: String,
    /// Identity and labels
    pub metadata: ObjectMeta,
    /// Kind-specific attributes
    pub spec: Map<String, Value>,
}

impl ObjectDocument {
    /// Build a `core/v2` document.
    pub fn new(kind: impl Into<String>, metadata: ObjectMeta, spec: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            api_version: CORE_API_VERSION.to_string(),
            metadata,
            spec,
        }
    }

    /// Flatten into the record shape returned by `sensuctl <kind> list`.
    pub fn to_record(&self) -> ListRecord {
        ListRecord {
            metadata: self.metadata.clone(),
            fields: self.spec.clone(),
        }
    }
}

/// One record of `sensuctl <kind> list --format json` output.
///
/// List output is flattened: `metadata` sits beside the spec fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRecord {
    /// Identity and labels
    pub metadata: ObjectMeta,
    /// Every other top-level key
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_shape() {
        let mut spec = Map::new();
        spec.insert("type".to_string(), json!("pipe"));
        spec.insert("command".to_string(), json!("notify.sh"));
        let doc = ObjectDocument::new("Handler", ObjectMeta::new("slack", "default"), spec);

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["type"], "Handler");
        assert_eq!(value["api_version"], "core/v2");
        assert_eq!(value["metadata"]["name"], "slack");
        assert_eq!(value["metadata"]["namespace"], "default");
        assert!(value["metadata"].get("labels").is_none());
        assert_eq!(value["spec"]["command"], "notify.sh");
    }

    #[test]
    fn test_list_record_flattened() {
        let raw = json!({
            "metadata": {"name": "slack", "namespace": "ops", "labels": {}, "annotations": null},
            "type": "pipe",
            "command": "notify.sh",
            "timeout": 0
        });
        let record: ListRecord = serde_json::from_value(raw).unwrap();

        assert_eq!(record.metadata.name, "slack");
        assert_eq!(record.metadata.namespace, "ops");
        assert_eq!(record.metadata.labels, None);
        assert_eq!(record.metadata.annotations, None);
        assert_eq!(record.fields["type"], "pipe");
        assert!(!record.fields.contains_key("metadata"));
    }

    #[test]
    fn test_missing_namespace_defaults() {
        let record: ListRecord =
            serde_json::from_value(json!({"metadata": {"name": "x"}})).unwrap();
        assert_eq!(record.metadata.namespace, "default");
    }
}
