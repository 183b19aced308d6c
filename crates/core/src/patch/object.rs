#![forbid(unsafe_code)]

use super::PatchError;
use crate::model::Metadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shallow key-level delta between two metadata maps.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectPatch {
    #[serde(default)]
    pub new: Metadata,
    #[serde(default)]
    pub deleted: Vec<String>,
}

impl ObjectPatch {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.deleted.is_empty()
    }

    /// Transport form: `{"deleted":[...],"new":{...}}`.
    pub fn to_json(&self) -> String {
        let mut root = Metadata::new();
        root.insert("new".to_string(), Value::Object(self.new.clone()));
        root.insert(
            "deleted".to_string(),
            Value::Array(self.deleted.iter().cloned().map(Value::String).collect()),
        );
        Value::Object(root).to_string()
    }
}

pub fn create_object_patch(old: &Metadata, new: &Metadata) -> ObjectPatch {
    let mut patch = ObjectPatch::default();
    for (key, value) in new {
        if old.get(key) != Some(value) {
            patch.new.insert(key.clone(), value.clone());
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            patch.deleted.push(key.clone());
        }
    }
    patch
}

pub fn apply_object_patch(object: &Metadata, patch: &ObjectPatch) -> Metadata {
    let mut out = object.clone();
    for (key, value) in &patch.new {
        out.insert(key.clone(), value.clone());
    }
    for key in &patch.deleted {
        out.remove(key);
    }
    out
}

pub fn parse_object_patch(json: &str) -> Result<ObjectPatch, PatchError> {
    Ok(serde_json::from_str(json)?)
}

pub fn apply_object_patch_json(object: &Metadata, json: &str) -> Result<Metadata, PatchError> {
    let patch = parse_object_patch(json)?;
    Ok(apply_object_patch(object, &patch))
}
