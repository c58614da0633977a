//! JSON encoding of `PipelineState` with a schema version tag.
//!
//! Version 0 is the untagged layout, which allowed `null` for empty
//! collections and empty strings for unset optional text. Loading a v0 blob
//! normalises those before deserializing.

use serde_json::{Map, Value};

use crate::errors::StoreError;
use crate::state::PipelineState;

pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_KEY: &str = "schema_version";

const LIST_FIELDS: &[&str] = &["characters", "episodes", "storyboard", "messages"];
const MAP_FIELDS: &[&str] = &["video_prompts", "video_tasks"];
const OPTIONAL_TEXT_FIELDS: &[&str] = &["error", "approval_type"];

pub fn encode_state(state: &PipelineState) -> Result<String, StoreError> {
    let mut value = serde_json::to_value(state)?;
    if let Value::Object(map) = &mut value {
        map.insert(SCHEMA_KEY.to_string(), Value::from(CURRENT_SCHEMA_VERSION));
    }
    Ok(serde_json::to_string(&value)?)
}

pub fn decode_state(raw: &str) -> Result<PipelineState, StoreError> {
    let mut value: Value = serde_json::from_str(raw)?;
    if let Value::Object(map) = &mut value {
        let version = schema_version(map)?;
        if version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::UnsupportedSchema {
                found: version,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        if version == 0 {
            migrate_v0(map);
        }
        map.remove(SCHEMA_KEY);
    }
    Ok(serde_json::from_value(value)?)
}

fn schema_version(map: &Map<String, Value>) -> Result<u32, StoreError> {
    match map.get(SCHEMA_KEY) {
        None | Some(Value::Null) => Ok(0),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| StoreError::InvalidColumn {
                column: SCHEMA_KEY.to_string(),
                message: format!("expected an unsigned integer, got {}", v),
            }),
    }
}

fn migrate_v0(map: &mut Map<String, Value>) {
    for field in LIST_FIELDS {
        if matches!(map.get(*field), Some(Value::Null)) {
            map.insert(field.to_string(), Value::Array(Vec::new()));
        }
    }
    for field in MAP_FIELDS {
        if matches!(map.get(*field), Some(Value::Null)) {
            map.insert(field.to_string(), Value::Object(Map::new()));
        }
    }
    for field in OPTIONAL_TEXT_FIELDS {
        if matches!(map.get(*field), Some(Value::String(s)) if s.is_empty()) {
            map.insert(field.to_string(), Value::Null);
        }
    }
    if matches!(map.get("approval_data"), Some(Value::Object(m)) if m.is_empty()) {
        map.insert("approval_data".to_string(), Value::Null);
    }
}
