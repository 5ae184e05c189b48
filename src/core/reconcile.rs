//! Purpose: Merge live gateway room state into a plugin's persisted room config file.
//! Exports: `RoomMap`, `RoomAttributes`, `room_key`, `persisted_room`, `persist_rooms`.
//! Role: Synchronization point between ephemeral gateway state and durable config.
//! Invariants: Persisted room ids are strings; `num_participants` is never persisted.
//! Invariants: Wire `max_publishers` is persisted as `publishers`.
//! Invariants: Re-running with unchanged rooms leaves the file content unchanged.
//! Invariants: Line breaks in values become spaces; unwritable ids or keys fail as `Protocol`.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::debug;

use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::store::{self, SectionUpdates, key_problem, section_name_problem};

pub type RoomAttributes = Map<String, Value>;
/// Rooms keyed by their id in string form.
pub type RoomMap = BTreeMap<String, RoomAttributes>;

const WIRE_PUBLISHERS: &str = "max_publishers";
const PERSISTED_PUBLISHERS: &str = "publishers";
const TRANSIENT_FIELDS: &[&str] = &["num_participants"];

/// String form of a room id; gateways report numeric or string ids.
pub fn room_key(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Attributes as they should be written to the config file.
pub fn persisted_room(attributes: &RoomAttributes) -> RoomAttributes {
    let mut out = attributes.clone();
    for field in TRANSIENT_FIELDS {
        out.remove(*field);
    }
    if let Some(publishers) = out.remove(WIRE_PUBLISHERS) {
        out.insert(PERSISTED_PUBLISHERS.to_string(), publishers);
    }
    out
}

fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.replace(['\r', '\n'], " ")),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn room_updates(rooms: &RoomMap) -> ApiResult<SectionUpdates> {
    let mut updates = SectionUpdates::new();
    for (id, attributes) in rooms {
        if let Some(problem) = section_name_problem(id) {
            return Err(Error::new(ErrorKind::Protocol)
                .with_message(format!("room id {id:?} cannot be persisted: {problem}")));
        }
        let mut entries = BTreeMap::new();
        for (key, value) in persisted_room(attributes) {
            if let Some(problem) = key_problem(&key) {
                return Err(Error::new(ErrorKind::Protocol).with_message(format!(
                    "room {id:?} attribute {key:?} cannot be persisted: {problem}"
                )));
            }
            if let Some(text) = render_value(&value) {
                entries.insert(key, text);
            }
        }
        updates.insert(id.clone(), entries);
    }
    Ok(updates)
}

/// Persist `rooms` into the config file at `path`; returns the backup path.
pub fn persist_rooms(rooms: &RoomMap, path: &Path) -> ApiResult<PathBuf> {
    debug!(path = %path.display(), rooms = rooms.len(), "persisting rooms");
    let updates = room_updates(rooms).map_err(|err| err.with_path(path))?;
    store::save(&updates, path)
}
