//! Purpose: Room-level requests against the videoroom and audiobridge plugins.
//! Exports: `RoomPlugin`, `ParticipantsByPlugin`, `parse_rooms_list`, `plugin_data`,
//! `plugin_payload`, `plugin_error`, `room_id_value`.
//! Role: Turns plugin replies into maps keyed by room id in string form.
//! Invariants: Listed rooms never carry their `room` field in the attribute map.
//! Invariants: Participant results only hold non-empty lists; empty plugins are omitted.
//! Invariants: Only plugin-reported errors are skipped while listing participants.
#![allow(clippy::result_large_err)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::session::{HandleId, SessionClient, SessionId};
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::reconcile::{RoomMap, room_key};

/// Plugin kind -> room id -> participants.
pub type ParticipantsByPlugin = BTreeMap<String, BTreeMap<String, Vec<Value>>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RoomPlugin {
    VideoRoom,
    AudioBridge,
}

impl RoomPlugin {
    pub const ALL: [RoomPlugin; 2] = [RoomPlugin::VideoRoom, RoomPlugin::AudioBridge];

    pub fn kind(self) -> &'static str {
        match self {
            RoomPlugin::VideoRoom => "videoroom",
            RoomPlugin::AudioBridge => "audiobridge",
        }
    }

    /// Full plugin name as registered with the gateway.
    pub fn plugin_name(self, namespace: &str) -> String {
        format!("{namespace}.plugin.{}", self.kind())
    }
}

impl fmt::Display for RoomPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// `plugindata.data` of a message reply, whether or not it reports an error.
pub fn plugin_payload(response: &Value) -> ApiResult<&Map<String, Value>> {
    response
        .pointer("/plugindata/data")
        .and_then(Value::as_object)
        .ok_or_else(|| {
            Error::new(ErrorKind::Protocol).with_message("plugin reply has no plugindata.data")
        })
}

/// The plugin-level `error` carried in `data`, if any.
pub fn plugin_error(data: &Map<String, Value>) -> Option<Error> {
    let reason = data.get("error")?;
    let reason = reason.as_str().map(str::to_string).unwrap_or_else(|| reason.to_string());
    let message = match data.get("error_code").and_then(Value::as_i64) {
        Some(code) => format!("plugin error: {reason} (code {code})"),
        None => format!("plugin error: {reason}"),
    };
    Some(Error::new(ErrorKind::Protocol).with_message(message))
}

/// `plugindata.data` of a message reply; a plugin-level `error` becomes `Protocol`.
pub fn plugin_data(response: &Value) -> ApiResult<&Map<String, Value>> {
    let data = plugin_payload(response)?;
    match plugin_error(data) {
        Some(err) => Err(err),
        None => Ok(data),
    }
}

/// Re-key a `list` reply by room id.
pub fn parse_rooms_list(response: &Value) -> ApiResult<RoomMap> {
    let list = plugin_data(response)?
        .get("list")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Error::new(ErrorKind::Protocol).with_message("plugin reply has no room list")
        })?;
    let mut rooms = RoomMap::new();
    for entry in list {
        let mut attributes = entry.as_object().cloned().ok_or_else(|| {
            Error::new(ErrorKind::Protocol).with_message("room list entry is not an object")
        })?;
        let id = attributes
            .remove("room")
            .as_ref()
            .and_then(room_key)
            .ok_or_else(|| {
                Error::new(ErrorKind::Protocol).with_message("room list entry has no usable room id")
            })?;
        rooms.insert(id, attributes);
    }
    Ok(rooms)
}

/// Outbound room id: all-digit ids that fit in u64 go out as numbers.
pub fn room_id_value(id: &str) -> Value {
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(number) = id.parse::<u64>() {
            return json!(number);
        }
    }
    json!(id)
}

impl SessionClient {
    pub fn list_rooms(&self, session: SessionId, handle: HandleId) -> ApiResult<RoomMap> {
        let response = self.send_message(session, handle, &json!({"request": "list"}))?;
        let rooms = parse_rooms_list(&response)?;
        debug!(session = %session, handle = %handle, rooms = rooms.len(), "listed rooms");
        Ok(rooms)
    }

    /// Participants per plugin for `room_ids`, or for every known room when `None`.
    pub fn list_participants(
        &self,
        session: SessionId,
        room_ids: Option<&[String]>,
    ) -> ApiResult<ParticipantsByPlugin> {
        let namespace = self.config().plugin_namespace().to_string();
        let mut handles = Vec::with_capacity(RoomPlugin::ALL.len());
        for plugin in RoomPlugin::ALL {
            let handle = self.attach_plugin(session, &plugin.plugin_name(&namespace))?;
            handles.push((plugin, handle));
        }

        let universe: BTreeSet<String> = match room_ids {
            Some(ids) => ids.iter().cloned().collect(),
            None => {
                let mut ids = BTreeSet::new();
                for (_, handle) in &handles {
                    ids.extend(self.list_rooms(session, *handle)?.into_keys());
                }
                ids
            }
        };

        let mut result = ParticipantsByPlugin::new();
        for (plugin, handle) in &handles {
            let mut rooms = BTreeMap::new();
            for room in &universe {
                let body = json!({"request": "listparticipants", "room": room_id_value(room)});
                let response = self.send_message(session, *handle, &body)?;
                let data = plugin_payload(&response)?;
                let participants = match plugin_error(data) {
                    // Rooms from the other plugin are unknown here.
                    Some(err) => {
                        warn!(plugin = %plugin, room = %room, error = %err, "no participants listed");
                        Vec::new()
                    }
                    None => data
                        .get("participants")
                        .and_then(Value::as_array)
                        .cloned()
                        .unwrap_or_default(),
                };
                if !participants.is_empty() {
                    rooms.insert(room.clone(), participants);
                }
            }
            if !rooms.is_empty() {
                result.insert(plugin.kind().to_string(), rooms);
            }
        }
        Ok(result)
    }
}
