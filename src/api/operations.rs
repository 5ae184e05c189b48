//! Purpose: Caller-facing gateway operations consumed by the CLI and other front ends.
//! Exports: `info`, `list_video_rooms`, `list_audio_rooms`, `list_participants`,
//! `create_audio_room`, `create_video_room`, `save_rooms_status`, `send_plugin_message`,
//! plus `AudioRoomRequest`, `VideoRoomRequest`, `SaveReport`, `SavedFile`.
//! Role: Each call builds a fresh config and client; nothing is shared across calls.
//! Invariants: Any failure is returned as `OperationFailed` naming the operation.
//! Invariants: No partial results; multi-step operations fail as a whole.
//! Invariants: Room creation persists the full room state of both plugins afterwards.
#![allow(clippy::result_large_err)]

use std::path::PathBuf;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::info as log_info;

use super::rooms::{ParticipantsByPlugin, RoomPlugin, plugin_data, room_id_value};
use super::session::SessionClient;
use crate::core::config::{GatewayConfig, GatewayOptions};
use crate::core::error::{ApiResult, operation_failed};
use crate::core::reconcile::{RoomMap, persist_rooms};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioRoomRequest {
    pub description: String,
    pub room: Option<String>,
    pub sampling: u32,
    pub permanent: bool,
    pub record: bool,
    pub secret: Option<String>,
    pub pin: Option<String>,
}

impl AudioRoomRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            room: None,
            sampling: 16_000,
            permanent: true,
            record: false,
            secret: None,
            pin: None,
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "request": "create",
            "description": self.description,
            "sampling": self.sampling,
            "permanent": self.permanent,
            "record": self.record,
        });
        add_common_fields(
            &mut body,
            self.room.as_deref(),
            self.secret.as_deref(),
            self.pin.as_deref(),
        );
        body
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoRoomRequest {
    pub description: String,
    pub room: Option<String>,
    pub publishers: u32,
    pub bitrate: u64,
    pub permanent: bool,
    pub secret: Option<String>,
    pub pin: Option<String>,
}

impl VideoRoomRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            room: None,
            publishers: 20,
            bitrate: 64,
            permanent: true,
            secret: None,
            pin: None,
        }
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "request": "create",
            "description": self.description,
            "bitrate": self.bitrate,
            "publishers": self.publishers,
            "permanent": self.permanent,
        });
        add_common_fields(
            &mut body,
            self.room.as_deref(),
            self.secret.as_deref(),
            self.pin.as_deref(),
        );
        body
    }
}

fn add_common_fields(
    body: &mut Value,
    room: Option<&str>,
    secret: Option<&str>,
    pin: Option<&str>,
) {
    let Some(object) = body.as_object_mut() else {
        return;
    };
    if let Some(room) = room {
        object.insert("room".to_string(), room_id_value(room));
    }
    if let Some(secret) = secret {
        object.insert("secret".to_string(), json!(secret));
    }
    if let Some(pin) = pin {
        object.insert("pin".to_string(), json!(pin));
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SavedFile {
    pub plugin: String,
    pub path: PathBuf,
    pub backup: PathBuf,
    pub rooms: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SaveReport {
    pub files: Vec<SavedFile>,
}

fn client_for(options: &GatewayOptions) -> ApiResult<SessionClient> {
    Ok(SessionClient::new(GatewayConfig::from_options(options)?))
}

fn list_plugin_rooms(client: &SessionClient, plugin: RoomPlugin) -> ApiResult<RoomMap> {
    let session = client.create_instance()?;
    let name = plugin.plugin_name(client.config().plugin_namespace());
    let handle = client.attach_plugin(session, &name)?;
    client.list_rooms(session, handle)
}

fn create_room(client: &SessionClient, plugin: RoomPlugin, body: &Value) -> ApiResult<Value> {
    let session = client.create_instance()?;
    let name = plugin.plugin_name(client.config().plugin_namespace());
    let handle = client.attach_plugin(session, &name)?;
    let response = client.send_message(session, handle, body)?;
    let data: Map<String, Value> = plugin_data(&response)?.clone();
    log_info!(plugin = %plugin, room = ?data.get("room"), "created room");
    save_all(client)?;
    Ok(Value::Object(data))
}

fn save_all(client: &SessionClient) -> ApiResult<SaveReport> {
    let config = client.config();
    let mut files = Vec::with_capacity(2);
    for (plugin, path) in [
        (RoomPlugin::AudioBridge, config.audiobridge_cfg()),
        (RoomPlugin::VideoRoom, config.videoroom_cfg()),
    ] {
        let rooms = list_plugin_rooms(client, plugin)?;
        let backup = persist_rooms(&rooms, path)?;
        files.push(SavedFile {
            plugin: plugin.kind().to_string(),
            path: path.to_path_buf(),
            backup,
            rooms: rooms.len(),
        });
    }
    Ok(SaveReport { files })
}

/// Gateway server information (`GET {root}/info`).
pub fn info(options: &GatewayOptions) -> ApiResult<Value> {
    client_for(options)
        .and_then(|client| client.server_info())
        .map_err(|err| operation_failed("getting gateway server information", err))
}

pub fn list_video_rooms(options: &GatewayOptions) -> ApiResult<RoomMap> {
    client_for(options)
        .and_then(|client| list_plugin_rooms(&client, RoomPlugin::VideoRoom))
        .map_err(|err| operation_failed("listing videorooms", err))
}

pub fn list_audio_rooms(options: &GatewayOptions) -> ApiResult<RoomMap> {
    client_for(options)
        .and_then(|client| list_plugin_rooms(&client, RoomPlugin::AudioBridge))
        .map_err(|err| operation_failed("listing audiorooms", err))
}

/// Participants of `room_ids` (or of every current room) across both room plugins.
pub fn list_participants(
    room_ids: Option<&[String]>,
    options: &GatewayOptions,
) -> ApiResult<ParticipantsByPlugin> {
    client_for(options)
        .and_then(|client| {
            let session = client.create_instance()?;
            client.list_participants(session, room_ids)
        })
        .map_err(|err| operation_failed("listing participants", err))
}

/// Create an audiobridge room, then persist both plugins' rooms.
pub fn create_audio_room(request: &AudioRoomRequest, options: &GatewayOptions) -> ApiResult<Value> {
    client_for(options)
        .and_then(|client| create_room(&client, RoomPlugin::AudioBridge, &request.body()))
        .map_err(|err| operation_failed("creating audioroom", err))
}

/// Create a videoroom, then persist both plugins' rooms.
pub fn create_video_room(request: &VideoRoomRequest, options: &GatewayOptions) -> ApiResult<Value> {
    client_for(options)
        .and_then(|client| create_room(&client, RoomPlugin::VideoRoom, &request.body()))
        .map_err(|err| operation_failed("creating videoroom", err))
}

/// Write current audio rooms and video rooms into their plugin config files.
pub fn save_rooms_status(options: &GatewayOptions) -> ApiResult<SaveReport> {
    client_for(options)
        .and_then(|client| save_all(&client))
        .map_err(|err| operation_failed("saving room status", err))
}

/// Send an arbitrary message to `plugin` (full plugin name) and return the raw reply.
pub fn send_plugin_message(
    plugin: &str,
    message: &Value,
    options: &GatewayOptions,
) -> ApiResult<Value> {
    client_for(options)
        .and_then(|client| {
            let session = client.create_instance()?;
            let handle = client.attach_plugin(session, plugin)?;
            client.send_message(session, handle, message)
        })
        .map_err(|err| operation_failed("sending message to plugin", err))
}
