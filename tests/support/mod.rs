//! Purpose: In-process mock of the gateway's HTTP session protocol for integration tests.
//! Exports: `MockGateway`, `GatewayState`, `TestResult`, id constants, `closed_port`.
//! Role: Serves create/attach/message/info over loopback and records every request body.
//! Invariants: One fixed session id; handle ids identify the attached plugin.
//! Invariants: `create` with an existing room id is refused like the real plugins do.
//! Invariants: The runtime (and server) shut down when `MockGateway` is dropped.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::{Path as UrlPath, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use roomsync::api::GatewayOptions;
use serde_json::{Value, json};

pub type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

pub const SESSION_ID: u64 = 8_421_157_736_281_423;
pub const VIDEOROOM_HANDLE: u64 = 101;
pub const AUDIOBRIDGE_HANDLE: u64 = 202;
pub const VIDEOROOM_CFG: &str = "janus.plugin.videoroom.cfg";
pub const AUDIOBRIDGE_CFG: &str = "janus.plugin.audiobridge.cfg";

#[derive(Default)]
pub struct GatewayState {
    pub video_rooms: Vec<Value>,
    pub audio_rooms: Vec<Value>,
    /// (plugin kind, room id) -> participants.
    pub participants: BTreeMap<(String, String), Vec<Value>>,
    pub requests: Vec<Value>,
    pub next_room: u64,
    /// Answer plugin messages with a bare `ack` that carries no plugin data.
    pub ack_messages: bool,
}

type Shared = Arc<Mutex<GatewayState>>;

pub struct MockGateway {
    port: u16,
    state: Shared,
    _runtime: tokio::runtime::Runtime,
}

impl MockGateway {
    pub fn start(state: GatewayState) -> TestResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;
        let listener = TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        let state = Arc::new(Mutex::new(state));
        let app = Router::new()
            .route("/janus", post(create_session))
            .route("/janus/info", get(server_info))
            .route("/janus/:session", post(attach))
            .route("/janus/:session/:handle", post(message))
            .with_state(state.clone());

        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(listener)?
        };
        runtime.spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            port,
            state,
            _runtime: runtime,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn options(&self, cfg_dir: &Path) -> GatewayOptions {
        GatewayOptions {
            hostname: Some("127.0.0.1".to_string()),
            port: Some(self.port),
            videoroom_cfg: Some(cfg_dir.join(VIDEOROOM_CFG)),
            audiobridge_cfg: Some(cfg_dir.join(AUDIOBRIDGE_CFG)),
            timeout_ms: Some(5_000),
            ..GatewayOptions::default()
        }
    }

    pub fn requests(&self) -> Vec<Value> {
        lock(&self.state).requests.clone()
    }

    pub fn video_rooms(&self) -> Vec<Value> {
        lock(&self.state).video_rooms.clone()
    }
}

/// A loopback port with nothing listening on it.
pub fn closed_port() -> TestResult<u16> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

fn lock(state: &Shared) -> std::sync::MutexGuard<'_, GatewayState> {
    state.lock().unwrap_or_else(|poison| poison.into_inner())
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn gateway_error(transaction: &Value, code: u64, reason: &str) -> Json<Value> {
    Json(json!({
        "janus": "error",
        "transaction": transaction,
        "error": {"code": code, "reason": reason}
    }))
}

async fn server_info() -> Json<Value> {
    Json(json!({
        "janus": "server_info",
        "name": "Janus WebRTC Server",
        "version": 1200,
        "plugins": {
            "janus.plugin.videoroom": {"name": "JANUS VideoRoom plugin"},
            "janus.plugin.audiobridge": {"name": "JANUS AudioBridge plugin"}
        }
    }))
}

async fn create_session(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    lock(&state).requests.push(body.clone());
    Json(json!({
        "janus": "success",
        "transaction": body["transaction"],
        "data": {"id": SESSION_ID}
    }))
}

async fn attach(
    State(state): State<Shared>,
    UrlPath(session): UrlPath<u64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    lock(&state).requests.push(body.clone());
    if session != SESSION_ID {
        return gateway_error(&body["transaction"], 458, "No such session");
    }
    let handle = match body["plugin"].as_str() {
        Some("janus.plugin.videoroom") => VIDEOROOM_HANDLE,
        Some("janus.plugin.audiobridge") => AUDIOBRIDGE_HANDLE,
        Some(other) => {
            let reason = format!("No such plugin '{other}'");
            return gateway_error(&body["transaction"], 460, &reason);
        }
        None => return gateway_error(&body["transaction"], 456, "Missing plugin"),
    };
    Json(json!({
        "janus": "success",
        "session_id": SESSION_ID,
        "transaction": body["transaction"],
        "data": {"id": handle}
    }))
}

async fn message(
    State(state): State<Shared>,
    UrlPath((session, handle)): UrlPath<(u64, u64)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut state = lock(&state);
    state.requests.push(body.clone());
    if session != SESSION_ID {
        return gateway_error(&body["transaction"], 458, "No such session");
    }
    let (plugin, kind) = match handle {
        VIDEOROOM_HANDLE => ("janus.plugin.videoroom", "videoroom"),
        AUDIOBRIDGE_HANDLE => ("janus.plugin.audiobridge", "audiobridge"),
        _ => return gateway_error(&body["transaction"], 459, "No such handle"),
    };
    if state.ack_messages {
        return Json(json!({
            "janus": "ack",
            "session_id": SESSION_ID,
            "transaction": body["transaction"]
        }));
    }
    let request = &body["body"];
    let data = match request["request"].as_str() {
        Some("list") => {
            let rooms = if kind == "videoroom" {
                &state.video_rooms
            } else {
                &state.audio_rooms
            };
            json!({kind: "success", "list": rooms})
        }
        Some("listparticipants") => {
            let room = id_string(&request["room"]).unwrap_or_default();
            let rooms = if kind == "videoroom" {
                &state.video_rooms
            } else {
                &state.audio_rooms
            };
            let exists = rooms
                .iter()
                .any(|entry| id_string(&entry["room"]).as_deref() == Some(room.as_str()));
            if exists {
                let participants = state
                    .participants
                    .get(&(kind.to_string(), room.clone()))
                    .cloned()
                    .unwrap_or_default();
                json!({kind: "participants", "room": request["room"], "participants": participants})
            } else {
                json!({kind: "event", "error_code": 426, "error": format!("No such room ({room})")})
            }
        }
        Some("create") => {
            let rooms = if kind == "videoroom" {
                &state.video_rooms
            } else {
                &state.audio_rooms
            };
            let requested = request.get("room").and_then(id_string);
            let taken = requested.as_deref().is_some_and(|room| {
                rooms
                    .iter()
                    .any(|entry| id_string(&entry["room"]).as_deref() == Some(room))
            });
            if taken {
                let room = requested.unwrap_or_default();
                return Json(json!({
                    "janus": "success",
                    "session_id": SESSION_ID,
                    "sender": handle,
                    "transaction": body["transaction"],
                    "plugindata": {
                        "plugin": plugin,
                        "data": {kind: "event", "error_code": 427, "error": format!("Room {room} already exists")}
                    }
                }));
            }
            state.next_room += 1;
            let id = request
                .get("room")
                .cloned()
                .unwrap_or_else(|| json!(state.next_room));
            let record = if kind == "videoroom" {
                json!({
                    "room": id,
                    "description": request["description"],
                    "max_publishers": request["publishers"],
                    "bitrate": request["bitrate"],
                    "num_participants": 0
                })
            } else {
                json!({
                    "room": id,
                    "description": request["description"],
                    "sampling_rate": request["sampling"],
                    "record": request["record"],
                    "num_participants": 0
                })
            };
            if kind == "videoroom" {
                state.video_rooms.push(record);
            } else {
                state.audio_rooms.push(record);
            }
            json!({kind: "created", "room": id, "permanent": request["permanent"]})
        }
        _ => json!({kind: "event", "error_code": 422, "error": "Invalid request"}),
    };
    Json(json!({
        "janus": "success",
        "session_id": SESSION_ID,
        "sender": handle,
        "transaction": body["transaction"],
        "plugindata": {"plugin": plugin, "data": data}
    }))
}
