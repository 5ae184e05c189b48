//! Purpose: Define the public Rust API boundary for roomsync.
//! Exports: Session client, room directory helpers, and caller-facing operations.
//! Role: Surface used by the `roomsync` binary and by embedding callers.
//! Invariants: Operations take explicit `GatewayOptions`; no module-level client state.

mod operations;
mod rooms;
mod session;

pub use crate::core::config::{GatewayConfig, GatewayOptions};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{ApiResult, Error, ErrorKind};
pub use crate::core::reconcile::{RoomAttributes, RoomMap, persist_rooms};
pub use crate::core::store::{ConfigDocument, SectionUpdates};
pub use operations::{
    AudioRoomRequest, SaveReport, SavedFile, VideoRoomRequest, create_audio_room,
    create_video_room, info, list_audio_rooms, list_participants, list_video_rooms,
    save_rooms_status, send_plugin_message,
};
pub use rooms::{
    ParticipantsByPlugin, RoomPlugin, parse_rooms_list, plugin_data, plugin_error, plugin_payload,
    room_id_value,
};
pub use session::{HandleId, SessionClient, SessionId};
