//! Purpose: Hold top-level CLI command dispatch for `roomsync`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Every gateway command maps to exactly one `api` operation.

use super::*;

use roomsync::api::{
    AudioRoomRequest, VideoRoomRequest, create_audio_room, create_video_room, info,
    list_audio_rooms, list_participants, list_video_rooms, save_rooms_status,
    send_plugin_message,
};

pub(super) fn dispatch_command(
    command: Command,
    options: GatewayOptions,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "roomsync", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Info => {
            emit_json(info(&options)?);
            Ok(RunOutcome::ok())
        }
        Command::VideoRooms => {
            emit_json(json!({ "videorooms": list_video_rooms(&options)? }));
            Ok(RunOutcome::ok())
        }
        Command::AudioRooms => {
            emit_json(json!({ "audiorooms": list_audio_rooms(&options)? }));
            Ok(RunOutcome::ok())
        }
        Command::Participants { rooms } => {
            let room_ids = if rooms.is_empty() {
                None
            } else {
                Some(rooms.as_slice())
            };
            emit_json(json!({ "participants": list_participants(room_ids, &options)? }));
            Ok(RunOutcome::ok())
        }
        Command::CreateAudioRoom {
            description,
            room,
            sampling,
            no_permanent,
            record,
            secret,
            pin,
        } => {
            let request = AudioRoomRequest {
                description,
                room,
                sampling,
                permanent: !no_permanent,
                record,
                secret,
                pin,
            };
            emit_json(json!({ "created": create_audio_room(&request, &options)? }));
            Ok(RunOutcome::ok())
        }
        Command::CreateVideoRoom {
            description,
            room,
            publishers,
            bitrate,
            no_permanent,
            secret,
            pin,
        } => {
            let request = VideoRoomRequest {
                description,
                room,
                publishers,
                bitrate,
                permanent: !no_permanent,
                secret,
                pin,
            };
            emit_json(json!({ "created": create_video_room(&request, &options)? }));
            Ok(RunOutcome::ok())
        }
        Command::SaveRooms => {
            let report = save_rooms_status(&options)?;
            emit_json(json!({ "saved": report.files }));
            Ok(RunOutcome::ok())
        }
        Command::Message { plugin, message } => {
            let message: Value = serde_json::from_str(&message).map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message(format!("invalid message json: {err}"))
                    .with_hint("Pass a JSON object, e.g. '{\"request\":\"list\"}'.")
            })?;
            emit_json(send_plugin_message(&plugin, &message, &options)?);
            Ok(RunOutcome::ok())
        }
    }
}
