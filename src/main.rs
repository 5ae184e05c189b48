//! Purpose: `roomsync` CLI entry point.
//! Role: Binary crate root; parses args, runs one gateway operation, emits JSON on stdout.
//! Invariants: Results are JSON on stdout; logs and errors go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code` of the root cause.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use roomsync::api::{Error, ErrorKind, GatewayOptions, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.root_kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `roomsync --help` for usage."));
            }
        },
    };

    let options = cli.gateway.resolve()?;
    command_dispatch::dispatch_command(cli.command, options)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "roomsync",
    version,
    about = "Manage WebRTC gateway rooms and persist them to plugin config files",
    long_about = None,
    after_help = r#"EXAMPLES
  $ roomsync video-rooms
  $ roomsync --hostname gw.internal participants --room 1234
  $ roomsync create-video-room "town hall" --publishers 50 --bitrate 128000
  $ roomsync save-rooms
  $ roomsync message janus.plugin.videoroom '{"request":"list"}'

NOTES
  - Plugin config files are only updated, never created; a timestamped backup
    is written next to each file before it changes.
  - Set RUST_LOG=debug to trace gateway requests on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    gateway: GatewayArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct GatewayArgs {
    #[arg(
        long,
        global = true,
        help = "JSON file with gateway options (flags override it)",
        value_hint = ValueHint::FilePath
    )]
    options: Option<PathBuf>,
    #[arg(long, global = true, help = "Gateway API scheme: http|https (default: http)")]
    proto: Option<String>,
    #[arg(long, global = true, help = "Gateway hostname (default: localhost)")]
    hostname: Option<String>,
    #[arg(long, global = true, help = "Gateway HTTP port (default: 8088)")]
    port: Option<u16>,
    #[arg(long, global = true, help = "Gateway API base path (default: janus)")]
    base: Option<String>,
    #[arg(
        long = "videoroom-cfg",
        global = true,
        help = "Videoroom plugin config file",
        value_hint = ValueHint::FilePath
    )]
    videoroom_cfg: Option<PathBuf>,
    #[arg(
        long = "audiobridge-cfg",
        global = true,
        help = "Audiobridge plugin config file",
        value_hint = ValueHint::FilePath
    )]
    audiobridge_cfg: Option<PathBuf>,
    #[arg(long = "timeout-ms", global = true, help = "Per-request timeout in milliseconds")]
    timeout_ms: Option<u64>,
    #[arg(
        long = "plugin-namespace",
        global = true,
        help = "Plugin name prefix (default: janus)"
    )]
    plugin_namespace: Option<String>,
}

impl GatewayArgs {
    fn resolve(self) -> Result<GatewayOptions, Error> {
        let from_file = match &self.options {
            Some(path) => read_options_file(path)?,
            None => GatewayOptions::default(),
        };
        Ok(from_file.merged_with(GatewayOptions {
            proto: self.proto,
            hostname: self.hostname,
            port: self.port,
            base: self.base,
            videoroom_cfg: self.videoroom_cfg,
            audiobridge_cfg: self.audiobridge_cfg,
            timeout_ms: self.timeout_ms,
            plugin_namespace: self.plugin_namespace,
        }))
    }
}

fn read_options_file(path: &std::path::Path) -> Result<GatewayOptions, Error> {
    let raw = std::fs::read_to_string(path).map_err(|err| {
        let kind = if err.kind() == io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message("failed to read options file")
            .with_path(path)
            .with_source(err)
    })?;
    serde_json::from_str(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid options file: {err}"))
            .with_path(path)
            .with_hint("Expected a JSON object such as {\"hostname\":\"gw\",\"port\":8088}.")
    })
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Show gateway server information")]
    Info,
    #[command(about = "List videorooms on the gateway")]
    VideoRooms,
    #[command(about = "List audiobridge rooms on the gateway")]
    AudioRooms,
    #[command(
        about = "List participants of rooms",
        long_about = r#"List participants of rooms across the videoroom and audiobridge plugins.

Without --room, every room currently known to either plugin is queried.
Only rooms with at least one participant are reported."#
    )]
    Participants {
        #[arg(long = "room", help = "Room id to query (repeatable)")]
        rooms: Vec<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Create an audiobridge room and persist room state"
    )]
    CreateAudioRoom {
        #[arg(help = "Room description")]
        description: String,
        #[arg(long, help = "Room id (default: chosen by the gateway)")]
        room: Option<String>,
        #[arg(long, default_value_t = 16_000, help = "Sampling rate in Hz")]
        sampling: u32,
        #[arg(long = "no-permanent", help = "Do not ask the plugin to persist the room")]
        no_permanent: bool,
        #[arg(long, help = "Record the room mix")]
        record: bool,
        #[arg(long, help = "Secret required to edit/destroy the room")]
        secret: Option<String>,
        #[arg(long, help = "PIN required to join the room")]
        pin: Option<String>,
    },
    #[command(
        arg_required_else_help = true,
        about = "Create a videoroom and persist room state"
    )]
    CreateVideoRoom {
        #[arg(help = "Room description")]
        description: String,
        #[arg(long, help = "Room id (default: chosen by the gateway)")]
        room: Option<String>,
        #[arg(long, default_value_t = 20, help = "Maximum concurrent publishers")]
        publishers: u32,
        #[arg(long, default_value_t = 64, help = "Publisher bitrate cap")]
        bitrate: u64,
        #[arg(long = "no-permanent", help = "Do not ask the plugin to persist the room")]
        no_permanent: bool,
        #[arg(long, help = "Secret required to edit/destroy the room")]
        secret: Option<String>,
        #[arg(long, help = "PIN required to join the room")]
        pin: Option<String>,
    },
    #[command(about = "Write current gateway rooms into the plugin config files")]
    SaveRooms,
    #[command(
        arg_required_else_help = true,
        about = "Send a raw JSON message to a plugin"
    )]
    Message {
        #[arg(help = "Full plugin name, e.g. janus.plugin.videoroom")]
        plugin: String,
        #[arg(help = "JSON message body")]
        message: String,
    },
    #[command(arg_required_else_help = true, about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.root_kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = error_path(err) {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = error_path(err) {
        lines.push(format!("path: {}", path.display()));
    }
    lines.join("\n")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Transport => "gateway request failed".to_string(),
        ErrorKind::Protocol => "unexpected gateway reply".to_string(),
        ErrorKind::Corrupt => "malformed config file".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::OperationFailed => "operation failed".to_string(),
    }
}

/// First path recorded along the error chain.
fn error_path(err: &Error) -> Option<&std::path::Path> {
    let mut cur: Option<&Error> = Some(err);
    while let Some(e) = cur {
        if let Some(path) = e.path() {
            return Some(path);
        }
        cur = e.source().and_then(|s| s.downcast_ref::<Error>());
    }
    None
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.trim_start_matches("error: ").to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}
