//! Purpose: HTTP client for the gateway's session protocol (create, attach, message, info).
//! Exports: `SessionClient`, `SessionId`, `HandleId`.
//! Role: Stateless value built per operation from a `GatewayConfig`; no retries, no caching.
//! Invariants: Every request body carries a fresh transaction token.
//! Invariants: Transport failures map to `Transport`; gateway-reported failures to `Protocol`.
//! Invariants: Sessions are never torn down explicitly; the gateway expires them.
#![allow(clippy::result_large_err)]

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::core::config::GatewayConfig;
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::token::transaction_token;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct HandleId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
pub struct SessionClient {
    config: GatewayConfig,
    agent: ureq::Agent,
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    janus: &'static str,
    transaction: &'a str,
}

#[derive(Serialize)]
struct AttachRequest<'a> {
    janus: &'static str,
    plugin: &'a str,
    transaction: &'a str,
}

#[derive(Serialize)]
struct MessageRequest<'a> {
    janus: &'static str,
    body: &'a Value,
    transaction: &'a str,
}

#[derive(Deserialize)]
struct IdEnvelope {
    data: Option<IdData>,
    error: Option<GatewayError>,
}

#[derive(Deserialize)]
struct IdData {
    id: u64,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: GatewayError,
}

#[derive(Deserialize)]
struct GatewayError {
    code: Option<i64>,
    reason: Option<String>,
}

impl SessionClient {
    pub fn new(config: GatewayConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .build();
        Self { config, agent }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Create an ephemeral gateway session.
    pub fn create_instance(&self) -> ApiResult<SessionId> {
        let transaction = transaction_token()?;
        let payload = CreateRequest {
            janus: "create",
            transaction: &transaction,
        };
        let url = self.url(&[])?;
        let envelope: IdEnvelope = self.post_json(&url, &payload, &transaction)?;
        let id = id_from_envelope(envelope, "session create")?;
        debug!(session = id, "created gateway session");
        Ok(SessionId(id))
    }

    /// Attach `plugin` (full name, e.g. `janus.plugin.videoroom`) to `session`.
    pub fn attach_plugin(&self, session: SessionId, plugin: &str) -> ApiResult<HandleId> {
        let transaction = transaction_token()?;
        let payload = AttachRequest {
            janus: "attach",
            plugin,
            transaction: &transaction,
        };
        let url = self.url(&[&session.to_string()])?;
        let envelope: IdEnvelope = self.post_json(&url, &payload, &transaction)?;
        let id = id_from_envelope(envelope, "plugin attach")
            .map_err(|err| err.with_hint(format!("Is the {plugin} plugin enabled on the gateway?")))?;
        debug!(session = %session, handle = id, plugin, "attached plugin");
        Ok(HandleId(id))
    }

    /// Send `body` to an attached handle; returns the whole decoded reply.
    pub fn send_message(
        &self,
        session: SessionId,
        handle: HandleId,
        body: &Value,
    ) -> ApiResult<Value> {
        let transaction = transaction_token()?;
        let payload = MessageRequest {
            janus: "message",
            body,
            transaction: &transaction,
        };
        let url = self.url(&[&session.to_string(), &handle.to_string()])?;
        let response: Value = self.post_json(&url, &payload, &transaction)?;
        if response.get("janus").and_then(Value::as_str) == Some("error") {
            let reason = response
                .pointer("/error/reason")
                .and_then(Value::as_str)
                .unwrap_or("gateway reported an error");
            return Err(Error::new(ErrorKind::Protocol)
                .with_message(format!("plugin message failed: {reason}")));
        }
        Ok(response)
    }

    pub fn server_info(&self) -> ApiResult<Value> {
        let url = self.url(&["info"])?;
        debug!(url = %url, "GET");
        let response = self.agent.get(url.as_str()).set("Accept", "application/json").call();
        self.decode(response, &url)
    }

    fn url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.config.api_root().clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("gateway api root cannot be a base")
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn post_json<T, R>(&self, url: &Url, body: &T, transaction: &str) -> ApiResult<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_string(body).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode request json")
                .with_source(err)
        })?;
        debug!(url = %url, transaction, "POST");
        let response = self
            .agent
            .post(url.as_str())
            .set("Accept", "application/json")
            .set("Content-Type", "application/json")
            .send_string(&payload);
        self.decode(response, url)
    }

    fn decode<R>(&self, response: Result<ureq::Response, ureq::Error>, url: &Url) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp, url)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message(format!("request to {url} failed: {err}"))
                .with_hint("Check that the gateway is running and reachable.")
                .with_source(err)),
        }
    }
}

fn id_from_envelope(envelope: IdEnvelope, what: &str) -> ApiResult<u64> {
    if let Some(data) = envelope.data {
        return Ok(data.id);
    }
    Err(protocol_error(what, envelope.error.as_ref()))
}

fn protocol_error(what: &str, error: Option<&GatewayError>) -> Error {
    let reason = error
        .and_then(|e| e.reason.as_deref())
        .unwrap_or("response has no data");
    let message = match error.and_then(|e| e.code) {
        Some(code) => format!("{what} failed: {reason} (code {code})"),
        None => format!("{what} failed: {reason}"),
    };
    Error::new(ErrorKind::Protocol).with_message(message)
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Protocol)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response, url: &Url) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return protocol_error(&format!("request to {url}"), Some(&envelope.error));
    }
    Error::new(ErrorKind::Transport).with_message(format!("gateway returned status {status} for {url}"))
}

#[cfg(test)]
mod tests {
    use super::{IdEnvelope, SessionClient, id_from_envelope};
    use crate::core::config::{GatewayConfig, GatewayOptions};
    use crate::core::error::ErrorKind;

    fn envelope(raw: &str) -> IdEnvelope {
        serde_json::from_str(raw).expect("envelope")
    }

    #[test]
    fn create_reply_yields_data_id_unchanged() {
        let reply = envelope(
            r#"{"janus":"success","transaction":"00000000000000ab","data":{"id":8421157736281423}}"#,
        );
        assert_eq!(id_from_envelope(reply, "session create").expect("id"), 8421157736281423);
    }

    #[test]
    fn missing_data_is_protocol_error_with_reason() {
        let reply = envelope(
            r#"{"janus":"error","error":{"code":460,"reason":"No such plugin 'janus.plugin.nope'"}}"#,
        );
        let err = id_from_envelope(reply, "plugin attach").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(
            err.message(),
            Some("plugin attach failed: No such plugin 'janus.plugin.nope' (code 460)")
        );
    }

    #[test]
    fn missing_data_without_reason_is_still_protocol_error() {
        let err = id_from_envelope(envelope(r#"{"janus":"ack"}"#), "session create")
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(err.message(), Some("session create failed: response has no data"));
    }

    #[test]
    fn urls_extend_the_api_root() {
        let config = GatewayConfig::from_options(&GatewayOptions::default()).expect("config");
        let client = SessionClient::new(config);
        assert_eq!(client.url(&[]).expect("root").as_str(), "http://localhost:8088/janus");
        assert_eq!(
            client.url(&["12", "34"]).expect("handle").as_str(),
            "http://localhost:8088/janus/12/34"
        );
        assert_eq!(
            client.url(&["info"]).expect("info").as_str(),
            "http://localhost:8088/janus/info"
        );
    }
}
