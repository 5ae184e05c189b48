//! Purpose: Resolve caller-supplied gateway options into a validated configuration.
//! Exports: `GatewayOptions`, `GatewayConfig`, and the `DEFAULT_*` constants.
//! Role: Rebuilt on every operation; no configuration outlives a single call.
//! Invariants: A `GatewayConfig` always has an http(s) API root that parses as a URL.
//! Invariants: The request timeout is explicit and non-zero.
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::core::error::{ApiResult, Error, ErrorKind};

pub const DEFAULT_PROTO: &str = "http";
pub const DEFAULT_HOSTNAME: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_BASE: &str = "janus";
pub const DEFAULT_CFG_DIR: &str = "/etc/janus";
pub const DEFAULT_VIDEOROOM_CFG: &str = "janus.plugin.videoroom.cfg";
pub const DEFAULT_AUDIOBRIDGE_CFG: &str = "janus.plugin.audiobridge.cfg";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_PLUGIN_NAMESPACE: &str = "janus";

/// Optional overrides; every `None` falls back to the matching `DEFAULT_*`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayOptions {
    pub proto: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub base: Option<String>,
    pub videoroom_cfg: Option<PathBuf>,
    pub audiobridge_cfg: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub plugin_namespace: Option<String>,
}

impl GatewayOptions {
    /// Fields set in `overrides` replace the ones in `self`.
    pub fn merged_with(self, overrides: GatewayOptions) -> Self {
        Self {
            proto: overrides.proto.or(self.proto),
            hostname: overrides.hostname.or(self.hostname),
            port: overrides.port.or(self.port),
            base: overrides.base.or(self.base),
            videoroom_cfg: overrides.videoroom_cfg.or(self.videoroom_cfg),
            audiobridge_cfg: overrides.audiobridge_cfg.or(self.audiobridge_cfg),
            timeout_ms: overrides.timeout_ms.or(self.timeout_ms),
            plugin_namespace: overrides.plugin_namespace.or(self.plugin_namespace),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    api_root: Url,
    videoroom_cfg: PathBuf,
    audiobridge_cfg: PathBuf,
    timeout: Duration,
    plugin_namespace: String,
}

impl GatewayConfig {
    pub fn from_options(options: &GatewayOptions) -> ApiResult<Self> {
        let proto = options.proto.as_deref().unwrap_or(DEFAULT_PROTO);
        if proto != "http" && proto != "https" {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported gateway proto '{proto}'"))
                .with_hint("Use http or https."));
        }
        let hostname = options.hostname.as_deref().unwrap_or(DEFAULT_HOSTNAME);
        if hostname.trim().is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("gateway hostname is empty"));
        }
        let port = options.port.unwrap_or(DEFAULT_PORT);
        let base = options
            .base
            .as_deref()
            .unwrap_or(DEFAULT_BASE)
            .trim_matches('/');
        if base.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("gateway base path is empty"));
        }
        let timeout_ms = options.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("request timeout must be greater than zero"));
        }
        let plugin_namespace = options
            .plugin_namespace
            .as_deref()
            .unwrap_or(DEFAULT_PLUGIN_NAMESPACE);
        if plugin_namespace.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("plugin namespace is empty"));
        }

        let raw = format!("{proto}://{hostname}:{port}/{base}");
        let api_root = Url::parse(&raw).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid gateway api root '{raw}'"))
                .with_source(err)
        })?;

        let cfg_dir = Path::new(DEFAULT_CFG_DIR);
        Ok(Self {
            api_root,
            videoroom_cfg: options
                .videoroom_cfg
                .clone()
                .unwrap_or_else(|| cfg_dir.join(DEFAULT_VIDEOROOM_CFG)),
            audiobridge_cfg: options
                .audiobridge_cfg
                .clone()
                .unwrap_or_else(|| cfg_dir.join(DEFAULT_AUDIOBRIDGE_CFG)),
            timeout: Duration::from_millis(timeout_ms),
            plugin_namespace: plugin_namespace.to_string(),
        })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    pub fn videoroom_cfg(&self) -> &Path {
        &self.videoroom_cfg
    }

    pub fn audiobridge_cfg(&self) -> &Path {
        &self.audiobridge_cfg
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn plugin_namespace(&self) -> &str {
        &self.plugin_namespace
    }
}

#[cfg(test)]
mod tests {
    use super::{GatewayConfig, GatewayOptions};
    use crate::core::error::ErrorKind;
    use std::path::Path;
    use std::time::Duration;

    #[test]
    fn defaults_match_stock_gateway_install() {
        let config = GatewayConfig::from_options(&GatewayOptions::default()).expect("config");
        assert_eq!(config.api_root().as_str(), "http://localhost:8088/janus");
        assert_eq!(
            config.videoroom_cfg(),
            Path::new("/etc/janus/janus.plugin.videoroom.cfg")
        );
        assert_eq!(
            config.audiobridge_cfg(),
            Path::new("/etc/janus/janus.plugin.audiobridge.cfg")
        );
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.plugin_namespace(), "janus");
    }

    #[test]
    fn options_override_defaults() {
        let options: GatewayOptions = serde_json::from_str(
            r#"{"proto":"https","hostname":"gw.local","port":8089,"base":"/api/","timeout_ms":250}"#,
        )
        .expect("options");
        let config = GatewayConfig::from_options(&options).expect("config");
        assert_eq!(config.api_root().as_str(), "https://gw.local:8089/api");
        assert_eq!(config.timeout(), Duration::from_millis(250));
    }

    #[test]
    fn unknown_option_fields_are_rejected() {
        let parsed = serde_json::from_str::<GatewayOptions>(r#"{"janus_port":"8088"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_unsupported_proto_and_zero_timeout() {
        let options = GatewayOptions {
            proto: Some("ws".to_string()),
            ..GatewayOptions::default()
        };
        let err = GatewayConfig::from_options(&options).expect_err("proto");
        assert_eq!(err.kind(), ErrorKind::Usage);

        let options = GatewayOptions {
            timeout_ms: Some(0),
            ..GatewayOptions::default()
        };
        let err = GatewayConfig::from_options(&options).expect_err("timeout");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn merged_with_prefers_overrides() {
        let file = GatewayOptions {
            hostname: Some("from-file".to_string()),
            port: Some(9000),
            ..GatewayOptions::default()
        };
        let flags = GatewayOptions {
            port: Some(9100),
            ..GatewayOptions::default()
        };
        let merged = file.merged_with(flags);
        assert_eq!(merged.hostname.as_deref(), Some("from-file"));
        assert_eq!(merged.port, Some(9100));
    }
}
