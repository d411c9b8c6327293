use anyhow::{Context, Result, bail};
use chatgpt_client::{ClientOptions, Credentials};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / TOML / env vars)
// =============================================================================
//
// Equivalent ways to set the session token:
//
//   chat-relay.toml:  [upstream]
//                     session_token = "..."
//
//   env var:          CHAT_RELAY_UPSTREAM__SESSION_TOKEN=...  (double underscore = nesting)
//
//   legacy env var:   OPENAI_SESSION_TOKEN=...

pub const DEFAULT_CONFIG_FILE: &str = "chat-relay.toml";

/// Env vars understood for compatibility with existing deployments.
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("OPENAI_CLEARANCE_TOKEN", "upstream.clearance_token"),
    ("OPENAI_SESSION_TOKEN", "upstream.session_token"),
    ("SERVER_PORT", "server.port"),
];

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub upstream: UpstreamFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_send_channel_capacity")]
    pub send_channel_capacity: usize,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            send_channel_capacity: default_send_channel_capacity(),
        }
    }
}

/// Upstream credentials and tuning (lives under `[upstream]`).
#[derive(Clone, Serialize, Deserialize)]
pub struct UpstreamFileConfig {
    #[serde(default)]
    pub clearance_token: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the built-in browser user agent
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Bound on each upstream call; 0 disables
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamFileConfig {
    fn default() -> Self {
        Self {
            clearance_token: None,
            session_token: None,
            base_url: default_base_url(),
            model: default_model(),
            user_agent: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for UpstreamFileConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("UpstreamFileConfig")
            .field("clearance_token", &redact(&self.clearance_token))
            .field("session_token", &redact(&self.session_token))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_send_channel_capacity() -> usize {
    32
}
fn default_base_url() -> String {
    chatgpt_client::DEFAULT_BASE_URL.to_string()
}
fn default_model() -> String {
    chatgpt_client::DEFAULT_MODEL.to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

/// Build a figment that layers: defaults → TOML file → CHAT_RELAY_* env vars → legacy env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CHAT_RELAY_SERVER__PORT=9000`  →  `server.port = 9000`
///
/// A missing TOML file contributes nothing.
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed("CHAT_RELAY_").split("__"))
        .merge(legacy_env())
}

fn legacy_env() -> figment::providers::Env {
    figment::providers::Env::raw().filter_map(|key| {
        LEGACY_ENV_KEYS
            .iter()
            .find(|(name, _)| key.as_str().eq_ignore_ascii_case(name))
            .map(|(_, path)| (*path).into())
    })
}

// =============================================================================
// Runtime config (validated view of FileConfig)
// =============================================================================

/// Listener configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Outbound frames queued per connection before the router waits
    pub send_channel_capacity: usize,
}

impl ServerConfig {
    /// `host` may be an IP literal or a name such as `localhost`.
    pub fn from_file(fc: &ServerFileConfig) -> Result<Self> {
        let bind_addr = resolve_listen_addr(&fc.host, fc.port)?;
        Ok(Self {
            bind_addr,
            send_channel_capacity: fc.send_channel_capacity.max(1),
        })
    }
}

fn resolve_listen_addr(host: &str, port: u16) -> Result<SocketAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?
        .next()
        .with_context(|| format!("Listen host {} resolved to no addresses", host))
}

/// Upstream configuration (runtime view).
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    pub credentials: Credentials,
    pub options: ClientOptions,
    /// Relay-side bound on open/send calls (None = unbounded)
    pub call_timeout: Option<Duration>,
}

impl UpstreamConfig {
    pub fn from_file(fc: &UpstreamFileConfig) -> Result<Self> {
        let clearance_token = required_token(
            &fc.clearance_token,
            "clearance token",
            "OPENAI_CLEARANCE_TOKEN or CHAT_RELAY_UPSTREAM__CLEARANCE_TOKEN",
        )?;
        let session_token = required_token(
            &fc.session_token,
            "session token",
            "OPENAI_SESSION_TOKEN or CHAT_RELAY_UPSTREAM__SESSION_TOKEN",
        )?;

        let mut credentials = Credentials::new(clearance_token, session_token);
        if let Some(ua) = fc.user_agent.as_ref().filter(|s| !s.is_empty()) {
            credentials = credentials.with_user_agent(ua.clone());
        }

        let call_timeout = if fc.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(fc.timeout_secs))
        };

        Ok(Self {
            credentials,
            options: ClientOptions {
                base_url: fc.base_url.trim_end_matches('/').to_string(),
                model: fc.model.clone(),
                request_timeout: call_timeout,
            },
            call_timeout,
        })
    }
}

fn required_token(value: &Option<String>, what: &str, hint: &str) -> Result<String> {
    match value.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => bail!("Missing upstream {} (set {})", what, hint),
    }
}

/// Everything the relay needs at startup.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

impl RelayConfig {
    pub fn from_figment(figment: &figment::Figment) -> Result<Self> {
        let fc: FileConfig = figment
            .extract()
            .context("Failed to read relay configuration")?;
        Self::from_file(&fc)
    }

    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        Ok(Self {
            server: ServerConfig::from_file(&fc.server)?,
            upstream: UpstreamConfig::from_file(&fc.upstream)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    fn with_tokens() -> FileConfig {
        FileConfig {
            upstream: UpstreamFileConfig {
                clearance_token: Some("clear".into()),
                session_token: Some("sess".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_server_file_config_defaults() {
        let d = ServerFileConfig::default();
        assert_eq!(d.host, "0.0.0.0");
        assert_eq!(d.port, 8080);
        assert_eq!(d.send_channel_capacity, 32);
    }

    #[test]
    fn test_upstream_file_config_defaults() {
        let d = UpstreamFileConfig::default();
        assert!(d.clearance_token.is_none());
        assert!(d.session_token.is_none());
        assert_eq!(d.base_url, "https://chat.openai.com");
        assert_eq!(d.model, "text-davinci-002-render");
        assert_eq!(d.timeout_secs, 120);
    }

    // ── RelayConfig::from_file ──────────────────────────────────────────

    #[test]
    fn test_from_file_with_tokens() {
        let rc = RelayConfig::from_file(&with_tokens()).unwrap();
        assert_eq!(rc.server.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(rc.upstream.credentials.clearance_token, "clear");
        assert_eq!(rc.upstream.credentials.session_token, "sess");
        assert_eq!(rc.upstream.call_timeout, Some(Duration::from_secs(120)));
        assert_eq!(rc.upstream.options.request_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_missing_session_token_is_fatal() {
        let mut fc = with_tokens();
        fc.upstream.session_token = None;
        let err = RelayConfig::from_file(&fc).unwrap_err().to_string();
        assert!(err.contains("session token"), "{err}");
        assert!(err.contains("OPENAI_SESSION_TOKEN"), "{err}");
    }

    #[test]
    fn test_blank_clearance_token_is_fatal() {
        let mut fc = with_tokens();
        fc.upstream.clearance_token = Some("   ".into());
        let err = RelayConfig::from_file(&fc).unwrap_err().to_string();
        assert!(err.contains("clearance token"), "{err}");
    }

    #[test]
    fn test_timeout_zero_disables() {
        let mut fc = with_tokens();
        fc.upstream.timeout_secs = 0;
        let rc = RelayConfig::from_file(&fc).unwrap();
        assert!(rc.upstream.call_timeout.is_none());
        assert!(rc.upstream.options.request_timeout.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mut fc = with_tokens();
        fc.upstream.base_url = "http://localhost:9999/".into();
        let rc = RelayConfig::from_file(&fc).unwrap();
        assert_eq!(rc.upstream.options.base_url, "http://localhost:9999");
    }

    #[test]
    fn test_user_agent_override() {
        let mut fc = with_tokens();
        fc.upstream.user_agent = Some("relay-test/1.0".into());
        let rc = RelayConfig::from_file(&fc).unwrap();
        assert_eq!(rc.upstream.credentials.user_agent, "relay-test/1.0");
    }

    #[test]
    fn test_hostname_resolves() {
        let mut fc = with_tokens();
        fc.server.host = "localhost".into();
        fc.server.port = 9001;
        let rc = RelayConfig::from_file(&fc).unwrap();
        assert!(rc.server.bind_addr.ip().is_loopback());
        assert_eq!(rc.server.bind_addr.port(), 9001);
    }

    #[test]
    fn test_ipv6_literal_host() {
        let mut fc = with_tokens();
        fc.server.host = "::1".into();
        let rc = RelayConfig::from_file(&fc).unwrap();
        assert_eq!(rc.server.bind_addr, "[::1]:8080".parse().unwrap());
    }

    #[test]
    fn test_invalid_host_is_rejected() {
        let mut fc = with_tokens();
        fc.server.host = "not a host".into();
        assert!(RelayConfig::from_file(&fc).is_err());
    }

    #[test]
    fn test_zero_channel_capacity_clamped() {
        let mut fc = with_tokens();
        fc.server.send_channel_capacity = 0;
        let rc = RelayConfig::from_file(&fc).unwrap();
        assert_eq!(rc.server.send_channel_capacity, 1);
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let out = format!("{:?}", with_tokens().upstream);
        assert!(!out.contains("\"sess\""));
        assert!(!out.contains("\"clear\""));
        assert!(out.contains("[REDACTED]"));
    }

    // ── figment layering ────────────────────────────────────────────────

    #[test]
    fn test_toml_overrides_defaults() {
        let toml = r#"
            [server]
            port = 9100

            [upstream]
            clearance_token = "toml-clear"
            session_token = "toml-sess"
            timeout_secs = 15
        "#;
        let figment =
            Figment::from(Serialized::defaults(FileConfig::default())).merge(Toml::string(toml));
        let rc = RelayConfig::from_figment(&figment).unwrap();
        assert_eq!(rc.server.bind_addr.port(), 9100);
        assert_eq!(rc.upstream.credentials.session_token, "toml-sess");
        assert_eq!(rc.upstream.call_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_tokens_and_port_only_listen_on_all_interfaces() {
        // The shape of a deployment that sets only the legacy env names.
        let figment = Figment::from(Serialized::defaults(FileConfig::default()))
            .merge(Serialized::default("upstream.clearance_token", "clear"))
            .merge(Serialized::default("upstream.session_token", "sess"))
            .merge(Serialized::default("server.port", 9000u16));
        let rc = RelayConfig::from_figment(&figment).unwrap();
        assert!(rc.server.bind_addr.ip().is_unspecified());
        assert_eq!(rc.server.bind_addr.port(), 9000);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let figment = load_config(&tmp.path().join("does-not-exist.toml"));
        let fc: FileConfig = figment.extract().unwrap();
        assert_eq!(fc.server.send_channel_capacity, 32);
    }

    #[test]
    fn test_config_file_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[server]\nsend_channel_capacity = 7\n").unwrap();
        let fc: FileConfig = load_config(&path).extract().unwrap();
        assert_eq!(fc.server.send_channel_capacity, 7);
    }

    #[test]
    fn test_cli_override_layer() {
        let figment = Figment::from(Serialized::defaults(with_tokens()))
            .merge(Serialized::default("server.port", 0u16));
        let rc = RelayConfig::from_figment(&figment).unwrap();
        assert_eq!(rc.server.bind_addr.port(), 0);
    }
}
