use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use actix_web::http::header::HeaderName;
use serde::Deserialize;
use url::Url;

use crate::constants;
use crate::error::GatewayError;

/// Gateway configuration, loaded from a YAML file. Every key is optional;
/// missing keys fall back to the defaults below.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Header carrying the session key on admin requests and callbacks.
    pub session_header: String,
    pub port: u16,
    /// Unix-domain socket path; overrides `port` when set.
    pub sock: Option<String>,
    /// Value announced in the endpoint header on callbacks. Defaults to
    /// `<hostname>:<port>`.
    pub endpoint: Option<String>,
    pub callback: Callback,
    pub strict_broadcast: bool,
    /// Overrides applied to connect-callback headers. An empty value
    /// deletes the header, a non-empty one overwrites it.
    pub proxy_set_header: HashMap<String, String>,
    /// Deadline for /send and /close enqueues, seconds. 0 inherits the
    /// caller's deadline.
    pub send_timeout: u64,
    /// Per-session outbound queue capacity. 0 means rendezvous-sized.
    pub send_queue_size: usize,
    pub origin_policy: OriginPolicy,
    /// Per-session read deadline, seconds. 0 disables the idle timeout.
    pub idle_timeout: u64,
    /// When set, gateway-issued session keys are HS256-signed JWTs.
    pub session_key_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Callback {
    /// URL consulted to authorize each upgrade. Required to serve.
    pub connect: Option<String>,
    /// URL notified asynchronously after a session terminates.
    pub close: Option<String>,
    /// URL receiving upstream client frames; absent means discard.
    pub receive: Option<String>,
    /// Deadline on callback requests, seconds. 0 means no deadline.
    pub timeout: u64,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OriginPolicy {
    /// Strict same-scheme-and-host check.
    SameOrigin,
    /// Hostname comparison only, port-independent.
    SameHostname,
    /// Accept any origin.
    #[default]
    None,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            session_header: constants::DEFAULT_SESSION_HEADER.to_string(),
            port: constants::DEFAULT_PORT,
            sock: None,
            endpoint: None,
            callback: Callback::default(),
            strict_broadcast: false,
            proxy_set_header: HashMap::new(),
            send_timeout: 0,
            send_queue_size: 0,
            origin_policy: OriginPolicy::None,
            idle_timeout: 0,
            session_key_secret: None,
        }
    }
}

impl Settings {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Config(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, GatewayError> {
        let settings: Settings = serde_yaml::from_str(raw)
            .map_err(|e| GatewayError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), GatewayError> {
        if self.callback.connect.is_none() {
            return Err(GatewayError::Config(
                "callback.connect is required".to_string(),
            ));
        }
        if HeaderName::try_from(self.session_header.as_str()).is_err() {
            return Err(GatewayError::Config(format!(
                "session_header is not a valid header name: {:?}",
                self.session_header
            )));
        }
        for (name, url) in [
            ("callback.connect", &self.callback.connect),
            ("callback.close", &self.callback.close),
            ("callback.receive", &self.callback.receive),
        ] {
            if let Some(raw) = url {
                Url::parse(raw).map_err(|e| {
                    GatewayError::Config(format!("{} is not a valid URL: {}", name, e))
                })?;
            }
        }
        Ok(())
    }

    /// The session header as a parsed header name. Validation at load time
    /// guarantees the value parses; the default name covers the
    /// hand-constructed `Settings::default()` case.
    pub fn session_header_name(&self) -> HeaderName {
        HeaderName::try_from(self.session_header.as_str())
            .unwrap_or_else(|_| HeaderName::from_static("x-kuiperbelt-session"))
    }

    /// The endpoint value sent to backends. Falls back to
    /// `$HOSTNAME:<port>`, then `localhost:<port>`.
    pub fn endpoint(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.clone();
        }
        let host = env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        format!("{}:{}", host, self.port)
    }

    pub fn callback_deadline(&self) -> Option<Duration> {
        nonzero_secs(self.callback.timeout)
    }

    pub fn send_deadline(&self) -> Option<Duration> {
        nonzero_secs(self.send_timeout)
    }

    pub fn idle_deadline(&self) -> Option<Duration> {
        nonzero_secs(self.idle_timeout)
    }
}

fn nonzero_secs(secs: u64) -> Option<Duration> {
    if secs == 0 {
        None
    } else {
        Some(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG_DATA: &str = r#"
session_header: "X-Kuiperbelt-Session-Key"
port: 12345
callback:
  connect: "http://localhost:12346/connect"
proxy_set_header:
  X-Foo: "Foo"
  X-Forwarded-For: ""
"#;

    #[test]
    fn test_unmarshal() {
        let c = Settings::from_yaml_str(CONFIG_DATA).unwrap();
        assert_eq!(c.session_header, "X-Kuiperbelt-Session-Key");
        assert_eq!(c.port, 12345);
        assert_eq!(
            c.callback.connect.as_deref(),
            Some("http://localhost:12346/connect")
        );
        assert_eq!(c.callback.close, None);
        assert_eq!(c.proxy_set_header.get("X-Foo").unwrap(), "Foo");
        assert_eq!(c.proxy_set_header.get("X-Forwarded-For").unwrap(), "");
    }

    #[test]
    fn test_defaults() {
        let c = Settings::from_yaml_str("callback:\n  connect: \"http://localhost/c\"\n")
            .unwrap();
        assert_eq!(c.session_header, constants::DEFAULT_SESSION_HEADER);
        assert_eq!(c.port, constants::DEFAULT_PORT);
        assert!(!c.strict_broadcast);
        assert_eq!(c.send_queue_size, 0);
        assert_eq!(c.origin_policy, OriginPolicy::None);
        assert_eq!(c.callback_deadline(), None);
        assert_eq!(c.send_deadline(), None);
        assert_eq!(c.idle_deadline(), None);
    }

    #[test]
    fn test_missing_connect_callback() {
        let err = Settings::from_yaml_str("port: 9180\n").unwrap_err();
        assert!(err.to_string().contains("callback.connect"));
    }

    #[test]
    fn test_origin_policy_parsing() {
        let c = Settings::from_yaml_str(
            "origin_policy: same_hostname\ncallback:\n  connect: \"http://localhost/c\"\n",
        )
        .unwrap();
        assert_eq!(c.origin_policy, OriginPolicy::SameHostname);

        let c = Settings::from_yaml_str(
            "origin_policy: same_origin\ncallback:\n  connect: \"http://localhost/c\"\n",
        )
        .unwrap();
        assert_eq!(c.origin_policy, OriginPolicy::SameOrigin);
    }

    #[test]
    fn test_timeouts_in_seconds() {
        let c = Settings::from_yaml_str(
            "send_timeout: 3\nidle_timeout: 2\ncallback:\n  connect: \"http://localhost/c\"\n  timeout: 1\n",
        )
        .unwrap();
        assert_eq!(c.send_deadline(), Some(Duration::from_secs(3)));
        assert_eq!(c.idle_deadline(), Some(Duration::from_secs(2)));
        assert_eq!(c.callback_deadline(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(CONFIG_DATA.as_bytes()).unwrap();
        let c = Settings::from_file(f.path()).unwrap();
        assert_eq!(c.port, 12345);

        assert!(Settings::from_file("/nonexistent/config.yml").is_err());
    }
}
