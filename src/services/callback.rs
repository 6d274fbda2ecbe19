use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue};
use actix_web::http::{Method, StatusCode};
use actix_web::web::Bytes;
use actix_web::HttpRequest;
use log::warn;
use url::Url;

use crate::config::settings::Settings;
use crate::constants;
use crate::error::GatewayError;
use crate::services::receiver::{CallbackReceiver, DiscardReceiver, Receiver};

/// Largest callback response body the gateway will buffer (hello payloads
/// and error bodies relayed to clients).
const CALLBACK_BODY_LIMIT: usize = 4 * 1024 * 1024;

/// Result of the connect handshake against the backend.
pub enum ConnectOutcome {
    /// Backend authorized the upgrade. `key` is the session key it chose,
    /// if any; `body` is the initial hello payload.
    Accepted {
        key: Option<String>,
        body: Bytes,
        content_type: String,
    },
    /// Backend rejected the upgrade; status and body are relayed to the
    /// client as-is.
    Rejected { status: StatusCode, body: Bytes },
}

/// Shared HTTP client for connect, close, and receive callbacks.
///
/// One instance lives per server worker (awc clients are runtime-local).
/// The connector keeps up to 32 pooled connections with a 10 second
/// keep-alive; on top of that a leaky timer forces `Connection: close` on
/// at most one connect callback per 10 second window, so a single
/// long-lived upstream socket cannot be pinned forever.
#[derive(Clone)]
pub struct CallbackClient {
    client: awc::Client,
    settings: Arc<Settings>,
    connect_url: Option<Url>,
    endpoint: String,
    last_forced_reconnect: Rc<AtomicU64>,
}

impl CallbackClient {
    pub fn new(settings: Arc<Settings>) -> Self {
        let connector = awc::Connector::new()
            .limit(constants::CALLBACK_POOL_LIMIT)
            .conn_keep_alive(Duration::from_secs(constants::CALLBACK_KEEP_ALIVE_SECS));
        let client = awc::Client::builder()
            .connector(connector)
            .disable_timeout()
            .finish();

        let connect_url = settings
            .callback
            .connect
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok());
        let endpoint = settings.endpoint();

        CallbackClient {
            client,
            settings,
            connect_url,
            endpoint,
            last_forced_reconnect: Rc::new(AtomicU64::new(0)),
        }
    }

    /// Runs the connect callback for an incoming upgrade request: the
    /// client's headers (hop-by-hop and handshake headers stripped,
    /// `proxy_set_header` applied, endpoint header added) and raw query
    /// string are relayed; the response decides whether the upgrade
    /// proceeds.
    pub async fn connect(&self, req: &HttpRequest) -> Result<ConnectOutcome, GatewayError> {
        let mut url = self
            .connect_url
            .clone()
            .ok_or_else(|| GatewayError::Config("callback.connect is not set".to_string()))?;
        if !req.query_string().is_empty() {
            url.set_query(Some(req.query_string()));
        }

        let mut callback_req = self.client.request(Method::GET, url.as_str());
        for (name, value) in
            callback_headers(req.headers(), &self.settings.proxy_set_header)
        {
            callback_req = callback_req.append_header((name, value));
        }
        callback_req = callback_req
            .insert_header((constants::ENDPOINT_HEADER, self.endpoint.as_str()));
        if let Some(timeout) = self.settings.callback_deadline() {
            callback_req = callback_req.timeout(timeout);
        }
        if self.should_force_reconnect() {
            callback_req = callback_req.force_close();
        }

        let mut resp = callback_req
            .send()
            .await
            .map_err(|e| GatewayError::CallbackTransport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .body()
            .limit(CALLBACK_BODY_LIMIT)
            .await
            .map_err(|e| GatewayError::CallbackTransport(e.to_string()))?;

        if status != StatusCode::OK {
            return Ok(ConnectOutcome::Rejected { status, body });
        }

        let key = resp
            .headers()
            .get(self.settings.session_header_name())
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(constants::CONTENT_TYPE_TEXT)
            .to_string();

        Ok(ConnectOutcome::Accepted {
            key,
            body,
            content_type,
        })
    }

    /// Fire the close callback for a terminated session. Errors are
    /// returned for the caller to log; they never propagate further.
    pub async fn close(&self, key: &str) -> Result<(), GatewayError> {
        let url = match &self.settings.callback.close {
            Some(url) => url.clone(),
            None => return Ok(()),
        };

        let mut req = self
            .client
            .post(url)
            .insert_header((self.settings.session_header_name(), key))
            .insert_header((constants::ENDPOINT_HEADER, self.endpoint.as_str()));
        if let Some(timeout) = self.settings.callback_deadline() {
            req = req.timeout(timeout);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::CallbackTransport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(GatewayError::CallbackResponseNotOk {
                status: resp.status(),
            });
        }
        Ok(())
    }

    /// Build the upstream receiver for new sessions: the configured
    /// receive callback, or the discarding sink when none is set.
    pub fn receiver(&self) -> Rc<dyn Receiver> {
        match &self.settings.callback.receive {
            Some(url) => Rc::new(CallbackReceiver::new(
                self.client.clone(),
                url.clone(),
                self.settings.session_header_name(),
                self.endpoint.clone(),
                self.settings.callback_deadline(),
            )),
            None => Rc::new(DiscardReceiver),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn close_callback_configured(&self) -> bool {
        self.settings.callback.close.is_some()
    }

    fn should_force_reconnect(&self) -> bool {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let last = self.last_forced_reconnect.load(Ordering::Relaxed);
        now.saturating_sub(last) >= constants::CALLBACK_RECONNECT_WINDOW_SECS
            && self
                .last_forced_reconnect
                .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
    }
}

/// Headers relayed on the connect callback: every incoming header except
/// `Connection`, `Upgrade`, the `Sec-WebSocket-*` family, and
/// `Host`/`Content-Length` (both owned by the client layer; `Host` tracks
/// the callback URL), with `proxy_set_header` applied on top. An empty
/// override value deletes the header.
pub fn callback_headers(
    headers: &HeaderMap,
    overrides: &HashMap<String, String>,
) -> Vec<(HeaderName, HeaderValue)> {
    let mut relayed: Vec<(HeaderName, HeaderValue)> = headers
        .iter()
        .filter(|(name, _)| !is_handshake_header(name.as_str()))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    for (raw_name, raw_value) in overrides {
        let name = match HeaderName::try_from(raw_name.as_str()) {
            Ok(name) => name,
            Err(_) => {
                warn!("proxy_set_header: invalid header name {:?}", raw_name);
                continue;
            }
        };
        relayed.retain(|(existing, _)| *existing != name);
        if raw_value.is_empty() {
            continue;
        }
        match HeaderValue::try_from(raw_value.as_str()) {
            Ok(value) => relayed.push((name, value)),
            Err(_) => warn!("proxy_set_header: invalid value for {:?}", raw_name),
        }
    }

    relayed
}

fn is_handshake_header(name: &str) -> bool {
    name.eq_ignore_ascii_case("connection")
        || name.eq_ignore_ascii_case("upgrade")
        || name.eq_ignore_ascii_case("host")
        || name.eq_ignore_ascii_case("content-length")
        || name.to_ascii_lowercase().starts_with("sec-websocket")
}
