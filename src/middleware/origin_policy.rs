/// Origin validation for WebSocket upgrades.
///
/// Browsers attach an `Origin` header to upgrade requests; validating it
/// prevents cross-site WebSocket hijacking. Three policies are supported:
///
/// - `same_origin`: scheme, hostname, and port must all match the request
///   host.
/// - `same_hostname`: hostname must match, port-independent.
/// - `none`: accept any origin.
///
/// Requests without an `Origin` header (non-browser clients) are accepted
/// under every policy.
use actix_web::http::header;
use actix_web::HttpRequest;
use log::info;
use url::Url;

use crate::config::settings::OriginPolicy;
use crate::error::GatewayError;

pub fn validate_origin(policy: OriginPolicy, req: &HttpRequest) -> Result<(), GatewayError> {
    if policy == OriginPolicy::None {
        return Ok(());
    }

    let origin = match req
        .headers()
        .get(header::ORIGIN)
        .and_then(|h| h.to_str().ok())
    {
        Some(origin) => origin,
        None => return Ok(()),
    };

    let conn = req.connection_info();
    let allowed = match policy {
        OriginPolicy::SameOrigin => is_same_origin(origin, conn.scheme(), conn.host()),
        OriginPolicy::SameHostname => is_same_hostname(origin, conn.host()),
        OriginPolicy::None => true,
    };

    if allowed {
        Ok(())
    } else {
        info!("rejected upgrade from origin {}", origin);
        Err(GatewayError::OriginForbidden)
    }
}

/// Hostname-only comparison, ignoring scheme and port.
pub fn is_same_hostname(origin: &str, request_host: &str) -> bool {
    let origin_host = match Url::parse(origin) {
        Ok(url) => match url.host_str() {
            Some(host) => host.to_string(),
            None => return false,
        },
        Err(_) => return false,
    };
    origin_host.eq_ignore_ascii_case(hostname_of(request_host))
}

/// Full origin comparison: scheme, hostname, and port, with default ports
/// normalized (`http` 80, `https` 443; `ws`/`wss` map onto the same pair).
pub fn is_same_origin(origin: &str, request_scheme: &str, request_host: &str) -> bool {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(_) => return false,
    };
    let origin_host = match url.host_str() {
        Some(host) => host,
        None => return false,
    };
    if !origin_host.eq_ignore_ascii_case(hostname_of(request_host)) {
        return false;
    }

    let origin_scheme = normalize_scheme(url.scheme());
    if !origin_scheme.eq_ignore_ascii_case(normalize_scheme(request_scheme)) {
        return false;
    }

    let origin_port = url
        .port()
        .unwrap_or_else(|| default_port(origin_scheme));
    let request_port = port_of(request_host).unwrap_or_else(|| default_port(origin_scheme));
    origin_port == request_port
}

fn hostname_of(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

fn port_of(host: &str) -> Option<u16> {
    host.rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
}

fn normalize_scheme(scheme: &str) -> &str {
    match scheme {
        "ws" => "http",
        "wss" => "https",
        other => other,
    }
}

fn default_port(scheme: &str) -> u16 {
    if scheme.eq_ignore_ascii_case("https") {
        443
    } else {
        80
    }
}
