use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use futures::future::join_all;
use log::debug;
use serde_json::json;

use crate::config::settings::Settings;
use crate::constants;
use crate::error::GatewayError;
use crate::models::message::Message;
use crate::models::response::{DispatchResponse, SessionErrorEntry};
use crate::services::session::SessionHandle;
use crate::services::session_pool::SessionPool;

/// `POST /send`: fan a message out to every session named by the session
/// header. Order within a single session is preserved; across sessions
/// nothing is guaranteed.
pub async fn send(
    req: HttpRequest,
    body: web::Bytes,
    settings: web::Data<Settings>,
    pool: web::Data<SessionPool>,
) -> Result<HttpResponse, Error> {
    dispatch(req, body, settings, pool, false).await
}

/// `POST /close`: like `/send`, but the message is marked terminal; each
/// target session closes right after the body is written.
pub async fn close(
    req: HttpRequest,
    body: web::Bytes,
    settings: web::Data<Settings>,
    pool: web::Data<SessionPool>,
) -> Result<HttpResponse, Error> {
    dispatch(req, body, settings, pool, true).await
}

/// `GET /ping`: liveness probe for backends.
pub async fn ping() -> HttpResponse {
    HttpResponse::Ok().json(DispatchResponse::ok())
}

/// Rejected methods get the same JSON error shape as everything else.
pub async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(json!({
        "error": "method not allowed, use POST",
        "result": constants::RESULT_NG,
    }))
}

async fn dispatch(
    req: HttpRequest,
    body: web::Bytes,
    settings: web::Data<Settings>,
    pool: web::Data<SessionPool>,
    last_word: bool,
) -> Result<HttpResponse, Error> {
    let keys = session_keys(&req, &settings);
    if keys.is_empty() {
        return Err(GatewayError::SessionKeyMissing.into());
    }

    let mut targets: Vec<Arc<SessionHandle>> = Vec::with_capacity(keys.len());
    let mut failures: Vec<GatewayError> = Vec::new();
    for key in &keys {
        match pool.get(key) {
            Ok(session) => targets.push(session),
            Err(e) => failures.push(e),
        }
    }

    // Strict broadcast: one unknown key rejects the whole request before
    // anything is delivered.
    if settings.strict_broadcast && !failures.is_empty() {
        return Ok(error_response(&failures, true));
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(constants::CONTENT_TYPE_TEXT)
        .to_string();
    let message = Message {
        body,
        content_type,
        session: None,
        last_word,
    };

    let send_timeout = settings.send_deadline();
    let sends = targets.iter().map(|session| {
        let msg = message.clone().for_session(session.key());
        async move { enqueue(session, msg, send_timeout).await }
    });
    for result in join_all(sends).await {
        if let Err(e) = result {
            debug!("dispatch failure: {}", e);
            failures.push(e);
        }
    }

    if failures.is_empty() {
        Ok(HttpResponse::Ok().json(DispatchResponse::ok()))
    } else {
        Ok(error_response(&failures, settings.strict_broadcast))
    }
}

fn session_keys(req: &HttpRequest, settings: &Settings) -> Vec<String> {
    req.headers()
        .get_all(settings.session_header_name())
        .filter_map(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

async fn enqueue(
    session: &Arc<SessionHandle>,
    msg: Message,
    deadline: Option<std::time::Duration>,
) -> Result<(), GatewayError> {
    let key = session.key().to_string();
    let tx = session
        .sender()
        .ok_or_else(|| GatewayError::SessionClosed(key.clone()))?;

    match deadline {
        Some(deadline) => match tokio::time::timeout(deadline, tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(GatewayError::SessionClosed(key)),
            Err(_) => Err(GatewayError::EnqueueTimeout(key)),
        },
        None => tx
            .send(msg)
            .await
            .map_err(|_| GatewayError::SessionClosed(key)),
    }
}

fn error_response(failures: &[GatewayError], strict: bool) -> HttpResponse {
    let entries: Vec<SessionErrorEntry> = failures.iter().map(Into::into).collect();
    let body = DispatchResponse::with_errors(entries, strict);
    if strict {
        HttpResponse::BadRequest().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}
