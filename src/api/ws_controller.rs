use std::sync::Arc;

use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use log::{error, info, warn};
use serde::Deserialize;

use crate::config::settings::Settings;
use crate::middleware::origin_policy::validate_origin;
use crate::services::callback::{CallbackClient, ConnectOutcome};
use crate::services::session::{SessionHandle, SessionRunner};
use crate::services::session_pool::SessionPool;
use crate::services::stats::Stats;
use crate::utils::session_key::SessionKeyGen;

/// WebSocket upgrade endpoint.
///
/// Authorization is delegated to the backend's connect callback before
/// the upgrade happens: the client's headers and query string are
/// relayed, and the callback's verdict decides whether the socket opens.
/// On success the callback's response body becomes the first frame and
/// the session joins the pool under the key the backend chose (or one
/// the gateway issues).
#[get("/connect")]
pub async fn connect(
    req: HttpRequest,
    stream: web::Payload,
    settings: web::Data<Settings>,
    pool: web::Data<SessionPool>,
    stats: web::Data<Stats>,
    client: web::Data<CallbackClient>,
    keygen: web::Data<SessionKeyGen>,
) -> Result<HttpResponse, Error> {
    if let Err(e) = validate_origin(settings.origin_policy, &req) {
        stats.connect_error_event();
        return Err(e.into());
    }

    let outcome = match client.connect(&req).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("connect callback is not available: {}", e);
            stats.connect_error_event();
            return Err(e.into());
        }
    };

    let (key, hello_body, hello_content_type) = match outcome {
        ConnectOutcome::Rejected { status, body } => {
            // 403 is an ordinary auth refusal, not a gateway problem
            if status == actix_web::http::StatusCode::FORBIDDEN {
                info!("connect callback refused the upgrade");
            } else {
                warn!("connect callback answered {}", status);
                stats.connect_error_event();
            }
            return Ok(HttpResponse::build(status).body(body));
        }
        ConnectOutcome::Accepted {
            key,
            body,
            content_type,
        } => {
            let key = match key {
                Some(key) => key,
                None => match keygen.generate() {
                    Ok(key) => key,
                    Err(e) => {
                        error!("session key generation failed: {}", e);
                        stats.connect_error_event();
                        return Err(e.into());
                    }
                },
            };
            (key, body, content_type)
        }
    };

    let (response, ws_session, msg_stream) = match actix_ws::handle(&req, stream) {
        Ok(upgraded) => upgraded,
        Err(e) => {
            warn!("websocket upgrade failed for key {}: {}", key, e);
            stats.connect_error_event();
            return Err(e);
        }
    };

    let (handle, rx) = SessionHandle::new(key.clone(), settings.send_queue_size);
    let pool = pool.into_inner();
    let stats = stats.into_inner();
    pool.add(Arc::clone(&handle));
    stats.connect_event();
    info!("connected key: {}", key);

    let runner = SessionRunner::new(
        handle,
        ws_session,
        pool,
        Arc::clone(&stats),
        client.receiver(),
        client.get_ref().clone(),
        settings.idle_deadline(),
    );
    let stream = msg_stream.aggregate_continuations();
    actix_web::rt::spawn(async move {
        if !runner.write_hello(hello_body, &hello_content_type).await {
            warn!("hello frame write failed for key {}", runner.handle().key());
            stats.connect_error_event();
            runner.close().await;
            return;
        }
        runner.start(rx, stream);
    });

    Ok(response)
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    format: Option<String>,
}

/// Operational counters, as JSON by default or TSV with
/// `?format=tsv|txt|text`.
#[get("/stats")]
pub async fn stats_endpoint(
    query: web::Query<StatsQuery>,
    stats: web::Data<Stats>,
) -> HttpResponse {
    let snapshot = stats.snapshot();
    match query.format.as_deref() {
        Some("tsv") | Some("txt") | Some("text") => HttpResponse::Ok()
            .content_type("text/tab-separated-values")
            .body(snapshot.to_tsv()),
        _ => HttpResponse::Ok().json(snapshot),
    }
}
