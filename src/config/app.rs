use actix_web::web;

use crate::api::{proxy_controller, ws_controller};

/// Registers the whole HTTP surface: the client-facing upgrade endpoint
/// and the backend-facing admin endpoints.
pub fn config_services(cfg: &mut web::ServiceConfig) {
    cfg.service(ws_controller::connect)
        .service(ws_controller::stats_endpoint)
        .service(
            web::resource("/send")
                .route(web::post().to(proxy_controller::send))
                .default_service(web::to(proxy_controller::method_not_allowed)),
        )
        .service(
            web::resource("/close")
                .route(web::post().to(proxy_controller::close))
                .default_service(web::to(proxy_controller::method_not_allowed)),
        )
        .route("/ping", web::get().to(proxy_controller::ping));
}
