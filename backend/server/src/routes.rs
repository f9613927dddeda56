use actix_web::web;

use crate::handlers;
use crate::webhook;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1")
            // Images
            .route("/images", web::get().to(handlers::list_images))
            .route("/images", web::post().to(handlers::post_image))
            .route("/images/{id}", web::get().to(handlers::get_image))
            // Policies
            .route("/policies", web::get().to(handlers::list_policies))
            .route("/policies", web::post().to(handlers::post_policy))
            .route("/policies/{name}", web::get().to(handlers::get_policy))
            // Kubernetes image policy webhook
            .route(
                "/k8s-image-policy-webhook",
                web::post().to(webhook::post_k8s_image_policy),
            )
            // Crawlers
            .route("/crawlers/{id:\\d+}", web::get().to(handlers::get_crawler))
            .route("/crawlers/{type}", web::post().to(handlers::post_crawler))
            // Containers
            .route("/containers", web::get().to(handlers::list_containers))
            .route("/containers/{id}", web::get().to(handlers::get_container))
            // Metrics
            .route("/metrics", web::get().to(handlers::get_metrics)),
    );
}
