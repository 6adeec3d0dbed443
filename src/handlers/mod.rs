pub mod jobs;

use crate::health;
use actix_web::web;

/// Register every API route on `cfg`.
///
/// `main` mounts this twice: at the root and under `/api/v1`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/upload", web::post().to(jobs::upload))
        .route("/status/{job_id}", web::get().to(jobs::job_status))
        .route("/jobs", web::get().to(jobs::list_jobs))
        .route("/download/{job_id}", web::get().to(jobs::download))
        .route("/cleanup", web::post().to(jobs::cleanup))
        .route("/health", web::get().to(health::health_check))
        .route("/metrics", web::get().to(health::detailed_metrics));
}
