pub mod files;
pub mod models;
pub mod routes;

use actix_web::{get, web, HttpResponse, Responder};

#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({"status": "healthy"}))
}

/// Mounts the chat relay and the file manager endpoints under `/api`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(
        web::scope("/api")
            .app_data(routes::json_config())
            .service(routes::relay_chat)
            .service(files::upload_file)
            .service(files::list_files)
            .service(files::delete_file),
    );
}
