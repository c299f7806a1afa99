use actix_multipart::form::{tempfile::TempFile, MultipartForm, MultipartFormConfig};
use actix_web::{
    delete, error::InternalError, get, post, web, HttpResponse, ResponseError,
    Result as WebResult,
};
use tracing::{error, warn};

use crate::api::models::{DeleteQuery, DeleteResponse, ErrorResponse, PaginationQuery, UploadResponse};
use crate::storage::{FileStore, StorageError};

const FORM_OVERHEAD: usize = 64 * 1024;

/// Form posted by the file manager: one part named `file`.
#[derive(MultipartForm)]
pub struct UploadForm {
    pub file: Option<TempFile>,
}

/// Multipart limits for uploads of at most `limit` bytes. Rejected forms get
/// a JSON error body.
pub fn multipart_config(limit: usize) -> MultipartFormConfig {
    // Room for part headers and boundaries; the store enforces the file limit.
    MultipartFormConfig::default()
        .total_limit(limit.saturating_add(FORM_OVERHEAD))
        .error_handler(|err, _req| {
            warn!("Rejected upload form: {}", err);
            let response =
                HttpResponse::build(err.status_code()).json(ErrorResponse::new(err.to_string()));
            InternalError::from_response(err, response).into()
        })
}

#[post("/upload")]
pub async fn upload_file(
    store: web::Data<FileStore>,
    MultipartForm(form): MultipartForm<UploadForm>,
) -> WebResult<HttpResponse> {
    let (file, filename) = match form.file {
        Some(file) => match file.file_name.clone() {
            Some(name) if !name.trim().is_empty() => (file, name),
            _ => return Ok(HttpResponse::BadRequest().json(ErrorResponse::new("No file provided"))),
        },
        None => return Ok(HttpResponse::BadRequest().json(ErrorResponse::new("No file provided"))),
    };

    let data = match tokio::fs::read(file.file.path()).await {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to read uploaded part {}: {}", filename, e);
            return Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string())));
        }
    };
    let content_type = file.content_type.as_ref().map(|mime| mime.essence_str());

    match store.put(&filename, content_type, &data) {
        Ok(record) => Ok(HttpResponse::Ok().json(UploadResponse {
            success: true,
            key: record.key,
        })),
        Err(e @ StorageError::TooLarge { .. }) => {
            Ok(HttpResponse::PayloadTooLarge().json(ErrorResponse::new(e.to_string())))
        }
        Err(e @ (StorageError::InvalidName(_) | StorageError::Empty)) => {
            Ok(HttpResponse::BadRequest().json(ErrorResponse::new(e.to_string())))
        }
        Err(e) => {
            error!("Upload error: {}", e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string())))
        }
    }
}

#[get("/list")]
pub async fn list_files(
    store: web::Data<FileStore>,
    query: web::Query<PaginationQuery>,
) -> WebResult<HttpResponse> {
    match store.list(query.limit, query.offset) {
        Ok(files) => Ok(HttpResponse::Ok().json(files)),
        Err(e) => {
            error!("List error: {}", e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string())))
        }
    }
}

#[delete("/delete")]
pub async fn delete_file(
    store: web::Data<FileStore>,
    query: web::Query<DeleteQuery>,
) -> WebResult<HttpResponse> {
    let key = match query.into_inner().key {
        Some(key) if !key.trim().is_empty() => key,
        _ => {
            return Ok(HttpResponse::BadRequest().json(ErrorResponse::new("No file key provided")))
        }
    };

    match store.delete(&key) {
        Ok(true) => Ok(HttpResponse::Ok().json(DeleteResponse { success: true })),
        Ok(false) => Ok(HttpResponse::NotFound().json(ErrorResponse::new("File not found"))),
        Err(e) => {
            error!("Delete error: {}", e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse::new(e.to_string())))
        }
    }
}
