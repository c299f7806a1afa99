use actix_web::{error::InternalError, post, web, HttpResponse, Result as WebResult};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::answer::NO_ANSWER;
use crate::api::models::{AnswerResponse, RelayErrorResponse, RelayRequest};
use crate::gateway::RagGateway;

/// Unreadable relay bodies answer with the same shape as gateway failures.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        error!("Rejected relay body: {}", err);
        let response = HttpResponse::InternalServerError().json(RelayErrorResponse {
            error: "Something went wrong.".to_string(),
            details: err.to_string(),
        });
        InternalError::from_response(err, response).into()
    })
}

/// Relays the newest message of a transcript to the RAG gateway.
#[post("/route")]
pub async fn relay_chat(
    gateway: web::Data<Arc<dyn RagGateway>>,
    req: web::Json<RelayRequest>,
) -> WebResult<HttpResponse> {
    let req = req.into_inner();
    info!("Relaying transcript of {} messages to {}", req.messages.len(), gateway.name());

    // The gateway is stateless; only the newest message is asked.
    let question = req
        .messages
        .last()
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    debug!("Question: {}", question);

    match gateway.ask(question).await {
        Ok(reply) => {
            let answer = reply
                .answer
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| NO_ANSWER.to_string());
            Ok(HttpResponse::Ok().json(AnswerResponse { answer }))
        }
        Err(e) => {
            error!("Gateway request failed: {}", e);
            Ok(HttpResponse::InternalServerError().json(RelayErrorResponse {
                error: "Something went wrong.".to_string(),
                details: e.to_string(),
            }))
        }
    }
}
