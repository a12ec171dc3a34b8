pub mod agents;
pub mod feedback_auth;
pub mod health;

use actix_web::HttpResponse;
use facilitator_types::ApiResponse;
use serde::Serialize;

pub(crate) fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(data))
}

pub(crate) fn bad_request(msg: impl Into<String>) -> HttpResponse {
    HttpResponse::BadRequest().json(ApiResponse::<()>::err(msg))
}

pub(crate) fn not_found(msg: impl Into<String>) -> HttpResponse {
    HttpResponse::NotFound().json(ApiResponse::<()>::err(msg))
}
