use std::{error::Error, fmt};

use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use log::warn;
use serde_json::json;

use keystore_core::{actix_web, log, serde_json, ApiKey, API_KEY_HEADER};

mod metrics;
mod server;

pub use metrics::{MetricsResponse, RequestMetrics, RequestSample};
pub use server::{KeystoreHttpServer, KeystoreHttpServerData};

const LOG_TARGET: &str = "keystore_http";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HttpError {
    NotFound,
    BadRequest(String),
    ServerError,
    Unauthorized,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            HttpError::NotFound => write!(f, "Not found"),
            HttpError::BadRequest(msg) => write!(f, "{}", msg),
            HttpError::ServerError => write!(f, "Internal server error"),
            HttpError::Unauthorized => write!(f, "Wrong api key"),
        }
    }
}

impl Error for HttpError {}

impl ResponseError for HttpError {
    fn error_response(&self) -> HttpResponse {
        match self {
            HttpError::NotFound => HttpResponse::build(self.status_code()).finish(),
            _ => HttpResponse::build(self.status_code()).json(json!({
                "error": self.to_string(),
            })),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            HttpError::NotFound => StatusCode::NOT_FOUND,
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

pub fn check_api_key(req: &HttpRequest, api_key: &ApiKey) -> Result<(), HttpError> {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if api_key.matches(presented) {
        Ok(())
    } else {
        warn!(
            target: LOG_TARGET,
            "Wrong api key {} {}",
            req.method(),
            req.path()
        );
        Err(HttpError::Unauthorized)
    }
}
