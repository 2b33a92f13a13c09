use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use meli_tools::MeliApiError;
use seller_gateway_engine::LinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Marketplace error. {0}")]
    MarketplaceApi(#[from] MeliApiError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::MarketplaceApi(e) => match e {
                MeliApiError::Unauthorized => StatusCode::UNAUTHORIZED,
                MeliApiError::Transport(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({ "error": self.to_string() });
        // An authorization dead-end is actionable: the client must send the seller back
        // through the linking flow, which is a different journey than retrying.
        if let Self::MarketplaceApi(e) = self {
            if let Some(action) = e.action() {
                body["action"] = serde_json::json!(action);
            }
        }
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}

impl From<LinkError> for ServerError {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::UserNotFound(id) => Self::NoRecordFound(format!("User {id}")),
            LinkError::CodeRejected(remote) => Self::InvalidRequestBody(remote.to_string()),
            LinkError::Api(api) => Self::MarketplaceApi(api),
            LinkError::Vault(v) => Self::BackendError(v.to_string()),
            LinkError::Store(s) => Self::BackendError(s.to_string()),
        }
    }
}
