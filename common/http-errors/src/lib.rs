use axum::{http::{header, StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use uuid::Uuid;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub missing_roles: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    /// 401. `code` is a stable machine-readable class; `message` must not carry validation internals.
    Unauthorized { code: &'static str, message: &'static str, trace_id: Option<Uuid> },
    ForbiddenMissingRoles { roles: Vec<String>, trace_id: Option<Uuid> },
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    Internal { trace_id: Option<Uuid>, message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self { Self::Internal { trace_id, message: Some(e.to_string()) } }
    pub fn not_found(code: &'static str) -> Self { Self::NotFound { code, trace_id: None } }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenMissingRoles { .. } => StatusCode::FORBIDDEN,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { code, .. }
            | ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code, .. } => *code,
            ApiError::ForbiddenMissingRoles { .. } => "missing_role",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        let challenge = matches!(self, ApiError::Unauthorized { .. });
        let body = match self {
            ApiError::Unauthorized { code, message, trace_id } =>
                ErrorBody { code: code.into(), missing_roles: None, trace_id, message: Some(message.into()) },
            ApiError::ForbiddenMissingRoles { roles, trace_id } =>
                ErrorBody { code: error_code.into(), missing_roles: Some(roles), trace_id, message: Some("missing required role(s)".into()) },
            ApiError::BadRequest { code, trace_id, message } =>
                ErrorBody { code: code.into(), missing_roles: None, trace_id, message },
            ApiError::NotFound { code, trace_id } =>
                ErrorBody { code: code.into(), missing_roles: None, trace_id, message: None },
            ApiError::Internal { trace_id, message } =>
                ErrorBody { code: error_code.into(), missing_roles: None, trace_id, message },
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        if challenge {
            resp.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
