use common_http_errors::ApiError;
use axum::response::IntoResponse;
use axum::http::{header, StatusCode};
use http_body_util::BodyExt;
use uuid::Uuid;

#[test]
fn unauthorized_variant_carries_bearer_challenge() {
    let err = ApiError::Unauthorized { code: "missing_credential", message: "authentication required", trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_credential");
    assert_eq!(resp.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
}

#[tokio::test]
async fn forbidden_missing_roles_lists_roles() {
    let err = ApiError::ForbiddenMissingRoles { roles: vec!["admin".into()], trace_id: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_role");
    assert!(resp.headers().get(header::WWW_AUTHENTICATE).is_none());
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["missing_roles"], serde_json::json!(["admin"]));
}

#[test]
fn bad_request_variant() {
    let err = ApiError::BadRequest { code: "invalid_pagination", trace_id: None, message: None };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_pagination");
}

#[test]
fn not_found_variant() {
    let err = ApiError::not_found("project_not_found");
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "project_not_found");
}

#[test]
fn internal_variant() {
    let trace = Some(Uuid::new_v4());
    let err = ApiError::Internal { trace_id: trace, message: Some("boom".into()) };
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "internal_error");
}
