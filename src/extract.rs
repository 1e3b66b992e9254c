//! Drop-in replacements for axum's `Json`, `Path` and `Query` whose
//! rejections render as `AppError::Validation` instead of plain text.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::errors::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct Path<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct Query<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(vec![format!("request body: {}", rejection.body_text())])
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(vec![format!("path: {}", rejection.body_text())])
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(vec![format!("query: {}", rejection.body_text())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;

    #[derive(Debug, Deserialize, Serialize)]
    struct Payload {
        count: i64,
    }

    async fn echo(Path(id): Path<i64>, Json(payload): Json<Payload>) -> Json<(i64, i64)> {
        Json((id, payload.count))
    }

    async fn send(uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let app = Router::new().route("/items/:id", post(echo));
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn valid_request_passes_through() {
        let (status, body) = send("/items/3", r#"{"count": 4}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([3, 4]));
    }

    #[tokio::test]
    async fn rejections_use_the_error_body() {
        let (status, body) = send("/items/3", r#"{"count": "four"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
        assert!(body["details"][0].as_str().unwrap().starts_with("request body:"), "{body}");

        let (status, body) = send("/items/three", r#"{"count": 4}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
        assert!(body["details"][0].as_str().unwrap().starts_with("path:"), "{body}");

        let (status, body) = send("/items/3", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
    }
}
