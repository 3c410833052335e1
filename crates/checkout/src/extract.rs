//! Request extractors that keep rejections in the JSON error envelope.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};

use crate::error::AppError;

/// `axum::Json` with deserialization failures mapped to [`AppError`], so a
/// missing or mistyped body field produces the same `{"error": {...}}`
/// shape as every other rejected request.
#[derive(Debug)]
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(AppError::Validation(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::http::header::CONTENT_TYPE;
    use axum::response::IntoResponse;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Payload {
        count: u32,
    }

    fn request(body: &'static str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request builds")
    }

    #[tokio::test]
    async fn test_valid_body_deserializes() {
        let AppJson(payload) = AppJson::<Payload>::from_request(request(r#"{"count": 3}"#), &())
            .await
            .expect("deserializes");
        assert_eq!(payload.count, 3);
    }

    #[tokio::test]
    async fn test_missing_field_maps_to_validation_error() {
        let err = AppJson::<Payload>::from_request(request("{}"), &())
            .await
            .expect_err("rejected");
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(
            err.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
