use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bookbase_core::BookbaseError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] BookbaseError),

    #[error(transparent)]
    Body(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error("catalog task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Core(BookbaseError::Validation(_) | BookbaseError::InvalidId(_))
            | ApiError::Body(_)
            | ApiError::Query(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(BookbaseError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Core(BookbaseError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            ApiError::Core(_) | ApiError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(
                error.cause_chain = ?self,
                error.message = %self,
                "Unexpected error happened"
            );
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use bookbase_core::{BookStatus, LifecycleAction};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BookbaseError::Validation("title".into()), StatusCode::BAD_REQUEST),
            (BookbaseError::InvalidId("nope".into()), StatusCode::BAD_REQUEST),
            (BookbaseError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                BookbaseError::InvalidTransition {
                    id: "x".into(),
                    status: BookStatus::CheckedOut,
                    action: LifecycleAction::Checkout,
                },
                StatusCode::CONFLICT,
            ),
            (BookbaseError::Config("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }
}
