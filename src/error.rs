use axum::http::StatusCode;
use thiserror::Error;

/// Failure taxonomy carried as `Result` through every layer. The gateway is
/// the single place an `ApiError` becomes a response envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid credentials")]
    Auth,

    #[error("not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(anyhow::Error),

    #[error("upstream failure: {0}")]
    Upstream(anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Upstream(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Body text exposed to callers. Server-side failures collapse to a
    /// generic message; the detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Auth => "Invalid credentials".into(),
            ApiError::NotFound => "Not Found".into(),
            ApiError::Storage(_) | ApiError::Upstream(_) | ApiError::Internal(_) => {
                "Internal Server Error".into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_side_errors_hide_detail() {
        let err = ApiError::Storage(anyhow::anyhow!("table users is on fire"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Internal Server Error");
    }

    #[test]
    fn auth_and_not_found_map_to_their_statuses() {
        assert_eq!(ApiError::Auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Validation("username is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
