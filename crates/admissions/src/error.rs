use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::admission::AdmissionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Admission(AdmissionError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Admission(err) => write!(f, "admission error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Admission(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Admission(err) => match err {
                AdmissionError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AdmissionError::NotFound => StatusCode::NOT_FOUND,
                AdmissionError::InvalidTransition(_) | AdmissionError::Conflict => {
                    StatusCode::CONFLICT
                }
                AdmissionError::AdmissionFailed { .. } => StatusCode::BAD_GATEWAY,
                AdmissionError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<AdmissionError> for AppError {
    fn from(value: AdmissionError) -> Self {
        Self::Admission(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::admission::{AdmissionStep, ApplicationStatus, TransitionError};

    #[test]
    fn admission_errors_map_to_client_statuses() {
        let invalid = AppError::from(AdmissionError::from(TransitionError {
            from: ApplicationStatus::Admitted,
            to: ApplicationStatus::OnHold,
        }));
        assert_eq!(invalid.into_response().status(), StatusCode::CONFLICT);

        let failed = AppError::from(AdmissionError::AdmissionFailed {
            step: AdmissionStep::StudentCreation,
            reason: "registry offline".into(),
        });
        assert_eq!(failed.into_response().status(), StatusCode::BAD_GATEWAY);

        let missing = AppError::from(AdmissionError::NotFound);
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn config_errors_are_internal() {
        let err = AppError::from(ConfigError::InvalidPort);
        assert!(err.to_string().starts_with("configuration error"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
