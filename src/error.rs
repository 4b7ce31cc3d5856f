//! Error handler for treino.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Serialize, Serializer};
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

use crate::account::AccountError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error(transparent)]
    Query(#[from] QueryRejection),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Stable numeric codes clients switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    WrongPassword = 4000,
    UserNotInDatabase = 4001,
    ValidationError = 4002,
    AccountLockOut = 4003,
    AccessFailedLimitReached = 4004,
    DatabaseConflict = 4005,
    MissingAuthToken = 4006,
    JwtForged = 4007,
    UnauthorizedRoute = 4008,
    MailUnavailable = 4009,
    TokenNotGenerated = 4010,
    TokenExpired = 4011,
    ResourceNotInDatabase = 4012,
    UnknownError = 5000,
    StoreUnavailable = 5003,
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(*self as u16)
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseError {
    title: String,
    status: u16,
    error_code: ErrorCode,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<serde_json::Value>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `errorCode` field.
    pub fn code(mut self, code: ErrorCode) -> Self {
        self.error_code = code;
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Attach structured data about the failure.
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.error = Some(data);
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            error_code: ErrorCode::UnknownError,
            detail: String::default(),
            errors: None,
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields = Vec::new();
    collect_field_errors(None, errors, &mut fields);
    fields
}

/// Nested structs and lists are reported with a dotted path.
fn collect_field_errors(
    prefix: Option<&str>,
    errors: &ValidationErrors,
    fields: &mut Vec<FieldError>,
) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{field}"),
            None => field.to_string(),
        };

        match kind {
            ValidationErrorsKind::Field(issues) => {
                fields.extend(issues.iter().map(|issue| FieldError {
                    field: path.clone(),
                    message: issue.to_string(),
                }))
            },
            ValidationErrorsKind::Struct(nested) => {
                collect_field_errors(Some(&path), nested, fields)
            },
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_errors(
                        Some(&format!("{path}[{index}]")),
                        nested,
                        fields,
                    );
                }
            },
        }
    }
}

fn account_error(err: &AccountError, response: ResponseError) -> ResponseError {
    let response = response.details(&err.to_string());

    match err {
        AccountError::WrongPassword => response
            .title("Wrong password.")
            .code(ErrorCode::WrongPassword)
            .status(StatusCode::UNAUTHORIZED),
        AccountError::UserNotFound => response
            .title("User is not registered.")
            .code(ErrorCode::UserNotInDatabase)
            .status(StatusCode::CONFLICT),
        AccountError::AccountLockedOut { until, reason } => response
            .title("Account is locked.")
            .code(ErrorCode::AccountLockOut)
            .status(StatusCode::UNAUTHORIZED)
            .data(serde_json::json!({
                "lockoutUntil": until,
                "lockoutReason": reason,
            })),
        AccountError::AccessFailedLimitReached { until, reason } => response
            .title("Too many failed attempts, account is locked.")
            .code(ErrorCode::AccessFailedLimitReached)
            .status(StatusCode::UNAUTHORIZED)
            .data(serde_json::json!({
                "lockoutUntil": until,
                "lockoutReason": reason,
            })),
        AccountError::TokenNotFound => response
            .title("Token was never issued.")
            .code(ErrorCode::TokenNotGenerated)
            .status(StatusCode::CONFLICT),
        AccountError::TokenExpired => response
            .title("Token is expired.")
            .code(ErrorCode::TokenExpired)
            .status(StatusCode::FORBIDDEN),
        AccountError::NotificationUnavailable => response
            .title("E-mail service is unavailable.")
            .code(ErrorCode::MailUnavailable)
            .status(StatusCode::SERVICE_UNAVAILABLE),
        AccountError::MissingAuthToken => response
            .title("Missing authentication token.")
            .code(ErrorCode::MissingAuthToken)
            .status(StatusCode::UNAUTHORIZED),
        AccountError::TokenForged => response
            .title("Invalid authentication token.")
            .code(ErrorCode::JwtForged)
            .status(StatusCode::UNAUTHORIZED),
        AccountError::UnauthorizedRoute { .. } => response
            .title("Missing permission for this route.")
            .code(ErrorCode::UnauthorizedRoute)
            .status(StatusCode::FORBIDDEN),
        AccountError::Conflict => response
            .title("Conflict with an existing account.")
            .code(ErrorCode::DatabaseConflict)
            .status(StatusCode::BAD_REQUEST),
        AccountError::ResourceNotFound => response
            .title("Resource not found.")
            .code(ErrorCode::ResourceNotInDatabase)
            .status(StatusCode::NOT_FOUND),
        AccountError::InvalidLockout(_) => response
            .title("There were validation errors with your request.")
            .code(ErrorCode::ValidationError)
            .status(StatusCode::BAD_REQUEST),
        AccountError::Unavailable(source) => {
            tracing::error!(error = %source, "store unavailable");
            ResponseError::default()
                .title("Service unavailable.")
                .code(ErrorCode::StoreUnavailable)
                .status(StatusCode::SERVICE_UNAVAILABLE)
        },
        AccountError::Store(_)
        | AccountError::Crypto(_)
        | AccountError::Session(_) => {
            tracing::error!(error = ?err, "server returned 500 status");
            ResponseError::default()
        },
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .code(ErrorCode::ValidationError)
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => response.errors(validation_errors),

            ServerError::Axum(_) | ServerError::Query(_) => response,

            ServerError::Account(err) => account_error(err, response),

            ServerError::Internal { details, source } => {
                tracing::error!(err = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "errorCode": ErrorCode::UnknownError,
                "detail": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use http_body_util::BodyExt;

    use super::*;
    use crate::user::LockoutReason;

    async fn body(error: ServerError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_lockout_payload() {
        let until = Utc::now();
        let (status, json) = body(
            AccountError::AccessFailedLimitReached {
                until,
                reason: Some(LockoutReason::AccessFailed),
            }
            .into(),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["errorCode"], 4004);
        assert_eq!(json["error"]["lockoutReason"], "ACCESS_FAILED");
        assert_eq!(
            json["error"]["lockoutUntil"],
            serde_json::to_value(until).unwrap()
        );
    }

    #[tokio::test]
    async fn test_codes() {
        let cases = [
            (AccountError::WrongPassword, StatusCode::UNAUTHORIZED, 4000),
            (AccountError::UserNotFound, StatusCode::CONFLICT, 4001),
            (AccountError::Conflict, StatusCode::BAD_REQUEST, 4005),
            (AccountError::MissingAuthToken, StatusCode::UNAUTHORIZED, 4006),
            (AccountError::TokenForged, StatusCode::UNAUTHORIZED, 4007),
            (
                AccountError::UnauthorizedRoute { claim: "ManageTraining".into() },
                StatusCode::FORBIDDEN,
                4008,
            ),
            (AccountError::NotificationUnavailable, StatusCode::SERVICE_UNAVAILABLE, 4009),
            (AccountError::TokenNotFound, StatusCode::CONFLICT, 4010),
            (AccountError::TokenExpired, StatusCode::FORBIDDEN, 4011),
            (AccountError::ResourceNotFound, StatusCode::NOT_FOUND, 4012),
        ];

        for (error, status, code) in cases {
            let (got_status, json) = body(error.into()).await;
            assert_eq!(got_status, status);
            assert_eq!(json["errorCode"], code);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let (status, json) = body(ServerError::Internal {
            details: "pool exploded".into(),
            source: None,
        })
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["errorCode"], 5000);
        assert_eq!(json["detail"], "");
    }
}
